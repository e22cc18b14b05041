//! End-to-end run:
//! 1. Validate feed rows into quotes
//! 2. Filter (levels 1 to 3)
//! 3. Price elasticities and attach next-day leverage-adjusted returns
//! 4. Aggregate into the full and reduced portfolio panels

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelineConfig;
use crate::data::{OptionQuote, QuoteFeedLoader, QuoteRecord};
use crate::diagnostics::RunDiagnostics;
use crate::error::PipelineResult;
use crate::filters::QuoteFilterPipeline;
use crate::portfolio::{PortfolioAggregator, PortfolioPanel};
use crate::pricing::ElasticityEngine;

/// Everything a run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineOutput {
    pub panel: PortfolioPanel,
    pub diagnostics: RunDiagnostics,
    /// Filtered quotes with their derived fields, for auditing.
    pub quotes: Vec<OptionQuote>,
}

pub struct PortfolioEngine {
    pipeline: QuoteFilterPipeline,
}

impl PortfolioEngine {
    /// Fails on an invalid configuration, before any data is read.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        Ok(Self {
            pipeline: QuoteFilterPipeline::new(config)?,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        self.pipeline.config()
    }

    /// Load a quote feed from disk and run it.
    pub fn run_file(&self, path: impl AsRef<Path>) -> PipelineResult<EngineOutput> {
        self.run_feed(&QuoteFeedLoader::new(path.as_ref()))
    }

    /// Run whatever `loader` reads, with its strike scaling applied.
    pub fn run_feed(&self, loader: &QuoteFeedLoader) -> PipelineResult<EngineOutput> {
        let records = loader.load_records()?;
        Ok(self.run(records))
    }

    /// Run feed rows through the whole pipeline.
    pub fn run(&self, records: Vec<QuoteRecord>) -> EngineOutput {
        let mut diagnostics = RunDiagnostics::new();
        let quotes = self.pipeline.ingest(records, &mut diagnostics);
        self.run_with_quotes(&quotes, diagnostics)
    }

    /// Run already validated quotes, adding to existing diagnostics.
    pub fn run_with_quotes(&self, quotes: &[OptionQuote], mut diagnostics: RunDiagnostics) -> EngineOutput {
        let config = self.pipeline.config();

        let filtered = self.pipeline.apply(quotes, &mut diagnostics);
        let priced = ElasticityEngine::new(config).annotate_returns(&filtered, &mut diagnostics);
        let panel = PortfolioAggregator::new(config).build_portfolios(&priced, &mut diagnostics);

        info!("Run complete\n{}", diagnostics.summary());

        EngineOutput {
            panel,
            diagnostics,
            quotes: priced,
        }
    }
}
