//! Ordered filter pipeline.
//!
//! Cross-sectional stages (smile fit, parity medians) judge each quote
//! against the rest of its date, so removing rows late in the list can
//! change what an earlier stage would decide. The pipeline therefore runs
//! the ordered list repeatedly until a full pass drops nothing and fills in
//! no implied vol (a freshly inverted IV still has to face the IV bounds).
//! The result is a fixed point: filtering it again returns it unchanged.

use tracing::{debug, info};

use super::stage::{FilterStage, StageOutcome};
use crate::config::PipelineConfig;
use crate::data::{OptionQuote, QuoteRecord};
use crate::diagnostics::{RunDiagnostics, StageReport};
use crate::error::PipelineResult;

pub struct QuoteFilterPipeline {
    config: PipelineConfig,
    stages: Vec<FilterStage>,
}

impl QuoteFilterPipeline {
    /// Pipeline with every stage in methodology order. Fails on an invalid
    /// configuration.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            stages: FilterStage::ALL.to_vec(),
        })
    }

    /// Run these stages, in the order given, instead of
    /// [`FilterStage::ALL`]. A repeated stage runs at its first position.
    pub fn with_stages(mut self, stages: &[FilterStage]) -> Self {
        let mut ordered: Vec<FilterStage> = Vec::with_capacity(stages.len());
        for stage in stages {
            if !ordered.contains(stage) {
                ordered.push(*stage);
            }
        }
        self.stages = ordered;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Validate raw feed rows into quotes. Malformed rows are dropped and
    /// counted.
    pub fn ingest(&self, records: Vec<QuoteRecord>, diagnostics: &mut RunDiagnostics) -> Vec<OptionQuote> {
        diagnostics.input_rows += records.len();

        let mut quotes = Vec::with_capacity(records.len());
        for (row, record) in records.into_iter().enumerate() {
            match record.into_quote(row) {
                Ok(raw) => quotes.push(OptionQuote::new(raw)),
                Err(e) => {
                    debug!("{}", e);
                    diagnostics.absorb(&e);
                }
            }
        }

        info!(
            "Ingested {} quotes ({} malformed rows dropped)",
            quotes.len(),
            diagnostics.malformed_rows
        );
        quotes
    }

    /// Filter quotes to a fixed point of the configured stages.
    pub fn apply(&self, quotes: &[OptionQuote], diagnostics: &mut RunDiagnostics) -> Vec<OptionQuote> {
        let mut reports: Vec<StageReport> = self
            .stages
            .iter()
            .map(|stage| StageReport {
                stage: stage.name().to_string(),
                level: stage.level(),
                ..Default::default()
            })
            .collect();

        let mut current = quotes.to_vec();
        let mut pass = 0;
        loop {
            pass += 1;
            let before = current.len();
            let mut inverted = 0;

            for (stage, report) in self.stages.iter().zip(reports.iter_mut()) {
                let input = current.len();
                let StageOutcome {
                    quotes: kept,
                    repaired,
                    insufficient,
                } = stage.apply(&current, &self.config);

                let dropped = input - kept.len();
                if pass == 1 {
                    report.input = input;
                    info!(
                        "L{} {}: {} in, {} dropped, {} repaired",
                        stage.level(),
                        stage.name(),
                        input,
                        dropped,
                        repaired
                    );
                } else if dropped > 0 {
                    info!("L{} {} (pass {}): {} dropped", stage.level(), stage.name(), pass, dropped);
                }

                if *stage == FilterStage::ImpliedVolInversion {
                    inverted += repaired;
                }
                report.dropped += dropped;
                report.repaired += repaired;
                report.insufficient_groups = insufficient;
                report.output = kept.len();
                current = kept;
            }

            if current.len() == before && inverted == 0 {
                break;
            }
        }

        debug!("Filter pipeline settled after {} passes", pass);
        for report in reports {
            diagnostics.record_stage(report);
        }

        info!("Filtered {} quotes down to {}", quotes.len(), current.len());
        current
    }
}

/// Run the full stage list without diagnostics.
pub fn apply_stages(quotes: &[OptionQuote], config: &PipelineConfig) -> PipelineResult<Vec<OptionQuote>> {
    let pipeline = QuoteFilterPipeline::new(config.clone())?;
    Ok(pipeline.apply(quotes, &mut RunDiagnostics::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};
    use crate::data::OptionType;
    use crate::error::PipelineError;

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.portfolio.maturity_grid.clear();
        assert!(matches!(
            QuoteFilterPipeline::new(config),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_level1_only() {
        let pipeline = QuoteFilterPipeline::new(PipelineConfig::default())
            .unwrap()
            .with_stages(&[FilterStage::ZeroBid, FilterStage::Identical, FilterStage::ZeroBid]);
        assert_eq!(
            pipeline.stages(),
            &[FilterStage::ZeroBid, FilterStage::Identical]
        );

        let q = quote(day(4), OptionType::Call, 100.0, 30, 2.0, 2.2, 0.2);
        let zero = quote(day(4), OptionType::Call, 130.0, 30, 0.0, 0.1, 0.2);
        let mut diag = RunDiagnostics::new();
        let out = pipeline.apply(&[q.clone(), q, zero], &mut diag);

        assert_eq!(out.len(), 1);
        assert_eq!(diag.stage("identical").map(|s| s.dropped), Some(1));
        assert_eq!(diag.stage("zero_bid").map(|s| s.dropped), Some(1));
        assert_eq!(diag.total_filtered(), 2);

        let order: Vec<&str> = diag.stages.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(order, vec!["zero_bid", "identical"]);
    }

    #[test]
    fn test_inverted_iv_faces_bounds_in_either_order() {
        // A blank-IV quote whose price inverts to 150% vol. With the IV
        // bounds ahead of the inversion it is caught on the next pass; with
        // the bounds alone it is never judged.
        let price = crate::pricing::BlackScholes::new(0.02).call_price(100.0, 100.0, 30.0 / 365.0, 1.5);
        let mut blank = quote(day(4), OptionType::Call, 100.0, 30, price, price, f64::NAN);
        blank.derived.implied_rate = Some(0.02);

        let config = PipelineConfig::default();
        let bounds_only = QuoteFilterPipeline::new(config.clone())
            .unwrap()
            .with_stages(&[FilterStage::ImpliedVolBounds]);
        let both = QuoteFilterPipeline::new(config.clone())
            .unwrap()
            .with_stages(&[FilterStage::ImpliedVolBounds, FilterStage::ImpliedVolInversion]);
        let inverted_first = QuoteFilterPipeline::new(config)
            .unwrap()
            .with_stages(&[FilterStage::ImpliedVolInversion, FilterStage::ImpliedVolBounds]);

        let input = vec![blank];
        assert_eq!(bounds_only.apply(&input, &mut RunDiagnostics::new()).len(), 1);
        assert!(both.apply(&input, &mut RunDiagnostics::new()).is_empty());

        let mut diag = RunDiagnostics::new();
        assert!(inverted_first.apply(&input, &mut diag).is_empty());
        assert_eq!(diag.stage("implied_vol_inversion").map(|s| s.repaired), Some(1));
        assert_eq!(diag.stage("implied_vol_bounds").map(|s| s.dropped), Some(1));
    }

    #[test]
    fn test_empty_input() {
        let pipeline = QuoteFilterPipeline::new(PipelineConfig::default()).unwrap();
        let mut diag = RunDiagnostics::new();
        assert!(pipeline.apply(&[], &mut diag).is_empty());
        assert_eq!(diag.stages.len(), FilterStage::ALL.len());
    }
}
