//! # Filter a quote feed and build the portfolio panel
//! optfilter run --quotes data/quotes.parquet --config config/default.toml --output panel.csv
//!
//! # Reduced (type x moneyness) view only, with a diagnostics report
//! optfilter run --quotes data/quotes.csv --output panel.parquet --view reduced --diagnostics run.json
//!
//! # OptionMetrics feed (strike_price x 1000)
//! optfilter run --quotes data/opprcd.csv --output panel.csv --strike-divisor 1000
//!
//! # Validate a configuration file
//! optfilter check-config --config config/default.toml

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use polars::prelude::*;
use tracing::info;

use optfilter::{PanelView, PipelineConfig, PortfolioEngine, QuoteFeedLoader};

#[derive(Parser)]
#[command(name = "optfilter")]
#[command(about = "Option quote filtration and leverage-adjusted portfolio returns")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter quotes and write the portfolio return panel
    Run {
        /// Quote feed (.parquet or .csv)
        #[arg(short, long)]
        quotes: PathBuf,

        /// Path to configuration file; defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output panel (.parquet or .csv)
        #[arg(short, long)]
        output: PathBuf,

        /// Portfolio view to write
        #[arg(long, value_enum, default_value_t = View::Both)]
        view: View,

        /// Divide feed strikes by this (1000 for OptionMetrics strike_price)
        #[arg(long, default_value_t = 1.0)]
        strike_divisor: f64,

        /// Write run diagnostics as JSON
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },

    /// Validate a configuration file and print the effective values
    CheckConfig {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum View {
    Full,
    Reduced,
    Both,
}

impl From<View> for PanelView {
    fn from(view: View) -> Self {
        match view {
            View::Full => PanelView::Full,
            View::Reduced => PanelView::Reduced,
            View::Both => PanelView::Both,
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_toml_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn write_panel(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;

    match path.extension().and_then(|e| e.to_str()) {
        Some("parquet") => {
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Zstd(Some(ZstdLevel::try_new(3)?)))
                .finish(df)?;
        }
        _ => {
            CsvWriter::new(file).include_header(true).finish(df)?;
        }
    }
    Ok(())
}

fn cmd_run(
    quotes: &Path,
    config: Option<&Path>,
    output: &Path,
    view: View,
    strike_divisor: f64,
    diagnostics: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let engine = PortfolioEngine::new(config)?;

    info!("Reading quotes from {}", quotes.display());
    let loader = QuoteFeedLoader::new(quotes).with_strike_divisor(strike_divisor);
    let result = engine
        .run_feed(&loader)
        .with_context(|| format!("processing {}", quotes.display()))?;

    let mut df = result.panel.to_dataframe(view.into())?;
    write_panel(&mut df, output)?;
    info!("Wrote {} panel rows to {}", df.height(), output.display());

    if let Some(path) = diagnostics {
        let json = serde_json::to_string_pretty(&result.diagnostics)?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("Wrote diagnostics to {}", path.display());
    }

    println!("{}", result.diagnostics.summary());
    Ok(())
}

fn cmd_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    println!("{}", config.to_toml_string()?);
    println!(
        "# {} full-view portfolios, {} reduced-view portfolios",
        config.full_view_size(),
        config.reduced_view_size()
    );
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("optfilter=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            quotes,
            config,
            output,
            view,
            strike_divisor,
            diagnostics,
        } => cmd_run(
            &quotes,
            config.as_deref(),
            &output,
            view,
            strike_divisor,
            diagnostics.as_deref(),
        ),
        Commands::CheckConfig { config } => cmd_check_config(&config),
    }
}
