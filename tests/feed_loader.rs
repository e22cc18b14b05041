//! Feed files through the loader and the whole engine.

mod common;

use std::fmt::Write as _;

use rust_decimal::Decimal;

use optfilter::{PanelView, PipelineConfig, PipelineError, PortfolioEngine, QuoteFeedLoader};

use common::clean_market;

/// The clean market as an OptionMetrics-style CSV, strikes multiplied by
/// `strike_scale`.
fn market_csv(strike_scale: i64) -> String {
    let mut csv = String::from("date,exdate,cp_flag,strike_price,best_bid,best_offer,impl_volatility,sec_price,volume\n");
    for q in clean_market() {
        let raw = q.raw();
        writeln!(
            csv,
            "{},{},{},{},{},{},{},{},{}",
            raw.trade_date,
            raw.expiration,
            raw.option_type,
            raw.strike * Decimal::from(strike_scale),
            raw.bid,
            raw.ask,
            raw.implied_vol.map(|iv| iv.to_string()).unwrap_or_default(),
            raw.underlying_level,
            raw.volume
        )
        .unwrap();
    }
    // A row missing its bid.
    writeln!(csv, "2024-02-27,2024-03-28,C,{},,1.0,0.2,100,5", 100 * strike_scale).unwrap();
    csv
}

#[test]
fn e2e_csv_feed_produces_panel() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("quotes.csv");
    std::fs::write(&path, market_csv(1)).unwrap();

    let engine = PortfolioEngine::new(PipelineConfig::default()).unwrap();
    let output = engine.run_file(&path).unwrap();

    assert_eq!(output.diagnostics.input_rows, clean_market().len() + 1);
    assert_eq!(output.diagnostics.malformed_rows, 1);
    assert!(!output.panel.full.is_empty());
    assert!(!output.panel.reduced.is_empty());

    let df = output.panel.to_dataframe(PanelView::Reduced).unwrap();
    assert_eq!(df.height(), output.panel.reduced.len());
}

#[test]
fn e2e_scaled_strikes_with_divisor() {
    let dir = tempfile::tempdir().unwrap();
    let plain = dir.path().join("plain.csv");
    let scaled = dir.path().join("scaled.csv");
    std::fs::write(&plain, market_csv(1)).unwrap();
    std::fs::write(&scaled, market_csv(1000)).unwrap();

    let engine = PortfolioEngine::new(PipelineConfig::default()).unwrap();
    let expected = engine.run_file(&plain).unwrap();
    let output = engine
        .run_feed(&QuoteFeedLoader::new(&scaled).with_strike_divisor(1000.0))
        .unwrap();

    assert_eq!(output.diagnostics.malformed_rows, 1);
    assert_eq!(output.quotes.len(), expected.quotes.len());
    assert!(output.quotes.iter().all(|q| (86.0..=116.0).contains(&q.strike())));
    assert_eq!(output.panel.reduced.len(), expected.panel.reduced.len());

    // Read unscaled, every strike sits far outside the moneyness bounds.
    let unscaled = engine.run_file(&scaled).unwrap();
    assert!(unscaled.quotes.is_empty());
}

#[test]
fn e2e_missing_file_is_a_loader_error() {
    let engine = PortfolioEngine::new(PipelineConfig::default()).unwrap();
    let result = engine.run_file("does/not/exist.parquet");
    assert!(matches!(result, Err(PipelineError::Loader(_))));
}

#[test]
fn e2e_shipped_config_matches_defaults() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let config = PipelineConfig::from_toml_file(path).unwrap();
    assert_eq!(config, PipelineConfig::default());
}
