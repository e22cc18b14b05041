//! Quote feed loader.
//!
//! Reads a tabular quote feed (Parquet or CSV) with polars and turns each
//! row into a [`QuoteRecord`]. Every field of a record is optional: a row
//! with a missing value is only rejected later, when it is validated into
//! a [`RawQuote`], so one bad row never sinks the batch.
//!
//! Expected schema, one row per contract per trade date:
//! - date, option_type, strike, expiration (or days_to_maturity)
//! - bid, ask, implied_vol, underlying_level, volume
//!
//! OptionMetrics column names (exdate, cp_flag, best_bid, ...) are accepted
//! as aliases. OptionMetrics quotes `strike_price` x 1000; set
//! [`QuoteFeedLoader::with_strike_divisor`] to 1000 for those feeds.
//!
//! CSV column types are inferred over the whole file, and a value that does
//! not parse under the inferred type is read as missing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Duration, NaiveDate};
use polars::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{OptionType, RawQuote};
use crate::error::PipelineError;

/// Columns that must be present in every feed.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "date",
    "option_type",
    "strike",
    "bid",
    "ask",
    "implied_vol",
    "underlying_level",
    "volume",
];

/// At least one of these identifies the maturity.
pub const MATURITY_COLUMNS: &[&str] = &["expiration", "days_to_maturity"];

/// Vendor column names mapped onto the canonical schema.
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("trade_date", "date"),
    ("exdate", "expiration"),
    ("expir_date", "expiration"),
    ("cp_flag", "option_type"),
    ("strike_price", "strike"),
    ("best_bid", "bid"),
    ("best_offer", "ask"),
    ("impl_volatility", "implied_vol"),
    ("iv", "implied_vol"),
    ("sec_price", "underlying_level"),
    ("close", "underlying_level"),
    ("stock_price", "underlying_level"),
    ("dte", "days_to_maturity"),
];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported feed format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("Strike divisor must be positive and finite, got {0}")]
    InvalidStrikeDivisor(f64),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One feed row before validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub date: Option<NaiveDate>,
    pub option_type: Option<String>,
    pub strike: Option<f64>,
    pub expiration: Option<NaiveDate>,
    pub days_to_maturity: Option<i64>,
    pub bid: Option<f64>,
    pub ask: Option<f64>,
    pub implied_vol: Option<f64>,
    pub underlying_level: Option<f64>,
    pub volume: Option<i64>,
}

impl QuoteRecord {
    /// Validate into an immutable raw quote. `row` is the feed position,
    /// used only for the error message.
    pub fn into_quote(self, row: usize) -> Result<RawQuote, PipelineError> {
        let malformed = |reason: &str| PipelineError::MalformedRow {
            row,
            reason: reason.to_string(),
        };

        let trade_date = self.date.ok_or_else(|| malformed("missing date"))?;
        let option_type = self
            .option_type
            .as_deref()
            .ok_or_else(|| malformed("missing option_type"))
            .and_then(|s| {
                OptionType::from_str(s)
                    .ok_or_else(|| malformed(&format!("unknown option_type {:?}", s)))
            })?;

        let expiration = match (self.expiration, self.days_to_maturity) {
            (Some(exp), _) => exp,
            (None, Some(days)) => Duration::try_days(days)
                .and_then(|d| trade_date.checked_add_signed(d))
                .ok_or_else(|| malformed(&format!("days_to_maturity {} out of range", days)))?,
            (None, None) => return Err(malformed("missing expiration and days_to_maturity")),
        };

        let strike = positive_decimal(self.strike, "strike").map_err(|e| malformed(&e))?;
        let underlying_level =
            positive_decimal(self.underlying_level, "underlying_level").map_err(|e| malformed(&e))?;
        let bid = non_negative_decimal(self.bid, "bid").map_err(|e| malformed(&e))?;
        let ask = non_negative_decimal(self.ask, "ask").map_err(|e| malformed(&e))?;

        // A missing vendor IV is recomputed from the mid price later on.
        let implied_vol = self.implied_vol.filter(|iv| iv.is_finite());
        let volume = self.volume.ok_or_else(|| malformed("missing volume"))?;

        Ok(RawQuote {
            trade_date,
            option_type,
            strike,
            expiration,
            bid,
            ask,
            implied_vol,
            underlying_level,
            volume,
        })
    }
}

fn positive_decimal(value: Option<f64>, field: &str) -> Result<Decimal, String> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => {
            Decimal::from_f64_retain(v).ok_or_else(|| format!("{} out of range", field))
        }
        Some(v) => Err(format!("{} must be positive, got {}", field, v)),
        None => Err(format!("missing {}", field)),
    }
}

fn non_negative_decimal(value: Option<f64>, field: &str) -> Result<Decimal, String> {
    match value {
        Some(v) if v.is_finite() && v >= 0.0 => {
            Decimal::from_f64_retain(v).ok_or_else(|| format!("{} out of range", field))
        }
        Some(v) => Err(format!("{} must be non-negative, got {}", field, v)),
        None => Err(format!("missing {}", field)),
    }
}

/// Loader for a single quote feed file.
pub struct QuoteFeedLoader {
    path: PathBuf,
    strike_divisor: f64,
}

impl QuoteFeedLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            strike_divisor: 1.0,
        }
    }

    /// Divide raw strikes by this factor (OptionMetrics quotes strike x 1000).
    pub fn with_strike_divisor(mut self, divisor: f64) -> Self {
        self.strike_divisor = divisor;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scan the feed lazily, with vendor aliases renamed to the canonical
    /// schema.
    pub fn load_lazy(&self) -> Result<LazyFrame, LoaderError> {
        if !self.path.exists() {
            return Err(LoaderError::FileNotFound(self.path.display().to_string()));
        }

        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let mut lf = match extension.as_str() {
            "parquet" | "pq" => LazyFrame::scan_parquet(&self.path, ScanArgsParquet::default())?,
            "csv" => LazyCsvReader::new(&self.path)
                .with_has_header(true)
                .with_try_parse_dates(true)
                .with_infer_schema_length(None)
                .with_ignore_errors(true)
                .finish()?,
            other => return Err(LoaderError::UnsupportedFormat(other.to_string())),
        };

        let schema = lf.collect_schema()?;
        let present: HashSet<String> = schema.iter_names().map(|n| n.to_string()).collect();

        let (existing, new): (Vec<&str>, Vec<&str>) = COLUMN_ALIASES
            .iter()
            .filter(|(alias, canonical)| present.contains(*alias) && !present.contains(*canonical))
            .map(|(alias, canonical)| (*alias, *canonical))
            .unzip();

        if !existing.is_empty() {
            lf = lf.rename(existing, new, true);
        }

        Ok(lf)
    }

    /// Load the whole feed as a DataFrame.
    pub fn load_dataframe(&self) -> Result<DataFrame, LoaderError> {
        Ok(self.load_lazy()?.collect()?)
    }

    /// Load the feed as unvalidated records.
    pub fn load_records(&self) -> Result<Vec<QuoteRecord>, LoaderError> {
        if !(self.strike_divisor.is_finite() && self.strike_divisor > 0.0) {
            return Err(LoaderError::InvalidStrikeDivisor(self.strike_divisor));
        }

        let df = self.load_dataframe()?;
        let mut records = dataframe_to_records(&df)?;

        if self.strike_divisor != 1.0 {
            for record in &mut records {
                record.strike = record.strike.map(|k| k / self.strike_divisor);
            }
        }

        Ok(records)
    }
}

/// Check that the frame carries every required column.
pub fn check_schema(df: &DataFrame) -> Result<(), LoaderError> {
    let columns: HashSet<String> = df
        .get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect();

    let mut missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !columns.contains(**c))
        .map(|c| c.to_string())
        .collect();

    if !MATURITY_COLUMNS.iter().any(|c| columns.contains(*c)) {
        missing.push(MATURITY_COLUMNS.join("|"));
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(LoaderError::MissingColumns(missing))
    }
}

/// Convert a canonical-schema frame into records, one per row.
pub fn dataframe_to_records(df: &DataFrame) -> Result<Vec<QuoteRecord>, LoaderError> {
    check_schema(df)?;
    let height = df.height();

    let dates = date_values(df, "date")?;
    let option_types = str_values(df, "option_type")?;
    let strikes = f64_values(df, "strike")?;
    let expirations = optional(df, "expiration", date_values)?;
    let days = optional(df, "days_to_maturity", i64_values)?;
    let bids = f64_values(df, "bid")?;
    let asks = f64_values(df, "ask")?;
    let ivs = f64_values(df, "implied_vol")?;
    let levels = f64_values(df, "underlying_level")?;
    let volumes = i64_values(df, "volume")?;

    let records = (0..height)
        .map(|idx| QuoteRecord {
            date: dates[idx],
            option_type: option_types[idx].clone(),
            strike: strikes[idx],
            expiration: expirations.as_ref().and_then(|v| v[idx]),
            days_to_maturity: days.as_ref().and_then(|v| v[idx]),
            bid: bids[idx],
            ask: asks[idx],
            implied_vol: ivs[idx],
            underlying_level: levels[idx],
            volume: volumes[idx],
        })
        .collect();

    Ok(records)
}

fn optional<T>(
    df: &DataFrame,
    name: &str,
    read: fn(&DataFrame, &str) -> Result<Vec<Option<T>>, LoaderError>,
) -> Result<Option<Vec<Option<T>>>, LoaderError> {
    if df.get_column_names().iter().any(|c| c.as_str() == name) {
        Ok(Some(read(df, name)?))
    } else {
        Ok(None)
    }
}

fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Int64)?;
    Ok(column.i64()?.into_iter().collect())
}

fn str_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|s| s.map(|s| s.to_string()))
        .collect())
}

/// Read a date column stored either as polars Date or as ISO strings.
fn date_values(df: &DataFrame, name: &str) -> Result<Vec<Option<NaiveDate>>, LoaderError> {
    let column = df.column(name)?;

    if matches!(column.dtype(), DataType::Date) {
        let days = column.cast(&DataType::Int32)?;
        return Ok(days
            .i32()?
            .into_iter()
            .map(|d| d.and_then(date_from_days))
            .collect());
    }

    let strings = column.cast(&DataType::String)?;
    Ok(strings
        .str()?
        .into_iter()
        .map(|s| s.and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()))
        .collect())
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + 719163)
}
