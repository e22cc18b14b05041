//! Core quote types for the filtration pipeline.
//!
//! A quote is split into the raw vendor fields, which are fixed once the row
//! has been validated, and the derived fields that pipeline stages append.
//! Stages never rewrite raw data, so every drop decision can be traced back
//! to the values that came off the feed.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "C",
            Self::Put => "P",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a quote's implied interest rate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    /// Put-call parity on the quote's own near-the-money pair.
    Direct,
    /// Median of the near-the-money parity rates for the same maturity.
    MaturityMedian,
    /// Linear interpolation over neighbouring maturity medians.
    Interpolated,
}

/// Where a quote's implied volatility came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IvSource {
    /// Delivered with the quote.
    Vendor,
    /// Inverted from the mid price at the quote's implied rate.
    Inverted,
}

/// Raw option record as delivered by the quote feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawQuote {
    /// Trade date of the quote
    pub trade_date: NaiveDate,

    /// Option type (call or put)
    pub option_type: OptionType,

    /// Strike price
    pub strike: Decimal,

    /// Option expiration date
    pub expiration: NaiveDate,

    /// Best bid
    pub bid: Decimal,

    /// Best offer
    pub ask: Decimal,

    /// Vendor implied volatility, absent when the vendor could not compute one
    pub implied_vol: Option<f64>,

    /// Underlying index level at quote time
    pub underlying_level: Decimal,

    /// Trading volume
    pub volume: i64,
}

/// Fields appended by the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFields {
    /// Strike divided by underlying level.
    pub moneyness: f64,
    /// Calendar days between trade date and expiration.
    pub days_to_maturity: i64,
    /// Bid-ask midpoint.
    pub mid_price: f64,
    /// Implied volatility used by the filters: the vendor value, or the
    /// inverted one when the vendor had none. NaN until known.
    pub implied_vol: f64,
    pub iv_source: Option<IvSource>,
    /// Natural log of `implied_vol`.
    pub log_iv: f64,

    pub implied_rate: Option<f64>,
    pub rate_source: Option<RateSource>,

    /// Quadratic smile fit of log-IV at this quote's moneyness.
    pub fitted_log_iv: Option<f64>,
    /// log_iv minus fitted_log_iv.
    pub iv_residual: Option<f64>,

    /// Rate implied by the quote's put-call pair, when it has one.
    pub parity_rate: Option<f64>,

    pub theoretical_price: Option<f64>,
    pub delta: Option<f64>,
    pub elasticity: Option<f64>,

    /// Mid-price return from this quote's date to `return_date`.
    pub daily_return: Option<f64>,
    /// Next trading date on which the contract was observed.
    pub return_date: Option<NaiveDate>,
    /// daily_return divided by elasticity.
    pub leverage_adjusted_return: Option<f64>,
}

/// Identity of a listed contract independent of the trade date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    pub option_type: OptionType,
    pub strike: Decimal,
    pub expiration: NaiveDate,
}

impl fmt::Display for ContractKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} K={} exp={}", self.option_type, self.strike, self.expiration)
    }
}

/// A single option quote moving through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    raw: RawQuote,
    pub derived: DerivedFields,
}

impl OptionQuote {
    /// Wrap a validated raw record and compute the base derived fields.
    pub fn new(raw: RawQuote) -> Self {
        let strike = decimal_to_f64(raw.strike);
        let spot = decimal_to_f64(raw.underlying_level);
        let moneyness = if spot > 0.0 { strike / spot } else { f64::NAN };
        let days_to_maturity = (raw.expiration - raw.trade_date).num_days();
        let mid_price = (decimal_to_f64(raw.bid) + decimal_to_f64(raw.ask)) / 2.0;
        let vendor_iv = raw.implied_vol.filter(|iv| iv.is_finite() && *iv > 0.0);

        let mut quote = Self {
            raw,
            derived: DerivedFields {
                moneyness,
                days_to_maturity,
                mid_price,
                ..Default::default()
            },
        };
        match vendor_iv {
            Some(iv) => quote.set_implied_vol(iv, IvSource::Vendor),
            None => {
                quote.derived.implied_vol = f64::NAN;
                quote.derived.log_iv = f64::NAN;
            }
        }
        quote
    }

    pub(crate) fn set_implied_vol(&mut self, iv: f64, source: IvSource) {
        self.derived.implied_vol = iv;
        self.derived.log_iv = iv.ln();
        self.derived.iv_source = Some(source);
    }

    /// Whether the quote carries a usable implied volatility yet.
    pub fn has_implied_vol(&self) -> bool {
        self.derived.implied_vol.is_finite() && self.derived.implied_vol > 0.0
    }

    /// Raw vendor fields. There is no mutable accessor.
    pub fn raw(&self) -> &RawQuote {
        &self.raw
    }

    pub fn trade_date(&self) -> NaiveDate {
        self.raw.trade_date
    }

    pub fn option_type(&self) -> OptionType {
        self.raw.option_type
    }

    pub fn expiration(&self) -> NaiveDate {
        self.raw.expiration
    }

    pub fn strike(&self) -> f64 {
        decimal_to_f64(self.raw.strike)
    }

    pub fn spot(&self) -> f64 {
        decimal_to_f64(self.raw.underlying_level)
    }

    pub fn implied_vol(&self) -> f64 {
        self.derived.implied_vol
    }

    pub fn contract(&self) -> ContractKey {
        ContractKey {
            option_type: self.raw.option_type,
            strike: self.raw.strike,
            expiration: self.raw.expiration,
        }
    }

    /// Time to expiration in years on the given day-count basis.
    pub fn years_to_maturity(&self, day_count: f64) -> f64 {
        self.derived.days_to_maturity as f64 / day_count
    }

    /// Price minus intrinsic value, using the bid-ask midpoint.
    pub fn time_value(&self) -> f64 {
        let intrinsic = match self.raw.option_type {
            OptionType::Call => (self.spot() - self.strike()).max(0.0),
            OptionType::Put => (self.strike() - self.spot()).max(0.0),
        };
        self.derived.mid_price - intrinsic
    }

    /// Key used in log lines and error messages.
    pub fn log_key(&self) -> String {
        format!("{} {}", self.raw.trade_date, self.contract())
    }
}

/// Lossy conversion used for all floating point math on prices.
pub fn decimal_to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(f64::NAN)
}

/// Group quotes into per-date cross-sections, preserving input order
/// within each date.
pub fn partition_by_date(quotes: &[OptionQuote]) -> BTreeMap<NaiveDate, Vec<OptionQuote>> {
    let mut by_date: BTreeMap<NaiveDate, Vec<OptionQuote>> = BTreeMap::new();
    for quote in quotes {
        by_date
            .entry(quote.trade_date())
            .or_default()
            .push(quote.clone());
    }
    by_date
}


#[cfg(test)]
mod tests {
    use super::fixtures::{day, quote};
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_option_type_parsing() {
        assert_eq!(OptionType::from_str("C"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("P"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("call"), Some(OptionType::Call));
        assert_eq!(OptionType::from_str("PUT"), Some(OptionType::Put));
        assert_eq!(OptionType::from_str("X"), None);
    }

    #[test]
    fn test_base_derived_fields() {
        let q = quote(day(1), OptionType::Call, 105.0, 30, 1.0, 1.2, 0.2);
        assert_relative_eq!(q.derived.moneyness, 1.05, epsilon = 1e-12);
        assert_eq!(q.derived.days_to_maturity, 30);
        assert_relative_eq!(q.derived.mid_price, 1.1, epsilon = 1e-12);
        assert_relative_eq!(q.derived.log_iv, 0.2f64.ln(), epsilon = 1e-12);
        assert!(q.derived.implied_rate.is_none());
        assert_eq!(q.derived.iv_source, Some(IvSource::Vendor));
    }

    #[test]
    fn test_missing_vendor_iv_is_unknown() {
        let q = quote(day(1), OptionType::Call, 105.0, 30, 1.0, 1.2, f64::NAN);
        assert!(!q.has_implied_vol());
        assert!(q.derived.log_iv.is_nan());
        assert_eq!(q.derived.iv_source, None);
    }

    #[test]
    fn test_time_value() {
        // ITM put, K=110, S=100: intrinsic 10
        let q = quote(day(1), OptionType::Put, 110.0, 30, 9.0, 9.5, 0.2);
        assert_relative_eq!(q.time_value(), -0.75, epsilon = 1e-12);

        let q = quote(day(1), OptionType::Call, 90.0, 30, 10.5, 11.0, 0.2);
        assert_relative_eq!(q.time_value(), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_partition_by_date_orders_dates() {
        let quotes = vec![
            quote(day(5), OptionType::Call, 100.0, 30, 1.0, 1.2, 0.2),
            quote(day(4), OptionType::Call, 100.0, 30, 1.0, 1.2, 0.2),
            quote(day(5), OptionType::Put, 100.0, 30, 1.0, 1.2, 0.2),
        ];
        let parts = partition_by_date(&quotes);
        let dates: Vec<_> = parts.keys().copied().collect();
        assert_eq!(dates, vec![day(4), day(5)]);
        assert_eq!(parts[&day(5)][0].option_type(), OptionType::Call);
        assert_eq!(parts[&day(5)][1].option_type(), OptionType::Put);
    }
}
