//! Implied volatility recovered from the quoted mid price.
//!
//! Feeds leave the vendor IV blank where the vendor's own solver failed.
//! Those quotes get an IV inverted at their put-call parity rate once the
//! rate is known; quotes whose price no volatility can reproduce are
//! dropped.

use tracing::debug;

use super::black_scholes::BlackScholes;
use crate::config::PipelineConfig;
use crate::data::{IvSource, OptionQuote};
use crate::error::{PipelineError, PipelineResult};

/// Invert the quote's mid price at its resolved implied rate.
pub fn invert_implied_vol(quote: &OptionQuote, day_count: f64) -> PipelineResult<f64> {
    let invalid = |reason: &str| PipelineError::InvalidNumericInput {
        key: quote.log_key(),
        reason: reason.to_string(),
    };

    let rate = quote
        .derived
        .implied_rate
        .ok_or_else(|| invalid("no implied rate"))?;

    BlackScholes::new(rate)
        .implied_vol(
            quote.spot(),
            quote.strike(),
            quote.years_to_maturity(day_count),
            quote.derived.mid_price,
            quote.option_type(),
        )
        .ok_or_else(|| invalid("mid price admits no implied volatility"))
}

/// Fill in the implied volatility of every quote that lacks one. Returns
/// the kept quotes and how many were filled.
pub fn fill_missing_implied_vols(
    quotes: &[OptionQuote],
    config: &PipelineConfig,
) -> (Vec<OptionQuote>, usize) {
    let mut filled = 0;
    let kept = quotes
        .iter()
        .filter_map(|quote| {
            if quote.has_implied_vol() {
                return Some(quote.clone());
            }
            match invert_implied_vol(quote, config.day_count) {
                Ok(iv) => {
                    let mut quote = quote.clone();
                    quote.set_implied_vol(iv, IvSource::Inverted);
                    filled += 1;
                    Some(quote)
                }
                Err(e) => {
                    debug!("{}", e);
                    None
                }
            }
        })
        .collect();
    (kept, filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};
    use crate::data::OptionType;
    use approx::assert_relative_eq;

    fn with_rate(mut quote: OptionQuote, rate: f64) -> OptionQuote {
        quote.derived.implied_rate = Some(rate);
        quote
    }

    #[test]
    fn test_missing_iv_is_recovered_from_price() {
        let config = PipelineConfig::default();
        let price = BlackScholes::new(0.02).put_price(100.0, 95.0, 45.0 / 365.0, 0.27);
        let blank = with_rate(
            quote(day(4), OptionType::Put, 95.0, 45, price, price, f64::NAN),
            0.02,
        );
        let vendor = with_rate(quote(day(4), OptionType::Call, 100.0, 45, 2.0, 2.1, 0.2), 0.02);

        let (kept, filled) = fill_missing_implied_vols(&[blank, vendor], &config);
        assert_eq!(kept.len(), 2);
        assert_eq!(filled, 1);

        assert_relative_eq!(kept[0].implied_vol(), 0.27, epsilon = 1e-6);
        assert_relative_eq!(kept[0].derived.log_iv, 0.27f64.ln(), epsilon = 1e-5);
        assert_eq!(kept[0].derived.iv_source, Some(IvSource::Inverted));
        assert_eq!(kept[0].raw().implied_vol, None);
        assert_eq!(kept[1].derived.iv_source, Some(IvSource::Vendor));
    }

    #[test]
    fn test_unreachable_price_is_dropped() {
        let config = PipelineConfig::default();
        // Call priced below its intrinsic value.
        let blank = with_rate(
            quote(day(4), OptionType::Call, 80.0, 30, 5.0, 5.2, f64::NAN),
            0.02,
        );
        let no_rate = quote(day(4), OptionType::Call, 100.0, 30, 2.0, 2.1, f64::NAN);

        let (kept, filled) = fill_missing_implied_vols(&[blank, no_rate], &config);
        assert!(kept.is_empty());
        assert_eq!(filled, 0);
    }
}
