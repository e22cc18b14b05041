//! Level 2 row predicates: maturity, implied vol and moneyness bounds, and
//! the no-arbitrage time value check. Bounds are inclusive.

use crate::data::OptionQuote;

pub fn within_maturity_bounds(quote: &OptionQuote, min_days: i64, max_days: i64) -> bool {
    (min_days..=max_days).contains(&quote.derived.days_to_maturity)
}

/// Quotes still waiting for an inverted IV pass; they are judged on the
/// next pass once the IV is known.
pub fn within_iv_bounds(quote: &OptionQuote, min_iv: f64, max_iv: f64) -> bool {
    if !quote.has_implied_vol() {
        return true;
    }
    let iv = quote.implied_vol();
    iv >= min_iv && iv <= max_iv
}

pub fn within_moneyness_bounds(quote: &OptionQuote, min: f64, max: f64) -> bool {
    let m = quote.derived.moneyness;
    m >= min && m <= max
}

/// A mid below intrinsic value admits no implied volatility.
pub fn has_non_negative_time_value(quote: &OptionQuote) -> bool {
    quote.time_value() >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};
    use crate::data::OptionType;

    #[test]
    fn test_maturity_bounds_are_inclusive() {
        let short = quote(day(1), OptionType::Call, 100.0, 6, 1.0, 1.2, 0.2);
        let edge = quote(day(1), OptionType::Call, 100.0, 7, 1.0, 1.2, 0.2);
        let long = quote(day(1), OptionType::Call, 100.0, 181, 1.0, 1.2, 0.2);
        assert!(!within_maturity_bounds(&short, 7, 180));
        assert!(within_maturity_bounds(&edge, 7, 180));
        assert!(!within_maturity_bounds(&long, 7, 180));
    }

    #[test]
    fn test_iv_and_moneyness_bounds() {
        let low_iv = quote(day(1), OptionType::Put, 100.0, 30, 1.0, 1.2, 0.04);
        let deep = quote(day(1), OptionType::Put, 75.0, 30, 0.1, 0.2, 0.4);
        assert!(!within_iv_bounds(&low_iv, 0.05, 1.0));
        assert!(within_iv_bounds(&deep, 0.05, 1.0));
        assert!(!within_moneyness_bounds(&deep, 0.8, 1.2));
        assert!(within_moneyness_bounds(&low_iv, 0.8, 1.2));

        let blank = quote(day(1), OptionType::Put, 100.0, 30, 1.0, 1.2, f64::NAN);
        assert!(within_iv_bounds(&blank, 0.05, 1.0));
    }

    #[test]
    fn test_negative_time_value() {
        let below_intrinsic = quote(day(1), OptionType::Put, 110.0, 30, 9.0, 9.5, 0.2);
        assert!(!has_non_negative_time_value(&below_intrinsic));
    }
}
