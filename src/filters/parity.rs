//! Put-call parity outlier filter.
//!
//! Calls and puts sharing a strike and expiration on a trade date imply an
//! interest rate through parity. Pairs whose rate sits further than
//! `parity_max_deviation` from that date's median pair rate lose both legs.
//! Quotes without a partner are kept.

use tracing::debug;

use super::implied_rate::{leg_pair_rate, pair_legs};
use super::stage::StageOutcome;
use crate::config::PipelineConfig;
use crate::data::OptionQuote;

/// Run the parity filter over one trade date.
pub fn filter_date(day: &[OptionQuote], config: &PipelineConfig) -> StageOutcome {
    let pairs: Vec<((usize, usize), Option<f64>)> = pair_legs(day)
        .into_iter()
        .map(|(c, p)| ((c, p), leg_pair_rate(&day[c], &day[p], config.day_count)))
        .collect();

    let mut rates: Vec<f64> = pairs.iter().filter_map(|(_, rate)| *rate).collect();
    rates.sort_by(|a, b| a.total_cmp(b));
    let daily_median = match rates.len() {
        0 => None,
        n if n % 2 == 1 => Some(rates[n / 2]),
        n => Some((rates[n / 2 - 1] + rates[n / 2]) / 2.0),
    };

    let mut quotes = day.to_vec();
    let mut dropped = vec![false; day.len()];
    let mut outcome = StageOutcome::default();

    for ((c, p), rate) in pairs {
        let keep = match (rate, daily_median) {
            (Some(r), Some(median)) => (r - median).abs() <= config.filters.parity_max_deviation,
            _ => false,
        };

        if keep {
            quotes[c].derived.parity_rate = rate;
            quotes[p].derived.parity_rate = rate;
            outcome.repaired += 2;
        } else {
            debug!(
                "Parity outlier {} / put leg (rate={:?}, median={:?})",
                day[c].log_key(),
                rate,
                daily_median
            );
            dropped[c] = true;
            dropped[p] = true;
        }
    }

    outcome.quotes = quotes
        .into_iter()
        .zip(dropped)
        .filter(|(_, d)| !d)
        .map(|(q, _)| q)
        .collect();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};
    use crate::data::OptionType;
    use crate::pricing::BlackScholes;
    use approx::assert_relative_eq;

    fn pair(strike: f64, rate: f64) -> Vec<OptionQuote> {
        let bs = BlackScholes::new(rate);
        let t = 30.0 / 365.0;
        let c = bs.call_price(100.0, strike, t, 0.2);
        let p = bs.put_price(100.0, strike, t, 0.2);
        vec![
            quote(day(4), OptionType::Call, strike, 30, c, c, 0.2),
            quote(day(4), OptionType::Put, strike, 30, p, p, 0.2),
        ]
    }

    #[test]
    fn test_off_median_pair_is_dropped() {
        let config = PipelineConfig::default();
        let mut day_quotes = Vec::new();
        day_quotes.extend(pair(95.0, 0.01));
        day_quotes.extend(pair(100.0, 0.01));
        day_quotes.extend(pair(105.0, 0.012));
        day_quotes.extend(pair(110.0, 0.20));
        // Unpaired call survives.
        day_quotes.push(quote(day(4), OptionType::Call, 115.0, 30, 0.1, 0.12, 0.25));

        let out = filter_date(&day_quotes, &config);
        assert_eq!(out.quotes.len(), 7);
        assert!(out.quotes.iter().all(|q| q.strike() != 110.0));

        let atm = out.quotes.iter().find(|q| q.strike() == 100.0).unwrap();
        assert_relative_eq!(atm.derived.parity_rate.unwrap(), 0.01, epsilon = 1e-9);
        let lone = out.quotes.iter().find(|q| q.strike() == 115.0).unwrap();
        assert!(lone.derived.parity_rate.is_none());
    }

    #[test]
    fn test_consistent_pairs_all_kept() {
        let config = PipelineConfig::default();
        let mut day_quotes = pair(95.0, 0.02);
        day_quotes.extend(pair(105.0, 0.02));
        let out = filter_date(&day_quotes, &config);
        assert_eq!(out.quotes.len(), 4);
        assert_eq!(out.repaired, 4);
    }
}
