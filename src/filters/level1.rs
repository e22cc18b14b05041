//! Level 1 filters: duplicates and zero bids.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound::{Excluded, Unbounded};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use super::stage::StageOutcome;
use crate::data::{ContractKey, OptionQuote, OptionType};

/// Keep the first of every set of rows with the same contract and prices.
/// Expects a single trade date.
pub fn drop_identical(day: &[OptionQuote]) -> StageOutcome {
    let mut seen: HashSet<(ContractKey, Decimal, Decimal)> = HashSet::with_capacity(day.len());
    let mut kept = Vec::with_capacity(day.len());

    for quote in day {
        let raw = quote.raw();
        if seen.insert((quote.contract(), raw.bid, raw.ask)) {
            kept.push(quote.clone());
        } else {
            debug!("Identical duplicate {}", quote.log_key());
        }
    }

    StageOutcome::kept(kept)
}

/// Resolve rows quoting the same contract at different prices.
///
/// The survivor is the row whose implied vol is closest to the mean implied
/// vol of the adjacent strikes (same type and expiration). Without any
/// adjacent strike, or on a tie, the first occurrence wins. Expects a single
/// trade date.
pub fn drop_identical_except_price(day: &[OptionQuote]) -> StageOutcome {
    let mut groups: HashMap<ContractKey, Vec<usize>> = HashMap::new();
    let mut smiles: HashMap<(OptionType, NaiveDate), BTreeMap<Decimal, Vec<f64>>> =
        HashMap::new();

    for (i, quote) in day.iter().enumerate() {
        groups.entry(quote.contract()).or_default().push(i);
        if quote.has_implied_vol() {
            smiles
                .entry((quote.option_type(), quote.expiration()))
                .or_default()
                .entry(quote.raw().strike)
                .or_default()
                .push(quote.implied_vol());
        }
    }

    let mut dropped = vec![false; day.len()];
    for (contract, members) in &groups {
        if members.len() < 2 {
            continue;
        }

        let keep = match smiles
            .get(&(contract.option_type, contract.expiration))
            .and_then(|smile| neighbour_iv(smile, contract.strike))
        {
            Some(reference) => closest_to(day, members, reference),
            None => members[0],
        };

        for &i in members {
            if i != keep {
                debug!(
                    "Identical except price {} (kept bid={} ask={})",
                    day[i].log_key(),
                    day[keep].raw().bid,
                    day[keep].raw().ask
                );
                dropped[i] = true;
            }
        }
    }

    StageOutcome::kept(
        day.iter()
            .zip(dropped)
            .filter(|(_, d)| !d)
            .map(|(q, _)| q.clone())
            .collect(),
    )
}

/// Mean implied vol of the nearest lower and higher strikes.
fn neighbour_iv(smile: &BTreeMap<Decimal, Vec<f64>>, strike: Decimal) -> Option<f64> {
    let lower = smile.range(..strike).next_back().map(|(_, ivs)| mean(ivs));
    let higher = smile
        .range((Excluded(strike), Unbounded))
        .next()
        .map(|(_, ivs)| mean(ivs));

    match (lower, higher) {
        (Some(l), Some(h)) => Some((l + h) / 2.0),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Rows without an implied vol yet rank behind every row that has one.
fn closest_to(day: &[OptionQuote], members: &[usize], reference: f64) -> usize {
    let distance_of = |i: usize| {
        if day[i].has_implied_vol() {
            (day[i].implied_vol() - reference).abs()
        } else {
            f64::INFINITY
        }
    };

    let mut best = members[0];
    let mut best_distance = distance_of(best);
    for &i in &members[1..] {
        let distance = distance_of(i);
        if distance < best_distance {
            best = i;
            best_distance = distance;
        }
    }
    best
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn has_positive_bid(quote: &OptionQuote) -> bool {
    quote.raw().bid > Decimal::ZERO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};

    #[test]
    fn test_identical_keeps_one_copy() {
        let q = quote(day(4), OptionType::Call, 100.0, 30, 2.0, 2.2, 0.2);
        let other = quote(day(4), OptionType::Put, 100.0, 30, 2.0, 2.2, 0.2);
        let out = drop_identical(&[q.clone(), other, q.clone(), q]);
        assert_eq!(out.quotes.len(), 2);
        assert_eq!(out.quotes[0].option_type(), OptionType::Call);
    }

    #[test]
    fn test_identical_except_price_picks_smoothest_iv() {
        let quotes = vec![
            quote(day(4), OptionType::Call, 95.0, 30, 6.0, 6.2, 0.22),
            quote(day(4), OptionType::Call, 100.0, 30, 3.0, 3.2, 0.35),
            quote(day(4), OptionType::Call, 100.0, 30, 2.5, 2.7, 0.21),
            quote(day(4), OptionType::Call, 105.0, 30, 1.0, 1.2, 0.20),
        ];
        let out = drop_identical_except_price(&quotes);
        assert_eq!(out.quotes.len(), 3);
        let at_the_money: Vec<_> = out
            .quotes
            .iter()
            .filter(|q| q.strike() == 100.0)
            .collect();
        assert_eq!(at_the_money.len(), 1);
        assert_eq!(at_the_money[0].implied_vol(), 0.21);
    }

    #[test]
    fn test_identical_except_price_without_neighbours_keeps_first() {
        let quotes = vec![
            quote(day(4), OptionType::Put, 100.0, 30, 3.0, 3.2, 0.35),
            quote(day(4), OptionType::Put, 100.0, 30, 2.5, 2.7, 0.21),
        ];
        let out = drop_identical_except_price(&quotes);
        assert_eq!(out.quotes.len(), 1);
        assert_eq!(out.quotes[0].implied_vol(), 0.35);
    }

    #[test]
    fn test_identical_except_price_prefers_rows_with_iv() {
        let quotes = vec![
            quote(day(4), OptionType::Call, 95.0, 30, 6.0, 6.2, 0.22),
            quote(day(4), OptionType::Call, 100.0, 30, 3.0, 3.2, f64::NAN),
            quote(day(4), OptionType::Call, 100.0, 30, 2.5, 2.7, 0.40),
        ];
        let out = drop_identical_except_price(&quotes);
        assert_eq!(out.quotes.len(), 2);
        assert_eq!(out.quotes[1].implied_vol(), 0.40);
    }

    #[test]
    fn test_zero_bid() {
        let zero = quote(day(4), OptionType::Call, 120.0, 30, 0.0, 0.05, 0.3);
        let live = quote(day(4), OptionType::Call, 100.0, 30, 2.0, 2.2, 0.2);
        assert!(!has_positive_bid(&zero));
        assert!(has_positive_bid(&live));
    }
}
