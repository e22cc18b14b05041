//! Put-call parity implied interest rates.
//!
//! Two passes. Pass 1 runs per trade date in parallel: near-the-money
//! call/put pairs give direct parity rates, and their non-negative values
//! are reduced to a median per (date, days to maturity). Pass 2 runs once
//! over the completed median table and fills maturities that had no
//! near-the-money pair: linearly in days to maturity along the date's own
//! median curve, otherwise from the nearest dates whose curves cover that
//! maturity, linearly in calendar days between them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use chrono::NaiveDate;
use rayon::prelude::*;
use rust_decimal::Decimal;
use tracing::debug;

use super::stage::StageOutcome;
use crate::config::PipelineConfig;
use crate::data::{partition_by_date, OptionQuote, OptionType, RateSource};

type MaturityKey = (NaiveDate, i64);

/// Median rate by days to maturity for one trade date.
type RateCurve = BTreeMap<i64, f64>;

/// Continuously compounded rate implied by C - P = S - K e^(-rT).
///
/// Returns `None` when the discounted strike is non-positive or T is not
/// positive.
pub fn parity_rate(spot: f64, strike: f64, call_mid: f64, put_mid: f64, t_years: f64) -> Option<f64> {
    let discounted_strike = spot - call_mid + put_mid;
    if !(t_years > 0.0 && discounted_strike > 0.0 && strike > 0.0) {
        return None;
    }
    let rate = (strike / discounted_strike).ln() / t_years;
    rate.is_finite().then_some(rate)
}

/// Index pairs (call, put) quoting the same strike and expiration on one
/// trade date. The first occurrence of each leg is used; pairs come back in
/// call order.
pub fn pair_legs(day: &[OptionQuote]) -> Vec<(usize, usize)> {
    let mut legs: HashMap<(Decimal, NaiveDate), (Option<usize>, Option<usize>)> = HashMap::new();
    for (i, quote) in day.iter().enumerate() {
        let entry = legs
            .entry((quote.raw().strike, quote.expiration()))
            .or_default();
        match quote.option_type() {
            OptionType::Call => {
                entry.0.get_or_insert(i);
            }
            OptionType::Put => {
                entry.1.get_or_insert(i);
            }
        }
    }

    let mut pairs: Vec<(usize, usize)> = legs
        .into_values()
        .filter_map(|(call, put)| Some((call?, put?)))
        .collect();
    pairs.sort_unstable();
    pairs
}

/// Pair rate for two legs on the same date.
pub fn leg_pair_rate(call: &OptionQuote, put: &OptionQuote, day_count: f64) -> Option<f64> {
    parity_rate(
        call.spot(),
        call.strike(),
        call.derived.mid_price,
        put.derived.mid_price,
        call.years_to_maturity(day_count),
    )
}

/// Direct rates and maturity medians for one trade date.
#[derive(Debug, Default)]
struct DayRates {
    /// Aligned with the day's quotes.
    direct: Vec<Option<f64>>,
    medians: BTreeMap<i64, f64>,
}

/// Assigns every quote an implied rate, or drops it.
pub struct ImpliedRateResolver<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ImpliedRateResolver<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn is_near_money(&self, quote: &OptionQuote) -> bool {
        let f = &self.config.filters;
        let m = quote.derived.moneyness;
        m >= f.near_money_lower && m <= f.near_money_upper
    }

    /// Pass 1 for one date.
    fn day_rates(&self, day: &[OptionQuote]) -> DayRates {
        let mut direct = vec![None; day.len()];
        let mut by_maturity: BTreeMap<i64, Vec<f64>> = BTreeMap::new();

        for (c, p) in pair_legs(day) {
            let (call, put) = (&day[c], &day[p]);
            if call.derived.implied_rate.is_some() || put.derived.implied_rate.is_some() {
                continue;
            }
            if !self.is_near_money(call) {
                continue;
            }
            let Some(rate) = leg_pair_rate(call, put, self.config.day_count) else {
                continue;
            };

            direct[c] = Some(rate);
            direct[p] = Some(rate);
            if rate >= 0.0 {
                by_maturity
                    .entry(call.derived.days_to_maturity)
                    .or_default()
                    .push(rate);
            }
        }

        let medians = by_maturity
            .into_iter()
            .map(|(dtm, mut rates)| (dtm, median(&mut rates)))
            .collect();

        DayRates { direct, medians }
    }

    /// Resolve rates for every quote lacking one. Quotes that already carry
    /// a rate pass through untouched.
    pub fn resolve(&self, quotes: &[OptionQuote]) -> StageOutcome {
        let days: Vec<(NaiveDate, Vec<OptionQuote>)> = partition_by_date(quotes).into_iter().collect();

        // Pass 1
        let day_rates: Vec<DayRates> = days.par_iter().map(|(_, day)| self.day_rates(day)).collect();

        let mut medians: BTreeMap<MaturityKey, f64> = BTreeMap::new();
        let mut wanted: BTreeSet<MaturityKey> = BTreeSet::new();
        for ((date, day), rates) in days.iter().zip(&day_rates) {
            for (dtm, rate) in &rates.medians {
                medians.insert((*date, *dtm), *rate);
            }
            for quote in day.iter().filter(|q| q.derived.implied_rate.is_none()) {
                wanted.insert((*date, quote.derived.days_to_maturity));
            }
        }

        // Pass 2
        let curve = interpolate_rates(&medians, &wanted);

        let mut outcome = StageOutcome::default();
        for ((_, day), rates) in days.into_iter().zip(day_rates) {
            for (mut quote, direct) in day.into_iter().zip(rates.direct) {
                if quote.derived.implied_rate.is_some() {
                    outcome.quotes.push(quote);
                    continue;
                }

                let key = (quote.trade_date(), quote.derived.days_to_maturity);
                let resolved = match direct {
                    Some(rate) => Some((rate, RateSource::Direct)),
                    None => curve.get(&key).copied(),
                };

                match resolved {
                    Some((rate, source)) if rate >= 0.0 => {
                        quote.derived.implied_rate = Some(rate);
                        quote.derived.rate_source = Some(source);
                        outcome.repaired += 1;
                        outcome.quotes.push(quote);
                    }
                    Some((rate, _)) => {
                        debug!("Negative implied rate {:.5} for {}", rate, quote.log_key());
                    }
                    None => {
                        debug!("No implied rate for {}", quote.log_key());
                    }
                }
            }
        }

        outcome
    }

    pub fn apply(&self, quotes: &[OptionQuote]) -> StageOutcome {
        if quotes.iter().all(|q| q.derived.implied_rate.is_some()) {
            return StageOutcome::kept(quotes.to_vec());
        }
        self.resolve(quotes)
    }
}

/// Rate for every wanted key: the median where one exists, otherwise
/// [`curve_rate`] over the per-date median curves.
fn interpolate_rates(
    medians: &BTreeMap<MaturityKey, f64>,
    wanted: &BTreeSet<MaturityKey>,
) -> HashMap<MaturityKey, (f64, RateSource)> {
    let mut curves: BTreeMap<NaiveDate, RateCurve> = BTreeMap::new();
    for (&(date, dtm), &rate) in medians {
        curves.entry(date).or_default().insert(dtm, rate);
    }

    let mut resolved = HashMap::with_capacity(wanted.len());
    for &key in wanted {
        let entry = match medians.get(&key) {
            Some(&rate) => (rate, RateSource::MaturityMedian),
            None => match curve_rate(&curves, key) {
                Some(rate) => (rate, RateSource::Interpolated),
                None => continue,
            },
        };
        resolved.insert(key, entry);
    }
    resolved
}

/// Rate at `dtm` on `date`, trying in order:
/// 1. the date's own curve, linear between the maturities around `dtm`;
/// 2. the nearest earlier and later dates whose curves span `dtm`;
/// 3. the date's own curve held flat beyond its ends;
/// 4. the nearest earlier and later dates with any curve, held flat.
///
/// Steps 2 and 4 interpolate linearly in calendar days between the two
/// dates, or take the one side that exists.
fn curve_rate(curves: &BTreeMap<NaiveDate, RateCurve>, (date, dtm): MaturityKey) -> Option<f64> {
    let own = curves.get(&date);
    own.and_then(|c| spanned(c, dtm))
        .or_else(|| across_dates(curves, date, |c| spanned(c, dtm)))
        .or_else(|| own.and_then(|c| held_flat(c, dtm)))
        .or_else(|| across_dates(curves, date, |c| held_flat(c, dtm)))
}

/// Linear in days to maturity; `None` outside the curve's maturities.
fn spanned(curve: &RateCurve, dtm: i64) -> Option<f64> {
    let (&lo, &lo_rate) = curve.range(..=dtm).next_back()?;
    let (&hi, &hi_rate) = curve.range(dtm..).next()?;
    if lo == hi {
        return Some(lo_rate);
    }
    let w = (dtm - lo) as f64 / (hi - lo) as f64;
    Some(lo_rate + w * (hi_rate - lo_rate))
}

fn held_flat(curve: &RateCurve, dtm: i64) -> Option<f64> {
    spanned(curve, dtm).or_else(|| {
        let (&first, &first_rate) = curve.first_key_value()?;
        let (_, &last_rate) = curve.last_key_value()?;
        Some(if dtm < first { first_rate } else { last_rate })
    })
}

fn across_dates(
    curves: &BTreeMap<NaiveDate, RateCurve>,
    date: NaiveDate,
    eval: impl Fn(&RateCurve) -> Option<f64>,
) -> Option<f64> {
    let before = curves
        .range(..date)
        .rev()
        .find_map(|(d, c)| eval(c).map(|rate| (*d, rate)));
    let after = curves
        .range((Bound::Excluded(date), Bound::Unbounded))
        .find_map(|(d, c)| eval(c).map(|rate| (*d, rate)));

    match (before, after) {
        (Some((d0, r0)), Some((d1, r1))) => {
            let w = (date - d0).num_days() as f64 / (d1 - d0).num_days() as f64;
            Some(r0 + w * (r1 - r0))
        }
        (Some((_, rate)), None) | (None, Some((_, rate))) => Some(rate),
        (None, None) => None,
    }
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}
