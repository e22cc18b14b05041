//! Named filter stages and their fixed order.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{implied_rate, level1, level2, parity, surface};
use crate::config::PipelineConfig;
use crate::data::{partition_by_date, OptionQuote};
use crate::pricing::fill_missing_implied_vols;

/// One step of the filtration methodology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    Identical,
    IdenticalExceptPrice,
    ZeroBid,
    MaturityBounds,
    ImpliedVolBounds,
    MoneynessBounds,
    ImpliedRate,
    NegativeTimeValue,
    ImpliedVolInversion,
    SurfaceFit,
    PutCallParity,
}

/// Output of a single stage.
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    pub quotes: Vec<OptionQuote>,
    /// Rows whose derived fields were filled in or recomputed.
    pub repaired: usize,
    /// Groups too sparse to judge.
    pub insufficient: usize,
}

impl StageOutcome {
    pub fn kept(quotes: Vec<OptionQuote>) -> Self {
        Self {
            quotes,
            ..Default::default()
        }
    }
}

impl FilterStage {
    /// All stages in methodology order. This is the order a pipeline runs
    /// unless it is given another.
    pub const ALL: [FilterStage; 11] = [
        FilterStage::Identical,
        FilterStage::IdenticalExceptPrice,
        FilterStage::ZeroBid,
        FilterStage::MaturityBounds,
        FilterStage::ImpliedVolBounds,
        FilterStage::MoneynessBounds,
        FilterStage::ImpliedRate,
        FilterStage::NegativeTimeValue,
        FilterStage::ImpliedVolInversion,
        FilterStage::SurfaceFit,
        FilterStage::PutCallParity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identical => "identical",
            Self::IdenticalExceptPrice => "identical_except_price",
            Self::ZeroBid => "zero_bid",
            Self::MaturityBounds => "maturity_bounds",
            Self::ImpliedVolBounds => "implied_vol_bounds",
            Self::MoneynessBounds => "moneyness_bounds",
            Self::ImpliedRate => "implied_rate",
            Self::NegativeTimeValue => "negative_time_value",
            Self::ImpliedVolInversion => "implied_vol_inversion",
            Self::SurfaceFit => "surface_fit",
            Self::PutCallParity => "put_call_parity",
        }
    }

    /// Methodology level: 1 for raw data hygiene, 2 for bounds and
    /// arbitrage checks, 3 for the cross-sectional outlier filters.
    pub fn level(&self) -> u8 {
        match self {
            Self::Identical | Self::IdenticalExceptPrice | Self::ZeroBid => 1,
            Self::MaturityBounds
            | Self::ImpliedVolBounds
            | Self::MoneynessBounds
            | Self::ImpliedRate
            | Self::NegativeTimeValue
            | Self::ImpliedVolInversion => 2,
            Self::SurfaceFit | Self::PutCallParity => 3,
        }
    }

    /// Run the stage. The input is never modified; an empty input gives an
    /// empty output.
    pub fn apply(&self, quotes: &[OptionQuote], config: &PipelineConfig) -> StageOutcome {
        if quotes.is_empty() {
            return StageOutcome::default();
        }

        let f = &config.filters;
        match self {
            Self::Identical => per_date(quotes, level1::drop_identical),
            Self::IdenticalExceptPrice => per_date(quotes, level1::drop_identical_except_price),
            Self::ZeroBid => retain(quotes, level1::has_positive_bid),
            Self::MaturityBounds => retain(quotes, |q| {
                level2::within_maturity_bounds(q, f.min_days_to_maturity, f.max_days_to_maturity)
            }),
            Self::ImpliedVolBounds => retain(quotes, |q| {
                level2::within_iv_bounds(q, f.min_implied_vol, f.max_implied_vol)
            }),
            Self::MoneynessBounds => retain(quotes, |q| {
                level2::within_moneyness_bounds(q, f.min_moneyness, f.max_moneyness)
            }),
            Self::ImpliedRate => implied_rate::ImpliedRateResolver::new(config).apply(quotes),
            Self::NegativeTimeValue => retain(quotes, level2::has_non_negative_time_value),
            Self::ImpliedVolInversion => {
                let (quotes, filled) = fill_missing_implied_vols(quotes, config);
                StageOutcome {
                    quotes,
                    repaired: filled,
                    insufficient: 0,
                }
            }
            Self::SurfaceFit => {
                let fitter = surface::SurfaceFitter::new(config);
                per_date(quotes, |day| fitter.filter_date(day))
            }
            Self::PutCallParity => per_date(quotes, |day| parity::filter_date(day, config)),
        }
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Keep the quotes matching a row-local predicate.
fn retain<P>(quotes: &[OptionQuote], keep: P) -> StageOutcome
where
    P: Fn(&OptionQuote) -> bool,
{
    StageOutcome::kept(quotes.iter().filter(|q| keep(q)).cloned().collect())
}

/// Run a date-local stage on every trade date in parallel and reassemble
/// the results in ascending date order.
pub(crate) fn per_date<F>(quotes: &[OptionQuote], stage: F) -> StageOutcome
where
    F: Fn(&[OptionQuote]) -> StageOutcome + Sync,
{
    let days: Vec<Vec<OptionQuote>> = partition_by_date(quotes).into_values().collect();

    let outcomes: Vec<StageOutcome> = days.par_iter().map(|day| stage(day)).collect();

    let mut merged = StageOutcome::default();
    for outcome in outcomes {
        merged.quotes.extend(outcome.quotes);
        merged.repaired += outcome.repaired;
        merged.insufficient += outcome.insufficient;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::fixtures::{day, quote};
    use crate::data::OptionType;

    #[test]
    fn test_stage_order_and_levels() {
        assert_eq!(FilterStage::ALL[0], FilterStage::Identical);
        assert_eq!(FilterStage::ALL[10], FilterStage::PutCallParity);
        assert!(FilterStage::ALL.windows(2).all(|w| w[0] < w[1]));

        let levels: Vec<u8> = FilterStage::ALL.iter().map(|s| s.level()).collect();
        assert_eq!(levels, vec![1, 1, 1, 2, 2, 2, 2, 2, 2, 3, 3]);
    }

    #[test]
    fn test_empty_input_gives_empty_output() {
        let config = PipelineConfig::default();
        for stage in FilterStage::ALL {
            let outcome = stage.apply(&[], &config);
            assert!(outcome.quotes.is_empty(), "{} produced rows", stage);
        }
    }

    #[test]
    fn test_per_date_orders_by_date() {
        let quotes = vec![
            quote(day(6), OptionType::Call, 100.0, 30, 1.0, 1.2, 0.2),
            quote(day(4), OptionType::Call, 100.0, 30, 1.0, 1.2, 0.2),
        ];
        let outcome = per_date(&quotes, |d| StageOutcome::kept(d.to_vec()));
        assert_eq!(outcome.quotes[0].trade_date(), day(4));
        assert_eq!(outcome.quotes[1].trade_date(), day(6));
    }
}
