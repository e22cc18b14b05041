//! Option elasticity and leverage-adjusted daily returns.
//!
//! Elasticity is the percentage change of the option price for a 1% move
//! in the index: delta * S / price. Dividing an option's return by its
//! elasticity scales every position to unit exposure to the index.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::black_scholes::BlackScholes;
use crate::config::PipelineConfig;
use crate::data::{ContractKey, OptionQuote, OptionType};
use crate::diagnostics::RunDiagnostics;
use crate::error::{PipelineError, PipelineResult};

/// Model output for one quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticityResult {
    pub elasticity: f64,
    pub theoretical_price: f64,
    pub delta: f64,
}

/// Black-Scholes price, delta and elasticity.
///
/// Non-positive maturity, volatility, spot or strike, and a non-positive
/// model price, are rejected instead of producing NaN or infinity.
pub fn price_and_elasticity(
    spot: f64,
    strike: f64,
    t_years: f64,
    rate: f64,
    sigma: f64,
    option_type: OptionType,
) -> PipelineResult<ElasticityResult> {
    let invalid = |reason: String| PipelineError::InvalidNumericInput {
        key: format!(
            "{} S={} K={} T={:.4} r={:.4} sigma={:.4}",
            option_type, spot, strike, t_years, rate, sigma
        ),
        reason,
    };

    if !(t_years.is_finite() && t_years > 0.0) {
        return Err(invalid("time to maturity must be positive".into()));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(invalid("volatility must be positive".into()));
    }
    if !(spot.is_finite() && spot > 0.0 && strike.is_finite() && strike > 0.0) {
        return Err(invalid("spot and strike must be positive".into()));
    }
    if !rate.is_finite() {
        return Err(invalid("rate is not finite".into()));
    }

    let bs = BlackScholes::new(rate);
    let theoretical_price = bs.price(spot, strike, t_years, sigma, option_type);
    if !(theoretical_price.is_finite() && theoretical_price > 0.0) {
        return Err(invalid(format!(
            "theoretical price {} is not positive",
            theoretical_price
        )));
    }

    let delta = bs.delta(spot, strike, t_years, sigma, option_type);
    let elasticity = delta * spot / theoretical_price;
    if !elasticity.is_finite() || elasticity == 0.0 {
        return Err(invalid(format!("degenerate elasticity {}", elasticity)));
    }

    Ok(ElasticityResult {
        elasticity,
        theoretical_price,
        delta,
    })
}

/// Calls are levered longs (elasticity > 1), puts levered shorts (< -1).
pub fn sign_is_consistent(option_type: OptionType, elasticity: f64) -> bool {
    match option_type {
        OptionType::Call => elasticity > 1.0,
        OptionType::Put => elasticity < -1.0,
    }
}

/// Evaluates elasticities and attaches daily returns to filtered quotes.
pub struct ElasticityEngine<'a> {
    config: &'a PipelineConfig,
}

impl<'a> ElasticityEngine<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Elasticity for a quote at its resolved implied rate.
    pub fn evaluate(&self, quote: &OptionQuote) -> PipelineResult<ElasticityResult> {
        let rate = quote
            .derived
            .implied_rate
            .ok_or_else(|| PipelineError::InvalidNumericInput {
                key: quote.log_key(),
                reason: "no implied rate".into(),
            })?;

        price_and_elasticity(
            quote.spot(),
            quote.strike(),
            quote.years_to_maturity(self.config.day_count),
            rate,
            quote.implied_vol(),
            quote.option_type(),
        )
        .map_err(|e| match e {
            PipelineError::InvalidNumericInput { reason, .. } => {
                PipelineError::InvalidNumericInput {
                    key: quote.log_key(),
                    reason,
                }
            }
            other => other,
        })
    }

    /// Attach elasticity, daily return and leverage-adjusted return.
    ///
    /// A quote on formation date `f` earns the mid-price return to the next
    /// trading date `n` present in the set, provided the same contract is
    /// quoted on `n`. Elasticity is taken on the formation quote. Quotes
    /// whose elasticity cannot be evaluated are dropped; quotes without a
    /// next-day observation are kept with no return.
    pub fn annotate_returns(
        &self,
        quotes: &[OptionQuote],
        diagnostics: &mut RunDiagnostics,
    ) -> Vec<OptionQuote> {
        let dates: BTreeSet<NaiveDate> = quotes.iter().map(|q| q.trade_date()).collect();
        let next_date: HashMap<NaiveDate, NaiveDate> = dates
            .iter()
            .zip(dates.iter().skip(1))
            .map(|(d, n)| (*d, *n))
            .collect();

        let mids: HashMap<(ContractKey, NaiveDate), f64> = quotes
            .iter()
            .map(|q| ((q.contract(), q.trade_date()), q.derived.mid_price))
            .collect();

        let evaluated: Vec<(OptionQuote, PipelineResult<ElasticityResult>)> = quotes
            .par_iter()
            .map(|q| (q.clone(), self.evaluate(q)))
            .collect();

        let mut annotated = Vec::with_capacity(evaluated.len());
        for (mut quote, result) in evaluated {
            let result = match result {
                Ok(result) => result,
                Err(e) => {
                    debug!("Dropping {}: {}", quote.log_key(), e);
                    diagnostics.absorb(&e);
                    continue;
                }
            };

            if !sign_is_consistent(quote.option_type(), result.elasticity) {
                warn!(
                    "Elasticity {:.3} has unexpected sign/magnitude for {}",
                    result.elasticity,
                    quote.log_key()
                );
                diagnostics.elasticity_sign_violations += 1;
            }

            quote.derived.theoretical_price = Some(result.theoretical_price);
            quote.derived.delta = Some(result.delta);
            quote.derived.elasticity = Some(result.elasticity);

            let formation_mid = quote.derived.mid_price;
            let next = next_date
                .get(&quote.trade_date())
                .and_then(|n| mids.get(&(quote.contract(), *n)).map(|mid| (*n, *mid)));

            if let Some((return_date, next_mid)) = next {
                if formation_mid > 0.0 {
                    let daily_return = next_mid / formation_mid - 1.0;
                    quote.derived.daily_return = Some(daily_return);
                    quote.derived.return_date = Some(return_date);
                    quote.derived.leverage_adjusted_return =
                        Some(daily_return / result.elasticity);
                    diagnostics.quotes_with_return += 1;
                }
            }

            annotated.push(quote);
        }

        info!(
            "Elasticity: {} quotes in, {} priced, {} with next-day returns",
            quotes.len(),
            annotated.len(),
            annotated
                .iter()
                .filter(|q| q.derived.leverage_adjusted_return.is_some())
                .count()
        );

        annotated
    }
}
