//! Quadratic implied volatility smile fit.
//!
//! For each (trade date, expiration, option type) group, log implied vol is
//! regressed on moneyness with a degree-2 least squares fit. A quote is an
//! outlier when its residual exceeds `outlier_sigma` times the standard
//! deviation of the other residuals in its group, so a single bad quote
//! cannot inflate its own yardstick. Outliers are dropped and the survivors
//! refit, so every kept quote carries the fitted value and residual of the
//! smile it belongs to.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use nalgebra::{DMatrix, DVector, SVD};
use tracing::debug;

use super::stage::StageOutcome;
use crate::config::PipelineConfig;
use crate::data::{OptionQuote, OptionType};
use crate::error::{PipelineError, PipelineResult};

/// Lower bound on the leave-one-out residual deviation, in log IV. Keeps
/// round-off in an otherwise exact fit from reading as an outlier.
const MIN_RESIDUAL_SIGMA: f64 = 1e-6;

/// Relative cutoff for singular values counted in the rank.
const RANK_TOLERANCE: f64 = 1e-12;

/// y = c0 + c1 (x - center) + c2 (x - center)^2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    pub center: f64,
    pub coefficients: [f64; 3],
}

impl QuadraticFit {
    /// Least squares fit of the centred Vandermonde system through SVD.
    /// `None` when the design has rank below three (fewer than three
    /// distinct x values).
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        let n = xs.len();
        if n != ys.len() || n < 3 {
            return None;
        }

        let center = xs.iter().sum::<f64>() / n as f64;
        let design = DMatrix::from_fn(n, 3, |i, j| (xs[i] - center).powi(j as i32));
        let target = DVector::from_column_slice(ys);

        let svd = SVD::new(design, true, true);
        let eps = RANK_TOLERANCE * svd.singular_values.max();
        if !eps.is_finite() || eps <= 0.0 || svd.rank(eps) < 3 {
            return None;
        }

        let solution = svd.solve(&target, eps).ok()?;
        let coefficients = [solution[0], solution[1], solution[2]];
        coefficients.iter().all(|c| c.is_finite()).then_some(Self {
            center,
            coefficients,
        })
    }

    pub fn value(&self, x: f64) -> f64 {
        let d = x - self.center;
        let [c0, c1, c2] = self.coefficients;
        c0 + c1 * d + c2 * d * d
    }
}

pub struct SurfaceFitter<'a> {
    config: &'a PipelineConfig,
}

impl<'a> SurfaceFitter<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Outlier flags for one smile (single date, expiration and type), in
    /// input order. Groups below the minimum size or with a degenerate
    /// design give `InsufficientData`.
    pub fn fit_and_flag(&self, group: &[OptionQuote]) -> PipelineResult<Vec<bool>> {
        let required = self.config.surface.min_points;
        let insufficient = || PipelineError::InsufficientData {
            context: group
                .first()
                .map(|q| {
                    format!(
                        "smile {} {} exp={}",
                        q.trade_date(),
                        q.option_type(),
                        q.expiration()
                    )
                })
                .unwrap_or_else(|| "empty smile".to_string()),
            found: group.len(),
            required,
        };

        if group.len() < required {
            return Err(insufficient());
        }

        let xs: Vec<f64> = group.iter().map(|q| q.derived.moneyness).collect();
        let ys: Vec<f64> = group.iter().map(|q| q.derived.log_iv).collect();
        let fit = QuadraticFit::fit(&xs, &ys).ok_or_else(insufficient)?;

        let residuals: Vec<f64> = xs.iter().zip(&ys).map(|(x, y)| y - fit.value(*x)).collect();
        let k = self.config.surface.outlier_sigma;
        Ok(residuals
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let sigma = leave_one_out_std(&residuals, i).max(MIN_RESIDUAL_SIGMA);
                r.abs() > k * sigma
            })
            .collect())
    }

    /// Run the smile filter over one trade date.
    pub fn filter_date(&self, day: &[OptionQuote]) -> StageOutcome {
        let mut smiles: BTreeMap<(NaiveDate, OptionType), Vec<usize>> = BTreeMap::new();
        for (i, quote) in day.iter().enumerate() {
            if quote.derived.log_iv.is_finite() && quote.derived.moneyness.is_finite() {
                smiles
                    .entry((quote.expiration(), quote.option_type()))
                    .or_default()
                    .push(i);
            }
        }

        let mut quotes: Vec<OptionQuote> = day.to_vec();
        let mut dropped = vec![false; day.len()];
        let mut outcome = StageOutcome::default();

        for members in smiles.values() {
            let group: Vec<OptionQuote> = members.iter().map(|&i| day[i].clone()).collect();

            match self.fit_and_flag(&group) {
                Ok(flags) => {
                    for (&i, flagged) in members.iter().zip(flags) {
                        if flagged {
                            debug!(
                                "Smile outlier {} (log_iv={:.4})",
                                day[i].log_key(),
                                day[i].derived.log_iv
                            );
                            dropped[i] = true;
                        }
                    }
                }
                Err(e) => {
                    debug!("{}", e);
                    outcome.insufficient += 1;
                }
            }

            let survivors: Vec<usize> = members.iter().copied().filter(|&i| !dropped[i]).collect();
            let xs: Vec<f64> = survivors.iter().map(|&i| day[i].derived.moneyness).collect();
            let ys: Vec<f64> = survivors.iter().map(|&i| day[i].derived.log_iv).collect();
            if let Some(fit) = QuadraticFit::fit(&xs, &ys) {
                for &i in &survivors {
                    let fitted = fit.value(day[i].derived.moneyness);
                    quotes[i].derived.fitted_log_iv = Some(fitted);
                    quotes[i].derived.iv_residual = Some(day[i].derived.log_iv - fitted);
                    outcome.repaired += 1;
                }
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
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Population standard deviation of `values` without entry `skip`.
fn leave_one_out_std(values: &[f64], skip: usize) -> f64 {
    let rest: Vec<f64> = values
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != skip)
        .map(|(_, v)| *v)
        .collect();
    population_std(&rest)
}
