//! Member weights for a portfolio on one formation date.
//!
//! Kernel weights decay with distance from the target in (moneyness, days
//! to maturity) space:
//!
//! w = exp(-0.5 ((m - m0) / h_m)^2 - 0.5 ((t - t0) / h_t)^2)
//!
//! normalized to one, with members below the minimum weight trimmed and the
//! rest renormalized. Bucket weights are equal over the candidates whose
//! nearest grid cell is the target.

use crate::config::{PipelineConfig, WeightingScheme};
use crate::error::{PipelineError, PipelineResult};

use super::bucket::{nearest_bin, PortfolioSpec};

/// A candidate's position in the weighting space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub moneyness: f64,
    pub days_to_maturity: f64,
}

/// `(candidate index, weight)` pairs summing to one.
pub type Weights = Vec<(usize, f64)>;

/// Weights for `candidates` under the configured scheme. An empty result
/// is reported as `InsufficientData` so the portfolio is skipped for the
/// date rather than given a zero return.
pub fn portfolio_weights(
    spec: &PortfolioSpec,
    candidates: &[Candidate],
    config: &PipelineConfig,
) -> PipelineResult<Weights> {
    let weights = match config.portfolio.weighting {
        WeightingScheme::Kernel => kernel_weights(spec, candidates, config),
        WeightingScheme::Bucket => bucket_weights(spec, candidates, config),
    };

    if weights.is_empty() {
        return Err(PipelineError::InsufficientData {
            context: format!("portfolio {}", spec.id()),
            found: 0,
            required: 1,
        });
    }
    Ok(weights)
}

pub fn kernel_weights(spec: &PortfolioSpec, candidates: &[Candidate], config: &PipelineConfig) -> Weights {
    let p = &config.portfolio;
    let target_days = spec.maturity.unwrap_or_default() as f64;

    let raw: Weights = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let zm = (c.moneyness - spec.moneyness) / p.moneyness_bandwidth;
            let zt = (c.days_to_maturity - target_days) / p.maturity_bandwidth;
            (i, (-0.5 * zm * zm - 0.5 * zt * zt).exp())
        })
        .filter(|(_, w)| w.is_finite() && *w > 0.0)
        .collect();

    let normalized = normalize(raw);
    let trimmed: Weights = normalized
        .into_iter()
        .filter(|(_, w)| *w >= p.min_weight)
        .collect();
    normalize(trimmed)
}

pub fn bucket_weights(spec: &PortfolioSpec, candidates: &[Candidate], config: &PipelineConfig) -> Weights {
    let p = &config.portfolio;
    let maturities: Vec<f64> = p.maturity_grid.iter().map(|d| *d as f64).collect();

    let Some(target_m) = nearest_bin(spec.moneyness, &p.moneyness_grid) else {
        return Vec::new();
    };
    let Some(target_t) = spec
        .maturity
        .and_then(|days| nearest_bin(days as f64, &maturities))
    else {
        return Vec::new();
    };

    let members: Vec<usize> = candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            nearest_bin(c.moneyness, &p.moneyness_grid) == Some(target_m)
                && nearest_bin(c.days_to_maturity, &maturities) == Some(target_t)
        })
        .map(|(i, _)| i)
        .collect();

    let w = 1.0 / members.len() as f64;
    members.into_iter().map(|i| (i, w)).collect()
}

fn normalize(weights: Weights) -> Weights {
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    if !(total > 0.0 && total.is_finite()) {
        return Vec::new();
    }
    weights.into_iter().map(|(i, w)| (i, w / total)).collect()
}
