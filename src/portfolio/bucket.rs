//! Portfolio grid points and identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::data::OptionType;

/// One portfolio of the grid. `maturity` is `None` in the reduced view,
/// where maturities are averaged out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSpec {
    pub option_type: OptionType,
    pub moneyness: f64,
    pub maturity: Option<i64>,
}

impl PortfolioSpec {
    pub fn full(option_type: OptionType, moneyness: f64, maturity: i64) -> Self {
        Self {
            option_type,
            moneyness,
            maturity: Some(maturity),
        }
    }

    pub fn reduced(option_type: OptionType, moneyness: f64) -> Self {
        Self {
            option_type,
            moneyness,
            maturity: None,
        }
    }

    /// `C_0.950_30` in the full view, `C_0.950` in the reduced view.
    pub fn id(&self) -> String {
        match self.maturity {
            Some(days) => format!("{}_{:.3}_{}", self.option_type, self.moneyness, days),
            None => format!("{}_{:.3}", self.option_type, self.moneyness),
        }
    }

    /// The reduced-view portfolio this one averages into.
    pub fn without_maturity(&self) -> Self {
        Self::reduced(self.option_type, self.moneyness)
    }
}

impl fmt::Display for PortfolioSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Every (type, moneyness, maturity) portfolio, type-major.
pub fn full_grid(config: &PipelineConfig) -> Vec<PortfolioSpec> {
    let p = &config.portfolio;
    let mut grid = Vec::with_capacity(config.full_view_size());
    for &option_type in &p.option_types {
        for &moneyness in &p.moneyness_grid {
            for &maturity in &p.maturity_grid {
                grid.push(PortfolioSpec::full(option_type, moneyness, maturity));
            }
        }
    }
    grid
}

/// Every (type, moneyness) portfolio.
pub fn reduced_grid(config: &PipelineConfig) -> Vec<PortfolioSpec> {
    let p = &config.portfolio;
    p.option_types
        .iter()
        .flat_map(|&t| p.moneyness_grid.iter().map(move |&m| PortfolioSpec::reduced(t, m)))
        .collect()
}

/// Index of the grid point whose bin contains `value`.
///
/// A bin extends half way to each neighbouring grid point, and as far on
/// the open side of the first and last points. Values equidistant from two
/// points go to the lower one. A single-point grid takes every value.
pub fn nearest_bin(value: f64, grid: &[f64]) -> Option<usize> {
    if !value.is_finite() || grid.is_empty() {
        return None;
    }
    if grid.len() == 1 {
        return Some(0);
    }

    let mut best = 0;
    for (i, g) in grid.iter().enumerate().skip(1) {
        if (value - g).abs() < (value - grid[best]).abs() {
            best = i;
        }
    }

    let half_width = |neighbour: usize| (grid[best] - grid[neighbour]).abs() / 2.0;
    let reach = if value < grid[best] {
        half_width(if best > 0 { best - 1 } else { 1 })
    } else {
        half_width(if best + 1 < grid.len() { best + 1 } else { best - 1 })
    };

    ((value - grid[best]).abs() <= reach + 1e-12).then_some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids() {
        assert_eq!(PortfolioSpec::full(OptionType::Call, 0.95, 30).id(), "C_0.950_30");
        assert_eq!(PortfolioSpec::reduced(OptionType::Put, 1.025).id(), "P_1.025");
        assert_eq!(
            PortfolioSpec::full(OptionType::Put, 1.1, 90).without_maturity().id(),
            "P_1.100"
        );
    }

    #[test]
    fn test_grid_sizes() {
        let config = PipelineConfig::default();
        assert_eq!(full_grid(&config).len(), 54);
        assert_eq!(reduced_grid(&config).len(), 18);
        assert_eq!(full_grid(&config)[0].id(), "C_0.900_30");
    }

    #[test]
    fn test_nearest_bin() {
        let grid = [30.0, 60.0, 90.0];
        assert_eq!(nearest_bin(44.0, &grid), Some(0));
        assert_eq!(nearest_bin(45.0, &grid), Some(0));
        assert_eq!(nearest_bin(46.0, &grid), Some(1));
        assert_eq!(nearest_bin(15.0, &grid), Some(0));
        assert_eq!(nearest_bin(14.0, &grid), None);
        assert_eq!(nearest_bin(105.0, &grid), Some(2));
        assert_eq!(nearest_bin(106.0, &grid), None);
        assert_eq!(nearest_bin(f64::NAN, &grid), None);
    }
}
