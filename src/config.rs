//! Pipeline configuration.
//!
//! One immutable value threaded through every component. Loaded from TOML;
//! every section has defaults matching the published methodology, so a
//! partial file only needs the values it overrides.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::OptionType;
use crate::error::{PipelineError, PipelineResult};

/// Complete configuration for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Days per year used to convert days to maturity into years.
    #[serde(default = "default_day_count")]
    pub day_count: f64,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub surface: SurfaceConfig,

    #[serde(default)]
    pub portfolio: PortfolioConfig,
}

fn default_day_count() -> f64 {
    365.0
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            day_count: default_day_count(),
            filters: FilterConfig::default(),
            surface: SurfaceConfig::default(),
            portfolio: PortfolioConfig::default(),
        }
    }
}

/// Level 1 and level 2 filter bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub min_days_to_maturity: i64,
    pub max_days_to_maturity: i64,
    pub min_implied_vol: f64,
    pub max_implied_vol: f64,
    pub min_moneyness: f64,
    pub max_moneyness: f64,

    /// Moneyness band whose put-call pairs feed the implied rate medians.
    pub near_money_lower: f64,
    pub near_money_upper: f64,

    /// Largest absolute distance of a pair's parity rate from the daily
    /// median before both legs are dropped.
    pub parity_max_deviation: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_days_to_maturity: 7,
            max_days_to_maturity: 180,
            min_implied_vol: 0.05,
            max_implied_vol: 1.00,
            min_moneyness: 0.8,
            max_moneyness: 1.2,
            near_money_lower: 0.95,
            near_money_upper: 1.05,
            parity_max_deviation: 0.02,
        }
    }
}

/// Quadratic smile fit settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    /// Residual multiple of the group standard deviation that marks an outlier.
    pub outlier_sigma: f64,
    /// Groups smaller than this are not judged.
    pub min_points: usize,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            outlier_sigma: 3.0,
            min_points: 5,
        }
    }
}

/// How bucket members are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightingScheme {
    /// Gaussian kernel in (moneyness, days to maturity) around the target.
    Kernel,
    /// Nearest grid point membership with equal weights.
    Bucket,
}

/// Portfolio grid and weighting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    pub weighting: WeightingScheme,
    pub moneyness_bandwidth: f64,
    /// In days.
    pub maturity_bandwidth: f64,
    /// Kernel members below this normalized weight are dropped.
    pub min_weight: f64,
    pub moneyness_grid: Vec<f64>,
    pub maturity_grid: Vec<i64>,
    pub option_types: Vec<OptionType>,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            weighting: WeightingScheme::Kernel,
            moneyness_bandwidth: 0.0125,
            maturity_bandwidth: 10.0,
            min_weight: 0.01,
            moneyness_grid: vec![0.90, 0.925, 0.95, 0.975, 1.00, 1.025, 1.05, 1.075, 1.10],
            maturity_grid: vec![30, 60, 90],
            option_types: vec![OptionType::Call, OptionType::Put],
        }
    }
}

impl PipelineConfig {
    /// Read and validate a TOML configuration file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| PipelineError::Configuration(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> PipelineResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Configuration(format!("cannot serialize: {}", e)))
    }

    /// Reject inconsistent grids and thresholds.
    pub fn validate(&self) -> PipelineResult<()> {
        let f = &self.filters;
        let s = &self.surface;
        let p = &self.portfolio;

        check(self.day_count > 0.0, "day_count must be positive")?;

        check(
            f.min_days_to_maturity >= 1 && f.min_days_to_maturity < f.max_days_to_maturity,
            "maturity bounds must satisfy 1 <= min < max",
        )?;
        check(
            f.min_implied_vol > 0.0 && f.min_implied_vol < f.max_implied_vol,
            "implied vol bounds must satisfy 0 < min < max",
        )?;
        check(
            f.min_moneyness > 0.0 && f.min_moneyness < f.max_moneyness,
            "moneyness bounds must satisfy 0 < min < max",
        )?;
        check(
            f.near_money_lower < f.near_money_upper,
            "near-the-money band must satisfy lower < upper",
        )?;
        check(
            f.parity_max_deviation > 0.0,
            "parity_max_deviation must be positive",
        )?;

        check(s.outlier_sigma > 0.0, "surface outlier_sigma must be positive")?;
        check(
            s.min_points >= 3,
            "surface min_points must be at least 3 for a quadratic fit",
        )?;

        check(
            p.moneyness_bandwidth > 0.0 && p.maturity_bandwidth > 0.0,
            "kernel bandwidths must be positive",
        )?;
        check(
            (0.0..1.0).contains(&p.min_weight),
            "min_weight must lie in [0, 1)",
        )?;
        check(!p.moneyness_grid.is_empty(), "moneyness grid is empty")?;
        check(!p.maturity_grid.is_empty(), "maturity grid is empty")?;
        check(!p.option_types.is_empty(), "option_types is empty")?;
        check(
            p.moneyness_grid.iter().all(|m| m.is_finite() && *m > 0.0),
            "moneyness grid values must be positive",
        )?;
        check(
            p.maturity_grid.iter().all(|t| *t > 0),
            "maturity grid values must be positive",
        )?;
        check(
            strictly_increasing(&p.moneyness_grid),
            "moneyness grid must be strictly increasing",
        )?;
        check(
            p.maturity_grid.windows(2).all(|w| w[0] < w[1]),
            "maturity grid must be strictly increasing",
        )?;

        let mut types = p.option_types.clone();
        types.sort();
        types.dedup();
        check(
            types.len() == p.option_types.len(),
            "option_types contains duplicates",
        )?;

        Ok(())
    }

    /// Number of portfolios in the full (type x moneyness x maturity) view.
    pub fn full_view_size(&self) -> usize {
        self.portfolio.option_types.len()
            * self.portfolio.moneyness_grid.len()
            * self.portfolio.maturity_grid.len()
    }

    /// Number of portfolios once maturities are averaged out.
    pub fn reduced_view_size(&self) -> usize {
        self.portfolio.option_types.len() * self.portfolio.moneyness_grid.len()
    }
}

fn check(condition: bool, message: &str) -> PipelineResult<()> {
    if condition {
        Ok(())
    } else {
        Err(PipelineError::Configuration(message.to_string()))
    }
}

fn strictly_increasing(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}
