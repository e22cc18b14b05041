//! Quote filtration in three methodology levels.
//!
//! - Level 1: identical rows, identical-except-price rows, zero bids
//! - Level 2: maturity, implied vol and moneyness bounds, implied rate,
//!   negative time value
//! - Level 3: smile outliers, put-call parity outliers

pub mod implied_rate;
pub mod level1;
pub mod level2;
pub mod parity;
pub mod pipeline;
pub mod stage;
pub mod surface;

pub use implied_rate::{parity_rate, ImpliedRateResolver};
pub use pipeline::{apply_stages, QuoteFilterPipeline};
pub use stage::{FilterStage, StageOutcome};
pub use surface::{QuadraticFit, SurfaceFitter};
