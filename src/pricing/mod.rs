//! Black-Scholes pricing, implied volatility inversion and option
//! elasticity.

pub mod black_scholes;
pub mod elasticity;
pub mod implied_vol;

pub use black_scholes::BlackScholes;
pub use elasticity::{price_and_elasticity, sign_is_consistent, ElasticityEngine, ElasticityResult};
pub use implied_vol::{fill_missing_implied_vols, invert_implied_vol};
