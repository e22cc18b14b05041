//! Moneyness x maturity x type portfolios of leverage-adjusted returns.

pub mod aggregator;
pub mod bucket;
pub mod panel;
pub mod weights;

pub use aggregator::{reduce_maturities, PortfolioAggregator};
pub use bucket::{full_grid, nearest_bin, reduced_grid, PortfolioSpec};
pub use panel::{
    annotate_month_ends, compound, monthly_returns, MonthlyReturn, PanelView, PortfolioPanel,
    PortfolioReturnRecord,
};
pub use weights::{bucket_weights, kernel_weights, portfolio_weights, Candidate, Weights};
