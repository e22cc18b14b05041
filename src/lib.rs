pub mod config;
pub mod data;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod filters;
pub mod portfolio;
pub mod pricing;

// Re-export commonly used types
pub use config::{FilterConfig, PipelineConfig, PortfolioConfig, SurfaceConfig, WeightingScheme};
pub use data::{OptionQuote, OptionType, QuoteFeedLoader, QuoteRecord, RawQuote};
pub use diagnostics::{RunDiagnostics, StageReport};
pub use engine::{EngineOutput, PortfolioEngine};
pub use error::{PipelineError, PipelineResult};
pub use filters::{apply_stages, FilterStage, ImpliedRateResolver, QuoteFilterPipeline, SurfaceFitter};
pub use portfolio::{PanelView, PortfolioAggregator, PortfolioPanel, PortfolioReturnRecord, PortfolioSpec};
pub use pricing::{price_and_elasticity, BlackScholes, ElasticityEngine, ElasticityResult};
