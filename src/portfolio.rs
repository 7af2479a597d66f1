//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Return preprocessing, risk profiles, optimization strategies and their selection.

pub mod data;
pub mod engine;
pub mod optimizers;
pub mod risk;
pub mod selector;
pub mod types;

pub use data::annualized_ewm_returns;
pub use data::downside_semicovariance;
pub use data::sample_covariance;
pub use data::shrink_to_diagonal;
pub use data::ReturnsPreprocessor;
pub use data::SampleMoments;
pub use engine::OptimizerConfig;
pub use engine::PortfolioOptimizer;
pub use optimizers::apply_materiality;
pub use optimizers::project_capped_simplex;
pub use optimizers::PerformanceEvaluator;
pub use optimizers::StrategyInput;
pub use risk::adjust_for_horizon;
pub use risk::derive_profile;
pub use risk::RiskTable;
pub use selector::next_strategy;
pub use selector::StrategySelector;
pub use types::OptimizedPortfolio;
pub use types::PerformanceMetrics;
pub use types::RiskLevel;
pub use types::RiskProfile;
pub use types::Strategy;
pub use types::StrategyOutcome;
pub use types::WeightVector;
