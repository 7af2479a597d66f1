//! # portfolio-allocator
//!
//! $$
//! \max_{\mathbf w\in\Delta_c}\ \mu^\top\mathbf w-\gamma\,\mathbf w^\top\Sigma\mathbf w
//! \quad\longrightarrow\quad n_i=\Big\lfloor \tfrac{w_i B}{p_i}\Big\rfloor
//! $$
//!
//! Risk-profiled long-only portfolio optimization with a convex and a
//! heuristic strategy, plus discrete whole-share allocation of the result.

pub mod allocation;
pub mod error;
pub mod portfolio;
pub mod service;

pub use allocation::AllocationConfig;
pub use allocation::AllocationLine;
pub use allocation::AllocationMapper;
pub use allocation::DiscreteAllocation;
pub use error::AllocationError;
pub use error::OptimizationError;
pub use error::ServiceError;
pub use portfolio::OptimizedPortfolio;
pub use portfolio::OptimizerConfig;
pub use portfolio::PortfolioOptimizer;
pub use portfolio::RiskLevel;
pub use service::PortfolioPlan;
pub use service::PortfolioService;
pub use service::PriceProvider;
pub use service::ReturnsProvider;
