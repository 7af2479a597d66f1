//! # Errors
//!
//! Failure taxonomy for optimization, allocation and the service layer.
//! Every failure is all-or-nothing: no partial weights or allocations are
//! returned alongside an error.

use thiserror::Error;

/// Errors raised while turning returns into a weight vector.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizationError {
  /// Degenerate, empty or all-missing return input.
  #[error("invalid return data: {0}")]
  Data(String),
  /// QP infeasible or solver exception.
  #[error("solver failed: {0}")]
  Solver(String),
  /// Every attempted strategy failed; carries the last diagnostic.
  #[error("optimization failed: {last}")]
  AllStrategiesExhausted { last: String },
  /// Unknown risk category label.
  #[error("unknown risk level '{0}'")]
  UnknownRiskLevel(String),
}

/// Errors raised before any discretization pass runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AllocationError {
  #[error("budget must be positive, got {0}")]
  NonPositiveBudget(f64),
  #[error("price for {symbol} must be positive, got {price}")]
  NonPositivePrice { symbol: String, price: f64 },
  #[error("no price available for weighted symbol {0}")]
  MissingPrice(String),
}

/// Errors surfaced by [`crate::service::PortfolioService`].
#[derive(Error, Debug)]
pub enum ServiceError {
  #[error(transparent)]
  Optimization(#[from] OptimizationError),
  #[error(transparent)]
  Allocation(#[from] AllocationError),
  #[error("market data provider failed: {0}")]
  Provider(#[from] anyhow::Error),
}
