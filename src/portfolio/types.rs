//! # Portfolio Types
//!
//! $$
//! S=\frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Shared enums and result containers for risk-profiled optimization.

use std::fmt::Display;
use std::str::FromStr;

use impl_new_derive::ImplNew;

use crate::error::OptimizationError;

/// Investor risk category.
#[derive(Default, Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum RiskLevel {
  Low,
  #[default]
  Medium,
  High,
}

impl FromStr for RiskLevel {
  type Err = OptimizationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "low" => Ok(Self::Low),
      "medium" => Ok(Self::Medium),
      "high" => Ok(Self::High),
      _ => Err(OptimizationError::UnknownRiskLevel(s.to_string())),
    }
  }
}

impl Display for RiskLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RiskLevel::Low => write!(f, "Low"),
      RiskLevel::Medium => write!(f, "Medium"),
      RiskLevel::High => write!(f, "High"),
    }
  }
}

/// Numeric constraints derived from a risk category and horizon.
///
/// Built fresh for every request by [`super::risk::derive_profile`].
#[derive(ImplNew, Clone, Copy, Debug, PartialEq)]
pub struct RiskProfile {
  /// Upper bound on any single weight.
  pub max_weight: f64,
  /// Minimum number of weights above 1%.
  pub min_active_positions: usize,
  /// Variance penalty coefficient.
  pub risk_aversion: f64,
  /// Scale of the downside-risk penalty.
  pub volatility_penalty: f64,
}

/// Optimization strategy variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
  /// Analytic quadratic program over a shrinkage covariance.
  Convex,
  /// Multi-start local search with downside-risk penalty.
  Heuristic,
}

impl Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Strategy::Convex => write!(f, "convex"),
      Strategy::Heuristic => write!(f, "heuristic"),
    }
  }
}

/// Symbol to weight mapping, kept in universe order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WeightVector {
  entries: Vec<(String, f64)>,
}

impl WeightVector {
  pub fn new(entries: Vec<(String, f64)>) -> Self {
    Self { entries }
  }

  pub fn get(&self, symbol: &str) -> Option<f64> {
    self
      .entries
      .iter()
      .find(|(s, _)| s == symbol)
      .map(|(_, w)| *w)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.entries.iter().map(|(s, w)| (s.as_str(), *w))
  }

  pub fn symbols(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(|(s, _)| s.as_str())
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn total(&self) -> f64 {
    self.entries.iter().map(|(_, w)| w).sum()
  }

  /// Number of weights strictly above `threshold`.
  pub fn count_above(&self, threshold: f64) -> usize {
    self.entries.iter().filter(|(_, w)| *w > threshold).count()
  }
}

/// Annualized performance of a weight vector.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PerformanceMetrics {
  pub expected_return: f64,
  pub volatility: f64,
  /// `(expected_return - risk_free) / volatility`, zero for a riskless portfolio.
  pub sharpe_ratio: f64,
}

impl PerformanceMetrics {
  pub fn from_moments(expected_return: f64, volatility: f64, risk_free: f64) -> Self {
    let sharpe_ratio = if volatility > 1e-15 {
      (expected_return - risk_free) / volatility
    } else {
      0.0
    };

    Self {
      expected_return,
      volatility,
      sharpe_ratio,
    }
  }
}

/// Result of a single strategy attempt.
#[derive(Clone, Debug)]
pub enum StrategyOutcome {
  Solved {
    weights: WeightVector,
    metrics: PerformanceMetrics,
  },
  Failed {
    message: String,
  },
}

impl StrategyOutcome {
  pub(crate) fn failed(message: impl Into<String>) -> Self {
    Self::Failed {
      message: message.into(),
    }
  }

  pub fn is_solved(&self) -> bool {
    matches!(self, Self::Solved { .. })
  }
}

/// Output of [`super::engine::PortfolioOptimizer::optimize`].
#[derive(Clone, Debug)]
pub struct OptimizedPortfolio {
  pub weights: WeightVector,
  pub metrics: PerformanceMetrics,
  /// Strategy that produced the weights.
  pub strategy: Strategy,
  pub risk_level: RiskLevel,
  pub horizon_months: u32,
}
