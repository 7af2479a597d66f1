//! # Portfolio Engine
//!
//! $$
//! \mathbf{w}^\* = \operatorname{Optimize}\big(\operatorname{clean}(R),\ \operatorname{profile}(\ell,h)\big)
//! $$
//!
//! High-level orchestration: clean returns, derive the risk profile for the
//! request, then delegate through the strategy selector.

use std::collections::HashSet;

use ndarray::ArrayView2;
use ndarray::Axis;
use tracing::debug;
use tracing::info;

use super::data::ReturnsPreprocessor;
use super::data::SampleMoments;
use super::optimizers::PerformanceEvaluator;
use super::optimizers::StrategyInput;
use super::risk::derive_profile;
use super::risk::RiskTable;
use super::selector::StrategySelector;
use super::types::OptimizedPortfolio;
use super::types::RiskLevel;
use crate::error::OptimizationError;

/// Runtime configuration for [`PortfolioOptimizer`].
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
  /// Annual risk-free rate used in Sharpe and Sortino computations.
  pub risk_free_rate: f64,
  /// Return observations per year (12 for monthly data).
  pub periods_per_year: u32,
  /// Weights below this level are dropped from results.
  pub materiality: f64,
  /// Largest universe routed to the convex strategy first.
  pub convex_universe_limit: usize,
  /// Smoothing factor of the exponentially weighted mean.
  pub ewm_alpha: f64,
  /// Diagonal shrinkage intensity.
  pub shrinkage: f64,
  /// Winsorization quantiles.
  pub winsor_lower: f64,
  pub winsor_upper: f64,
  /// Local-search restarts of the heuristic strategy.
  pub restarts: usize,
  /// Seed for the heuristic's random starts.
  pub seed: u64,
  /// Iteration budget per local search.
  pub max_iters: u64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      risk_free_rate: 0.02,
      periods_per_year: 12,
      materiality: 0.005,
      convex_universe_limit: 20,
      ewm_alpha: 0.3,
      shrinkage: 0.2,
      winsor_lower: 0.01,
      winsor_upper: 0.99,
      restarts: 3,
      seed: 42,
      max_iters: 5000,
    }
  }
}

/// Stateless optimization entry point.
#[derive(Clone, Debug, Default)]
pub struct PortfolioOptimizer {
  config: OptimizerConfig,
  risk_table: RiskTable,
}

impl PortfolioOptimizer {
  /// Construct a new optimizer with explicit configuration.
  pub fn new(config: OptimizerConfig) -> Self {
    Self {
      config,
      risk_table: RiskTable::default(),
    }
  }

  /// Replace the base risk table.
  pub fn with_risk_table(mut self, risk_table: RiskTable) -> Self {
    self.risk_table = risk_table;
    self
  }

  /// Borrow optimizer configuration.
  pub fn config(&self) -> &OptimizerConfig {
    &self.config
  }

  pub fn risk_table(&self) -> &RiskTable {
    &self.risk_table
  }

  /// Optimize weights for `assets` using annualized sample moments of the
  /// cleaned returns as the performance model.
  pub fn optimize(
    &self,
    assets: &[String],
    returns: ArrayView2<f64>,
    risk_level: RiskLevel,
    horizon_months: u32,
  ) -> Result<OptimizedPortfolio, OptimizationError> {
    let cleaned = self.clean(assets, returns, horizon_months)?;
    let moments = SampleMoments::from_returns(cleaned.view(), self.config.periods_per_year as f64);
    self.run(assets, cleaned.view(), risk_level, horizon_months, &moments)
  }

  /// Same as [`Self::optimize`] with a caller-supplied performance model.
  pub fn optimize_with_evaluator(
    &self,
    assets: &[String],
    returns: ArrayView2<f64>,
    risk_level: RiskLevel,
    horizon_months: u32,
    evaluator: &dyn PerformanceEvaluator,
  ) -> Result<OptimizedPortfolio, OptimizationError> {
    let cleaned = self.clean(assets, returns, horizon_months)?;
    self.run(assets, cleaned.view(), risk_level, horizon_months, evaluator)
  }

  fn clean(
    &self,
    assets: &[String],
    returns: ArrayView2<f64>,
    horizon_months: u32,
  ) -> Result<ndarray::Array2<f64>, OptimizationError> {
    validate_inputs(assets, returns, horizon_months)?;

    let cleaned = ReturnsPreprocessor::new(self.config.winsor_lower, self.config.winsor_upper)
      .clean(returns);

    for (symbol, col) in assets.iter().zip(cleaned.axis_iter(Axis(1))) {
      if col.iter().any(|v| !v.is_finite()) {
        return Err(OptimizationError::Data(format!(
          "{symbol} has no finite return observations"
        )));
      }
    }

    Ok(cleaned)
  }

  fn run(
    &self,
    assets: &[String],
    cleaned: ArrayView2<f64>,
    risk_level: RiskLevel,
    horizon_months: u32,
    evaluator: &dyn PerformanceEvaluator,
  ) -> Result<OptimizedPortfolio, OptimizationError> {
    let profile = derive_profile(&self.risk_table, risk_level, horizon_months);
    debug!(%risk_level, horizon_months, ?profile, "derived risk profile");

    let input = StrategyInput {
      assets,
      returns: cleaned.view(),
      profile: &profile,
      evaluator,
      config: &self.config,
    };

    let selector = StrategySelector::new(self.config.convex_universe_limit);
    let (strategy, weights, metrics) = selector.select(assets.len(), |s| s.run(&input))?;

    info!(
      %strategy,
      expected_return = metrics.expected_return,
      volatility = metrics.volatility,
      "portfolio optimized"
    );

    Ok(OptimizedPortfolio {
      weights,
      metrics,
      strategy,
      risk_level,
      horizon_months,
    })
  }
}

fn validate_inputs(
  assets: &[String],
  returns: ArrayView2<f64>,
  horizon_months: u32,
) -> Result<(), OptimizationError> {
  if assets.is_empty() {
    return Err(OptimizationError::Data("asset list is empty".to_string()));
  }

  let mut seen = HashSet::with_capacity(assets.len());
  for symbol in assets {
    if !seen.insert(symbol.as_str()) {
      return Err(OptimizationError::Data(format!("duplicate asset {symbol}")));
    }
  }

  if returns.ncols() != assets.len() {
    return Err(OptimizationError::Data(format!(
      "return matrix has {} columns for {} assets",
      returns.ncols(),
      assets.len()
    )));
  }

  if returns.nrows() < 2 {
    return Err(OptimizationError::Data(format!(
      "need at least 2 return periods, got {}",
      returns.nrows()
    )));
  }

  if horizon_months == 0 {
    return Err(OptimizationError::Data("horizon must be positive".to_string()));
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::Array2;
  use tracing_test::traced_test;

  use super::*;
  use crate::portfolio::types::Strategy;

  fn symbols(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("S{i}")).collect()
  }

  fn synthetic_returns(periods: usize, assets: usize) -> Array2<f64> {
    Array2::from_shape_fn((periods, assets), |(t, i)| {
      let drift = 0.004 + 0.0008 * i as f64;
      let own = (t as f64 * (0.6 + 0.37 * i as f64)).sin();
      let market = (t as f64 * 0.5).cos();
      drift + 0.03 * own + 0.012 * market
    })
  }

  fn fast_config() -> OptimizerConfig {
    OptimizerConfig {
      max_iters: 1500,
      ..OptimizerConfig::default()
    }
  }

  #[test]
  fn optimize_small_universe_uses_convex() {
    let assets = symbols(10);
    let returns = synthetic_returns(48, 10);
    let optimizer = PortfolioOptimizer::new(fast_config());

    let result = optimizer
      .optimize(&assets, returns.view(), RiskLevel::Medium, 12)
      .unwrap();

    assert_eq!(result.strategy, Strategy::Convex);
    assert_abs_diff_eq!(result.weights.total(), 1.0, epsilon = 1e-3);
    assert!(result.weights.iter().all(|(_, w)| w <= 0.25 + 1e-6));
    assert!(result.weights.count_above(0.01) >= 5);
    assert_eq!(result.risk_level, RiskLevel::Medium);
    assert_eq!(result.horizon_months, 12);
  }

  #[test]
  fn optimize_large_universe_uses_heuristic() {
    let assets = symbols(25);
    let returns = synthetic_returns(36, 25);
    let optimizer = PortfolioOptimizer::new(fast_config());

    let result = optimizer
      .optimize(&assets, returns.view(), RiskLevel::High, 24)
      .unwrap();

    assert_eq!(result.strategy, Strategy::Heuristic);
    assert_abs_diff_eq!(result.weights.total(), 1.0, epsilon = 1e-3);
    assert!(result.weights.iter().all(|(_, w)| w <= 0.35 + 1e-6));
    let profile = derive_profile(optimizer.risk_table(), RiskLevel::High, 24);
    assert!(result.weights.count_above(0.01) >= profile.min_active_positions);
  }

  #[test]
  #[traced_test]
  fn degenerate_covariance_falls_back_to_heuristic() {
    let assets = symbols(5);
    let mut returns = synthetic_returns(24, 5);
    returns.column_mut(0).fill(0.005);
    let optimizer = PortfolioOptimizer::new(fast_config());

    let result = optimizer
      .optimize(&assets, returns.view(), RiskLevel::High, 12)
      .unwrap();

    assert_eq!(result.strategy, Strategy::Heuristic);
    assert!(logs_contain("degenerate covariance"));
    assert_abs_diff_eq!(result.weights.total(), 1.0, epsilon = 1e-3);
    assert!(result.weights.iter().all(|(_, w)| (0.0..=0.35 + 1e-6).contains(&w)));
    let profile = derive_profile(optimizer.risk_table(), RiskLevel::High, 12);
    assert!(result.weights.count_above(0.01) >= profile.min_active_positions);
  }

  #[test]
  fn infeasible_profile_exhausts_strategies() {
    let assets = symbols(4);
    let returns = synthetic_returns(24, 4);
    let optimizer = PortfolioOptimizer::new(fast_config());

    let err = optimizer
      .optimize(&assets, returns.view(), RiskLevel::Low, 12)
      .unwrap_err();

    match err {
      OptimizationError::AllStrategiesExhausted { last } => assert!(last.contains("heuristic"), "{last}"),
      other => panic!("unexpected error {other:?}"),
    }
  }

  #[test]
  fn dirty_returns_are_cleaned_before_optimizing() {
    let assets = symbols(6);
    let mut returns = synthetic_returns(36, 6);
    returns[[0, 0]] = f64::NAN;
    returns[[3, 2]] = f64::INFINITY;
    returns[[5, 4]] = f64::NEG_INFINITY;
    let optimizer = PortfolioOptimizer::new(fast_config());

    let result = optimizer.optimize(&assets, returns.view(), RiskLevel::High, 12);
    assert!(result.is_ok(), "{result:?}");
  }

  #[test]
  fn rejects_invalid_inputs() {
    let optimizer = PortfolioOptimizer::default();
    let returns = synthetic_returns(12, 2);

    let err = optimizer.optimize(&[], returns.view(), RiskLevel::Medium, 12);
    assert!(matches!(err, Err(OptimizationError::Data(_))));

    let dup = vec!["A".to_string(), "A".to_string()];
    let err = optimizer.optimize(&dup, returns.view(), RiskLevel::Medium, 12);
    assert!(matches!(err, Err(OptimizationError::Data(_))));

    let err = optimizer.optimize(&symbols(3), returns.view(), RiskLevel::Medium, 12);
    assert!(matches!(err, Err(OptimizationError::Data(_))));

    let err = optimizer.optimize(&symbols(2), returns.view(), RiskLevel::Medium, 0);
    assert!(matches!(err, Err(OptimizationError::Data(_))));

    let mut missing = synthetic_returns(12, 2);
    missing.column_mut(1).fill(f64::NAN);
    let err = optimizer.optimize(&symbols(2), missing.view(), RiskLevel::Medium, 12);
    assert!(matches!(err, Err(OptimizationError::Data(msg)) if msg.contains("S1")));
  }

  #[test]
  fn custom_evaluator_drives_metrics() {
    let assets = symbols(8);
    let returns = synthetic_returns(36, 8);
    let optimizer = PortfolioOptimizer::new(fast_config());
    let evaluator = |_: &[f64]| (0.12, 0.25);

    let result = optimizer
      .optimize_with_evaluator(&assets, returns.view(), RiskLevel::Medium, 12, &evaluator)
      .unwrap();

    assert_abs_diff_eq!(result.metrics.expected_return, 0.12, epsilon = 1e-12);
    assert_abs_diff_eq!(result.metrics.sharpe_ratio, 0.4, epsilon = 1e-12);
  }
}
