//! # Portfolio Optimizers
//!
//! $$
//! \mathcal W_u=\{\mathbf w:\mathbf 1^\top\mathbf w=1,\ 0\le w_i\le u\}
//! $$
//!
//! Common strategy contract: inputs, the capped simplex projection both
//! strategies rely on, and the materiality filter applied to every
//! successful result.

pub mod convex;
pub mod heuristic;

use ndarray::ArrayView2;
use tracing::warn;

use super::engine::OptimizerConfig;
use super::types::PerformanceMetrics;
use super::types::RiskProfile;
use super::types::Strategy;
use super::types::StrategyOutcome;
use super::types::WeightVector;

pub use convex::optimize_convex;
pub use heuristic::optimize_heuristic;

/// Weights above this level count as active positions.
pub const ACTIVE_WEIGHT: f64 = 0.01;

const FEASIBILITY_TOL: f64 = 1e-6;

/// Maps a weight vector to `(expected_return, volatility)`.
pub trait PerformanceEvaluator {
  fn evaluate(&self, weights: &[f64]) -> (f64, f64);
}

impl<F> PerformanceEvaluator for F
where
  F: Fn(&[f64]) -> (f64, f64),
{
  fn evaluate(&self, weights: &[f64]) -> (f64, f64) {
    self(weights)
  }
}

/// Everything a strategy needs for one attempt.
pub struct StrategyInput<'a> {
  pub assets: &'a [String],
  /// Cleaned periods x assets returns.
  pub returns: ArrayView2<'a, f64>,
  pub profile: &'a RiskProfile,
  pub evaluator: &'a dyn PerformanceEvaluator,
  pub config: &'a OptimizerConfig,
}

impl Strategy {
  /// Run this strategy once.
  pub fn run(&self, input: &StrategyInput<'_>) -> StrategyOutcome {
    match self {
      Strategy::Convex => optimize_convex(input),
      Strategy::Heuristic => optimize_heuristic(input),
    }
  }
}

/// Euclidean projection onto the capped simplex.
///
/// Returns `None` when `n * cap < 1`, i.e. the set is empty.
pub fn project_capped_simplex(v: &[f64], cap: f64) -> Option<Vec<f64>> {
  let n = v.len();
  if n == 0 || (n as f64) * cap < 1.0 - 1e-12 || v.iter().any(|x| !x.is_finite()) {
    return None;
  }

  let mass = |tau: f64| -> f64 { v.iter().map(|&x| (x - tau).clamp(0.0, cap)).sum() };

  let mut lo = v.iter().cloned().fold(f64::INFINITY, f64::min) - cap;
  let mut hi = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
  for _ in 0..200 {
    let mid = 0.5 * (lo + hi);
    if mass(mid) > 1.0 {
      lo = mid;
    } else {
      hi = mid;
    }
    if hi - lo < 1e-16 {
      break;
    }
  }

  let tau = 0.5 * (lo + hi);
  Some(v.iter().map(|&x| (x - tau).clamp(0.0, cap)).collect())
}

pub(crate) fn is_feasible(w: &[f64], cap: f64) -> bool {
  let total: f64 = w.iter().sum();
  (total - 1.0).abs() <= FEASIBILITY_TOL
    && w
      .iter()
      .all(|&x| x.is_finite() && x >= -FEASIBILITY_TOL && x <= cap + FEASIBILITY_TOL)
}

pub(crate) fn count_active(w: &[f64]) -> usize {
  w.iter().filter(|&&x| x > ACTIVE_WEIGHT).count()
}

/// Drop weights below `threshold` and renormalize the rest.
///
/// The retained support is re-projected so renormalization never pushes an
/// entry past `cap`. When the support is too small to carry the cap the
/// input is returned unchanged.
pub fn apply_materiality(w: &[f64], threshold: f64, cap: f64) -> Vec<f64> {
  let support: Vec<usize> = (0..w.len()).filter(|&i| w[i] >= threshold).collect();
  let kept: f64 = support.iter().map(|&i| w[i]).sum();
  if support.is_empty() || kept <= 0.0 {
    return w.to_vec();
  }

  let renormalized: Vec<f64> = support.iter().map(|&i| w[i] / kept).collect();
  let Some(projected) = project_capped_simplex(&renormalized, cap) else {
    warn!(
      kept = support.len(),
      cap,
      "materiality filter skipped, retained positions cannot carry the weight cap"
    );
    return w.to_vec();
  };

  let mut out = vec![0.0; w.len()];
  for (k, &i) in support.iter().enumerate() {
    out[i] = projected[k];
  }
  out
}

/// Turn raw solver weights into a strategy outcome.
pub(crate) fn finalize(input: &StrategyInput<'_>, strategy: Strategy, raw: &[f64]) -> StrategyOutcome {
  let cap = input.profile.max_weight;
  if !is_feasible(raw, cap) {
    return StrategyOutcome::failed(format!(
      "{strategy} solution violates constraints (sum={:.6})",
      raw.iter().sum::<f64>()
    ));
  }

  let w = apply_materiality(raw, input.config.materiality, cap);
  let (expected_return, volatility) = input.evaluator.evaluate(&w);
  if !expected_return.is_finite() || !volatility.is_finite() {
    return StrategyOutcome::failed(format!(
      "{strategy} solution has non-finite performance ({expected_return}, {volatility})"
    ));
  }

  let weights = WeightVector::new(
    input
      .assets
      .iter()
      .zip(w.iter())
      .filter(|(_, wi)| **wi > 0.0)
      .map(|(s, &wi)| (s.clone(), wi))
      .collect(),
  );

  StrategyOutcome::Solved {
    weights,
    metrics: PerformanceMetrics::from_moments(
      expected_return,
      volatility,
      input.config.risk_free_rate,
    ),
  }
}
