//! # Heuristic Strategy
//!
//! $$
//! U(\mathbf w)=\mu_p-\gamma\sigma_p^2-0.1\,(k_{\min}-k(\mathbf w))^+-\pi_{\text{sortino}}(\mathbf w)
//! $$
//!
//! Multi-start Nelder-Mead search over the capped simplex with a
//! diversification penalty and a downside-risk penalty built from the
//! semicovariance of returns below the periodic risk-free rate.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Exp1;
use tracing::debug;

use super::count_active;
use super::finalize;
use super::is_feasible;
use super::project_capped_simplex;
use super::PerformanceEvaluator;
use super::StrategyInput;
use crate::portfolio::data::downside_semicovariance;
use crate::portfolio::data::quad_form;
use crate::portfolio::types::RiskProfile;
use crate::portfolio::types::Strategy;
use crate::portfolio::types::StrategyOutcome;

/// Penalty per missing active position.
const DIVERSITY_PENALTY: f64 = 0.1;
/// Scale of the downside-risk penalty.
const SORTINO_WEIGHT: f64 = 0.1;

/// Utility maximized by the heuristic search.
pub struct DownsideUtility<'a> {
  evaluator: &'a dyn PerformanceEvaluator,
  semicov: DMatrix<f64>,
  profile: RiskProfile,
  risk_free: f64,
  periods_per_year: f64,
}

impl<'a> DownsideUtility<'a> {
  pub fn new(input: &StrategyInput<'a>) -> Self {
    let ppy = input.config.periods_per_year as f64;
    let threshold = input.config.risk_free_rate / ppy;

    Self {
      evaluator: input.evaluator,
      semicov: downside_semicovariance(input.returns, threshold),
      profile: *input.profile,
      risk_free: input.config.risk_free_rate,
      periods_per_year: ppy,
    }
  }

  /// Sortino-style penalty; zero when there is no downside.
  pub fn sortino_penalty(&self, w: &[f64], expected_return: f64) -> f64 {
    let downside = (quad_form(w, &self.semicov).max(0.0) * self.periods_per_year).sqrt();
    if downside <= 1e-12 {
      return 0.0;
    }

    let sortino = (expected_return - self.risk_free) / downside;
    SORTINO_WEIGHT * self.profile.volatility_penalty * downside / (1.0 + sortino.max(0.0))
  }

  pub fn diversity_penalty(&self, w: &[f64]) -> f64 {
    self.profile.min_active_positions.saturating_sub(count_active(w)) as f64 * DIVERSITY_PENALTY
  }

  pub fn utility(&self, w: &[f64]) -> f64 {
    let (expected_return, volatility) = self.evaluator.evaluate(w);
    expected_return
      - self.profile.risk_aversion * volatility * volatility
      - self.diversity_penalty(w)
      - self.sortino_penalty(w, expected_return)
  }
}

impl CostFunction for DownsideUtility<'_> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let w = project_capped_simplex(x, self.profile.max_weight)
      .ok_or_else(|| anyhow::anyhow!("capped simplex is empty"))?;
    let u = self.utility(&w);

    Ok(if u.is_finite() { -u } else { f64::MAX })
  }
}

/// Uniform Dirichlet draw.
fn random_simplex_point(rng: &mut StdRng, n: usize) -> Vec<f64> {
  let draws: Vec<f64> = (0..n).map(|_| Exp1.sample(rng)).collect();
  let total: f64 = draws.iter().sum();
  if total > 1e-15 {
    draws.iter().map(|d| d / total).collect()
  } else {
    vec![1.0 / n as f64; n]
  }
}

fn local_search(input: &StrategyInput<'_>, start: Vec<f64>) -> Result<(Vec<f64>, f64), String> {
  let n = start.len();
  let cap = input.profile.max_weight;
  let delta = 0.5 * cap;

  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(start.clone());
  for i in 0..n {
    let mut point = start.clone();
    point[i] += delta;
    simplex.push(point);
  }

  let solver = NelderMead::new(simplex)
    .with_sd_tolerance(1e-10)
    .map_err(|e| format!("heuristic: invalid simplex: {e}"))?;

  let res = Executor::new(DownsideUtility::new(input), solver)
    .configure(|state| state.max_iters(input.config.max_iters))
    .run()
    .map_err(|e| format!("heuristic: local search failed: {e}"))?;

  let best_x = res.state.best_param.unwrap_or(start);
  let w = project_capped_simplex(&best_x, cap)
    .ok_or_else(|| "heuristic: solution could not be projected".to_string())?;
  let u = DownsideUtility::new(input).utility(&w);
  if u.is_finite() {
    Ok((w, u))
  } else {
    Err("heuristic: non-finite utility at solution".to_string())
  }
}

/// Run the heuristic strategy.
pub fn optimize_heuristic(input: &StrategyInput<'_>) -> StrategyOutcome {
  let n = input.assets.len();
  if n == 0 {
    return StrategyOutcome::failed("heuristic: empty universe");
  }

  let cap = input.profile.max_weight;
  if (n as f64) * cap < 1.0 - 1e-12 {
    return StrategyOutcome::failed(format!(
      "heuristic: infeasible, {n} assets cannot be fully invested under max weight {cap:.4}"
    ));
  }

  let mut rng = StdRng::seed_from_u64(input.config.seed);
  let mut best: Option<(Vec<f64>, f64)> = None;
  let mut last_error = String::from("heuristic: no restart produced a feasible allocation");

  for restart in 0..input.config.restarts.max(1) {
    let raw = if restart == 0 {
      vec![1.0 / n as f64; n]
    } else {
      random_simplex_point(&mut rng, n)
    };
    let Some(start) = project_capped_simplex(&raw, cap) else {
      continue;
    };

    match local_search(input, start) {
      Ok((w, u)) if is_feasible(&w, cap) => {
        debug!(restart, utility = u, active = count_active(&w), "heuristic restart finished");
        if best.as_ref().map_or(true, |(_, b)| u > *b) {
          best = Some((w, u));
        }
      }
      Ok(_) => last_error = format!("heuristic: restart {restart} ended infeasible"),
      Err(msg) => {
        debug!(restart, %msg, "heuristic restart failed");
        last_error = msg;
      }
    }
  }

  match best {
    Some((w, _)) => finalize(input, Strategy::Heuristic, &w),
    None => StrategyOutcome::failed(last_error),
  }
}
