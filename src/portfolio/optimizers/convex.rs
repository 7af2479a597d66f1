//! # Convex Strategy
//!
//! $$
//! \min_{\mathbf w}\ \tfrac12\,\mathbf w^\top(2\gamma\hat\Sigma)\mathbf w-\hat\mu^\top\mathbf w
//! \quad\text{s.t.}\quad \mathbf 1^\top\mathbf w=1,\ 0\le w_i\le u
//! $$
//!
//! Mean-variance quadratic program over an exponentially weighted mean and
//! a diagonal-shrinkage covariance, solved with the Clarabel interior-point
//! solver.

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettingsBuilder;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT::NonnegativeConeT;
use clarabel::solver::SupportedConeT::ZeroConeT;
use nalgebra::DMatrix;
use nalgebra::DVector;
use tracing::debug;

use super::count_active;
use super::finalize;
use super::project_capped_simplex;
use super::StrategyInput;
use crate::portfolio::data::annualized_ewm_returns;
use crate::portfolio::data::sample_covariance;
use crate::portfolio::data::shrink_to_diagonal;
use crate::portfolio::types::Strategy;
use crate::portfolio::types::StrategyOutcome;

const MIN_VARIANCE: f64 = 1e-12;

/// Run the convex mean-variance strategy.
pub fn optimize_convex(input: &StrategyInput<'_>) -> StrategyOutcome {
  let n = input.assets.len();
  if n == 0 {
    return StrategyOutcome::failed("convex: empty universe");
  }

  let cfg = input.config;
  let profile = input.profile;
  let ppy = cfg.periods_per_year as f64;

  let sample = sample_covariance(input.returns);
  if let Err(msg) = check_covariance(&sample, input.assets) {
    return StrategyOutcome::failed(msg);
  }

  let mu = annualized_ewm_returns(input.returns, cfg.ewm_alpha, ppy);
  let sigma = shrink_to_diagonal(&sample, cfg.shrinkage) * ppy;

  if (n as f64) * profile.max_weight < 1.0 - 1e-12 {
    return StrategyOutcome::failed(format!(
      "convex: infeasible, {n} assets cannot be fully invested under max weight {:.4}",
      profile.max_weight
    ));
  }

  let max_iters = u32::try_from(cfg.max_iters).unwrap_or(u32::MAX);
  let mut w = match solve_capped_qp(&mu, &sigma, profile.risk_aversion, profile.max_weight, max_iters) {
    Ok(w) => w,
    Err(msg) => return StrategyOutcome::failed(msg),
  };

  let needed = profile.min_active_positions;
  if needed > 0 && count_active(&w) < needed && n >= needed {
    let tight = profile.max_weight.min(1.0 / needed as f64);
    debug!(
      active = count_active(&w),
      needed,
      cap = tight,
      "convex solution too concentrated, re-solving with tighter cap"
    );
    w = match solve_capped_qp(&mu, &sigma, profile.risk_aversion, tight, max_iters) {
      Ok(w) => w,
      Err(msg) => return StrategyOutcome::failed(msg),
    };
  }

  finalize(input, Strategy::Convex, &w)
}

fn check_covariance(cov: &DMatrix<f64>, assets: &[String]) -> Result<(), String> {
  if cov.iter().any(|c| !c.is_finite()) {
    return Err("convex: covariance matrix has non-finite entries".to_string());
  }

  for (i, symbol) in assets.iter().enumerate() {
    if cov[(i, i)] <= MIN_VARIANCE {
      return Err(format!(
        "convex: degenerate covariance, {symbol} has zero variance"
      ));
    }
  }

  Ok(())
}

/// Upper triangle of `scale * mat` in compressed-column form.
fn upper_triangle_csc(mat: &DMatrix<f64>, scale: f64) -> CscMatrix<f64> {
  let n = mat.ncols();
  let mut colptr = Vec::with_capacity(n + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();

  colptr.push(0);
  for j in 0..n {
    for i in 0..=j {
      let v = mat[(i, j)] * scale;
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(nzval.len());
  }

  CscMatrix::new(n, n, colptr, rowval, nzval)
}

/// Constraint rows `[1ᵀ; -I; I]`: budget, non-negativity and cap.
fn capped_simplex_constraints(n: usize) -> CscMatrix<f64> {
  let mut colptr = Vec::with_capacity(n + 1);
  let mut rowval = Vec::with_capacity(3 * n);
  let mut nzval = Vec::with_capacity(3 * n);

  colptr.push(0);
  for j in 0..n {
    rowval.push(0);
    nzval.push(1.0);
    rowval.push(1 + j);
    nzval.push(-1.0);
    rowval.push(1 + n + j);
    nzval.push(1.0);
    colptr.push(nzval.len());
  }

  CscMatrix::new(1 + 2 * n, n, colptr, rowval, nzval)
}

/// Minimize `gamma * w'Σw - mu'w` over the capped simplex.
pub(crate) fn solve_capped_qp(
  mu: &DVector<f64>,
  sigma: &DMatrix<f64>,
  gamma: f64,
  cap: f64,
  max_iters: u32,
) -> Result<Vec<f64>, String> {
  let n = mu.len();
  if (n as f64) * cap < 1.0 - 1e-12 {
    return Err(format!("convex: infeasible cap {cap:.4} for {n} assets"));
  }

  let p = upper_triangle_csc(sigma, 2.0 * gamma);
  let q: Vec<f64> = mu.iter().map(|m| -m).collect();
  let a = capped_simplex_constraints(n);

  let mut b = Vec::with_capacity(1 + 2 * n);
  b.push(1.0);
  b.extend(std::iter::repeat(0.0).take(n));
  b.extend(std::iter::repeat(cap).take(n));

  let cones = [ZeroConeT(1), NonnegativeConeT(2 * n)];

  let settings = DefaultSettingsBuilder::default()
    .max_iter(max_iters)
    .verbose(false)
    .build()
    .map_err(|e| format!("convex: invalid solver settings: {e}"))?;

  let mut solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings)
    .map_err(|e| format!("convex: solver setup failed: {e:?}"))?;
  solver.solve();

  let status = &solver.solution.status;
  if !matches!(status, SolverStatus::Solved) {
    return Err(format!("convex: QP not solved, status {status:?}"));
  }
  debug!(
    iterations = solver.solution.iterations,
    objective = solver.solution.obj_val,
    "convex QP solved"
  );

  // interior-point iterates sit a hair inside or outside the bounds
  project_capped_simplex(&solver.solution.x, cap)
    .ok_or_else(|| "convex: solution could not be mapped onto the capped simplex".to_string())
}
