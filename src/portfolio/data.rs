//! # Portfolio Data Utilities
//!
//! $$
//! \hat\Sigma=(1-\lambda)\Sigma_{\text{sample}}+\lambda\,\operatorname{diag}(\Sigma_{\text{sample}})
//! $$
//!
//! Return cleaning (imputation + winsorization) and the moment estimators
//! consumed by the optimization strategies.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;
use ndarray::Axis;

use super::optimizers::PerformanceEvaluator;

/// Cleans a raw periods x assets return matrix.
///
/// Infinite values become missing, missing values are imputed with the
/// column mean, then every column is clipped to its quantile band.
/// A column with no finite observation stays NaN; callers are expected to
/// reject such assets before optimizing.
#[derive(Clone, Copy, Debug)]
pub struct ReturnsPreprocessor {
  /// Lower winsorization quantile.
  pub lower_quantile: f64,
  /// Upper winsorization quantile.
  pub upper_quantile: f64,
}

impl Default for ReturnsPreprocessor {
  fn default() -> Self {
    Self {
      lower_quantile: 0.01,
      upper_quantile: 0.99,
    }
  }
}

impl ReturnsPreprocessor {
  pub fn new(lower_quantile: f64, upper_quantile: f64) -> Self {
    Self {
      lower_quantile,
      upper_quantile,
    }
  }

  /// Clean `raw`, returning a matrix of identical shape.
  pub fn clean(&self, raw: ArrayView2<f64>) -> Array2<f64> {
    let mut out = raw.to_owned();

    for mut col in out.axis_iter_mut(Axis(1)) {
      let finite: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
      let mean = if finite.is_empty() {
        f64::NAN
      } else {
        finite.iter().sum::<f64>() / finite.len() as f64
      };

      col.mapv_inplace(|v| if v.is_finite() { v } else { mean });

      if !mean.is_finite() {
        continue;
      }

      let mut sorted = col.to_vec();
      sorted.sort_by(|a, b| a.total_cmp(b));
      let lo = quantile_sorted(&sorted, self.lower_quantile);
      let hi = quantile_sorted(&sorted, self.upper_quantile);
      col.mapv_inplace(|v| v.clamp(lo, hi));
    }

    out
  }
}

/// Linear-interpolated quantile of an ascending slice.
pub(crate) fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
  if sorted.is_empty() {
    return f64::NAN;
  }

  let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
  let lo = pos.floor() as usize;
  let hi = pos.ceil() as usize;
  let frac = pos - lo as f64;
  sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Exponentially weighted mean with smoothing `alpha`; the latest
/// observation carries weight 1 and older ones decay by `1 - alpha`.
pub fn ewm_mean(xs: ArrayView1<f64>, alpha: f64) -> f64 {
  let decay = 1.0 - alpha;
  let mut num = 0.0;
  let mut den = 0.0;
  let mut w = 1.0;

  for &x in xs.iter().rev() {
    num += w * x;
    den += w;
    w *= decay;
  }

  if den > 0.0 {
    num / den
  } else {
    0.0
  }
}

/// Per-asset EW mean compounded to an annual rate.
pub fn annualized_ewm_returns(returns: ArrayView2<f64>, alpha: f64, periods_per_year: f64) -> DVector<f64> {
  DVector::from_iterator(
    returns.ncols(),
    returns
      .axis_iter(Axis(1))
      .map(|col| (1.0 + ewm_mean(col, alpha)).powf(periods_per_year) - 1.0),
  )
}

/// Column means.
pub fn mean_returns(returns: ArrayView2<f64>) -> DVector<f64> {
  let n_periods = returns.nrows().max(1) as f64;
  DVector::from_iterator(
    returns.ncols(),
    returns
      .axis_iter(Axis(1))
      .map(|col| col.sum() / n_periods),
  )
}

/// Unbiased sample covariance of the columns.
pub fn sample_covariance(returns: ArrayView2<f64>) -> DMatrix<f64> {
  let (t, n) = returns.dim();
  if t < 2 {
    return DMatrix::zeros(n, n);
  }

  let mu = mean_returns(returns);
  let mut cov = DMatrix::zeros(n, n);
  for i in 0..n {
    for j in i..n {
      let mut acc = 0.0;
      for k in 0..t {
        acc += (returns[[k, i]] - mu[i]) * (returns[[k, j]] - mu[j]);
      }
      let c = acc / (t - 1) as f64;
      cov[(i, j)] = c;
      cov[(j, i)] = c;
    }
  }

  cov
}

/// Blend `cov` towards its own diagonal with intensity `lambda`.
pub fn shrink_to_diagonal(cov: &DMatrix<f64>, lambda: f64) -> DMatrix<f64> {
  let mut out = cov * (1.0 - lambda);
  for i in 0..cov.nrows() {
    out[(i, i)] = cov[(i, i)];
  }
  out
}

/// Downside semicovariance of returns below `threshold`.
///
/// $$
/// S_{ij}=\frac1T\sum_t \min(r_{ti}-\tau,0)\min(r_{tj}-\tau,0)
/// $$
pub fn downside_semicovariance(returns: ArrayView2<f64>, threshold: f64) -> DMatrix<f64> {
  let (t, n) = returns.dim();
  if t == 0 {
    return DMatrix::zeros(n, n);
  }

  let shortfall = returns.mapv(|r| (r - threshold).min(0.0));
  let mut semi = DMatrix::zeros(n, n);
  for i in 0..n {
    for j in i..n {
      let s = shortfall.column(i).dot(&shortfall.column(j)) / t as f64;
      semi[(i, j)] = s;
      semi[(j, i)] = s;
    }
  }

  semi
}

pub(crate) fn quad_form(w: &[f64], mat: &DMatrix<f64>) -> f64 {
  let w = DVector::from_column_slice(w);
  (w.transpose() * mat * &w)[(0, 0)]
}

/// Annualized sample mean and covariance of a cleaned return matrix.
///
/// The default performance evaluator used by the orchestrator.
#[derive(Clone, Debug)]
pub struct SampleMoments {
  mean: DVector<f64>,
  cov: DMatrix<f64>,
  periods_per_year: f64,
}

impl SampleMoments {
  pub fn from_returns(returns: ArrayView2<f64>, periods_per_year: f64) -> Self {
    Self {
      mean: mean_returns(returns),
      cov: sample_covariance(returns),
      periods_per_year,
    }
  }

  pub fn mean(&self) -> &DVector<f64> {
    &self.mean
  }

  pub fn covariance(&self) -> &DMatrix<f64> {
    &self.cov
  }
}

impl PerformanceEvaluator for SampleMoments {
  fn evaluate(&self, weights: &[f64]) -> (f64, f64) {
    let expected = self
      .mean
      .iter()
      .zip(weights.iter())
      .map(|(m, w)| m * w)
      .sum::<f64>()
      * self.periods_per_year;
    let variance = quad_form(weights, &self.cov).max(0.0) * self.periods_per_year;

    (expected, variance.sqrt())
  }
}
