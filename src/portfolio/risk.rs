//! # Risk Profiles
//!
//! $$
//! \gamma_{\text{eff}}=\gamma_{\text{base}}\cdot m(h),\qquad
//! m(h)=\begin{cases}1.5 & h<6\\ 1 & 6\le h\le 36\\ 0.8 & h>36\end{cases}
//! $$
//!
//! Base risk table and the horizon adjustment. Profiles are plain values
//! derived per request; the base table is never modified.

use super::types::RiskLevel;
use super::types::RiskProfile;

/// Horizons strictly below this many months are treated as short-term.
pub const SHORT_HORIZON_MONTHS: u32 = 6;
/// Horizons strictly above this many months are treated as long-term.
pub const LONG_HORIZON_MONTHS: u32 = 36;

/// Per-category base constraints.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskTable {
  pub low: RiskProfile,
  pub medium: RiskProfile,
  pub high: RiskProfile,
}

impl Default for RiskTable {
  fn default() -> Self {
    Self {
      low: RiskProfile::new(0.15, 8, 1.5, 1.5),
      medium: RiskProfile::new(0.25, 5, 1.0, 1.0),
      high: RiskProfile::new(0.35, 3, 0.5, 0.5),
    }
  }
}

impl RiskTable {
  pub fn base(&self, level: RiskLevel) -> RiskProfile {
    match level {
      RiskLevel::Low => self.low,
      RiskLevel::Medium => self.medium,
      RiskLevel::High => self.high,
    }
  }
}

/// Apply the horizon adjustment to a base profile.
pub fn adjust_for_horizon(base: RiskProfile, horizon_months: u32) -> RiskProfile {
  if horizon_months > LONG_HORIZON_MONTHS {
    RiskProfile {
      risk_aversion: base.risk_aversion * 0.8,
      volatility_penalty: base.volatility_penalty * 0.8,
      ..base
    }
  } else if horizon_months < SHORT_HORIZON_MONTHS {
    RiskProfile {
      max_weight: base.max_weight * 0.8,
      min_active_positions: base.min_active_positions + 2,
      risk_aversion: base.risk_aversion * 1.5,
      volatility_penalty: base.volatility_penalty * 1.5,
    }
  } else {
    base
  }
}

/// Derive the effective profile for one request.
pub fn derive_profile(table: &RiskTable, level: RiskLevel, horizon_months: u32) -> RiskProfile {
  adjust_for_horizon(table.base(level), horizon_months)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  #[test]
  fn mid_horizon_returns_base_profile() {
    let table = RiskTable::default();
    for h in [6, 12, 36] {
      assert_eq!(derive_profile(&table, RiskLevel::Medium, h), table.medium);
    }
  }

  #[test]
  fn short_horizon_is_defensive() {
    let p = derive_profile(&RiskTable::default(), RiskLevel::High, 3);

    assert_abs_diff_eq!(p.max_weight, 0.28, epsilon = 1e-12);
    assert_eq!(p.min_active_positions, 5);
    assert_abs_diff_eq!(p.risk_aversion, 0.75, epsilon = 1e-12);
    assert_abs_diff_eq!(p.volatility_penalty, 0.75, epsilon = 1e-12);
  }

  #[test]
  fn long_horizon_is_growth_tolerant() {
    let p = derive_profile(&RiskTable::default(), RiskLevel::Low, 48);

    assert_abs_diff_eq!(p.max_weight, 0.15, epsilon = 1e-12);
    assert_eq!(p.min_active_positions, 8);
    assert_abs_diff_eq!(p.risk_aversion, 1.2, epsilon = 1e-12);
    assert_abs_diff_eq!(p.volatility_penalty, 1.2, epsilon = 1e-12);
  }

  #[test]
  fn risk_aversion_decreases_with_horizon() {
    let table = RiskTable::default();
    for level in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
      let short = derive_profile(&table, level, 3).risk_aversion;
      let mid = derive_profile(&table, level, 12).risk_aversion;
      let long = derive_profile(&table, level, 48).risk_aversion;
      assert!(short > mid && mid > long, "{level}: {short} {mid} {long}");
    }
  }

  #[test]
  fn repeated_derivation_does_not_compound() {
    let table = RiskTable::default();
    let first = derive_profile(&table, RiskLevel::Medium, 3);
    let _ = derive_profile(&table, RiskLevel::Medium, 3);
    let _ = derive_profile(&table, RiskLevel::Medium, 48);
    let again = derive_profile(&table, RiskLevel::Medium, 3);

    assert_eq!(first, again);
    assert_eq!(table, RiskTable::default());
  }
}
