//! # Discrete Allocation
//!
//! $$
//! n_i=\Big\lfloor\frac{w_i B}{p_i}\Big\rfloor,\qquad
//! 0.90\,B\le\sum_i n_i p_i\le 1.02\,B
//! $$
//!
//! Converts continuous weights and live prices into whole-share positions.
//! A greedy fill-up pass lifts investment into the utilization band one
//! share at a time and a trim pass removes shares when above it. Both
//! passes rank positions by their optimizer target weight (stable on ties)
//! and stop as soon as no single-share move is admissible.

use std::collections::HashMap;

use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::error::AllocationError;
use crate::portfolio::types::WeightVector;

/// Share counts below `x + FLOOR_EPS` round down to `x`.
const FLOOR_EPS: f64 = 1e-9;

/// Utilization band as fractions of the budget.
#[derive(Clone, Copy, Debug)]
pub struct AllocationConfig {
  pub min_usage: f64,
  pub max_usage: f64,
}

impl Default for AllocationConfig {
  fn default() -> Self {
    Self {
      min_usage: 0.90,
      max_usage: 1.02,
    }
  }
}

/// One whole-share position.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationLine {
  pub symbol: String,
  pub shares: u64,
  pub price: f64,
  /// `shares * price`.
  pub amount: f64,
  /// Share of the total invested amount.
  pub weight: f64,
}

/// Output of [`AllocationMapper::allocate`].
#[derive(Clone, Debug, Default)]
pub struct DiscreteAllocation {
  pub lines: Vec<AllocationLine>,
  pub budget: f64,
  pub total_invested: f64,
  /// `budget - total_invested`.
  pub remaining: f64,
}

impl DiscreteAllocation {
  pub fn shares(&self, symbol: &str) -> Option<u64> {
    self
      .lines
      .iter()
      .find(|l| l.symbol == symbol)
      .map(|l| l.shares)
  }

  /// Fraction of the budget that is invested.
  pub fn utilization(&self) -> f64 {
    if self.budget > 0.0 {
      self.total_invested / self.budget
    } else {
      0.0
    }
  }
}

#[derive(Clone, Debug)]
struct Position {
  symbol: String,
  price: f64,
  target_weight: f64,
  shares: u64,
}

impl Position {
  fn amount(&self) -> f64 {
    self.shares as f64 * self.price
  }
}

fn invested(positions: &[Position]) -> f64 {
  positions.iter().map(Position::amount).sum()
}

/// Maps a weight vector onto whole shares within the utilization band.
#[derive(Clone, Debug, Default)]
pub struct AllocationMapper {
  config: AllocationConfig,
}

impl AllocationMapper {
  pub fn new(config: AllocationConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &AllocationConfig {
    &self.config
  }

  /// Allocate `budget` across `weights` at `prices`.
  ///
  /// Fails before any adjustment pass when the budget or a needed price is
  /// invalid. When the band cannot be reached with single-share moves the
  /// closest feasible allocation is returned with its remainder.
  pub fn allocate(
    &self,
    weights: &WeightVector,
    budget: f64,
    prices: &HashMap<String, f64>,
  ) -> Result<DiscreteAllocation, AllocationError> {
    if !(budget.is_finite() && budget > 0.0) {
      return Err(AllocationError::NonPositiveBudget(budget));
    }

    let mut positions = Vec::with_capacity(weights.len());
    for (symbol, weight) in weights.iter() {
      let price = *prices
        .get(symbol)
        .ok_or_else(|| AllocationError::MissingPrice(symbol.to_string()))?;
      if !(price.is_finite() && price > 0.0) {
        return Err(AllocationError::NonPositivePrice {
          symbol: symbol.to_string(),
          price,
        });
      }

      let shares = ((weight * budget / price) + FLOOR_EPS).floor().max(0.0) as u64;
      positions.push(Position {
        symbol: symbol.to_string(),
        price,
        target_weight: weight,
        shares,
      });
    }
    positions.retain(|p| p.shares > 0);

    let lower = self.config.min_usage * budget;
    let upper = self.config.max_usage * budget;

    let filled = fill_up(&mut positions, lower, upper);
    let trimmed = trim(&mut positions, upper);
    debug!(filled, trimmed, "allocation adjustment passes finished");

    positions.retain(|p| p.shares > 0);
    let total_invested = invested(&positions);
    if total_invested < lower {
      warn!(
        total_invested,
        lower, "allocation below utilization band, no single share fits"
      );
    }

    let lines = positions
      .into_iter()
      .map(|p| {
        let amount = p.amount();
        AllocationLine {
          weight: if total_invested > 0.0 {
            amount / total_invested
          } else {
            0.0
          },
          symbol: p.symbol,
          shares: p.shares,
          price: p.price,
          amount,
        }
      })
      .collect::<Vec<_>>();

    info!(
      positions = lines.len(),
      total_invested,
      remaining = budget - total_invested,
      "discrete allocation complete"
    );

    Ok(DiscreteAllocation {
      lines,
      budget,
      total_invested,
      remaining: budget - total_invested,
    })
  }
}

/// Indices sorted by target weight, descending or ascending; ties keep input order.
fn rank(positions: &[Position], descending: bool) -> Vec<usize> {
  let mut order: Vec<usize> = (0..positions.len()).collect();
  order.sort_by(|&a, &b| {
    let (wa, wb) = (positions[a].target_weight, positions[b].target_weight);
    if descending {
      wb.total_cmp(&wa)
    } else {
      wa.total_cmp(&wb)
    }
  });
  order
}

/// Add single shares to the highest-ranked position that keeps the total
/// within `upper` until `lower` is reached. Returns shares added.
fn fill_up(positions: &mut [Position], lower: f64, upper: f64) -> u64 {
  let order = rank(positions, true);
  let min_price = positions
    .iter()
    .map(|p| p.price)
    .fold(f64::INFINITY, f64::min);
  if positions.is_empty() || !min_price.is_finite() {
    return 0;
  }

  let mut total = invested(positions);
  let max_steps = ((upper - total).max(0.0) / min_price).ceil() as u64 + 1;
  let mut added = 0;

  while total < lower && added < max_steps {
    let Some(&i) = order.iter().find(|&&i| total + positions[i].price <= upper) else {
      break;
    };
    positions[i].shares += 1;
    total = invested(positions);
    added += 1;
  }

  added
}

/// Remove single shares from the lowest-ranked positions until the total
/// is within `upper`. Returns shares removed.
fn trim(positions: &mut [Position], upper: f64) -> u64 {
  let mut total = invested(positions);
  if total <= upper {
    return 0;
  }

  let mut removed = 0;
  for i in rank(positions, false) {
    while total > upper && positions[i].shares > 0 {
      positions[i].shares -= 1;
      total = invested(positions);
      removed += 1;
    }
    if total <= upper {
      break;
    }
  }

  removed
}
