//! # Portfolio Service
//!
//! $$
//! (R,\ p)\xrightarrow{\ \text{optimize}\ }\mathbf w\xrightarrow{\ \text{allocate}(B,p)\ }\{n_i\}
//! $$
//!
//! Wires injected market-data collaborators to the optimizer and the
//! allocation mapper. Providers are passed in explicitly; nothing here
//! reaches into process-wide state.

use std::collections::HashMap;

use anyhow::Result;
use ndarray::Array2;
use tracing::info;

use crate::allocation::AllocationMapper;
use crate::allocation::DiscreteAllocation;
use crate::error::ServiceError;
use crate::portfolio::engine::PortfolioOptimizer;
use crate::portfolio::types::OptimizedPortfolio;
use crate::portfolio::types::RiskLevel;

/// Supplies the tradable universe and its historical returns.
pub trait ReturnsProvider {
  /// Symbols the provider can serve.
  fn symbols(&self) -> Result<Vec<String>>;
  /// Periods x assets returns, columns in the order of `symbols`.
  fn returns(&self, symbols: &[String]) -> Result<Array2<f64>>;
}

/// Supplies current prices.
pub trait PriceProvider {
  fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>>;
}

/// Optimized weights together with their discrete allocation.
#[derive(Clone, Debug)]
pub struct PortfolioPlan {
  pub optimized: OptimizedPortfolio,
  pub allocation: DiscreteAllocation,
}

impl PortfolioPlan {
  pub fn total_invested(&self) -> f64 {
    self.allocation.total_invested
  }

  pub fn remaining(&self) -> f64 {
    self.allocation.remaining
  }
}

/// End-to-end optimize-then-allocate workflow.
#[derive(Clone, Debug, Default)]
pub struct PortfolioService {
  optimizer: PortfolioOptimizer,
  mapper: AllocationMapper,
}

impl PortfolioService {
  pub fn new(optimizer: PortfolioOptimizer, mapper: AllocationMapper) -> Self {
    Self { optimizer, mapper }
  }

  pub fn optimizer(&self) -> &PortfolioOptimizer {
    &self.optimizer
  }

  /// Build a whole-share portfolio for `investment` at the given risk level and horizon.
  pub fn create_optimized_portfolio<R, P>(
    &self,
    returns_provider: &R,
    price_provider: &P,
    investment: f64,
    risk_level: RiskLevel,
    horizon_months: u32,
  ) -> Result<PortfolioPlan, ServiceError>
  where
    R: ReturnsProvider + ?Sized,
    P: PriceProvider + ?Sized,
  {
    let symbols = returns_provider.symbols()?;
    let returns = returns_provider.returns(&symbols)?;

    let optimized = self
      .optimizer
      .optimize(&symbols, returns.view(), risk_level, horizon_months)?;

    let weighted: Vec<String> = optimized.weights.symbols().map(str::to_string).collect();
    let prices = price_provider.prices(&weighted)?;
    let allocation = self.mapper.allocate(&optimized.weights, investment, &prices)?;

    info!(
      %risk_level,
      horizon_months,
      investment,
      total_invested = allocation.total_invested,
      "portfolio plan created"
    );

    Ok(PortfolioPlan {
      optimized,
      allocation,
    })
  }
}

#[cfg(test)]
mod tests {
  use anyhow::anyhow;
  use approx::assert_abs_diff_eq;

  use super::*;
  use crate::error::AllocationError;
  use crate::error::OptimizationError;
  use crate::portfolio::engine::OptimizerConfig;

  struct StaticMarket {
    symbols: Vec<String>,
    prices: HashMap<String, f64>,
  }

  impl StaticMarket {
    fn new(n: usize) -> Self {
      let symbols: Vec<String> = (0..n).map(|i| format!("T{i}")).collect();
      let prices = symbols
        .iter()
        .enumerate()
        .map(|(i, s)| (s.clone(), 20.0 + 7.5 * i as f64))
        .collect();
      Self { symbols, prices }
    }
  }

  impl ReturnsProvider for StaticMarket {
    fn symbols(&self) -> Result<Vec<String>> {
      Ok(self.symbols.clone())
    }

    fn returns(&self, symbols: &[String]) -> Result<Array2<f64>> {
      Ok(Array2::from_shape_fn((36, symbols.len()), |(t, i)| {
        0.005 + 0.0007 * i as f64 + 0.028 * (t as f64 * (0.55 + 0.33 * i as f64)).sin()
      }))
    }
  }

  impl PriceProvider for StaticMarket {
    fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
      symbols
        .iter()
        .map(|s| {
          self
            .prices
            .get(s)
            .map(|p| (s.clone(), *p))
            .ok_or_else(|| anyhow!("no quote for {s}"))
        })
        .collect()
    }
  }

  struct EmptyQuotes;

  impl PriceProvider for EmptyQuotes {
    fn prices(&self, _: &[String]) -> Result<HashMap<String, f64>> {
      Ok(HashMap::new())
    }
  }

  fn service() -> PortfolioService {
    PortfolioService::new(
      PortfolioOptimizer::new(OptimizerConfig {
        max_iters: 1500,
        ..OptimizerConfig::default()
      }),
      AllocationMapper::default(),
    )
  }

  #[test]
  fn creates_plan_within_band() {
    let market = StaticMarket::new(8);
    let plan = service()
      .create_optimized_portfolio(&market, &market, 50_000.0, RiskLevel::Medium, 12)
      .unwrap();

    let utilization = plan.allocation.utilization();
    assert!((0.90..=1.02).contains(&utilization), "utilization {utilization}");
    assert_abs_diff_eq!(plan.remaining(), 50_000.0 - plan.total_invested(), epsilon = 1e-9);
    assert!(plan
      .allocation
      .lines
      .iter()
      .all(|l| plan.optimized.weights.get(&l.symbol).is_some()));
  }

  #[test]
  fn surfaces_allocation_errors() {
    let market = StaticMarket::new(6);
    let err = service()
      .create_optimized_portfolio(&market, &EmptyQuotes, 10_000.0, RiskLevel::High, 12)
      .unwrap_err();

    assert!(matches!(
      err,
      ServiceError::Allocation(AllocationError::MissingPrice(_))
    ));
  }

  #[test]
  fn surfaces_optimization_errors() {
    let market = StaticMarket::new(3);
    let err = service()
      .create_optimized_portfolio(&market, &market, 10_000.0, RiskLevel::Low, 12)
      .unwrap_err();

    assert!(matches!(
      err,
      ServiceError::Optimization(OptimizationError::AllStrategiesExhausted { .. })
    ));
  }
}
