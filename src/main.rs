use std::collections::HashMap;

use anyhow::Context;
use anyhow::Result;
use ndarray::Array2;
use portfolio_allocator::PortfolioService;
use portfolio_allocator::PriceProvider;
use portfolio_allocator::ReturnsProvider;
use portfolio_allocator::RiskLevel;
use prettytable::row;
use prettytable::Table;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Seeded market with normally distributed monthly returns.
struct SyntheticMarket {
  symbols: Vec<String>,
  returns: Array2<f64>,
  prices: HashMap<String, f64>,
}

impl SyntheticMarket {
  fn generate(assets: usize, months: usize, seed: u64) -> Result<Self> {
    let mut rng = StdRng::seed_from_u64(seed);
    let symbols: Vec<String> = (0..assets).map(|i| format!("AST{i:02}")).collect();

    let mut returns = Array2::zeros((months, assets));
    for (i, mut column) in returns.columns_mut().into_iter().enumerate() {
      let drift = 0.002 + 0.0008 * i as f64;
      let vol = 0.03 + 0.004 * (i % 7) as f64;
      let dist = Normal::new(drift, vol)?;
      column.iter_mut().for_each(|r| *r = dist.sample(&mut rng));
    }

    let prices = symbols
      .iter()
      .enumerate()
      .map(|(i, s)| (s.clone(), 15.0 + 11.0 * ((i * 37) % 23) as f64))
      .collect();

    Ok(Self {
      symbols,
      returns,
      prices,
    })
  }
}

impl ReturnsProvider for SyntheticMarket {
  fn symbols(&self) -> Result<Vec<String>> {
    Ok(self.symbols.clone())
  }

  fn returns(&self, symbols: &[String]) -> Result<Array2<f64>> {
    anyhow::ensure!(symbols == self.symbols.as_slice(), "unknown symbol set");
    Ok(self.returns.clone())
  }
}

impl PriceProvider for SyntheticMarket {
  fn prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
    symbols
      .iter()
      .map(|s| {
        self
          .prices
          .get(s)
          .map(|p| (s.clone(), *p))
          .with_context(|| format!("no quote for {s}"))
      })
      .collect()
  }
}

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "portfolio_allocator=info".into()))
    .with(tracing_subscriber::fmt::layer())
    .init();

  // usage: portfolio-allocator [investment] [risk level] [horizon months] [assets]
  let args: Vec<String> = std::env::args().skip(1).collect();
  let investment: f64 = match args.first() {
    Some(s) => s.parse().context("investment must be a number")?,
    None => 100_000.0,
  };
  let risk_level: RiskLevel = match args.get(1) {
    Some(s) => s.parse()?,
    None => RiskLevel::Medium,
  };
  let horizon_months: u32 = match args.get(2) {
    Some(s) => s.parse().context("horizon must be a whole number of months")?,
    None => 24,
  };
  let assets: usize = match args.get(3) {
    Some(s) => s.parse().context("asset count must be a whole number")?,
    None => 12,
  };

  let market = SyntheticMarket::generate(assets, 60, 7)?;
  let service = PortfolioService::default();
  let plan =
    service.create_optimized_portfolio(&market, &market, investment, risk_level, horizon_months)?;

  let mut table = Table::new();
  table.add_row(row!["Symbol", "Target", "Shares", "Price", "Amount", "Weight"]);
  for line in &plan.allocation.lines {
    let target = plan.optimized.weights.get(&line.symbol).unwrap_or(0.0);
    table.add_row(row![
      line.symbol,
      format!("{:.2}%", target * 100.0),
      line.shares,
      format!("{:.2}", line.price),
      format!("{:.2}", line.amount),
      format!("{:.2}%", line.weight * 100.0)
    ]);
  }
  table.printstd();

  let metrics = plan.optimized.metrics;
  println!(
    "strategy {} | risk {} | horizon {}m",
    plan.optimized.strategy, plan.optimized.risk_level, plan.optimized.horizon_months
  );
  println!(
    "expected return {:.2}% | volatility {:.2}% | sharpe {:.3}",
    metrics.expected_return * 100.0,
    metrics.volatility * 100.0,
    metrics.sharpe_ratio
  );
  println!(
    "invested {:.2} of {:.2} ({:.1}%), remaining {:.2}",
    plan.total_invested(),
    investment,
    plan.allocation.utilization() * 100.0,
    plan.remaining()
  );

  Ok(())
}
