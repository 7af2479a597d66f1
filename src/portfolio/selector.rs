//! # Strategy Selector
//!
//! $$
//! s_0=\begin{cases}\text{Convex} & n\le n_{\max}\\ \text{Heuristic} & n>n_{\max}\end{cases},\qquad
//! s_1=\text{Heuristic}\ \text{iff}\ s_0=\text{Convex}\ \text{failed}
//! $$
//!
//! Routing between strategies by universe size, with a single fallback.

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::types::PerformanceMetrics;
use super::types::Strategy;
use super::types::StrategyOutcome;
use super::types::WeightVector;
use crate::error::OptimizationError;

/// Pure routing decision: which strategy to try next, if any.
pub fn next_strategy(
  universe_size: usize,
  convex_universe_limit: usize,
  previous: Option<(Strategy, &StrategyOutcome)>,
) -> Option<Strategy> {
  match previous {
    None if universe_size <= convex_universe_limit => Some(Strategy::Convex),
    None => Some(Strategy::Heuristic),
    Some((Strategy::Convex, outcome)) if !outcome.is_solved() => Some(Strategy::Heuristic),
    Some(_) => None,
  }
}

/// Drives strategy attempts according to [`next_strategy`].
#[derive(Clone, Copy, Debug)]
pub struct StrategySelector {
  pub convex_universe_limit: usize,
}

impl Default for StrategySelector {
  fn default() -> Self {
    Self {
      convex_universe_limit: 20,
    }
  }
}

impl StrategySelector {
  pub fn new(convex_universe_limit: usize) -> Self {
    Self {
      convex_universe_limit,
    }
  }

  /// Run strategies through `attempt` until one succeeds or the policy is exhausted.
  pub fn select<F>(
    &self,
    universe_size: usize,
    mut attempt: F,
  ) -> Result<(Strategy, WeightVector, PerformanceMetrics), OptimizationError>
  where
    F: FnMut(Strategy) -> StrategyOutcome,
  {
    let mut previous: Option<(Strategy, StrategyOutcome)> = None;

    while let Some(strategy) = next_strategy(
      universe_size,
      self.convex_universe_limit,
      previous.as_ref().map(|(s, o)| (*s, o)),
    ) {
      debug!(%strategy, universe_size, "attempting strategy");
      let outcome = attempt(strategy);

      match &outcome {
        StrategyOutcome::Solved { weights, metrics } => {
          info!(
            %strategy,
            positions = weights.len(),
            sharpe = metrics.sharpe_ratio,
            "optimization succeeded"
          );
          return Ok((strategy, weights.clone(), *metrics));
        }
        StrategyOutcome::Failed { message } => {
          warn!(%strategy, %message, "strategy failed");
        }
      }

      previous = Some((strategy, outcome));
    }

    let last = match previous {
      Some((_, StrategyOutcome::Failed { message })) => message,
      _ => "no strategy attempted".to_string(),
    };
    Err(OptimizationError::AllStrategiesExhausted { last })
  }
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;

  fn solved() -> StrategyOutcome {
    StrategyOutcome::Solved {
      weights: WeightVector::new(vec![("A".into(), 1.0)]),
      metrics: PerformanceMetrics::default(),
    }
  }

  #[test]
  fn routing_policy() {
    let failed = StrategyOutcome::failed("boom");
    let ok = solved();

    assert_eq!(next_strategy(10, 20, None), Some(Strategy::Convex));
    assert_eq!(next_strategy(20, 20, None), Some(Strategy::Convex));
    assert_eq!(next_strategy(25, 20, None), Some(Strategy::Heuristic));
    assert_eq!(
      next_strategy(10, 20, Some((Strategy::Convex, &failed))),
      Some(Strategy::Heuristic)
    );
    assert_eq!(next_strategy(10, 20, Some((Strategy::Convex, &ok))), None);
    assert_eq!(next_strategy(25, 20, Some((Strategy::Heuristic, &failed))), None);
  }

  #[test]
  fn large_universe_never_tries_convex() {
    let mut calls = Vec::new();
    let result = StrategySelector::default().select(25, |s| {
      calls.push(s);
      solved()
    });

    assert!(result.is_ok());
    assert_eq!(calls, vec![Strategy::Heuristic]);
  }

  #[test]
  fn small_universe_tries_convex_first() {
    let mut calls = Vec::new();
    let (strategy, ..) = StrategySelector::default()
      .select(10, |s| {
        calls.push(s);
        solved()
      })
      .unwrap();

    assert_eq!(strategy, Strategy::Convex);
    assert_eq!(calls, vec![Strategy::Convex]);
  }

  #[test]
  #[traced_test]
  fn convex_failure_falls_back_once() {
    let mut calls = Vec::new();
    let (strategy, ..) = StrategySelector::default()
      .select(10, |s| {
        calls.push(s);
        match s {
          Strategy::Convex => StrategyOutcome::failed("convex: infeasible"),
          Strategy::Heuristic => solved(),
        }
      })
      .unwrap();

    assert_eq!(strategy, Strategy::Heuristic);
    assert_eq!(calls, vec![Strategy::Convex, Strategy::Heuristic]);
    assert!(logs_contain("strategy failed"));
  }

  #[test]
  fn exhaustion_carries_last_diagnostic() {
    let mut calls = 0;
    let err = StrategySelector::default()
      .select(10, |s| {
        calls += 1;
        StrategyOutcome::failed(format!("{s} failed"))
      })
      .unwrap_err();

    assert_eq!(calls, 2);
    assert_eq!(
      err,
      OptimizationError::AllStrategiesExhausted {
        last: "heuristic failed".to_string()
      }
    );
  }
}
