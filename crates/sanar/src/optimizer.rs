//! Orders healing strategies by what has worked before.

use crate::failure::FailureType;
use crate::history::HistoryLedger;
use crate::result::{HealError, HealResult};
use crate::strategy::DEFAULT_PRIORITY;
use crate::SNAPSHOT_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, warn};

/// Lowest base priority reachable through failures
pub const MIN_BASE_PRIORITY: f64 = 1.0;

const SUCCESS_RATE_WEIGHT: f64 = 5.0;
const ELEMENT_TYPE_CAP: f64 = 3.0;
const EXPERIENCE_CAP: f64 = 2.0;
const ATTEMPTED_PENALTY: f64 = 5.0;
const SUCCESS_BOOST: f64 = 0.5;
const FAILURE_PENALTY: f64 = 0.2;

/// Strategy with its current score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRanking {
    /// Strategy name
    pub strategy: String,
    /// Score, higher first
    pub score: f64,
}

/// Versioned optimizer export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSnapshot {
    /// Format version
    pub version: u32,
    /// Learned base priorities
    pub base_priorities: BTreeMap<String, f64>,
}

/// Learned strategy ordering
#[derive(Debug, Default)]
pub struct StrategyOptimizer {
    base_priorities: HashMap<String, f64>,
    attempted: HashSet<String>,
}

/// Bonus for strategies the failure type suggests, earlier ones more
fn failure_affinity(strategy: &str, failure_type: FailureType) -> f64 {
    failure_type
        .suggested_strategies()
        .iter()
        .position(|s| *s == strategy)
        .map_or(0.0, |pos| (2.0 - 0.5 * pos as f64).max(0.5))
}

impl StrategyOptimizer {
    /// Optimizer with no learned priorities
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a strategy's base priority unless already learned
    pub fn register(&mut self, strategy: &str, priority: f64) {
        self.base_priorities
            .entry(strategy.to_string())
            .or_insert(priority);
    }

    /// Current base priority
    #[must_use]
    pub fn base_priority(&self, strategy: &str) -> f64 {
        self.base_priorities
            .get(strategy)
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    /// Score one strategy for a failure
    #[must_use]
    pub fn score(
        &self,
        strategy: &str,
        ledger: &HistoryLedger,
        failure_type: FailureType,
        element_type: Option<&str>,
    ) -> f64 {
        let mut score = self.base_priority(strategy);
        if let Some(stats) = ledger.strategy_effectiveness(strategy) {
            score += stats.success_rate * SUCCESS_RATE_WEIGHT;
            if let Some(et) = element_type {
                score += (f64::from(stats.element_type_successes(et)) / 10.0).min(ELEMENT_TYPE_CAP);
            }
            score += (f64::from(stats.attempts) / 20.0).min(EXPERIENCE_CAP);
        }
        score += failure_affinity(strategy, failure_type);
        if self.attempted.contains(strategy) {
            score -= ATTEMPTED_PENALTY;
        }
        score
    }

    /// Strategies sorted by score, best first; ties keep input order
    #[must_use]
    pub fn rank(
        &self,
        strategies: &[&str],
        ledger: &HistoryLedger,
        failure_type: FailureType,
        element_type: Option<&str>,
    ) -> Vec<StrategyRanking> {
        let mut ranked: Vec<StrategyRanking> = strategies
            .iter()
            .map(|s| StrategyRanking {
                strategy: (*s).to_string(),
                score: self.score(s, ledger, failure_type, element_type),
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!(?failure_type, order = ?ranked.iter().map(|r| r.strategy.as_str()).collect::<Vec<_>>(), "ranked strategies");
        ranked
    }

    /// Note that a strategy ran in the current session
    pub fn mark_attempted(&mut self, strategy: &str) {
        self.attempted.insert(strategy.to_string());
    }

    /// Whether a strategy already ran in the current session
    #[must_use]
    pub fn was_attempted(&self, strategy: &str) -> bool {
        self.attempted.contains(strategy)
    }

    /// Forget which strategies ran
    pub fn reset_session(&mut self) {
        self.attempted.clear();
    }

    /// Adjust base priority after an attempt
    pub fn learn(&mut self, strategy: &str, success: bool, confidence: f64) {
        let base = self
            .base_priorities
            .entry(strategy.to_string())
            .or_insert(DEFAULT_PRIORITY);
        if success {
            *base += SUCCESS_BOOST * confidence;
        } else {
            *base = (*base - FAILURE_PENALTY).max(MIN_BASE_PRIORITY);
        }
        debug!(strategy, success, base = *base, "strategy priority updated");
    }

    /// Forget learned priorities and the session
    pub fn clear(&mut self) {
        self.base_priorities.clear();
        self.attempted.clear();
    }

    /// Versioned copy of learned priorities
    #[must_use]
    pub fn export(&self) -> OptimizerSnapshot {
        OptimizerSnapshot {
            version: SNAPSHOT_VERSION,
            base_priorities: self
                .base_priorities
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }

    /// Replace learned priorities from an export
    pub fn import(&mut self, snapshot: OptimizerSnapshot) -> HealResult<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(found = snapshot.version, "rejecting optimizer snapshot");
            return Err(HealError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        self.base_priorities = snapshot.base_priorities.into_iter().collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::history::{EntryContext, HistoryRecord};
    use std::sync::Arc;

    fn empty_ledger() -> HistoryLedger {
        HistoryLedger::new(100, Arc::new(FakeClock::at_ms(0)))
    }

    #[test]
    fn test_base_score_without_history() {
        let optimizer = StrategyOptimizer::new();
        let ledger = empty_ledger();
        assert!(
            (optimizer.score("custom", &ledger, FailureType::Unknown, None) - DEFAULT_PRIORITY)
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn test_affinity_follows_suggestion_order() {
        let optimizer = StrategyOptimizer::new();
        let ledger = empty_ledger();
        let first = optimizer.score("attribute-fallback", &ledger, FailureType::ElementNotFound, None);
        let second = optimizer.score("text-match", &ledger, FailureType::ElementNotFound, None);
        let unrelated = optimizer.score("custom", &ledger, FailureType::ElementNotFound, None);
        assert!((first - (DEFAULT_PRIORITY + 1.5)).abs() < 1e-9);
        assert!(first > second && second > unrelated);
    }

    #[test]
    fn test_history_terms() {
        let optimizer = StrategyOptimizer::new();
        let mut ledger = empty_ledger();
        for _ in 0..4 {
            ledger.record(
                HistoryRecord::healing("x", "#x", "custom")
                    .with_healed_locator(Some("#y".to_string()))
                    .with_outcome(true, 0.9, 10)
                    .with_context(EntryContext {
                        element_type: Some("button".to_string()),
                        ..EntryContext::default()
                    }),
            );
        }
        // base 5 + rate 1.0*5 + 4/10 + 4/20
        let score = optimizer.score("custom", &ledger, FailureType::Unknown, Some("button"));
        assert!((score - 10.6).abs() < 1e-9);
    }

    #[test]
    fn test_attempted_strategies_sink() {
        let mut optimizer = StrategyOptimizer::new();
        let ledger = empty_ledger();
        optimizer.mark_attempted("attribute-fallback");
        let ranked = optimizer.rank(
            &["attribute-fallback", "text-match"],
            &ledger,
            FailureType::ElementNotFound,
            None,
        );
        assert_eq!(ranked[0].strategy, "text-match");
        optimizer.reset_session();
        assert!(!optimizer.was_attempted("attribute-fallback"));
    }

    #[test]
    fn test_learn_adjusts_base_with_floor() {
        let mut optimizer = StrategyOptimizer::new();
        optimizer.register("custom", 1.1);
        optimizer.learn("custom", false, 0.0);
        optimizer.learn("custom", false, 0.0);
        assert!((optimizer.base_priority("custom") - MIN_BASE_PRIORITY).abs() < 1e-9);
        optimizer.learn("custom", true, 0.8);
        assert!((optimizer.base_priority("custom") - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_register_keeps_learned_priority() {
        let mut optimizer = StrategyOptimizer::new();
        optimizer.learn("custom", true, 1.0);
        optimizer.register("custom", 9.0);
        assert!((optimizer.base_priority("custom") - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_round_trip_and_version() {
        let mut optimizer = StrategyOptimizer::new();
        optimizer.learn("custom", true, 1.0);
        let mut restored = StrategyOptimizer::new();
        restored.import(optimizer.export()).unwrap();
        assert!((restored.base_priority("custom") - 5.5).abs() < 1e-9);

        let mut bad = optimizer.export();
        bad.version = 0;
        assert!(restored.import(bad).is_err());
    }
}
