//! Fragility scoring and pre-emptive locator suggestions.

use crate::clock::Clock;
use crate::context::WorkerContext;
use crate::history::{FragileElement, HistoryLedger};
use crate::ttl_cache::TtlCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Scores above this predict a failure
pub const FAILURE_THRESHOLD: f64 = 0.5;

const HEAL_COUNT_CAP: f64 = 0.4;
const FAILURE_RATE_WEIGHT: f64 = 0.3;
const INSTABILITY_WEIGHT: f64 = 0.2;
const STABILITY_STEP: f64 = 0.1;

/// Fragility of one locator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragilityScore {
    /// Scored locator
    pub locator: String,
    /// Combined score in `[0, 1]`
    pub score: f64,
    /// `score > 0.5`
    pub will_fail: bool,
    /// Recorded heals
    pub heal_count: u32,
    /// Failed share of retained heals
    pub failure_rate: f64,
    /// `max(0, 1 - 0.1 * distinct healed locators)`
    pub stability: f64,
    /// Recency term
    pub recency: f64,
    /// Whole days since the latest heal
    pub days_since_last_heal: Option<i64>,
    /// Most frequent successful replacement
    pub suggested_locator: Option<String>,
    /// Scoring time
    pub computed_at: DateTime<Utc>,
}

/// Recency term for a heal `days` ago
#[must_use]
pub const fn recency_weight(days: i64) -> f64 {
    if days < 1 {
        0.3
    } else if days < 7 {
        0.2
    } else if days < 30 {
        0.1
    } else {
        0.0
    }
}

/// Score a fragile element at `now`
#[must_use]
pub fn score_element(element: &FragileElement, now: DateTime<Utc>) -> FragilityScore {
    let stability = (1.0 - STABILITY_STEP * element.healed_locators.len() as f64).max(0.0);
    let days = (now - element.last_healed).num_days();
    let recency = recency_weight(days);
    let score = ((f64::from(element.heal_count) / 10.0).min(HEAL_COUNT_CAP)
        + element.failure_rate() * FAILURE_RATE_WEIGHT
        + (1.0 - stability) * INSTABILITY_WEIGHT
        + recency)
        .min(1.0);
    FragilityScore {
        locator: element.key.clone(),
        score,
        will_fail: score > FAILURE_THRESHOLD,
        heal_count: element.heal_count,
        failure_rate: element.failure_rate(),
        stability,
        recency,
        days_since_last_heal: Some(days),
        suggested_locator: element.suggested_fix.clone(),
        computed_at: now,
    }
}

fn unseen(locator: &str, now: DateTime<Utc>) -> FragilityScore {
    FragilityScore {
        locator: locator.to_string(),
        score: 0.0,
        will_fail: false,
        heal_count: 0,
        failure_rate: 0.0,
        stability: 1.0,
        recency: 0.0,
        days_since_last_heal: None,
        suggested_locator: None,
        computed_at: now,
    }
}

/// Predicts which locators are about to break
#[derive(Debug)]
pub struct PredictiveHealer {
    enabled: bool,
    cache: TtlCache<String, FragilityScore>,
    clock: Arc<dyn Clock>,
}

impl PredictiveHealer {
    /// Create from the worker's configuration
    #[must_use]
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            enabled: ctx.config().predictive_healing_enabled,
            cache: TtlCache::new(ctx.config().cache_ttl(), ctx.clock()),
            clock: ctx.clock(),
        }
    }

    /// Whether prediction runs at all
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fragility of `locator`, cached; `None` when prediction is disabled
    pub fn fragility(&mut self, locator: &str, ledger: &HistoryLedger) -> Option<FragilityScore> {
        if !self.enabled {
            return None;
        }
        let key = locator.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit);
        }
        let now = self.clock.now();
        let score = ledger
            .fragile_element(locator)
            .map_or_else(|| unseen(locator, now), |f| score_element(f, now));
        debug!(locator, score = score.score, will_fail = score.will_fail, "fragility scored");
        self.cache.insert(key, score.clone());
        Some(score)
    }

    /// Whether `locator` is predicted to fail
    pub fn will_fail(&mut self, locator: &str, ledger: &HistoryLedger) -> bool {
        self.fragility(locator, ledger).is_some_and(|s| s.will_fail)
    }

    /// Best historical replacement for a locator predicted to fail
    pub fn suggest_preemptive_locator(
        &mut self,
        locator: &str,
        ledger: &HistoryLedger,
    ) -> Option<String> {
        self.fragility(locator, ledger)
            .filter(|s| s.will_fail)
            .and_then(|s| s.suggested_locator)
    }

    /// Drop the cached score of `locator`
    pub fn invalidate(&mut self, locator: &str) {
        self.cache.remove(&locator.to_string());
    }

    /// Drop all cached scores
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::HealingConfig;
    use crate::history::HistoryRecord;

    const START_MS: i64 = 1_700_000_000_000;

    fn setup(enabled: bool) -> (PredictiveHealer, HistoryLedger, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::at_ms(START_MS));
        let ctx = WorkerContext::new(
            "w1",
            HealingConfig::default().with_predictive_healing(enabled),
        )
        .with_clock(clock.clone());
        (
            PredictiveHealer::new(&ctx),
            HistoryLedger::new(100, clock.clone()),
            clock,
        )
    }

    fn heal(ledger: &mut HistoryLedger, healed: Option<&str>, success: bool) {
        ledger.record(
            HistoryRecord::healing("login button", "#login", "attribute-fallback")
                .with_healed_locator(healed.map(str::to_string))
                .with_outcome(success, 0.8, 20),
        );
    }

    fn five_heals(ledger: &mut HistoryLedger) {
        heal(ledger, Some("#login-a"), true);
        heal(ledger, None, false);
        heal(ledger, Some("#login-b"), true);
        heal(ledger, None, false);
        heal(ledger, Some("#login-c"), true);
    }

    #[test]
    fn test_recency_bands() {
        assert!((recency_weight(0) - 0.3).abs() < 1e-9);
        assert!((recency_weight(3) - 0.2).abs() < 1e-9);
        assert!((recency_weight(10) - 0.1).abs() < 1e-9);
        assert!(recency_weight(45).abs() < 1e-9);
    }

    #[test]
    fn test_fragile_locator_healed_today() {
        let (mut healer, mut ledger, _) = setup(true);
        five_heals(&mut ledger);
        let score = healer.fragility("#login", &ledger).unwrap();
        // 0.4 + 0.4*0.3 + 0.3*0.2 + 0.3
        assert!((score.score - 0.88).abs() < 1e-9);
        assert!(score.will_fail);
        assert!(healer.will_fail("#login", &ledger));
    }

    #[test]
    fn test_old_heals_are_less_risky() {
        let (mut healer, mut ledger, clock) = setup(true);
        five_heals(&mut ledger);
        clock.fast_forward_days(40);
        let score = healer.fragility("#login", &ledger).unwrap();
        assert!((score.score - 0.58).abs() < 1e-9);
        assert_eq!(score.days_since_last_heal, Some(40));
    }

    #[test]
    fn test_score_is_cached_until_ttl() {
        let (mut healer, mut ledger, clock) = setup(true);
        heal(&mut ledger, Some("#x"), true);
        let first = healer.fragility("#login", &ledger).unwrap();
        five_heals(&mut ledger);
        assert_eq!(healer.fragility("#login", &ledger).unwrap(), first);

        clock.fast_forward(std::time::Duration::from_secs(301));
        assert!(healer.fragility("#login", &ledger).unwrap().score > first.score);
    }

    #[test]
    fn test_invalidate_rescores() {
        let (mut healer, mut ledger, _) = setup(true);
        assert!(!healer.will_fail("#login", &ledger));
        five_heals(&mut ledger);
        healer.invalidate("#login");
        assert!(healer.will_fail("#login", &ledger));
    }

    #[test]
    fn test_disabled_predicts_nothing() {
        let (mut healer, mut ledger, _) = setup(false);
        five_heals(&mut ledger);
        assert!(healer.fragility("#login", &ledger).is_none());
        assert!(!healer.will_fail("#login", &ledger));
    }

    #[test]
    fn test_suggests_most_recent_frequent_locator() {
        let (mut healer, mut ledger, _) = setup(true);
        five_heals(&mut ledger);
        heal(&mut ledger, Some("#login-b"), true);
        assert_eq!(
            healer.suggest_preemptive_locator("#login", &ledger).as_deref(),
            Some("#login-b")
        );
    }

    #[test]
    fn test_unknown_locator_is_stable() {
        let (mut healer, ledger, _) = setup(true);
        let score = healer.fragility("#never-healed", &ledger).unwrap();
        assert!(score.score.abs() < 1e-9);
        assert!(healer.suggest_preemptive_locator("#never-healed", &ledger).is_none());
    }
}
