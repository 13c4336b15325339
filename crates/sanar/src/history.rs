//! Bounded ledger of AI operations.
//!
//! Identifications, failure analyses and healing attempts all land here. The
//! ledger keeps the most recent `max_entries` records and maintains two
//! derived views over the healing entries:
//!
//! - [`FragileElement`] per locator (or description), recomputed from the
//!   retained history on every update
//! - [`StrategyEffectiveness`] per strategy, updated incrementally

use crate::clock::Clock;
use crate::failure::FailureType;
use crate::result::{HealError, HealResult};
use crate::SNAPSHOT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Default ledger capacity
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Number of failure types reported per fragile element
const COMMON_FAILURES: usize = 3;

/// Kind of recorded operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiOperation {
    /// Element identified from a description
    Identification,
    /// Failed locator healed (or not)
    Healing,
    /// Failure classified
    FailureAnalysis,
    /// Fragility predicted
    Prediction,
}

/// Extra facts attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryContext {
    /// Classified failure
    pub failure_type: Option<FailureType>,
    /// Driver error text
    pub error: Option<String>,
    /// Element type hint
    pub element_type: Option<String>,
    /// Page URL
    pub url: Option<String>,
}

/// One immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiHistoryEntry {
    /// Entry id
    pub id: Uuid,
    /// Record time
    pub timestamp: DateTime<Utc>,
    /// Operation kind
    pub operation: AiOperation,
    /// Natural-language description of the element
    pub element_description: String,
    /// Locator that failed
    pub original_locator: Option<String>,
    /// Replacement locator
    pub healed_locator: Option<String>,
    /// Strategy that produced the outcome
    pub strategy: String,
    /// Outcome
    pub success: bool,
    /// Outcome confidence
    pub confidence: f64,
    /// Time spent
    pub duration_ms: u64,
    /// Extra facts
    pub context: EntryContext,
}

impl AiHistoryEntry {
    /// Fragile-element key: original locator, else description
    #[must_use]
    pub fn element_key(&self) -> &str {
        self.original_locator
            .as_deref()
            .unwrap_or(&self.element_description)
    }
}

/// Input to [`HistoryLedger::record`]; id and timestamp are stamped on insert
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    operation: AiOperation,
    element_description: String,
    original_locator: Option<String>,
    healed_locator: Option<String>,
    strategy: String,
    success: bool,
    confidence: f64,
    duration_ms: u64,
    context: EntryContext,
}

impl HistoryRecord {
    /// Record of `operation` performed by `strategy`
    #[must_use]
    pub fn new(
        operation: AiOperation,
        element_description: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            element_description: element_description.into(),
            original_locator: None,
            healed_locator: None,
            strategy: strategy.into(),
            success: false,
            confidence: 0.0,
            duration_ms: 0,
            context: EntryContext::default(),
        }
    }

    /// Healing attempt on `original_locator`
    #[must_use]
    pub fn healing(
        element_description: impl Into<String>,
        original_locator: impl Into<String>,
        strategy: impl Into<String>,
    ) -> Self {
        let mut record = Self::new(AiOperation::Healing, element_description, strategy);
        record.original_locator = Some(original_locator.into());
        record
    }

    /// Set the locator the operation was about
    #[must_use]
    pub fn with_original_locator(mut self, locator: impl Into<String>) -> Self {
        self.original_locator = Some(locator.into());
        self
    }

    /// Set the replacement locator
    #[must_use]
    pub fn with_healed_locator(mut self, locator: Option<String>) -> Self {
        self.healed_locator = locator;
        self
    }

    /// Set the outcome
    #[must_use]
    pub fn with_outcome(mut self, success: bool, confidence: f64, duration_ms: u64) -> Self {
        self.success = success;
        self.confidence = confidence;
        self.duration_ms = duration_ms;
        self
    }

    /// Attach extra facts
    #[must_use]
    pub fn with_context(mut self, context: EntryContext) -> Self {
        self.context = context;
        self
    }
}

/// Locator that keeps needing heals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragileElement {
    /// Original locator or description
    pub key: String,
    /// Heals ever recorded, survives eviction
    pub heal_count: u32,
    /// Successful share of retained heals
    pub success_rate: f64,
    /// Most frequent failure types, most common first
    pub common_failures: Vec<FailureType>,
    /// Distinct successful replacement locators, oldest first
    pub healed_locators: Vec<String>,
    /// Most frequent successful replacement
    pub suggested_fix: Option<String>,
    /// First heal
    pub first_seen: DateTime<Utc>,
    /// Latest heal
    pub last_healed: DateTime<Utc>,
}

impl FragileElement {
    /// `1 - success_rate`
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        1.0 - self.success_rate
    }
}

/// Running statistics for one strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEffectiveness {
    /// Strategy name
    pub strategy: String,
    /// Attempts
    pub attempts: u32,
    /// Successful attempts
    pub successes: u32,
    /// Failed attempts
    pub failures: u32,
    /// `successes / attempts`
    pub success_rate: f64,
    /// Running average confidence
    pub average_confidence: f64,
    /// Running average duration
    pub average_duration_ms: f64,
    /// Successful attempts per element type
    pub element_types: BTreeMap<String, u32>,
}

impl StrategyEffectiveness {
    fn new(strategy: &str) -> Self {
        Self {
            strategy: strategy.to_string(),
            attempts: 0,
            successes: 0,
            failures: 0,
            success_rate: 0.0,
            average_confidence: 0.0,
            average_duration_ms: 0.0,
            element_types: BTreeMap::new(),
        }
    }

    fn update(&mut self, entry: &AiHistoryEntry) {
        self.attempts += 1;
        if entry.success {
            self.successes += 1;
            if let Some(et) = &entry.context.element_type {
                *self.element_types.entry(et.clone()).or_insert(0) += 1;
            }
        } else {
            self.failures += 1;
        }
        let n = f64::from(self.attempts);
        self.success_rate = f64::from(self.successes) / n;
        self.average_confidence += (entry.confidence - self.average_confidence) / n;
        self.average_duration_ms += (entry.duration_ms as f64 - self.average_duration_ms) / n;
    }

    /// Successes recorded for an element type
    #[must_use]
    pub fn element_type_successes(&self, element_type: &str) -> u32 {
        self.element_types.get(element_type).copied().unwrap_or(0)
    }
}

/// Aggregate ledger numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStatistics {
    /// Retained entries
    pub total_entries: usize,
    /// Retained entries per operation
    pub by_operation: BTreeMap<String, usize>,
    /// Retained healing entries
    pub healing_attempts: usize,
    /// Successful retained healing entries
    pub successful_heals: usize,
    /// `successful_heals / healing_attempts`, 0 when empty
    pub healing_success_rate: f64,
    /// Mean confidence over retained entries
    pub average_confidence: f64,
    /// Tracked fragile elements
    pub fragile_elements: usize,
    /// Tracked strategies
    pub strategies: usize,
    /// Oldest retained entry
    pub oldest: Option<DateTime<Utc>>,
    /// Newest retained entry
    pub newest: Option<DateTime<Utc>>,
}

/// Versioned ledger export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Format version
    pub version: u32,
    /// Capacity at export time
    pub max_entries: usize,
    /// Retained entries, oldest first
    pub entries: Vec<AiHistoryEntry>,
    /// Fragile elements
    pub fragile_elements: Vec<FragileElement>,
    /// Strategy statistics
    pub strategies: Vec<StrategyEffectiveness>,
}

/// Ring buffer of AI operations with derived fragility and strategy views
#[derive(Debug)]
pub struct HistoryLedger {
    entries: VecDeque<AiHistoryEntry>,
    max_entries: usize,
    fragile: HashMap<String, FragileElement>,
    strategies: HashMap<String, StrategyEffectiveness>,
    clock: Arc<dyn Clock>,
}

impl HistoryLedger {
    /// Ledger holding at most `max_entries` records
    #[must_use]
    pub fn new(max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: max_entries.max(1),
            fragile: HashMap::new(),
            strategies: HashMap::new(),
            clock,
        }
    }

    /// Capacity
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Append a record, evicting the oldest entry when full
    pub fn record(&mut self, record: HistoryRecord) -> &AiHistoryEntry {
        let entry = AiHistoryEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            operation: record.operation,
            element_description: record.element_description,
            original_locator: record.original_locator,
            healed_locator: record.healed_locator,
            strategy: record.strategy,
            success: record.success,
            confidence: record.confidence,
            duration_ms: record.duration_ms,
            context: record.context,
        };
        while self.entries.len() >= self.max_entries {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        let index = self.entries.len() - 1;
        if self.entries[index].operation == AiOperation::Healing {
            let entry = self.entries[index].clone();
            self.strategies
                .entry(entry.strategy.clone())
                .or_insert_with(|| StrategyEffectiveness::new(&entry.strategy))
                .update(&entry);
            self.refresh_fragile(&entry);
        }
        debug!(
            operation = ?self.entries[index].operation,
            strategy = %self.entries[index].strategy,
            success = self.entries[index].success,
            "recorded ai operation"
        );
        &self.entries[index]
    }

    /// Shorthand for recording a healing attempt
    pub fn record_healing(&mut self, record: HistoryRecord) -> &AiHistoryEntry {
        debug_assert_eq!(record.operation, AiOperation::Healing);
        self.record(record)
    }

    fn refresh_fragile(&mut self, latest: &AiHistoryEntry) {
        let key = latest.element_key().to_string();
        let history: Vec<&AiHistoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.operation == AiOperation::Healing && e.element_key() == key)
            .collect();
        let successes = history.iter().filter(|e| e.success).count();
        let success_rate = if history.is_empty() {
            0.0
        } else {
            successes as f64 / history.len() as f64
        };

        let mut failure_counts: Vec<(FailureType, usize)> = Vec::new();
        for failure in history.iter().filter_map(|e| e.context.failure_type) {
            match failure_counts.iter_mut().find(|(f, _)| *f == failure) {
                Some((_, n)) => *n += 1,
                None => failure_counts.push((failure, 1)),
            }
        }
        failure_counts.sort_by(|a, b| b.1.cmp(&a.1));

        let mut locator_counts: Vec<(String, usize, DateTime<Utc>)> = Vec::new();
        for e in history.iter().filter(|e| e.success) {
            let Some(locator) = &e.healed_locator else {
                continue;
            };
            match locator_counts.iter_mut().find(|(l, _, _)| l == locator) {
                Some((_, n, last)) => {
                    *n += 1;
                    *last = e.timestamp;
                }
                None => locator_counts.push((locator.clone(), 1, e.timestamp)),
            }
        }
        let suggested_fix = locator_counts
            .iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)))
            .map(|(l, _, _)| l.clone());

        let element = self
            .fragile
            .entry(key.clone())
            .or_insert_with(|| FragileElement {
                key,
                heal_count: 0,
                success_rate: 0.0,
                common_failures: Vec::new(),
                healed_locators: Vec::new(),
                suggested_fix: None,
                first_seen: latest.timestamp,
                last_healed: latest.timestamp,
            });
        element.heal_count += 1;
        element.success_rate = success_rate;
        element.common_failures = failure_counts
            .into_iter()
            .take(COMMON_FAILURES)
            .map(|(f, _)| f)
            .collect();
        element.healed_locators = locator_counts.into_iter().map(|(l, _, _)| l).collect();
        element.suggested_fix = suggested_fix;
        element.last_healed = latest.timestamp;
    }

    /// Retained entries, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &AiHistoryEntry> {
        self.entries.iter()
    }

    /// Retained entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retained entries whose original locator or description equals `key`
    #[must_use]
    pub fn entries_for(&self, key: &str) -> Vec<&AiHistoryEntry> {
        self.entries.iter().filter(|e| e.element_key() == key).collect()
    }

    /// Fragile element tracked under `key`
    #[must_use]
    pub fn fragile_element(&self, key: &str) -> Option<&FragileElement> {
        self.fragile.get(key)
    }

    /// Statistics for one strategy
    #[must_use]
    pub fn strategy_effectiveness(&self, strategy: &str) -> Option<&StrategyEffectiveness> {
        self.strategies.get(strategy)
    }

    /// All strategy statistics, by name
    #[must_use]
    pub fn strategies(&self) -> Vec<&StrategyEffectiveness> {
        let mut all: Vec<&StrategyEffectiveness> = self.strategies.values().collect();
        all.sort_by(|a, b| a.strategy.cmp(&b.strategy));
        all
    }

    /// Fragile elements, most healed first
    #[must_use]
    pub fn fragility_report(&self) -> Vec<&FragileElement> {
        let mut report: Vec<&FragileElement> = self.fragile.values().collect();
        report.sort_by(|a, b| {
            b.heal_count
                .cmp(&a.heal_count)
                .then(b.last_healed.cmp(&a.last_healed))
                .then(a.key.cmp(&b.key))
        });
        report
    }

    /// Aggregate numbers over retained entries
    #[must_use]
    pub fn statistics(&self) -> LedgerStatistics {
        let mut by_operation = BTreeMap::new();
        for e in &self.entries {
            let name = serde_json::to_value(e.operation)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            *by_operation.entry(name).or_insert(0) += 1;
        }
        let heals: Vec<&AiHistoryEntry> = self
            .entries
            .iter()
            .filter(|e| e.operation == AiOperation::Healing)
            .collect();
        let successful_heals = heals.iter().filter(|e| e.success).count();
        let average_confidence = if self.entries.is_empty() {
            0.0
        } else {
            self.entries.iter().map(|e| e.confidence).sum::<f64>() / self.entries.len() as f64
        };
        LedgerStatistics {
            total_entries: self.entries.len(),
            by_operation,
            healing_attempts: heals.len(),
            successful_heals,
            healing_success_rate: if heals.is_empty() {
                0.0
            } else {
                successful_heals as f64 / heals.len() as f64
            },
            average_confidence,
            fragile_elements: self.fragile.len(),
            strategies: self.strategies.len(),
            oldest: self.entries.front().map(|e| e.timestamp),
            newest: self.entries.back().map(|e| e.timestamp),
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.entries.clear();
        self.fragile.clear();
        self.strategies.clear();
    }

    /// Versioned copy of the whole ledger
    #[must_use]
    pub fn export(&self) -> LedgerSnapshot {
        let mut fragile_elements: Vec<FragileElement> = self.fragile.values().cloned().collect();
        fragile_elements.sort_by(|a, b| a.key.cmp(&b.key));
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            max_entries: self.max_entries,
            entries: self.entries.iter().cloned().collect(),
            fragile_elements,
            strategies: self.strategies().into_iter().cloned().collect(),
        }
    }

    /// Replace state from an export, keeping this ledger's capacity
    pub fn import(&mut self, snapshot: LedgerSnapshot) -> HealResult<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(found = snapshot.version, "rejecting ledger snapshot");
            return Err(HealError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        let skip = snapshot.entries.len().saturating_sub(self.max_entries);
        self.entries = snapshot.entries.into_iter().skip(skip).collect();
        self.fragile = snapshot
            .fragile_elements
            .into_iter()
            .map(|f| (f.key.clone(), f))
            .collect();
        self.strategies = snapshot
            .strategies
            .into_iter()
            .map(|s| (s.strategy.clone(), s))
            .collect();
        Ok(())
    }
}
