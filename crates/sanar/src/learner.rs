//! Promotes recurring element shapes into the pattern matcher.

use crate::clock::Clock;
use crate::features::ElementFeatures;
use crate::patterns::{PatternMatcher, PatternSource, UiPattern};
use crate::result::{HealError, HealResult};
use crate::selector::{attr_selector, is_css_ident};
use crate::SNAPSHOT_VERSION;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Observations below this confidence are ignored
pub const MIN_OBSERVATION_CONFIDENCE: f64 = 0.7;
/// Occurrences needed before promotion
pub const PROMOTION_OCCURRENCES: u32 = 3;
/// Running confidence needed before promotion
pub const PROMOTION_CONFIDENCE: f64 = 0.7;

const LEARNED_WEIGHT: f64 = 0.9;

/// Shape observed across successful identifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedPattern {
    /// Shape key
    pub key: String,
    /// Pattern registered on promotion
    pub pattern: UiPattern,
    /// Qualifying observations
    pub occurrences: u32,
    /// Outcomes reported through `record_outcome`
    pub outcomes: u32,
    /// Successful outcomes
    pub successes: u32,
    /// `successes / outcomes`, 1.0 before any outcome
    pub success_rate: f64,
    /// First observation
    pub first_seen: DateTime<Utc>,
    /// Latest observation
    pub last_seen: DateTime<Utc>,
    /// Running average confidence
    pub confidence: f64,
    /// Promoted into the matcher
    pub registered: bool,
}

impl LearnedPattern {
    /// Whether promotion thresholds are met
    #[must_use]
    pub fn is_promotable(&self) -> bool {
        self.occurrences >= PROMOTION_OCCURRENCES && self.confidence >= PROMOTION_CONFIDENCE
    }
}

/// Versioned learner export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerSnapshot {
    /// Format version
    pub version: u32,
    /// Learned shapes
    pub patterns: Vec<LearnedPattern>,
}

/// Observes successful identifications and promotes recurring shapes
#[derive(Debug)]
pub struct PatternLearner {
    patterns: HashMap<String, LearnedPattern>,
    clock: Arc<dyn Clock>,
}

impl PatternLearner {
    /// Create an empty learner
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            patterns: HashMap::new(),
            clock,
        }
    }

    /// Observe an identification; returns the pattern name when this call promoted it
    pub fn learn(
        &mut self,
        matcher: &mut PatternMatcher,
        features: &ElementFeatures,
        confidence: f64,
        success: bool,
    ) -> Option<String> {
        if !success || confidence < MIN_OBSERVATION_CONFIDENCE {
            return None;
        }
        let key = shape_key(features);
        let now = self.clock.now();
        let entry = self
            .patterns
            .entry(key.clone())
            .and_modify(|p| {
                p.confidence = (p.confidence * f64::from(p.occurrences) + confidence)
                    / f64::from(p.occurrences + 1);
                p.occurrences += 1;
                p.last_seen = now;
            })
            .or_insert_with(|| LearnedPattern {
                pattern: pattern_from_features(&key, features, confidence),
                key: key.clone(),
                occurrences: 1,
                outcomes: 0,
                successes: 0,
                success_rate: 1.0,
                first_seen: now,
                last_seen: now,
                confidence,
                registered: false,
            });

        if entry.registered || !entry.is_promotable() {
            return None;
        }
        entry.pattern.confidence = entry.confidence;
        entry.registered = true;
        let name = entry.pattern.name.clone();
        if matcher.register_pattern(entry.pattern.clone()) {
            info!(pattern = %name, occurrences = entry.occurrences, "promoted learned pattern");
        }
        Some(name)
    }

    /// Report whether acting on an element of this shape succeeded
    pub fn record_outcome(&mut self, features: &ElementFeatures, success: bool) -> bool {
        let Some(p) = self.patterns.get_mut(&shape_key(features)) else {
            return false;
        };
        p.outcomes += 1;
        if success {
            p.successes += 1;
        }
        p.success_rate = f64::from(p.successes) / f64::from(p.outcomes);
        true
    }

    /// Learned shape by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&LearnedPattern> {
        self.patterns.get(key)
    }

    /// Number of tracked shapes
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Whether nothing has been observed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Number of promoted shapes
    #[must_use]
    pub fn promoted(&self) -> usize {
        self.patterns.values().filter(|p| p.registered).count()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Export all shapes
    #[must_use]
    pub fn export(&self) -> LearnerSnapshot {
        let mut patterns: Vec<LearnedPattern> = self.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.key.cmp(&b.key));
        LearnerSnapshot {
            version: SNAPSHOT_VERSION,
            patterns,
        }
    }

    /// Replace state from an export and re-register promoted shapes
    pub fn import(
        &mut self,
        snapshot: LearnerSnapshot,
        matcher: &mut PatternMatcher,
    ) -> HealResult<usize> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(found = snapshot.version, "rejecting learner snapshot");
            return Err(HealError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        self.patterns.clear();
        let mut registered = 0;
        for learned in snapshot.patterns {
            if learned.registered && matcher.register_pattern(learned.pattern.clone()) {
                registered += 1;
            }
            self.patterns.insert(learned.key.clone(), learned);
        }
        Ok(registered)
    }
}

const UTILITY_CLASS_PREFIXES: &[&str] = &["css-", "sc-", "jsx-", "ng-", "is-", "has-", "svelte-"];
const STATE_CLASSES: &[&str] = &[
    "active", "focus", "focused", "hover", "disabled", "selected", "open", "show", "hidden",
    "visible",
];

/// Whether a class says something about the element rather than its state or build
#[must_use]
pub fn is_distinctive_class(class: &str) -> bool {
    let lower = class.to_lowercase();
    let digits = lower.chars().filter(char::is_ascii_digit).count();
    lower.len() > 2
        && digits * 3 < lower.len()
        && !STATE_CLASSES.contains(&lower.as_str())
        && !UTILITY_CLASS_PREFIXES.iter().any(|p| lower.starts_with(p))
}

/// `tag|role|semanticType|inputType|classes` with at most two distinctive classes
#[must_use]
pub fn shape_key(features: &ElementFeatures) -> String {
    let mut classes: Vec<&str> = features
        .structural
        .classes
        .iter()
        .map(String::as_str)
        .filter(|c| is_distinctive_class(c))
        .take(2)
        .collect();
    classes.sort_unstable();
    let classes = classes.join(".");
    let semantic = &features.semantic;
    [
        features.structural.tag.as_str(),
        semantic.role.as_deref().unwrap_or(""),
        semantic.semantic_type.as_deref().unwrap_or(""),
        semantic.input_type.as_deref().unwrap_or(""),
        classes.as_str(),
    ]
    .join("|")
}

fn pattern_from_features(key: &str, features: &ElementFeatures, confidence: f64) -> UiPattern {
    let structural = &features.structural;
    let classes: Vec<String> = structural
        .classes
        .iter()
        .filter(|c| is_distinctive_class(c) && is_css_ident(c))
        .take(2)
        .cloned()
        .collect();
    let mut selector = structural.tag.clone();
    let mut attributes = Vec::new();
    if let Some(t) = &features.semantic.input_type {
        selector.push_str(&attr_selector("type", t));
        attributes.push(("type".to_string(), t.clone()));
    }
    if let Some(role) = structural.attributes.get("role") {
        selector.push_str(&attr_selector("role", role));
        attributes.push(("role".to_string(), role.clone()));
    }
    for class in &classes {
        selector.push('.');
        selector.push_str(class);
    }
    UiPattern {
        name: format!("learned:{key}"),
        description: format!("Learned {} shape", structural.tag),
        selectors: vec![selector],
        attributes,
        tags: vec![structural.tag.clone()],
        class_hints: classes.iter().map(|c| c.to_lowercase()).collect(),
        role: features.semantic.role.clone(),
        structure: Some(structural.path.clone()),
        confidence,
        weight: LEARNED_WEIGHT,
        source: PatternSource::Learned,
    }
}
