//! Engine configuration.
//!
//! Keys follow the host framework's `AI_*` naming. Values can come from the
//! process environment, a typed key/value list, or a YAML document.

use crate::result::{HealError, HealResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Master switch
pub const AI_ENABLED: &str = "AI_ENABLED";
/// Failure-driven healing switch
pub const AI_INTELLIGENT_HEALING_ENABLED: &str = "AI_INTELLIGENT_HEALING_ENABLED";
/// Fragility prediction switch
pub const AI_PREDICTIVE_HEALING_ENABLED: &str = "AI_PREDICTIVE_HEALING_ENABLED";
/// Pattern learning / priority learning switch
pub const AI_LEARNING_ENABLED: &str = "AI_LEARNING_ENABLED";
/// Restrict the engine to UI steps
pub const AI_UI_ONLY: &str = "AI_UI_ONLY";
/// Minimum confidence accepted when healing by re-identification
pub const AI_CONFIDENCE_THRESHOLD: &str = "AI_CONFIDENCE_THRESHOLD";
/// Upper bound on strategy attempts per failure
pub const AI_MAX_HEALING_ATTEMPTS: &str = "AI_MAX_HEALING_ATTEMPTS";
/// Ledger capacity
pub const AI_HISTORY_MAX_ENTRIES: &str = "AI_HISTORY_MAX_ENTRIES";
/// Lifetime of the NLP, DOM and fragility caches
pub const AI_CACHE_TTL_SECS: &str = "AI_CACHE_TTL_SECS";
/// Per-selector resolution timeout
pub const AI_RESOLVE_TIMEOUT_MS: &str = "AI_RESOLVE_TIMEOUT_MS";

/// Every key understood by [`HealingConfig::set`]
pub const CONFIG_KEYS: &[&str] = &[
    AI_ENABLED,
    AI_INTELLIGENT_HEALING_ENABLED,
    AI_PREDICTIVE_HEALING_ENABLED,
    AI_LEARNING_ENABLED,
    AI_UI_ONLY,
    AI_CONFIDENCE_THRESHOLD,
    AI_MAX_HEALING_ATTEMPTS,
    AI_HISTORY_MAX_ENTRIES,
    AI_CACHE_TTL_SECS,
    AI_RESOLVE_TIMEOUT_MS,
];

/// Hand-tuned ranking constants used when scoring candidates.
///
/// The defaults are the values the ranking was calibrated with. They are
/// exposed so a suite can retune them without patching the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    /// Input type agrees with a sensitive keyword (password/username/email)
    pub input_type_match: f64,
    /// Input type contradicts a sensitive keyword
    pub input_type_mismatch: f64,
    /// Generic typing intent on a text/email input
    pub generic_type_match: f64,
    /// Multiplier applied to the best context hit
    pub context_weight: f64,
    /// Flat bonus when a button/link's text contains a keyword
    pub clickable_text_bonus: f64,
    /// Column header contains a keyword
    pub table_header_match: f64,
    /// Tabular operation keyword while inside a table
    pub tabular_operation: f64,
    /// Any framework hint present
    pub framework_hint: f64,
    /// Element from a trusted component library
    pub trusted_library: f64,
    /// Element lives in a shadow root
    pub shadow_dom: f64,
    /// Loading indicator nearby
    pub loading_indicator: f64,
    /// Element lives in an iframe
    pub iframe: f64,
    /// Multiplier applied to quoted-text similarity
    pub text_similarity_weight: f64,
    /// Flat bonus for visible candidates
    pub visibility: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            input_type_match: 0.50,
            input_type_mismatch: -0.80,
            generic_type_match: 0.20,
            context_weight: 0.40,
            clickable_text_bonus: 0.50,
            table_header_match: 0.35,
            tabular_operation: 0.20,
            framework_hint: 0.05,
            trusted_library: 0.08,
            shadow_dom: -0.02,
            loading_indicator: -0.15,
            iframe: -0.05,
            text_similarity_weight: 0.10,
            visibility: 0.05,
        }
    }
}

/// Configuration for one worker's healing engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealingConfig {
    /// Master switch (`AI_ENABLED`)
    pub ai_enabled: bool,
    /// Failure-driven healing (`AI_INTELLIGENT_HEALING_ENABLED`)
    pub intelligent_healing_enabled: bool,
    /// Fragility prediction (`AI_PREDICTIVE_HEALING_ENABLED`)
    pub predictive_healing_enabled: bool,
    /// Pattern and priority learning (`AI_LEARNING_ENABLED`)
    pub learning_enabled: bool,
    /// Gate everything to UI steps (`AI_UI_ONLY`)
    pub ui_only: bool,
    /// Minimum accepted identification confidence (`AI_CONFIDENCE_THRESHOLD`)
    pub confidence_threshold: f64,
    /// Strategy attempts per failure (`AI_MAX_HEALING_ATTEMPTS`)
    pub max_healing_attempts: u32,
    /// Ledger capacity (`AI_HISTORY_MAX_ENTRIES`)
    pub history_max_entries: usize,
    /// Cache lifetime in seconds (`AI_CACHE_TTL_SECS`)
    pub cache_ttl_secs: u64,
    /// Selector resolution timeout in ms (`AI_RESOLVE_TIMEOUT_MS`)
    pub resolve_timeout_ms: u64,
    /// DOM snapshot timeout in ms
    pub snapshot_timeout_ms: u64,
    /// Candidate ranking constants
    pub ranking: RankingWeights,
}

impl Default for HealingConfig {
    fn default() -> Self {
        Self {
            ai_enabled: true,
            intelligent_healing_enabled: true,
            predictive_healing_enabled: false,
            learning_enabled: true,
            ui_only: true,
            confidence_threshold: 0.75,
            max_healing_attempts: 3,
            history_max_entries: 10_000,
            cache_ttl_secs: 300,
            resolve_timeout_ms: 2_000,
            snapshot_timeout_ms: 5_000,
            ranking: RankingWeights::default(),
        }
    }
}

impl HealingConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every known `AI_*` variable from the environment over the defaults
    pub fn from_env() -> HealResult<Self> {
        Self::from_pairs(
            CONFIG_KEYS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
        )
    }

    /// Apply typed key/value pairs over the defaults
    pub fn from_pairs<K, V, I>(pairs: I) -> HealResult<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut config = Self::default();
        for (key, value) in pairs {
            config.set(key.as_ref(), value.as_ref())?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document (field names in snake_case)
    pub fn from_yaml_str(yaml: &str) -> HealResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Set one value by its `AI_*` key
    pub fn set(&mut self, key: &str, value: &str) -> HealResult<()> {
        match key {
            AI_ENABLED => self.ai_enabled = parse_bool(key, value)?,
            AI_INTELLIGENT_HEALING_ENABLED => {
                self.intelligent_healing_enabled = parse_bool(key, value)?;
            }
            AI_PREDICTIVE_HEALING_ENABLED => {
                self.predictive_healing_enabled = parse_bool(key, value)?;
            }
            AI_LEARNING_ENABLED => self.learning_enabled = parse_bool(key, value)?,
            AI_UI_ONLY => self.ui_only = parse_bool(key, value)?,
            AI_CONFIDENCE_THRESHOLD => self.confidence_threshold = parse_number(key, value)?,
            AI_MAX_HEALING_ATTEMPTS => self.max_healing_attempts = parse_number(key, value)?,
            AI_HISTORY_MAX_ENTRIES => self.history_max_entries = parse_number(key, value)?,
            AI_CACHE_TTL_SECS => self.cache_ttl_secs = parse_number(key, value)?,
            AI_RESOLVE_TIMEOUT_MS => self.resolve_timeout_ms = parse_number(key, value)?,
            other => return Err(HealError::config(other, "unknown configuration key")),
        }
        Ok(())
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> HealResult<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(HealError::config(
                AI_CONFIDENCE_THRESHOLD,
                format!("{} is outside [0, 1]", self.confidence_threshold),
            ));
        }
        if self.history_max_entries == 0 {
            return Err(HealError::config(AI_HISTORY_MAX_ENTRIES, "must be at least 1"));
        }
        Ok(())
    }

    /// Cache lifetime
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Selector resolution timeout
    #[must_use]
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(self.resolve_timeout_ms)
    }

    /// Snapshot timeout
    #[must_use]
    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_millis(self.snapshot_timeout_ms)
    }

    /// Set master switch
    #[must_use]
    pub const fn with_ai_enabled(mut self, enabled: bool) -> Self {
        self.ai_enabled = enabled;
        self
    }

    /// Set predictive healing
    #[must_use]
    pub const fn with_predictive_healing(mut self, enabled: bool) -> Self {
        self.predictive_healing_enabled = enabled;
        self
    }

    /// Set learning
    #[must_use]
    pub const fn with_learning(mut self, enabled: bool) -> Self {
        self.learning_enabled = enabled;
        self
    }

    /// Set UI-only gating
    #[must_use]
    pub const fn with_ui_only(mut self, ui_only: bool) -> Self {
        self.ui_only = ui_only;
        self
    }

    /// Set confidence threshold
    #[must_use]
    pub const fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set maximum healing attempts
    #[must_use]
    pub const fn with_max_healing_attempts(mut self, attempts: u32) -> Self {
        self.max_healing_attempts = attempts;
        self
    }

    /// Set ledger capacity
    #[must_use]
    pub const fn with_history_max_entries(mut self, entries: usize) -> Self {
        self.history_max_entries = entries;
        self
    }

    /// Set ranking constants
    #[must_use]
    pub fn with_ranking(mut self, ranking: RankingWeights) -> Self {
        self.ranking = ranking;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> HealResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(HealError::config(key, format!("'{other}' is not a boolean"))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> HealResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| HealError::config(key, format!("'{value}' is not a valid number")))
}
