//! Healing strategies.
//!
//! A [`HealingStrategy`] proposes a replacement locator for a failed one.
//! The integration layer runs the built-in AI re-identification itself and
//! orders every other registered strategy through the optimizer.

use crate::dom::DomNode;
use crate::failure::FailureAnalysis;
use crate::page::PageHandle;
use crate::result::HealResult;
use crate::selector::{attr_selector, id_selector, text_is_selector};
use crate::similarity::text_similarity_ci;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Name of the built-in re-identification strategy
pub const AI_IDENTIFICATION: &str = "ai-identification";

/// Base priority of strategies that do not override it
pub const DEFAULT_PRIORITY: f64 = 5.0;

/// Input to a strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingContext {
    /// Locator that failed
    pub original_locator: String,
    /// Natural-language description of the element
    pub description: Option<String>,
    /// Classified failure
    pub analysis: FailureAnalysis,
    /// Attempt number, starting at 1
    pub attempt: u32,
    /// Element type hint from the description
    pub element_type: Option<String>,
}

/// Result of one strategy attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyOutcome {
    /// Whether a working locator was found
    pub success: bool,
    /// Replacement locator
    pub locator: Option<String>,
    /// Confidence in the replacement
    pub confidence: f64,
    /// Time spent
    pub duration: Duration,
}

impl StrategyOutcome {
    /// Successful outcome
    #[must_use]
    pub fn healed(locator: impl Into<String>, confidence: f64, duration: Duration) -> Self {
        Self {
            success: true,
            locator: Some(locator.into()),
            confidence,
            duration,
        }
    }

    /// Unsuccessful outcome
    #[must_use]
    pub const fn failed(duration: Duration) -> Self {
        Self {
            success: false,
            locator: None,
            confidence: 0.0,
            duration,
        }
    }
}

/// Pluggable healing step
#[async_trait]
pub trait HealingStrategy: Send + Sync {
    /// Unique name
    fn name(&self) -> &str;

    /// Base priority before learning
    fn priority(&self) -> f64 {
        DEFAULT_PRIORITY
    }

    /// Element types this strategy is particularly good at
    fn element_types(&self) -> &[&str] {
        &[]
    }

    /// Try to find a working replacement locator
    async fn apply(&self, page: &dyn PageHandle, ctx: &HealingContext) -> HealResult<StrategyOutcome>;
}

fn locator_token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"#([\w-]+)|\[(?:id|name|data-testid|data-test-id|data-cy)\s*[*^$~]?=\s*["']?([^"'\]]+)"#)
            .expect("locator token pattern is valid")
    })
}

/// Identifying token of a locator (`#save-btn` → `save-btn`)
#[must_use]
pub fn locator_token(locator: &str) -> Option<String> {
    locator_token_regex().captures(locator).and_then(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().to_string())
    })
}

fn precise_locator(node: &DomNode) -> Option<String> {
    node.element_id()
        .map(id_selector)
        .or_else(|| node.test_id().map(|(attr, v)| attr_selector(attr, v)))
        .or_else(|| node.name().map(|n| format!("{}{}", node.tag, attr_selector("name", n))))
}

/// Finds an element whose id, test id or name resembles the failed locator's token
#[derive(Debug, Clone)]
pub struct AttributeFallbackStrategy {
    min_similarity: f64,
}

impl Default for AttributeFallbackStrategy {
    fn default() -> Self {
        Self {
            min_similarity: 0.6,
        }
    }
}

#[async_trait]
impl HealingStrategy for AttributeFallbackStrategy {
    fn name(&self) -> &str {
        "attribute-fallback"
    }

    fn priority(&self) -> f64 {
        6.0
    }

    fn element_types(&self) -> &[&str] {
        &["input", "button", "textarea", "dropdown"]
    }

    async fn apply(&self, page: &dyn PageHandle, ctx: &HealingContext) -> HealResult<StrategyOutcome> {
        let started = Instant::now();
        let Some(token) = locator_token(&ctx.original_locator) else {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        };
        let snapshot = page.snapshot().await?;
        let best = snapshot
            .iter()
            .filter(|n| n.visible && n.is_interactive())
            .filter_map(|n| {
                let score = [n.element_id(), n.test_id().map(|(_, v)| v), n.name()]
                    .into_iter()
                    .flatten()
                    .map(|v| text_similarity_ci(v, &token))
                    .fold(0.0, f64::max);
                precise_locator(n).map(|locator| (locator, score))
            })
            .filter(|(_, score)| *score >= self.min_similarity)
            .max_by(|a, b| a.1.total_cmp(&b.1));
        let Some((locator, score)) = best else {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        };
        if locator == ctx.original_locator || page.count(&locator).await? != 1 {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        }
        Ok(StrategyOutcome::healed(locator, score, started.elapsed()))
    }
}

/// Finds an interactive element whose text equals the quoted text of the description
#[derive(Debug, Clone, Default)]
pub struct TextMatchStrategy;

#[async_trait]
impl HealingStrategy for TextMatchStrategy {
    fn name(&self) -> &str {
        "text-match"
    }

    fn element_types(&self) -> &[&str] {
        &["button", "link", "tab", "menu"]
    }

    async fn apply(&self, page: &dyn PageHandle, ctx: &HealingContext) -> HealResult<StrategyOutcome> {
        let started = Instant::now();
        let Some(text) = ctx
            .description
            .as_deref()
            .and_then(|d| crate::nlp::parse_description(d).text_content)
        else {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        };
        let snapshot = page.snapshot().await?;
        let target = text.to_lowercase();
        let Some(node) = snapshot
            .iter()
            .find(|n| n.is_interactable() && n.trimmed_text().to_lowercase() == target)
        else {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        };
        let locator = text_is_selector(&node.tag, node.trimmed_text());
        if page.count(&locator).await? == 0 {
            return Ok(StrategyOutcome::failed(started.elapsed()));
        }
        Ok(StrategyOutcome::healed(locator, 0.8, started.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SnapshotBuilder;
    use crate::failure::{FailureAnalysis, FailureType};
    use crate::page::StaticPage;
    use chrono::Utc;

    fn page() -> StaticPage {
        let mut b = SnapshotBuilder::new("https://app.test/");
        b.child(0, "button").attr("id", "save-button").text("Save").finish();
        b.child(0, "input").attr("name", "email_address").finish();
        b.child(0, "a").attr("href", "/x").text("Terms").finish();
        StaticPage::new(b.build())
    }

    fn ctx(locator: &str, description: Option<&str>) -> HealingContext {
        let mut analysis = FailureAnalysis::fallback("n/a", Utc::now());
        analysis.failure_type = FailureType::ElementNotFound;
        HealingContext {
            original_locator: locator.to_string(),
            description: description.map(str::to_string),
            analysis,
            attempt: 1,
            element_type: None,
        }
    }

    #[test]
    fn test_locator_token() {
        assert_eq!(locator_token("#save-btn").as_deref(), Some("save-btn"));
        assert_eq!(locator_token("input[name='email']").as_deref(), Some("email"));
        assert_eq!(locator_token("[data-testid=\"go\"]").as_deref(), Some("go"));
        assert_eq!(locator_token("div > span"), None);
    }

    #[tokio::test]
    async fn test_attribute_fallback_finds_renamed_id() {
        let outcome = AttributeFallbackStrategy::default()
            .apply(&page(), &ctx("#save-btn", None))
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.locator.as_deref(), Some("#save-button"));
        assert!(outcome.confidence >= 0.6);
    }

    #[tokio::test]
    async fn test_attribute_fallback_by_name() {
        let outcome = AttributeFallbackStrategy::default()
            .apply(&page(), &ctx("input[name=email_addr]", None))
            .await
            .unwrap();
        assert_eq!(outcome.locator.as_deref(), Some("input[name=\"email_address\"]"));
    }

    #[tokio::test]
    async fn test_attribute_fallback_gives_up() {
        let outcome = AttributeFallbackStrategy::default()
            .apply(&page(), &ctx("#completely-different", None))
            .await
            .unwrap();
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn test_text_match() {
        let strategy = TextMatchStrategy;
        let outcome = strategy
            .apply(&page(), &ctx(".old-link", Some("click the \"terms\" link")))
            .await
            .unwrap();
        assert_eq!(outcome.locator.as_deref(), Some("a:text-is(\"Terms\")"));

        let outcome = strategy
            .apply(&page(), &ctx(".old-link", Some("click the link")))
            .await
            .unwrap();
        assert!(!outcome.success);
    }
}
