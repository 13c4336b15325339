//! Failure classification and healability.

use crate::result::HealResult;
use crate::strategy::AI_IDENTIFICATION;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Why an element operation failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Locator matched nothing
    ElementNotFound,
    /// Element exists but is not rendered
    ElementNotVisible,
    /// Element cannot receive input
    ElementNotInteractive,
    /// Operation ran out of time
    Timeout,
    /// Network request failed
    NetworkError,
    /// Page script threw
    JavaScriptError,
    /// Overlay or modal intercepts input
    ModalBlocking,
    /// Element detached or stale
    UnexpectedState,
    /// None of the above
    Unknown,
}

impl FailureType {
    /// Every variant
    pub const ALL: [Self; 9] = [
        Self::ElementNotFound,
        Self::ElementNotVisible,
        Self::ElementNotInteractive,
        Self::Timeout,
        Self::NetworkError,
        Self::JavaScriptError,
        Self::ModalBlocking,
        Self::UnexpectedState,
        Self::Unknown,
    ];

    /// Whether a locator-level heal can help
    #[must_use]
    pub const fn is_healable(self) -> bool {
        !matches!(self, Self::NetworkError | Self::JavaScriptError | Self::Unknown)
    }

    /// Strategies worth trying, in default order
    #[must_use]
    pub fn suggested_strategies(self) -> &'static [&'static str] {
        match self {
            Self::ElementNotFound => &[
                AI_IDENTIFICATION,
                "attribute-fallback",
                "text-match",
                "similarity-search",
                "structural-path",
            ],
            Self::ElementNotVisible => &["wait-for-visible", "scroll-into-view", AI_IDENTIFICATION],
            Self::ElementNotInteractive => {
                &["wait-for-enabled", "scroll-into-view", AI_IDENTIFICATION]
            }
            Self::Timeout => &["extended-wait", AI_IDENTIFICATION, "attribute-fallback"],
            Self::ModalBlocking => &["dismiss-overlay", "wait-for-visible"],
            Self::UnexpectedState => &["refresh-reference", AI_IDENTIFICATION],
            Self::NetworkError | Self::JavaScriptError | Self::Unknown => &[],
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ElementNotFound => "element_not_found",
            Self::ElementNotVisible => "element_not_visible",
            Self::ElementNotInteractive => "element_not_interactive",
            Self::Timeout => "timeout",
            Self::NetworkError => "network_error",
            Self::JavaScriptError => "javascript_error",
            Self::ModalBlocking => "modal_blocking",
            Self::UnexpectedState => "unexpected_state",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Console, page and network signals around a failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsSummary {
    /// Console error count
    pub console_errors: usize,
    /// Uncaught page error count
    pub page_errors: usize,
    /// Failed request count
    pub network_failures: usize,
    /// Messages captured
    pub messages: Vec<String>,
}

impl DiagnosticsSummary {
    /// Sum counts and concatenate messages
    #[must_use]
    pub fn merged(mut self, other: Self) -> Self {
        self.console_errors += other.console_errors;
        self.page_errors += other.page_errors;
        self.network_failures += other.network_failures;
        self.messages.extend(other.messages);
        self
    }

    fn mentions(&self, words: &[&str]) -> bool {
        self.messages.iter().any(|m| {
            let m = m.to_lowercase();
            words.iter().any(|w| m.contains(w))
        })
    }
}

/// Source of live diagnostics
#[async_trait]
pub trait DiagnosticsCollector: Send + Sync {
    /// Summarize what happened on the page so far
    async fn collect(&self) -> HealResult<DiagnosticsSummary>;
}

/// What is known about a failure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureContext {
    /// Error text reported by the driver
    pub error_message: String,
    /// Locator that failed
    pub locator: Option<String>,
    /// Natural-language description of the element
    pub description: Option<String>,
    /// Diagnostics captured by the caller
    pub diagnostics: DiagnosticsSummary,
}

impl FailureContext {
    /// Context from an error message
    #[must_use]
    pub fn new(error_message: impl Into<String>) -> Self {
        Self {
            error_message: error_message.into(),
            ..Self::default()
        }
    }

    /// Set the failing locator
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }

    /// Set the element description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach diagnostics
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSummary) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Result of [`analyze_failure`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAnalysis {
    /// Classified failure
    pub failure_type: FailureType,
    /// Human explanation
    pub root_cause: String,
    /// Whether healing is worth attempting
    pub healable: bool,
    /// Strategy names in default order
    pub suggested_strategies: Vec<String>,
    /// Classification confidence
    pub confidence: f64,
    /// Merged diagnostics
    pub diagnostics: DiagnosticsSummary,
    /// Analysis time
    pub timestamp: DateTime<Utc>,
}

impl FailureAnalysis {
    /// Analysis returned when anything goes wrong internally
    #[must_use]
    pub fn fallback(reason: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            failure_type: FailureType::Unknown,
            root_cause: format!("Failure analysis unavailable: {reason}"),
            healable: false,
            suggested_strategies: Vec::new(),
            confidence: 0.0,
            diagnostics: DiagnosticsSummary::default(),
            timestamp,
        }
    }
}

const MESSAGE_RULES: &[(FailureType, &[&str])] = &[
    (FailureType::Timeout, &["timeout", "timed out", "exceeded"]),
    (FailureType::ElementNotFound, &["not found", "no element", "no such element", "unable to locate"]),
    (FailureType::ElementNotVisible, &["not visible", "hidden"]),
    (FailureType::ElementNotInteractive, &["not clickable", "not interactable", "not interactive", "disabled"]),
    (FailureType::ModalBlocking, &["intercepts pointer events", "would receive the click", "overlay"]),
    (FailureType::UnexpectedState, &["detached", "stale"]),
];

const NETWORK_WORDS: &[&str] = &["network", "fetch", "net::err"];
const SCRIPT_WORDS: &[&str] = &["javascript", "script error", "uncaught", "referenceerror", "typeerror"];

/// Classify a failure; the second value is the classification confidence
#[must_use]
pub fn classify_failure(error_message: &str, diagnostics: &DiagnosticsSummary) -> (FailureType, f64) {
    let message = error_message.to_lowercase();
    if let Some((failure_type, _)) = MESSAGE_RULES
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| message.contains(n)))
    {
        return (*failure_type, 0.9);
    }
    let in_message = |words: &[&str]| words.iter().any(|w| message.contains(w));
    if in_message(NETWORK_WORDS) || diagnostics.mentions(NETWORK_WORDS) {
        return (FailureType::NetworkError, 0.7);
    }
    if in_message(SCRIPT_WORDS) || diagnostics.mentions(SCRIPT_WORDS) {
        return (FailureType::JavaScriptError, 0.7);
    }
    (FailureType::Unknown, 0.3)
}

fn root_cause(failure_type: FailureType, ctx: &FailureContext, d: &DiagnosticsSummary) -> String {
    let target = ctx
        .locator
        .as_deref()
        .or(ctx.description.as_deref())
        .unwrap_or("the element");
    let signals = format!(
        "{} console errors, {} page errors, {} network failures",
        d.console_errors, d.page_errors, d.network_failures
    );
    match failure_type {
        FailureType::ElementNotFound => format!("`{target}` matched no element ({signals})"),
        FailureType::ElementNotVisible => format!("`{target}` exists but is not visible ({signals})"),
        FailureType::ElementNotInteractive => {
            format!("`{target}` is present but cannot receive input ({signals})")
        }
        FailureType::Timeout => format!("Waiting for `{target}` timed out ({signals})"),
        FailureType::NetworkError => {
            format!("A network failure prevented `{target}` from loading ({signals})")
        }
        FailureType::JavaScriptError => {
            format!("A page script error affected `{target}` ({signals})")
        }
        FailureType::ModalBlocking => {
            format!("An overlay is intercepting input aimed at `{target}` ({signals})")
        }
        FailureType::UnexpectedState => {
            format!("`{target}` was detached or replaced during the operation ({signals})")
        }
        FailureType::Unknown => format!("Unrecognized failure on `{target}` ({signals})"),
    }
}

/// Classify a failure, merging diagnostics from `collector` when given.
///
/// Never fails: a collector error yields [`FailureAnalysis::fallback`].
pub async fn analyze_failure(
    ctx: &FailureContext,
    collector: Option<&dyn DiagnosticsCollector>,
    timestamp: DateTime<Utc>,
) -> FailureAnalysis {
    let diagnostics = match collector {
        Some(c) => match c.collect().await {
            Ok(live) => ctx.diagnostics.clone().merged(live),
            Err(e) => {
                debug!(error = %e, "diagnostics collection failed");
                return FailureAnalysis::fallback(&e.to_string(), timestamp);
            }
        },
        None => ctx.diagnostics.clone(),
    };
    let (failure_type, confidence) = classify_failure(&ctx.error_message, &diagnostics);
    FailureAnalysis {
        failure_type,
        root_cause: root_cause(failure_type, ctx, &diagnostics),
        healable: failure_type.is_healable(),
        suggested_strategies: failure_type
            .suggested_strategies()
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        confidence,
        diagnostics,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::HealError;

    struct Fixed(HealResult<DiagnosticsSummary>);

    #[async_trait]
    impl DiagnosticsCollector for Fixed {
        async fn collect(&self) -> HealResult<DiagnosticsSummary> {
            match &self.0 {
                Ok(d) => Ok(d.clone()),
                Err(_) => Err(HealError::Diagnostics {
                    message: "collector offline".to_string(),
                }),
            }
        }
    }

    mod classify_tests {
        use super::*;

        fn classify(message: &str) -> FailureType {
            classify_failure(message, &DiagnosticsSummary::default()).0
        }

        #[test]
        fn test_message_table_order() {
            assert_eq!(classify("Timeout 30000ms exceeded"), FailureType::Timeout);
            assert_eq!(
                classify("waiting for element: not found (timeout)"),
                FailureType::Timeout
            );
            assert_eq!(classify("No element matches #login"), FailureType::ElementNotFound);
            assert_eq!(classify("element is not visible"), FailureType::ElementNotVisible);
            assert_eq!(classify("Element is not clickable at point"), FailureType::ElementNotInteractive);
            assert_eq!(
                classify("<div class=backdrop> intercepts pointer events"),
                FailureType::ModalBlocking
            );
            assert_eq!(classify("stale element reference"), FailureType::UnexpectedState);
            assert_eq!(classify("something odd"), FailureType::Unknown);
        }

        #[test]
        fn test_diagnostics_classification() {
            let diagnostics = DiagnosticsSummary {
                network_failures: 1,
                messages: vec!["Failed to fetch /api/items".to_string()],
                ..DiagnosticsSummary::default()
            };
            assert_eq!(
                classify_failure("click failed", &diagnostics).0,
                FailureType::NetworkError
            );

            let diagnostics = DiagnosticsSummary {
                page_errors: 1,
                messages: vec!["Uncaught TypeError: x is undefined".to_string()],
                ..DiagnosticsSummary::default()
            };
            assert_eq!(
                classify_failure("click failed", &diagnostics).0,
                FailureType::JavaScriptError
            );
        }

        #[test]
        fn test_healability_table() {
            for t in FailureType::ALL {
                assert_eq!(t.is_healable(), !t.suggested_strategies().is_empty(), "{t}");
            }
            assert!(FailureType::ElementNotFound
                .suggested_strategies()
                .contains(&AI_IDENTIFICATION));
        }
    }

    mod analyze_tests {
        use super::*;

        #[tokio::test]
        async fn test_analysis_with_root_cause() {
            let ctx = FailureContext::new("No element found for selector")
                .with_locator("#submit")
                .with_diagnostics(DiagnosticsSummary {
                    console_errors: 2,
                    ..DiagnosticsSummary::default()
                });
            let analysis = analyze_failure(&ctx, None, Utc::now()).await;
            assert_eq!(analysis.failure_type, FailureType::ElementNotFound);
            assert!(analysis.healable);
            assert_eq!(analysis.suggested_strategies[0], AI_IDENTIFICATION);
            assert!(analysis.root_cause.contains("#submit"));
            assert!(analysis.root_cause.contains("2 console errors"));
        }

        #[tokio::test]
        async fn test_collector_merged() {
            let collector = Fixed(Ok(DiagnosticsSummary {
                network_failures: 3,
                messages: vec!["network request failed".to_string()],
                ..DiagnosticsSummary::default()
            }));
            let ctx = FailureContext::new("click failed");
            let analysis = analyze_failure(&ctx, Some(&collector as &dyn DiagnosticsCollector), Utc::now()).await;
            assert_eq!(analysis.failure_type, FailureType::NetworkError);
            assert!(!analysis.healable);
            assert_eq!(analysis.diagnostics.network_failures, 3);
        }

        #[tokio::test]
        async fn test_collector_error_falls_back() {
            let collector = Fixed(Err(HealError::page("unused")));
            let ctx = FailureContext::new("No element found");
            let analysis = analyze_failure(&ctx, Some(&collector as &dyn DiagnosticsCollector), Utc::now()).await;
            assert_eq!(analysis.failure_type, FailureType::Unknown);
            assert!(!analysis.healable);
            assert!(analysis.confidence.abs() < f64::EPSILON);
        }
    }
}
