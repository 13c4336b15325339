//! Execution-context gate.
//!
//! Classifies step text as UI, API or database work and keeps a stack of the
//! active contexts. Healing is only enabled while the current context is UI.
//!
//! # Policy
//!
//! `Unknown` always disables healing. [`ContextGate::detect`] never produces
//! `Unknown`: text without API or database markers is treated as UI because
//! most BDD steps drive the interface. `Unknown` only appears when pushed
//! explicitly or when the stack is empty.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Kind of test step being executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionContext {
    /// Browser/UI interaction
    Ui,
    /// HTTP/API call
    Api,
    /// Database access
    Database,
    /// Not classified
    Unknown,
}

impl fmt::Display for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Database => "database",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Marker that decided a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Word(&'static str),
    Pair(&'static str, &'static str),
}

impl Marker {
    fn matches(self, words: &HashSet<&str>) -> bool {
        match self {
            Self::Word(w) => words.contains(w),
            Self::Pair(a, b) => words.contains(a) && words.contains(b),
        }
    }

    fn describe(self) -> String {
        match self {
            Self::Word(w) => w.to_string(),
            Self::Pair(a, b) => format!("{a}+{b}"),
        }
    }
}

const API_MARKERS: &[Marker] = &[
    Marker::Word("api"),
    Marker::Word("request"),
    Marker::Word("response"),
    Marker::Word("endpoint"),
    Marker::Pair("post", "body"),
    Marker::Pair("get", "header"),
    Marker::Word("rest"),
    Marker::Word("graphql"),
    Marker::Word("soap"),
];

const DATABASE_MARKERS: &[Marker] = &[
    Marker::Word("database"),
    Marker::Word("query"),
    Marker::Word("sql"),
    Marker::Word("insert"),
    Marker::Word("update"),
    Marker::Pair("delete", "record"),
    Marker::Pair("select", "from"),
    Marker::Word("mongodb"),
    Marker::Word("collection"),
];

const UI_MARKERS: &[&str] = &[
    "click", "type", "enter", "button", "field", "page", "visible", "checkbox", "link", "menu",
    "dropdown", "form", "input", "navigate", "see", "display", "displayed", "hover", "scroll",
    "modal", "dialog", "tab", "text", "screen", "window", "popup", "fill", "press", "upload",
    "select", "radio", "label", "icon", "image", "login", "logout", "open", "close", "toggle",
];

/// Result of classifying a piece of step text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDetection {
    /// Detected context
    pub context: ExecutionContext,
    /// Marker that decided it; `None` when the UI default applied
    pub marker: Option<String>,
}

/// Stack-based execution context tracker
#[derive(Debug, Clone, Default)]
pub struct ContextGate {
    stack: Vec<ExecutionContext>,
}

impl ContextGate {
    /// Create an empty gate (current context is `Unknown`)
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify text: API markers first, then database, then UI, default UI
    #[must_use]
    pub fn detect(text: &str) -> ExecutionContext {
        Self::classify(text).context
    }

    /// Classify text and report the deciding marker
    #[must_use]
    pub fn classify(text: &str) -> ContextDetection {
        let lowered = text.to_lowercase();
        let words: HashSet<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for (context, table) in [
            (ExecutionContext::Api, API_MARKERS),
            (ExecutionContext::Database, DATABASE_MARKERS),
        ] {
            if let Some(marker) = table.iter().find(|m| m.matches(&words)) {
                return ContextDetection {
                    context,
                    marker: Some(marker.describe()),
                };
            }
        }

        let marker = UI_MARKERS
            .iter()
            .find(|m| words.contains(**m))
            .map(|m| (*m).to_string());
        ContextDetection {
            context: ExecutionContext::Ui,
            marker,
        }
    }

    /// Enter a context
    pub fn push(&mut self, context: ExecutionContext) {
        self.stack.push(context);
    }

    /// Classify `text` and enter the resulting context
    pub fn push_detected(&mut self, text: &str) -> ExecutionContext {
        let context = Self::detect(text);
        self.push(context);
        context
    }

    /// Leave the current context
    pub fn pop(&mut self) -> Option<ExecutionContext> {
        self.stack.pop()
    }

    /// Current context, `Unknown` when the stack is empty
    #[must_use]
    pub fn current(&self) -> ExecutionContext {
        self.stack.last().copied().unwrap_or(ExecutionContext::Unknown)
    }

    /// Whether any context is active
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.stack.is_empty()
    }

    /// Stack depth
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Reset the stack
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Healing is allowed only in UI context
    #[must_use]
    pub fn is_ai_healing_enabled(&self) -> bool {
        Self::allows(self.current())
    }

    /// The single gating rule: only `Ui` is allowed
    #[must_use]
    pub const fn allows(context: ExecutionContext) -> bool {
        matches!(context, ExecutionContext::Ui)
    }
}
