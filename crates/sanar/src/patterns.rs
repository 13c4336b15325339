//! UI pattern registry.
//!
//! Built-in patterns are seeded at construction. Learned patterns enter only
//! through [`PatternMatcher::register_pattern`], which the learner calls once
//! a shape has been promoted.

use crate::dom::{DomNode, DomSnapshot, NodeId};
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Matches below this confidence are discarded
pub const MIN_MATCH_CONFIDENCE: f64 = 0.5;

/// Where a pattern came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSource {
    /// Shipped with the engine
    Builtin,
    /// Promoted by the learner
    Learned,
}

/// Recognizable UI element shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPattern {
    /// Unique name
    pub name: String,
    /// Human description
    pub description: String,
    /// Selectors that identify the pattern
    pub selectors: Vec<String>,
    /// Attribute expectations: `*` present, `*x*` contains, else equals (case-insensitive)
    pub attributes: Vec<(String, String)>,
    /// Typical tags
    pub tags: Vec<String>,
    /// Class name fragments
    pub class_hints: Vec<String>,
    /// Expected ARIA role
    pub role: Option<String>,
    /// Free-form structure note
    pub structure: Option<String>,
    /// Base confidence
    pub confidence: f64,
    /// Score multiplier
    pub weight: f64,
    /// Origin
    pub source: PatternSource,
}

/// A pattern matching an element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern name
    pub pattern: String,
    /// Match confidence
    pub confidence: f64,
    /// Pattern origin
    pub source: PatternSource,
}

#[derive(Debug, Clone)]
struct CompiledPattern {
    pattern: UiPattern,
    selectors: Vec<Selector>,
}

impl CompiledPattern {
    fn new(pattern: UiPattern) -> Self {
        let selectors = pattern
            .selectors
            .iter()
            .filter_map(|s| match Selector::parse(s) {
                Ok(sel) => Some(sel),
                Err(e) => {
                    warn!(pattern = %pattern.name, error = %e, "skipping pattern selector");
                    None
                }
            })
            .collect();
        Self { pattern, selectors }
    }
}

/// Built-in and learned patterns with match scoring
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Matcher seeded with the built-in patterns
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: builtin_patterns()
                .into_iter()
                .map(CompiledPattern::new)
                .collect(),
        }
    }

    /// Add a pattern; returns `false` and changes nothing if the name exists
    pub fn register_pattern(&mut self, pattern: UiPattern) -> bool {
        if self.get(&pattern.name).is_some() {
            return false;
        }
        self.patterns.push(CompiledPattern::new(pattern));
        true
    }

    /// Pattern by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&UiPattern> {
        self.patterns
            .iter()
            .map(|c| &c.pattern)
            .find(|p| p.name == name)
    }

    /// All patterns
    pub fn patterns(&self) -> impl Iterator<Item = &UiPattern> {
        self.patterns.iter().map(|c| &c.pattern)
    }

    /// Number of patterns from `source`
    #[must_use]
    pub fn count(&self, source: PatternSource) -> usize {
        self.patterns().filter(|p| p.source == source).count()
    }

    /// Remove learned patterns
    pub fn clear_learned(&mut self) {
        self.patterns
            .retain(|c| c.pattern.source == PatternSource::Builtin);
    }

    /// Patterns matching the node, best first
    #[must_use]
    pub fn match_element(&self, snapshot: &DomSnapshot, id: NodeId) -> Vec<PatternMatch> {
        let Some(node) = snapshot.node(id) else {
            return Vec::new();
        };
        let mut matches: Vec<PatternMatch> = self
            .patterns
            .iter()
            .filter_map(|compiled| {
                let confidence = score(compiled, snapshot, node);
                (confidence >= MIN_MATCH_CONFIDENCE).then(|| PatternMatch {
                    pattern: compiled.pattern.name.clone(),
                    confidence,
                    source: compiled.pattern.source,
                })
            })
            .collect();
        matches.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        matches
    }

    /// Highest scoring match
    #[must_use]
    pub fn best_match(&self, snapshot: &DomSnapshot, id: NodeId) -> Option<PatternMatch> {
        self.match_element(snapshot, id).into_iter().next()
    }
}

/// Whether `actual` satisfies an attribute expectation
#[must_use]
pub fn attribute_matches(expected: &str, actual: Option<&str>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if expected == "*" {
        return true;
    }
    let actual = actual.to_lowercase();
    let expected = expected.to_lowercase();
    if expected.len() > 2 && expected.starts_with('*') && expected.ends_with('*') {
        return actual.contains(&expected[1..expected.len() - 1]);
    }
    actual == expected
}

fn score(compiled: &CompiledPattern, snapshot: &DomSnapshot, node: &DomNode) -> f64 {
    let p = &compiled.pattern;
    let base = if compiled
        .selectors
        .iter()
        .any(|s| s.matches(snapshot, node.index))
    {
        p.confidence
    } else {
        0.0
    };
    let attr_ratio = if p.attributes.is_empty() {
        0.0
    } else {
        let hits = p
            .attributes
            .iter()
            .filter(|(name, expected)| attribute_matches(expected, node.attr(name)))
            .count();
        hits as f64 / p.attributes.len() as f64
    };
    let tag_or_class = p.tags.iter().any(|t| *t == node.tag)
        || node.classes().any(|c| {
            let c = c.to_lowercase();
            p.class_hints.iter().any(|h| c.contains(h.as_str()))
        });
    let role_exact = p.role.is_some() && p.role == node.role();

    let raw = base * 0.4
        + attr_ratio * 0.3
        + if tag_or_class { 0.15 } else { 0.0 }
        + if node.visible { 0.1 } else { 0.0 }
        + if role_exact { 0.05 } else { 0.0 };
    raw * p.weight
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    name: &str,
    description: &str,
    selectors: &[&str],
    attributes: &[(&str, &str)],
    tags: &[&str],
    class_hints: &[&str],
    role: Option<&str>,
    confidence: f64,
) -> UiPattern {
    UiPattern {
        name: name.to_string(),
        description: description.to_string(),
        selectors: strings(selectors),
        attributes: attributes
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        tags: strings(tags),
        class_hints: strings(class_hints),
        role: role.map(str::to_string),
        structure: None,
        confidence,
        weight: 1.0,
        source: PatternSource::Builtin,
    }
}

/// The fifteen shipped patterns
#[must_use]
pub fn builtin_patterns() -> Vec<UiPattern> {
    vec![
        UiPattern {
            structure: Some("form containing a password input".to_string()),
            ..builtin(
                "login-form",
                "Sign-in form",
                &["form#login", "form[id*=login]", "form[action*=login]", "form[class*=login]"],
                &[("action", "*login*")],
                &["form"],
                &["login", "signin", "auth"],
                Some("form"),
                0.9,
            )
        },
        builtin(
            "submit-button",
            "Form submit button",
            &["button[type=submit]", "input[type=submit]"],
            &[("type", "submit")],
            &["button", "input"],
            &["submit"],
            Some("button"),
            0.95,
        ),
        builtin(
            "search-input",
            "Search field",
            &["input[type=search]", "input[name*=search]", "input[placeholder*=earch]", "[role=searchbox]"],
            &[("type", "search")],
            &["input"],
            &["search"],
            Some("searchbox"),
            0.9,
        ),
        builtin(
            "modal",
            "Modal dialog",
            &["dialog", "[role=dialog]", "[aria-modal=true]", ".modal"],
            &[("role", "dialog"), ("aria-modal", "true")],
            &["dialog"],
            &["modal", "dialog", "popup"],
            Some("dialog"),
            0.85,
        ),
        builtin(
            "close-button",
            "Dismiss/close control",
            &["button[aria-label*=lose]", "button.close", "button.btn-close", "[data-dismiss]"],
            &[("aria-label", "*close*")],
            &["button"],
            &["close", "dismiss"],
            Some("button"),
            0.85,
        ),
        builtin(
            "nav-menu",
            "Navigation menu",
            &["nav", "[role=navigation]", "ul.menu", ".navbar"],
            &[("role", "navigation")],
            &["nav"],
            &["nav", "menu"],
            Some("navigation"),
            0.85,
        ),
        builtin(
            "dropdown",
            "Select or combobox",
            &["select", "[role=combobox]", "[role=listbox]", ".dropdown"],
            &[("aria-haspopup", "*")],
            &["select"],
            &["dropdown", "select"],
            Some("combobox"),
            0.85,
        ),
        builtin(
            "checkbox",
            "Checkbox",
            &["input[type=checkbox]", "[role=checkbox]"],
            &[("type", "checkbox")],
            &["input"],
            &["checkbox"],
            Some("checkbox"),
            0.95,
        ),
        builtin(
            "radio",
            "Radio button",
            &["input[type=radio]", "[role=radio]"],
            &[("type", "radio")],
            &["input"],
            &["radio"],
            Some("radio"),
            0.95,
        ),
        builtin(
            "primary-button",
            "Primary call-to-action",
            &[".btn-primary", "button.primary", ".button-primary", "button[class*=primary]"],
            &[("class", "*primary*")],
            &["button"],
            &["primary", "cta"],
            Some("button"),
            0.8,
        ),
        builtin(
            "data-table",
            "Tabular data",
            &["table", "[role=grid]", "[role=table]"],
            &[("role", "grid")],
            &["table"],
            &["table", "grid"],
            Some("table"),
            0.85,
        ),
        builtin(
            "error-message",
            "Validation or error message",
            &["[role=alert]", ".error", ".error-message", ".invalid-feedback", "[aria-live=assertive]"],
            &[("role", "alert")],
            &[],
            &["error", "invalid", "danger"],
            Some("alert"),
            0.8,
        ),
        builtin(
            "loading-indicator",
            "Spinner or progress indicator",
            &["progress", "[role=progressbar]", "[aria-busy=true]", ".spinner", ".loading"],
            &[("aria-busy", "true")],
            &["progress"],
            &["spinner", "loading", "loader", "skeleton"],
            Some("progressbar"),
            0.8,
        ),
        builtin(
            "breadcrumb",
            "Breadcrumb trail",
            &["nav[aria-label*=readcrumb]", ".breadcrumb", "ol.breadcrumb"],
            &[("aria-label", "*breadcrumb*")],
            &[],
            &["breadcrumb"],
            Some("navigation"),
            0.85,
        ),
        builtin(
            "tooltip",
            "Tooltip or popover",
            &["[role=tooltip]", ".tooltip", "[data-tooltip]"],
            &[("role", "tooltip")],
            &[],
            &["tooltip", "popover"],
            Some("tooltip"),
            0.8,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SnapshotBuilder;

    fn page() -> DomSnapshot {
        let mut b = SnapshotBuilder::new("https://app.test/");
        let form = b.child(0, "form").attr("action", "/login").finish();
        b.child(form, "button")
            .attr("type", "submit")
            .attr("class", "btn btn-primary")
            .text("Sign in")
            .finish();
        b.child(0, "div").attr("class", "layout").finish();
        b.child(0, "div").attr("role", "alert").text("Wrong password").finish();
        b.child(0, "input").attr("type", "checkbox").hidden().finish();
        b.build()
    }

    mod builtin_tests {
        use super::*;

        #[test]
        fn test_fifteen_builtins_with_valid_selectors() {
            let matcher = PatternMatcher::new();
            assert_eq!(matcher.count(PatternSource::Builtin), 15);
            for compiled in &matcher.patterns {
                assert_eq!(
                    compiled.selectors.len(),
                    compiled.pattern.selectors.len(),
                    "{}",
                    compiled.pattern.name
                );
            }
        }

        #[test]
        fn test_submit_button_score() {
            let matcher = PatternMatcher::new();
            let best = matcher.best_match(&page(), 2).unwrap();
            assert_eq!(best.pattern, "submit-button");
            // 0.95*0.4 + 0.3 + 0.15 + 0.1 + 0.05
            assert!((best.confidence - 0.98).abs() < 1e-9);
            let names: Vec<String> = matcher
                .match_element(&page(), 2)
                .into_iter()
                .map(|m| m.pattern)
                .collect();
            assert!(names.contains(&"primary-button".to_string()));
        }

        #[test]
        fn test_login_form_by_action() {
            let matcher = PatternMatcher::new();
            let best = matcher.best_match(&page(), 1).unwrap();
            assert_eq!(best.pattern, "login-form");
        }

        #[test]
        fn test_plain_div_matches_nothing() {
            assert!(PatternMatcher::new().match_element(&page(), 3).is_empty());
        }

        #[test]
        fn test_hidden_element_loses_visibility_points() {
            let matcher = PatternMatcher::new();
            let best = matcher.best_match(&page(), 5).unwrap();
            assert_eq!(best.pattern, "checkbox");
            assert!((best.confidence - 0.88).abs() < 1e-9);
        }

        #[test]
        fn test_error_message() {
            let best = PatternMatcher::new().best_match(&page(), 4).unwrap();
            assert_eq!(best.pattern, "error-message");
        }
    }

    mod registry_tests {
        use super::*;

        fn learned(name: &str) -> UiPattern {
            UiPattern {
                source: PatternSource::Learned,
                ..builtin(name, "learned", &["div.layout"], &[], &["div"], &[], None, 0.9)
            }
        }

        #[test]
        fn test_register_is_noop_for_existing_name() {
            let mut matcher = PatternMatcher::new();
            assert!(matcher.register_pattern(learned("layout-shell")));
            assert!(!matcher.register_pattern(learned("layout-shell")));
            assert!(!matcher.register_pattern(learned("modal")));
            assert_eq!(matcher.count(PatternSource::Learned), 1);
        }

        #[test]
        fn test_learned_pattern_matches_and_clears() {
            let mut matcher = PatternMatcher::new();
            matcher.register_pattern(learned("layout-shell"));
            // 0.9*0.4 + 0 + 0.15 + 0.1
            let best = matcher.best_match(&page(), 3).unwrap();
            assert_eq!(best.pattern, "layout-shell");
            assert!((best.confidence - 0.61).abs() < 1e-9);
            matcher.clear_learned();
            assert_eq!(matcher.count(PatternSource::Learned), 0);
            assert_eq!(matcher.count(PatternSource::Builtin), 15);
        }

        #[test]
        fn test_attribute_expectations() {
            assert!(attribute_matches("*", Some("")));
            assert!(!attribute_matches("*", None));
            assert!(attribute_matches("*close*", Some("Close dialog")));
            assert!(attribute_matches("SUBMIT", Some("submit")));
            assert!(!attribute_matches("submit", Some("submitted")));
        }
    }
}
