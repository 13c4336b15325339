//! Natural-language parsing of element descriptions.
//!
//! Turns text such as `click the blue "Save" button at the top` into an
//! [`NlpResult`]: the intended action, the element type, search keywords,
//! visual/position cues and any quoted target text. Results are cached per
//! normalized description.

use crate::clock::Clock;
use crate::ttl_cache::TtlCache;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Action the description asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Click / press / tap
    Click,
    /// Type text into a field
    Type,
    /// Choose an option
    Select,
    /// Tick a checkbox
    Check,
    /// Untick a checkbox
    Uncheck,
    /// Hover over an element
    Hover,
    /// Follow a link / open a page
    Navigate,
    /// Assert state
    Validate,
    /// Read content
    Extract,
    /// Wait for an element
    Wait,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Click => "click",
            Self::Type => "type",
            Self::Select => "select",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Hover => "hover",
            Self::Navigate => "navigate",
            Self::Validate => "validate",
            Self::Extract => "extract",
            Self::Wait => "wait",
        };
        f.write_str(name)
    }
}

const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (Intent::Uncheck, &["uncheck", "untick", "unmark", "deselect"]),
    (Intent::Click, &["click", "press", "tap", "hit", "push", "activate"]),
    (Intent::Type, &["type", "enter", "input", "fill", "write", "provide", "put"]),
    (Intent::Select, &["select", "choose", "pick", "opt"]),
    (Intent::Check, &["check", "tick", "mark"]),
    (Intent::Hover, &["hover", "mouseover", "point"]),
    (Intent::Navigate, &["navigate", "go", "open", "visit", "browse", "follow"]),
    (Intent::Validate, &["verify", "validate", "assert", "ensure", "confirm", "see", "should", "expect"]),
    (Intent::Extract, &["get", "extract", "read", "retrieve", "capture", "fetch", "copy"]),
    (Intent::Wait, &["wait", "pause", "await"]),
];

/// Canonical element types and their synonyms, in priority order
const ELEMENT_TYPES: &[(&str, &[&str])] = &[
    ("button", &["button", "btn", "buttons"]),
    ("link", &["link", "anchor", "hyperlink", "links"]),
    ("checkbox", &["checkbox", "check-box", "tickbox", "checkboxes"]),
    ("radio", &["radio", "radiobutton", "option-button"]),
    ("dropdown", &["dropdown", "drop-down", "combobox", "select", "picklist", "selector"]),
    ("textarea", &["textarea", "comment", "comments", "message-box"]),
    ("input", &["input", "field", "textbox", "text-box", "box", "fields"]),
    ("table", &["table", "grid", "datagrid", "spreadsheet"]),
    ("modal", &["modal", "dialog", "popup", "pop-up", "lightbox"]),
    ("tab", &["tab", "tabs"]),
    ("menu", &["menu", "navbar", "navigation", "sidebar", "nav"]),
    ("image", &["image", "img", "picture", "icon", "logo", "avatar"]),
    ("heading", &["heading", "header", "title", "headline"]),
    ("toggle", &["toggle", "switch"]),
    ("slider", &["slider", "range"]),
    ("alert", &["alert", "notification", "toast", "banner", "snackbar"]),
    ("list", &["list", "listbox"]),
    ("form", &["form"]),
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "into", "onto", "from", "that", "this", "then", "than", "there",
    "their", "its", "are", "was", "were", "has", "have", "had", "been", "but", "not", "all", "any",
    "can", "will", "should", "would", "could", "which", "who", "whom", "what", "when", "where",
    "how", "some", "each", "our", "your", "you", "they", "them", "his", "her", "she", "him",
];

const COLORS: &[&str] = &[
    "red", "green", "blue", "yellow", "orange", "purple", "black", "white", "gray", "grey", "pink",
    "brown",
];
const SIZES: &[&str] = &["big", "large", "small", "tiny", "huge", "wide", "narrow", "tall", "short"];
const SHAPES: &[&str] = &["round", "rounded", "circular", "square", "rectangular", "pill"];
const POSITIONS: &[&str] = &[
    "top", "bottom", "left", "right", "center", "middle", "first", "last", "upper", "lower",
    "corner", "second", "third",
];
const RELATIONSHIPS: &[&str] = &[
    "above", "below", "next", "beside", "near", "inside", "under", "after", "before", "within",
    "between", "adjacent",
];

const FIELD_PURPOSES: &[(&str, &[&str])] = &[
    ("password", &["password", "passcode", "passphrase"]),
    ("email", &["email", "e-mail", "mail"]),
    ("username", &["username", "user", "login", "userid"]),
    ("search", &["search", "find", "lookup"]),
    ("phone", &["phone", "telephone", "mobile"]),
    ("name", &["name", "firstname", "lastname", "surname"]),
    ("address", &["address", "street", "city", "zip", "postcode"]),
];

const FORM_WORDS: &[&str] = &[
    "form", "field", "input", "login", "signin", "sign", "register", "signup", "submit", "password",
    "email", "username",
];

/// Colors, sizes and shapes mentioned in the description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualCues {
    /// Color words
    pub colors: Vec<String>,
    /// Size words
    pub sizes: Vec<String>,
    /// Shape words
    pub shapes: Vec<String>,
}

impl VisualCues {
    /// Whether any cue was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty() && self.sizes.is_empty() && self.shapes.is_empty()
    }
}

/// Positions and relationships mentioned in the description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionCues {
    /// Absolute positions (top, left, first…)
    pub positions: Vec<String>,
    /// Relative positions (above, next to…)
    pub relationships: Vec<String>,
}

/// Form-related reading of the description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormContext {
    /// The description talks about a form field
    pub is_form_related: bool,
    /// What the field is for (password, email, username…)
    pub field_purpose: Option<String>,
}

/// Parsed description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlpResult {
    /// Requested action
    pub intent: Intent,
    /// Canonical element type, when recognised
    pub element_type: Option<String>,
    /// Search keywords
    pub keywords: Vec<String>,
    /// Visual cues
    pub visual_cues: VisualCues,
    /// Position cues
    pub position_cues: PositionCues,
    /// First quoted substring, original case
    pub text_content: Option<String>,
    /// Parse confidence in [0, 1]
    pub confidence: f64,
    /// ARIA roles the element is expected to have
    pub expected_roles: Vec<String>,
    /// Form interpretation
    pub form_context: FormContext,
}

impl NlpResult {
    /// Whether `keyword` is among the search keywords
    #[must_use]
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k == keyword)
    }
}

/// Description parser with a per-text cache
#[derive(Debug)]
pub struct NaturalLanguageEngine {
    cache: TtlCache<String, Arc<NlpResult>>,
}

impl NaturalLanguageEngine {
    /// Create an engine whose cache entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Parse a description, returning the cached result when available
    pub fn process_description(&mut self, text: &str) -> Arc<NlpResult> {
        let key = normalize(text);
        if let Some(hit) = self.cache.get(&key) {
            return hit;
        }
        let result = Arc::new(parse_description(text));
        self.cache.insert(key, result.clone());
        result
    }

    /// Drop every cached parse
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached parses
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// Lower-case, trim and collapse whitespace
#[must_use]
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Split lower-cased text on whitespace; quote characters stay on tokens
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

fn strip_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
}

fn quoted_text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#""([^"]+)"|“([^”]+)”|'([^']+)'"#).expect("quoted text pattern is valid")
    })
}

/// Parse without caching
#[must_use]
pub fn parse_description(text: &str) -> NlpResult {
    let tokens = tokenize(text);
    let words: Vec<&str> = tokens.iter().map(|t| strip_token(t)).collect();

    let explicit_intent = words.iter().take(3).find_map(|w| intent_for_word(w));
    let element_type = detect_element_type(&words);
    let intent = explicit_intent.unwrap_or_else(|| infer_intent(element_type));

    let keywords = extract_keywords(&words);
    let visual_cues = VisualCues {
        colors: collect_vocabulary(&words, COLORS),
        sizes: collect_vocabulary(&words, SIZES),
        shapes: collect_vocabulary(&words, SHAPES),
    };
    let position_cues = PositionCues {
        positions: collect_vocabulary(&words, POSITIONS),
        relationships: collect_vocabulary(&words, RELATIONSHIPS),
    };
    let text_content = extract_quoted(text);

    let mut confidence = 0.5;
    if explicit_intent.is_some() {
        confidence += 0.1;
    }
    if element_type.is_some() {
        confidence += 0.2;
    }
    if keywords.len() >= 2 {
        confidence += 0.1;
    }
    if !visual_cues.is_empty() {
        confidence += 0.1;
    }

    NlpResult {
        intent,
        element_type: element_type.map(str::to_string),
        expected_roles: expected_roles(element_type),
        form_context: form_context(&words),
        keywords,
        visual_cues,
        position_cues,
        text_content,
        confidence: f64::min(confidence, 1.0),
    }
}

fn intent_for_word(word: &str) -> Option<Intent> {
    INTENT_KEYWORDS
        .iter()
        .find(|(_, synonyms)| synonyms.contains(&word))
        .map(|(intent, _)| *intent)
}

fn detect_element_type(words: &[&str]) -> Option<&'static str> {
    let table_hit = ELEMENT_TYPES
        .iter()
        .find(|(_, synonyms)| words.iter().any(|w| synonyms.contains(w)))
        .map(|(name, _)| *name);
    table_hit.or_else(|| {
        if words.iter().any(|w| matches!(*w, "submit" | "send")) {
            Some("button")
        } else if words
            .iter()
            .any(|w| matches!(*w, "email" | "password" | "username"))
        {
            Some("input")
        } else {
            None
        }
    })
}

fn infer_intent(element_type: Option<&str>) -> Intent {
    match element_type {
        Some("input" | "textarea") => Intent::Type,
        Some("dropdown") => Intent::Select,
        Some("checkbox" | "toggle") => Intent::Check,
        Some("link") => Intent::Navigate,
        _ => Intent::Click,
    }
}

fn extract_keywords(words: &[&str]) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in words {
        if word.chars().count() <= 2 || STOP_WORDS.contains(word) {
            continue;
        }
        if !keywords.iter().any(|k| k == word) {
            keywords.push((*word).to_string());
        }
    }
    keywords
}

fn collect_vocabulary(words: &[&str], vocabulary: &[&str]) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for word in words {
        if vocabulary.contains(word) && !found.iter().any(|f| f == word) {
            found.push((*word).to_string());
        }
    }
    found
}

fn extract_quoted(text: &str) -> Option<String> {
    quoted_text_regex().captures(text).and_then(|caps| {
        caps.iter()
            .skip(1)
            .flatten()
            .next()
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

fn expected_roles(element_type: Option<&str>) -> Vec<String> {
    let roles: &[&str] = match element_type {
        Some("button") => &["button"],
        Some("link") => &["link"],
        Some("input") => &["textbox", "searchbox"],
        Some("textarea") => &["textbox"],
        Some("checkbox") => &["checkbox"],
        Some("radio") => &["radio"],
        Some("dropdown") => &["combobox", "listbox"],
        Some("table") => &["table", "grid"],
        Some("modal") => &["dialog", "alertdialog"],
        Some("tab") => &["tab"],
        Some("menu") => &["menu", "menubar", "navigation"],
        Some("image") => &["img"],
        Some("heading") => &["heading"],
        Some("toggle") => &["switch", "checkbox"],
        Some("slider") => &["slider"],
        Some("alert") => &["alert", "status"],
        Some("list") => &["list", "listbox"],
        Some("form") => &["form"],
        _ => &[],
    };
    roles.iter().map(|r| (*r).to_string()).collect()
}

fn form_context(words: &[&str]) -> FormContext {
    let field_purpose = FIELD_PURPOSES
        .iter()
        .find(|(_, vocab)| words.iter().any(|w| vocab.contains(w)))
        .map(|(purpose, _)| (*purpose).to_string());
    FormContext {
        is_form_related: field_purpose.is_some() || words.iter().any(|w| FORM_WORDS.contains(w)),
        field_purpose,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn engine(clock: &Arc<FakeClock>) -> NaturalLanguageEngine {
        NaturalLanguageEngine::new(Duration::from_secs(300), clock.clone())
    }

    mod intent_tests {
        use super::*;

        #[test]
        fn test_explicit_intent_in_first_three_tokens() {
            assert_eq!(parse_description("click the login button").intent, Intent::Click);
            assert_eq!(parse_description("enter the password").intent, Intent::Type);
            assert_eq!(parse_description("please uncheck newsletter").intent, Intent::Uncheck);
        }

        #[test]
        fn test_intent_beyond_third_token_ignored() {
            // "click" is the 4th token, so intent falls back to the element type
            let result = parse_description("the big green click button");
            assert_eq!(result.intent, Intent::Click);
            assert!(result.confidence < 0.95);
        }

        #[test]
        fn test_intent_inferred_from_element_type() {
            assert_eq!(parse_description("username field").intent, Intent::Type);
            assert_eq!(parse_description("country dropdown").intent, Intent::Select);
            assert_eq!(parse_description("the terms checkbox").intent, Intent::Check);
        }

        #[test]
        fn test_default_intent_is_click() {
            assert_eq!(parse_description("profile").intent, Intent::Click);
        }
    }

    mod element_type_tests {
        use super::*;

        #[test]
        fn test_synonym_table() {
            assert_eq!(
                parse_description("press the btn").element_type.as_deref(),
                Some("button")
            );
            assert_eq!(
                parse_description("close the popup").element_type.as_deref(),
                Some("modal")
            );
        }

        #[test]
        fn test_fallbacks() {
            assert_eq!(
                parse_description("submit").element_type.as_deref(),
                Some("button")
            );
            assert_eq!(
                parse_description("enter the password").element_type.as_deref(),
                Some("input")
            );
        }

        #[test]
        fn test_expected_roles() {
            let result = parse_description("open the settings dialog");
            assert_eq!(result.expected_roles, vec!["dialog", "alertdialog"]);
        }
    }

    mod keyword_tests {
        use super::*;

        #[test]
        fn test_stop_words_and_short_tokens_removed() {
            let result = parse_description("click on the Save button");
            assert_eq!(result.keywords, vec!["click", "save", "button"]);
        }

        #[test]
        fn test_quoted_text_preserves_case() {
            let result = parse_description(r#"click the "Sign In" button"#);
            assert_eq!(result.text_content.as_deref(), Some("Sign In"));
            assert!(result.has_keyword("sign"));
            assert!(!result.has_keyword("in"));
        }

        #[test]
        fn test_visual_and_position_cues() {
            let result = parse_description("click the big red button at the top right");
            assert_eq!(result.visual_cues.colors, vec!["red"]);
            assert_eq!(result.visual_cues.sizes, vec!["big"]);
            assert_eq!(result.position_cues.positions, vec!["top", "right"]);
        }

        #[test]
        fn test_form_context() {
            let result = parse_description("enter the email address");
            assert!(result.form_context.is_form_related);
            assert_eq!(result.form_context.field_purpose.as_deref(), Some("email"));
        }
    }

    mod confidence_tests {
        use super::*;

        #[test]
        fn test_base_confidence() {
            let result = parse_description("xyz");
            assert!((result.confidence - 0.5).abs() < 1e-9);
        }

        #[test]
        fn test_full_confidence_capped() {
            // intent +0.1, element type +0.2, >=2 keywords +0.1, visual +0.1
            let result = parse_description("click the large blue submit button");
            assert!((result.confidence - 1.0).abs() < 1e-9);
        }

        #[test]
        fn test_partial_confidence() {
            // intent +0.1, element type (fallback) +0.2, keywords: enter, password
            let result = parse_description("enter the password");
            assert!((result.confidence - 0.9).abs() < 1e-9);
        }
    }

    mod cache_tests {
        use super::*;

        #[test]
        fn test_cached_result_is_identical() {
            let clock = Arc::new(FakeClock::at_ms(0));
            let mut nlp = engine(&clock);
            let first = nlp.process_description("Click the  Login button ");
            let second = nlp.process_description("click the login button");
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(nlp.cache_len(), 1);
        }

        #[test]
        fn test_cache_expires_after_ttl() {
            let clock = Arc::new(FakeClock::at_ms(0));
            let mut nlp = engine(&clock);
            let first = nlp.process_description("click login");
            clock.fast_forward(Duration::from_secs(301));
            let second = nlp.process_description("click login");
            assert!(!Arc::ptr_eq(&first, &second));
            assert_eq!(*first, *second);
        }

        #[test]
        fn test_clear_cache() {
            let clock = Arc::new(FakeClock::at_ms(0));
            let mut nlp = engine(&clock);
            nlp.process_description("click login");
            nlp.clear_cache();
            assert_eq!(nlp.cache_len(), 0);
        }
    }
}
