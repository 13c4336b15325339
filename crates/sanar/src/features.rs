//! Element feature records and extraction.
//!
//! [`ElementFeatures`] is an immutable capture of one element across five
//! dimensions (text, visual, structural, semantic, context). Capturing again
//! produces a new record. Deep-search context found during candidate
//! discovery is merged once with [`ElementFeatures::with_deep_context`].

use crate::clock::Clock;
use crate::dom::{DomNode, DomSnapshot, NodeId, Rect};
use crate::page::PageHandle;
use crate::result::{HealError, HealResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Longest text kept from an element or its neighbourhood
const MAX_TEXT: usize = 200;

/// Textual features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextFeatures {
    /// Own text
    pub content: String,
    /// Rendered subtree text
    pub inner_text: String,
    /// `placeholder`
    pub placeholder: Option<String>,
    /// `aria-label`
    pub aria_label: Option<String>,
    /// `title`
    pub title: Option<String>,
    /// `alt`
    pub alt: Option<String>,
    /// Current `value`
    pub value: Option<String>,
}

/// Rendering features
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualFeatures {
    /// Rendered and not hidden
    pub visible: bool,
    /// Layout box
    pub rect: Option<Rect>,
    /// Foreground color
    pub color: Option<String>,
    /// Background color
    pub background_color: Option<String>,
    /// Font size in px
    pub font_size: Option<f64>,
    /// Font weight
    pub font_weight: Option<String>,
    /// Cursor
    pub cursor: Option<String>,
    /// z-index
    pub z_index: Option<i32>,
}

/// Position in the tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralFeatures {
    /// Tag name
    pub tag: String,
    /// Element id
    pub id: Option<String>,
    /// Class list
    pub classes: Vec<String>,
    /// All attributes
    pub attributes: BTreeMap<String, String>,
    /// Distance from the root
    pub depth: usize,
    /// Index among siblings
    pub sibling_index: usize,
    /// Number of siblings including self
    pub sibling_count: usize,
    /// Number of element children
    pub child_count: usize,
    /// Parent tag
    pub parent_tag: Option<String>,
    /// Tag path from the root, e.g. `body>form>input`
    pub path: String,
}

/// Meaning of the element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticFeatures {
    /// Explicit or implicit ARIA role
    pub role: Option<String>,
    /// Input type for `<input>`
    pub input_type: Option<String>,
    /// `name`
    pub name: Option<String>,
    /// Test id value
    pub test_id: Option<String>,
    /// Derived purpose: password, email, username, search, phone, submit, navigation…
    pub semantic_type: Option<String>,
    /// User can act on it
    pub interactive: bool,
    /// Hidden input or CSRF/framework field
    pub system_field: bool,
    /// `aria-*` attributes
    pub aria: BTreeMap<String, String>,
}

/// Table coordinates of a cell-contained element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableContext {
    /// Zero-based row within the table
    pub row: usize,
    /// Zero-based column within the row
    pub column: usize,
    /// Header text of that column
    pub header: Option<String>,
    /// All header texts
    pub headers: Vec<String>,
}

/// Findings from deep contextual search around a candidate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeepContext {
    /// Associated label text
    pub label: Option<String>,
    /// Sibling and parent text
    pub surrounding_text: String,
    /// Nearest semantic ancestor (landmark, form, section…)
    pub semantic_context: Option<String>,
    /// Headings within range above the element
    pub headings: Vec<String>,
    /// Table position
    pub table: Option<TableContext>,
    /// Frontend framework markers (react, angular, vue, svelte)
    pub framework_hints: Vec<String>,
    /// Component library markers (material-ui, ant-design, bootstrap, chakra)
    pub component_hints: Vec<String>,
    /// Inside an open shadow root
    pub in_shadow_root: bool,
    /// Inside an iframe
    pub in_iframe: bool,
    /// Loading indicator nearby
    pub loading_nearby: bool,
}

/// Surroundings of the element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFeatures {
    /// Enclosing form id or name
    pub form: Option<String>,
    /// Parent's rendered text
    pub parent_text: String,
    /// Nearest landmark role
    pub landmark: Option<String>,
    /// Nearest preceding heading text
    pub heading: Option<String>,
    /// Deep-search findings, merged once
    pub deep: Option<DeepContext>,
}

/// Immutable capture of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementFeatures {
    /// Text features
    pub text: TextFeatures,
    /// Visual features
    pub visual: VisualFeatures,
    /// Structural features
    pub structural: StructuralFeatures,
    /// Semantic features
    pub semantic: SemanticFeatures,
    /// Context features
    pub context: ContextFeatures,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

impl ElementFeatures {
    /// Merge deep-search context; a record that already carries one is returned unchanged
    #[must_use]
    pub fn with_deep_context(mut self, deep: DeepContext) -> Self {
        if self.context.deep.is_none() {
            self.context.deep = Some(deep);
        } else {
            tracing::debug!(tag = %self.structural.tag, "deep context already merged");
        }
        self
    }

    /// Deep context, if merged
    #[must_use]
    pub fn deep(&self) -> Option<&DeepContext> {
        self.context.deep.as_ref()
    }

    /// Best human-readable text
    #[must_use]
    pub fn display_text(&self) -> &str {
        let inner = self.text.inner_text.trim();
        if !inner.is_empty() {
            return inner;
        }
        self.text
            .aria_label
            .as_deref()
            .or(self.text.placeholder.as_deref())
            .or(self.text.value.as_deref())
            .unwrap_or_default()
    }
}

/// Produces [`ElementFeatures`] for a node
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    /// Capture features of `node`
    async fn extract(
        &self,
        page: &dyn PageHandle,
        snapshot: &DomSnapshot,
        node: NodeId,
    ) -> HealResult<ElementFeatures>;
}

/// Extractor that reads everything from the snapshot
#[derive(Debug, Clone)]
pub struct SnapshotFeatureExtractor {
    clock: Arc<dyn Clock>,
}

impl SnapshotFeatureExtractor {
    /// Create an extractor stamping records with `clock`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl FeatureExtractor for SnapshotFeatureExtractor {
    async fn extract(
        &self,
        _page: &dyn PageHandle,
        snapshot: &DomSnapshot,
        node: NodeId,
    ) -> HealResult<ElementFeatures> {
        extract_features(snapshot, node, self.clock.now())
    }
}

/// Capture features of `id` from `snapshot`
pub fn extract_features(
    snapshot: &DomSnapshot,
    id: NodeId,
    timestamp: DateTime<Utc>,
) -> HealResult<ElementFeatures> {
    let node = snapshot.node(id).ok_or_else(|| HealError::Extraction {
        message: format!("node {id} not in snapshot"),
    })?;
    Ok(ElementFeatures {
        text: text_features(node),
        visual: visual_features(node),
        structural: structural_features(snapshot, node),
        semantic: semantic_features(node),
        context: context_features(snapshot, node),
        timestamp,
    })
}

/// Truncate to the feature text limit on a char boundary
#[must_use]
pub fn clip(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_TEXT).collect()
}

fn owned(value: Option<&str>) -> Option<String> {
    value.map(str::to_string)
}

fn text_features(node: &DomNode) -> TextFeatures {
    TextFeatures {
        content: clip(&node.text),
        inner_text: clip(&node.inner_text),
        placeholder: owned(node.placeholder()),
        aria_label: owned(node.aria_label()),
        title: owned(node.non_empty_attr("title")),
        alt: owned(node.non_empty_attr("alt")),
        value: owned(node.non_empty_attr("value")),
    }
}

fn visual_features(node: &DomNode) -> VisualFeatures {
    VisualFeatures {
        visible: node.visible,
        rect: node.rect,
        color: node.style.color.clone(),
        background_color: node.style.background_color.clone(),
        font_size: node.style.font_size,
        font_weight: node.style.font_weight.clone(),
        cursor: node.style.cursor.clone(),
        z_index: node.style.z_index,
    }
}

fn structural_features(snapshot: &DomSnapshot, node: &DomNode) -> StructuralFeatures {
    let parent = node.parent.and_then(|p| snapshot.node(p));
    let (sibling_index, sibling_count) = parent.map_or((0, 1), |p| {
        (
            p.children.iter().position(|c| *c == node.index).unwrap_or(0),
            p.children.len(),
        )
    });
    let mut path: Vec<&str> = snapshot.ancestors(node.index).map(|a| a.tag.as_str()).collect();
    path.reverse();
    path.push(&node.tag);
    StructuralFeatures {
        tag: node.tag.clone(),
        id: owned(node.element_id()),
        classes: node.classes().map(str::to_string).collect(),
        attributes: node.attributes.clone(),
        depth: snapshot.depth(node.index),
        sibling_index,
        sibling_count,
        child_count: node.children.len(),
        parent_tag: parent.map(|p| p.tag.clone()),
        path: path.join(">"),
    }
}

const PURPOSE_HINTS: &[(&str, &[&str])] = &[
    ("password", &["password", "passwd", "pwd"]),
    ("email", &["email", "e-mail", "mail"]),
    ("username", &["username", "user", "login", "userid"]),
    ("search", &["search", "query"]),
    ("phone", &["phone", "tel", "mobile"]),
];

/// Derived purpose of an element
#[must_use]
pub fn semantic_type(node: &DomNode) -> Option<String> {
    let found = match node.input_type().as_deref() {
        Some("password") => Some("password"),
        Some("email") => Some("email"),
        Some("search") => Some("search"),
        Some("tel") => Some("phone"),
        Some("submit" | "button" | "reset" | "image") => Some("submit"),
        Some("checkbox") => Some("checkbox"),
        Some("radio") => Some("radio"),
        Some(_) => {
            let hay = [node.name(), node.element_id(), node.placeholder(), node.aria_label()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            PURPOSE_HINTS
                .iter()
                .find(|(_, hints)| hints.iter().any(|h| hay.contains(h)))
                .map(|(purpose, _)| *purpose)
                .or(Some("text"))
        }
        None => match node.tag.as_str() {
            "button" => Some(if node.attr("type") == Some("submit") {
                "submit"
            } else {
                "action"
            }),
            "a" => Some("navigation"),
            "select" => Some("choice"),
            "textarea" => Some("text"),
            _ => None,
        },
    };
    found.map(str::to_string)
}

fn semantic_features(node: &DomNode) -> SemanticFeatures {
    SemanticFeatures {
        role: node.role(),
        input_type: node.input_type(),
        name: owned(node.name()),
        test_id: node.test_id().map(|(_, v)| v.to_string()),
        semantic_type: semantic_type(node),
        interactive: node.is_interactive(),
        system_field: node.is_system_field(),
        aria: node
            .attributes
            .iter()
            .filter(|(k, _)| k.starts_with("aria-"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}

const LANDMARK_ROLES: &[&str] = &[
    "navigation", "main", "banner", "contentinfo", "complementary", "region", "dialog", "search",
];

fn context_features(snapshot: &DomSnapshot, node: &DomNode) -> ContextFeatures {
    let form = snapshot
        .closest(node.index, |a| a.tag == "form")
        .and_then(|f| f.element_id().or_else(|| f.name()).map(str::to_string));
    let parent_text = node
        .parent
        .and_then(|p| snapshot.node(p))
        .map(|p| clip(&p.inner_text))
        .unwrap_or_default();
    let landmark = snapshot
        .ancestors(node.index)
        .find_map(|a| a.role().filter(|r| LANDMARK_ROLES.contains(&r.as_str())));
    let heading = snapshot.nodes[..node.index]
        .iter()
        .rev()
        .find(|n| n.heading_level().is_some() && n.visible)
        .map(|h| clip(&h.inner_text));
    ContextFeatures {
        form,
        parent_text,
        landmark,
        heading,
        deep: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::dom::SnapshotBuilder;
    use crate::page::StaticPage;

    fn signup() -> DomSnapshot {
        let mut b = SnapshotBuilder::new("https://app.test/signup");
        b.child(0, "h2").text("Create account").finish();
        let main = b.child(0, "main").finish();
        let form = b.child(main, "form").attr("id", "signup").finish();
        b.child(form, "input")
            .attr("type", "password")
            .attr("name", "pwd")
            .attr("aria-describedby", "hint")
            .rect(10.0, 40.0, 200.0, 30.0)
            .finish();
        b.child(form, "input")
            .attr("name", "contact_email")
            .attr("placeholder", "Email address")
            .finish();
        b.child(form, "button").attr("type", "submit").text("Join").finish();
        b.build()
    }

    mod extract_tests {
        use super::*;

        #[test]
        fn test_structural_and_semantic() {
            let snapshot = signup();
            let features = extract_features(&snapshot, 4, Utc::now()).unwrap();
            assert_eq!(features.structural.tag, "input");
            assert_eq!(features.structural.path, "body>main>form>input");
            assert_eq!(features.structural.depth, 3);
            assert_eq!(features.structural.sibling_count, 3);
            assert_eq!(features.semantic.input_type.as_deref(), Some("password"));
            assert_eq!(features.semantic.semantic_type.as_deref(), Some("password"));
            assert!(features.semantic.aria.contains_key("aria-describedby"));
            assert_eq!(features.context.form.as_deref(), Some("signup"));
            assert_eq!(features.context.landmark.as_deref(), Some("main"));
            assert_eq!(features.context.heading.as_deref(), Some("Create account"));
        }

        #[test]
        fn test_semantic_type_from_hints() {
            let snapshot = signup();
            assert_eq!(semantic_type(&snapshot.nodes[5]).as_deref(), Some("email"));
            assert_eq!(semantic_type(&snapshot.nodes[6]).as_deref(), Some("submit"));
            assert_eq!(semantic_type(&snapshot.nodes[1]), None);
        }

        #[test]
        fn test_missing_node() {
            let snapshot = signup();
            assert!(matches!(
                extract_features(&snapshot, 99, Utc::now()),
                Err(HealError::Extraction { .. })
            ));
        }

        #[test]
        fn test_display_text_fallbacks() {
            let snapshot = signup();
            let input = extract_features(&snapshot, 5, Utc::now()).unwrap();
            assert_eq!(input.display_text(), "Email address");
            let button = extract_features(&snapshot, 6, Utc::now()).unwrap();
            assert_eq!(button.display_text(), "Join");
        }

        #[tokio::test]
        async fn test_snapshot_extractor_uses_clock() {
            let snapshot = signup();
            let page = StaticPage::new(snapshot.clone());
            let extractor = SnapshotFeatureExtractor::new(Arc::new(FakeClock::at_ms(1_000)));
            let features = extractor.extract(&page, &snapshot, 6).await.unwrap();
            assert_eq!(features.timestamp.timestamp_millis(), 1_000);
        }
    }

    mod deep_context_tests {
        use super::*;

        #[test]
        fn test_merged_once() {
            let snapshot = signup();
            let features = extract_features(&snapshot, 4, Utc::now()).unwrap();
            let first = DeepContext {
                label: Some("Password".to_string()),
                ..DeepContext::default()
            };
            let second = DeepContext {
                label: Some("Other".to_string()),
                ..DeepContext::default()
            };
            let merged = features.with_deep_context(first).with_deep_context(second);
            assert_eq!(
                merged.deep().and_then(|d| d.label.as_deref()),
                Some("Password")
            );
        }

        #[test]
        fn test_clip_collapses_and_truncates() {
            assert_eq!(clip("  a \n b  "), "a b");
            assert_eq!(clip(&"x".repeat(500)).len(), MAX_TEXT);
        }
    }
}
