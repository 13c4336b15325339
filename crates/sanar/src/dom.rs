//! Serialized DOM snapshot.
//!
//! The engine reads a page through a single in-page evaluation
//! ([`DOM_SNAPSHOT_SCRIPT`]) that flattens the live DOM, open shadow roots and
//! same-origin iframes into an arena of [`DomNode`]s. Everything else
//! (hierarchy, forms, label pairing, layout proximity) is computed in Rust
//! over that arena.

use crate::result::{HealError, HealResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Index of a node inside a [`DomSnapshot`]
pub type NodeId = usize;

/// Script evaluated in page context to produce a [`DomSnapshot`] as JSON
pub const DOM_SNAPSHOT_SCRIPT: &str = r#"(() => {
  const nodes = [];
  const MAX_NODES = 20000;
  const styleOf = (el) => {
    const cs = window.getComputedStyle(el);
    return {
      display: cs.display, visibility: cs.visibility, opacity: parseFloat(cs.opacity || '1'),
      color: cs.color, background_color: cs.backgroundColor,
      font_size: parseFloat(cs.fontSize) || null, font_weight: cs.fontWeight,
      cursor: cs.cursor, position: cs.position,
      z_index: Number.isFinite(parseInt(cs.zIndex, 10)) ? parseInt(cs.zIndex, 10) : null
    };
  };
  const ownText = (el) => Array.from(el.childNodes)
    .filter((n) => n.nodeType === Node.TEXT_NODE)
    .map((n) => n.textContent.trim()).filter(Boolean).join(' ');
  const visit = (el, parent, flags, offset) => {
    if (nodes.length >= MAX_NODES) return;
    const index = nodes.length;
    const r = el.getBoundingClientRect();
    const style = styleOf(el);
    const attributes = {};
    for (const a of Array.from(el.attributes || [])) attributes[a.name] = a.value;
    if ('value' in el && typeof el.value === 'string' && el.value) attributes['value'] = el.value;
    const visible = r.width > 0 && r.height > 0 && style.display !== 'none'
      && style.visibility !== 'hidden' && style.opacity > 0;
    nodes.push({
      index, parent, children: [], tag: el.tagName.toLowerCase(), attributes,
      text: ownText(el), inner_text: (el.innerText || el.textContent || '').trim().slice(0, 500),
      visible,
      rect: { x: r.x + offset.x + window.scrollX, y: r.y + offset.y + window.scrollY,
              width: r.width, height: r.height },
      style, in_shadow_root: flags.shadow, in_iframe: flags.iframe
    });
    if (parent !== null) nodes[parent].children.push(index);
    const kids = Array.from(el.children);
    if (el.shadowRoot) kids.push(...Array.from(el.shadowRoot.children).map((k) => [k, true]));
    for (const entry of kids) {
      const [child, shadow] = Array.isArray(entry) ? entry : [entry, false];
      visit(child, index, { shadow: flags.shadow || shadow, iframe: flags.iframe }, offset);
    }
    if (el.tagName === 'IFRAME') {
      try {
        const doc = el.contentDocument;
        if (doc && doc.body) visit(doc.body, index, { shadow: flags.shadow, iframe: true },
          { x: offset.x + r.x, y: offset.y + r.y });
      } catch (e) { /* cross-origin */ }
    }
  };
  visit(document.body, null, { shadow: false, iframe: false }, { x: 0, y: 0 });
  return {
    url: window.location.href, title: document.title,
    viewport: { width: window.innerWidth, height: window.innerHeight }, nodes
  };
})()"#;

/// Axis-aligned box in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Rect {
    /// Create a rect
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Bottom edge
    #[must_use]
    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Right edge
    #[must_use]
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Center point
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Distance between centers
    #[must_use]
    pub fn center_distance(&self, other: &Self) -> f64 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Area in square pixels
    #[must_use]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Subset of computed style the engine uses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputedStyle {
    /// CSS display
    pub display: String,
    /// CSS visibility
    pub visibility: String,
    /// CSS opacity
    pub opacity: f64,
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
    /// CSS position
    pub position: Option<String>,
    /// z-index
    pub z_index: Option<i32>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: "block".to_string(),
            visibility: "visible".to_string(),
            opacity: 1.0,
            color: None,
            background_color: None,
            font_size: None,
            font_weight: None,
            cursor: None,
            position: None,
            z_index: None,
        }
    }
}

/// One element of the snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomNode {
    /// Position in the arena
    pub index: NodeId,
    /// Parent element
    pub parent: Option<NodeId>,
    /// Child elements in document order
    #[serde(default)]
    pub children: Vec<NodeId>,
    /// Lower-case tag name
    pub tag: String,
    /// Attributes (plus the live `value` of form controls)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Text from this element's own text nodes
    #[serde(default)]
    pub text: String,
    /// Rendered text of the subtree
    #[serde(default)]
    pub inner_text: String,
    /// Rendered and not hidden
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Layout box in page coordinates
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Computed style
    #[serde(default)]
    pub style: ComputedStyle,
    /// Inside an open shadow root
    #[serde(default)]
    pub in_shadow_root: bool,
    /// Inside a same-origin iframe
    #[serde(default)]
    pub in_iframe: bool,
}

fn default_true() -> bool {
    true
}

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

const TEST_ID_ATTRIBUTES: &[&str] = &["data-testid", "data-test-id", "data-test", "data-cy", "data-qa"];

const INTERACTIVE_TAGS: &[&str] = &["button", "input", "select", "textarea", "summary", "option"];

const INTERACTIVE_ROLES: &[&str] = &[
    "button", "link", "checkbox", "radio", "textbox", "searchbox", "combobox", "listbox",
    "option", "menuitem", "menuitemcheckbox", "menuitemradio", "tab", "switch", "slider",
    "spinbutton", "treeitem",
];

impl DomNode {
    /// Create a bare node (used by the builder)
    #[must_use]
    pub fn new(index: NodeId, parent: Option<NodeId>, tag: impl Into<String>) -> Self {
        Self {
            index,
            parent,
            children: Vec::new(),
            tag: tag.into().to_lowercase(),
            attributes: BTreeMap::new(),
            text: String::new(),
            inner_text: String::new(),
            visible: true,
            rect: None,
            style: ComputedStyle::default(),
            in_shadow_root: false,
            in_iframe: false,
        }
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Non-empty attribute value
    #[must_use]
    pub fn non_empty_attr(&self, name: &str) -> Option<&str> {
        self.attr(name).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Whether the attribute is present
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// Element id
    #[must_use]
    pub fn element_id(&self) -> Option<&str> {
        self.non_empty_attr("id")
    }

    /// Class list
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    /// Whether the class list contains `class`
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// `name` attribute
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.non_empty_attr("name")
    }

    /// `placeholder` attribute
    #[must_use]
    pub fn placeholder(&self) -> Option<&str> {
        self.non_empty_attr("placeholder")
    }

    /// `aria-label` attribute
    #[must_use]
    pub fn aria_label(&self) -> Option<&str> {
        self.non_empty_attr("aria-label")
    }

    /// First test-id style attribute, with the attribute name
    #[must_use]
    pub fn test_id(&self) -> Option<(&'static str, &str)> {
        TEST_ID_ATTRIBUTES
            .iter()
            .find_map(|attr| self.non_empty_attr(attr).map(|v| (*attr, v)))
    }

    /// Effective input type (`text` when missing), `None` for non-inputs
    #[must_use]
    pub fn input_type(&self) -> Option<String> {
        (self.tag == "input").then(|| {
            self.non_empty_attr("type")
                .map_or_else(|| "text".to_string(), str::to_lowercase)
        })
    }

    /// Heading level for `h1`–`h6` and `role=heading`
    #[must_use]
    pub fn heading_level(&self) -> Option<u8> {
        if let Some(pos) = HEADING_TAGS.iter().position(|t| *t == self.tag) {
            return Some(pos as u8 + 1);
        }
        (self.attr("role") == Some("heading")).then(|| {
            self.attr("aria-level")
                .and_then(|l| l.parse().ok())
                .unwrap_or(2)
        })
    }

    /// Explicit `role`, else the implicit ARIA role of the tag
    #[must_use]
    pub fn role(&self) -> Option<String> {
        if let Some(role) = self.non_empty_attr("role") {
            return role.split_whitespace().next().map(str::to_string);
        }
        let implicit = match self.tag.as_str() {
            "button" | "summary" => "button",
            "a" | "area" if self.has_attr("href") => "link",
            "input" => match self.input_type().as_deref() {
                Some("button" | "submit" | "reset" | "image") => "button",
                Some("checkbox") => "checkbox",
                Some("radio") => "radio",
                Some("range") => "slider",
                Some("number") => "spinbutton",
                Some("search") => "searchbox",
                Some("hidden") => return None,
                _ => "textbox",
            },
            "select" if self.has_attr("multiple") => "listbox",
            "select" => "combobox",
            "textarea" => "textbox",
            "option" => "option",
            "nav" => "navigation",
            "main" => "main",
            "header" => "banner",
            "footer" => "contentinfo",
            "aside" => "complementary",
            "form" => "form",
            "table" => "table",
            "ul" | "ol" => "list",
            "li" => "listitem",
            "dialog" => "dialog",
            "img" => "img",
            "progress" => "progressbar",
            "section" if self.has_attr("aria-label") || self.has_attr("aria-labelledby") => {
                "region"
            }
            tag if HEADING_TAGS.contains(&tag) => "heading",
            _ => return None,
        };
        Some(implicit.to_string())
    }

    /// Hidden inputs and CSRF/framework bookkeeping fields
    #[must_use]
    pub fn is_system_field(&self) -> bool {
        if self.input_type().as_deref() == Some("hidden") {
            return true;
        }
        self.name().is_some_and(|name| {
            let name = name.to_lowercase();
            name.contains("_token") || name.contains("csrf") || name.contains("__")
        })
    }

    /// Something a user can act on
    #[must_use]
    pub fn is_interactive(&self) -> bool {
        if self.tag == "a" && self.has_attr("href") {
            return true;
        }
        if INTERACTIVE_TAGS.contains(&self.tag.as_str()) {
            return !self.has_attr("disabled") || self.tag == "option";
        }
        if self
            .role()
            .is_some_and(|r| INTERACTIVE_ROLES.contains(&r.as_str()))
        {
            return true;
        }
        if self.has_attr("onclick") || self.attr("contenteditable") == Some("true") {
            return true;
        }
        self.attr("tabindex")
            .and_then(|t| t.parse::<i32>().ok())
            .is_some_and(|t| t >= 0)
    }

    /// Visible and interactive and not a system field
    #[must_use]
    pub fn is_interactable(&self) -> bool {
        self.visible && self.is_interactive() && !self.is_system_field()
    }

    /// Trimmed rendered text
    #[must_use]
    pub fn trimmed_text(&self) -> &str {
        self.inner_text.trim()
    }
}

/// Viewport size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS px
    pub width: f64,
    /// Height in CSS px
    pub height: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 720.0,
        }
    }
}

/// Flattened DOM of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomSnapshot {
    /// Page URL
    pub url: String,
    /// Page title
    #[serde(default)]
    pub title: String,
    /// Viewport size
    #[serde(default)]
    pub viewport: Viewport,
    /// Element arena; index 0 is the root
    pub nodes: Vec<DomNode>,
}

impl DomSnapshot {
    /// Parse from the JSON returned by [`DOM_SNAPSHOT_SCRIPT`]
    pub fn from_json(value: serde_json::Value) -> HealResult<Self> {
        let snapshot: Self = serde_json::from_value(value)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check arena links are consistent
    pub fn validate(&self) -> HealResult<()> {
        for (i, node) in self.nodes.iter().enumerate() {
            if node.index != i {
                return Err(HealError::Snapshot {
                    message: format!("node at position {i} has index {}", node.index),
                });
            }
            if let Some(parent) = node.parent {
                let linked = self
                    .nodes
                    .get(parent)
                    .is_some_and(|p| p.children.contains(&i));
                if !linked || parent >= i {
                    return Err(HealError::Snapshot {
                        message: format!("node {i} has inconsistent parent {parent}"),
                    });
                }
            } else if i != 0 {
                return Err(HealError::Snapshot {
                    message: format!("node {i} has no parent"),
                });
            }
            if node.children.iter().any(|c| *c >= self.nodes.len()) {
                return Err(HealError::Snapshot {
                    message: format!("node {i} references a missing child"),
                });
            }
        }
        Ok(())
    }

    /// Node by index
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&DomNode> {
        self.nodes.get(id)
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot has no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in document order
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.nodes.iter()
    }

    /// Parent chain, nearest first
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &DomNode> {
        let mut next = self.node(id).and_then(|n| n.parent);
        std::iter::from_fn(move || {
            let current = self.node(next?)?;
            next = current.parent;
            Some(current)
        })
    }

    /// Subtree in document order, excluding `id` itself
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .node(id)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.node(current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Distance from the root
    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Siblings in document order, excluding `id`
    #[must_use]
    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id)
            .and_then(|n| n.parent)
            .and_then(|p| self.node(p))
            .map(|p| p.children.iter().copied().filter(|c| *c != id).collect())
            .unwrap_or_default()
    }

    /// First element with the given `id` attribute
    #[must_use]
    pub fn find_by_element_id(&self, element_id: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|n| n.element_id() == Some(element_id))
            .map(|n| n.index)
    }

    /// Nearest ancestor satisfying `pred`
    pub fn closest<F>(&self, id: NodeId, pred: F) -> Option<&DomNode>
    where
        F: Fn(&DomNode) -> bool,
    {
        self.ancestors(id).find(|n| pred(n))
    }
}

/// Programmatic snapshot construction for fixtures and tests.
///
/// ```
/// use sanar::dom::SnapshotBuilder;
///
/// let mut b = SnapshotBuilder::new("https://app.test/login");
/// let form = b.child(0, "form").attr("id", "login").finish();
/// b.child(form, "input").attr("type", "password").finish();
/// let snapshot = b.build();
/// assert_eq!(snapshot.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    snapshot: DomSnapshot,
    explicit_inner_text: Vec<bool>,
}

impl SnapshotBuilder {
    /// Start a snapshot with a `body` root at index 0
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            snapshot: DomSnapshot {
                url: url.into(),
                title: String::new(),
                viewport: Viewport::default(),
                nodes: vec![DomNode::new(0, None, "body")],
            },
            explicit_inner_text: vec![false],
        }
    }

    /// Set the page title
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.snapshot.title = title.into();
        self
    }

    /// Root index
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Append a child element and start configuring it
    pub fn child(&mut self, parent: NodeId, tag: &str) -> NodeBuilder<'_> {
        let index = self.snapshot.nodes.len();
        self.snapshot
            .nodes
            .push(DomNode::new(index, Some(parent), tag));
        self.explicit_inner_text.push(false);
        if let Some(p) = self.snapshot.nodes.get_mut(parent) {
            p.children.push(index);
        }
        NodeBuilder {
            builder: self,
            index,
        }
    }

    /// Modify an existing node
    pub fn node(&mut self, index: NodeId) -> NodeBuilder<'_> {
        NodeBuilder {
            builder: self,
            index,
        }
    }

    /// Finish: inherit hidden state downwards and fill in rendered text
    #[must_use]
    pub fn build(mut self) -> DomSnapshot {
        let nodes = &mut self.snapshot.nodes;
        for i in 0..nodes.len() {
            if let Some(parent) = nodes[i].parent {
                if !nodes[parent].visible {
                    nodes[i].visible = false;
                }
                if nodes[parent].in_shadow_root {
                    nodes[i].in_shadow_root = true;
                }
                if nodes[parent].in_iframe {
                    nodes[i].in_iframe = true;
                }
            }
        }
        for i in (0..nodes.len()).rev() {
            if self.explicit_inner_text[i] {
                continue;
            }
            let mut parts: Vec<String> = Vec::new();
            if !nodes[i].text.trim().is_empty() {
                parts.push(nodes[i].text.trim().to_string());
            }
            for child in nodes[i].children.clone() {
                let child_node = &nodes[child];
                if child_node.visible && !child_node.inner_text.is_empty() {
                    parts.push(child_node.inner_text.clone());
                }
            }
            nodes[i].inner_text = parts.join(" ");
        }
        self.snapshot
    }
}

/// Configures one node of a [`SnapshotBuilder`]
#[derive(Debug)]
pub struct NodeBuilder<'a> {
    builder: &'a mut SnapshotBuilder,
    index: NodeId,
}

impl NodeBuilder<'_> {
    fn node_mut(&mut self) -> &mut DomNode {
        &mut self.builder.snapshot.nodes[self.index]
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.node_mut()
            .attributes
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Set own text
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        self.node_mut().text = text.to_string();
        self
    }

    /// Set rendered subtree text explicitly
    #[must_use]
    pub fn inner_text(mut self, text: &str) -> Self {
        self.node_mut().inner_text = text.to_string();
        self.builder.explicit_inner_text[self.index] = true;
        self
    }

    /// Set the layout box
    #[must_use]
    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.node_mut().rect = Some(Rect::new(x, y, width, height));
        self
    }

    /// Mark as not rendered
    #[must_use]
    pub fn hidden(mut self) -> Self {
        let node = self.node_mut();
        node.visible = false;
        node.style.display = "none".to_string();
        self
    }

    /// Set text and background colors
    #[must_use]
    pub fn colors(mut self, color: &str, background: &str) -> Self {
        let style = &mut self.node_mut().style;
        style.color = Some(color.to_string());
        style.background_color = Some(background.to_string());
        self
    }

    /// Mark as living in a shadow root
    #[must_use]
    pub fn shadow(mut self) -> Self {
        self.node_mut().in_shadow_root = true;
        self
    }

    /// Mark as living in an iframe
    #[must_use]
    pub fn iframe(mut self) -> Self {
        self.node_mut().in_iframe = true;
        self
    }

    /// Finish configuring and return the node index
    #[must_use]
    pub fn finish(self) -> NodeId {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn login_page() -> DomSnapshot {
        let mut b = SnapshotBuilder::new("https://app.test/login").title("Login");
        let form = b.child(0, "form").attr("id", "login").finish();
        let label = b.child(form, "label").attr("for", "user").text("Username").finish();
        let _ = label;
        b.child(form, "input")
            .attr("id", "user")
            .attr("name", "username")
            .finish();
        b.child(form, "input")
            .attr("type", "hidden")
            .attr("name", "_token")
            .finish();
        b.child(form, "button").text("Sign in").finish();
        b.build()
    }

    mod node_tests {
        use super::*;

        #[test]
        fn test_implicit_roles() {
            let snapshot = login_page();
            let roles: Vec<Option<String>> = snapshot.iter().map(DomNode::role).collect();
            assert_eq!(roles[1].as_deref(), Some("form"));
            assert_eq!(roles[3].as_deref(), Some("textbox"));
            assert_eq!(roles[4], None);
            assert_eq!(roles[5].as_deref(), Some("button"));
        }

        #[test]
        fn test_system_field_detection() {
            let snapshot = login_page();
            assert!(snapshot.nodes[4].is_system_field());
            assert!(!snapshot.nodes[3].is_system_field());
        }

        #[test]
        fn test_interactable() {
            let snapshot = login_page();
            assert!(snapshot.nodes[3].is_interactable());
            assert!(!snapshot.nodes[4].is_interactable());
            assert!(snapshot.nodes[5].is_interactable());
            assert!(!snapshot.nodes[2].is_interactable());
        }

        #[test]
        fn test_test_id_priority() {
            let mut b = SnapshotBuilder::new("https://x.test");
            b.child(0, "div")
                .attr("data-cy", "cy-id")
                .attr("data-testid", "tid")
                .finish();
            let snapshot = b.build();
            assert_eq!(snapshot.nodes[1].test_id(), Some(("data-testid", "tid")));
        }

        #[test]
        fn test_heading_level() {
            let mut b = SnapshotBuilder::new("https://x.test");
            b.child(0, "h3").text("Orders").finish();
            b.child(0, "div").attr("role", "heading").attr("aria-level", "4").finish();
            let snapshot = b.build();
            assert_eq!(snapshot.nodes[1].heading_level(), Some(3));
            assert_eq!(snapshot.nodes[2].heading_level(), Some(4));
        }
    }

    mod snapshot_tests {
        use super::*;

        #[test]
        fn test_builder_inner_text() {
            let snapshot = login_page();
            assert_eq!(snapshot.nodes[1].inner_text, "Username Sign in");
            assert_eq!(snapshot.nodes[5].trimmed_text(), "Sign in");
        }

        #[test]
        fn test_hidden_inherited() {
            let mut b = SnapshotBuilder::new("https://x.test");
            let panel = b.child(0, "div").hidden().finish();
            b.child(panel, "button").text("Hidden").finish();
            let snapshot = b.build();
            assert!(!snapshot.nodes[2].visible);
            assert_eq!(snapshot.nodes[0].inner_text, "");
        }

        #[test]
        fn test_traversal() {
            let snapshot = login_page();
            assert_eq!(snapshot.descendants(0), vec![1, 2, 3, 4, 5]);
            assert_eq!(snapshot.depth(3), 2);
            assert_eq!(snapshot.siblings(3), vec![2, 4, 5]);
            let ancestors: Vec<NodeId> = snapshot.ancestors(3).map(|n| n.index).collect();
            assert_eq!(ancestors, vec![1, 0]);
            assert_eq!(snapshot.find_by_element_id("user"), Some(3));
        }

        #[test]
        fn test_json_round_trip_validates() {
            let snapshot = login_page();
            let value = serde_json::to_value(&snapshot).unwrap();
            let parsed = DomSnapshot::from_json(value).unwrap();
            assert_eq!(parsed, snapshot);
        }

        #[test]
        fn test_validate_rejects_broken_links() {
            let mut snapshot = login_page();
            snapshot.nodes[3].parent = Some(5);
            assert!(snapshot.validate().is_err());
        }

        #[test]
        fn test_script_returns_expected_shape() {
            assert!(DOM_SNAPSHOT_SCRIPT.contains("inner_text"));
            assert!(DOM_SNAPSHOT_SCRIPT.contains("in_shadow_root"));
        }
    }
}
