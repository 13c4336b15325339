//! Page-wide structural analysis.
//!
//! [`analyze_snapshot`] is a pure function over a [`DomSnapshot`];
//! [`DomIntelligence`] wraps it with a per-URL cache.

use crate::clock::Clock;
use crate::context::WorkerContext;
use crate::dom::{DomNode, DomSnapshot, NodeId};
use crate::page::PageHandle;
use crate::result::{HealError, HealResult};
use crate::ttl_cache::TtlCache;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Deepest hierarchy level kept in [`DomAnalysis::hierarchy`]
pub const MAX_HIERARCHY_DEPTH: usize = 5;

/// Condensed element tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    /// Tag name
    pub tag: String,
    /// Element id
    pub id: Option<String>,
    /// ARIA role
    pub role: Option<String>,
    /// Class list
    pub classes: Vec<String>,
    /// Children within the depth limit
    pub children: Vec<HierarchyNode>,
    /// Children exist below the depth limit
    pub truncated: bool,
}

/// Where a field's label came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelSource {
    /// `<label for=…>`
    For,
    /// `<label>` wrapping the control
    Wrapping,
    /// `aria-labelledby`
    AriaLabelledby,
    /// `aria-label`
    AriaLabel,
    /// `placeholder`
    Placeholder,
}

/// Form control with its label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    /// Snapshot index
    pub node: NodeId,
    /// Tag name
    pub tag: String,
    /// Input type
    pub input_type: Option<String>,
    /// `name`
    pub name: Option<String>,
    /// Element id
    pub id: Option<String>,
    /// Label text
    pub label: Option<String>,
    /// Label origin
    pub label_source: Option<LabelSource>,
    /// `required` present
    pub required: bool,
}

/// One `<form>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInfo {
    /// Snapshot index
    pub node: NodeId,
    /// Element id
    pub id: Option<String>,
    /// `name`
    pub name: Option<String>,
    /// `action`
    pub action: Option<String>,
    /// `method`, lower-case, default `get`
    pub method: String,
    /// User-facing fields (system fields excluded)
    pub fields: Vec<FormField>,
    /// Submit button texts
    pub submit_buttons: Vec<String>,
}

/// One `<table>` or `role=grid|table`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Snapshot index
    pub node: NodeId,
    /// Element id
    pub id: Option<String>,
    /// Caption text
    pub caption: Option<String>,
    /// Header cell texts
    pub headers: Vec<String>,
    /// Body rows (rows without header cells)
    pub row_count: usize,
    /// Widest row
    pub column_count: usize,
}

/// Link inside a navigation landmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavLink {
    /// Link text
    pub text: String,
    /// `href`
    pub href: Option<String>,
    /// Marked or detected as the current page
    pub active: bool,
}

/// One navigation landmark
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationInfo {
    /// Snapshot index
    pub node: NodeId,
    /// `aria-label`
    pub label: Option<String>,
    /// Links in document order
    pub links: Vec<NavLink>,
    /// Text of the active link
    pub active_link: Option<String>,
}

/// Page counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageMetrics {
    /// All elements
    pub total_elements: usize,
    /// Rendered elements
    pub visible_elements: usize,
    /// Visible, interactive, not system fields
    pub interactable_elements: usize,
    /// Forms
    pub forms: usize,
    /// Tables
    pub tables: usize,
    /// Links with `href`
    pub links: usize,
    /// Buttons of any kind
    pub buttons: usize,
    /// User-facing inputs, selects and textareas
    pub inputs: usize,
    /// Images
    pub images: usize,
    /// Deepest element
    pub max_depth: usize,
    /// Mean element depth
    pub avg_depth: f64,
}

/// Landmark, section or heading entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticRegion {
    /// Snapshot index
    pub node: NodeId,
    /// Role for landmarks, tag for sections, `h1`…`h6` for headings
    pub kind: String,
    /// Accessible label or heading text
    pub label: Option<String>,
    /// Heading level
    pub level: Option<u8>,
}

/// Semantic outline of the page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticMap {
    /// ARIA landmarks (explicit or implicit)
    pub landmarks: Vec<SemanticRegion>,
    /// HTML5 sectioning elements
    pub sections: Vec<SemanticRegion>,
    /// Headings in document order
    pub headings: Vec<SemanticRegion>,
}

/// Result of analyzing one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomAnalysis {
    /// Page URL
    pub url: String,
    /// Element tree to depth 5
    pub hierarchy: HierarchyNode,
    /// Forms
    pub forms: Vec<FormInfo>,
    /// Tables
    pub tables: Vec<TableInfo>,
    /// Navigation landmarks
    pub navigation: Vec<NavigationInfo>,
    /// Counters
    pub metrics: PageMetrics,
    /// Landmarks, sections, headings
    pub semantic_map: SemanticMap,
    /// Analysis time
    pub timestamp: DateTime<Utc>,
}

/// Per-URL cached page analysis
#[derive(Debug)]
pub struct DomIntelligence {
    cache: TtlCache<String, Arc<DomAnalysis>>,
    clock: Arc<dyn Clock>,
    snapshot_timeout: Duration,
}

impl DomIntelligence {
    /// Create with the worker's cache TTL and snapshot timeout
    #[must_use]
    pub fn new(ctx: &WorkerContext) -> Self {
        Self {
            cache: TtlCache::new(ctx.config().cache_ttl(), ctx.clock()),
            clock: ctx.clock(),
            snapshot_timeout: ctx.config().snapshot_timeout(),
        }
    }

    /// Analyze the page, reusing a fresh cached result for its URL
    pub async fn analyze(&mut self, page: &dyn PageHandle) -> HealResult<Arc<DomAnalysis>> {
        let url = page.url().await?;
        if let Some(hit) = self.cache.get(&url) {
            debug!(url = %url, "dom analysis cache hit");
            return Ok(hit);
        }
        let ms = u64::try_from(self.snapshot_timeout.as_millis()).unwrap_or(u64::MAX);
        let snapshot = tokio::time::timeout(self.snapshot_timeout, page.snapshot())
            .await
            .map_err(|_| HealError::Timeout { ms })??;
        Ok(self.analyze_with(&snapshot))
    }

    /// Analyze an already captured snapshot, reusing the cache for its URL
    pub fn analyze_with(&mut self, snapshot: &DomSnapshot) -> Arc<DomAnalysis> {
        if let Some(hit) = self.cache.get(&snapshot.url) {
            return hit;
        }
        let analysis = Arc::new(analyze_snapshot(snapshot, self.clock.now()));
        if analysis.metrics.interactable_elements > 0 {
            self.cache.insert(snapshot.url.clone(), analysis.clone());
        } else {
            debug!(url = %snapshot.url, "page has no interactable elements, not caching");
        }
        analysis
    }

    /// Drop the cached analysis of `url`
    pub fn invalidate(&mut self, url: &str) -> bool {
        self.cache.remove(&url.to_string()).is_some()
    }

    /// Drop all cached analyses
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Cached entries
    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Analyze a snapshot without caching
#[must_use]
pub fn analyze_snapshot(snapshot: &DomSnapshot, timestamp: DateTime<Utc>) -> DomAnalysis {
    DomAnalysis {
        url: snapshot.url.clone(),
        hierarchy: hierarchy(snapshot, 0, 0),
        forms: forms(snapshot),
        tables: tables(snapshot),
        navigation: navigation(snapshot),
        metrics: metrics(snapshot),
        semantic_map: semantic_map(snapshot),
        timestamp,
    }
}

fn hierarchy(snapshot: &DomSnapshot, id: NodeId, depth: usize) -> HierarchyNode {
    let Some(node) = snapshot.node(id) else {
        return HierarchyNode {
            tag: String::new(),
            id: None,
            role: None,
            classes: Vec::new(),
            children: Vec::new(),
            truncated: false,
        };
    };
    let expand = depth < MAX_HIERARCHY_DEPTH;
    HierarchyNode {
        tag: node.tag.clone(),
        id: node.element_id().map(str::to_string),
        role: node.role(),
        classes: node.classes().map(str::to_string).collect(),
        children: if expand {
            node.children
                .iter()
                .map(|c| hierarchy(snapshot, *c, depth + 1))
                .collect()
        } else {
            Vec::new()
        },
        truncated: !expand && !node.children.is_empty(),
    }
}

fn text_of(node: &DomNode) -> Option<String> {
    let text = node.inner_text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

/// Label from `for`, a wrapping `<label>` or `aria-labelledby`
#[must_use]
pub fn associated_label(snapshot: &DomSnapshot, node: &DomNode) -> Option<(String, LabelSource)> {
    if let Some(id) = node.element_id() {
        let by_for = snapshot
            .iter()
            .find(|n| n.tag == "label" && n.attr("for") == Some(id))
            .and_then(text_of);
        if let Some(text) = by_for {
            return Some((text, LabelSource::For));
        }
    }
    if let Some(text) = snapshot
        .closest(node.index, |a| a.tag == "label")
        .and_then(text_of)
    {
        return Some((text, LabelSource::Wrapping));
    }
    let labelled_by = node.non_empty_attr("aria-labelledby").map(|ids| {
        ids.split_whitespace()
            .filter_map(|id| snapshot.find_by_element_id(id))
            .filter_map(|i| snapshot.node(i).and_then(text_of))
            .collect::<Vec<_>>()
            .join(" ")
    });
    labelled_by
        .filter(|t| !t.is_empty())
        .map(|t| (t, LabelSource::AriaLabelledby))
}

/// [`associated_label`] with `aria-label` and `placeholder` fallbacks
#[must_use]
pub fn field_label(snapshot: &DomSnapshot, node: &DomNode) -> Option<(String, LabelSource)> {
    associated_label(snapshot, node)
        .or_else(|| {
            node.aria_label()
                .map(|l| (l.to_string(), LabelSource::AriaLabel))
        })
        .or_else(|| {
            node.placeholder()
                .map(|p| (p.to_string(), LabelSource::Placeholder))
        })
}

fn is_field(node: &DomNode) -> bool {
    match node.tag.as_str() {
        "select" | "textarea" => true,
        "input" => !matches!(
            node.input_type().as_deref(),
            Some("submit" | "button" | "reset" | "image")
        ),
        _ => false,
    }
}

fn is_button(node: &DomNode) -> bool {
    node.tag == "button"
        || matches!(
            node.input_type().as_deref(),
            Some("submit" | "button" | "reset" | "image")
        )
        || node.attr("role") == Some("button")
}

fn is_submit(node: &DomNode) -> bool {
    match node.tag.as_str() {
        "button" => node.attr("type").map_or(true, |t| t.eq_ignore_ascii_case("submit")),
        "input" => matches!(node.input_type().as_deref(), Some("submit" | "image")),
        _ => false,
    }
}

fn forms(snapshot: &DomSnapshot) -> Vec<FormInfo> {
    snapshot
        .iter()
        .filter(|n| n.tag == "form")
        .map(|form| {
            let inside: Vec<&DomNode> = snapshot
                .descendants(form.index)
                .into_iter()
                .filter_map(|i| snapshot.node(i))
                .collect();
            let fields = inside
                .iter()
                .filter(|n| is_field(n) && !n.is_system_field())
                .map(|n| {
                    let label = field_label(snapshot, n);
                    FormField {
                        node: n.index,
                        tag: n.tag.clone(),
                        input_type: n.input_type(),
                        name: n.name().map(str::to_string),
                        id: n.element_id().map(str::to_string),
                        label_source: label.as_ref().map(|(_, s)| *s),
                        label: label.map(|(t, _)| t),
                        required: n.has_attr("required"),
                    }
                })
                .collect();
            let submit_buttons = inside
                .iter()
                .filter(|n| is_submit(n))
                .map(|n| {
                    text_of(n)
                        .or_else(|| n.non_empty_attr("value").map(str::to_string))
                        .unwrap_or_else(|| "submit".to_string())
                })
                .collect();
            FormInfo {
                node: form.index,
                id: form.element_id().map(str::to_string),
                name: form.name().map(str::to_string),
                action: form.non_empty_attr("action").map(str::to_string),
                method: form
                    .non_empty_attr("method")
                    .map_or_else(|| "get".to_string(), str::to_lowercase),
                fields,
                submit_buttons,
            }
        })
        .collect()
}

fn is_table(node: &DomNode) -> bool {
    node.tag == "table" || matches!(node.attr("role"), Some("grid" | "table" | "treegrid"))
}

fn is_row(node: &DomNode) -> bool {
    node.tag == "tr" || node.attr("role") == Some("row")
}

fn is_header_cell(node: &DomNode) -> bool {
    node.tag == "th" || matches!(node.attr("role"), Some("columnheader"))
}

fn is_cell(node: &DomNode) -> bool {
    node.tag == "td" || is_header_cell(node) || matches!(node.attr("role"), Some("cell" | "gridcell"))
}

/// Rows of a table in document order, skipping rows of nested tables
#[must_use]
pub fn table_rows(snapshot: &DomSnapshot, table: NodeId) -> Vec<NodeId> {
    snapshot
        .descendants(table)
        .into_iter()
        .filter(|i| {
            snapshot.node(*i).is_some_and(|n| {
                is_row(n)
                    && snapshot
                        .closest(n.index, is_table)
                        .is_some_and(|t| t.index == table)
            })
        })
        .collect()
}

/// Cells directly in a row
#[must_use]
pub fn row_cells(snapshot: &DomSnapshot, row: NodeId) -> Vec<&DomNode> {
    snapshot
        .node(row)
        .map(|r| {
            r.children
                .iter()
                .filter_map(|c| snapshot.node(*c))
                .filter(|c| is_cell(c))
                .collect()
        })
        .unwrap_or_default()
}

/// Header texts of a table
#[must_use]
pub fn table_headers(snapshot: &DomSnapshot, table: NodeId) -> Vec<String> {
    table_rows(snapshot, table)
        .into_iter()
        .map(|r| row_cells(snapshot, r))
        .find(|cells| !cells.is_empty() && cells.iter().all(|c| is_header_cell(c)))
        .map(|cells| {
            cells
                .iter()
                .map(|c| text_of(c).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

fn tables(snapshot: &DomSnapshot) -> Vec<TableInfo> {
    snapshot
        .iter()
        .filter(|n| is_table(n))
        .map(|table| {
            let rows = table_rows(snapshot, table.index);
            let body_rows = rows
                .iter()
                .filter(|r| {
                    !row_cells(snapshot, **r)
                        .iter()
                        .all(|c| is_header_cell(c))
                })
                .count();
            let column_count = rows
                .iter()
                .map(|r| row_cells(snapshot, *r).len())
                .max()
                .unwrap_or(0);
            let caption = table
                .children
                .iter()
                .filter_map(|c| snapshot.node(*c))
                .find(|c| c.tag == "caption")
                .and_then(text_of);
            TableInfo {
                node: table.index,
                id: table.element_id().map(str::to_string),
                caption,
                headers: table_headers(snapshot, table.index),
                row_count: body_rows,
                column_count,
            }
        })
        .collect()
}

/// Path component of a URL
#[must_use]
pub fn url_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = without_scheme
        .find('/')
        .map_or("/", |i| &without_scheme[i..]);
    path.split(['?', '#']).next().unwrap_or("/")
}

fn is_active_link(link: &DomNode, page_path: &str) -> bool {
    if link
        .attr("aria-current")
        .is_some_and(|v| !v.eq_ignore_ascii_case("false"))
    {
        return true;
    }
    if link.classes().any(|c| {
        let c = c.to_lowercase();
        c == "active" || c == "current" || c == "selected" || c.ends_with("-active")
    }) {
        return true;
    }
    link.attr("href").is_some_and(|href| {
        let href_path = if href.contains("://") {
            url_path(href)
        } else {
            href.split(['?', '#']).next().unwrap_or(href)
        };
        !href_path.is_empty() && href_path == page_path
    })
}

fn navigation(snapshot: &DomSnapshot) -> Vec<NavigationInfo> {
    let page_path = url_path(&snapshot.url);
    snapshot
        .iter()
        .filter(|n| n.role().as_deref() == Some("navigation"))
        .map(|nav| {
            let links: Vec<NavLink> = snapshot
                .descendants(nav.index)
                .into_iter()
                .filter_map(|i| snapshot.node(i))
                .filter(|n| n.tag == "a" || n.attr("role") == Some("link"))
                .map(|a| NavLink {
                    text: text_of(a).unwrap_or_default(),
                    href: a.attr("href").map(str::to_string),
                    active: is_active_link(a, page_path),
                })
                .collect();
            let active_link = links.iter().find(|l| l.active).map(|l| l.text.clone());
            NavigationInfo {
                node: nav.index,
                label: nav.aria_label().map(str::to_string),
                links,
                active_link,
            }
        })
        .collect()
}

fn metrics(snapshot: &DomSnapshot) -> PageMetrics {
    let mut m = PageMetrics {
        total_elements: snapshot.len(),
        ..PageMetrics::default()
    };
    let mut depth_sum = 0usize;
    for node in snapshot.iter() {
        let depth = snapshot.depth(node.index);
        depth_sum += depth;
        m.max_depth = m.max_depth.max(depth);
        if node.visible {
            m.visible_elements += 1;
        }
        if node.is_interactable() {
            m.interactable_elements += 1;
        }
        match node.tag.as_str() {
            "form" => m.forms += 1,
            "img" => m.images += 1,
            "a" if node.has_attr("href") => m.links += 1,
            _ => {}
        }
        if is_table(node) {
            m.tables += 1;
        }
        if is_button(node) {
            m.buttons += 1;
        } else if is_field(node) && !node.is_system_field() {
            m.inputs += 1;
        }
    }
    if !snapshot.is_empty() {
        m.avg_depth = depth_sum as f64 / snapshot.len() as f64;
    }
    m
}

const LANDMARKS: &[&str] = &[
    "banner", "navigation", "main", "complementary", "contentinfo", "region", "search", "form",
];
const SECTIONING: &[&str] = &["article", "section", "aside", "nav", "header", "footer", "main"];

fn semantic_map(snapshot: &DomSnapshot) -> SemanticMap {
    let mut map = SemanticMap::default();
    for node in snapshot.iter() {
        let label = node.aria_label().map(str::to_string);
        if let Some(role) = node.role().filter(|r| LANDMARKS.contains(&r.as_str())) {
            map.landmarks.push(SemanticRegion {
                node: node.index,
                kind: role,
                label: label.clone(),
                level: None,
            });
        }
        if SECTIONING.contains(&node.tag.as_str()) {
            map.sections.push(SemanticRegion {
                node: node.index,
                kind: node.tag.clone(),
                label,
                level: None,
            });
        }
        if let Some(level) = node.heading_level() {
            map.headings.push(SemanticRegion {
                node: node.index,
                kind: format!("h{level}"),
                label: text_of(node),
                level: Some(level),
            });
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::config::HealingConfig;
    use crate::dom::SnapshotBuilder;
    use crate::page::StaticPage;

    fn dashboard() -> DomSnapshot {
        let mut b = SnapshotBuilder::new("https://app.test/orders?page=2");
        let header = b.child(0, "header").finish();
        let nav = b.child(header, "nav").attr("aria-label", "Primary").finish();
        b.child(nav, "a").attr("href", "/home").text("Home").finish();
        b.child(nav, "a").attr("href", "/orders").text("Orders").finish();
        let main = b.child(0, "main").finish();
        b.child(main, "h1").text("Orders").finish();
        let form = b
            .child(main, "form")
            .attr("id", "filter")
            .attr("method", "POST")
            .finish();
        b.child(form, "label").attr("for", "q").text("Search orders").finish();
        b.child(form, "input").attr("id", "q").attr("name", "q").finish();
        let wrap = b.child(form, "label").text("Status").finish();
        b.child(wrap, "select").attr("name", "status").finish();
        b.child(form, "span").attr("id", "from-label").text("From date").finish();
        b.child(form, "input")
            .attr("type", "date")
            .attr("aria-labelledby", "from-label")
            .finish();
        b.child(form, "input").attr("placeholder", "Customer").finish();
        b.child(form, "input")
            .attr("type", "hidden")
            .attr("name", "csrf_token")
            .finish();
        b.child(form, "button").text("Apply").finish();
        let table = b.child(main, "table").attr("id", "orders").finish();
        let head = b.child(table, "tr").finish();
        b.child(head, "th").text("Order").finish();
        b.child(head, "th").text("Total").finish();
        for (order, total) in [("A-1", "10"), ("A-2", "20")] {
            let row = b.child(table, "tr").finish();
            b.child(row, "td").text(order).finish();
            b.child(row, "td").text(total).finish();
        }
        b.build()
    }

    mod analysis_tests {
        use super::*;

        #[test]
        fn test_forms_and_labels() {
            let analysis = analyze_snapshot(&dashboard(), Utc::now());
            assert_eq!(analysis.forms.len(), 1);
            let form = &analysis.forms[0];
            assert_eq!(form.method, "post");
            assert_eq!(form.submit_buttons, vec!["Apply".to_string()]);
            let labels: Vec<(Option<&str>, Option<LabelSource>)> = form
                .fields
                .iter()
                .map(|f| (f.label.as_deref(), f.label_source))
                .collect();
            assert_eq!(
                labels,
                vec![
                    (Some("Search orders"), Some(LabelSource::For)),
                    (Some("Status"), Some(LabelSource::Wrapping)),
                    (Some("From date"), Some(LabelSource::AriaLabelledby)),
                    (Some("Customer"), Some(LabelSource::Placeholder)),
                ]
            );
        }

        #[test]
        fn test_tables() {
            let analysis = analyze_snapshot(&dashboard(), Utc::now());
            let table = &analysis.tables[0];
            assert_eq!(table.headers, vec!["Order".to_string(), "Total".to_string()]);
            assert_eq!(table.row_count, 2);
            assert_eq!(table.column_count, 2);
        }

        #[test]
        fn test_navigation_active_by_path() {
            let analysis = analyze_snapshot(&dashboard(), Utc::now());
            let nav = &analysis.navigation[0];
            assert_eq!(nav.label.as_deref(), Some("Primary"));
            assert_eq!(nav.links.len(), 2);
            assert_eq!(nav.active_link.as_deref(), Some("Orders"));
        }

        #[test]
        fn test_navigation_active_by_marker() {
            let mut b = SnapshotBuilder::new("https://app.test/");
            let nav = b.child(0, "div").attr("role", "navigation").finish();
            b.child(nav, "a").attr("href", "/a").text("A").finish();
            b.child(nav, "a")
                .attr("href", "/b")
                .attr("aria-current", "page")
                .text("B")
                .finish();
            let analysis = analyze_snapshot(&b.build(), Utc::now());
            assert_eq!(analysis.navigation[0].active_link.as_deref(), Some("B"));
        }

        #[test]
        fn test_metrics_exclude_system_fields() {
            let analysis = analyze_snapshot(&dashboard(), Utc::now());
            let m = &analysis.metrics;
            // links 2, inputs 3 + select, button
            assert_eq!(m.interactable_elements, 7);
            assert_eq!(m.inputs, 4);
            assert_eq!(m.buttons, 1);
            assert_eq!(m.links, 2);
            assert_eq!(m.forms, 1);
            assert_eq!(m.tables, 1);
            assert_eq!(m.max_depth, 4);
        }

        #[test]
        fn test_semantic_map() {
            let analysis = analyze_snapshot(&dashboard(), Utc::now());
            let kinds: Vec<&str> = analysis
                .semantic_map
                .landmarks
                .iter()
                .map(|l| l.kind.as_str())
                .collect();
            assert_eq!(kinds, vec!["banner", "navigation", "main", "form"]);
            assert_eq!(analysis.semantic_map.headings[0].label.as_deref(), Some("Orders"));
            assert_eq!(analysis.semantic_map.sections.len(), 3);
        }

        #[test]
        fn test_hierarchy_depth_limit() {
            let mut b = SnapshotBuilder::new("https://deep.test/");
            let mut parent = 0;
            for _ in 0..8 {
                parent = b.child(parent, "div").finish();
            }
            let analysis = analyze_snapshot(&b.build(), Utc::now());
            let mut level = &analysis.hierarchy;
            let mut depth = 0;
            while let Some(child) = level.children.first() {
                level = child;
                depth += 1;
            }
            assert_eq!(depth, MAX_HIERARCHY_DEPTH);
            assert!(level.truncated);
        }

        #[test]
        fn test_url_path() {
            assert_eq!(url_path("https://a.test/x/y?z=1#f"), "/x/y");
            assert_eq!(url_path("https://a.test"), "/");
            assert_eq!(url_path("/local#top"), "/local");
        }
    }

    mod cache_tests {
        use super::*;

        fn intelligence(clock: Arc<FakeClock>) -> DomIntelligence {
            let ctx = WorkerContext::new("w", HealingConfig::default()).with_clock(clock);
            DomIntelligence::new(&ctx)
        }

        #[tokio::test]
        async fn test_cached_per_url() {
            let clock = Arc::new(FakeClock::at_ms(0));
            let mut intel = intelligence(clock.clone());
            let page = StaticPage::new(dashboard());
            let first = intel.analyze(&page).await.unwrap();
            let second = intel.analyze(&page).await.unwrap();
            assert!(Arc::ptr_eq(&first, &second));
            assert_eq!(page.snapshot_calls(), 1);

            clock.fast_forward(Duration::from_secs(301));
            let third = intel.analyze(&page).await.unwrap();
            assert!(!Arc::ptr_eq(&first, &third));
            assert_eq!(page.snapshot_calls(), 2);
        }

        #[tokio::test]
        async fn test_not_cached_without_interactables() {
            let mut intel = intelligence(Arc::new(FakeClock::at_ms(0)));
            let mut b = SnapshotBuilder::new("https://static.test/");
            b.child(0, "p").text("Nothing to do here").finish();
            let page = StaticPage::new(b.build());
            intel.analyze(&page).await.unwrap();
            assert_eq!(intel.cached(), 0);
        }

        #[tokio::test]
        async fn test_invalidate_and_clear() {
            let mut intel = intelligence(Arc::new(FakeClock::at_ms(0)));
            let snapshot = dashboard();
            intel.analyze_with(&snapshot);
            assert!(intel.invalidate(&snapshot.url));
            assert!(!intel.invalidate(&snapshot.url));
            intel.analyze_with(&snapshot);
            intel.clear();
            assert_eq!(intel.cached(), 0);
        }

        #[tokio::test]
        async fn test_snapshot_failure_is_error() {
            let mut intel = intelligence(Arc::new(FakeClock::at_ms(0)));
            let page = StaticPage::new(dashboard()).with_failing_snapshot();
            assert!(intel.analyze(&page).await.is_err());
        }
    }
}
