//! Candidate discovery and ranking for description-based identification.
//!
//! Discovery reads one snapshot, selects visible elements by intent, resolves
//! a precise handle for each and confirms it on the live page. Ranking scores
//! every candidate against the parsed description using [`RankingWeights`].

use crate::config::RankingWeights;
use crate::dom::{DomNode, DomSnapshot, NodeId};
use crate::dom_intelligence::{associated_label, row_cells, table_headers, table_rows};
use crate::features::{clip, DeepContext, ElementFeatures, FeatureExtractor, TableContext};
use crate::nlp::{Intent, NlpResult};
use crate::page::PageHandle;
use crate::result::HealResult;
use crate::selector::{attr_selector, id_selector, quote, text_is_selector, Selector};
use crate::similarity::text_similarity_ci;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Headings further above than this are not context
pub const HEADING_RANGE_PX: f64 = 300.0;
/// Loading indicators further away than this are ignored
pub const LOADING_RANGE_PX: f64 = 200.0;
/// Longest inner text used as a `:text-is` handle
pub const MAX_HANDLE_TEXT: usize = 80;

const CLICKABLE: &str = "button, a[href], [role=button], [role=link], [role=menuitem], [role=tab], \
    input[type=submit], input[type=button], input[type=reset], input[type=image], summary, [onclick]";
const FILLABLE: &str = "input:not([type=hidden]):not([type=submit]):not([type=button]):not([type=reset])\
    :not([type=image]):not([type=checkbox]):not([type=radio]), textarea, [contenteditable=true], \
    [role=textbox], [role=searchbox]";
const SELECTABLE: &str = "select, input[type=checkbox], input[type=radio], [role=checkbox], \
    [role=radio], [role=option], [role=combobox], [role=listbox], [role=switch]";
const ANY_INTERACTIVE: &str =
    "button, a[href], input, select, textarea, [role=button], [role=link], [tabindex]";

const SEMANTIC_TAGS: &[&str] = &[
    "form", "nav", "main", "header", "footer", "aside", "section", "article", "dialog", "fieldset",
];
const SEMANTIC_ROLES: &[&str] = &[
    "form", "navigation", "main", "banner", "contentinfo", "complementary", "region", "dialog",
    "search", "toolbar", "menu", "tabpanel",
];
const LOADING_HINTS: &[&str] = &["spinner", "loading", "loader", "skeleton"];
const TABULAR_OPERATIONS: &[&str] = &[
    "edit", "delete", "remove", "view", "update", "details", "open", "row", "cell",
];
const TRUSTED_LIBRARIES: &[&str] = &["material-ui", "ant-design"];
const SENSITIVE_KEYWORDS: &[&str] = &["password", "username", "email"];

/// How a candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    /// Intent selector set with deep context
    DeepSearch,
    /// Exact quoted text
    Text,
    /// Expected ARIA role
    Role,
    /// Element type tag
    Tag,
    /// Keyword inside identifying attributes
    KeywordAttribute,
    /// Keyword inside rendered text
    KeywordText,
}

impl DiscoveryMethod {
    /// Fallback methods in the order they run
    pub const LEGACY: [Self; 5] = [
        Self::Text,
        Self::Role,
        Self::Tag,
        Self::KeywordAttribute,
        Self::KeywordText,
    ];
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeepSearch => "deep-search",
            Self::Text => "text",
            Self::Role => "role",
            Self::Tag => "tag",
            Self::KeywordAttribute => "keyword-attribute",
            Self::KeywordText => "keyword-text",
        };
        f.write_str(name)
    }
}

/// Element that could be the described one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Node in the discovery snapshot
    pub node: NodeId,
    /// Confirmed locator
    pub locator: String,
    /// Discovery method
    pub method: DiscoveryMethod,
    /// Features with deep context merged
    pub features: ElementFeatures,
}

impl Candidate {
    fn deep(&self) -> DeepContext {
        self.features.deep().cloned().unwrap_or_default()
    }
}

/// Candidate with its ranking score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    /// The candidate
    pub candidate: Candidate,
    /// Score, capped at 1.0 and possibly negative
    pub score: f64,
}

/// Selector set for an intent
#[must_use]
pub const fn selector_set(intent: Intent) -> &'static str {
    match intent {
        Intent::Click | Intent::Hover | Intent::Navigate => CLICKABLE,
        Intent::Type => FILLABLE,
        Intent::Select | Intent::Check | Intent::Uncheck => SELECTABLE,
        Intent::Validate | Intent::Extract | Intent::Wait => ANY_INTERACTIVE,
    }
}

/// Precise locator for a node: id, test id, name, placeholder, then exact text
#[must_use]
pub fn resolve_handle(node: &DomNode) -> Option<String> {
    if let Some(id) = node.element_id() {
        return Some(id_selector(id));
    }
    if let Some((attr, value)) = node.test_id() {
        return Some(attr_selector(attr, value));
    }
    if let Some(name) = node.name() {
        return Some(format!("{}{}", node.tag, attr_selector("name", name)));
    }
    if let Some(placeholder) = node.placeholder() {
        return Some(format!("{}{}", node.tag, attr_selector("placeholder", placeholder)));
    }
    let text = node.trimmed_text();
    (!text.is_empty() && text.chars().count() <= MAX_HANDLE_TEXT)
        .then(|| text_is_selector(&node.tag, text))
}

fn node_text(node: &DomNode) -> Option<String> {
    let text = clip(&node.inner_text);
    (!text.is_empty()).then_some(text)
}

fn surrounding_text(snapshot: &DomSnapshot, node: &DomNode) -> String {
    let mut parts: Vec<String> = snapshot
        .siblings(node.index)
        .into_iter()
        .filter_map(|s| snapshot.node(s))
        .filter(|s| s.visible)
        .filter_map(node_text)
        .collect();
    if let Some(parent) = node.parent.and_then(|p| snapshot.node(p)) {
        if !parent.text.trim().is_empty() {
            parts.insert(0, parent.text.trim().to_string());
        }
    }
    clip(&parts.join(" "))
}

fn semantic_context(snapshot: &DomSnapshot, node: &DomNode) -> Option<String> {
    let ancestor = snapshot.closest(node.index, |a| {
        SEMANTIC_TAGS.contains(&a.tag.as_str())
            || a.non_empty_attr("role")
                .is_some_and(|r| SEMANTIC_ROLES.contains(&r))
    })?;
    let kind = ancestor
        .non_empty_attr("role")
        .unwrap_or(ancestor.tag.as_str());
    let name = ancestor
        .aria_label()
        .or_else(|| ancestor.element_id())
        .or_else(|| ancestor.name());
    Some(match name {
        Some(name) => format!("{kind} {name}"),
        None => kind.to_string(),
    })
}

fn headings_above(snapshot: &DomSnapshot, node: &DomNode) -> Vec<String> {
    let Some(rect) = node.rect else {
        return Vec::new();
    };
    let mut found: Vec<(f64, String)> = snapshot
        .iter()
        .filter(|h| h.visible && h.index != node.index && h.heading_level().is_some())
        .filter_map(|h| {
            let hr = h.rect?;
            let gap = rect.y - hr.bottom();
            (gap >= 0.0 && gap <= HEADING_RANGE_PX)
                .then(|| node_text(h).map(|t| (gap, t)))
                .flatten()
        })
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0));
    found.into_iter().map(|(_, t)| t).collect()
}

fn is_cell(node: &DomNode) -> bool {
    matches!(node.tag.as_str(), "td" | "th")
        || matches!(node.attr("role"), Some("cell" | "gridcell" | "columnheader"))
}

fn table_context(snapshot: &DomSnapshot, node: &DomNode) -> Option<TableContext> {
    let cell = if is_cell(node) {
        node
    } else {
        snapshot.closest(node.index, is_cell)?
    };
    let row = snapshot.closest(cell.index, |a| a.tag == "tr" || a.attr("role") == Some("row"))?;
    let table = snapshot.closest(row.index, |a| {
        a.tag == "table" || matches!(a.attr("role"), Some("table" | "grid" | "treegrid"))
    })?;
    let row_index = table_rows(snapshot, table.index)
        .iter()
        .position(|r| *r == row.index)?;
    let column = row_cells(snapshot, row.index)
        .iter()
        .position(|c| c.index == cell.index)?;
    let headers = table_headers(snapshot, table.index);
    Some(TableContext {
        row: row_index,
        column,
        header: headers.get(column).cloned(),
        headers,
    })
}

fn push_unique(hints: &mut Vec<String>, hint: &str) {
    if !hints.iter().any(|h| h == hint) {
        hints.push(hint.to_string());
    }
}

fn framework_hints(snapshot: &DomSnapshot, node: &DomNode) -> Vec<String> {
    let mut hints = Vec::new();
    for n in std::iter::once(node).chain(snapshot.ancestors(node.index)) {
        for key in n.attributes.keys() {
            if key.starts_with("data-react") {
                push_unique(&mut hints, "react");
            } else if key.starts_with("ng-") || key.starts_with("_ngcontent") || key.starts_with("_nghost") {
                push_unique(&mut hints, "angular");
            } else if key.starts_with("data-v-") {
                push_unique(&mut hints, "vue");
            }
        }
        if n.classes().any(|c| c.starts_with("svelte-")) {
            push_unique(&mut hints, "svelte");
        }
    }
    hints
}

fn component_hints(snapshot: &DomSnapshot, node: &DomNode) -> Vec<String> {
    let mut hints = Vec::new();
    for n in std::iter::once(node).chain(snapshot.ancestors(node.index)) {
        for class in n.classes() {
            if class.starts_with("Mui") {
                push_unique(&mut hints, "material-ui");
            } else if class.starts_with("ant-") {
                push_unique(&mut hints, "ant-design");
            } else if class.starts_with("chakra-") {
                push_unique(&mut hints, "chakra");
            } else if matches!(class, "btn" | "form-control" | "navbar" | "form-select")
                || class.starts_with("btn-")
            {
                push_unique(&mut hints, "bootstrap");
            }
        }
    }
    hints
}

fn is_loading_indicator(node: &DomNode) -> bool {
    node.attr("role") == Some("progressbar")
        || node.attr("aria-busy") == Some("true")
        || node.classes().any(|c| {
            let c = c.to_lowercase();
            LOADING_HINTS.iter().any(|h| c.contains(h))
        })
}

fn loading_nearby(snapshot: &DomSnapshot, node: &DomNode) -> bool {
    let Some(rect) = node.rect else {
        return false;
    };
    snapshot.iter().any(|n| {
        n.index != node.index
            && n.visible
            && is_loading_indicator(n)
            && n.rect
                .is_some_and(|r| r.center_distance(&rect) <= LOADING_RANGE_PX)
    })
}

/// Deep-search findings around a node
#[must_use]
pub fn deep_context(snapshot: &DomSnapshot, node: &DomNode) -> DeepContext {
    DeepContext {
        label: associated_label(snapshot, node).map(|(text, _)| text),
        surrounding_text: surrounding_text(snapshot, node),
        semantic_context: semantic_context(snapshot, node),
        headings: headings_above(snapshot, node),
        table: table_context(snapshot, node),
        framework_hints: framework_hints(snapshot, node),
        component_hints: component_hints(snapshot, node),
        in_shadow_root: node.in_shadow_root,
        in_iframe: node.in_iframe,
        loading_nearby: loading_nearby(snapshot, node),
    }
}

async fn confirm(page: &dyn PageHandle, locator: &str, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, page.count(locator)).await {
        Ok(Ok(n)) if n > 0 => true,
        Ok(Ok(_)) => {
            debug!(locator, "handle matched nothing");
            false
        }
        Ok(Err(e)) => {
            debug!(locator, error = %e, "handle check failed");
            false
        }
        Err(_) => {
            debug!(locator, "handle check timed out");
            false
        }
    }
}

/// Turns snapshot nodes into confirmed candidates
pub struct CandidateDiscovery<'a> {
    page: &'a dyn PageHandle,
    snapshot: &'a DomSnapshot,
    extractor: &'a dyn FeatureExtractor,
    resolve_timeout: Duration,
}

impl fmt::Debug for CandidateDiscovery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateDiscovery")
            .field("url", &self.snapshot.url)
            .field("resolve_timeout", &self.resolve_timeout)
            .finish_non_exhaustive()
    }
}

impl<'a> CandidateDiscovery<'a> {
    /// Discover over `snapshot`, confirming handles on `page`
    #[must_use]
    pub fn new(
        page: &'a dyn PageHandle,
        snapshot: &'a DomSnapshot,
        extractor: &'a dyn FeatureExtractor,
        resolve_timeout: Duration,
    ) -> Self {
        Self {
            page,
            snapshot,
            extractor,
            resolve_timeout,
        }
    }

    /// Deep search first; the legacy methods run only when it finds nothing
    pub async fn discover(&self, nlp: &NlpResult) -> Vec<Candidate> {
        let deep = match Selector::parse(selector_set(nlp.intent)) {
            Ok(selector) => {
                self.confirm_all(selector.query_all(self.snapshot), DiscoveryMethod::DeepSearch)
                    .await
            }
            Err(e) => {
                debug!(error = %e, "intent selector set rejected");
                Vec::new()
            }
        };
        if !deep.is_empty() {
            debug!(count = deep.len(), "deep search candidates");
            return deep;
        }
        let mut found = Vec::new();
        let mut seen = HashSet::new();
        for method in DiscoveryMethod::LEGACY {
            let nodes = match self.legacy_nodes(method, nlp) {
                Ok(nodes) => nodes,
                Err(e) => {
                    debug!(%method, error = %e, "legacy discovery failed");
                    continue;
                }
            };
            let fresh: Vec<NodeId> = nodes.into_iter().filter(|n| seen.insert(*n)).collect();
            found.extend(self.confirm_all(fresh, method).await);
        }
        debug!(count = found.len(), "legacy candidates");
        found
    }

    async fn confirm_all(&self, nodes: Vec<NodeId>, method: DiscoveryMethod) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = Vec::new();
        for id in nodes {
            let Some(node) = self.snapshot.node(id).filter(|n| n.visible) else {
                continue;
            };
            let Some(locator) = resolve_handle(node) else {
                continue;
            };
            if out.iter().any(|c| c.locator == locator) {
                continue;
            }
            if !confirm(self.page, &locator, self.resolve_timeout).await {
                continue;
            }
            let features = match self.extractor.extract(self.page, self.snapshot, id).await {
                Ok(features) => features,
                Err(e) => {
                    debug!(node = id, error = %e, "feature extraction failed");
                    continue;
                }
            };
            out.push(Candidate {
                node: id,
                locator,
                method,
                features: features.with_deep_context(deep_context(self.snapshot, node)),
            });
        }
        out
    }

    fn legacy_nodes(&self, method: DiscoveryMethod, nlp: &NlpResult) -> HealResult<Vec<NodeId>> {
        let snapshot = self.snapshot;
        let nodes = match method {
            DiscoveryMethod::DeepSearch => Vec::new(),
            DiscoveryMethod::Text => {
                let Some(target) = nlp.text_content.as_deref().map(str::to_lowercase) else {
                    return Ok(Vec::new());
                };
                snapshot
                    .iter()
                    .filter(|n| n.visible && n.trimmed_text().to_lowercase() == target)
                    .filter(|n| {
                        !n.children.iter().any(|c| {
                            snapshot
                                .node(*c)
                                .is_some_and(|c| c.trimmed_text().to_lowercase() == target)
                        })
                    })
                    .map(|n| n.index)
                    .collect()
            }
            DiscoveryMethod::Role => snapshot
                .iter()
                .filter(|n| {
                    n.role()
                        .is_some_and(|r| nlp.expected_roles.iter().any(|e| *e == r))
                })
                .map(|n| n.index)
                .collect(),
            DiscoveryMethod::Tag => match nlp.element_type.as_deref().and_then(tag_selector) {
                Some(selector) => Selector::parse(selector)?.query_all(snapshot),
                None => Vec::new(),
            },
            DiscoveryMethod::KeywordAttribute => {
                if nlp.keywords.is_empty() {
                    return Ok(Vec::new());
                }
                let list = nlp
                    .keywords
                    .iter()
                    .flat_map(|k| {
                        let q = quote(k);
                        ["id", "name", "placeholder", "aria-label", "data-testid"]
                            .map(|attr| format!("[{attr}*={q}]"))
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Selector::parse(&list)?.query_all(snapshot)
            }
            DiscoveryMethod::KeywordText => snapshot
                .iter()
                .filter(|n| n.is_interactable())
                .filter(|n| {
                    let text = n.inner_text.to_lowercase();
                    nlp.keywords.iter().any(|k| text.contains(k.as_str()))
                })
                .map(|n| n.index)
                .collect(),
        };
        Ok(nodes)
    }
}

fn tag_selector(element_type: &str) -> Option<&'static str> {
    Some(match element_type {
        "button" => "button, input[type=submit], input[type=button], [role=button]",
        "link" => "a[href], [role=link]",
        "input" => "input:not([type=hidden])",
        "textarea" => "textarea",
        "checkbox" => "input[type=checkbox], [role=checkbox]",
        "radio" => "input[type=radio], [role=radio]",
        "dropdown" => "select, [role=combobox], [role=listbox]",
        "table" => "table, [role=grid]",
        "modal" => "dialog, [role=dialog]",
        "tab" => "[role=tab]",
        "menu" => "nav, [role=menu], [role=menubar]",
        "image" => "img",
        "heading" => "h1, h2, h3, h4, h5, h6, [role=heading]",
        "toggle" => "[role=switch]",
        "slider" => "input[type=range], [role=slider]",
        "alert" => "[role=alert]",
        "list" => "ul, ol, [role=list]",
        "form" => "form",
        _ => return None,
    })
}

fn contains_ci(haystack: Option<&str>, keyword: &str) -> bool {
    haystack.is_some_and(|h| h.to_lowercase().contains(keyword))
}

fn input_type_score(features: &ElementFeatures, nlp: &NlpResult, weights: &RankingWeights) -> f64 {
    if features.structural.tag != "input" {
        return 0.0;
    }
    let input_type = features.semantic.input_type.as_deref().unwrap_or("text");
    let sensitive = nlp
        .keywords
        .iter()
        .find(|k| SENSITIVE_KEYWORDS.contains(&k.as_str()));
    match sensitive.map(String::as_str) {
        Some("password") if input_type == "password" => weights.input_type_match,
        Some("password") => weights.input_type_mismatch,
        Some("email") if input_type == "email" => weights.input_type_match,
        Some("username") if matches!(input_type, "text" | "email") => weights.input_type_match,
        Some("email" | "username") if input_type == "password" => weights.input_type_mismatch,
        Some(_) => 0.0,
        None if nlp.intent == Intent::Type && matches!(input_type, "text" | "email") => {
            weights.generic_type_match
        }
        None => 0.0,
    }
}

/// Best keyword hit over the candidate's context sources
fn context_match(features: &ElementFeatures, deep: &DeepContext, keywords: &[String]) -> f64 {
    let headings = deep.headings.join(" ");
    let sources: [(Option<&str>, f64); 10] = [
        (features.semantic.test_id.as_deref(), 1.0),
        (deep.label.as_deref(), 0.98),
        (Some(features.text.inner_text.as_str()), 0.95),
        (features.text.placeholder.as_deref(), 0.92),
        (Some(deep.surrounding_text.as_str()), 0.85),
        (Some(headings.as_str()), 0.80),
        (features.semantic.name.as_deref(), 0.75),
        (features.text.aria_label.as_deref(), 0.70),
        (features.structural.id.as_deref(), 0.65),
        (deep.semantic_context.as_deref(), 0.60),
    ];
    keywords
        .iter()
        .flat_map(|k| {
            sources
                .iter()
                .filter(move |(text, _)| contains_ci(*text, k))
                .map(|(_, weight)| *weight)
        })
        .fold(0.0, f64::max)
}

fn is_clickable(features: &ElementFeatures) -> bool {
    matches!(features.structural.tag.as_str(), "button" | "a")
        || matches!(features.semantic.role.as_deref(), Some("button" | "link"))
}

/// Score one candidate
#[must_use]
pub fn score_candidate(candidate: &Candidate, nlp: &NlpResult, weights: &RankingWeights) -> f64 {
    let features = &candidate.features;
    let deep = candidate.deep();
    let keywords: Vec<String> = nlp.keywords.iter().map(|k| k.to_lowercase()).collect();

    let mut score = input_type_score(features, nlp, weights);
    score += context_match(features, &deep, &keywords) * weights.context_weight;
    if is_clickable(features)
        && keywords
            .iter()
            .any(|k| contains_ci(Some(features.text.inner_text.as_str()), k))
    {
        score += weights.clickable_text_bonus;
    }

    if let Some(table) = &deep.table {
        if table
            .header
            .as_deref()
            .is_some_and(|h| keywords.iter().any(|k| contains_ci(Some(h), k)))
        {
            score += weights.table_header_match;
        }
        if keywords.iter().any(|k| TABULAR_OPERATIONS.contains(&k.as_str())) {
            score += weights.tabular_operation;
        }
    }
    if !deep.framework_hints.is_empty() {
        score += weights.framework_hint;
    }
    if deep
        .component_hints
        .iter()
        .any(|h| TRUSTED_LIBRARIES.contains(&h.as_str()))
    {
        score += weights.trusted_library;
    }
    if deep.in_shadow_root {
        score += weights.shadow_dom;
    }
    if deep.loading_nearby {
        score += weights.loading_indicator;
    }
    if deep.in_iframe {
        score += weights.iframe;
    }

    if let Some(target) = nlp.text_content.as_deref() {
        score += text_similarity_ci(target, features.display_text()) * weights.text_similarity_weight;
    }
    if features.visual.visible {
        score += weights.visibility;
    }
    score.min(1.0)
}

/// Score and sort candidates, best first.
///
/// Hidden candidates are dropped. System fields are ranked only when no
/// other visible candidate is left.
#[must_use]
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    nlp: &NlpResult,
    weights: &RankingWeights,
) -> Vec<RankedCandidate> {
    let (usable, rest): (Vec<Candidate>, Vec<Candidate>) = candidates
        .into_iter()
        .filter(|c| c.features.visual.visible)
        .partition(|c| !c.features.semantic.system_field);
    let pool = if usable.is_empty() { rest } else { usable };
    let mut ranked: Vec<RankedCandidate> = pool
        .into_iter()
        .map(|candidate| RankedCandidate {
            score: score_candidate(&candidate, nlp, weights),
            candidate,
        })
        .collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
    ranked
}
