//! Page abstraction consumed by the engine.
//!
//! The engine touches a page only through [`PageHandle`]: read the URL and
//! title, evaluate a script returning JSON, count selector matches, and take a
//! [`DomSnapshot`]. [`StaticPage`] serves a fixed snapshot (fixtures, tests,
//! the CLI); `CdpPage` drives a real Chromium tab behind the `browser` feature.

use crate::dom::{DomSnapshot, DOM_SNAPSHOT_SCRIPT};
use crate::result::{HealError, HealResult};
use crate::selector::Selector;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

/// Minimal page surface the engine needs
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Current URL
    async fn url(&self) -> HealResult<String>;

    /// Document title
    async fn title(&self) -> HealResult<String>;

    /// Evaluate a script in page context and return its JSON result
    async fn evaluate(&self, script: &str) -> HealResult<serde_json::Value>;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> HealResult<usize>;

    /// Serialize the live DOM
    async fn snapshot(&self) -> HealResult<DomSnapshot> {
        let value = self.evaluate(DOM_SNAPSHOT_SCRIPT).await?;
        DomSnapshot::from_json(value)
    }
}

/// Recorded page call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    /// `url()`
    Url,
    /// `title()`
    Title,
    /// `evaluate()`
    Evaluate,
    /// `count(selector)`
    Count(String),
    /// `snapshot()`
    Snapshot,
}

/// Page backed by a fixed [`DomSnapshot`]
#[derive(Debug)]
pub struct StaticPage {
    snapshot: DomSnapshot,
    failing_selectors: HashSet<String>,
    count_latency: Option<Duration>,
    snapshot_fails: bool,
    calls: Mutex<Vec<PageCall>>,
}

impl StaticPage {
    /// Serve `snapshot`
    #[must_use]
    pub fn new(snapshot: DomSnapshot) -> Self {
        Self {
            snapshot,
            failing_selectors: HashSet::new(),
            count_latency: None,
            snapshot_fails: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Load a snapshot from JSON text
    pub fn from_json_str(json: &str) -> HealResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Ok(Self::new(DomSnapshot::from_json(value)?))
    }

    /// Make `count(selector)` fail
    #[must_use]
    pub fn with_failing_selector(mut self, selector: impl Into<String>) -> Self {
        self.failing_selectors.insert(selector.into());
        self
    }

    /// Delay every `count` call
    #[must_use]
    pub const fn with_count_latency(mut self, latency: Duration) -> Self {
        self.count_latency = Some(latency);
        self
    }

    /// Make `snapshot()` fail
    #[must_use]
    pub const fn with_failing_snapshot(mut self) -> Self {
        self.snapshot_fails = true;
        self
    }

    /// Served snapshot
    #[must_use]
    pub fn dom(&self) -> &DomSnapshot {
        &self.snapshot
    }

    /// Calls made so far
    #[must_use]
    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Number of snapshot reads
    #[must_use]
    pub fn snapshot_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == PageCall::Snapshot)
            .count()
    }

    fn record(&self, call: PageCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl PageHandle for StaticPage {
    async fn url(&self) -> HealResult<String> {
        self.record(PageCall::Url);
        Ok(self.snapshot.url.clone())
    }

    async fn title(&self) -> HealResult<String> {
        self.record(PageCall::Title);
        Ok(self.snapshot.title.clone())
    }

    async fn evaluate(&self, script: &str) -> HealResult<serde_json::Value> {
        self.record(PageCall::Evaluate);
        if script == DOM_SNAPSHOT_SCRIPT {
            return Ok(serde_json::to_value(&self.snapshot)?);
        }
        Err(HealError::evaluation("static page only evaluates the snapshot script"))
    }

    async fn count(&self, selector: &str) -> HealResult<usize> {
        self.record(PageCall::Count(selector.to_string()));
        if let Some(latency) = self.count_latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing_selectors.contains(selector) {
            return Err(HealError::page(format!("count failed for {selector}")));
        }
        Ok(Selector::parse(selector)?.count(&self.snapshot))
    }

    async fn snapshot(&self) -> HealResult<DomSnapshot> {
        self.record(PageCall::Snapshot);
        if self.snapshot_fails {
            return Err(HealError::page("snapshot unavailable"));
        }
        Ok(self.snapshot.clone())
    }
}

#[cfg(feature = "browser")]
pub use cdp::CdpPage;

#[cfg(feature = "browser")]
mod cdp {
    use super::{DomSnapshot, HealError, HealResult, PageHandle, Selector};
    use async_trait::async_trait;
    use chromiumoxide::Page;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// Chromium tab driven over CDP
    #[derive(Debug, Clone)]
    pub struct CdpPage {
        inner: Arc<Mutex<Page>>,
    }

    impl CdpPage {
        /// Wrap an open page
        #[must_use]
        pub fn new(page: Page) -> Self {
            Self {
                inner: Arc::new(Mutex::new(page)),
            }
        }

        async fn eval_as<T: serde::de::DeserializeOwned>(&self, expr: &str) -> HealResult<T> {
            let page = self.inner.lock().await;
            let result = page
                .evaluate(expr)
                .await
                .map_err(|e| HealError::evaluation(e.to_string()))?;
            result
                .into_value()
                .map_err(|e| HealError::evaluation(e.to_string()))
        }
    }

    #[async_trait]
    impl PageHandle for CdpPage {
        async fn url(&self) -> HealResult<String> {
            self.eval_as("window.location.href").await
        }

        async fn title(&self) -> HealResult<String> {
            self.eval_as("document.title").await
        }

        async fn evaluate(&self, script: &str) -> HealResult<serde_json::Value> {
            self.eval_as(script).await
        }

        async fn count(&self, selector: &str) -> HealResult<usize> {
            let parsed = Selector::parse(selector)?;
            if parsed.uses_extensions() {
                let snapshot: DomSnapshot = self.snapshot().await?;
                return Ok(parsed.count(&snapshot));
            }
            let literal = serde_json::to_string(selector)?;
            self.eval_as(&format!("document.querySelectorAll({literal}).length"))
                .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SnapshotBuilder;

    fn page() -> StaticPage {
        let mut b = SnapshotBuilder::new("https://app.test/").title("Home");
        b.child(0, "button").attr("id", "go").text("Go").finish();
        b.child(0, "button").text("Stop").finish();
        StaticPage::new(b.build())
    }

    #[tokio::test]
    async fn test_static_page_basics() {
        let page = page();
        assert_eq!(page.url().await.unwrap(), "https://app.test/");
        assert_eq!(page.title().await.unwrap(), "Home");
        assert_eq!(page.count("button").await.unwrap(), 2);
        assert_eq!(page.count("#go").await.unwrap(), 1);
        assert_eq!(page.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_default_snapshot_goes_through_evaluate() {
        struct EvalOnly(StaticPage);

        #[async_trait]
        impl PageHandle for EvalOnly {
            async fn url(&self) -> HealResult<String> {
                self.0.url().await
            }
            async fn title(&self) -> HealResult<String> {
                self.0.title().await
            }
            async fn evaluate(&self, script: &str) -> HealResult<serde_json::Value> {
                self.0.evaluate(script).await
            }
            async fn count(&self, selector: &str) -> HealResult<usize> {
                self.0.count(selector).await
            }
        }

        let wrapped = EvalOnly(page());
        let snapshot = wrapped.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(wrapped.0.calls(), vec![PageCall::Evaluate]);
    }

    #[tokio::test]
    async fn test_failures() {
        let page = page().with_failing_selector("#go").with_failing_snapshot();
        assert!(page.count("#go").await.is_err());
        assert!(page.count("div[").await.is_err());
        assert!(page.snapshot().await.is_err());
        assert!(page.evaluate("1 + 1").await.is_err());
    }

    #[test]
    fn test_from_json_str() {
        let json = serde_json::to_string(page().dom()).unwrap();
        let loaded = StaticPage::from_json_str(&json).unwrap();
        assert_eq!(loaded.dom().len(), 3);
    }
}
