//! Description-based element identification.
//!
//! [`IntelligentAi`] owns the per-worker engines (NLP, DOM analysis,
//! similarity, patterns, learner) and the [`HistoryLedger`]. It runs
//! identification end to end: parse the description, snapshot the page,
//! discover and rank candidates, record the operation in the ledger and feed
//! the learner.
//!
//! The page analysis taken before discovery is not consulted by ranking; it
//! refreshes the per-URL [`DomIntelligence`] cache that
//! [`IntelligentAi::analyze_page`] serves.

use crate::candidates::{rank_candidates, resolve_handle, CandidateDiscovery, DiscoveryMethod};
use crate::context::WorkerContext;
use crate::dom::{DomSnapshot, NodeId};
use crate::dom_intelligence::{DomAnalysis, DomIntelligence};
use crate::failure::{analyze_failure, DiagnosticsCollector, FailureAnalysis, FailureContext};
use crate::features::{ElementFeatures, FeatureExtractor, SnapshotFeatureExtractor};
use crate::history::{AiHistoryEntry, AiOperation, EntryContext, HistoryLedger, HistoryRecord};
use crate::learner::{LearnerSnapshot, PatternLearner, MIN_OBSERVATION_CONFIDENCE};
use crate::nlp::NaturalLanguageEngine;
use crate::page::PageHandle;
use crate::patterns::{PatternMatcher, PatternSource};
use crate::result::{HealError, HealResult};
use crate::selector::{quote, Selector};
use crate::similarity::{SimilarityEngine, SimilarityScore, WeightUpdate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Alternatives reported next to the winner
pub const MAX_ALTERNATIVES: usize = 3;
/// Longest inner text used to disambiguate a class selector
pub const MAX_AUGMENT_TEXT: usize = 50;
/// Minimum overall similarity for re-finding a remembered element
pub const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Runner-up candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    /// Locator
    pub locator: String,
    /// Ranking score
    pub confidence: f64,
    /// Discovery method
    pub method: DiscoveryMethod,
}

/// Outcome of [`IntelligentAi::identify_element`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementIdentificationResult {
    /// Locator of the best candidate
    pub locator: String,
    /// Ranking score of the best candidate, at least 0
    pub confidence: f64,
    /// How the best candidate was found
    pub method: DiscoveryMethod,
    /// Features of the best candidate
    pub features: ElementFeatures,
    /// Next best candidates
    pub alternatives: Vec<Alternative>,
    /// Best matching UI pattern
    pub pattern: Option<String>,
    /// Time spent
    pub duration: Duration,
}

/// Element re-found by similarity to a remembered capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarElement {
    /// Locator of the match
    pub locator: String,
    /// Similarity breakdown
    pub score: SimilarityScore,
}

/// Aggregate numbers for one worker's engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiStatistics {
    /// Operations retained in the ledger
    pub total_operations: usize,
    /// Identification attempts
    pub identifications: usize,
    /// Successful identifications
    pub successful_identifications: usize,
    /// `successful_identifications / identifications`
    pub identification_success_rate: f64,
    /// Mean confidence of successful identifications
    pub average_confidence: f64,
    /// Failure analyses
    pub failure_analyses: usize,
    /// Built-in patterns
    pub builtin_patterns: usize,
    /// Promoted learned patterns
    pub learned_patterns: usize,
    /// Shapes under observation
    pub observed_shapes: usize,
    /// Cached description parses
    pub nlp_cache_entries: usize,
    /// Cached page analyses
    pub dom_cache_entries: usize,
    /// Remembered element captures
    pub remembered_elements: usize,
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Append `:text-is("…")` to a bare class selector when the text pins one element
#[must_use]
pub fn augment_locator(locator: &str, snapshot: &DomSnapshot, node: NodeId) -> String {
    let Ok(selector) = Selector::parse(locator) else {
        return locator.to_string();
    };
    let Some(text) = snapshot.node(node).map(|n| n.trimmed_text()) else {
        return locator.to_string();
    };
    if !selector.is_bare_class() || text.is_empty() || text.chars().count() > MAX_AUGMENT_TEXT {
        return locator.to_string();
    }
    let augmented = format!("{locator}:text-is({})", quote(text));
    match Selector::parse(&augmented) {
        Ok(s) if s.count(snapshot) == 1 => augmented,
        _ => locator.to_string(),
    }
}

/// Per-worker identification engine
pub struct IntelligentAi {
    ctx: WorkerContext,
    nlp: NaturalLanguageEngine,
    dom: DomIntelligence,
    similarity: SimilarityEngine,
    matcher: PatternMatcher,
    learner: PatternLearner,
    extractor: Box<dyn FeatureExtractor>,
    remembered: HashMap<String, ElementFeatures>,
    ledger: HistoryLedger,
}

impl std::fmt::Debug for IntelligentAi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntelligentAi")
            .field("worker", self.ctx.worker_id())
            .field("ledger_entries", &self.ledger.len())
            .field("remembered", &self.remembered.len())
            .finish_non_exhaustive()
    }
}

impl IntelligentAi {
    /// Engine using the snapshot feature extractor
    #[must_use]
    pub fn new(ctx: &WorkerContext) -> Self {
        let ttl = ctx.config().cache_ttl();
        Self {
            ctx: ctx.clone(),
            nlp: NaturalLanguageEngine::new(ttl, ctx.clock()),
            dom: DomIntelligence::new(ctx),
            similarity: SimilarityEngine::new(),
            matcher: PatternMatcher::new(),
            learner: PatternLearner::new(ctx.clock()),
            extractor: Box::new(SnapshotFeatureExtractor::new(ctx.clock())),
            remembered: HashMap::new(),
            ledger: HistoryLedger::new(ctx.config().history_max_entries, ctx.clock()),
        }
    }

    /// Replace the feature extractor
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Whether identification runs at all
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.ctx.config().ai_enabled
    }

    fn record_identification(
        &mut self,
        description: &str,
        found: Option<(&str, DiscoveryMethod, f64)>,
        url: Option<String>,
        started: Instant,
    ) {
        let strategy = found.map_or_else(|| "none".to_string(), |(_, method, _)| method.to_string());
        let record = HistoryRecord::new(AiOperation::Identification, description, strategy)
            .with_healed_locator(found.map(|(locator, _, _)| locator.to_string()))
            .with_outcome(
                found.is_some(),
                found.map_or(0.0, |(_, _, confidence)| confidence),
                elapsed_ms(started),
            )
            .with_context(EntryContext {
                url,
                ..EntryContext::default()
            });
        self.ledger.record(record);
    }

    async fn take_snapshot(&self, page: &dyn PageHandle) -> HealResult<DomSnapshot> {
        let timeout = self.ctx.config().snapshot_timeout();
        let ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tokio::time::timeout(timeout, page.snapshot())
            .await
            .map_err(|_| HealError::Timeout { ms })?
    }

    /// Find the element a natural-language description refers to.
    ///
    /// Returns `None` when identification is disabled, the page cannot be
    /// read, or nothing plausible is found.
    pub async fn identify_element(
        &mut self,
        description: &str,
        page: &dyn PageHandle,
    ) -> Option<ElementIdentificationResult> {
        if !self.is_enabled() {
            debug!("identification disabled");
            return None;
        }
        let started = Instant::now();
        let nlp = self.nlp.process_description(description);
        let snapshot = match self.take_snapshot(page).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "snapshot failed");
                let url = page.url().await.ok();
                self.record_identification(description, None, url, started);
                return None;
            }
        };
        let analysis = self.dom.analyze_with(&snapshot);
        debug!(
            url = %analysis.url,
            interactable = analysis.metrics.interactable_elements,
            intent = %nlp.intent,
            "identifying element"
        );

        let resolve_timeout = self.ctx.config().resolve_timeout();
        let candidates = CandidateDiscovery::new(page, &snapshot, self.extractor.as_ref(), resolve_timeout)
            .discover(&nlp)
            .await;
        let mut ranked = rank_candidates(candidates, &nlp, &self.ctx.config().ranking).into_iter();
        let Some(winner) = ranked.next() else {
            debug!(description, "no candidates");
            self.record_identification(description, None, Some(snapshot.url.clone()), started);
            return None;
        };
        let alternatives = ranked
            .take(MAX_ALTERNATIVES)
            .map(|r| Alternative {
                locator: r.candidate.locator,
                confidence: r.score,
                method: r.candidate.method,
            })
            .collect();

        let node = winner.candidate.node;
        let locator = augment_locator(&winner.candidate.locator, &snapshot, node);
        let confidence = winner.score.max(0.0);
        let features = winner.candidate.features;
        let pattern = self.matcher.best_match(&snapshot, node).map(|m| m.pattern);

        if self.ctx.config().learning_enabled && confidence >= MIN_OBSERVATION_CONFIDENCE {
            if let Some(name) = self.learner.learn(&mut self.matcher, &features, confidence, true) {
                info!(pattern = %name, "learned pattern available");
            }
        }
        self.remembered.insert(locator.clone(), features.clone());
        self.record_identification(
            description,
            Some((locator.as_str(), winner.candidate.method, confidence)),
            Some(snapshot.url.clone()),
            started,
        );
        info!(description, locator = %locator, confidence, method = %winner.candidate.method, "element identified");

        Some(ElementIdentificationResult {
            locator,
            confidence,
            method: winner.candidate.method,
            features,
            alternatives,
            pattern,
            duration: started.elapsed(),
        })
    }

    /// Re-find an element identified earlier under `locator` by feature similarity
    pub async fn find_similar_element(
        &mut self,
        locator: &str,
        page: &dyn PageHandle,
    ) -> Option<SimilarElement> {
        let target = self.remembered.get(locator)?.clone();
        let snapshot = match self.take_snapshot(page).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!(error = %e, "snapshot failed");
                return None;
            }
        };
        let mut handles = Vec::new();
        let mut features = Vec::new();
        for node in snapshot.iter().filter(|n| n.is_interactable()) {
            let Some(handle) = resolve_handle(node) else {
                continue;
            };
            match self.extractor.extract(page, &snapshot, node.index).await {
                Ok(f) => {
                    handles.push(handle);
                    features.push(f);
                }
                Err(e) => debug!(node = node.index, error = %e, "feature extraction failed"),
            }
        }
        let best = self
            .similarity
            .find_most_similar(&target, &features, SIMILARITY_THRESHOLD)?;
        let found = handles.into_iter().nth(best.index)?;
        if found == locator {
            return None;
        }
        debug!(from = locator, to = %found, score = best.score.overall, "similar element found");
        Some(SimilarElement {
            locator: found,
            score: best.score,
        })
    }

    /// Structural analysis of the page, `None` if it cannot be read
    pub async fn analyze_page(&mut self, page: &dyn PageHandle) -> Option<Arc<DomAnalysis>> {
        match self.dom.analyze(page).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                debug!(error = %e, "page analysis failed");
                None
            }
        }
    }

    /// Classify a failure and record the analysis
    pub async fn analyze_failure(
        &mut self,
        failure: &FailureContext,
        collector: Option<&dyn DiagnosticsCollector>,
    ) -> FailureAnalysis {
        let started = Instant::now();
        let analysis = analyze_failure(failure, collector, self.ctx.clock().now()).await;
        let description = failure
            .description
            .clone()
            .unwrap_or_else(|| failure.error_message.clone());
        let mut record = HistoryRecord::new(AiOperation::FailureAnalysis, description, "analysis")
            .with_outcome(analysis.healable, analysis.confidence, elapsed_ms(started))
            .with_context(EntryContext {
                failure_type: Some(analysis.failure_type),
                error: Some(failure.error_message.clone()),
                ..EntryContext::default()
            });
        if let Some(locator) = &failure.locator {
            record = record.with_original_locator(locator.clone());
        }
        self.ledger.record(record);
        analysis
    }

    /// Report whether acting on an identified element worked
    pub fn record_outcome(&mut self, features: &ElementFeatures, success: bool) -> bool {
        self.learner.record_outcome(features, success)
    }

    /// Retune similarity weights
    pub fn set_similarity_weights(&mut self, update: WeightUpdate) {
        self.similarity.set_weights(update);
    }

    /// Similarity engine
    #[must_use]
    pub fn similarity(&self) -> &SimilarityEngine {
        &self.similarity
    }

    /// Pattern matcher
    #[must_use]
    pub fn patterns(&self) -> &PatternMatcher {
        &self.matcher
    }

    /// Pattern learner
    #[must_use]
    pub fn learner(&self) -> &PatternLearner {
        &self.learner
    }

    /// Recorded operations, oldest first
    pub fn operations(&self) -> impl Iterator<Item = &AiHistoryEntry> {
        self.ledger.entries()
    }

    /// Ledger of every operation and healing attempt
    #[must_use]
    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    /// Mutable ledger
    pub fn ledger_mut(&mut self) -> &mut HistoryLedger {
        &mut self.ledger
    }

    /// Aggregate numbers
    #[must_use]
    pub fn statistics(&self) -> AiStatistics {
        let identifications: Vec<&AiHistoryEntry> = self
            .ledger
            .entries()
            .filter(|o| o.operation == AiOperation::Identification)
            .collect();
        let successful: Vec<&&AiHistoryEntry> = identifications.iter().filter(|o| o.success).collect();
        let rate = |part: usize, whole: usize| {
            if whole == 0 {
                0.0
            } else {
                part as f64 / whole as f64
            }
        };
        AiStatistics {
            total_operations: self.ledger.len(),
            identifications: identifications.len(),
            successful_identifications: successful.len(),
            identification_success_rate: rate(successful.len(), identifications.len()),
            average_confidence: if successful.is_empty() {
                0.0
            } else {
                successful.iter().map(|o| o.confidence).sum::<f64>() / successful.len() as f64
            },
            failure_analyses: self
                .ledger
                .entries()
                .filter(|o| o.operation == AiOperation::FailureAnalysis)
                .count(),
            builtin_patterns: self.matcher.count(PatternSource::Builtin),
            learned_patterns: self.matcher.count(PatternSource::Learned),
            observed_shapes: self.learner.len(),
            nlp_cache_entries: self.nlp.cache_len(),
            dom_cache_entries: self.dom.cached(),
            remembered_elements: self.remembered.len(),
        }
    }

    /// Forget recorded operations and healing history
    pub fn clear_operations(&mut self) {
        self.ledger.clear();
    }

    /// Forget learned patterns and observed shapes
    pub fn clear_patterns(&mut self) {
        self.learner.clear();
        self.matcher.clear_learned();
    }

    /// Reset everything this worker learned or cached
    pub fn clear(&mut self) {
        self.clear_operations();
        self.clear_patterns();
        self.nlp.clear_cache();
        self.dom.clear();
        self.remembered.clear();
    }

    /// Export learner state
    #[must_use]
    pub fn export_learner(&self) -> LearnerSnapshot {
        self.learner.export()
    }

    /// Import learner state and re-register promoted patterns
    pub fn import_learner(&mut self, snapshot: LearnerSnapshot) -> HealResult<usize> {
        self.learner.import(snapshot, &mut self.matcher)
    }
}
