//! Per-worker façade over identification, healing and prediction.
//!
//! [`IntegrationLayer`] is what a test runner talks to. It enforces the
//! execution-context gate, runs the healing loop, keeps the engine's history
//! ledger, optimizer and predictor in sync, and exports everything a worker learned
//! as one versioned [`WorkerSnapshot`]. [`IntegrationRegistry`] keeps one
//! layer per worker.

use crate::clock::{Clock, SystemClock};
use crate::config::HealingConfig;
use crate::context::{WorkerContext, WorkerId};
use crate::context_gate::{ContextGate, ExecutionContext};
use crate::failure::{DiagnosticsCollector, DiagnosticsSummary, FailureAnalysis, FailureContext};
use crate::history::{
    EntryContext, HistoryLedger, HistoryRecord, LedgerSnapshot, LedgerStatistics,
    StrategyEffectiveness,
};
use crate::learner::LearnerSnapshot;
use crate::nlp::parse_description;
use crate::optimizer::{OptimizerSnapshot, StrategyOptimizer};
use crate::orchestrator::{AiStatistics, ElementIdentificationResult, IntelligentAi};
use crate::page::PageHandle;
use crate::predictive::{FragilityScore, PredictiveHealer};
use crate::result::{HealError, HealResult};
use crate::strategy::{
    AttributeFallbackStrategy, HealingContext, HealingStrategy, StrategyOutcome,
    TextMatchStrategy, AI_IDENTIFICATION,
};
use crate::SNAPSHOT_VERSION;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Base priority of the built-in re-identification strategy
const AI_IDENTIFICATION_PRIORITY: f64 = 8.0;

/// A failed element operation to heal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealRequest {
    /// Locator that failed
    pub locator: String,
    /// Driver error text
    pub error_message: String,
    /// Natural-language description of the element
    pub description: Option<String>,
    /// Element type hint
    pub element_type: Option<String>,
    /// Diagnostics captured by the caller
    pub diagnostics: DiagnosticsSummary,
}

impl HealRequest {
    /// Request for `locator` failing with `error_message`
    #[must_use]
    pub fn new(locator: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            error_message: error_message.into(),
            ..Self::default()
        }
    }

    /// Describe the element
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Hint the element type
    #[must_use]
    pub fn with_element_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    /// Attach diagnostics
    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: DiagnosticsSummary) -> Self {
        self.diagnostics = diagnostics;
        self
    }
}

/// Outcome of [`IntegrationLayer::heal`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligentHealingResult {
    /// Whether a replacement locator was found
    pub success: bool,
    /// Replacement locator
    pub healed_locator: Option<String>,
    /// Strategy that found it
    pub strategy: Option<String>,
    /// Confidence of the replacement
    pub confidence: f64,
    /// Strategies tried
    pub attempts: u32,
    /// Failure classification
    pub analysis: FailureAnalysis,
    /// Time spent
    pub duration: Duration,
}

/// Outcome of [`IntegrationLayer::predict`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Locator asked about
    pub locator: String,
    /// Whether prediction is enabled
    pub enabled: bool,
    /// Whether the locator is expected to fail
    pub will_fail: bool,
    /// Fragility details
    pub fragility: Option<FragilityScore>,
    /// Best historical replacement, only when a failure is predicted
    pub suggested_locator: Option<String>,
}

/// Aggregate numbers for one worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationStatistics {
    /// Worker
    pub worker_id: WorkerId,
    /// Identification engine numbers
    pub ai: AiStatistics,
    /// Ledger numbers
    pub ledger: LedgerStatistics,
    /// Strategy statistics by name
    pub strategies: Vec<StrategyEffectiveness>,
    /// Current execution context
    pub context: ExecutionContext,
}

/// Everything one worker learned, versioned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSnapshot {
    /// Format version
    pub version: u32,
    /// Exporting worker
    pub worker_id: WorkerId,
    /// History ledger
    pub ledger: LedgerSnapshot,
    /// Pattern learner
    pub learner: LearnerSnapshot,
    /// Strategy optimizer
    pub optimizer: OptimizerSnapshot,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Per-worker entry point for identification, healing and prediction
pub struct IntegrationLayer {
    ctx: WorkerContext,
    gate: ContextGate,
    ai: IntelligentAi,
    optimizer: StrategyOptimizer,
    predictor: PredictiveHealer,
    strategies: Vec<Box<dyn HealingStrategy>>,
    collector: Option<Box<dyn DiagnosticsCollector>>,
}

impl std::fmt::Debug for IntegrationLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationLayer")
            .field("worker", self.ctx.worker_id())
            .field("context", &self.gate.current())
            .field("ledger_entries", &self.ai.ledger().len())
            .field(
                "strategies",
                &self.strategies.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl IntegrationLayer {
    /// Layer with the built-in strategies registered
    #[must_use]
    pub fn new(ctx: WorkerContext) -> Self {
        let mut optimizer = StrategyOptimizer::new();
        optimizer.register(AI_IDENTIFICATION, AI_IDENTIFICATION_PRIORITY);
        let mut layer = Self {
            gate: ContextGate::new(),
            ai: IntelligentAi::new(&ctx),
            optimizer,
            predictor: PredictiveHealer::new(&ctx),
            strategies: Vec::new(),
            collector: None,
            ctx,
        };
        layer.register_strategy(Box::new(AttributeFallbackStrategy::default()));
        layer.register_strategy(Box::new(TextMatchStrategy));
        layer
    }

    /// Attach a live diagnostics source
    #[must_use]
    pub fn with_collector(mut self, collector: Box<dyn DiagnosticsCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    /// Add a strategy; a strategy with the same name is replaced
    pub fn register_strategy(&mut self, strategy: Box<dyn HealingStrategy>) {
        self.optimizer.register(strategy.name(), strategy.priority());
        self.strategies.retain(|s| s.name() != strategy.name());
        self.strategies.push(strategy);
    }

    /// Registered strategy names
    #[must_use]
    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Worker context
    #[must_use]
    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Enter a test step, classifying its text
    pub fn enter_step(&mut self, step_text: &str) -> ExecutionContext {
        let context = self.gate.push_detected(step_text);
        debug!(%context, depth = self.gate.depth(), "entered step");
        context
    }

    /// Enter an explicit context
    pub fn enter_context(&mut self, context: ExecutionContext) {
        self.gate.push(context);
    }

    /// Leave the current step
    pub fn exit_step(&mut self) -> Option<ExecutionContext> {
        self.gate.pop()
    }

    /// Current execution context
    #[must_use]
    pub fn current_context(&self) -> ExecutionContext {
        self.gate.current()
    }

    /// Whether AI may act, classifying `description` when no step is active
    #[must_use]
    pub fn is_ai_allowed(&self, description: Option<&str>) -> bool {
        let config = self.ctx.config();
        if !config.ai_enabled {
            return false;
        }
        if !config.ui_only {
            return true;
        }
        let context = if self.gate.is_active() {
            self.gate.current()
        } else {
            description.map_or(ExecutionContext::Unknown, ContextGate::detect)
        };
        ContextGate::allows(context)
    }

    /// Identify an element, subject to the context gate
    pub async fn identify_element(
        &mut self,
        description: &str,
        page: &dyn PageHandle,
    ) -> Option<ElementIdentificationResult> {
        if !self.is_ai_allowed(Some(description)) {
            debug!(description, context = %self.gate.current(), "identification gated");
            return None;
        }
        self.ai.identify_element(description, page).await
    }

    fn record_attempt(
        &mut self,
        request: &HealRequest,
        analysis: &FailureAnalysis,
        element_type: Option<&str>,
        url: Option<&str>,
        strategy: &str,
        outcome: &StrategyOutcome,
    ) {
        let record = HistoryRecord::healing(
            request.description.clone().unwrap_or_default(),
            request.locator.clone(),
            strategy,
        )
        .with_healed_locator(outcome.locator.clone())
        .with_outcome(outcome.success, outcome.confidence, millis(outcome.duration))
        .with_context(EntryContext {
            failure_type: Some(analysis.failure_type),
            error: Some(request.error_message.clone()),
            element_type: element_type.map(str::to_string),
            url: url.map(str::to_string),
        });
        self.ai.ledger_mut().record_healing(record);
        self.optimizer
            .learn(strategy, outcome.success, outcome.confidence);
        self.optimizer.mark_attempted(strategy);
        self.predictor.invalidate(&request.locator);
    }

    async fn try_ai_identification(
        &mut self,
        request: &HealRequest,
        page: &dyn PageHandle,
    ) -> StrategyOutcome {
        let started = Instant::now();
        let threshold = self.ctx.config().confidence_threshold;
        if let Some(description) = request.description.as_deref() {
            if let Some(found) = self.ai.identify_element(description, page).await {
                if found.confidence >= threshold && found.locator != request.locator {
                    return StrategyOutcome::healed(found.locator, found.confidence, started.elapsed());
                }
                debug!(
                    locator = %found.locator,
                    confidence = found.confidence,
                    threshold,
                    "identification below threshold"
                );
            }
        }
        match self.ai.find_similar_element(&request.locator, page).await {
            Some(similar) if similar.score.overall >= threshold => {
                StrategyOutcome::healed(similar.locator, similar.score.overall, started.elapsed())
            }
            _ => StrategyOutcome::failed(started.elapsed()),
        }
    }

    fn finish(
        analysis: FailureAnalysis,
        attempts: u32,
        started: Instant,
        winner: Option<(&str, StrategyOutcome)>,
    ) -> IntelligentHealingResult {
        match winner {
            Some((strategy, outcome)) => IntelligentHealingResult {
                success: true,
                healed_locator: outcome.locator,
                strategy: Some(strategy.to_string()),
                confidence: outcome.confidence,
                attempts,
                analysis,
                duration: started.elapsed(),
            },
            None => IntelligentHealingResult {
                success: false,
                healed_locator: None,
                strategy: None,
                confidence: 0.0,
                attempts,
                analysis,
                duration: started.elapsed(),
            },
        }
    }

    /// Try to find a working replacement for a failed locator.
    ///
    /// Never fails: a gated, unhealable or exhausted request comes back with
    /// `success: false`.
    pub async fn heal(&mut self, request: &HealRequest, page: &dyn PageHandle) -> IntelligentHealingResult {
        let started = Instant::now();
        if !self.ctx.config().intelligent_healing_enabled
            || !self.is_ai_allowed(request.description.as_deref())
        {
            debug!(locator = %request.locator, "healing gated");
            let analysis = FailureAnalysis::fallback("healing disabled in this context", self.ctx.clock().now());
            return Self::finish(analysis, 0, started, None);
        }

        let mut failure = FailureContext::new(request.error_message.clone())
            .with_locator(request.locator.clone())
            .with_diagnostics(request.diagnostics.clone());
        if let Some(description) = &request.description {
            failure = failure.with_description(description.clone());
        }
        let analysis = self.ai.analyze_failure(&failure, self.collector.as_deref()).await;
        let element_type = request.element_type.clone().or_else(|| {
            request
                .description
                .as_deref()
                .and_then(|d| parse_description(d).element_type)
        });

        if !analysis.healable {
            info!(locator = %request.locator, failure = %analysis.failure_type, "failure not healable");
            return Self::finish(analysis, 0, started, None);
        }

        self.optimizer.reset_session();
        let max_attempts = self.ctx.config().max_healing_attempts;
        let url = page.url().await.ok();
        let mut attempts = 0;

        let mut names: Vec<&str> = self
            .strategies
            .iter()
            .map(|s| s.name())
            .filter(|n| *n != AI_IDENTIFICATION)
            .collect();
        if analysis
            .suggested_strategies
            .iter()
            .any(|s| s == AI_IDENTIFICATION)
        {
            names.insert(0, AI_IDENTIFICATION);
        }
        let order: Vec<String> = self
            .optimizer
            .rank(&names, self.ai.ledger(), analysis.failure_type, element_type.as_deref())
            .into_iter()
            .map(|r| r.strategy)
            .collect();

        for name in order {
            if attempts >= max_attempts {
                debug!(max_attempts, "healing attempts exhausted");
                break;
            }
            let outcome = if name == AI_IDENTIFICATION {
                attempts += 1;
                self.try_ai_identification(request, page).await
            } else {
                let Some(index) = self.strategies.iter().position(|s| s.name() == name) else {
                    continue;
                };
                attempts += 1;
                let ctx = HealingContext {
                    original_locator: request.locator.clone(),
                    description: request.description.clone(),
                    analysis: analysis.clone(),
                    attempt: attempts,
                    element_type: element_type.clone(),
                };
                let attempt_started = Instant::now();
                match self.strategies[index].apply(page, &ctx).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        debug!(strategy = %name, error = %e, "strategy failed");
                        StrategyOutcome::failed(attempt_started.elapsed())
                    }
                }
            };
            self.record_attempt(
                request,
                &analysis,
                element_type.as_deref(),
                url.as_deref(),
                &name,
                &outcome,
            );
            if outcome.success && outcome.locator.is_some() {
                info!(from = %request.locator, to = ?outcome.locator, strategy = %name, "healed");
                return Self::finish(analysis, attempts, started, Some((name.as_str(), outcome)));
            }
        }

        info!(locator = %request.locator, attempts, "healing failed");
        Self::finish(analysis, attempts, started, None)
    }

    /// Predict whether `locator` is about to fail
    pub fn predict(&mut self, locator: &str) -> PredictionResult {
        let fragility = self.predictor.fragility(locator, self.ai.ledger());
        let will_fail = fragility.as_ref().is_some_and(|f| f.will_fail);
        let suggested_locator = fragility
            .as_ref()
            .filter(|f| f.will_fail)
            .and_then(|f| f.suggested_locator.clone());
        PredictionResult {
            locator: locator.to_string(),
            enabled: self.predictor.is_enabled(),
            will_fail,
            fragility,
            suggested_locator,
        }
    }

    /// Identification engine
    #[must_use]
    pub fn ai(&self) -> &IntelligentAi {
        &self.ai
    }

    /// Mutable identification engine
    pub fn ai_mut(&mut self) -> &mut IntelligentAi {
        &mut self.ai
    }

    /// History ledger
    #[must_use]
    pub fn ledger(&self) -> &HistoryLedger {
        self.ai.ledger()
    }

    /// Strategy optimizer
    #[must_use]
    pub fn optimizer(&self) -> &StrategyOptimizer {
        &self.optimizer
    }

    /// Aggregate numbers
    #[must_use]
    pub fn statistics(&self) -> IntegrationStatistics {
        IntegrationStatistics {
            worker_id: self.ctx.worker_id().clone(),
            ai: self.ai.statistics(),
            ledger: self.ai.ledger().statistics(),
            strategies: self.ai.ledger().strategies().into_iter().cloned().collect(),
            context: self.gate.current(),
        }
    }

    /// Versioned copy of what this worker learned
    #[must_use]
    pub fn export(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            version: SNAPSHOT_VERSION,
            worker_id: self.ctx.worker_id().clone(),
            ledger: self.ai.ledger().export(),
            learner: self.ai.export_learner(),
            optimizer: self.optimizer.export(),
        }
    }

    /// Restore state exported by [`IntegrationLayer::export`]
    pub fn import(&mut self, snapshot: WorkerSnapshot) -> HealResult<()> {
        if snapshot.version != SNAPSHOT_VERSION {
            warn!(found = snapshot.version, "rejecting worker snapshot");
            return Err(HealError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        self.ai.ledger_mut().import(snapshot.ledger)?;
        self.ai.import_learner(snapshot.learner)?;
        self.optimizer.import(snapshot.optimizer)?;
        for strategy in &self.strategies {
            self.optimizer.register(strategy.name(), strategy.priority());
        }
        self.optimizer.register(AI_IDENTIFICATION, AI_IDENTIFICATION_PRIORITY);
        self.predictor.clear();
        info!(worker = %self.ctx.worker_id(), entries = self.ai.ledger().len(), "worker state imported");
        Ok(())
    }

    /// Reset everything this worker learned, cached or tracked
    pub fn clear(&mut self) {
        self.gate.clear();
        self.ai.clear();
        self.optimizer.clear();
        self.predictor.clear();
        for strategy in &self.strategies {
            self.optimizer.register(strategy.name(), strategy.priority());
        }
        self.optimizer.register(AI_IDENTIFICATION, AI_IDENTIFICATION_PRIORITY);
    }
}

/// One [`IntegrationLayer`] per worker
#[derive(Debug)]
pub struct IntegrationRegistry {
    config: HealingConfig,
    clock: Arc<dyn Clock>,
    workers: BTreeMap<WorkerId, IntegrationLayer>,
}

impl IntegrationRegistry {
    /// Registry creating layers with `config`
    #[must_use]
    pub fn new(config: HealingConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            workers: BTreeMap::new(),
        }
    }

    /// Use `clock` for layers created from now on
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Layer of `worker`, created on first use
    pub fn worker(&mut self, worker: impl Into<WorkerId>) -> &mut IntegrationLayer {
        let id = worker.into();
        let (config, clock) = (&self.config, &self.clock);
        self.workers.entry(id.clone()).or_insert_with(|| {
            debug!(worker = %id, "creating integration layer");
            IntegrationLayer::new(WorkerContext::new(id, config.clone()).with_clock(clock.clone()))
        })
    }

    /// Existing layer of `worker`
    #[must_use]
    pub fn get(&self, worker: &WorkerId) -> Option<&IntegrationLayer> {
        self.workers.get(worker)
    }

    /// Drop a worker's layer
    pub fn remove(&mut self, worker: &WorkerId) -> Option<IntegrationLayer> {
        self.workers.remove(worker)
    }

    /// Known workers
    pub fn worker_ids(&self) -> impl Iterator<Item = &WorkerId> {
        self.workers.keys()
    }

    /// Number of workers
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Whether no worker exists yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Statistics of every worker
    #[must_use]
    pub fn statistics(&self) -> Vec<IntegrationStatistics> {
        self.workers.values().map(IntegrationLayer::statistics).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use crate::dom::SnapshotBuilder;
    use crate::page::StaticPage;
    use async_trait::async_trait;

    fn layer(config: HealingConfig) -> IntegrationLayer {
        let clock = Arc::new(FakeClock::at_ms(1_700_000_000_000));
        IntegrationLayer::new(WorkerContext::new("w1", config).with_clock(clock))
    }

    fn ui_layer(config: HealingConfig) -> IntegrationLayer {
        let mut layer = layer(config);
        layer.enter_context(ExecutionContext::Ui);
        layer
    }

    fn toolbar_page() -> StaticPage {
        let mut b = SnapshotBuilder::new("https://app.test/docs");
        let bar = b.child(0, "div").attr("role", "toolbar").finish();
        b.child(bar, "button").attr("id", "save").text("Save").finish();
        b.child(bar, "button").attr("id", "discard").text("Discard").finish();
        b.child(bar, "button").attr("id", "share").text("Share").finish();
        StaticPage::new(b.build())
    }

    fn renamed_page() -> StaticPage {
        let mut b = SnapshotBuilder::new("https://app.test/docs");
        b.child(0, "button").attr("id", "save-button").text("Save").finish();
        b.child(0, "button").attr("id", "discard").text("Discard").finish();
        StaticPage::new(b.build())
    }

    struct Fixed {
        name: &'static str,
        locator: Option<&'static str>,
    }

    #[async_trait]
    impl HealingStrategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> f64 {
            9.0
        }

        async fn apply(&self, _page: &dyn PageHandle, _ctx: &HealingContext) -> HealResult<StrategyOutcome> {
            Ok(match self.locator {
                Some(l) => StrategyOutcome::healed(l, 0.9, Duration::from_millis(1)),
                None => StrategyOutcome::failed(Duration::from_millis(1)),
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl HealingStrategy for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn priority(&self) -> f64 {
            20.0
        }

        async fn apply(&self, _page: &dyn PageHandle, _ctx: &HealingContext) -> HealResult<StrategyOutcome> {
            Err(HealError::page("tab crashed"))
        }
    }

    mod gate_tests {
        use super::*;

        #[test]
        fn test_description_classified_without_step() {
            let layer = layer(HealingConfig::default());
            assert!(layer.is_ai_allowed(Some("click the login button")));
            assert!(!layer.is_ai_allowed(Some("insert a row into the users table")));
            assert!(!layer.is_ai_allowed(None));
        }

        #[test]
        fn test_step_context_wins() {
            let mut layer = layer(HealingConfig::default());
            assert_eq!(layer.enter_step("POST to the /users endpoint"), ExecutionContext::Api);
            assert!(!layer.is_ai_allowed(Some("click the login button")));
            layer.exit_step();
            layer.enter_context(ExecutionContext::Ui);
            assert!(layer.is_ai_allowed(None));
        }

        #[test]
        fn test_ui_only_off_and_ai_off() {
            let layer_any = layer(HealingConfig::default().with_ui_only(false));
            assert!(layer_any.is_ai_allowed(None));
            let layer_off = layer(HealingConfig::default().with_ai_enabled(false));
            assert!(!layer_off.is_ai_allowed(Some("click save")));
        }

        #[tokio::test]
        async fn test_identification_gated_in_database_step() {
            let mut layer = layer(HealingConfig::default());
            layer.enter_step("select name from customers");
            assert!(layer.identify_element("click the save button", &toolbar_page()).await.is_none());
        }
    }

    mod identify_tests {
        use super::*;

        #[tokio::test]
        async fn test_identification_is_recorded_in_ledger() {
            let mut layer = ui_layer(HealingConfig::default());
            let found = layer
                .identify_element("click the save button", &toolbar_page())
                .await
                .unwrap();
            assert_eq!(layer.ledger().len(), 1);
            let entry = layer.ledger().entries().next().unwrap();
            assert_eq!(entry.healed_locator.as_deref(), Some(found.locator.as_str()));
            assert_eq!(entry.context.url.as_deref(), Some("https://app.test/docs"));
            assert_eq!(layer.export().ledger.entries.len(), 1);
        }

        #[tokio::test]
        async fn test_recorded_operations_respect_capacity() {
            let mut layer = ui_layer(HealingConfig::default().with_history_max_entries(3));
            for _ in 0..5 {
                layer.identify_element("click the save button", &toolbar_page()).await;
            }
            assert_eq!(layer.ledger().len(), 3);
            assert_eq!(layer.statistics().ai.identifications, 3);
        }
    }

    mod heal_tests {
        use super::*;

        #[tokio::test]
        async fn test_heals_with_ai_identification() {
            let mut layer = layer(HealingConfig::default());
            let request = HealRequest::new("#save-btn", "Element not found: #save-btn")
                .with_description("click the save button");
            let result = layer.heal(&request, &toolbar_page()).await;
            assert!(result.success);
            assert_eq!(result.healed_locator.as_deref(), Some("#save"));
            assert_eq!(result.strategy.as_deref(), Some(AI_IDENTIFICATION));
            assert_eq!(result.attempts, 1);
            let stats = layer.ledger().statistics();
            assert_eq!(stats.by_operation.get("failure_analysis"), Some(&1));
            assert_eq!(stats.by_operation.get("identification"), Some(&1));
            assert_eq!(stats.healing_attempts, 1);
            let heal = layer.ledger().entries().last().unwrap();
            assert_eq!(heal.context.url.as_deref(), Some("https://app.test/docs"));
            assert!(layer.ledger().fragile_element("#save-btn").is_some());
        }

        #[tokio::test]
        async fn test_falls_back_to_registered_strategies() {
            let mut layer = ui_layer(HealingConfig::default());
            let request = HealRequest::new("#save-btn", "Element not found: #save-btn");
            let result = layer.heal(&request, &renamed_page()).await;
            assert!(result.success);
            assert_eq!(result.strategy.as_deref(), Some("attribute-fallback"));
            assert_eq!(result.healed_locator.as_deref(), Some("#save-button"));
            assert_eq!(result.attempts, 2);
            assert_eq!(layer.ledger().statistics().healing_attempts, 2);
        }

        #[tokio::test]
        async fn test_unhealable_failure_is_recorded() {
            let mut layer = layer(HealingConfig::default());
            let request = HealRequest::new("#save", "net::ERR_CONNECTION_REFUSED")
                .with_description("click the save button");
            let result = layer.heal(&request, &toolbar_page()).await;
            assert!(!result.success);
            assert_eq!(result.attempts, 0);
            assert!(!result.analysis.healable);
            assert_eq!(layer.ledger().len(), 1);
            assert!(layer.ledger().strategies().is_empty());
        }

        #[tokio::test]
        async fn test_attempts_are_capped_and_errors_absorbed() {
            let mut layer = ui_layer(HealingConfig::default().with_max_healing_attempts(2));
            layer.register_strategy(Box::new(Broken));
            layer.register_strategy(Box::new(Fixed {
                name: "fixed-miss",
                locator: None,
            }));
            let request = HealRequest::new(".gone", "Element not found: .gone");
            let result = layer.heal(&request, &toolbar_page()).await;
            assert!(!result.success);
            assert_eq!(result.attempts, 2);
            let broken = layer.ledger().strategy_effectiveness("broken").unwrap();
            assert_eq!(broken.failures, 1);
            assert!(layer.optimizer().base_priority("broken") < 20.0);
        }

        #[tokio::test]
        async fn test_failing_identification_is_demoted_below_registered_strategy() {
            let mut layer = ui_layer(HealingConfig::default());
            layer.register_strategy(Box::new(Fixed {
                name: "fixed",
                locator: Some("#save-document"),
            }));
            let request = HealRequest::new("#old-save", "Element not found: #old-save");

            let first = layer.heal(&request, &toolbar_page()).await;
            assert_eq!(first.attempts, 2);
            assert_eq!(first.strategy.as_deref(), Some("fixed"));
            assert!(layer.optimizer().base_priority(AI_IDENTIFICATION) < AI_IDENTIFICATION_PRIORITY);

            let second = layer.heal(&request, &toolbar_page()).await;
            assert_eq!(second.attempts, 1);
            assert_eq!(second.strategy.as_deref(), Some("fixed"));
            let ai = layer.ledger().strategy_effectiveness(AI_IDENTIFICATION).unwrap();
            assert_eq!(ai.attempts, 1);
        }

        #[tokio::test]
        async fn test_identification_skipped_when_not_suggested() {
            let mut layer = ui_layer(HealingConfig::default());
            let request = HealRequest::new("#save", "Element click intercepted: modal overlay");
            let result = layer.heal(&request, &toolbar_page()).await;
            assert_eq!(result.analysis.failure_type, crate::failure::FailureType::ModalBlocking);
            assert!(layer.ledger().strategy_effectiveness(AI_IDENTIFICATION).is_none());
        }

        #[tokio::test]
        async fn test_gated_heal_does_nothing() {
            let mut layer = layer(HealingConfig::default());
            layer.enter_step("GET /api/orders returns 200");
            let request = HealRequest::new("#save", "Element not found")
                .with_description("click the save button");
            let result = layer.heal(&request, &toolbar_page()).await;
            assert!(!result.success);
            assert_eq!(result.attempts, 0);
            assert!(layer.ledger().is_empty());
        }
    }

    mod prediction_tests {
        use super::*;

        #[tokio::test]
        async fn test_predicts_after_repeated_heals() {
            let mut layer = ui_layer(HealingConfig::default().with_predictive_healing(true));
            layer.register_strategy(Box::new(Fixed {
                name: "fixed",
                locator: Some("#save-document"),
            }));
            let request = HealRequest::new("#old-save", "Element not found: #old-save");
            for _ in 0..5 {
                assert!(layer.heal(&request, &toolbar_page()).await.success);
            }
            let prediction = layer.predict("#old-save");
            assert!(prediction.enabled);
            assert!(prediction.will_fail);
            assert_eq!(prediction.suggested_locator.as_deref(), Some("#save-document"));
        }

        #[test]
        fn test_disabled_prediction() {
            let mut layer = layer(HealingConfig::default());
            let prediction = layer.predict("#x");
            assert!(!prediction.enabled);
            assert!(!prediction.will_fail);
            assert!(prediction.fragility.is_none());
        }
    }

    mod snapshot_tests {
        use super::*;

        #[tokio::test]
        async fn test_export_import_and_clear() {
            let mut layer = layer(HealingConfig::default());
            let request = HealRequest::new("#save-btn", "Element not found: #save-btn")
                .with_description("click the save button");
            assert!(layer.heal(&request, &toolbar_page()).await.success);
            let json = serde_json::to_string(&layer.export()).unwrap();

            let mut other = self::layer(HealingConfig::default());
            other.import(serde_json::from_str(&json).unwrap()).unwrap();
            assert_eq!(other.ledger().len(), layer.ledger().len());
            assert_eq!(other.ledger().statistics().healing_attempts, 1);
            assert!(other.optimizer().base_priority(AI_IDENTIFICATION) > AI_IDENTIFICATION_PRIORITY);

            other.clear();
            assert!(other.ledger().is_empty());
            assert!((other.optimizer().base_priority(AI_IDENTIFICATION) - AI_IDENTIFICATION_PRIORITY).abs() < 1e-9);
        }

        #[test]
        fn test_import_rejects_other_versions() {
            let mut layer = layer(HealingConfig::default());
            let mut snapshot = layer.export();
            snapshot.version = 7;
            assert!(layer.import(snapshot).is_err());
        }
    }

    mod registry_tests {
        use super::*;

        #[tokio::test]
        async fn test_workers_are_isolated() {
            let mut registry = IntegrationRegistry::new(HealingConfig::default())
                .with_clock(Arc::new(FakeClock::at_ms(0)));
            let request = HealRequest::new("#save-btn", "Element not found: #save-btn")
                .with_description("click the save button");
            registry.worker("w1").heal(&request, &toolbar_page()).await;
            registry.worker("w2").enter_step("click something");

            assert_eq!(registry.len(), 2);
            assert_eq!(
                registry.get(&WorkerId::from("w1")).unwrap().ledger().statistics().healing_attempts,
                1
            );
            assert!(registry.get(&WorkerId::from("w2")).unwrap().ledger().is_empty());
            assert_eq!(registry.statistics().len(), 2);
            assert!(registry.remove(&WorkerId::from("w1")).is_some());
            assert_eq!(registry.worker_ids().count(), 1);
        }
    }
}
