//! Per-worker context shared by every engine component.
//!
//! Each execution worker builds one [`WorkerContext`] and hands it to every
//! component constructor. Nothing in the engine reads process-wide state.

use crate::clock::{Clock, SystemClock};
use crate::config::HealingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identifier of an execution worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    /// Create a worker id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Configuration and time source owned by one worker
#[derive(Debug, Clone)]
pub struct WorkerContext {
    worker_id: WorkerId,
    config: Arc<HealingConfig>,
    clock: Arc<dyn Clock>,
}

impl WorkerContext {
    /// Create a context using the wall clock
    #[must_use]
    pub fn new(worker_id: impl Into<WorkerId>, config: HealingConfig) -> Self {
        Self {
            worker_id: worker_id.into(),
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Worker identifier
    #[must_use]
    pub fn worker_id(&self) -> &WorkerId {
        &self.worker_id
    }

    /// Engine configuration
    #[must_use]
    pub fn config(&self) -> &HealingConfig {
        &self.config
    }

    /// Shared time source
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new("main", HealingConfig::default())
    }
}
