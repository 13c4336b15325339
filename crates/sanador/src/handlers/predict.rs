//! Predict command handler

use crate::error::{CliError, CliResult};
use crate::output::{percent, Reporter};
use crate::PredictArgs;
use sanar::history::{HistoryLedger, LedgerSnapshot};
use sanar::predictive::PredictiveHealer;
use sanar::{HealingConfig, WorkerContext, WorkerSnapshot};
use std::path::Path;

/// Read a ledger export, or the ledger inside a worker export
pub fn load_ledger(path: &Path) -> CliResult<LedgerSnapshot> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::input(path, e))?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| CliError::input(path, e))?;
    if value.get("ledger").is_some() {
        let worker: WorkerSnapshot =
            serde_json::from_value(value).map_err(|e| CliError::input(path, e))?;
        return Ok(worker.ledger);
    }
    serde_json::from_value(value).map_err(|e| CliError::input(path, e))
}

/// Execute the predict command
pub fn execute_predict(reporter: &Reporter, args: &PredictArgs) -> CliResult<()> {
    let snapshot = load_ledger(&args.ledger)?;
    let ctx = WorkerContext::new(
        "sanador",
        HealingConfig::default().with_predictive_healing(true),
    );
    let mut ledger = HistoryLedger::new(snapshot.max_entries.max(1), ctx.clock());
    ledger.import(snapshot)?;
    let mut healer = PredictiveHealer::new(&ctx);
    let Some(score) = healer.fragility(&args.locator, &ledger) else {
        return Err(CliError::config("prediction is disabled"));
    };

    if reporter.json {
        return reporter.emit_json(&score);
    }
    if score.will_fail {
        reporter.failure(&format!("{} is likely to break", score.locator));
    } else {
        reporter.success(&format!("{} looks stable", score.locator));
    }
    reporter.field("fragility", format!("{:.2}", score.score));
    reporter.field("heals", score.heal_count);
    reporter.field("failure rate", percent(score.failure_rate));
    if let Some(days) = score.days_since_last_heal {
        reporter.field("last heal", format!("{days} day(s) ago"));
    }
    if score.will_fail {
        if let Some(locator) = &score.suggested_locator {
            reporter.field("use instead", locator);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sanar::clock::SystemClock;
    use sanar::history::HistoryRecord;
    use std::io::Write;
    use std::sync::Arc;

    fn ledger_json() -> String {
        let mut ledger = HistoryLedger::new(50, Arc::new(SystemClock));
        ledger.record(
            HistoryRecord::healing("save button", "#save", "attribute-fallback")
                .with_healed_locator(Some("#save-v2".to_string()))
                .with_outcome(true, 0.9, 12),
        );
        serde_json::to_string(&ledger.export()).unwrap()
    }

    #[test]
    fn test_load_plain_ledger() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ledger_json().as_bytes()).unwrap();
        let snapshot = load_ledger(file.path()).unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.max_entries, 50);
    }

    #[test]
    fn test_load_ledger_from_worker_export() {
        let layer = sanar::IntegrationLayer::new(WorkerContext::default());
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(serde_json::to_string(&layer.export()).unwrap().as_bytes())
            .unwrap();
        assert!(load_ledger(file.path()).unwrap().entries.is_empty());
    }
}
