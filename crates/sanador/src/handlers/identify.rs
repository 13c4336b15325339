//! Identify command handler

use crate::error::{CliError, CliResult};
use crate::output::{percent, Reporter};
use crate::IdentifyArgs;
use sanar::dom::DomSnapshot;
use sanar::{HealingConfig, IntegrationLayer, StaticPage, WorkerContext};
use std::path::Path;
use tracing::debug;

/// Read and validate a serialized DOM snapshot
pub fn load_snapshot(path: &Path) -> CliResult<DomSnapshot> {
    let raw = std::fs::read_to_string(path).map_err(|e| CliError::input(path, e))?;
    let value: serde_json::Value = serde_json::from_str(&raw).map_err(|e| CliError::input(path, e))?;
    DomSnapshot::from_json(value).map_err(|e| CliError::input(path, e))
}

/// Healing configuration from a YAML file, or from the environment
pub fn load_healing_config(path: Option<&Path>) -> CliResult<HealingConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| CliError::input(path, e))?;
            Ok(HealingConfig::from_yaml_str(&raw)?)
        }
        None => Ok(HealingConfig::from_env()?),
    }
}

/// Execute the identify command
pub async fn execute_identify(reporter: &Reporter, args: &IdentifyArgs) -> CliResult<()> {
    let config = load_healing_config(args.config.as_deref())?;
    let snapshot = load_snapshot(&args.page)?;
    debug!(url = %snapshot.url, nodes = snapshot.len(), "snapshot loaded");
    let page = StaticPage::new(snapshot);

    let mut layer = IntegrationLayer::new(WorkerContext::new("sanador", config));
    if !layer.is_ai_allowed(Some(args.description.as_str())) {
        return Err(CliError::no_match(format!(
            "identification is disabled for {:?}",
            args.description
        )));
    }
    let Some(result) = layer.identify_element(&args.description, &page).await else {
        return Err(CliError::no_match(format!(
            "no element matches {:?}",
            args.description
        )));
    };

    if reporter.json {
        return reporter.emit_json(&result);
    }
    reporter.success(&result.locator);
    reporter.field("confidence", percent(result.confidence));
    reporter.field("method", result.method);
    reporter.field("text", result.features.display_text());
    if let Some(pattern) = &result.pattern {
        reporter.field("pattern", pattern);
    }
    if !result.alternatives.is_empty() {
        reporter.header("Alternatives");
        for alt in &result.alternatives {
            reporter.item(&format!("{} ({}, {})", alt.locator, percent(alt.confidence), alt.method));
        }
    }
    Ok(())
}
