//! Classify command handler

use crate::error::CliResult;
use crate::output::Reporter;
use crate::ClassifyArgs;
use sanar::context_gate::{ContextDetection, ContextGate};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Classification<'a> {
    text: &'a str,
    #[serde(flatten)]
    detection: ContextDetection,
    healing_allowed: bool,
}

/// Execute the classify command
pub fn execute_classify(reporter: &Reporter, args: &ClassifyArgs) -> CliResult<()> {
    let detection = ContextGate::classify(&args.text);
    let healing_allowed = ContextGate::allows(detection.context);
    if reporter.json {
        return reporter.emit_json(&Classification {
            text: &args.text,
            detection,
            healing_allowed,
        });
    }
    reporter.field("context", detection.context);
    reporter.field("marker", detection.marker.as_deref().unwrap_or("-"));
    reporter.field("healing", if healing_allowed { "allowed" } else { "blocked" });
    Ok(())
}
