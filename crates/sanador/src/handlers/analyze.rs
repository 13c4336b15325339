//! Analyze command handler

use crate::error::CliResult;
use crate::output::{percent, Reporter};
use crate::AnalyzeArgs;
use sanar::clock::{Clock, SystemClock};
use sanar::failure::{analyze_failure, DiagnosticsSummary, FailureContext};

/// Diagnostics described by the command line
#[must_use]
pub fn diagnostics_from_args(args: &AnalyzeArgs) -> DiagnosticsSummary {
    DiagnosticsSummary {
        console_errors: args.console_errors,
        page_errors: 0,
        network_failures: args.network_failures,
        messages: args.messages.clone(),
    }
}

/// Execute the analyze command
pub async fn execute_analyze(reporter: &Reporter, args: &AnalyzeArgs) -> CliResult<()> {
    let mut ctx =
        FailureContext::new(args.error.clone()).with_diagnostics(diagnostics_from_args(args));
    if let Some(locator) = &args.locator {
        ctx = ctx.with_locator(locator.clone());
    }
    if let Some(description) = &args.description {
        ctx = ctx.with_description(description.clone());
    }
    let analysis = analyze_failure(&ctx, None, SystemClock.now()).await;

    if reporter.json {
        return reporter.emit_json(&analysis);
    }
    reporter.field("failure", analysis.failure_type);
    reporter.field("root cause", &analysis.root_cause);
    reporter.field("healable", analysis.healable);
    reporter.field("confidence", percent(analysis.confidence));
    if !analysis.suggested_strategies.is_empty() {
        reporter.header("Suggested strategies");
        for strategy in &analysis.suggested_strategies {
            reporter.item(strategy);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_from_args() {
        let args = AnalyzeArgs {
            error: "boom".to_string(),
            locator: None,
            description: None,
            console_errors: 3,
            network_failures: 1,
            messages: vec!["fetch failed".to_string()],
        };
        let diagnostics = diagnostics_from_args(&args);
        assert_eq!(diagnostics.console_errors, 3);
        assert_eq!(diagnostics.network_failures, 1);
        assert_eq!(diagnostics.messages, vec!["fetch failed".to_string()]);
    }
}
