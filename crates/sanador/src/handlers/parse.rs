//! Parse command handler

use crate::error::CliResult;
use crate::output::{percent, Reporter};
use crate::ParseArgs;
use sanar::nlp::parse_description;

/// Execute the parse command
pub fn execute_parse(reporter: &Reporter, args: &ParseArgs) -> CliResult<()> {
    let parsed = parse_description(&args.description);
    if reporter.json {
        return reporter.emit_json(&parsed);
    }
    reporter.field("intent", parsed.intent);
    reporter.field("element type", parsed.element_type.as_deref().unwrap_or("-"));
    reporter.field("text", parsed.text_content.as_deref().unwrap_or("-"));
    reporter.field("keywords", parsed.keywords.join(", "));
    reporter.field("roles", parsed.expected_roles.join(", "));
    if !parsed.visual_cues.is_empty() {
        let cues: Vec<&str> = parsed
            .visual_cues
            .colors
            .iter()
            .chain(&parsed.visual_cues.sizes)
            .chain(&parsed.visual_cues.shapes)
            .map(String::as_str)
            .collect();
        reporter.field("visual", cues.join(", "));
    }
    if let Some(purpose) = &parsed.form_context.field_purpose {
        reporter.field("form field", purpose);
    }
    reporter.field("confidence", percent(parsed.confidence));
    Ok(())
}
