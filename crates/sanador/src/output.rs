//! Output formatting

use crate::config::CliConfig;
use crate::error::CliResult;
use console::{style, Term};
use serde::Serialize;

/// Writes command results as styled text or JSON
#[derive(Debug)]
pub struct Reporter {
    term: Term,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// JSON mode
    pub json: bool,
}

impl Reporter {
    /// Reporter for the given CLI configuration
    #[must_use]
    pub fn new(config: &CliConfig) -> Self {
        Self {
            term: Term::stdout(),
            use_color: config.color.should_color(),
            quiet: config.verbosity.is_quiet(),
            json: config.json,
        }
    }

    fn line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    /// Print `value` as pretty JSON
    pub fn emit_json<T: Serialize>(&self, value: &T) -> CliResult<()> {
        self.line(&serde_json::to_string_pretty(value)?);
        Ok(())
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };
        self.line(&styled);
    }

    /// Print an aligned `key: value` line
    pub fn field(&self, key: &str, value: impl std::fmt::Display) {
        if self.quiet {
            return;
        }
        let label = format!("{key:>14}:");
        let label = if self.use_color {
            style(label).dim().to_string()
        } else {
            label
        };
        self.line(&format!("{label} {value}"));
    }

    /// Print a list entry
    pub fn item(&self, text: &str) {
        if self.quiet {
            return;
        }
        self.line(&format!("  - {text}"));
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }
        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message, even in quiet mode
    pub fn failure(&self, message: &str) {
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        self.line(&format!("{prefix} {message}"));
    }
}

/// Format a confidence in `[0, 1]` as a percentage
#[must_use]
pub fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
