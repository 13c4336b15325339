//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Sanador: CLI for Sanar - self-healing element location for browser tests
#[derive(Parser, Debug)]
#[command(name = "sanador")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify step text as UI, API or database work
    Classify(ClassifyArgs),

    /// Parse an element description into intent, type and cues
    Parse(ParseArgs),

    /// Identify the element a description refers to in a DOM snapshot
    Identify(IdentifyArgs),

    /// Classify a failed element operation
    Analyze(AnalyzeArgs),

    /// Predict whether a locator is about to break from a healing ledger
    Predict(PredictArgs),

    /// Show the effective healing configuration
    Config(ConfigArgs),
}

/// Arguments for the classify command
#[derive(Parser, Debug)]
pub struct ClassifyArgs {
    /// Step text
    pub text: String,
}

/// Arguments for the parse command
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Element description
    pub description: String,
}

/// Arguments for the identify command
#[derive(Parser, Debug)]
pub struct IdentifyArgs {
    /// DOM snapshot (JSON)
    #[arg(short, long)]
    pub page: PathBuf,

    /// Element description
    pub description: String,

    /// Healing configuration (YAML); defaults to AI_* environment variables
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the analyze command
#[derive(Parser, Debug)]
pub struct AnalyzeArgs {
    /// Driver error message
    pub error: String,

    /// Locator that failed
    #[arg(long)]
    pub locator: Option<String>,

    /// Element description
    #[arg(long)]
    pub description: Option<String>,

    /// Console errors seen around the failure
    #[arg(long, default_value = "0")]
    pub console_errors: usize,

    /// Failed network requests seen around the failure
    #[arg(long, default_value = "0")]
    pub network_failures: usize,

    /// Captured console or network message (repeatable)
    #[arg(long = "message")]
    pub messages: Vec<String>,
}

/// Arguments for the predict command
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Exported healing ledger (JSON)
    #[arg(short, long)]
    pub ledger: PathBuf,

    /// Locator to score
    pub locator: String,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Healing configuration (YAML) instead of AI_* environment variables
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Override a setting (KEY=VALUE, e.g. AI_CONFIDENCE_THRESHOLD=0.8)
    #[arg(short, long)]
    pub set: Vec<String>,

    /// List the recognized keys
    #[arg(long)]
    pub keys: bool,
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod parsing_tests {
        use super::*;

        #[test]
        fn test_global_flags() {
            let cli = Cli::try_parse_from(["sanador", "-vv", "--json", "classify", "click login"])
                .unwrap();
            assert_eq!(cli.verbose, 2);
            assert!(cli.json);
            assert!(matches!(cli.command, Commands::Classify(ref a) if a.text == "click login"));
        }

        #[test]
        fn test_identify_requires_page() {
            assert!(Cli::try_parse_from(["sanador", "identify", "click save"]).is_err());
            let cli = Cli::try_parse_from([
                "sanador",
                "identify",
                "--page",
                "page.json",
                "click save",
            ])
            .unwrap();
            match cli.command {
                Commands::Identify(args) => {
                    assert_eq!(args.page, PathBuf::from("page.json"));
                    assert!(args.config.is_none());
                }
                other => panic!("unexpected command {other:?}"),
            }
        }

        #[test]
        fn test_analyze_diagnostics() {
            let cli = Cli::try_parse_from([
                "sanador",
                "analyze",
                "Element not found",
                "--console-errors",
                "2",
                "--message",
                "TypeError: x is undefined",
                "--message",
                "second",
            ])
            .unwrap();
            match cli.command {
                Commands::Analyze(args) => {
                    assert_eq!(args.console_errors, 2);
                    assert_eq!(args.network_failures, 0);
                    assert_eq!(args.messages.len(), 2);
                }
                other => panic!("unexpected command {other:?}"),
            }
        }

        #[test]
        fn test_config_sets() {
            let cli = Cli::try_parse_from([
                "sanador",
                "config",
                "--set",
                "AI_ENABLED=false",
                "-s",
                "AI_UI_ONLY=false",
            ])
            .unwrap();
            match cli.command {
                Commands::Config(args) => assert_eq!(args.set.len(), 2),
                other => panic!("unexpected command {other:?}"),
            }
        }
    }

    #[test]
    fn test_color_arg_conversion() {
        use crate::config::ColorChoice;
        assert_eq!(ColorChoice::from(ColorArg::Never), ColorChoice::Never);
        assert_eq!(ColorChoice::from(ColorArg::default()), ColorChoice::Auto);
    }
}
