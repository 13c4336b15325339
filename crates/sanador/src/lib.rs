//! Sanador CLI Library
//!
//! Command-line front end for the Sanar healing engine: classify step text,
//! parse descriptions, identify elements in saved DOM snapshots, analyze
//! failures and score locator fragility from exported ledgers.

#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

mod commands;
mod config;
mod error;
pub mod handlers;
mod output;

pub use commands::{
    AnalyzeArgs, Cli, ClassifyArgs, ColorArg, Commands, ConfigArgs, IdentifyArgs, ParseArgs,
    PredictArgs,
};
pub use config::{CliConfig, ColorChoice, Verbosity};
pub use error::{CliError, CliResult};
pub use output::{percent, Reporter};
