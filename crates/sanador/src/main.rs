//! Sanador: command-line interface for self-healing element location
//!
//! ## Usage
//!
//! ```bash
//! sanador classify "the user clicks the login button"
//! sanador parse "type the email into the login form"
//! sanador identify --page page.json "click the save button"
//! sanador analyze "Element not found: #save" --console-errors 2
//! sanador predict --ledger ledger.json "#save"
//! sanador config --set AI_CONFIDENCE_THRESHOLD=0.8
//! ```

use clap::Parser;
use sanador::{handlers, Cli, CliConfig, CliResult, ColorChoice, Commands, Reporter, Verbosity};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_tracing(config.verbosity, cli.log_json);
    let reporter = Reporter::new(&config);

    match cli.command {
        Commands::Classify(args) => handlers::execute_classify(&reporter, &args),
        Commands::Parse(args) => handlers::execute_parse(&reporter, &args),
        Commands::Identify(args) => {
            runtime()?.block_on(handlers::execute_identify(&reporter, &args))
        }
        Commands::Analyze(args) => runtime()?.block_on(handlers::execute_analyze(&reporter, &args)),
        Commands::Predict(args) => handlers::execute_predict(&reporter, &args),
        Commands::Config(args) => handlers::execute_config(&reporter, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let verbosity = if cli.quiet {
        Verbosity::Quiet
    } else {
        match cli.verbose {
            0 => Verbosity::Normal,
            1 => Verbosity::Verbose,
            _ => Verbosity::Debug,
        }
    };
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(verbosity)
        .with_color(color)
        .with_json(cli.json)
}

fn init_tracing(verbosity: Verbosity, json: bool) {
    let filter = EnvFilter::try_from_env("SANADOR_LOG")
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_directive()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
