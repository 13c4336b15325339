//! Command handlers
//!
//! Each handler owns the execution logic of one command plus the pure
//! helpers it needs, so they can be tested without spawning the binary.

pub mod analyze;
pub mod classify;
pub mod config;
pub mod identify;
pub mod parse;
pub mod predict;

pub use analyze::{diagnostics_from_args, execute_analyze};
pub use classify::execute_classify;
pub use config::{effective_config, execute_config};
pub use identify::{execute_identify, load_healing_config, load_snapshot};
pub use parse::execute_parse;
pub use predict::{execute_predict, load_ledger};
