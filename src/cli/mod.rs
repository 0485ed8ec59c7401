//! Command-line interface for mlforge.
//!
//! Provides commands for running the pipeline and inspecting the stage
//! catalog.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
