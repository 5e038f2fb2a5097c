//! Command-line interface for briefcast.
//!
//! Provides commands for running the pipeline workers, triggering the daily
//! fan-out, and inspecting queue state.

mod commands;

pub use commands::{parse_cli, run, run_with_cli};
