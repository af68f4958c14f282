//! Command-line interface for agent-eval.
//!
//! Provides commands for converting event logs, judging trajectories,
//! running benchmarks locally or remotely, and browsing saved reports.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
