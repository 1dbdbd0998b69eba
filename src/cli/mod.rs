//! Command-line interface for gradebox.
//!
//! Provides commands for inspecting lesson embeds, resolving exercises,
//! executing submissions, and validating a content tree.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli};
