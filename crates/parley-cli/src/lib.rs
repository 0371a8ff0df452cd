//! # parley-cli
//!
//! Command-line interface for the Parley listener.
//!
//! ## Commands
//!
//! - `parley start`: serve the HTTP dispatcher until Ctrl-C
//! - `parley check`: report missing prerequisites
//! - `parley config`: print the effective configuration
//! - `parley version`

pub mod commands;

pub use commands::Cli;
