#[macro_use]
extern crate log;

extern crate ushadow_core;
extern crate ushadow_definitions;
extern crate ushadow_filebacked;
extern crate ushadow_settings;

pub use ushadow_definitions::{Error, ErrorKind, Result};

/// Local operator context: the same filebacked stores and deployment
/// manager `ushadowd` uses, loaded directly against a data directory
/// rather than through HTTP (spec.md 7's "CLI-style dev utility").
pub mod context;

/// Append-only JSONL log of mutating commands, kept alongside the data
/// directory for operators auditing what ran when.
pub mod audit;

/// One module per resource group, mirroring `ushadow_leader::routes`.
pub mod commands;
