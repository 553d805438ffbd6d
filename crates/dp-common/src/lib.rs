//! ---
//! dp_section: "01-core-functionality"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Shared primitives and utilities for the provenance runtime."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
//! Shared primitives for the digital provenance workspace.
//! This crate exposes configuration loading and logging utilities consumed
//! by the core ledger crate and the control CLI.

pub mod config;
pub mod logging;

pub use config::{AppConfig, LoadedAppConfig, LoggingConfig, ProvenanceConfig};
pub use logging::{init, init_tracing, log_provenance_event, EventOutcome, LogFormat};
