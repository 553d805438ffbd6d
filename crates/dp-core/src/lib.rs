//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Tamper-evident provenance tracking for digital assets.
//!
//! Records are chained with SHA-256, optionally signed with Ed25519, and
//! kept in a [`Ledger`] backed by any [`LedgerStore`]. The
//! [`DigitalProvenance`] facade ties the pieces together.

/// Result alias used throughout the provenance crate.
pub type Result<T> = std::result::Result<T, ProvenanceError>;

/// Error type for the provenance subsystem.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// Wrapper for IO errors encountered while reading/writing ledger files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// A record draft violates a ledger rule.
    #[error("invalid record: {0}")]
    InvalidDraft(String),
    /// A draft references a parent asset the ledger has never seen.
    #[error("unknown parent asset '{0}'")]
    UnknownParent(String),
    /// Lookup of an asset that has no records.
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),
    /// Malformed digest string or unreadable content.
    #[error("digest error: {0}")]
    Digest(String),
    /// Key material or signature problems.
    #[error("signature error: {0}")]
    Signature(String),
    /// Corrupt or incompatible ledger storage.
    #[error("store error: {0}")]
    Store(String),
    /// Wrapper for Prometheus metrics registration failures.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub mod bundle;
pub mod digest;
pub mod ledger;
pub mod lineage;
pub mod metrics;
pub mod provenance;
pub mod record;
pub mod signing;
pub mod store;

pub use bundle::ProvenanceBundle;
pub use digest::{ContentDigest, DigestAlgorithm};
pub use ledger::{Ledger, VerificationIssue, VerificationReport, VerifyPolicy};
pub use lineage::LineageGraph;
pub use metrics::ProvenanceMetrics;
pub use provenance::DigitalProvenance;
pub use record::{ProvenanceAction, ProvenanceRecord, RecordDraft, RecordSignature, GENESIS_HASH};
pub use signing::{verify_signature, ProvenanceSigner, TrustedKeys};
pub use store::{FileStore, LedgerStore, MemoryStore};
