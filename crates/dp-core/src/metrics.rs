//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use prometheus::{IntCounter, Registry};
use std::sync::Arc;

use crate::Result;

/// Provenance metrics exported via Prometheus.
#[derive(Clone)]
pub struct ProvenanceMetrics {
    registry: Arc<Registry>,
    records_appended_total: IntCounter,
    verifications_total: IntCounter,
    verification_failures_total: IntCounter,
    signatures_created_total: IntCounter,
}

impl std::fmt::Debug for ProvenanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceMetrics")
            .field("records_appended_total", &self.records_appended_total.get())
            .field("verifications_total", &self.verifications_total.get())
            .finish()
    }
}

impl ProvenanceMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> Result<Self> {
        let records_appended_total = IntCounter::new(
            "provenance_records_appended_total",
            "Records appended to the provenance ledger",
        )?;
        let verifications_total = IntCounter::new(
            "provenance_verifications_total",
            "Ledger verification passes",
        )?;
        let verification_failures_total = IntCounter::new(
            "provenance_verification_failures_total",
            "Verification passes that found at least one issue",
        )?;
        let signatures_created_total = IntCounter::new(
            "provenance_signatures_created_total",
            "Records signed on append",
        )?;

        registry.register(Box::new(records_appended_total.clone()))?;
        registry.register(Box::new(verifications_total.clone()))?;
        registry.register(Box::new(verification_failures_total.clone()))?;
        registry.register(Box::new(signatures_created_total.clone()))?;

        Ok(Self {
            registry,
            records_appended_total,
            verifications_total,
            verification_failures_total,
            signatures_created_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count an appended record, and its signature when present.
    pub fn record_appended(&self, signed: bool) {
        self.records_appended_total.inc();
        if signed {
            self.signatures_created_total.inc();
        }
    }

    /// Count a verification pass and whether it failed.
    pub fn verification(&self, intact: bool) {
        self.verifications_total.inc();
        if !intact {
            self.verification_failures_total.inc();
        }
    }

    /// Total appended records.
    pub fn records_appended(&self) -> u64 {
        self.records_appended_total.get()
    }

    /// Total failed verification passes.
    pub fn verification_failures(&self) -> u64 {
        self.verification_failures_total.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_increment() {
        let registry = Arc::new(Registry::new());
        let metrics = ProvenanceMetrics::new(registry.clone()).unwrap();
        metrics.record_appended(true);
        metrics.record_appended(false);
        metrics.verification(true);
        metrics.verification(false);
        assert_eq!(metrics.records_appended(), 2);
        assert_eq!(metrics.verification_failures(), 1);
        assert_eq!(registry.gather().len(), 4);
    }

    #[test]
    fn double_registration_fails() {
        let registry = Arc::new(Registry::new());
        ProvenanceMetrics::new(registry.clone()).unwrap();
        assert!(ProvenanceMetrics::new(registry).is_err());
    }
}
