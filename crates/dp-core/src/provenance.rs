//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::path::Path;
use std::sync::Arc;

use dp_common::config::ProvenanceConfig;
use dp_common::logging::{log_provenance_event, EventOutcome};
use parking_lot::{RwLock, RwLockReadGuard};
use prometheus::Registry;
use tracing::info;

use crate::bundle::ProvenanceBundle;
use crate::digest::ContentDigest;
use crate::ledger::{Ledger, VerificationReport, VerifyPolicy};
use crate::lineage::LineageGraph;
use crate::metrics::ProvenanceMetrics;
use crate::record::{ProvenanceAction, ProvenanceRecord, RecordDraft};
use crate::signing::{ProvenanceSigner, TrustedKeys};
use crate::Result;

/// Entry point for recording and checking the provenance of digital assets.
///
/// `DigitalProvenance::new()` gives an in-memory ledger with no signing key;
/// [`DigitalProvenance::from_config`] wires in a ledger file, a signing key,
/// and a verification policy. All operations take `&self`, so an instance can
/// be shared across threads behind an `Arc`.
#[derive(Debug)]
pub struct DigitalProvenance {
    ledger: RwLock<Ledger>,
    signer: Option<ProvenanceSigner>,
    policy: VerifyPolicy,
    metrics: ProvenanceMetrics,
}

impl Default for DigitalProvenance {
    fn default() -> Self {
        Self::new()
    }
}

impl DigitalProvenance {
    /// In-memory instance with default policy and its own metrics registry.
    pub fn new() -> Self {
        let metrics = ProvenanceMetrics::new(Arc::new(Registry::new()))
            .expect("fresh registry accepts provenance metrics");
        Self::from_parts(Ledger::in_memory(), None, VerifyPolicy::default(), metrics)
    }

    /// Assemble an instance from already-built components.
    pub fn from_parts(
        ledger: Ledger,
        signer: Option<ProvenanceSigner>,
        policy: VerifyPolicy,
        metrics: ProvenanceMetrics,
    ) -> Self {
        Self {
            ledger: RwLock::new(ledger),
            signer,
            policy,
            metrics,
        }
    }

    /// Build from configuration, registering metrics on a private registry.
    pub fn from_config(config: &ProvenanceConfig) -> Result<Self> {
        Self::from_config_with_registry(config, Arc::new(Registry::new()))
    }

    /// Build from configuration, registering metrics on `registry`.
    pub fn from_config_with_registry(
        config: &ProvenanceConfig,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        let ledger = match &config.ledger_path {
            Some(path) => Ledger::open(path)?,
            None => Ledger::in_memory(),
        };

        let signer = match &config.signing_key_path {
            Some(path) if config.generate_key_if_missing => {
                Some(ProvenanceSigner::load_or_generate(path)?)
            }
            Some(path) => Some(ProvenanceSigner::load(path)?),
            None => None,
        };

        let mut trusted_keys = TrustedKeys::from_base64(&config.trusted_keys)?;
        if let Some(signer) = &signer {
            if !trusted_keys.is_empty() {
                trusted_keys.insert_signer(signer);
            }
        }

        let policy = VerifyPolicy {
            require_signatures: config.require_signatures,
            trusted_keys,
        };
        let metrics = ProvenanceMetrics::new(registry)?;

        info!(
            store = %ledger.describe(),
            records = ledger.len(),
            signer = %signer.as_ref().map(|s| s.fingerprint()).unwrap_or_default(),
            require_signatures = policy.require_signatures,
            "provenance ledger ready"
        );
        Ok(Self::from_parts(ledger, signer, policy, metrics))
    }

    /// Append a record, signing it when a key is configured.
    pub fn record(&self, draft: RecordDraft) -> Result<ProvenanceRecord> {
        let record = self.ledger.write().append(draft, self.signer.as_ref())?;
        self.metrics.record_appended(record.signature.is_some());
        info!(
            sequence = record.sequence,
            asset = %record.asset,
            action = %record.action,
            digest = %record.digest,
            "provenance recorded"
        );
        Ok(record)
    }

    /// Digest the file or directory at `path` and record it.
    pub fn record_path(
        &self,
        asset: &str,
        path: &Path,
        actor: &str,
        action: ProvenanceAction,
    ) -> Result<ProvenanceRecord> {
        let digest = ContentDigest::of_path(path)?;
        self.record(RecordDraft::new(asset, digest, actor, action))
    }

    /// Verify the ledger against the configured policy.
    pub fn verify(&self) -> VerificationReport {
        let report = self.ledger.read().verify(&self.policy);
        self.metrics.verification(report.is_intact());
        report
    }

    /// Full integrity pass; `true` when the ledger is intact.
    pub fn run(&self) -> bool {
        let report = self.verify();
        if report.is_intact() {
            log_provenance_event(
                "ledger.verify",
                &format!("{} records verified", report.records_checked),
                EventOutcome::Success,
            );
        } else {
            let summary = report
                .issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            log_provenance_event("ledger.verify", &summary, EventOutcome::Fault);
        }
        report.is_intact()
    }

    /// Records for one asset, oldest first.
    pub fn history(&self, asset: &str) -> Vec<ProvenanceRecord> {
        self.ledger
            .read()
            .history(asset)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Derivation graph of everything recorded so far.
    pub fn lineage(&self) -> LineageGraph {
        LineageGraph::from_records(self.ledger.read().records())
    }

    /// Export the portable history of `asset`.
    pub fn export_bundle(&self, asset: &str) -> Result<ProvenanceBundle> {
        self.ledger.read().export_bundle(asset)
    }

    /// Verify a bundle against this instance's policy.
    pub fn verify_bundle(&self, bundle: &ProvenanceBundle) -> VerificationReport {
        let report = bundle.verify(&self.policy);
        self.metrics.verification(report.is_intact());
        report
    }

    /// Read access to the underlying ledger.
    pub fn ledger(&self) -> RwLockReadGuard<'_, Ledger> {
        self.ledger.read()
    }

    /// Verification policy in effect.
    pub fn policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    /// Fingerprint of the signing key, if one is configured.
    pub fn signer_fingerprint(&self) -> Option<String> {
        self.signer.as_ref().map(ProvenanceSigner::fingerprint)
    }

    /// Metrics handle.
    pub fn metrics(&self) -> &ProvenanceMetrics {
        &self.metrics
    }
}
