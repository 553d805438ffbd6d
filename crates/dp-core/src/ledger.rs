//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::digest::ContentDigest;
use crate::record::{ProvenanceAction, ProvenanceRecord, RecordDraft, GENESIS_HASH};
use crate::signing::{verify_signature, ProvenanceSigner, TrustedKeys};
use crate::store::{FileStore, LedgerStore, MemoryStore};
use crate::{ProvenanceError, Result};

/// Rules applied by [`Ledger::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyPolicy {
    /// Unsigned records are reported as issues.
    pub require_signatures: bool,
    /// Keys allowed to sign; empty accepts any valid signature.
    pub trusted_keys: TrustedKeys,
}

/// A single integrity problem found during verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationIssue {
    /// Sequence numbers are not contiguous.
    SequenceGap {
        /// Sequence the verifier expected.
        expected: u64,
        /// Sequence actually stored.
        found: u64,
    },
    /// `previous_hash` does not match the preceding record.
    BrokenLink {
        /// Offending record.
        sequence: u64,
    },
    /// Stored hash differs from the recomputed one.
    HashMismatch {
        /// Offending record.
        sequence: u64,
    },
    /// Policy requires a signature and none is attached.
    MissingSignature {
        /// Offending record.
        sequence: u64,
    },
    /// Signature present but does not verify.
    InvalidSignature {
        /// Offending record.
        sequence: u64,
        /// Verifier error text.
        reason: String,
    },
    /// Signature valid but made by a key outside the trusted set.
    UntrustedKey {
        /// Offending record.
        sequence: u64,
    },
    /// A parent asset is not recorded before the child.
    UnknownParent {
        /// Offending record.
        sequence: u64,
        /// Missing parent asset name.
        parent: String,
    },
}

impl fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationIssue::SequenceGap { expected, found } => {
                write!(f, "sequence gap: expected {expected}, found {found}")
            }
            VerificationIssue::BrokenLink { sequence } => {
                write!(f, "record {sequence}: previous hash does not link")
            }
            VerificationIssue::HashMismatch { sequence } => {
                write!(f, "record {sequence}: hash mismatch")
            }
            VerificationIssue::MissingSignature { sequence } => {
                write!(f, "record {sequence}: signature missing")
            }
            VerificationIssue::InvalidSignature { sequence, reason } => {
                write!(f, "record {sequence}: invalid signature ({reason})")
            }
            VerificationIssue::UntrustedKey { sequence } => {
                write!(f, "record {sequence}: signed by an untrusted key")
            }
            VerificationIssue::UnknownParent { sequence, parent } => {
                write!(f, "record {sequence}: unknown parent '{parent}'")
            }
        }
    }
}

/// Outcome of a verification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Records inspected.
    pub records_checked: usize,
    /// Every problem found, in ledger order.
    pub issues: Vec<VerificationIssue>,
}

impl VerificationReport {
    /// True when no issue was found.
    pub fn is_intact(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check hash and signature of one record against the policy.
pub(crate) fn check_record(
    record: &ProvenanceRecord,
    policy: &VerifyPolicy,
    issues: &mut Vec<VerificationIssue>,
) {
    let sequence = record.sequence;
    if !record.hash_is_valid() {
        issues.push(VerificationIssue::HashMismatch { sequence });
    }
    match &record.signature {
        None if policy.require_signatures => {
            issues.push(VerificationIssue::MissingSignature { sequence });
        }
        None => {}
        Some(signature) => match verify_signature(record) {
            Err(err) => issues.push(VerificationIssue::InvalidSignature {
                sequence,
                reason: err.to_string(),
            }),
            Ok(()) if !policy.trusted_keys.allows(&signature.public_key) => {
                issues.push(VerificationIssue::UntrustedKey { sequence });
            }
            Ok(()) => {}
        },
    }
}

/// Append-only, hash-chained sequence of provenance records.
pub struct Ledger {
    store: Box<dyn LedgerStore>,
    records: Vec<ProvenanceRecord>,
}

impl fmt::Debug for Ledger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ledger")
            .field("store", &self.store.describe())
            .field("records", &self.records.len())
            .finish()
    }
}

impl Ledger {
    /// Empty ledger that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            store: Box::new(MemoryStore::new()),
            records: Vec::new(),
        }
    }

    /// Open (or create) a file-backed ledger.
    pub fn open(path: &Path) -> Result<Self> {
        Self::with_store(Box::new(FileStore::open(path)?))
    }

    /// Wrap an arbitrary store, loading its existing records.
    ///
    /// Records are loaded as-is; call [`Ledger::verify`] to check them.
    pub fn with_store(store: Box<dyn LedgerStore>) -> Result<Self> {
        let records = store.load()?;
        debug!(store = %store.describe(), records = records.len(), "ledger loaded");
        Ok(Self { store, records })
    }

    /// All records in append order.
    pub fn records(&self) -> &[ProvenanceRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hash of the latest record, or [`GENESIS_HASH`].
    pub fn head_hash(&self) -> &str {
        self.records
            .last()
            .map(|record| record.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Storage location, for diagnostics.
    pub fn describe(&self) -> String {
        self.store.describe()
    }

    /// Records for one asset, oldest first.
    pub fn history(&self, asset: &str) -> Vec<&ProvenanceRecord> {
        self.records
            .iter()
            .filter(|record| record.asset == asset)
            .collect()
    }

    /// Most recent record for an asset.
    pub fn latest(&self, asset: &str) -> Option<&ProvenanceRecord> {
        self.records.iter().rev().find(|record| record.asset == asset)
    }

    /// Distinct asset names in first-seen order.
    pub fn assets(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .filter(|record| seen.insert(record.asset.as_str()))
            .map(|record| record.asset.as_str())
            .collect()
    }

    /// Records whose content matches `digest`.
    pub fn find_by_digest(&self, digest: &ContentDigest) -> Vec<&ProvenanceRecord> {
        self.records
            .iter()
            .filter(|record| &record.digest == digest)
            .collect()
    }

    fn validate(&self, draft: &RecordDraft) -> Result<()> {
        if draft.asset.trim().is_empty() {
            return Err(ProvenanceError::InvalidDraft("asset name is empty".into()));
        }
        if draft.actor.trim().is_empty() {
            return Err(ProvenanceError::InvalidDraft("actor is empty".into()));
        }
        // NUL separates hashed fields.
        let names = [draft.asset.as_str(), draft.actor.as_str()];
        if let Some(name) = names
            .into_iter()
            .chain(draft.parents.iter().map(String::as_str))
            .find(|name| name.contains('\0'))
        {
            return Err(ProvenanceError::InvalidDraft(format!(
                "name {name:?} contains a NUL byte"
            )));
        }
        if !draft.metadata.is_object() {
            return Err(ProvenanceError::InvalidDraft(
                "metadata must be a JSON object".into(),
            ));
        }

        let mut distinct = HashSet::new();
        for parent in &draft.parents {
            if parent == &draft.asset {
                return Err(ProvenanceError::InvalidDraft(format!(
                    "asset '{parent}' cannot be its own parent"
                )));
            }
            if !distinct.insert(parent.as_str()) {
                return Err(ProvenanceError::InvalidDraft(format!(
                    "parent '{parent}' listed twice"
                )));
            }
            if self.latest(parent).is_none() {
                return Err(ProvenanceError::UnknownParent(parent.clone()));
            }
        }

        match draft.action {
            ProvenanceAction::Created if !draft.parents.is_empty() => {
                return Err(ProvenanceError::InvalidDraft(
                    "created records cannot have parents".into(),
                ));
            }
            ProvenanceAction::Derived if draft.parents.is_empty() => {
                return Err(ProvenanceError::InvalidDraft(
                    "derived records need at least one parent".into(),
                ));
            }
            _ => {}
        }

        if let Some(latest) = self.latest(&draft.asset) {
            if latest.action == ProvenanceAction::Deleted {
                return Err(ProvenanceError::InvalidDraft(format!(
                    "asset '{}' was deleted at record {}",
                    draft.asset, latest.sequence
                )));
            }
        }
        Ok(())
    }

    /// Sequence for the next record. A chain whose numbering is already broken is not extended.
    fn next_sequence(&self) -> Result<u64> {
        let held = self.records.len() as u64;
        if let Some(last) = self.records.last() {
            if last.sequence != held {
                return Err(ProvenanceError::Store(format!(
                    "last record has sequence {} but the ledger holds {held} records",
                    last.sequence
                )));
            }
        }
        held.checked_add(1).ok_or_else(|| {
            ProvenanceError::Store("ledger sequence space exhausted".into())
        })
    }

    /// Validate, link, hash, optionally sign, and persist a new record.
    pub fn append(
        &mut self,
        draft: RecordDraft,
        signer: Option<&ProvenanceSigner>,
    ) -> Result<ProvenanceRecord> {
        self.validate(&draft)?;
        let sequence = self.next_sequence()?;
        let mut record = ProvenanceRecord::from_draft(draft, sequence, self.head_hash());
        if let Some(signer) = signer {
            record.signature = Some(signer.sign(&record));
        }
        self.store.append(&record)?;
        debug!(
            sequence = record.sequence,
            asset = %record.asset,
            action = %record.action,
            "record appended"
        );
        self.records.push(record.clone());
        Ok(record)
    }

    /// Check the whole chain. Every issue is collected rather than stopping at the first.
    pub fn verify(&self, policy: &VerifyPolicy) -> VerificationReport {
        let mut issues = Vec::new();
        let mut previous = GENESIS_HASH;
        let mut known_assets: HashSet<&str> = HashSet::new();

        for (index, record) in self.records.iter().enumerate() {
            let expected = index as u64 + 1;
            if record.sequence != expected {
                issues.push(VerificationIssue::SequenceGap {
                    expected,
                    found: record.sequence,
                });
            }
            if record.previous_hash != previous {
                issues.push(VerificationIssue::BrokenLink {
                    sequence: record.sequence,
                });
            }
            check_record(record, policy, &mut issues);
            for parent in &record.parents {
                if !known_assets.contains(parent.as_str()) {
                    issues.push(VerificationIssue::UnknownParent {
                        sequence: record.sequence,
                        parent: parent.clone(),
                    });
                }
            }
            known_assets.insert(record.asset.as_str());
            previous = record.hash.as_str();
        }

        if !issues.is_empty() {
            warn!(
                store = %self.store.describe(),
                issues = issues.len(),
                "ledger verification found problems"
            );
        }
        VerificationReport {
            records_checked: self.records.len(),
            issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft(asset: &str, action: ProvenanceAction) -> RecordDraft {
        RecordDraft::new(asset, ContentDigest::of_bytes(asset.as_bytes()), "alice", action)
    }

    fn populated() -> Ledger {
        let mut ledger = Ledger::in_memory();
        ledger
            .append(draft("raw.csv", ProvenanceAction::Created), None)
            .unwrap();
        ledger
            .append(
                draft("clean.csv", ProvenanceAction::Derived).with_parent("raw.csv"),
                None,
            )
            .unwrap();
        ledger
            .append(draft("raw.csv", ProvenanceAction::Attested), None)
            .unwrap();
        ledger
    }

    #[test]
    fn append_links_records() {
        let ledger = populated();
        let records = ledger.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].previous_hash, GENESIS_HASH);
        assert_eq!(records[1].previous_hash, records[0].hash);
        assert_eq!(records[2].sequence, 3);
        assert_eq!(ledger.head_hash(), records[2].hash);
        assert!(ledger.verify(&VerifyPolicy::default()).is_intact());
    }

    #[test]
    fn empty_ledger_is_intact() {
        let ledger = Ledger::in_memory();
        assert!(ledger.is_empty());
        assert_eq!(ledger.head_hash(), GENESIS_HASH);
        let report = ledger.verify(&VerifyPolicy::default());
        assert!(report.is_intact());
        assert_eq!(report.records_checked, 0);
    }

    #[test]
    fn queries_follow_append_order() {
        let ledger = populated();
        assert_eq!(ledger.assets(), vec!["raw.csv", "clean.csv"]);
        assert_eq!(ledger.history("raw.csv").len(), 2);
        assert_eq!(
            ledger.latest("raw.csv").unwrap().action,
            ProvenanceAction::Attested
        );
        let digest = ContentDigest::of_bytes(b"clean.csv");
        assert_eq!(ledger.find_by_digest(&digest).len(), 1);
    }

    #[test]
    fn draft_rules_are_enforced() {
        let mut ledger = populated();
        let unknown = ledger.append(
            draft("x", ProvenanceAction::Derived).with_parent("missing"),
            None,
        );
        assert!(matches!(unknown, Err(ProvenanceError::UnknownParent(_))));

        let created_with_parent = ledger.append(
            draft("y", ProvenanceAction::Created).with_parent("raw.csv"),
            None,
        );
        assert!(matches!(created_with_parent, Err(ProvenanceError::InvalidDraft(_))));

        let orphan_derived = ledger.append(draft("z", ProvenanceAction::Derived), None);
        assert!(orphan_derived.is_err());

        let self_parent = ledger.append(
            draft("raw.csv", ProvenanceAction::Modified).with_parent("raw.csv"),
            None,
        );
        assert!(self_parent.is_err());

        let duplicate = ledger.append(
            draft("w", ProvenanceAction::Derived)
                .with_parent("raw.csv")
                .with_parent("raw.csv"),
            None,
        );
        assert!(duplicate.is_err());

        let bad_metadata =
            ledger.append(draft("v", ProvenanceAction::Created).with_metadata(json!([1])), None);
        assert!(bad_metadata.is_err());

        let mut empty_actor = draft("u", ProvenanceAction::Created);
        empty_actor.actor = "  ".into();
        assert!(ledger.append(empty_actor, None).is_err());

        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn deleted_assets_are_frozen() {
        let mut ledger = populated();
        ledger
            .append(draft("clean.csv", ProvenanceAction::Deleted), None)
            .unwrap();
        let err = ledger
            .append(draft("clean.csv", ProvenanceAction::Modified), None)
            .unwrap_err();
        assert!(err.to_string().contains("was deleted"));
    }

    #[test]
    fn tampering_is_reported_per_record() {
        let mut records = populated().records().to_vec();
        records[1].actor = "mallory".into();
        let ledger = Ledger::with_store(Box::new(MemoryStore::with_records(records))).unwrap();
        let report = ledger.verify(&VerifyPolicy::default());
        assert_eq!(
            report.issues,
            vec![VerificationIssue::HashMismatch { sequence: 2 }]
        );
    }

    #[test]
    fn removed_record_breaks_sequence_and_link() {
        let mut records = populated().records().to_vec();
        records.remove(1);
        let ledger = Ledger::with_store(Box::new(MemoryStore::with_records(records))).unwrap();
        let report = ledger.verify(&VerifyPolicy::default());
        assert!(report
            .issues
            .contains(&VerificationIssue::SequenceGap { expected: 2, found: 3 }));
        assert!(report
            .issues
            .contains(&VerificationIssue::BrokenLink { sequence: 3 }));
    }

    #[test]
    fn names_with_nul_bytes_are_rejected() {
        let mut ledger = populated();
        let nul_asset = ledger.append(draft("a\0b", ProvenanceAction::Created), None);
        assert!(matches!(nul_asset, Err(ProvenanceError::InvalidDraft(_))));

        let mut nul_actor = draft("c", ProvenanceAction::Created);
        nul_actor.actor = "bob\0".into();
        assert!(ledger.append(nul_actor, None).is_err());

        let nul_parent = ledger.append(
            draft("d", ProvenanceAction::Derived).with_parent("raw.csv\0clean.csv"),
            None,
        );
        assert!(matches!(nul_parent, Err(ProvenanceError::InvalidDraft(_))));
        assert_eq!(ledger.len(), 3);
    }

    #[test]
    fn append_rejects_out_of_range_sequence() {
        let mut record = populated().records()[0].clone();
        record.sequence = u64::MAX;
        let mut ledger =
            Ledger::with_store(Box::new(MemoryStore::with_records(vec![record]))).unwrap();
        let err = ledger
            .append(draft("next", ProvenanceAction::Created), None)
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::Store(_)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn append_refuses_to_extend_gapped_chain() {
        let mut records = populated().records().to_vec();
        records.remove(1);
        let mut ledger = Ledger::with_store(Box::new(MemoryStore::with_records(records))).unwrap();
        let err = ledger
            .append(draft("later", ProvenanceAction::Created), None)
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::Store(_)));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn altered_signature_is_reported_invalid() {
        let signer = ProvenanceSigner::generate();
        let mut ledger = Ledger::in_memory();
        ledger
            .append(draft("a", ProvenanceAction::Created), Some(&signer))
            .unwrap();
        ledger
            .append(draft("b", ProvenanceAction::Created), Some(&signer))
            .unwrap();

        let mut records = ledger.records().to_vec();
        let other = signer.sign(&records[0]);
        records[1].signature.as_mut().unwrap().signature = other.signature;
        let reloaded = Ledger::with_store(Box::new(MemoryStore::with_records(records))).unwrap();
        let issues = reloaded.verify(&VerifyPolicy::default()).issues;
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            issues[0],
            VerificationIssue::InvalidSignature { sequence: 2, .. }
        ));
    }

    #[test]
    fn signature_policy_is_applied() {
        let signer = ProvenanceSigner::generate();
        let mut ledger = Ledger::in_memory();
        ledger
            .append(draft("a", ProvenanceAction::Created), Some(&signer))
            .unwrap();
        ledger
            .append(draft("b", ProvenanceAction::Created), None)
            .unwrap();

        let strict = VerifyPolicy {
            require_signatures: true,
            trusted_keys: TrustedKeys::default(),
        };
        assert_eq!(
            ledger.verify(&strict).issues,
            vec![VerificationIssue::MissingSignature { sequence: 2 }]
        );

        let mut trusted = TrustedKeys::default();
        trusted.insert_signer(&ProvenanceSigner::generate());
        let pinned = VerifyPolicy {
            require_signatures: false,
            trusted_keys: trusted,
        };
        assert_eq!(
            ledger.verify(&pinned).issues,
            vec![VerificationIssue::UntrustedKey { sequence: 1 }]
        );
    }
}
