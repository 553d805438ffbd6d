//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{AsRefStr, Display, EnumIter, EnumString};
use uuid::Uuid;

use crate::digest::ContentDigest;

/// `previous_hash` of the first record in a ledger.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// What happened to an asset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ProvenanceAction {
    /// First appearance of an asset; no parents allowed.
    Created,
    /// Produced from one or more parent assets.
    Derived,
    /// New content for an existing asset.
    Modified,
    /// Custody moved to another actor.
    Transferred,
    /// A third party vouched for the current content.
    Attested,
    /// Terminal; nothing may be recorded for the asset afterwards.
    Deleted,
}

/// Caller-supplied description of a provenance event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDraft {
    /// Asset name (path, URI, or any stable identifier).
    pub asset: String,
    /// Content fingerprint at the time of the event.
    pub digest: ContentDigest,
    /// Who performed the action.
    pub actor: String,
    /// What was done.
    pub action: ProvenanceAction,
    /// Assets this one was derived from.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Free-form JSON object.
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl RecordDraft {
    /// Draft with no parents and empty metadata.
    pub fn new(
        asset: impl Into<String>,
        digest: ContentDigest,
        actor: impl Into<String>,
        action: ProvenanceAction,
    ) -> Self {
        Self {
            asset: asset.into(),
            digest,
            actor: actor.into(),
            action,
            parents: Vec::new(),
            metadata: empty_object(),
        }
    }

    /// Add a parent asset.
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    /// Replace the metadata object.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Detached Ed25519 signature over a record hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSignature {
    /// Base64 verifying key (32 bytes).
    pub public_key: String,
    /// Base64 signature (64 bytes).
    pub signature: String,
}

/// Entry stored in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// 1-based position in the ledger.
    pub sequence: u64,
    /// Unique record identifier.
    pub id: Uuid,
    /// When the record was appended.
    pub timestamp: DateTime<Utc>,
    /// Asset name.
    pub asset: String,
    /// Content fingerprint.
    pub digest: ContentDigest,
    /// Responsible actor.
    pub actor: String,
    /// Event type.
    pub action: ProvenanceAction,
    /// Parent asset names.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Free-form JSON object.
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
    /// Hash of the preceding record, [`GENESIS_HASH`] for the first one.
    pub previous_hash: String,
    /// SHA-256 over the record fields and `previous_hash`.
    pub hash: String,
    /// Present when the record was signed on append.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<RecordSignature>,
}

impl ProvenanceRecord {
    /// Materialise a draft at a ledger position. The record is hashed but unsigned.
    pub fn from_draft(draft: RecordDraft, sequence: u64, previous_hash: &str) -> Self {
        let mut record = Self {
            sequence,
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            asset: draft.asset,
            digest: draft.digest,
            actor: draft.actor,
            action: draft.action,
            parents: draft.parents,
            metadata: draft.metadata,
            previous_hash: previous_hash.to_owned(),
            hash: String::new(),
            signature: None,
        };
        record.hash = record.compute_hash();
        record
    }

    /// Recompute the hash from the current field values.
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.id.as_bytes());
        hasher.update(
            self.timestamp
                .timestamp_nanos_opt()
                .unwrap_or_default()
                .to_be_bytes(),
        );
        hasher.update(self.asset.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.digest.to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.actor.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.action.as_ref().as_bytes());
        hasher.update([0u8]);
        for parent in &self.parents {
            hasher.update(parent.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.metadata.to_string().as_bytes());
        hasher.update(self.previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// True when the stored hash matches the fields.
    pub fn hash_is_valid(&self) -> bool {
        self.hash == self.compute_hash()
    }
}
