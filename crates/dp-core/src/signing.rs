//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::collections::BTreeSet;
use std::convert::TryInto;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::record::{ProvenanceRecord, RecordSignature};
use crate::{ProvenanceError, Result};

/// Ed25519 key used to sign records as they are appended.
#[derive(Clone)]
pub struct ProvenanceSigner {
    key: SigningKey,
}

impl std::fmt::Debug for ProvenanceSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvenanceSigner")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl ProvenanceSigner {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self {
            key: SigningKey::from_bytes(&bytes),
        }
    }

    /// Restore a key from its base64 secret.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|err| ProvenanceError::Signature(format!("signing key is not base64: {err}")))?;
        let secret: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            ProvenanceError::Signature(format!(
                "signing key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&secret),
        })
    }

    /// Base64 secret, suitable for [`ProvenanceSigner::from_base64`].
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.key.to_bytes())
    }

    /// Read a key file written by [`ProvenanceSigner::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_base64(&contents)
    }

    /// Write the base64 secret to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, format!("{}\n", self.to_base64()))?;
        info!(path = %path.display(), fingerprint = %self.fingerprint(), "signing key written");
        Ok(())
    }

    /// Load `path`, or generate and save a new key when it does not exist.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let signer = Self::generate();
        signer.save(path)?;
        Ok(signer)
    }

    /// Base64 verifying key.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.key.verifying_key().to_bytes())
    }

    /// SHA-256 fingerprint of the verifying key for audit/logging.
    pub fn fingerprint(&self) -> String {
        fingerprint_of(&self.key.verifying_key().to_bytes())
    }

    /// Sign the record hash.
    pub fn sign(&self, record: &ProvenanceRecord) -> RecordSignature {
        let signature = self.key.sign(record.hash.as_bytes());
        RecordSignature {
            public_key: self.public_key_base64(),
            signature: BASE64.encode(signature.to_bytes()),
        }
    }
}

fn fingerprint_of(public_key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_key);
    hex::encode(hasher.finalize())
}

fn decode_public_key(encoded: &str) -> Result<[u8; 32]> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| ProvenanceError::Signature(format!("public key is not base64: {err}")))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProvenanceError::Signature("invalid public key length".into()))
}

/// Verify the signature attached to a record against its stored hash.
pub fn verify_signature(record: &ProvenanceRecord) -> Result<()> {
    let attached = record
        .signature
        .as_ref()
        .ok_or_else(|| ProvenanceError::Signature("record is not signed".into()))?;
    let key_bytes = decode_public_key(&attached.public_key)?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|err| ProvenanceError::Signature(format!("invalid public key material: {err}")))?;
    let signature_bytes = BASE64
        .decode(attached.signature.trim())
        .map_err(|err| ProvenanceError::Signature(format!("signature is not base64: {err}")))?;
    let signature_array: [u8; 64] = signature_bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProvenanceError::Signature("invalid signature length".into()))?;
    let signature = Signature::from_bytes(&signature_array);

    key.verify_strict(record.hash.as_bytes(), &signature)
        .map_err(|err| ProvenanceError::Signature(format!("signature verification failed: {err}")))
}

/// Public keys accepted during verification. An empty set accepts any key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedKeys {
    keys: BTreeSet<[u8; 32]>,
}

impl TrustedKeys {
    /// Build from base64 verifying keys.
    pub fn from_base64<I, S>(keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut trusted = Self::default();
        for key in keys {
            trusted.keys.insert(decode_public_key(key.as_ref())?);
        }
        Ok(trusted)
    }

    /// Trust the verifying key of `signer`.
    pub fn insert_signer(&mut self, signer: &ProvenanceSigner) {
        self.keys.insert(signer.key.verifying_key().to_bytes());
    }

    /// Number of trusted keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when no key restriction applies.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether a base64 key is acceptable under this set.
    pub fn allows(&self, public_key: &str) -> bool {
        if self.keys.is_empty() {
            return true;
        }
        decode_public_key(public_key)
            .map(|bytes| self.keys.contains(&bytes))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::ContentDigest;
    use crate::record::{ProvenanceAction, RecordDraft, GENESIS_HASH};
    use tempfile::tempdir;

    fn record() -> ProvenanceRecord {
        let draft = RecordDraft::new(
            "model.bin",
            ContentDigest::of_bytes(b"weights"),
            "trainer",
            ProvenanceAction::Created,
        );
        ProvenanceRecord::from_draft(draft, 1, GENESIS_HASH)
    }

    #[test]
    fn signed_record_verifies() {
        let signer = ProvenanceSigner::generate();
        let mut record = record();
        record.signature = Some(signer.sign(&record));
        verify_signature(&record).unwrap();
    }

    #[test]
    fn tampered_hash_fails_verification() {
        let signer = ProvenanceSigner::generate();
        let mut record = record();
        record.signature = Some(signer.sign(&record));
        record.hash = "f".repeat(64);
        let err = verify_signature(&record).unwrap_err();
        assert!(err.to_string().contains("verification failed"));
    }

    #[test]
    fn unsigned_record_is_reported() {
        let err = verify_signature(&record()).unwrap_err();
        assert!(err.to_string().contains("not signed"));
    }

    #[test]
    fn truncated_signature_is_reported() {
        let signer = ProvenanceSigner::generate();
        let mut record = record();
        let mut signature = signer.sign(&record);
        signature.signature = BASE64.encode([1u8; 10]);
        record.signature = Some(signature);
        let err = verify_signature(&record).unwrap_err();
        assert!(err.to_string().contains("invalid signature length"));
    }

    #[test]
    fn key_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys/signing.key");
        let created = ProvenanceSigner::load_or_generate(&path).unwrap();
        let loaded = ProvenanceSigner::load_or_generate(&path).unwrap();
        assert_eq!(created.fingerprint(), loaded.fingerprint());
        assert_eq!(created.fingerprint().len(), 64);
        assert_eq!(created.to_base64().len(), 44);
    }

    #[test]
    fn trusted_keys_restrict_signers() {
        let trusted_signer = ProvenanceSigner::generate();
        let other = ProvenanceSigner::generate();
        let keys = TrustedKeys::from_base64([trusted_signer.public_key_base64()]).unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys.allows(&trusted_signer.public_key_base64()));
        assert!(!keys.allows(&other.public_key_base64()));
        assert!(TrustedKeys::default().allows(&other.public_key_base64()));
    }

    #[test]
    fn malformed_secret_is_rejected() {
        assert!(ProvenanceSigner::from_base64("not base64!").is_err());
        assert!(ProvenanceSigner::from_base64(&BASE64.encode([0u8; 16])).is_err());
    }
}
