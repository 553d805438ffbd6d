//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::{ProvenanceError, Result};

const READ_BUFFER: usize = 8 * 1024;

/// Hash algorithm used for content fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    /// SHA-256, rendered as lowercase hex.
    Sha256,
}

impl DigestAlgorithm {
    /// Prefix used in the `algorithm:hex` form.
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
        }
    }
}

/// Fingerprint of an asset's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest {
    /// Algorithm that produced `value`.
    pub algorithm: DigestAlgorithm,
    /// Lowercase hex digest.
    pub value: String,
}

impl ContentDigest {
    fn from_hasher(hasher: Sha256) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            value: hex::encode(hasher.finalize()),
        }
    }

    /// Digest an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self::from_hasher(hasher)
    }

    /// Digest a stream without buffering it whole.
    pub fn of_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; READ_BUFFER];
        loop {
            let read = reader.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(Self::from_hasher(hasher))
    }

    /// Digest a single file.
    pub fn of_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::of_reader(BufReader::new(file))
    }

    /// Digest a directory tree.
    ///
    /// Files are visited in relative-path order and each contributes
    /// `path \0 file-digest \n`, so renames change the digest as well as
    /// content edits. Symlinks are not followed.
    pub fn of_directory(path: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in WalkDir::new(path).follow_links(false) {
            let entry = entry.map_err(|err| ProvenanceError::Digest(err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(path)
                .map_err(|err| ProvenanceError::Digest(err.to_string()))?
                .to_string_lossy()
                .replace('\\', "/");
            files.push((relative, entry.path().to_path_buf()));
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut hasher = Sha256::new();
        for (relative, full) in files {
            let digest = Self::of_file(&full)?;
            hasher.update(relative.as_bytes());
            hasher.update([0u8]);
            hasher.update(digest.value.as_bytes());
            hasher.update(b"\n");
        }
        Ok(Self::from_hasher(hasher))
    }

    /// Digest a file or directory, whichever `path` points at.
    pub fn of_path(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            Self::of_directory(path)
        } else {
            Self::of_file(path)
        }
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.as_str(), self.value)
    }
}

impl FromStr for ContentDigest {
    type Err = ProvenanceError;

    fn from_str(s: &str) -> Result<Self> {
        let (algorithm, value) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| ProvenanceError::Digest(format!("missing algorithm prefix in '{s}'")))?;
        let algorithm = match algorithm {
            "sha256" => DigestAlgorithm::Sha256,
            other => {
                return Err(ProvenanceError::Digest(format!(
                    "unsupported digest algorithm '{other}'"
                )))
            }
        };
        if value.len() != 64 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ProvenanceError::Digest(format!(
                "expected 64 hex characters, got '{value}'"
            )));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }
}
