//! ---
//! dp_section: "02-provenance-ledger"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Provenance ledger, signing, and lineage primitives."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::record::ProvenanceRecord;
use crate::{ProvenanceError, Result};

/// Ledger file format version written in the header line.
pub const LEDGER_VERSION: u16 = 1;
const LEDGER_FORMAT: &str = "dp-ledger";

/// Backing storage for a [`crate::Ledger`].
pub trait LedgerStore: Send + Sync {
    /// Read every persisted record in append order.
    fn load(&self) -> Result<Vec<ProvenanceRecord>>;
    /// Durably append one record.
    fn append(&mut self, record: &ProvenanceRecord) -> Result<()>;
    /// Short human-readable location, used in logs.
    fn describe(&self) -> String;
}

/// Volatile store; contents vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: Vec<ProvenanceRecord>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records, e.g. for replaying an export.
    pub fn with_records(records: Vec<ProvenanceRecord>) -> Self {
        Self { records }
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self) -> Result<Vec<ProvenanceRecord>> {
        Ok(self.records.clone())
    }

    fn append(&mut self, record: &ProvenanceRecord) -> Result<()> {
        self.records.push(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}

/// Header stored as the first line of a ledger file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerHeader {
    format: String,
    version: u16,
    created_at: DateTime<Utc>,
}

impl LedgerHeader {
    fn new() -> Self {
        Self {
            format: LEDGER_FORMAT.to_owned(),
            version: LEDGER_VERSION,
            created_at: Utc::now(),
        }
    }
}

/// Newline-delimited JSON ledger file.
pub struct FileStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore").field("path", &self.path).finish()
    }
}

impl FileStore {
    /// Open a ledger file for appending, writing a header if the file is new.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let fresh = !path.exists() || fs::metadata(path)?.len() == 0;
        if !fresh {
            check_header(path)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);
        if fresh {
            let line = serde_json::to_string(&LedgerHeader::new())?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
            debug!(path = %path.display(), "created ledger file");
        }

        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    /// Location on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn check_header(path: &Path) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut first_line = String::new();
    reader.read_line(&mut first_line)?;
    let header: LedgerHeader = serde_json::from_str(first_line.trim()).map_err(|err| {
        ProvenanceError::Store(format!(
            "{} does not start with a ledger header: {err}",
            path.display()
        ))
    })?;
    if header.format != LEDGER_FORMAT || header.version != LEDGER_VERSION {
        return Err(ProvenanceError::Store(format!(
            "unsupported ledger {} v{} in {}",
            header.format,
            header.version,
            path.display()
        )));
    }
    Ok(())
}

impl LedgerStore for FileStore {
    fn load(&self) -> Result<Vec<ProvenanceRecord>> {
        check_header(&self.path)?;
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate().skip(1) {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ProvenanceRecord = serde_json::from_str(&line).map_err(|err| {
                ProvenanceError::Store(format!(
                    "{} line {}: {err}",
                    self.path.display(),
                    index + 1
                ))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn append(&mut self, record: &ProvenanceRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
