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
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::ContentDigest;
use crate::ledger::{check_record, Ledger, VerificationIssue, VerificationReport, VerifyPolicy};
use crate::lineage::LineageGraph;
use crate::record::ProvenanceRecord;
use crate::{ProvenanceError, Result};

/// Current bundle envelope version.
pub const BUNDLE_VERSION: u16 = 1;

/// Portable provenance for one asset: its records plus those of every ancestor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceBundle {
    /// Envelope version.
    pub format_version: u16,
    /// Asset the bundle was exported for.
    pub asset: String,
    /// Export time.
    pub exported_at: DateTime<Utc>,
    /// Ledger head hash at export time.
    pub ledger_head: String,
    /// Records ordered by sequence.
    pub records: Vec<ProvenanceRecord>,
}

impl Ledger {
    /// Export the history of `asset` and of all its ancestors.
    pub fn export_bundle(&self, asset: &str) -> Result<ProvenanceBundle> {
        if self.latest(asset).is_none() {
            return Err(ProvenanceError::UnknownAsset(asset.to_owned()));
        }
        let lineage = LineageGraph::from_records(self.records());
        let mut members: HashSet<String> = lineage.ancestors(asset)?.into_iter().collect();
        members.insert(asset.to_owned());

        let records = self
            .records()
            .iter()
            .filter(|record| members.contains(&record.asset))
            .cloned()
            .collect();

        Ok(ProvenanceBundle {
            format_version: BUNDLE_VERSION,
            asset: asset.to_owned(),
            exported_at: Utc::now(),
            ledger_head: self.head_hash().to_owned(),
            records,
        })
    }
}

impl ProvenanceBundle {
    /// Check every record's hash and signature, and that every parent is present.
    ///
    /// Chain links are not checked: a bundle is a sparse subset of the ledger.
    pub fn verify(&self, policy: &VerifyPolicy) -> VerificationReport {
        let mut issues = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        for record in &self.records {
            check_record(record, policy, &mut issues);
            for parent in &record.parents {
                if !seen.contains(parent.as_str()) {
                    issues.push(VerificationIssue::UnknownParent {
                        sequence: record.sequence,
                        parent: parent.clone(),
                    });
                }
            }
            seen.insert(record.asset.as_str());
        }
        VerificationReport {
            records_checked: self.records.len(),
            issues,
        }
    }

    /// Latest record for the exported asset.
    pub fn latest(&self) -> Option<&ProvenanceRecord> {
        self.records
            .iter()
            .rev()
            .find(|record| record.asset == self.asset)
    }

    /// True when the asset's latest recorded content equals `digest`.
    pub fn matches(&self, digest: &ContentDigest) -> bool {
        self.latest()
            .map(|record| &record.digest == digest)
            .unwrap_or(false)
    }

    /// Write the bundle as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Read a bundle written by [`ProvenanceBundle::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let bundle: ProvenanceBundle = serde_json::from_slice(&fs::read(path)?)?;
        if bundle.format_version != BUNDLE_VERSION {
            return Err(ProvenanceError::Store(format!(
                "unsupported bundle version {}",
                bundle.format_version
            )));
        }
        Ok(bundle)
    }
}
