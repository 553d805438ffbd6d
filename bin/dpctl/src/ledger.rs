//! ---
//! dp_section: "05-external-interfaces"
//! dp_subsection: "binary"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Control CLI for recording and verifying digital provenance."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Subcommand;
use dp_common::config::AppConfig;
use dp_core::{
    ContentDigest, DigitalProvenance, ProvenanceAction, ProvenanceBundle, RecordDraft,
    VerificationReport,
};

#[derive(Debug, Subcommand)]
pub enum LedgerCommand {
    #[command(about = "Append a provenance record for a file or directory")]
    Record {
        #[arg(long, help = "Asset name recorded in the ledger")]
        asset: String,
        #[arg(long, help = "Content to fingerprint")]
        path: PathBuf,
        #[arg(long)]
        actor: String,
        #[arg(long, default_value = "created", help = "created, derived, modified, transferred, attested or deleted")]
        action: ProvenanceAction,
        #[arg(long = "parent", help = "Parent asset (repeatable)")]
        parents: Vec<String>,
        #[arg(long = "meta", value_parser = parse_key_value, help = "Metadata entry key=value (repeatable)")]
        metadata: Vec<(String, serde_json::Value)>,
    },
    #[command(about = "Verify the whole ledger; exits non-zero on any issue")]
    Verify,
    #[command(about = "List the records of one asset")]
    History { asset: String },
    #[command(about = "Show ancestors and descendants of an asset")]
    Lineage { asset: String },
    #[command(about = "Write the portable provenance bundle of an asset")]
    Export {
        asset: String,
        #[arg(long)]
        out: PathBuf,
    },
    #[command(about = "Verify a bundle, optionally against current content")]
    CheckBundle {
        bundle: PathBuf,
        #[arg(long, help = "Content that should match the bundle's latest digest")]
        path: Option<PathBuf>,
    },
    #[command(about = "Run the ledger self-check and print ok or failed")]
    Run,
}

fn parse_key_value(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        bail!("metadata key must not be empty");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_owned()));
    Ok((key.trim().to_owned(), value))
}

fn print_report(report: &VerificationReport) {
    println!("records checked: {}", report.records_checked);
    for issue in &report.issues {
        println!("  {issue}");
    }
}

pub fn run(cmd: LedgerCommand, config: &AppConfig) -> Result<()> {
    let provenance = DigitalProvenance::from_config(&config.provenance)?;
    match cmd {
        LedgerCommand::Record {
            asset,
            path,
            actor,
            action,
            parents,
            metadata,
        } => {
            let digest = ContentDigest::of_path(&path)?;
            let mut draft = RecordDraft::new(asset, digest, actor, action)
                .with_metadata(serde_json::Value::Object(metadata.into_iter().collect()));
            for parent in parents {
                draft = draft.with_parent(parent);
            }
            let record = provenance.record(draft)?;
            println!("{} {} {}", record.sequence, record.digest, record.hash);
        }
        LedgerCommand::Verify => {
            let report = provenance.verify();
            print_report(&report);
            if !report.is_intact() {
                bail!("ledger verification failed with {} issue(s)", report.issues.len());
            }
            println!("ledger intact");
        }
        LedgerCommand::History { asset } => {
            let records = provenance.history(&asset);
            if records.is_empty() {
                bail!("no records for asset '{asset}'");
            }
            for record in records {
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    record.sequence,
                    record.timestamp.to_rfc3339(),
                    record.action,
                    record.actor,
                    record.digest
                );
            }
        }
        LedgerCommand::Lineage { asset } => {
            let lineage = provenance.lineage();
            println!("ancestors: {}", lineage.ancestors(&asset)?.join(", "));
            println!("descendants: {}", lineage.descendants(&asset)?.join(", "));
        }
        LedgerCommand::Export { asset, out } => {
            let bundle = provenance.export_bundle(&asset)?;
            bundle.save(&out)?;
            println!("{} records written to {}", bundle.records.len(), out.display());
        }
        LedgerCommand::CheckBundle { bundle, path } => {
            let bundle = ProvenanceBundle::load(&bundle)?;
            let report = provenance.verify_bundle(&bundle);
            print_report(&report);
            if !report.is_intact() {
                bail!("bundle verification failed with {} issue(s)", report.issues.len());
            }
            if let Some(path) = path {
                let digest = ContentDigest::of_path(&path)?;
                if !bundle.matches(&digest) {
                    bail!("{} does not match the bundle for '{}'", path.display(), bundle.asset);
                }
                println!("content matches {digest}");
            }
            println!("bundle intact");
        }
        LedgerCommand::Run => {
            if !provenance.run() {
                println!("failed");
                bail!("provenance self-check failed");
            }
            println!("ok");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_value_parses_json_and_strings() {
        assert_eq!(
            parse_key_value("count=3").unwrap(),
            ("count".to_owned(), serde_json::json!(3))
        );
        assert_eq!(
            parse_key_value("tool=exiftool").unwrap(),
            ("tool".to_owned(), serde_json::json!("exiftool"))
        );
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }
}
