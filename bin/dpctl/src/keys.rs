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

use anyhow::{bail, Result};
use clap::Subcommand;
use dp_core::ProvenanceSigner;

#[derive(Debug, Subcommand)]
pub enum KeysCommand {
    #[command(about = "Generate a new Ed25519 signing key")]
    Generate {
        #[arg(long)]
        out: PathBuf,
        #[arg(long, help = "Overwrite an existing key file")]
        force: bool,
    },
    #[command(about = "Print the public key and fingerprint of a key file")]
    Show { path: PathBuf },
}

pub fn run(cmd: KeysCommand) -> Result<()> {
    match cmd {
        KeysCommand::Generate { out, force } => {
            if out.exists() && !force {
                bail!("{} already exists; pass --force to replace it", out.display());
            }
            let signer = ProvenanceSigner::generate();
            signer.save(&out)?;
            println!("public key: {}", signer.public_key_base64());
            println!("fingerprint: {}", signer.fingerprint());
        }
        KeysCommand::Show { path } => {
            let signer = ProvenanceSigner::load(&path)?;
            println!("public key: {}", signer.public_key_base64());
            println!("fingerprint: {}", signer.fingerprint());
        }
    }
    Ok(())
}
