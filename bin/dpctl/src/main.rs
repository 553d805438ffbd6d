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

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dp_common::config::AppConfig;
use dp_common::logging;
use dp_core::ContentDigest;

mod keys;
mod ledger;

const DEFAULT_CONFIG_CANDIDATES: [&str; 2] = ["dp.toml", "configs/dp.toml"];

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Digital provenance ledger control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        global = true,
        help = "Configuration file (defaults to DP_CONFIG, then ./dp.toml)"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Print the content digest of a file or directory")]
    Digest { path: PathBuf },
    #[command(flatten)]
    Ledger(ledger::LedgerCommand),
    #[command(subcommand, about = "Signing key management")]
    Keys(keys::KeysCommand),
}

fn load_config(explicit: Option<PathBuf>) -> Result<AppConfig> {
    match explicit {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("unable to load configuration {}", path.display())),
        None => Ok(AppConfig::load_or_default(&DEFAULT_CONFIG_CANDIDATES)?.config),
    }
}

fn init_logging(config: &AppConfig) -> Result<()> {
    match &config.logging {
        Some(settings) => logging::init_tracing("dpctl", settings).with_context(|| {
            format!(
                "unable to set up logging in {}",
                settings.directory.display()
            )
        }),
        None => {
            logging::init();
            Ok(())
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Digest { path } => {
            logging::init();
            println!("{}", ContentDigest::of_path(&path)?);
        }
        Commands::Keys(cmd) => {
            logging::init();
            keys::run(cmd)?;
        }
        Commands::Ledger(cmd) => {
            let config = load_config(cli.config)?;
            init_logging(&config)?;
            ledger::run(cmd, &config)?;
        }
    }
    Ok(())
}
