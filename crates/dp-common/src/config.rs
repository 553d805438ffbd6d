//! ---
//! dp_section: "01-core-functionality"
//! dp_subsection: "module"
//! dp_type: "source"
//! dp_scope: "code"
//! dp_description: "Shared primitives and utilities for the provenance runtime."
//! dp_version: "v0.0.0-prealpha"
//! dp_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

/// Primary configuration object for the provenance runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provenance: ProvenanceConfig,
    /// File logging; commands log to stderr only when the section is absent.
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no candidate existed and defaults were used.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "DP_CONFIG";

    /// Load configuration from disk, respecting the `DP_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Some(loaded) = Self::try_load(candidates)? {
            return Ok(loaded);
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`AppConfig::load_with_source`] but falls back to defaults when
    /// neither the environment override nor any candidate exists.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        match Self::try_load(candidates)? {
            Some(loaded) => Ok(loaded),
            None => {
                debug!("no configuration file found, using defaults");
                Ok(LoadedAppConfig {
                    config: AppConfig::default(),
                    source: None,
                })
            }
        }
    }

    fn try_load<P: AsRef<Path>>(candidates: &[P]) -> Result<Option<LoadedAppConfig>> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_file(&path)?;
                return Ok(Some(LoadedAppConfig {
                    config,
                    source: Some(path),
                }));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_file(&path)?;
                return Ok(Some(LoadedAppConfig {
                    config,
                    source: Some(path),
                }));
            }
        }
        Ok(None)
    }

    /// Load and validate a specific file, ignoring `DP_CONFIG`.
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.provenance.validate()
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Ledger location, signing key, and verification policy.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvenanceConfig {
    /// NDJSON ledger file. The ledger lives in memory when unset.
    #[serde(default)]
    pub ledger_path: Option<PathBuf>,
    /// File holding the base64 Ed25519 secret used to sign new records.
    #[serde(default)]
    pub signing_key_path: Option<PathBuf>,
    /// Create the signing key file when it does not exist yet.
    #[serde(default)]
    pub generate_key_if_missing: bool,
    /// Treat unsigned records as verification failures.
    #[serde(default)]
    pub require_signatures: bool,
    /// Base64 Ed25519 public keys accepted during verification.
    #[serde(default)]
    pub trusted_keys: Vec<String>,
}

impl ProvenanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.require_signatures
            && self.signing_key_path.is_none()
            && self.trusted_keys.is_empty()
        {
            return Err(anyhow!(
                "require_signatures needs a signing_key_path or at least one trusted key"
            ));
        }
        if self.generate_key_if_missing && self.signing_key_path.is_none() {
            return Err(anyhow!(
                "generate_key_if_missing is set but no signing_key_path is configured"
            ));
        }
        for (index, key) in self.trusted_keys.iter().enumerate() {
            let bytes = BASE64
                .decode(key.trim())
                .with_context(|| format!("trusted key #{index} is not valid base64"))?;
            if bytes.len() != 32 {
                return Err(anyhow!(
                    "trusted key #{index} must decode to 32 bytes, got {}",
                    bytes.len()
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
