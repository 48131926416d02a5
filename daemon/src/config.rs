//! Daemon configuration, read from TOML and overridden by CLI flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tangle_ledger::LedgerConfig;
use tangle_types::Melange;
use tangle_utils::LogFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Genesis settings; only used when the node starts a new DAG.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisConfig {
    pub receiver: String,
    #[serde(default = "default_genesis_subject")]
    pub subject: String,
    pub currency: u64,
    #[serde(default)]
    pub supplementary: u64,
}

impl GenesisConfig {
    pub fn spice(&self) -> Melange {
        Melange::new(self.currency, self.supplementary)
    }
}

fn default_genesis_subject() -> String {
    "genesis".into()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base directory for stores whose path is left empty. `None` keeps
    /// such stores in memory.
    pub data_dir: Option<PathBuf>,
    /// Hex-encoded 32-byte Ed25519 seed of the node key.
    pub node_seed: Option<String>,
    pub log_format: LogFormat,
    pub log_level: String,
    pub genesis: Option<GenesisConfig>,
    pub ledger: LedgerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            node_seed: None,
            log_format: LogFormat::Human,
            log_level: "info".into(),
            genesis: None,
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Ledger settings with empty store paths placed under `data_dir`.
    pub fn resolved_ledger(&self) -> LedgerConfig {
        let mut ledger = self.ledger.clone();
        let Some(dir) = &self.data_dir else {
            return ledger;
        };
        for (path, name) in [
            (&mut ledger.trusted_nodes_db_path, "trusted_nodes"),
            (&mut ledger.trxs_to_vertices_db_path, "trxs_to_vertices"),
            (&mut ledger.vertices_db_path, "vertices"),
        ] {
            if path.is_empty() {
                *path = dir.join(name).to_string_lossy().into_owned();
            }
        }
        if ledger.backup_dir.is_none() {
            ledger.backup_dir = Some(dir.join("backups"));
        }
        ledger
    }
}
