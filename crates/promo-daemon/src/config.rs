//! Configuration file management.
//!
//! `config.toml` lives in the data directory. Every section falls back to
//! its defaults, and the `[[codes]]` list defaults to the two stock codes.
//! The file is written back when the catalog changes outside of it
//! (expired-code removal, admin-created codes).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use promo_core::{CatalogError, DefinitionSink, TaskIntervals};
use promo_types::PromoCodeConfig;

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PROMO_DATA_DIR";

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Complete daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Ledger persistence settings.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Expiry sweeper settings.
    #[serde(default)]
    pub sweeper: SweeperConfig,
    /// Expired-code cleanup settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    /// Advanced settings.
    #[serde(default)]
    pub advanced: AdvancedConfig,
    /// Promo code catalog.
    #[serde(default = "default_codes")]
    pub codes: Vec<PromoCodeConfig>,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Autosave period of both ledgers.
    #[serde(default = "default_autosave_interval")]
    pub autosave_interval_secs: u64,
    /// Revoked grants are kept this long after expiry.
    #[serde(default = "default_retention_days")]
    pub revoked_retention_days: u32,
}

/// Sweeper configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Seconds between sweeps (at least 5).
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_sweep_delay")]
    pub initial_delay_secs: u64,
}

/// Expired-code cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    #[serde(default = "default_code_check_interval")]
    pub expired_code_check_secs: u64,
    #[serde(default = "default_code_check_delay")]
    pub initial_delay_secs: u64,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "trace" | "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions

fn default_autosave_interval() -> u64 {
    300
}

fn default_retention_days() -> u32 {
    30
}

fn default_check_interval() -> u64 {
    60
}

fn default_sweep_delay() -> u64 {
    10
}

fn default_code_check_interval() -> u64 {
    3600
}

fn default_code_check_delay() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_codes() -> Vec<PromoCodeConfig> {
    vec![
        PromoCodeConfig {
            name: "welcome".to_string(),
            max_activations: 100,
            commands: vec!["give @p 363 1".to_string()],
            remove_commands: Vec::new(),
            permissions: vec!["promocode.use".to_string()],
            expiration_days: 30,
            expires_at: None,
            is_temporary: false,
            temporary_hours: 0,
        },
        PromoCodeConfig {
            name: "vip1day".to_string(),
            max_activations: 50,
            commands: vec!["addrole @pid VIP".to_string()],
            remove_commands: vec!["removerole @pid VIP".to_string()],
            permissions: vec!["promocode.vip".to_string()],
            expiration_days: 30,
            expires_at: None,
            is_temporary: true,
            temporary_hours: 24,
        },
    ]
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
            sweeper: SweeperConfig::default(),
            maintenance: MaintenanceConfig::default(),
            advanced: AdvancedConfig::default(),
            codes: default_codes(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            autosave_interval_secs: default_autosave_interval(),
            revoked_retention_days: default_retention_days(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: default_check_interval(),
            initial_delay_secs: default_sweep_delay(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            expired_code_check_secs: default_code_check_interval(),
            initial_delay_secs: default_code_check_delay(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl DaemonConfig {
    /// Load configuration from `path`.
    ///
    /// Falls back to defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Periods of the background tasks, raised to their floors.
    pub fn task_intervals(&self) -> TaskIntervals {
        TaskIntervals {
            autosave: Duration::from_secs(self.ledger.autosave_interval_secs),
            sweep: Duration::from_secs(self.sweeper.check_interval_secs),
            sweep_delay: Duration::from_secs(self.sweeper.initial_delay_secs),
            code_check: Duration::from_secs(self.maintenance.expired_code_check_secs),
            code_check_delay: Duration::from_secs(self.maintenance.initial_delay_secs),
        }
        .floored()
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        Self::default_data_dir().join(CONFIG_FILE)
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/PromoCodes")
        }
        #[cfg(target_os = "windows")]
        {
            dirs_fallback("PromoCodes")
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            dirs_fallback(".promo-codes")
        }
    }
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/promo-codes"))
}

/// Writes the catalog into the `[[codes]]` list of a config file, keeping
/// every other section as it is on disk.
pub struct ConfigSink {
    path: PathBuf,
}

impl ConfigSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DefinitionSink for ConfigSink {
    fn save(&self, codes: &[PromoCodeConfig]) -> Result<(), CatalogError> {
        let mut config =
            DaemonConfig::load_from(&self.path).map_err(|e| CatalogError::Sink(e.to_string()))?;
        config.codes = codes.to_vec();
        config
            .save_to(&self.path)
            .map_err(|e| CatalogError::Sink(e.to_string()))?;
        info!(codes = codes.len(), path = %self.path.display(), "promo code catalog saved");
        Ok(())
    }
}
