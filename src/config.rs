//! ffinvoke Configuration
//!
//! Handles parsing and management of ffinvoke.toml configuration files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::structure::UpdatePolicy;

/// Name of the configuration file searched for by [`InvokerConfig::find_and_load`].
pub const CONFIG_FILE_NAME: &str = "ffinvoke.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching ffinvoke.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct InvokerConfig {
    /// Library lookup
    #[serde(default)]
    pub libraries: LibraryConfig,

    /// Structure synchronization defaults
    #[serde(default)]
    pub structures: StructureConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw call mechanism
    #[serde(default)]
    pub invoker: InvokerSection,
}

impl InvokerConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let config: InvokerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values serde accepts but the invoker cannot honor.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.invoker.backend == Backend::Libffi && !cfg!(feature = "libffi") {
            return Err(ConfigError::Invalid(
                "backend 'libffi' requires building with the libffi feature".to_string(),
            ));
        }
        for (alias, target) in &self.libraries.aliases {
            if alias.is_empty() || target.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "library alias '{}' -> '{}' must not be empty",
                    alias, target
                )));
            }
        }
        Ok(())
    }
}

/// Library lookup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibraryConfig {
    /// Extra directories searched before the platform defaults
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Logical library names mapped to file names or paths
    /// (e.g., `c = "libc.so.6"`)
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

/// Structure synchronization defaults applied to new instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureConfig {
    #[serde(default)]
    pub read_policy: UpdatePolicy,

    #[serde(default)]
    pub write_policy: UpdatePolicy,

    /// Emit a warning when a structure falls back to declaration order
    #[serde(default = "default_true")]
    pub warn_on_declaration_order: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StructureConfig {
    fn default() -> Self {
        Self {
            read_policy: UpdatePolicy::default(),
            write_policy: UpdatePolicy::default(),
            warn_on_declaration_order: true,
        }
    }
}

/// Log output configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Default filter directive when FFINVOKE_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Raw call mechanism selection.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Integer-register arity table (integer, pointer, and address arguments only)
    #[default]
    Register,
    /// libffi call interface (all layouts, including floats and by-value groups)
    Libffi,
}

/// `[invoker]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InvokerSection {
    #[serde(default)]
    pub backend: Backend,
}
