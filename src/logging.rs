//! Logging infrastructure - structured tracing for call-site builds and dispatch
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the host application, which may call [`init`] for a ready-made one.

use once_cell::sync::OnceCell;
use std::io;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Environment variable holding a filter directive (e.g. `ffinvoke=debug`)
pub const LOG_ENV: &str = "FFINVOKE_LOG";

static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level
    pub level: Level,
    /// Enable JSON format (vs human-readable)
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // FFINVOKE_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level_str) = std::env::var("FFINVOKE_LOG_LEVEL") {
            config.level = parse_level(&level_str);
        }

        config.json_format = std::env::var("FFINVOKE_LOG_JSON").is_ok();
        config
    }

    /// Create config from the `[logging]` section of ffinvoke.toml
    pub fn from_config(section: &LoggingConfig) -> Self {
        Self {
            level: parse_level(&section.level),
            json_format: section.json,
        }
    }
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Initialize logging with configuration taken from the environment
pub fn init() {
    init_with_config(LogConfig::from_env());
}

/// Initialize logging with custom configuration.
///
/// Only the first call installs a subscriber; later calls are ignored, as is
/// the case where the host already installed its own global subscriber.
pub fn init_with_config(config: LogConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
            EnvFilter::new(format!("ffinvoke={}", config.level.as_str().to_lowercase()))
        });

        let registry = tracing_subscriber::registry().with(env_filter);
        let result = if config.json_format {
            registry
                .with(fmt::layer().json().with_writer(io::stderr).with_target(true))
                .try_init()
        } else {
            registry
                .with(
                    fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(true)
                        .with_thread_ids(cfg!(debug_assertions)),
                )
                .try_init()
        };

        if result.is_err() {
            tracing::debug!("global subscriber already installed, keeping it");
        }
    });
}

/// Check whether [`init`] or [`init_with_config`] already ran
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}
