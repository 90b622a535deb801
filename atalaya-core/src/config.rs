//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/atalaya/config.toml`, or from the
//! path in the `ATALAYA_CONFIG` environment variable when set.
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/atalaya/` (~/.config/atalaya/)
//! - State/Logs: `$XDG_STATE_HOME/atalaya/` (~/.local/state/atalaya/)

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Accounts excluded from every report
    #[serde(default)]
    pub exclusions: ExclusionConfig,

    /// Reference dates the engines compare against
    #[serde(default)]
    pub reference: ReferenceConfig,

    /// Content catalog override
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Accounts that never reach a report: internal companies, the data-entry
/// group used for manual QA, and companies hidden from coach tables only.
#[derive(Debug, Clone, Deserialize)]
pub struct ExclusionConfig {
    /// Company names excluded everywhere
    #[serde(default)]
    pub companies: Vec<String>,

    /// Group name reserved for manual data entry, excluded everywhere
    #[serde(default = "default_data_entry_group")]
    pub data_entry_group: String,

    /// Company names additionally excluded from coach reports
    #[serde(default = "default_coach_companies")]
    pub coach_companies: Vec<String>,
}

impl Default for ExclusionConfig {
    fn default() -> Self {
        Self {
            companies: vec![],
            data_entry_group: default_data_entry_group(),
            coach_companies: default_coach_companies(),
        }
    }
}

fn default_data_entry_group() -> String {
    "Data Entry".to_string()
}

fn default_coach_companies() -> Vec<String> {
    vec!["Demos Clientes".to_string()]
}

/// Reference dates for the activity flags
#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    /// Users connecting after this date count as active
    #[serde(default = "default_active_after")]
    pub active_after: NaiveDate,

    /// Connections after this date count for the coach adoption funnel
    #[serde(default = "default_coach_funnel_start")]
    pub coach_funnel_start: NaiveDate,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            active_after: default_active_after(),
            coach_funnel_start: default_coach_funnel_start(),
        }
    }
}

fn default_active_after() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()
}

fn default_coach_funnel_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 28).unwrap()
}

/// Content catalog override
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CatalogConfig {
    /// Path to a catalog TOML file; the embedded catalog is used when unset
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from `ATALAYA_CONFIG` or the default path
    pub fn load() -> Result<Self> {
        if let Ok(env_path) = std::env::var("ATALAYA_CONFIG") {
            return Self::load_from(&PathBuf::from(env_path));
        }

        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/atalaya/config.toml` (~/.config/atalaya/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("atalaya").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/atalaya/` (~/.local/state/atalaya/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("atalaya")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/atalaya/atalaya.log` (~/.local/state/atalaya/atalaya.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("atalaya.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
