//! Configuration file management for cachesim.
//!
//! Provides a TOML-based config file at `~/.config/cachesim/config.toml` and
//! a resolution chain for the engine: CLI flag > env var > config file >
//! platform default.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cachesim_core::{EngineCommand, Field, RawFields};

/// Environment variable overriding the engine path.
pub const ENGINE_ENV: &str = "CACHESIM_ENGINE";

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub defaults: DefaultsSection,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSection {
    /// Path to the simulation engine executable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Extra arguments passed to the engine.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Seconds before a run is terminated. Absent or 0 means no limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Parameter values used when a flag is omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub instruction_cache_size: u64,
    pub data_cache_size: u64,
    pub line_size: u64,
    pub access_time_cycles: u64,
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            instruction_cache_size: 4096,
            data_cache_size: 4096,
            line_size: 12,
            access_time_cycles: 5,
        }
    }
}

impl DefaultsSection {
    /// Default raw value for a numeric field.
    pub fn raw_value(&self, field: Field) -> Option<String> {
        let value = match field {
            Field::InstructionCacheSize => self.instruction_cache_size,
            Field::DataCacheSize => self.data_cache_size,
            Field::LineSize => self.line_size,
            Field::AccessTimeCycles => self.access_time_cycles,
            Field::AccessSequencePath => return None,
        };
        Some(value.to_string())
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the cachesim config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/cachesim` or
/// `~/.config/cachesim`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("cachesim");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("cachesim")
}

/// Return the path to the cachesim config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load the config file if it exists. A file that exists but does not
/// parse is an error.
pub fn load_config() -> Result<Option<ConfigFile>> {
    let path = config_path();
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))?;
    Ok(Some(config))
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Fully resolved configuration, ready for use.
#[derive(Debug, Clone)]
pub struct CachesimConfig {
    pub engine: EngineCommand,
    pub timeout: Option<Duration>,
    pub defaults: DefaultsSection,
}

impl CachesimConfig {
    /// Resolve configuration from the environment and the config file.
    ///
    /// - Engine: `cli_engine` > `CACHESIM_ENGINE` env > `engine.path` > platform default
    /// - Timeout: `cli_timeout_secs` > `engine.timeout_secs` > none (0 disables)
    pub fn resolve(cli_engine: Option<&str>, cli_timeout_secs: Option<u64>) -> Result<Self> {
        let file = load_config()?;
        let env_engine = std::env::var(ENGINE_ENV).ok();
        Ok(Self::resolve_with(
            file,
            cli_engine,
            env_engine.as_deref(),
            cli_timeout_secs,
        ))
    }

    /// Resolution with every input passed explicitly (testable without env vars).
    pub fn resolve_with(
        file: Option<ConfigFile>,
        cli_engine: Option<&str>,
        env_engine: Option<&str>,
        cli_timeout_secs: Option<u64>,
    ) -> Self {
        let file = file.unwrap_or_default();

        let program = cli_engine
            .or(env_engine.filter(|s| !s.is_empty()))
            .map(str::to_owned)
            .or(file.engine.path)
            .unwrap_or_else(|| EngineCommand::DEFAULT_PROGRAM.to_string());

        let timeout = cli_timeout_secs
            .or(file.engine.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        Self {
            engine: EngineCommand::new(program).args(file.engine.args),
            timeout,
            defaults: file.defaults,
        }
    }

    /// Build raw fields from explicit values, falling back to the defaults.
    pub fn raw_fields(&self, explicit: &[(Field, Option<&str>)], trace: &str) -> RawFields {
        let mut raw = RawFields::new();
        for field in &Field::ALL[..4] {
            let value = explicit
                .iter()
                .find(|(f, _)| f == field)
                .and_then(|(_, v)| v.map(str::to_owned))
                .or_else(|| self.defaults.raw_value(*field));
            if let Some(value) = value {
                raw.insert(field.key().to_string(), value);
            }
        }
        raw.insert(Field::AccessSequencePath.key().to_string(), trace.to_string());
        raw
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
