//! Configuration management.
//!
//! Settings live in `~/.config/deadlock-server-picker/config.json`. A
//! missing or corrupt file yields defaults rather than an error, and saves
//! go through a tempfile-and-rename so a crash never leaves a torn config.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::warn;

use crate::regions;

const CONFIG_DIR_NAME: &str = "deadlock-server-picker";
const CONFIG_FILENAME: &str = "config.json";

/// Firewall backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Auto,
    Iptables,
    Nftables,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Backend::Auto => "auto",
            Backend::Iptables => "iptables",
            Backend::Nftables => "nftables",
        };
        f.write_str(s)
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Backend::Auto),
            "iptables" => Ok(Backend::Iptables),
            "nftables" | "nft" => Ok(Backend::Nftables),
            other => anyhow::bail!("invalid backend '{}' (auto, iptables, nftables)", other),
        }
    }
}

/// User configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Firewall backend (auto, iptables, nftables)
    pub backend: Backend,

    /// Prefix privileged commands with sudo (skipped when already root)
    pub use_sudo: bool,

    /// Flush the rule container when an interactive session exits
    pub auto_reset_on_exit: bool,

    /// Region applied by the `apply` command
    pub default_region: Option<String>,

    /// Ping timeout in seconds
    pub ping_timeout: f64,

    /// Use the clustered server view by default
    pub clustered: bool,

    /// Favorite server codes
    pub favorites: Vec<String>,

    /// Server codes the `apply` command always blocks
    pub always_block: Vec<String>,

    /// Server codes the `apply` command never blocks
    pub never_block: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            use_sudo: true,
            auto_reset_on_exit: true,
            default_region: None,
            ping_timeout: 2.0,
            clustered: false,
            favorites: Vec::new(),
            always_block: Vec::new(),
            never_block: Vec::new(),
        }
    }
}

impl Config {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if !self.ping_timeout.is_finite() || self.ping_timeout <= 0.0 {
            anyhow::bail!(
                "Invalid ping_timeout {}; must be a positive number of seconds",
                self.ping_timeout
            );
        }

        if let Some(region) = &self.default_region {
            if regions::resolve(region).is_none() {
                anyhow::bail!("Unknown default_region '{}'", region);
            }
        }

        Ok(())
    }

    /// Set a field from its string form, for `config set`.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        fn parse_bool(value: &str) -> bool {
            matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
        }
        fn parse_list(value: &str) -> Vec<String> {
            value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        }

        match key {
            "backend" => self.backend = value.parse()?,
            "use_sudo" => self.use_sudo = parse_bool(value),
            "auto_reset_on_exit" => self.auto_reset_on_exit = parse_bool(value),
            "default_region" => {
                self.default_region = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            "ping_timeout" => {
                self.ping_timeout = value
                    .parse()
                    .with_context(|| format!("Invalid ping_timeout '{}'", value))?
            }
            "clustered" => self.clustered = parse_bool(value),
            "favorites" => self.favorites = parse_list(value),
            "always_block" => self.always_block = parse_list(value),
            "never_block" => self.never_block = parse_list(value),
            other => anyhow::bail!(
                "Unknown config key '{}'. Valid keys: backend, use_sudo, \
                 auto_reset_on_exit, default_region, ping_timeout, clustered, \
                 favorites, always_block, never_block",
                other
            ),
        }

        self.validate()
    }
}

/// Loads and saves the configuration file.
pub struct ConfigManager {
    dir: PathBuf,
}

impl ConfigManager {
    pub fn new(custom_dir: Option<&Path>) -> Self {
        let dir = match custom_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_config_dir(),
        };
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILENAME)
    }

    /// Load configuration; missing or unreadable files yield defaults.
    pub fn load(&self) -> Config {
        let path = self.config_path();
        if !path.exists() {
            return Config::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => config,
                Err(err) => {
                    warn!("Ignoring corrupt config {}: {}", path.display(), err);
                    Config::default()
                }
            },
            Err(err) => {
                warn!("Cannot read config {}: {}", path.display(), err);
                Config::default()
            }
        }
    }

    /// Save configuration atomically.
    pub fn save(&self, config: &Config) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create config dir {}", self.dir.display()))?;

        let content = serde_json::to_string_pretty(config).context("Failed to serialize config")?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.dir)
            .context("Failed to create temporary config file")?;
        temp.write_all(content.as_bytes())
            .context("Failed to write config")?;
        temp.flush()?;
        temp.persist(self.config_path())
            .context("Failed to replace config file")?;

        Ok(())
    }
}

fn default_config_dir() -> PathBuf {
    match env::var_os("HOME") {
        Some(home) => Path::new(&home).join(".config").join(CONFIG_DIR_NAME),
        None => PathBuf::from(CONFIG_DIR_NAME),
    }
}
