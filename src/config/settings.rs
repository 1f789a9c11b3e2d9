//! Coupler descriptions and logging settings

use crate::core::error::CouplerError;
use crate::core::terminal::{ProcessImage, Terminal};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging settings
    pub logging: LoggingConfig,
    /// Couplers on the network
    pub couplers: Vec<CouplerConfig>,
}

impl Config {
    /// Load config from the platform config directory, or defaults if absent
    pub fn load() -> anyhow::Result<Self> {
        let path = super::config_file().context("Could not determine config directory")?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a file
    pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Save config to a file
    pub fn save_to(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Find a coupler section by name
    pub fn coupler(&self, name: &str) -> Option<&CouplerConfig> {
        self.couplers.iter().find(|c| c.name == name)
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Install the global tracing subscriber
    pub fn init(&self) -> anyhow::Result<()> {
        let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&self.level))?;
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        let result = if self.json {
            builder.json().try_init()
        } else {
            builder.try_init()
        };
        result.map_err(|e| anyhow::anyhow!("failed to install subscriber: {}", e))
    }
}

/// One coupler and its terminals in wiring order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouplerConfig {
    /// Coupler name
    pub name: String,
    /// Host address, used by the transport factory
    pub host: String,
    /// Modbus TCP port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bus lock budget in milliseconds
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Terminals, first slot first
    #[serde(default)]
    pub terminals: Vec<TerminalConfig>,
}

fn default_port() -> u16 {
    502
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

impl CouplerConfig {
    /// Create a coupler section with default port and timeout
    pub fn new(name: &str, host: &str) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port: default_port(),
            lock_timeout_ms: default_lock_timeout_ms(),
            terminals: Vec::new(),
        }
    }

    /// Append a terminal
    #[must_use]
    pub fn terminal(mut self, name: &str, model: u16) -> Self {
        self.terminals.push(TerminalConfig {
            name: name.to_string(),
            model,
        });
        self
    }

    /// Bus lock budget
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Build terminal descriptors, assigning slots and input offsets
    pub fn terminals(&self) -> Result<Vec<Terminal>, CouplerError> {
        let mut image = ProcessImage::new();
        for terminal in &self.terminals {
            image.push(&terminal.name, terminal.model).map_err(|e| {
                CouplerError::Config(format!("{}: terminal {}: {}", self.name, terminal.name, e))
            })?;
        }
        Ok(image.into_terminals())
    }
}

/// One terminal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Terminal name
    pub name: String,
    /// Model identifier, e.g. 5001
    pub model: u16,
}
