use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::{ModuleConfig, ModuleId, XdpAttachMode};

/// Module configuration loaded from JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network_filter: ModuleConfig,
    #[serde(default)]
    pub scheduler_hook: ModuleConfig,
    #[serde(default)]
    pub filesystem_hook: ModuleConfig,
    #[serde(default)]
    pub xdp_mode: XdpAttachMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network_filter: ModuleConfig::on(),
            scheduler_hook: ModuleConfig::on(),
            filesystem_hook: ModuleConfig::on(),
            xdp_mode: XdpAttachMode::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn module(&self, id: ModuleId) -> &ModuleConfig {
        match id {
            ModuleId::NetworkFilter => &self.network_filter,
            ModuleId::SchedulerHook => &self.scheduler_hook,
            ModuleId::FilesystemHook => &self.filesystem_hook,
        }
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut ModuleConfig {
        match id {
            ModuleId::NetworkFilter => &mut self.network_filter,
            ModuleId::SchedulerHook => &mut self.scheduler_hook,
            ModuleId::FilesystemHook => &mut self.filesystem_hook,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "JSON parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}
