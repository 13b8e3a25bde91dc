use crate::error::{ModelError, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::RwLock;

const CONFIG_FILENAME: &str = "modelgraph.json";
const DEFAULT_PRIMARY_ATTRIBUTE: &str = "id";
const DEFAULT_LOCALE: &str = "en";

/// Process-wide settings, stored in modelgraph.json
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Name used by `ClassBuilder::primary_key` when no explicit name is given
    #[serde(default = "default_primary_attribute")]
    pub primary_attribute: String,

    /// Wrap `as_json` output in a single key named after the class
    #[serde(default)]
    pub include_root_in_json: bool,

    /// Locale read and written by the plain accessor of localized attributes
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Locales tried, in order, when the current locale has no translation
    #[serde(default)]
    pub locale_fallbacks: Vec<String>,
}

fn default_primary_attribute() -> String {
    DEFAULT_PRIMARY_ATTRIBUTE.to_string()
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_attribute: default_primary_attribute(),
            include_root_in_json: false,
            locale: default_locale(),
            locale_fallbacks: Vec::new(),
        }
    }
}

impl Config {
    /// Load config from the given directory, or return defaults if not found
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join(CONFIG_FILENAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path).map_err(ModelError::Io)?;
        let config: Config =
            serde_json::from_str(&content).map_err(ModelError::Serialization)?;
        Ok(config)
    }

    /// Save config to the given directory
    pub fn save<P: AsRef<Path>>(&self, config_dir: P) -> Result<()> {
        let config_dir = config_dir.as_ref();

        if !config_dir.exists() {
            fs::create_dir_all(config_dir).map_err(ModelError::Io)?;
        }

        let config_path = config_dir.join(CONFIG_FILENAME);
        let content = serde_json::to_string_pretty(self).map_err(ModelError::Serialization)?;
        fs::write(config_path, content).map_err(ModelError::Io)?;
        Ok(())
    }

    /// Locales to try for a localized read: the current one, then the fallbacks.
    pub fn locale_chain(&self) -> Vec<String> {
        let mut chain = vec![self.locale.clone()];
        for locale in &self.locale_fallbacks {
            if !chain.contains(locale) {
                chain.push(locale.clone());
            }
        }
        chain
    }
}

static CURRENT: Lazy<RwLock<Config>> = Lazy::new(|| RwLock::new(Config::default()));

/// Snapshot of the process-wide config.
pub fn current() -> Config {
    CURRENT
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

/// Replace the process-wide config. Meant for application boot.
pub fn set(config: Config) {
    *CURRENT
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
}
