use serde::{Deserialize, Serialize};
use std::{
    env,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::errors::WizardError;

const CONFIG_DIR: &str = "docflow";
const CONFIG_FILE: &str = "config.json";
const TMP_SUFFIX: &str = "tmp";
const API_URL_ENV: &str = "DOCFLOW_API_URL";
const API_TOKEN_ENV: &str = "DOCFLOW_API_TOKEN";

/// Runtime settings shared by every wizard and the HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    /// Quiet interval before a uniqueness/overlap probe is sent.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_locale")]
    pub locale: String,
}

fn default_debounce_ms() -> u64 {
    400
}

fn default_locale() -> String {
    "en-US".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".into(),
            api_token: None,
            debounce_ms: default_debounce_ms(),
            locale: default_locale(),
        }
    }
}

impl Config {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url.trim().to_string();
            }
        }
        if let Ok(token) = env::var(API_TOKEN_ENV) {
            if !token.trim().is_empty() {
                self.api_token = Some(token.trim().to_string());
            }
        }
    }
}

pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, WizardError> {
        let base = dirs::config_dir()
            .ok_or_else(|| WizardError::Config("no configuration directory available".into()))?;
        Self::with_base_dir(base.join(CONFIG_DIR))
    }

    pub fn with_base_dir(base: PathBuf) -> Result<Self, WizardError> {
        fs::create_dir_all(&base)?;
        Ok(Self {
            path: base.join(CONFIG_FILE),
        })
    }

    /// Loads the stored configuration, falling back to defaults when no file exists.
    /// Environment variables take precedence over the file.
    pub fn load(&self) -> Result<Config, WizardError> {
        let mut config = if self.path.exists() {
            let data = fs::read_to_string(&self.path)?;
            serde_json::from_str(&data)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        if config.api_base_url.trim().is_empty() {
            return Err(WizardError::Config("api_base_url cannot be empty".into()));
        }
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<(), WizardError> {
        let json = serde_json::to_string_pretty(config)?;
        let tmp = tmp_path(&self.path);
        write_atomic(&tmp, &json)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), "configuration saved");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), WizardError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.flush()?;
    Ok(())
}
