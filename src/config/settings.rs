use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Cohere's recommended model for tool calling.
pub const DEFAULT_MODEL: &str = "command-r-08-2024";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Returns the path to ~/.taskchat/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskchat")
}

/// Returns the path to ~/.taskchat/config.json
pub fn config_file() -> PathBuf {
    config_dir().join("config.json")
}

pub fn load_config() -> AppConfig {
    let dir = config_dir();
    let file = config_file();

    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }

    if !file.exists() {
        let config = AppConfig::default();
        let _ = save_config(&config);
        return config;
    }

    match fs::read_to_string(&file) {
        Ok(raw) => serde_json::from_str::<AppConfig>(&raw).unwrap_or_default(),
        Err(_) => AppConfig::default(),
    }
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let dir = config_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(config_file(), json)?;
    Ok(())
}

/// The environment variable wins over the config file.
pub fn resolve_api_key(config: &AppConfig) -> Option<String> {
    if let Ok(key) = std::env::var("COHERE_API_KEY") {
        if !key.is_empty() {
            return Some(key);
        }
    }
    if config.api_key.is_empty() {
        None
    } else {
        Some(config.api_key.clone())
    }
}
