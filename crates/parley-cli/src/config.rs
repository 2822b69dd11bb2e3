//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Server used when neither the flag nor the config names one
pub const DEFAULT_SERVER: &str = "http://localhost:8000";

/// Configuration for parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL
    pub server: Option<String>,
    /// Model for new conversations
    pub model: Option<String>,
    /// Temperature for new conversations
    pub temperature: Option<f32>,
    /// System message for new conversations
    pub system_message: Option<String>,
    /// Account used for automatic login (password comes from PARLEY_PASSWORD)
    pub email: Option<String>,
    /// JSON model catalog replacing the built-in list
    pub models_file: Option<String>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            server: Some(DEFAULT_SERVER.to_string()),
            model: Some(parley_api::models::DEFAULT_MODEL.to_string()),
            temperature: Some(parley_chat::settings::DEFAULT_TEMPERATURE),
            system_message: None,
            email: None,
            models_file: None,
        };

        default_config.save()?;
        Ok(path)
    }

    /// Server URL, falling back to the default
    pub fn server(&self) -> &str {
        self.server.as_deref().unwrap_or(DEFAULT_SERVER)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# parley configuration file
# Place at ~/.config/parley/config.toml (Linux/Mac) or %APPDATA%\parley\config.toml (Windows)

# Backend base URL
server = "http://localhost:8000"

# Model for new conversations
model = "gpt-4o"

# Temperature for new conversations (0 to 1)
temperature = 0.5

# System message for new conversations (optional)
# system_message = "Answer briefly."

# Log in automatically with this account when PARLEY_PASSWORD is set
# email = "me@example.com"

# Replace the built-in model list (optional)
# models_file = "/etc/parley/models.json"
"#
}
