//! Application configuration from file and environment variables
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (prefixed with AGORA_, sections split by `__`)
//! 2. Config file (agora.toml)
//! 3. Default values
//!
//! Secrets like the database password and the classifier API key should be
//! kept in environment variables, not in the config file.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Global application configuration
pub static APP_CONFIG: Lazy<RwLock<AppConfig>> = Lazy::new(|| {
    RwLock::new(AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config file, using defaults: {}", e);
        AppConfig::default()
    }))
});

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Connection URL (should be in env var AGORA_DATABASE__URL or DATABASE_URL)
    pub url: String,
    /// Create missing tables and default roles on startup
    pub create_schema: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            create_schema: false,
        }
    }
}

/// Moderation gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Classifier backend: "openai", or "static" for local development only
    pub backend: String,
    /// Base URL of an OpenAI-compatible API
    pub endpoint: String,
    /// Model used for classification
    pub model: String,
    /// API key (should be in env var AGORA_MODERATION__API_KEY or OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: String,
    /// Upper bound for one classifier call, in seconds
    pub timeout_seconds: u64,
    /// Titles are cut to this many characters before classification
    pub max_title_chars: usize,
    /// Bodies are cut to this many characters before classification
    pub max_body_chars: usize,
    /// Extra profanity terms, merged with the database word filters
    pub profanity_terms: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: String::new(),
            timeout_seconds: 20,
            max_title_chars: 4000,
            max_body_chars: 20000,
            profanity_terms: Vec::new(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for thumbnails, uploads and staged files
    pub local_path: String,
    /// Maximum image upload size in MB
    pub max_image_size_mb: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: "./static".to_string(),
            max_image_size_mb: 10,
        }
    }
}

impl StorageConfig {
    pub fn max_image_bytes(&self) -> usize {
        self.max_image_size_mb as usize * 1024 * 1024
    }
}

/// Opinion poll configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Voting window for new polls when none is requested, in seconds
    pub default_duration_seconds: i64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_duration_seconds: crate::poll::DEFAULT_DURATION_SECONDS,
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub moderation: ModerationConfig,
    pub storage: StorageConfig,
    pub polls: PollConfig,
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("agora.toml")
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &str) -> Result<Self, ConfigError> {
        use config::FileFormat;

        let config = Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(File::new(path, FileFormat::Toml).required(false))
            // e.g., AGORA_MODERATION__TIMEOUT_SECONDS, AGORA_DATABASE__URL
            .add_source(
                Environment::with_prefix("AGORA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: AppConfig = config.try_deserialize()?;

        // Conventional variable names win over empty settings.
        if loaded.database.url.is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                loaded.database.url = url;
            }
        }
        if loaded.moderation.api_key.is_empty() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                loaded.moderation.api_key = key;
            }
        }

        Ok(loaded)
    }

    /// Reload configuration from file
    pub fn reload() -> Result<(), ConfigError> {
        let new_config = Self::load()?;
        if let Ok(mut config) = APP_CONFIG.write() {
            *config = new_config;
            log::info!("Configuration reloaded");
        }
        Ok(())
    }
}

/// Initialize application configuration
///
/// This triggers the lazy loading of the config file and logs the result.
/// Should be called early in application startup.
pub fn init() {
    let config = get_config();
    log::info!(
        "Configuration loaded: moderation.backend = {}, storage.local_path = {}",
        config.moderation.backend,
        config.storage.local_path
    );
}

/// Get the current application configuration
pub fn get_config() -> AppConfig {
    APP_CONFIG.read().map(|c| c.clone()).unwrap_or_default()
}

/// Get moderation configuration
pub fn moderation() -> ModerationConfig {
    get_config().moderation
}

/// Get storage configuration
pub fn storage() -> StorageConfig {
    get_config().storage
}

/// Get poll configuration
pub fn polls() -> PollConfig {
    get_config().polls
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.moderation.timeout_seconds, 20);
        assert_eq!(config.moderation.max_title_chars, 4000);
        assert_eq!(config.moderation.max_body_chars, 20000);
        assert_eq!(config.polls.default_duration_seconds, 3 * 24 * 60 * 60);
    }

    #[test]
    fn test_max_image_bytes() {
        let config = StorageConfig {
            max_image_size_mb: 2,
            ..Default::default()
        };
        assert_eq!(config.max_image_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    #[serial]
    fn test_load_from_toml_file() {
        let mut temp_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            temp_file,
            r#"
[moderation]
backend = "static"
model = "test-model"
timeout_seconds = 5
profanity_terms = ["darn", "heck"]

[polls]
default_duration_seconds = 600
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(temp_file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.moderation.backend, "static");
        assert_eq!(config.moderation.model, "test-model");
        assert_eq!(config.moderation.timeout_seconds, 5);
        assert_eq!(config.moderation.profanity_terms, vec!["darn", "heck"]);
        assert_eq!(config.polls.default_duration_seconds, 600);
        // Untouched sections keep their defaults
        assert_eq!(config.storage.max_image_size_mb, 10);
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_path("/nonexistent/agora.toml").unwrap();
        assert_eq!(config.moderation.endpoint, "https://api.openai.com/v1");
    }

    #[test]
    #[serial]
    fn test_env_override() {
        std::env::set_var("AGORA_MODERATION__TIMEOUT_SECONDS", "7");
        let config = AppConfig::load_from_path("/nonexistent/agora.toml").unwrap();
        std::env::remove_var("AGORA_MODERATION__TIMEOUT_SECONDS");
        assert_eq!(config.moderation.timeout_seconds, 7);
    }
}
