use anyhow::{Context, Result};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;

pub const DEFAULT_API_VERSION: &str = "2024-12-01-preview";

/// Values shipped in the sample `.env`; treated as "not configured".
pub const PLACEHOLDER_API_KEY: &str = "your_api_key_here";
pub const PLACEHOLDER_ENDPOINT: &str = "https://your-resource.openai.azure.com/";
pub const PLACEHOLDER_DEPLOYMENT: &str = "your_deployment_name";

pub const ENV_API_KEY: &str = "AZURE_OPENAI_KEY";
pub const ENV_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
pub const ENV_DEPLOYMENT: &str = "AZURE_OPENAI_DEPLOYMENT";
pub const ENV_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Azure OpenAI connection settings
    #[serde(default)]
    pub azure: Settings,

    /// Request and prompt options
    #[serde(default)]
    pub chat: ChatOptions,

    /// Directory holding config.toml and the chat history slot
    #[serde(skip)]
    pub data_dir: PathBuf,
}

/// Connection settings for the Azure OpenAI deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
    pub deployment: Option<String>,
    pub api_version: Option<String>,
}

/// Settings that passed validation, ready to build requests from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSettings {
    pub api_key: String,
    /// Endpoint without a trailing slash
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
}

/// Per-request options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatOptions {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 800,
            temperature: 0.7,
            stream: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            azure: Settings::default(),
            chat: ChatOptions::default(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".paddock")
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Settings {
            api_key: non_blank(lookup(ENV_API_KEY)),
            endpoint: non_blank(lookup(ENV_ENDPOINT)),
            deployment: non_blank(lookup(ENV_DEPLOYMENT)),
            api_version: non_blank(lookup(ENV_API_VERSION)),
        }
    }

    /// Read settings from a `.env` file without touching the process
    /// environment. `None` searches the working directory and its parents.
    /// A missing file yields empty settings.
    pub fn from_dotenv(path: Option<&Path>) -> Self {
        let iter = match path {
            Some(path) => dotenv::from_path_iter(path),
            None => dotenv::dotenv_iter(),
        };
        let vars: HashMap<String, String> = match iter {
            Ok(iter) => iter
                .filter_map(|item| match item {
                    Ok(pair) => Some(pair),
                    Err(e) => {
                        tracing::warn!("Skipping malformed .env entry: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                tracing::debug!("No .env file loaded: {}", e);
                HashMap::new()
            }
        };
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merged_with(self, overrides: Settings) -> Settings {
        Settings {
            api_key: overrides.api_key.or(self.api_key),
            endpoint: overrides.endpoint.or(self.endpoint),
            deployment: overrides.deployment.or(self.deployment),
            api_version: overrides.api_version.or(self.api_version),
        }
    }

    pub fn api_version(&self) -> &str {
        self.api_version
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(DEFAULT_API_VERSION)
    }

    /// Check required fields and placeholder sentinels.
    pub fn validate(&self) -> std::result::Result<ResolvedSettings, ConfigError> {
        let api_key = required(&self.api_key, PLACEHOLDER_API_KEY).ok_or(ConfigError::MissingApiKey)?;
        let endpoint = required(&self.endpoint, PLACEHOLDER_ENDPOINT).ok_or(ConfigError::MissingEndpoint)?;
        let deployment =
            required(&self.deployment, PLACEHOLDER_DEPLOYMENT).ok_or(ConfigError::MissingDeployment)?;

        Ok(ResolvedSettings {
            api_key: api_key.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            deployment: deployment.to_string(),
            api_version: self.api_version().to_string(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.validate().is_ok()
    }

    /// API key with everything but a short prefix masked, for display.
    pub fn redacted_api_key(&self) -> String {
        match self.api_key.as_deref() {
            Some(key) if key.chars().count() > 6 => {
                let prefix: String = key.chars().take(4).collect();
                format!("{}… ({} chars)", prefix, key.chars().count())
            }
            Some(_) => "set (short)".to_string(),
            None => "NOT SET".to_string(),
        }
    }
}

fn required<'a>(value: &'a Option<String>, placeholder: &str) -> Option<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != placeholder)
}

impl Config {
    /// Load configuration from `~/.paddock/config.toml`, then apply `.env` and
    /// environment overrides. Safe to call again to pick up edited files.
    pub fn load() -> Result<Self> {
        let data_dir = default_data_dir();
        fs::create_dir_all(&data_dir).context("Failed to create .paddock directory")?;

        let config = Self::load_layered(
            &data_dir.join("config.toml"),
            Settings::from_dotenv(None),
            Settings::from_env(),
        )?;

        tracing::debug!(
            has_api_key = config.azure.api_key.is_some(),
            endpoint = config.azure.endpoint.as_deref().unwrap_or("NOT SET"),
            deployment = config.azure.deployment.as_deref().unwrap_or("NOT SET"),
            api_version = config.azure.api_version(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Load `config_path`, then layer `.env` settings and environment
    /// settings on top, in that order.
    pub fn load_layered(config_path: &Path, dotenv: Settings, env: Settings) -> Result<Self> {
        let mut config = Self::load_from_path(config_path)?;
        config.azure = config.azure.merged_with(dotenv).merged_with(env);
        Ok(config)
    }

    /// Load configuration from a specific file. A missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        if let Some(parent) = path.parent() {
            config.data_dir = parent.to_path_buf();
        }

        Ok(config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }

    /// Location of the persisted conversation
    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::HISTORY_SLOT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn configured() -> Settings {
        Settings {
            api_key: Some("0123456789abcdef".to_string()),
            endpoint: Some("https://paddock.openai.azure.com/".to_string()),
            deployment: Some("gpt-4o".to_string()),
            api_version: None,
        }
    }

    #[test]
    fn placeholder_api_key_is_not_configured() {
        let settings = Settings {
            api_key: Some(PLACEHOLDER_API_KEY.to_string()),
            ..configured()
        };
        assert!(!settings.is_configured());
        assert_eq!(settings.validate(), Err(ConfigError::MissingApiKey));
    }

    #[test]
    fn placeholder_endpoint_and_deployment_are_not_configured() {
        let settings = Settings {
            endpoint: Some(PLACEHOLDER_ENDPOINT.to_string()),
            ..configured()
        };
        assert_eq!(settings.validate(), Err(ConfigError::MissingEndpoint));

        let settings = Settings {
            deployment: Some(PLACEHOLDER_DEPLOYMENT.to_string()),
            ..configured()
        };
        assert_eq!(settings.validate(), Err(ConfigError::MissingDeployment));
    }

    #[test]
    fn all_required_fields_present_is_configured() {
        let settings = configured();
        assert!(settings.is_configured());

        let resolved = settings.validate().unwrap();
        assert_eq!(resolved.endpoint, "https://paddock.openai.azure.com");
        assert_eq!(resolved.api_version, DEFAULT_API_VERSION);
    }

    #[test]
    fn missing_fields_are_not_configured() {
        assert!(!Settings::default().is_configured());
        let settings = Settings {
            deployment: None,
            ..configured()
        };
        assert_eq!(settings.validate(), Err(ConfigError::MissingDeployment));
    }

    #[test]
    fn lookup_ignores_blank_values() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "secret-key"),
            (ENV_ENDPOINT, "  "),
            (ENV_API_VERSION, "2024-02-15-preview"),
        ]
        .into_iter()
        .collect();

        let settings = Settings::from_lookup(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(settings.api_key.as_deref(), Some("secret-key"));
        assert_eq!(settings.endpoint, None);
        assert_eq!(settings.deployment, None);
        assert_eq!(settings.api_version(), "2024-02-15-preview");
    }

    #[test]
    fn environment_overrides_file_values() {
        let file = configured();
        let env = Settings {
            deployment: Some("gpt-4o-mini".to_string()),
            ..Settings::default()
        };

        let merged = file.merged_with(env);
        assert_eq!(merged.deployment.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(merged.api_key.as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn redacted_key_hides_secret() {
        let redacted = configured().redacted_api_key();
        assert!(redacted.starts_with("0123"));
        assert!(!redacted.contains("abcdef"));
        assert_eq!(Settings::default().redacted_api_key(), "NOT SET");
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");

        let config = Config::load_from_path(&path).expect("load failed");
        assert_eq!(config.chat, ChatOptions::default());
        assert_eq!(config.data_dir, temp_dir.path());
    }

    #[test]
    fn config_file_round_trips_through_toml() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let mut config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            ..Config::default()
        };
        config.azure = configured();
        config.chat.max_tokens = 256;
        config.chat.stream = false;
        fs::write(config.config_path(), toml::to_string_pretty(&config).unwrap()).unwrap();

        let reloaded = Config::load_from_path(&config.config_path()).expect("reload failed");
        assert_eq!(reloaded.azure, config.azure);
        assert_eq!(reloaded.chat.max_tokens, 256);
        assert!(!reloaded.chat.stream);
        assert_eq!(reloaded.chat.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    fn write_dotenv(path: &Path, api_key: &str) {
        let content = format!(
            "{}={}\n{}=https://paddock.openai.azure.com/\n{}=gpt-4o\n",
            ENV_API_KEY, api_key, ENV_ENDPOINT, ENV_DEPLOYMENT
        );
        fs::write(path, content).unwrap();
    }

    #[test]
    fn edited_dotenv_is_picked_up_on_next_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        let dotenv_path = temp_dir.path().join(".env");

        write_dotenv(&dotenv_path, PLACEHOLDER_API_KEY);
        let first = Config::load_layered(
            &config_path,
            Settings::from_dotenv(Some(&dotenv_path)),
            Settings::default(),
        )
        .expect("load failed");
        assert_eq!(first.azure.api_key.as_deref(), Some(PLACEHOLDER_API_KEY));
        assert!(!first.azure.is_configured());

        write_dotenv(&dotenv_path, "real-key-123");
        let second = Config::load_layered(
            &config_path,
            Settings::from_dotenv(Some(&dotenv_path)),
            Settings::default(),
        )
        .expect("reload failed");
        assert_eq!(second.azure.api_key.as_deref(), Some("real-key-123"));
        assert!(second.azure.is_configured());
    }

    #[test]
    fn environment_beats_dotenv_beats_config_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let config_path = temp_dir.path().join("config.toml");
        let dotenv_path = temp_dir.path().join(".env");
        fs::write(
            &config_path,
            "[azure]\napi_key = \"from-file\"\ndeployment = \"file-deployment\"\napi_version = \"2024-02-01\"\n",
        )
        .unwrap();
        write_dotenv(&dotenv_path, "from-dotenv");

        let env = Settings {
            api_key: Some("from-env".to_string()),
            ..Settings::default()
        };
        let config =
            Config::load_layered(&config_path, Settings::from_dotenv(Some(&dotenv_path)), env).expect("load failed");

        assert_eq!(config.azure.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.azure.deployment.as_deref(), Some("gpt-4o"));
        assert_eq!(config.azure.api_version(), "2024-02-01");
    }

    #[test]
    fn missing_dotenv_yields_no_settings() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let settings = Settings::from_dotenv(Some(&temp_dir.path().join(".env")));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[chat]\ntemperature = 0.2\n").unwrap();

        let config = Config::load_from_path(&path).expect("load failed");
        assert_eq!(config.chat.temperature, 0.2);
        assert_eq!(config.chat.max_tokens, 800);
        assert_eq!(config.azure, Settings::default());
    }
}
