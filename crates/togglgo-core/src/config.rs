//! Configuration: YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where per-user API keys are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Process memory; lost on restart.
    #[default]
    Memory,
    /// One JSON document per user under `path`.
    File { path: PathBuf },
    /// Firestore REST API.
    Firestore {
        project_id: String,
        #[serde(default = "default_collection")]
        collection: String,
        #[serde(default = "default_firestore_base_url")]
        base_url: String,
        #[serde(default)]
        access_token: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client id the identity assertion must be issued for
    #[serde(default)]
    pub client_id: String,

    /// Base URL of the Toggl v8 API
    #[serde(default = "default_timer_api_base_url")]
    pub timer_api_base_url: String,

    /// Transport timeout for outbound calls
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,

    /// Locale used when the user's locale has no table; `None` makes it an error
    #[serde(default = "default_fallback_locale")]
    pub fallback_locale: Option<String>,

    /// Reply "couldn't stop" instead of "no timer running" when the
    /// current-entry lookup itself fails
    #[serde(default)]
    pub distinguish_current_entry_errors: bool,

    /// Optional YAML file with extra or replacement messages
    #[serde(default)]
    pub messages_path: Option<PathBuf>,

    #[serde(default)]
    pub store: StoreConfig,
}

fn default_timer_api_base_url() -> String {
    "https://www.toggl.com/api/v8".into()
}
fn default_http_timeout() -> u64 {
    10
}
fn default_fallback_locale() -> Option<String> {
    Some("en".into())
}
fn default_collection() -> String {
    "togglgo".into()
}
fn default_firestore_base_url() -> String {
    "https://firestore.googleapis.com/v1".into()
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let mut config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;

        // Relative paths are resolved against the config file's directory
        let base = config_path.parent().unwrap_or(Path::new("."));
        if let Some(p) = config.messages_path.as_mut() {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }
        if let StoreConfig::File { ref mut path } = config.store {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }

        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load `config.yaml` from a directory, falling back to defaults (with
    /// env overrides) when the file does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let config_path = dir.join("config.yaml");
        if config_path.is_file() {
            return Self::load(&config_path);
        }
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(id) = std::env::var("TOGGLGO_CLIENT_ID") {
            self.client_id = id;
        }
        if let Ok(url) = std::env::var("TOGGLGO_API_BASE_URL") {
            self.timer_api_base_url = url;
        }
        if let Ok(locale) = std::env::var("TOGGLGO_FALLBACK_LOCALE") {
            self.fallback_locale = if locale.is_empty() { None } else { Some(locale) };
        }
        if let StoreConfig::Firestore {
            ref mut access_token,
            ..
        } = self.store
        {
            if let Ok(token) = std::env::var("FIRESTORE_ACCESS_TOKEN") {
                *access_token = Some(token);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if let StoreConfig::Firestore { ref project_id, .. } = self.store {
            if project_id.trim().is_empty() {
                anyhow::bail!("Store 'firestore' requires a non-empty project_id");
            }
        }
        if self.timer_api_base_url.trim().is_empty() {
            anyhow::bail!("timer_api_base_url must not be empty");
        }
        if self.http_timeout_seconds == 0 {
            anyhow::bail!("http_timeout_seconds must be at least 1");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            timer_api_base_url: default_timer_api_base_url(),
            http_timeout_seconds: default_http_timeout(),
            fallback_locale: default_fallback_locale(),
            distinguish_current_entry_errors: false,
            messages_path: None,
            store: StoreConfig::default(),
        }
    }
}
