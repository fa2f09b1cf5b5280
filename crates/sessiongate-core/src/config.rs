//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the identity backend and managed-session endpoints, the
//! session check interval and the default "remember me" choice.
//!
//! Configuration is stored at `~/.config/sessiongate/config.json`.
//! `SESSIONGATE_API_URL`, `SESSIONGATE_PROVIDER_URL` and
//! `SESSIONGATE_ANON_KEY` override the stored values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::Scope;

/// Application name used for config/data directory paths
const APP_NAME: &str = "sessiongate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
const DEFAULT_DASHBOARD_URL: &str = "http://localhost:3000/dashboard";

/// Background session check interval (15 minutes).
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 15 * 60;

/// Where the durable credential scope lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DurableBackend {
    /// OS keychain
    #[default]
    Keyring,
    /// JSON file in the data directory
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub provider_url: Option<String>,
    pub provider_anon_key: Option<String>,
    pub dashboard_url: String,
    pub watch_interval_secs: u64,
    pub remember_me: bool,
    pub durable_backend: DurableBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            provider_url: None,
            provider_anon_key: None,
            dashboard_url: DEFAULT_DASHBOARD_URL.to_string(),
            watch_interval_secs: DEFAULT_WATCH_INTERVAL_SECS,
            remember_me: false,
            durable_backend: DurableBackend::default(),
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    /// Persist `email` as the last used address. Only that field changes on
    /// disk; environment overrides stay out of the file.
    pub fn remember_email(email: &str) -> Result<()> {
        Self::remember_email_at(&Self::config_path()?, email)
    }

    fn remember_email_at(path: &Path, email: &str) -> Result<()> {
        let mut stored = Self::load_from(path)?;
        stored.last_email = Some(email.to_string());
        stored.save_to(path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = lookup("SESSIONGATE_API_URL") {
            self.api_base_url = url;
        }
        if let Some(url) = lookup("SESSIONGATE_PROVIDER_URL") {
            self.provider_url = Some(url);
        }
        if let Some(key) = lookup("SESSIONGATE_ANON_KEY") {
            self.provider_anon_key = Some(key);
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs.max(1))
    }

    /// Scope used when "remember me" was not given explicitly.
    pub fn default_scope(&self) -> Scope {
        Scope::from_remember_me(self.remember_me)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:5000");
        assert_eq!(config.watch_interval(), Duration::from_secs(900));
        assert_eq!(config.default_scope(), Scope::Ephemeral);
        assert_eq!(config.durable_backend, DurableBackend::Keyring);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"remember_me": true, "durable_backend": "file"}"#).unwrap();
        assert_eq!(config.default_scope(), Scope::Durable);
        assert_eq!(config.durable_backend, DurableBackend::File);
        assert_eq!(config.dashboard_url, "http://localhost:3000/dashboard");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SESSIONGATE_API_URL", "https://auth.example.com"),
            ("SESSIONGATE_PROVIDER_URL", "https://project.supabase.co"),
            ("SESSIONGATE_ANON_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.api_base_url, "https://auth.example.com");
        assert_eq!(config.provider_url.as_deref(), Some("https://project.supabase.co"));
        // Blank values do not override
        assert_eq!(config.provider_anon_key, None);
    }

    #[test]
    fn test_remember_email_keeps_overrides_out_of_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessiongate").join(CONFIG_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"remember_me": true}"#).unwrap();

        let mut loaded = Config::load_from(&path).unwrap();
        loaded.apply_overrides(|key| match key {
            "SESSIONGATE_ANON_KEY" => Some("secret-anon-key".to_string()),
            "SESSIONGATE_API_URL" => Some("https://auth.example.com".to_string()),
            _ => None,
        });
        assert_eq!(loaded.provider_anon_key.as_deref(), Some("secret-anon-key"));

        Config::remember_email_at(&path, "user@example.com").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(!contents.contains("secret-anon-key"));
        assert!(!contents.contains("auth.example.com"));
        let stored = Config::load_from(&path).unwrap();
        assert_eq!(stored.last_email.as_deref(), Some("user@example.com"));
        assert!(stored.remember_me);
        assert_eq!(stored.provider_anon_key, None);
    }

    #[test]
    fn test_remember_email_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        Config::remember_email_at(&path, "user@example.com").unwrap();
        let stored = Config::load_from(&path).unwrap();
        assert_eq!(stored.last_email.as_deref(), Some("user@example.com"));
        assert_eq!(stored.api_base_url, "http://localhost:5000");
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = Config {
            watch_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.watch_interval(), Duration::from_secs(1));
    }
}
