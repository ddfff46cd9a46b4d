use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration as StdDuration};

use chrono::Duration;

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_dedup_window_hours() -> i64 {
    2
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// request_timeout_secs = 10
/// dedup_window_hours = 2
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// OpenWeatherMap API key. Injected into the provider explicitly; the
    /// core never reads it from the environment or other implicit state.
    pub api_key: Option<String>,

    /// Per-request timeout for the remote weather API.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Width of the rolling dedup window.
    #[serde(default = "default_dedup_window_hours")]
    pub dedup_window_hours: i64,

    /// Override for the record log location; defaults to the platform data
    /// directory.
    pub data_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            dedup_window_hours: default_dedup_window_hours(),
            data_file: None,
        }
    }
}

impl Config {
    /// Return the configured API key, with a hint when it is missing.
    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `weatherlog configure` and enter your OpenWeatherMap API key."
            )
        })
    }

    pub fn set_api_key(&mut self, api_key: String) {
        self.api_key = Some(api_key);
    }

    pub fn request_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.request_timeout_secs)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::hours(self.dedup_window_hours)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = project_dirs()?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Path to the record log, honoring the `data_file` override.
    pub fn data_file_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.data_file {
            return Ok(path.clone());
        }
        let dirs = project_dirs()?;
        Ok(dirs.data_dir().join("weather_log.jsonl"))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "weatherlog", "weatherlog")
        .ok_or_else(|| anyhow!("Could not determine platform config directory"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.api_key().unwrap_err();

        assert!(err.to_string().contains("No API key configured"));
        assert!(err.to_string().contains("Hint: run `weatherlog configure`"));
    }

    #[test]
    fn defaults_match_the_documented_contract() {
        let cfg = Config::default();
        assert_eq!(cfg.request_timeout(), StdDuration::from_secs(10));
        assert_eq!(cfg.dedup_window(), Duration::hours(2));
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = toml::from_str("api_key = \"KEY\"").expect("parse");
        assert_eq!(cfg.api_key().expect("key"), "KEY");
        assert_eq!(cfg.dedup_window_hours, 2);
        assert_eq!(cfg.request_timeout_secs, 10);
    }

    #[test]
    fn toml_round_trip_preserves_settings() {
        let mut cfg = Config::default();
        cfg.set_api_key("KEY".to_string());
        cfg.dedup_window_hours = 4;
        cfg.data_file = Some(PathBuf::from("/tmp/wlog.jsonl"));

        let serialized = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&serialized).expect("parse");

        assert_eq!(parsed.api_key().expect("key"), "KEY");
        assert_eq!(parsed.dedup_window_hours, 4);
        assert_eq!(parsed.data_file, Some(PathBuf::from("/tmp/wlog.jsonl")));
    }

    #[test]
    fn data_file_override_wins() {
        let cfg = Config {
            data_file: Some(PathBuf::from("/tmp/wlog.jsonl")),
            ..Config::default()
        };
        assert_eq!(cfg.data_file_path().expect("path"), PathBuf::from("/tmp/wlog.jsonl"));
    }
}
