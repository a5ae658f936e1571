// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Node settings
//!
//! Sources, later wins: built-in defaults, an optional TOML file named by
//! `SKETCH_CONFIG`, then environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use url::Url;

/// Environment variable naming the optional TOML settings file
pub const CONFIG_PATH_ENV: &str = "SKETCH_CONFIG";

pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid backend URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Base URL of the Stable Diffusion WebUI
    pub sd_webui_url: String,
    /// Generation call timeout, seconds
    pub sd_api_timeout: u64,
    /// Liveness probe timeout, seconds
    pub probe_timeout: u64,
    pub api_host: String,
    pub api_port: u16,
    /// Largest accepted sketch upload, bytes
    pub max_file_size: usize,
    pub allowed_origins: Vec<String>,
    /// Expose error details in 500 responses
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sd_webui_url: "http://127.0.0.1:7860".to_string(),
            sd_api_timeout: 300,
            probe_timeout: 10,
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            allowed_origins: vec![
                "http://localhost:8080".to_string(),
                "http://127.0.0.1:8080".to_string(),
                "http://localhost:3000".to_string(),
            ],
            debug: true,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerSection {
    host: Option<String>,
    port: Option<u16>,
    allowed_origins: Option<Vec<String>>,
    debug: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BackendSection {
    sd_webui_url: Option<String>,
    sd_api_timeout: Option<u64>,
    probe_timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UploadSection {
    max_file_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SettingsFile {
    server: ServerSection,
    backend: BackendSection,
    upload: UploadSection,
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

fn parse_flag(key: &'static str, value: String) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}

impl Settings {
    /// Defaults, then the file named by `SKETCH_CONFIG` if set, then the environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => {
                info!("Loading settings from {}", path);
                Self::from_file(&path)?
            }
            _ => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with the environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults overlaid with a TOML file (`[server]`, `[backend]`, `[upload]`)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml::from_str(content)?;
        let mut settings = Self::default();

        if let Some(host) = file.server.host {
            settings.api_host = host;
        }
        if let Some(port) = file.server.port {
            settings.api_port = port;
        }
        if let Some(origins) = file.server.allowed_origins {
            settings.allowed_origins = origins;
        }
        if let Some(debug) = file.server.debug {
            settings.debug = debug;
        }
        if let Some(url) = file.backend.sd_webui_url {
            settings.sd_webui_url = url;
        }
        if let Some(secs) = file.backend.sd_api_timeout {
            settings.sd_api_timeout = secs;
        }
        if let Some(secs) = file.backend.probe_timeout {
            settings.probe_timeout = secs;
        }
        if let Some(max) = file.upload.max_file_size {
            settings.max_file_size = max;
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Overlay environment variables read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("SD_WEBUI_URL") {
            self.sd_webui_url = val;
        }
        if let Some(val) = lookup("SD_API_TIMEOUT") {
            self.sd_api_timeout = parse_value("SD_API_TIMEOUT", val)?;
        }
        if let Some(val) = lookup("API_HOST") {
            self.api_host = val;
        }
        if let Some(val) = lookup("API_PORT") {
            self.api_port = parse_value("API_PORT", val)?;
        }
        if let Some(val) = lookup("MAX_FILE_SIZE") {
            self.max_file_size = parse_value("MAX_FILE_SIZE", val)?;
        }
        if let Some(val) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = val
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("DEBUG") {
            self.debug = parse_flag("DEBUG", val)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.sd_webui_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.sd_webui_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidUrl {
                url: self.sd_webui_url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }
        if self.sd_api_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "sd_api_timeout",
                value: "0".to_string(),
            });
        }
        if self.probe_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                key: "probe_timeout",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.sd_api_timeout)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout)
    }

    /// `host:port` for the HTTP listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
