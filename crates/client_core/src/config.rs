use std::{fs, io, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

use crate::{error::ClientError, gallery::PAGE_LIMIT_CHOICES};

pub const SETTINGS_FILE: &str = "classifier.toml";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_FILES: usize = 3;
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
    pub max_files: usize,
    pub default_page_limit: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_files: DEFAULT_MAX_FILES,
            default_page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Both connection settings must be non-empty before any request is made,
    /// and the page limit must be one the gallery offers.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.base_url.trim().is_empty() {
            return Err(ClientError::MissingSetting("base_url"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ClientError::MissingSetting("api_key"));
        }
        if !PAGE_LIMIT_CHOICES.contains(&self.default_page_limit) {
            return Err(ClientError::InvalidSetting {
                name: "default_page_limit",
                reason: format!(
                    "{} is not one of {PAGE_LIMIT_CHOICES:?}",
                    self.default_page_limit
                ),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    base_url: Option<String>,
    api_key: Option<String>,
    request_timeout_secs: Option<u64>,
    max_files: Option<usize>,
    default_page_limit: Option<u32>,
}

/// Loads settings from `classifier.toml` in the working directory and the
/// process environment.
pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(SETTINGS_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the settings file (if present), then environment overrides.
pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<ClientSettings> {
    let mut settings = ClientSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("failed to parse settings file '{}'", path.display()))?;
            if let Some(v) = file_cfg.base_url {
                settings.base_url = v;
            }
            if let Some(v) = file_cfg.api_key {
                settings.api_key = v;
            }
            if let Some(v) = file_cfg.request_timeout_secs {
                settings.request_timeout_secs = v;
            }
            if let Some(v) = file_cfg.max_files {
                settings.max_files = v;
            }
            if let Some(v) = file_cfg.default_page_limit {
                settings.default_page_limit = v;
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read settings file '{}'", path.display()))
        }
    }

    if let Some(v) = env("CLASSIFIER_BASE_URL") {
        settings.base_url = v;
    }
    if let Some(v) = env("APP__BASE_URL") {
        settings.base_url = v;
    }

    if let Some(v) = env("CLASSIFIER_API_KEY") {
        settings.api_key = v;
    }
    if let Some(v) = env("APP__API_KEY") {
        settings.api_key = v;
    }

    if let Some(v) = env("APP__REQUEST_TIMEOUT_SECS") {
        settings.request_timeout_secs = v
            .parse()
            .with_context(|| format!("APP__REQUEST_TIMEOUT_SECS is not a number: {v}"))?;
    }
    if let Some(v) = env("APP__MAX_FILES") {
        settings.max_files = v
            .parse()
            .with_context(|| format!("APP__MAX_FILES is not a number: {v}"))?;
    }

    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
