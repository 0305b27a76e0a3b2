use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_LAUNCH_URL: &str = "https://localhost";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("failed to parse live update config")]
    Parse(#[from] toml::de::Error),

    #[error("failed to read live update config: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Deployment settings the host application ships with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateConfig {
    pub deployment_key: Option<String>,
    pub server_url: Option<String>,
    pub public_key: Option<String>,
    pub launch_url: Option<String>,
}

impl UpdateConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn deployment_key(&self) -> Result<&str, ConfigError> {
        required(self.deployment_key.as_deref(), "deployment_key")
    }

    pub fn server_url(&self) -> Result<&str, ConfigError> {
        required(self.server_url.as_deref(), "server_url")
    }

    pub fn public_key(&self) -> Result<&str, ConfigError> {
        required(self.public_key.as_deref(), "public_key")
    }

    /// Signed-update enforcement is on whenever a public key is configured.
    pub fn signing_enabled(&self) -> bool {
        self.public_key().is_ok()
    }

    pub fn launch_url(&self) -> &str {
        match self.launch_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => DEFAULT_LAUNCH_URL,
        }
    }
}

fn required<'a>(value: Option<&'a str>, key: &'static str) -> Result<&'a str, ConfigError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(key)),
    }
}
