//! Typed request records for the host bridge, validated before any work starts.

use std::path::PathBuf;

use livepush_core::{InstallMode, InstallOptions, StatusReport};
use serde::Deserialize;

use crate::{UpdateError, UpdateResult};

fn require_non_empty(field: &str, value: &str) -> UpdateResult<()> {
    if value.trim().is_empty() {
        return Err(UpdateError::InvalidRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DecodeSignatureRequest {
    pub public_key: String,
    pub signed_attestation: String,
}

impl DecodeSignatureRequest {
    pub fn validate(&self) -> UpdateResult<()> {
        require_non_empty("signed_attestation", &self.signed_attestation)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageHashRequest {
    /// Package location relative to the storage root.
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UnzipRequest {
    pub archive_path: PathBuf,
    pub target_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstallRequest {
    pub start_location: String,
    pub install_mode: InstallMode,
    #[serde(default)]
    pub minimum_background_duration: u64,
}

impl InstallRequest {
    pub fn new(
        start_location: impl Into<String>,
        install_mode: InstallMode,
        minimum_background_duration: u64,
    ) -> Self {
        Self {
            start_location: start_location.into(),
            install_mode,
            minimum_background_duration,
        }
    }

    pub fn options(&self) -> InstallOptions {
        InstallOptions::new(self.install_mode, self.minimum_background_duration)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReportRequest {
    pub status_report: StatusReport,
}

/// A downloaded update archive and the descriptor it was advertised with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeployRequest {
    pub archive_path: PathBuf,
    pub label: String,
    pub package_hash: String,
    pub app_version: String,
    pub deployment_key: String,
}

impl DeployRequest {
    pub fn validate(&self) -> UpdateResult<()> {
        require_non_empty("label", &self.label)?;
        require_non_empty("package_hash", &self.package_hash)?;
        require_non_empty("app_version", &self.app_version)?;
        require_non_empty("deployment_key", &self.deployment_key)
    }
}
