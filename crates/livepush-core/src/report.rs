use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    StoreVersion,
    UpdateConfirmed,
    UpdateRolledBack,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreVersion => "store_version",
            Self::UpdateConfirmed => "update_confirmed",
            Self::UpdateRolledBack => "update_rolled_back",
        }
    }

    /// Statuses that move the "last deployed" marker when delivered.
    pub fn records_deployment(self) -> bool {
        matches!(self, Self::StoreVersion | Self::UpdateConfirmed)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("malformed status report: {0}")]
    Malformed(String),
}

/// What the last successfully reported deployment was.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeploymentIdentity {
    pub label_or_app_version: String,
    pub deployment_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReport {
    pub status: ReportStatus,
    #[serde(default)]
    pub label: Option<String>,
    pub app_version: String,
    pub deployment_key: String,
    #[serde(default)]
    pub package_hash: Option<String>,
    #[serde(default)]
    pub previous_label_or_app_version: Option<String>,
    #[serde(default)]
    pub previous_deployment_key: Option<String>,
}

impl StatusReport {
    pub fn new(
        status: ReportStatus,
        label: Option<String>,
        app_version: impl Into<String>,
        deployment_key: impl Into<String>,
    ) -> Self {
        Self {
            status,
            label,
            app_version: app_version.into(),
            deployment_key: deployment_key.into(),
            package_hash: None,
            previous_label_or_app_version: None,
            previous_deployment_key: None,
        }
    }

    pub fn with_package_hash(mut self, package_hash: impl Into<String>) -> Self {
        self.package_hash = Some(package_hash.into());
        self
    }

    pub fn identity(&self) -> DeploymentIdentity {
        DeploymentIdentity {
            label_or_app_version: self
                .label
                .clone()
                .unwrap_or_else(|| self.app_version.clone()),
            deployment_key: self.deployment_key.clone(),
        }
    }

    pub fn previous_identity(&self) -> Option<DeploymentIdentity> {
        Some(DeploymentIdentity {
            label_or_app_version: self.previous_label_or_app_version.clone()?,
            deployment_key: self.previous_deployment_key.clone()?,
        })
    }

    /// Same event regardless of the previous-deployment fields attached at send time.
    pub fn describes_same_event(&self, other: &StatusReport) -> bool {
        self.status == other.status
            && self.label == other.label
            && self.app_version == other.app_version
            && self.deployment_key == other.deployment_key
            && self.package_hash == other.package_hash
    }

    /// Package a failed delivery marks as a failed update. Only rollbacks carry one.
    pub fn failed_package_hash(&self) -> Option<&str> {
        match self.status {
            ReportStatus::UpdateRolledBack => {
                self.package_hash.as_deref().filter(|hash| !hash.is_empty())
            }
            _ => None,
        }
    }

    pub fn with_previous(mut self, previous: Option<&DeploymentIdentity>) -> Self {
        self.previous_label_or_app_version = previous.map(|p| p.label_or_app_version.clone());
        self.previous_deployment_key = previous.map(|p| p.deployment_key.clone());
        self
    }

    pub fn validate(&self) -> Result<(), ReportError> {
        if self.app_version.trim().is_empty() {
            return Err(ReportError::Malformed("app_version must not be empty".into()));
        }
        if self.deployment_key.trim().is_empty() {
            return Err(ReportError::Malformed(
                "deployment_key must not be empty".into(),
            ));
        }
        let has_label = self
            .label
            .as_deref()
            .is_some_and(|label| !label.trim().is_empty());
        match self.status {
            ReportStatus::StoreVersion if has_label => Err(ReportError::Malformed(
                "store_version reports must not carry a label".into(),
            )),
            ReportStatus::UpdateConfirmed | ReportStatus::UpdateRolledBack if !has_label => {
                Err(ReportError::Malformed(format!(
                    "{} reports require a label",
                    self.status.as_str()
                )))
            }
            _ => Ok(()),
        }
    }
}
