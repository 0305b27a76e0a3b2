use livepush_core::{ConfigError, ReportError};
use livepush_ledger::LedgerError;
use livepush_security::VerificationError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NotFoundError {
    #[error("could not find the package start page")]
    StartPage,

    #[error("no previous package to revert to")]
    PreviousPackage,

    #[error("no current package is deployed")]
    CurrentPackage,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("ledger storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    #[error("missing configuration value: {0}")]
    ConfigMissing(&'static str),

    #[error("failed to extract update archive: {0:#}")]
    Extraction(anyhow::Error),

    #[error(transparent)]
    MalformedReport(#[from] ReportError),

    #[error("platform introspection unavailable: {0}")]
    IntrospectionUnavailable(&'static str),

    #[error("package integrity check failed: expected {expected}, computed {actual}")]
    IntegrityCheckFailed { expected: String, actual: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal failure: {0:#}")]
    Internal(anyhow::Error),
}

pub type UpdateResult<T> = Result<T, UpdateError>;

impl From<LedgerError> for UpdateError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NoPreviousPackage => Self::NotFound(NotFoundError::PreviousPackage),
            LedgerError::NoCurrentPackage => Self::NotFound(NotFoundError::CurrentPackage),
            LedgerError::Storage(err) => Self::Storage(err),
            other @ LedgerError::UnsupportedVersion { .. } => {
                Self::Storage(anyhow::Error::new(other))
            }
        }
    }
}

impl From<ConfigError> for UpdateError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Missing(key) => Self::ConfigMissing(key),
            other => Self::Internal(anyhow::Error::new(other)),
        }
    }
}

impl From<tokio::task::JoinError> for UpdateError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(anyhow::anyhow!("background task failed: {err}"))
    }
}
