use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("no previous package to revert to")]
    NoPreviousPackage,

    #[error("no current package is deployed")]
    NoCurrentPackage,

    #[error("unsupported ledger version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;
