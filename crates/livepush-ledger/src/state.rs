use std::collections::BTreeSet;

use anyhow::Context;
use livepush_core::{DeploymentIdentity, InstallOptions, PackageMetadata, StatusReport};
use serde::{Deserialize, Serialize};

use crate::{LedgerError, LedgerResult};

pub const LEDGER_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BinaryHashRecord {
    pub hash: String,
    pub native_build_time: u64,
}

/// Every durable field of the ledger. Committed as one document so related fields change together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerState {
    #[serde(default = "ledger_format_version")]
    pub version: u32,
    #[serde(default)]
    pub current_package: Option<PackageMetadata>,
    #[serde(default)]
    pub previous_package: Option<PackageMetadata>,
    #[serde(default)]
    pub pending_install: Option<InstallOptions>,
    #[serde(default)]
    pub needs_confirmation: bool,
    #[serde(default)]
    pub binary_first_run_reported: bool,
    #[serde(default)]
    pub failed_updates: BTreeSet<String>,
    #[serde(default)]
    pub binary_hash: Option<BinaryHashRecord>,
    #[serde(default)]
    pub failed_report: Option<StatusReport>,
    #[serde(default)]
    pub rollback_report: Option<StatusReport>,
    #[serde(default)]
    pub last_deployment: Option<DeploymentIdentity>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            version: ledger_format_version(),
            current_package: None,
            previous_package: None,
            pending_install: None,
            needs_confirmation: false,
            binary_first_run_reported: false,
            failed_updates: BTreeSet::new(),
            binary_hash: None,
            failed_report: None,
            rollback_report: None,
            last_deployment: None,
        }
    }
}

impl LedgerState {
    /// Local paths still referenced by current or previous.
    pub fn referenced_local_paths(&self) -> Vec<&str> {
        [&self.current_package, &self.previous_package]
            .into_iter()
            .flatten()
            .map(|package| package.local_path.as_str())
            .collect()
    }
}

pub(crate) fn parse_ledger_state(content: &str) -> LedgerResult<LedgerState> {
    let value: serde_json::Value =
        serde_json::from_str(content).context("ledger document is not valid JSON")?;
    let found = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .context("ledger document has no version")?;
    let expected = ledger_format_version();
    if found != u64::from(expected) {
        return Err(LedgerError::UnsupportedVersion {
            found: u32::try_from(found).unwrap_or(u32::MAX),
            expected,
        });
    }

    let state = serde_json::from_value::<LedgerState>(value)
        .context("ledger document does not match the expected schema")?;
    Ok(state)
}

pub(crate) fn serialize_ledger_state(state: &LedgerState) -> LedgerResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(state).context("failed serializing ledger")?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn ledger_format_version() -> u32 {
    LEDGER_FORMAT_VERSION
}
