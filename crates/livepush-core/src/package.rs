use serde::{Deserialize, Serialize};

/// Ledger record for one deployed bundle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageMetadata {
    pub label: String,
    pub package_hash: String,
    pub app_version: String,
    pub deployment_key: String,
    /// Bundle directory, relative to the storage root.
    pub local_path: String,
    /// Host binary build timestamp (ms) captured when the package was recorded.
    pub native_build_time: u64,
    #[serde(default)]
    pub is_pending: bool,
}

impl PackageMetadata {
    pub fn targets_binary(&self, native_build_time: u64, app_version: &str) -> bool {
        self.native_build_time == native_build_time && self.app_version == app_version
    }

    pub fn matches_hash(&self, package_hash: &str) -> bool {
        !package_hash.is_empty() && self.package_hash == package_hash
    }
}
