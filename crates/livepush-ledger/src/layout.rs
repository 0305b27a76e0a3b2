use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};

const DATA_DIR_NAME: &str = "livepush";
const CONTENT_DIR_NAME: &str = "public";
const START_PAGE_NAME: &str = "index.html";

/// On-disk layout of the live-update store, rooted at the app's data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerLayout {
    root: PathBuf,
}

impl LedgerLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR_NAME)
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir().join("state.json")
    }

    pub fn state_tmp_path(&self) -> PathBuf {
        self.data_dir().join("state.json.tmp")
    }

    pub fn download_dir(&self) -> PathBuf {
        self.data_dir().join("download")
    }

    pub fn unzip_dir(&self) -> PathBuf {
        self.download_dir().join("unzipped")
    }

    pub fn deploy_dir(&self) -> PathBuf {
        self.data_dir().join("deploy")
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.deploy_dir().join("versions")
    }

    pub fn package_dir(&self, package_hash: &str) -> PathBuf {
        self.versions_dir().join(package_hash)
    }

    /// Root-relative location recorded in package metadata.
    pub fn package_local_path(&self, package_hash: &str) -> String {
        format!("{DATA_DIR_NAME}/deploy/versions/{package_hash}")
    }

    /// Resolves a root-relative package location, rejecting anything that could escape the root.
    pub fn resolve_local_path(&self, local_path: &str) -> Option<PathBuf> {
        let relative = Path::new(local_path.trim().trim_start_matches("./"));
        if relative.as_os_str().is_empty() {
            return None;
        }
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    pub fn content_root(&self, local_path: &str) -> Option<PathBuf> {
        self.resolve_local_path(local_path)
            .map(|path| path.join(CONTENT_DIR_NAME))
    }

    pub fn start_page(&self, local_path: &str) -> Option<PathBuf> {
        self.content_root(local_path)
            .map(|path| path.join(START_PAGE_NAME))
    }

    pub fn ensure_base_dirs(&self) -> Result<()> {
        for dir in [self.data_dir(), self.download_dir(), self.versions_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
