use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use livepush_core::{StatusReport, UpdateConfig};
use livepush_lifecycle::{ContentHost, HostInfo, StatusSink};
use serde::Deserialize;
use tracing::debug;

use crate::render::{format_report, print_status, OutputStyle};

/// Stand-in for platform introspection, read from the `[host]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct HostSection {
    pub app_version: Option<String>,
    pub native_build_time: Option<u64>,
    pub binary_assets_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct HostFile {
    #[serde(default)]
    host: HostSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CliConfig {
    pub update: UpdateConfig,
    pub host: HostSection,
}

impl CliConfig {
    pub(crate) fn parse(raw: &str) -> Result<Self> {
        let update = UpdateConfig::from_toml_str(raw)?;
        let host = toml::from_str::<HostFile>(raw)
            .context("failed to parse [host] table")?
            .host;
        Ok(Self { update, host })
    }

    /// A missing file is an empty configuration; every accessor then reports what is absent.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw)
                .with_context(|| format!("failed to load config: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }
}

pub(crate) struct ConfiguredHost {
    section: HostSection,
}

impl ConfiguredHost {
    pub(crate) fn new(section: HostSection) -> Self {
        Self { section }
    }
}

impl HostInfo for ConfiguredHost {
    fn app_version(&self) -> Option<String> {
        self.section.app_version.clone()
    }

    fn native_build_time(&self) -> Option<u64> {
        self.section.native_build_time
    }

    fn binary_assets_dir(&self) -> Option<PathBuf> {
        self.section.binary_assets_dir.clone()
    }
}

/// Prints what a web view would be asked to do.
pub(crate) struct TerminalContent {
    style: OutputStyle,
}

impl TerminalContent {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

impl ContentHost for TerminalContent {
    fn set_server_base_path(&self, content_root: &Path) {
        print_status(
            self.style,
            "serve",
            &format!("serving content from {}", content_root.display()),
        );
    }

    fn reset_server_base_path(&self) {
        print_status(self.style, "serve", "serving bundled content");
    }

    fn load_url(&self, url: &str) {
        print_status(self.style, "load", &format!("loading {url}"));
    }

    fn clear_history(&self) {
        print_status(self.style, "load", "navigation history cleared");
    }
}

/// Writes outgoing status reports as JSON lines for the caller to deliver.
pub(crate) struct StdoutReports {
    style: OutputStyle,
}

impl StdoutReports {
    pub(crate) fn new(style: OutputStyle) -> Self {
        Self { style }
    }
}

impl StatusSink for StdoutReports {
    fn dispatch(&self, report: &StatusReport) {
        print_status(self.style, "report", &format_report(report));
    }
}
