mod config;
mod install;
mod package;
mod report;

pub use config::{ConfigError, UpdateConfig, DEFAULT_LAUNCH_URL};
pub use install::{InstallMode, InstallOptions};
pub use package::PackageMetadata;
pub use report::{DeploymentIdentity, ReportError, ReportStatus, StatusReport};
