use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use livepush_core::StatusReport;

/// The UI bridge that renders web content.
///
/// Calls may arrive from any thread; implementations hop to their UI thread as needed.
pub trait ContentHost: Send + Sync {
    /// Serve subsequent page loads from `content_root` (a package's `public/` directory).
    fn set_server_base_path(&self, content_root: &Path);

    /// Go back to serving the web assets bundled with the binary.
    fn reset_server_base_path(&self);

    fn load_url(&self, url: &str);

    fn clear_history(&self);
}

/// Hands a status report to the telemetry sender.
///
/// Delivery is asynchronous: the host answers later through `report_succeeded` or
/// `report_failed`.
pub trait StatusSink: Send + Sync {
    fn dispatch(&self, report: &StatusReport);
}

/// Platform version and build introspection. `None` means the platform could not tell.
pub trait HostInfo: Send + Sync {
    fn app_version(&self) -> Option<String>;

    fn native_build_time(&self) -> Option<u64>;

    /// Directory holding the web assets shipped inside the host binary.
    fn binary_assets_dir(&self) -> Option<PathBuf>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// External collaborators shared by the session and the service.
#[derive(Clone)]
pub struct HostBindings {
    pub content: Arc<dyn ContentHost>,
    pub sink: Arc<dyn StatusSink>,
    pub info: Arc<dyn HostInfo>,
    pub clock: Arc<dyn Clock>,
}

impl HostBindings {
    pub fn new(
        content: Arc<dyn ContentHost>,
        sink: Arc<dyn StatusSink>,
        info: Arc<dyn HostInfo>,
    ) -> Self {
        Self {
            content,
            sink,
            info,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
