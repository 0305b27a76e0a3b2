mod deploy;
mod error;
mod guard;
mod host;
mod monitor;
mod reporting;
mod requests;
mod scheduler;
mod service;
mod session;

pub use deploy::stage_verified_package;
pub use error::{NotFoundError, UpdateError, UpdateResult};
pub use guard::check_and_reconcile;
pub use host::{Clock, ContentHost, HostBindings, HostInfo, StatusSink, SystemClock};
pub use monitor::{
    current_state, on_ready, rollback_if_unconfirmed, rollback_report, BinaryIdentity,
    ConfirmationState,
};
pub use reporting::ReportingQueue;
pub use requests::{
    DecodeSignatureRequest, DeployRequest, InstallRequest, PackageHashRequest, ReportRequest,
    UnzipRequest,
};
pub use scheduler::{
    apply_pending, is_due, request_install, resolve_start_page, InstallOutcome, InstallTrigger,
};
pub use service::UpdateService;
pub use session::{LifecycleEvent, SessionFlags, UpdateSession};
