use std::sync::Arc;
use std::time::SystemTime;

use livepush_core::{InstallOptions, PackageMetadata, StatusReport, UpdateConfig};
use livepush_ledger::MetadataLedger;
use tracing::{debug, info, warn};

use crate::guard::check_and_reconcile;
use crate::monitor::{self, BinaryIdentity, ConfirmationState};
use crate::scheduler::{self, InstallOutcome, InstallTrigger};
use crate::{HostBindings, ReportingQueue, UpdateResult};

/// Host lifecycle inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Start,
    Resume,
    Pause,
    Ready,
    Destroy,
}

impl LifecycleEvent {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Self::Start),
            "resume" => Some(Self::Resume),
            "pause" => Some(Self::Pause),
            "ready" => Some(Self::Ready),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }
}

/// Flags that live for one process and are never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFlags {
    /// An update was applied during this process.
    pub did_update: bool,
    pub did_start_app: bool,
    pub last_paused_at: Option<SystemTime>,
    pub destroyed: bool,
    /// Consumed by the next finished page load.
    pub clear_history_on_load: bool,
}

/// Per-process update controller. Every ledger read-decide-write sequence runs
/// through `&mut self`, so one owner serializes them.
pub struct UpdateSession {
    ledger: Arc<MetadataLedger>,
    config: Arc<UpdateConfig>,
    host: HostBindings,
    flags: SessionFlags,
}

impl UpdateSession {
    pub fn new(ledger: Arc<MetadataLedger>, config: Arc<UpdateConfig>, host: HostBindings) -> Self {
        Self {
            ledger,
            config,
            host,
            flags: SessionFlags::default(),
        }
    }

    pub fn ledger(&self) -> &MetadataLedger {
        &self.ledger
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    fn reporting(&self) -> ReportingQueue<'_> {
        ReportingQueue::new(&self.ledger, self.host.sink.as_ref())
    }

    /// Drives the lifecycle state machine. `Ready` yields the confirmation state it
    /// settled in; other events yield `None`.
    pub fn handle_event(
        &mut self,
        event: LifecycleEvent,
    ) -> UpdateResult<Option<ConfirmationState>> {
        debug!(?event, "lifecycle event");
        match event {
            LifecycleEvent::Start if !self.flags.did_start_app => self.on_start()?,
            LifecycleEvent::Start => self.on_resume()?,
            LifecycleEvent::Resume => {
                self.flags.destroyed = false;
                if self.flags.did_start_app {
                    self.on_resume()?;
                } else {
                    self.on_start()?;
                }
            }
            LifecycleEvent::Pause => {
                self.flags.last_paused_at = Some(self.host.clock.now());
            }
            LifecycleEvent::Ready => return self.on_ready().map(Some),
            LifecycleEvent::Destroy => {
                self.flags.destroyed = true;
            }
        }
        Ok(None)
    }

    fn on_start(&mut self) -> UpdateResult<()> {
        self.flags.did_start_app = true;
        let app_version = self.host.info.app_version();
        check_and_reconcile(
            &self.ledger,
            self.host.info.native_build_time(),
            app_version.as_deref(),
        )?;

        let mut fell_back_to_bundle = false;
        if self.ledger.pending()?.is_none() {
            if let Some(outcome) = monitor::rollback_if_unconfirmed(&self.ledger)? {
                info!(
                    rolled_back = %outcome.rolled_back.label,
                    "unconfirmed update rolled back on start"
                );
                fell_back_to_bundle = outcome.restored.is_none();
            }
            if let Some(abandoned) = self.ledger.discard_abandoned_deployment()? {
                info!(
                    package_hash = %abandoned.package_hash,
                    "discarded deployment that was never installed"
                );
            }
        }

        if scheduler::apply_pending(&self.ledger, InstallTrigger::Start)?.is_some() {
            self.flags.did_update = true;
        }
        if fell_back_to_bundle {
            self.serve_bundled();
            return Ok(());
        }
        self.serve_current()
    }

    fn on_resume(&mut self) -> UpdateResult<()> {
        let background_secs = self.flags.last_paused_at.map(|paused_at| {
            self.host
                .clock
                .now()
                .duration_since(paused_at)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        });

        let trigger = InstallTrigger::Resume { background_secs };
        if scheduler::apply_pending(&self.ledger, trigger)?.is_some() {
            self.flags.did_update = true;
            self.serve_current()?;
        } else if self.reporting().has_failed_report()? {
            self.reporting().retry_failed()?;
        }
        Ok(())
    }

    fn on_ready(&mut self) -> UpdateResult<ConfirmationState> {
        let binary = self.binary_identity();
        Ok(monitor::on_ready(&self.ledger, &self.reporting(), binary)?)
    }

    fn binary_identity(&self) -> Option<BinaryIdentity> {
        let app_version = self.host.info.app_version()?;
        let deployment_key = self.config.deployment_key().ok()?.to_string();
        Some(BinaryIdentity {
            app_version,
            deployment_key,
        })
    }

    /// Points the content host at the current package, if one is deployed.
    fn serve_current(&self) -> UpdateResult<()> {
        let Some(current) = self.ledger.current()? else {
            return Ok(());
        };
        match self.ledger.layout().content_root(&current.local_path) {
            Some(content_root) => self.host.content.set_server_base_path(&content_root),
            None => warn!(local_path = %current.local_path, "current package path is invalid"),
        }
        Ok(())
    }

    fn serve_bundled(&mut self) {
        self.host.content.reset_server_base_path();
        if self.flags.destroyed {
            return;
        }
        let launch_url = self.config.launch_url().to_string();
        self.navigate_to_url(&launch_url);
    }

    fn navigate_to_url(&mut self, url: &str) {
        self.flags.clear_history_on_load = true;
        self.host.content.load_url(url);
    }

    pub fn install(
        &mut self,
        start_location: &str,
        options: InstallOptions,
    ) -> UpdateResult<InstallOutcome> {
        let outcome = scheduler::request_install(
            &self.ledger,
            self.host.content.as_ref(),
            start_location,
            options,
        )?;
        if matches!(outcome, InstallOutcome::Applied(_)) {
            self.flags.did_update = true;
        }
        Ok(outcome)
    }

    pub fn pre_install(&self, start_location: &str) -> UpdateResult<()> {
        scheduler::resolve_start_page(self.ledger.layout(), start_location)?;
        Ok(())
    }

    /// True when `package_hash` is the current package and it was applied in this process.
    pub fn is_first_run(&self, package_hash: &str) -> UpdateResult<bool> {
        if !self.flags.did_update {
            return Ok(false);
        }
        Ok(self
            .ledger
            .current()?
            .is_some_and(|current| current.matches_hash(package_hash)))
    }

    pub fn record_deployment(&mut self, package: PackageMetadata) -> UpdateResult<()> {
        self.ledger.record_deployment(package)?;
        Ok(())
    }

    pub fn report_failed(&self, report: StatusReport) -> UpdateResult<()> {
        self.reporting().enqueue_failed(report)
    }

    pub fn report_succeeded(&self, report: StatusReport) -> UpdateResult<()> {
        self.reporting().enqueue_succeeded(report)
    }

    /// Re-runs the start transition for a deployed package, otherwise reloads the
    /// configured launch URL.
    pub fn restart_application(&mut self) -> UpdateResult<()> {
        if self.ledger.current()?.is_some() {
            self.flags.did_start_app = false;
            return self.on_start();
        }
        if self.flags.destroyed {
            debug!("session destroyed, skipping restart navigation");
            return Ok(());
        }
        let launch_url = self.config.launch_url().to_string();
        self.navigate_to_url(&launch_url);
        Ok(())
    }

    /// Host notification that a page finished loading.
    pub fn page_loaded(&mut self) {
        if self.flags.clear_history_on_load {
            self.flags.clear_history_on_load = false;
            self.host.content.clear_history();
        }
    }
}
