use std::sync::Arc;

use livepush_core::{PackageMetadata, UpdateConfig};
use livepush_ledger::{extract_archive, LedgerState, MetadataLedger};
use livepush_security::{bundle_hash, verify_signed_content_hash};
use tokio::sync::Mutex;
use tracing::debug;

use crate::deploy::stage_verified_package;
use crate::requests::{
    DecodeSignatureRequest, DeployRequest, InstallRequest, PackageHashRequest, ReportRequest,
    UnzipRequest,
};
use crate::{
    ConfirmationState, HostBindings, HostInfo, InstallOutcome, LifecycleEvent, NotFoundError,
    UpdateError, UpdateResult, UpdateSession,
};

/// Async operation surface for the host bridge.
///
/// Ledger sequences run on the blocking pool under one session lock. Signature
/// checks and hashing run on the blocking pool without it.
#[derive(Clone)]
pub struct UpdateService {
    session: Arc<Mutex<UpdateSession>>,
    ledger: Arc<MetadataLedger>,
    config: Arc<UpdateConfig>,
    info: Arc<dyn HostInfo>,
}

async fn run_blocking<T, F>(op: F) -> UpdateResult<T>
where
    F: FnOnce() -> UpdateResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(op).await?
}

impl UpdateService {
    pub fn new(ledger: MetadataLedger, config: UpdateConfig, host: HostBindings) -> Self {
        let ledger = Arc::new(ledger);
        let config = Arc::new(config);
        let info = Arc::clone(&host.info);
        let session = UpdateSession::new(Arc::clone(&ledger), Arc::clone(&config), host);
        Self {
            session: Arc::new(Mutex::new(session)),
            ledger,
            config,
            info,
        }
    }

    async fn with_session<T, F>(&self, op: F) -> UpdateResult<T>
    where
        F: FnOnce(&mut UpdateSession) -> UpdateResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let session = Arc::clone(&self.session);
        run_blocking(move || {
            let mut session = session.blocking_lock();
            op(&mut session)
        })
        .await
    }

    pub fn deployment_key(&self) -> UpdateResult<String> {
        Ok(self.config.deployment_key()?.to_string())
    }

    pub fn server_url(&self) -> UpdateResult<String> {
        Ok(self.config.server_url()?.to_string())
    }

    pub fn public_key(&self) -> UpdateResult<String> {
        Ok(self.config.public_key()?.to_string())
    }

    pub fn app_version(&self) -> UpdateResult<String> {
        self.info
            .app_version()
            .ok_or(UpdateError::IntrospectionUnavailable("app version"))
    }

    pub fn native_build_time(&self) -> UpdateResult<u64> {
        self.info
            .native_build_time()
            .ok_or(UpdateError::IntrospectionUnavailable("native build time"))
    }

    pub async fn decode_signature(&self, request: DecodeSignatureRequest) -> UpdateResult<String> {
        request.validate()?;
        run_blocking(move || {
            Ok(verify_signed_content_hash(
                &request.signed_attestation,
                &request.public_key,
            )?)
        })
        .await
    }

    /// Hash of the web assets bundled with the binary, cached per native build.
    pub async fn binary_hash(&self) -> UpdateResult<String> {
        let build_time = self.native_build_time()?;
        let ledger = Arc::clone(&self.ledger);
        let cached = run_blocking(move || Ok(ledger.cached_binary_hash(build_time)?)).await?;
        if let Some(hash) = cached {
            return Ok(hash);
        }

        let assets_dir = self
            .info
            .binary_assets_dir()
            .ok_or(UpdateError::IntrospectionUnavailable("binary assets directory"))?;
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || {
            let hash = bundle_hash(&assets_dir).map_err(UpdateError::Internal)?;
            ledger.save_binary_hash(&hash, build_time)?;
            debug!(hash = %hash, build_time, "binary hash computed");
            Ok(hash)
        })
        .await
    }

    pub async fn package_hash(&self, request: PackageHashRequest) -> UpdateResult<String> {
        let content_root = self
            .ledger
            .layout()
            .content_root(&request.path)
            .ok_or_else(|| {
                UpdateError::InvalidRequest(format!("invalid package path: '{}'", request.path))
            })?;
        run_blocking(move || bundle_hash(&content_root).map_err(UpdateError::Internal)).await
    }

    pub async fn unzip(&self, request: UnzipRequest) -> UpdateResult<()> {
        run_blocking(move || {
            extract_archive(&request.archive_path, &request.target_dir)
                .map_err(UpdateError::Extraction)
        })
        .await
    }

    pub async fn handle_event(
        &self,
        event: LifecycleEvent,
    ) -> UpdateResult<Option<ConfirmationState>> {
        self.with_session(move |session| session.handle_event(event))
            .await
    }

    pub async fn notify_application_ready(&self) -> UpdateResult<ConfirmationState> {
        let state = self.handle_event(LifecycleEvent::Ready).await?;
        Ok(state.unwrap_or(ConfirmationState::NoPendingConfirmation))
    }

    pub async fn is_first_run(&self, package_hash: String) -> UpdateResult<bool> {
        self.with_session(move |session| session.is_first_run(&package_hash))
            .await
    }

    pub async fn is_pending_update(&self) -> UpdateResult<bool> {
        self.with_session(|session| Ok(session.ledger().pending()?.is_some()))
            .await
    }

    pub async fn is_failed_update(&self, package_hash: String) -> UpdateResult<bool> {
        self.with_session(move |session| Ok(session.ledger().is_failed_update(&package_hash)?))
            .await
    }

    pub async fn install(&self, request: InstallRequest) -> UpdateResult<InstallOutcome> {
        self.with_session(move |session| {
            session.install(&request.start_location, request.options())
        })
        .await
    }

    pub async fn pre_install(&self, start_location: String) -> UpdateResult<()> {
        self.with_session(move |session| session.pre_install(&start_location))
            .await
    }

    pub async fn report_failed(&self, request: ReportRequest) -> UpdateResult<()> {
        self.with_session(move |session| session.report_failed(request.status_report))
            .await
    }

    pub async fn report_succeeded(&self, request: ReportRequest) -> UpdateResult<()> {
        self.with_session(move |session| session.report_succeeded(request.status_report))
            .await
    }

    pub async fn restart_application(&self) -> UpdateResult<()> {
        self.with_session(|session| session.restart_application())
            .await
    }

    pub async fn page_loaded(&self) -> UpdateResult<()> {
        self.with_session(|session| {
            session.page_loaded();
            Ok(())
        })
        .await
    }

    /// Stages, verifies and records a downloaded update as the current (pending) package.
    ///
    /// Runs under the session lock so old-package cleanup cannot race the new directory.
    pub async fn deploy_package(&self, request: DeployRequest) -> UpdateResult<PackageMetadata> {
        let native_build_time = self.native_build_time()?;
        let config = Arc::clone(&self.config);
        self.with_session(move |session| {
            let package = stage_verified_package(
                session.ledger().layout(),
                &config,
                &request,
                native_build_time,
            )?;
            session.record_deployment(package.clone())?;
            Ok(package)
        })
        .await
    }

    pub async fn snapshot(&self) -> UpdateResult<LedgerState> {
        self.with_session(|session| Ok(session.ledger().snapshot()?))
            .await
    }

    /// Current package, or `NotFound` when the app runs its bundled content.
    pub async fn current_package(&self) -> UpdateResult<PackageMetadata> {
        self.with_session(|session| {
            session
                .ledger()
                .current()?
                .ok_or(UpdateError::NotFound(NotFoundError::CurrentPackage))
        })
        .await
    }
}
