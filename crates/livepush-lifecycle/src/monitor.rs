use livepush_core::{PackageMetadata, ReportStatus, StatusReport};
use livepush_ledger::{LedgerResult, MetadataLedger, RollbackOutcome};
use tracing::{info, warn};

use crate::ReportingQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    NoPendingConfirmation,
    AwaitingConfirmation,
    Confirmed,
    RolledBack,
}

impl ConfirmationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoPendingConfirmation => "no_pending_confirmation",
            Self::AwaitingConfirmation => "awaiting_confirmation",
            Self::Confirmed => "confirmed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// Identity used for binary-level reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryIdentity {
    pub app_version: String,
    pub deployment_key: String,
}

pub fn current_state(ledger: &MetadataLedger) -> LedgerResult<ConfirmationState> {
    Ok(if ledger.needs_confirmation()? {
        ConfirmationState::AwaitingConfirmation
    } else {
        ConfirmationState::NoPendingConfirmation
    })
}

pub fn rollback_report(package: &PackageMetadata) -> StatusReport {
    StatusReport::new(
        ReportStatus::UpdateRolledBack,
        Some(package.label.clone()),
        package.app_version.clone(),
        package.deployment_key.clone(),
    )
    .with_package_hash(package.package_hash.clone())
}

/// Start-time rollback of an applied update that was never confirmed.
///
/// A pending install supersedes the stale confirmation, so nothing is rolled back
/// while one exists. The rollback report is committed with the rollback itself.
pub fn rollback_if_unconfirmed(ledger: &MetadataLedger) -> LedgerResult<Option<RollbackOutcome>> {
    if ledger.pending()?.is_some() {
        return Ok(None);
    }
    ledger.commit_rollback(rollback_report)
}

/// Handles the once-per-process readiness signal and returns the state it settled in.
///
/// `binary` is `None` when the app version or deployment key is unavailable; the
/// first-run report is then skipped but the first run is still recorded.
pub fn on_ready(
    ledger: &MetadataLedger,
    reporting: &ReportingQueue<'_>,
    binary: Option<BinaryIdentity>,
) -> LedgerResult<ConfirmationState> {
    let state = if ledger.is_binary_first_run()? {
        ledger.mark_binary_first_run()?;
        match binary {
            Some(binary) => {
                reporting.send(StatusReport::new(
                    ReportStatus::StoreVersion,
                    None,
                    binary.app_version,
                    binary.deployment_key,
                ))?;
            }
            None => warn!("binary identity unavailable, skipping store version report"),
        }
        ConfirmationState::NoPendingConfirmation
    } else if ledger.needs_confirmation()? {
        match ledger.confirm_current()? {
            Some(current) => {
                info!(label = %current.label, "update confirmed");
                reporting.send(StatusReport::new(
                    ReportStatus::UpdateConfirmed,
                    Some(current.label.clone()),
                    current.app_version.clone(),
                    current.deployment_key.clone(),
                ))?;
                ConfirmationState::Confirmed
            }
            None => ConfirmationState::NoPendingConfirmation,
        }
    } else if let Some(report) = ledger.take_rollback_report()? {
        reporting.send(report)?;
        ConfirmationState::RolledBack
    } else {
        reporting.retry_failed()?;
        ConfirmationState::NoPendingConfirmation
    };

    // Close-out runs on every branch.
    if ledger.needs_confirmation()? {
        ledger.confirm_current()?;
    }
    ledger.clean_old_packages();
    Ok(state)
}
