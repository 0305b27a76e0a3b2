use std::path::PathBuf;

use livepush_core::{InstallMode, InstallOptions, PackageMetadata};
use livepush_ledger::{LedgerError, LedgerLayout, LedgerResult, MetadataLedger};
use tracing::{debug, info, warn};

use crate::{ContentHost, NotFoundError, UpdateResult};

/// The lifecycle event a deferred install is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallTrigger {
    /// A fresh process start.
    Start,
    /// Return from background. `background_secs` is `None` when no pause was seen.
    Resume { background_secs: Option<u64> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Applied(PackageMetadata),
    Scheduled(InstallOptions),
}

/// Pre-flight check: the package at `start_location` must have a start page.
pub fn resolve_start_page(
    layout: &LedgerLayout,
    start_location: &str,
) -> Result<PathBuf, NotFoundError> {
    layout
        .start_page(start_location)
        .filter(|start_page| start_page.is_file())
        .ok_or(NotFoundError::StartPage)
}

/// Applies an install now or records it for a later lifecycle event.
///
/// An immediate install commits the confirmation flag before the content root is
/// switched, so a crash in between rolls back on the next start.
pub fn request_install(
    ledger: &MetadataLedger,
    content: &dyn ContentHost,
    start_location: &str,
    options: InstallOptions,
) -> UpdateResult<InstallOutcome> {
    let start_page = resolve_start_page(ledger.layout(), start_location)?;

    if options.install_mode != InstallMode::Immediate {
        ledger.save_pending(options)?;
        info!(
            install_mode = options.install_mode.as_str(),
            minimum_background_duration = options.minimum_background_duration,
            "deferred install scheduled"
        );
        return Ok(InstallOutcome::Scheduled(options));
    }

    let applied = ledger.commit_applied_install()?;
    if let Some(content_root) = start_page.parent() {
        content.set_server_base_path(content_root);
    }
    info!(label = %applied.label, "update applied immediately");
    Ok(InstallOutcome::Applied(applied))
}

pub fn is_due(pending: &InstallOptions, trigger: InstallTrigger) -> bool {
    match trigger {
        InstallTrigger::Start => pending.install_mode.applies_on_restart(),
        InstallTrigger::Resume { background_secs } => pending.is_due_on_resume(background_secs),
    }
}

/// Applies the pending install if `trigger` satisfies its mode. The pending record is
/// consumed in the same commit that sets the confirmation flag.
pub fn apply_pending(
    ledger: &MetadataLedger,
    trigger: InstallTrigger,
) -> LedgerResult<Option<PackageMetadata>> {
    let Some(pending) = ledger.pending()? else {
        return Ok(None);
    };
    if !is_due(&pending, trigger) {
        debug!(
            install_mode = pending.install_mode.as_str(),
            ?trigger,
            "pending install not due yet"
        );
        return Ok(None);
    }

    match ledger.commit_applied_install() {
        Ok(applied) => {
            info!(
                label = %applied.label,
                install_mode = pending.install_mode.as_str(),
                "pending install applied"
            );
            Ok(Some(applied))
        }
        Err(LedgerError::NoCurrentPackage) => {
            warn!("pending install has no deployed package, dropping it");
            ledger.clear_pending()?;
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
