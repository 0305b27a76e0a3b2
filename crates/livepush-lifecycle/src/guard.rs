use livepush_ledger::{LedgerResult, MetadataLedger};
use tracing::info;

/// Invalidates every downloaded deployment when the host binary changed underneath it.
///
/// Returns `true` when the ledger was reset. Without host introspection the check is
/// skipped, since an unknown build cannot be compared.
pub fn check_and_reconcile(
    ledger: &MetadataLedger,
    host_build_time: Option<u64>,
    host_app_version: Option<&str>,
) -> LedgerResult<bool> {
    let (Some(build_time), Some(app_version)) = (host_build_time, host_app_version) else {
        return Ok(false);
    };
    let Some(current) = ledger.current()? else {
        return Ok(false);
    };
    if current.targets_binary(build_time, app_version) {
        return Ok(false);
    }

    info!(
        deployed_build_time = current.native_build_time,
        deployed_app_version = %current.app_version,
        host_build_time = build_time,
        host_app_version = app_version,
        "host binary changed, clearing deployments"
    );
    ledger.reset_deployments()?;
    Ok(true)
}
