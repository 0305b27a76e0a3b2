use std::fs;
use std::io;
use std::path::Path;

use livepush_core::{PackageMetadata, UpdateConfig};
use livepush_ledger::{remove_package_dir, stage_bundle, LedgerLayout};
use livepush_security::{
    bundle_hash, verify_signed_content_hash, VerificationError, SIGNATURE_FILE_NAME,
};
use tracing::{info, warn};

use crate::requests::DeployRequest;
use crate::{UpdateError, UpdateResult};

/// Unpacks a downloaded archive into the package store and checks it against its
/// descriptor. A package that fails any check is deleted before the error returns.
pub fn stage_verified_package(
    layout: &LedgerLayout,
    config: &UpdateConfig,
    request: &DeployRequest,
    native_build_time: u64,
) -> UpdateResult<PackageMetadata> {
    request.validate()?;
    let package_dir = stage_bundle(layout, &request.archive_path, &request.package_hash)
        .map_err(UpdateError::Extraction)?;

    if let Err(err) = verify_package(&package_dir.join("public"), config, &request.package_hash) {
        if let Err(cleanup_err) = remove_package_dir(layout, &request.package_hash) {
            warn!(
                package_hash = %request.package_hash,
                error = %format!("{cleanup_err:#}"),
                "failed to remove rejected package"
            );
        }
        return Err(err);
    }

    info!(
        label = %request.label,
        package_hash = %request.package_hash,
        "package staged and verified"
    );
    Ok(PackageMetadata {
        label: request.label.clone(),
        package_hash: request.package_hash.clone(),
        app_version: request.app_version.clone(),
        deployment_key: request.deployment_key.clone(),
        local_path: layout.package_local_path(&request.package_hash),
        native_build_time,
        is_pending: true,
    })
}

fn verify_package(
    content_root: &Path,
    config: &UpdateConfig,
    package_hash: &str,
) -> UpdateResult<()> {
    let actual = bundle_hash(content_root).map_err(UpdateError::Internal)?;
    if actual != package_hash {
        return Err(UpdateError::IntegrityCheckFailed {
            expected: package_hash.to_string(),
            actual,
        });
    }

    let signature_path = content_root.join(SIGNATURE_FILE_NAME);
    if !config.signing_enabled() {
        if signature_path.exists() {
            warn!("package is signed but no public key is configured, skipping signature check");
        }
        return Ok(());
    }

    let signed_attestation = match fs::read_to_string(&signature_path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(VerificationError::SignatureInvalid(
                "package carries no release signature".to_string(),
            )
            .into());
        }
        Err(err) => {
            return Err(UpdateError::Internal(anyhow::Error::new(err).context(format!(
                "failed to read {}",
                signature_path.display()
            ))));
        }
    };

    let content_hash = verify_signed_content_hash(&signed_attestation, config.public_key()?)?;
    if content_hash != package_hash {
        return Err(VerificationError::SignatureInvalid(format!(
            "signed content hash {content_hash} does not match package hash {package_hash}"
        ))
        .into());
    }
    Ok(())
}
