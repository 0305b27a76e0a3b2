use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Context};
use livepush_core::{DeploymentIdentity, InstallOptions, PackageMetadata, StatusReport};
use tracing::{debug, info, warn};

use crate::state::{parse_ledger_state, serialize_ledger_state};
use crate::{LedgerError, LedgerLayout, LedgerResult, LedgerState};

/// Result of rolling back an unconfirmed package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackOutcome {
    pub rolled_back: PackageMetadata,
    pub restored: Option<PackageMetadata>,
}

/// Durable record of deployed packages and lifecycle flags.
///
/// Every mutation loads `state.json`, applies one change set and commits it with
/// write-to-temp + fsync + rename, so a crash leaves either the old or the new
/// document on disk and never a mix of the two.
#[derive(Debug)]
pub struct MetadataLedger {
    layout: LedgerLayout,
    write_lock: Mutex<()>,
}

impl MetadataLedger {
    pub fn open(layout: LedgerLayout) -> LedgerResult<Self> {
        layout.ensure_base_dirs()?;
        Ok(Self {
            layout,
            write_lock: Mutex::new(()),
        })
    }

    pub fn layout(&self) -> &LedgerLayout {
        &self.layout
    }

    pub fn snapshot(&self) -> LedgerResult<LedgerState> {
        self.load_state()
    }

    pub fn current(&self) -> LedgerResult<Option<PackageMetadata>> {
        Ok(self.load_state()?.current_package)
    }

    pub fn previous(&self) -> LedgerResult<Option<PackageMetadata>> {
        Ok(self.load_state()?.previous_package)
    }

    pub fn pending(&self) -> LedgerResult<Option<InstallOptions>> {
        Ok(self.load_state()?.pending_install)
    }

    /// Replaces any existing pending install.
    pub fn save_pending(&self, options: InstallOptions) -> LedgerResult<()> {
        self.update(|state| {
            state.pending_install = Some(options);
            Ok(())
        })
    }

    pub fn clear_pending(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.pending_install = None;
            Ok(())
        })
    }

    pub fn needs_confirmation(&self) -> LedgerResult<bool> {
        Ok(self.load_state()?.needs_confirmation)
    }

    pub fn mark_needs_confirmation(&self) -> LedgerResult<()> {
        self.update(|state| {
            if state.current_package.is_none() {
                return Err(LedgerError::NoCurrentPackage);
            }
            state.needs_confirmation = true;
            Ok(())
        })
    }

    pub fn clear_needs_confirmation(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.needs_confirmation = false;
            Ok(())
        })
    }

    /// Restores the previous package as current. The previous slot is emptied, so
    /// a second revert fails until another package is confirmed.
    pub fn revert_to_previous(&self) -> LedgerResult<PackageMetadata> {
        self.update(|state| {
            let previous = state
                .previous_package
                .take()
                .ok_or(LedgerError::NoPreviousPackage)?;
            state.current_package = Some(previous.clone());
            Ok(previous)
        })
    }

    /// Records a freshly unpacked package as current. A confirmed current package
    /// becomes the rollback target; an unconfirmed one is replaced outright and its
    /// confirmation flag dropped with it.
    pub fn record_deployment(&self, mut package: PackageMetadata) -> LedgerResult<()> {
        package.is_pending = true;
        self.update(|state| {
            if let Some(current) = state.current_package.take() {
                if current.is_pending {
                    debug!(
                        replaced = %current.package_hash,
                        "replacing unconfirmed package without backup"
                    );
                    state.needs_confirmation = false;
                } else {
                    state.previous_package = Some(current);
                }
            }
            info!(
                label = %package.label,
                package_hash = %package.package_hash,
                "recorded deployed package"
            );
            state.current_package = Some(package);
            Ok(())
        })
    }

    /// Marks the current package as applied: the confirmation flag is set and the
    /// pending install consumed in one commit.
    pub fn commit_applied_install(&self) -> LedgerResult<PackageMetadata> {
        self.update(|state| {
            let current = state
                .current_package
                .clone()
                .ok_or(LedgerError::NoCurrentPackage)?;
            state.needs_confirmation = true;
            state.pending_install = None;
            Ok(current)
        })
    }

    /// Clears the confirmation flag and marks the current package confirmed.
    pub fn confirm_current(&self) -> LedgerResult<Option<PackageMetadata>> {
        self.update(|state| {
            state.needs_confirmation = false;
            if let Some(current) = state.current_package.as_mut() {
                current.is_pending = false;
            }
            Ok(state.current_package.clone())
        })
    }

    /// Rolls back an unconfirmed package when the confirmation flag is set. The flag,
    /// the current/previous swap, the failed-update entry and the rollback report
    /// are committed together.
    pub fn commit_rollback(
        &self,
        report_for: impl FnOnce(&PackageMetadata) -> StatusReport,
    ) -> LedgerResult<Option<RollbackOutcome>> {
        self.update(|state| {
            if !state.needs_confirmation {
                return Ok(None);
            }
            state.needs_confirmation = false;

            let Some(rolled_back) = state.current_package.take() else {
                return Ok(None);
            };
            state
                .failed_updates
                .insert(rolled_back.package_hash.clone());
            state.rollback_report = Some(report_for(&rolled_back));

            let restored = state.previous_package.take();
            state.current_package = restored.clone();
            let restored_hash = restored
                .as_ref()
                .map(|p| p.package_hash.as_str())
                .unwrap_or("<bundled>");
            warn!(
                rolled_back = %rolled_back.package_hash,
                restored = restored_hash,
                "rolled back unconfirmed package"
            );
            Ok(Some(RollbackOutcome {
                rolled_back,
                restored,
            }))
        })
    }

    /// Drops a current package that was recorded but never scheduled or applied.
    pub fn discard_abandoned_deployment(&self) -> LedgerResult<Option<PackageMetadata>> {
        self.update(|state| {
            let is_abandoned = state
                .current_package
                .as_ref()
                .is_some_and(|current| current.is_pending)
                && !state.needs_confirmation
                && state.pending_install.is_none();
            if !is_abandoned {
                return Ok(None);
            }
            let abandoned = state.current_package.take();
            state.current_package = state.previous_package.take();
            Ok(abandoned)
        })
    }

    /// Forgets every deployment made for an older host binary.
    pub fn reset_deployments(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.current_package = None;
            state.previous_package = None;
            state.pending_install = None;
            state.needs_confirmation = false;
            state.binary_first_run_reported = false;
            state.failed_updates.clear();
            state.rollback_report = None;
            Ok(())
        })?;

        let deploy_dir = self.layout.deploy_dir();
        if let Err(err) = remove_dir_if_exists(&deploy_dir) {
            warn!(
                path = %deploy_dir.display(),
                error = %format!("{err:#}"),
                "failed to delete stale deployments"
            );
        }
        if let Err(err) = fs::create_dir_all(self.layout.versions_dir()) {
            warn!(error = %err, "failed to recreate versions directory");
        }
        Ok(())
    }

    /// Deletes package directories that are neither current nor previous. Best effort:
    /// failures are logged and the number of removed packages is returned.
    pub fn clean_old_packages(&self) -> usize {
        let state = match self.load_state() {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "skipping package cleanup, ledger unreadable");
                return 0;
            }
        };
        let keep: HashSet<_> = state
            .referenced_local_paths()
            .into_iter()
            .filter_map(|local_path| self.layout.resolve_local_path(local_path))
            .collect();

        let versions_dir = self.layout.versions_dir();
        let entries = match fs::read_dir(&versions_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return 0,
            Err(err) => {
                warn!(path = %versions_dir.display(), error = %err, "failed to list packages");
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if keep.contains(&path) {
                continue;
            }
            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "removed old package");
                    removed += 1;
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to remove old package");
                }
            }
        }
        removed
    }

    pub fn is_binary_first_run(&self) -> LedgerResult<bool> {
        Ok(!self.load_state()?.binary_first_run_reported)
    }

    pub fn mark_binary_first_run(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.binary_first_run_reported = true;
            Ok(())
        })
    }

    pub fn clear_binary_first_run_flag(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.binary_first_run_reported = false;
            Ok(())
        })
    }

    /// The cached binary hash, valid only for the build it was computed for.
    pub fn cached_binary_hash(&self, native_build_time: u64) -> LedgerResult<Option<String>> {
        Ok(self
            .load_state()?
            .binary_hash
            .filter(|record| record.native_build_time == native_build_time)
            .map(|record| record.hash))
    }

    pub fn save_binary_hash(&self, hash: &str, native_build_time: u64) -> LedgerResult<()> {
        self.update(|state| {
            state.binary_hash = Some(crate::BinaryHashRecord {
                hash: hash.to_string(),
                native_build_time,
            });
            Ok(())
        })
    }

    pub fn is_failed_update(&self, package_hash: &str) -> LedgerResult<bool> {
        Ok(self.load_state()?.failed_updates.contains(package_hash))
    }

    pub fn clear_failed_updates(&self) -> LedgerResult<()> {
        self.update(|state| {
            state.failed_updates.clear();
            Ok(())
        })
    }

    /// Keeps one failed report (last wins). A failed rollback report also
    /// remembers its package as failed.
    pub fn save_failed_report(&self, report: StatusReport) -> LedgerResult<()> {
        self.update(|state| {
            if let Some(package_hash) = report.failed_package_hash() {
                state.failed_updates.insert(package_hash.to_string());
            }
            state.failed_report = Some(report);
            Ok(())
        })
    }

    pub fn has_failed_report(&self) -> LedgerResult<bool> {
        Ok(self.load_state()?.failed_report.is_some())
    }

    /// The owed report stays in its slot until a delivery outcome settles it.
    pub fn failed_report(&self) -> LedgerResult<Option<StatusReport>> {
        Ok(self.load_state()?.failed_report)
    }

    pub fn take_failed_report(&self) -> LedgerResult<Option<StatusReport>> {
        self.update(|state| Ok(state.failed_report.take()))
    }

    pub fn take_rollback_report(&self) -> LedgerResult<Option<StatusReport>> {
        self.update(|state| Ok(state.rollback_report.take()))
    }

    pub fn last_deployment(&self) -> LedgerResult<Option<DeploymentIdentity>> {
        Ok(self.load_state()?.last_deployment)
    }

    /// Records a delivered report. Deployment statuses move the last-deployment
    /// marker; a matching failed report is no longer owed.
    pub fn record_delivered_report(&self, report: &StatusReport) -> LedgerResult<()> {
        self.update(|state| {
            if report.status.records_deployment() {
                state.last_deployment = Some(report.identity());
            }
            if state
                .failed_report
                .as_ref()
                .is_some_and(|owed| owed.describes_same_event(report))
            {
                state.failed_report = None;
            }
            Ok(())
        })
    }

    fn update<T>(
        &self,
        apply: impl FnOnce(&mut LedgerState) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow!("ledger write lock poisoned"))?;
        let before = self.load_state()?;
        let mut state = before.clone();
        let output = apply(&mut state)?;
        if state != before {
            self.commit(&state)?;
        }
        Ok(output)
    }

    fn load_state(&self) -> LedgerResult<LedgerState> {
        let path = self.layout.state_path();
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(LedgerState::default())
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("failed reading ledger: {}", path.display()))
                    .into());
            }
        };
        parse_ledger_state(&content).map_err(|err| match err {
            LedgerError::Storage(err) => LedgerError::Storage(
                err.context(format!("failed parsing ledger: {}", path.display())),
            ),
            other => other,
        })
    }

    fn commit(&self, state: &LedgerState) -> LedgerResult<()> {
        let bytes = serialize_ledger_state(state)?;
        let path = self.layout.state_path();
        let tmp_path = self.layout.state_tmp_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("failed to write {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", tmp_path.display()))?;
        drop(file);

        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                tmp_path.display(),
                path.display()
            )
        })?;
        sync_parent_dir(&path);
        Ok(())
    }
}

fn remove_dir_if_exists(path: &Path) -> anyhow::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
