use super::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use livepush_core::{
    DeploymentIdentity, InstallMode, InstallOptions, PackageMetadata, ReportStatus, StatusReport,
};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_layout_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "livepush-ledger-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_layout() -> LedgerLayout {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    LedgerLayout::new(build_test_layout_path(nanos))
}

fn open_ledger() -> MetadataLedger {
    MetadataLedger::open(test_layout()).expect("must open ledger")
}

fn package(layout: &LedgerLayout, label: &str, hash: &str) -> PackageMetadata {
    PackageMetadata {
        label: label.to_string(),
        package_hash: hash.to_string(),
        app_version: "1.0.0".to_string(),
        deployment_key: "prod".to_string(),
        local_path: layout.package_local_path(hash),
        native_build_time: 1_000,
        is_pending: false,
    }
}

fn confirmed_deployment(ledger: &MetadataLedger, label: &str, hash: &str) -> PackageMetadata {
    let package = package(ledger.layout(), label, hash);
    ledger
        .record_deployment(package.clone())
        .expect("must record deployment");
    ledger.confirm_current().expect("must confirm");
    PackageMetadata {
        is_pending: false,
        ..package
    }
}

fn rollback_report(package: &PackageMetadata) -> StatusReport {
    StatusReport::new(
        ReportStatus::UpdateRolledBack,
        Some(package.label.clone()),
        package.app_version.clone(),
        package.deployment_key.clone(),
    )
    .with_package_hash(package.package_hash.clone())
}

fn cleanup(ledger: &MetadataLedger) {
    let _ = fs::remove_dir_all(ledger.layout().root());
}

#[test]
fn build_test_layout_path_disambiguates_same_timestamp_calls() {
    let first = build_test_layout_path(42);
    let second = build_test_layout_path(42);
    assert_ne!(first, second);
}

#[test]
fn empty_ledger_reports_defaults() {
    let ledger = open_ledger();

    assert!(ledger.current().expect("current").is_none());
    assert!(ledger.previous().expect("previous").is_none());
    assert!(ledger.pending().expect("pending").is_none());
    assert!(!ledger.needs_confirmation().expect("flag"));
    assert!(ledger.is_binary_first_run().expect("first run"));
    assert!(!ledger.has_failed_report().expect("failed report"));
    assert!(!ledger.layout().state_path().exists());

    cleanup(&ledger);
}

#[test]
fn save_pending_is_last_write_wins() {
    let ledger = open_ledger();

    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextRestart, 0))
        .expect("save");
    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextResume, 60))
        .expect("save");
    assert_eq!(
        ledger.pending().expect("pending"),
        Some(InstallOptions::new(InstallMode::OnNextResume, 60))
    );

    ledger.clear_pending().expect("clear");
    assert!(ledger.pending().expect("pending").is_none());
    cleanup(&ledger);
}

#[test]
fn confirmation_flag_requires_a_current_package() {
    let ledger = open_ledger();

    let err = ledger
        .mark_needs_confirmation()
        .expect_err("must refuse flag without package");
    assert!(matches!(err, LedgerError::NoCurrentPackage));
    assert!(!ledger.needs_confirmation().expect("flag"));

    confirmed_deployment(&ledger, "v1", "h1");
    ledger.mark_needs_confirmation().expect("mark");
    assert!(ledger.needs_confirmation().expect("flag"));
    ledger.clear_needs_confirmation().expect("clear");
    assert!(!ledger.needs_confirmation().expect("flag"));
    cleanup(&ledger);
}

#[test]
fn recording_over_confirmed_package_keeps_it_as_rollback_target() {
    let ledger = open_ledger();
    let v1 = confirmed_deployment(&ledger, "v1", "h1");

    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");

    let current = ledger.current().expect("current").expect("some");
    assert_eq!(current.label, "v2");
    assert!(current.is_pending);
    assert_eq!(ledger.previous().expect("previous"), Some(v1));
    cleanup(&ledger);
}

#[test]
fn recording_over_unconfirmed_package_does_not_back_it_up() {
    let ledger = open_ledger();
    let v1 = confirmed_deployment(&ledger, "v1", "h1");
    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");
    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextRestart, 0))
        .expect("pending");

    ledger
        .record_deployment(package(ledger.layout(), "v3", "h3"))
        .expect("record");

    assert_eq!(ledger.current().expect("current").expect("some").label, "v3");
    assert_eq!(ledger.previous().expect("previous"), Some(v1));
    cleanup(&ledger);
}

#[test]
fn recording_over_applied_but_unconfirmed_package_drops_its_flag() {
    let ledger = open_ledger();
    confirmed_deployment(&ledger, "v1", "h1");
    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");
    ledger.commit_applied_install().expect("apply");

    ledger
        .record_deployment(package(ledger.layout(), "v3", "h3"))
        .expect("record");

    assert!(!ledger.needs_confirmation().expect("flag"));
    assert_eq!(ledger.previous().expect("previous").expect("some").label, "v1");
    cleanup(&ledger);
}

#[test]
fn revert_is_not_cyclic_beyond_one_level() {
    let ledger = open_ledger();
    let v1 = confirmed_deployment(&ledger, "v1", "h1");
    confirmed_deployment(&ledger, "v2", "h2");

    let restored = ledger.revert_to_previous().expect("first revert");
    assert_eq!(restored, v1);
    assert_eq!(ledger.current().expect("current"), Some(v1));

    let err = ledger
        .revert_to_previous()
        .expect_err("second revert must fail");
    assert!(matches!(err, LedgerError::NoPreviousPackage));
    cleanup(&ledger);
}

#[test]
fn rollback_commits_flag_swap_failure_and_report_together() {
    let ledger = open_ledger();
    let v1 = confirmed_deployment(&ledger, "v1", "h1");
    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");
    ledger.commit_applied_install().expect("apply");

    let outcome = ledger
        .commit_rollback(rollback_report)
        .expect("rollback")
        .expect("must roll back");

    assert_eq!(outcome.rolled_back.label, "v2");
    assert_eq!(outcome.restored, Some(v1.clone()));

    let state = ledger.snapshot().expect("snapshot");
    assert!(!state.needs_confirmation);
    assert_eq!(state.current_package, Some(v1));
    assert!(state.previous_package.is_none());
    assert!(state.failed_updates.contains("h2"));
    let report = state.rollback_report.expect("rollback report");
    assert_eq!(report.status, ReportStatus::UpdateRolledBack);
    assert_eq!(report.label.as_deref(), Some("v2"));

    assert!(ledger.take_rollback_report().expect("take").is_some());
    assert!(ledger.take_rollback_report().expect("take").is_none());
    cleanup(&ledger);
}

#[test]
fn rollback_without_flag_is_a_no_op() {
    let ledger = open_ledger();
    confirmed_deployment(&ledger, "v1", "h1");

    let outcome = ledger.commit_rollback(rollback_report).expect("rollback");
    assert!(outcome.is_none());
    assert_eq!(ledger.current().expect("current").expect("some").label, "v1");
    cleanup(&ledger);
}

#[test]
fn rollback_of_first_update_falls_back_to_bundled_content() {
    let ledger = open_ledger();
    ledger
        .record_deployment(package(ledger.layout(), "v1", "h1"))
        .expect("record");
    ledger.commit_applied_install().expect("apply");

    let outcome = ledger
        .commit_rollback(rollback_report)
        .expect("rollback")
        .expect("must roll back");
    assert!(outcome.restored.is_none());
    assert!(ledger.current().expect("current").is_none());
    assert!(!ledger.needs_confirmation().expect("flag"));
    cleanup(&ledger);
}

#[test]
fn applied_install_sets_flag_and_consumes_pending() {
    let ledger = open_ledger();
    ledger
        .record_deployment(package(ledger.layout(), "v1", "h1"))
        .expect("record");
    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextRestart, 0))
        .expect("pending");

    let applied = ledger.commit_applied_install().expect("apply");
    assert_eq!(applied.label, "v1");
    assert!(ledger.needs_confirmation().expect("flag"));
    assert!(ledger.pending().expect("pending").is_none());

    let confirmed = ledger.confirm_current().expect("confirm").expect("current");
    assert!(!confirmed.is_pending);
    assert!(!ledger.needs_confirmation().expect("flag"));
    cleanup(&ledger);
}

#[test]
fn abandoned_deployment_is_discarded_in_favour_of_previous() {
    let ledger = open_ledger();
    let v1 = confirmed_deployment(&ledger, "v1", "h1");
    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");

    let discarded = ledger
        .discard_abandoned_deployment()
        .expect("discard")
        .expect("must discard");
    assert_eq!(discarded.label, "v2");
    assert_eq!(ledger.current().expect("current"), Some(v1));
    assert!(ledger
        .discard_abandoned_deployment()
        .expect("discard")
        .is_none());
    cleanup(&ledger);
}

#[test]
fn scheduled_deployment_is_not_abandoned() {
    let ledger = open_ledger();
    ledger
        .record_deployment(package(ledger.layout(), "v1", "h1"))
        .expect("record");
    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextResume, 0))
        .expect("pending");

    assert!(ledger
        .discard_abandoned_deployment()
        .expect("discard")
        .is_none());
    cleanup(&ledger);
}

#[test]
fn reset_deployments_clears_every_binary_scoped_field() {
    let ledger = open_ledger();
    confirmed_deployment(&ledger, "v1", "h1");
    ledger
        .record_deployment(package(ledger.layout(), "v2", "h2"))
        .expect("record");
    ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextRestart, 0))
        .expect("pending");
    ledger.mark_needs_confirmation().expect("mark");
    ledger.mark_binary_first_run().expect("first run");
    ledger
        .save_failed_report(rollback_report(&package(ledger.layout(), "v0", "h0")))
        .expect("failed report");
    fs::create_dir_all(ledger.layout().package_dir("h1")).expect("package dir");

    ledger.reset_deployments().expect("reset");

    let state = ledger.snapshot().expect("snapshot");
    assert!(state.current_package.is_none());
    assert!(state.previous_package.is_none());
    assert!(state.pending_install.is_none());
    assert!(!state.needs_confirmation);
    assert!(!state.binary_first_run_reported);
    assert!(state.failed_updates.is_empty());
    assert!(!ledger.layout().package_dir("h1").exists());
    assert!(ledger.layout().versions_dir().exists());
    cleanup(&ledger);
}

#[test]
fn clean_old_packages_keeps_current_and_previous() {
    let ledger = open_ledger();
    confirmed_deployment(&ledger, "v1", "h1");
    confirmed_deployment(&ledger, "v2", "h2");
    for hash in ["h0", "h1", "h2"] {
        let dir = ledger.layout().package_dir(hash).join("public");
        fs::create_dir_all(&dir).expect("package dir");
        fs::write(dir.join("index.html"), hash).expect("start page");
    }

    let removed = ledger.clean_old_packages();

    assert_eq!(removed, 1);
    assert!(!ledger.layout().package_dir("h0").exists());
    assert!(ledger.layout().package_dir("h1").exists());
    assert!(ledger.layout().package_dir("h2").exists());
    cleanup(&ledger);
}

#[test]
fn clean_old_packages_tolerates_missing_versions_dir() {
    let ledger = open_ledger();
    fs::remove_dir_all(ledger.layout().versions_dir()).expect("remove versions dir");
    assert_eq!(ledger.clean_old_packages(), 0);
    cleanup(&ledger);
}

#[test]
fn binary_hash_cache_is_scoped_to_build_time() {
    let ledger = open_ledger();

    ledger.save_binary_hash("abc", 10).expect("save");
    assert_eq!(
        ledger.cached_binary_hash(10).expect("cached").as_deref(),
        Some("abc")
    );
    assert!(ledger.cached_binary_hash(11).expect("cached").is_none());
    cleanup(&ledger);
}

#[test]
fn binary_first_run_flag_round_trip() {
    let ledger = open_ledger();

    assert!(ledger.is_binary_first_run().expect("flag"));
    ledger.mark_binary_first_run().expect("mark");
    assert!(!ledger.is_binary_first_run().expect("flag"));
    ledger.clear_binary_first_run_flag().expect("clear");
    assert!(ledger.is_binary_first_run().expect("flag"));
    cleanup(&ledger);
}

#[test]
fn failed_report_slot_keeps_last_failure_and_marks_package_failed() {
    let ledger = open_ledger();
    let first = rollback_report(&package(ledger.layout(), "v1", "h1"));
    let second = rollback_report(&package(ledger.layout(), "v2", "h2"));

    ledger.save_failed_report(first).expect("save");
    ledger.save_failed_report(second.clone()).expect("save");

    assert!(ledger.has_failed_report().expect("has"));
    assert!(ledger.is_failed_update("h1").expect("failed"));
    assert!(ledger.is_failed_update("h2").expect("failed"));
    assert_eq!(ledger.failed_report().expect("read"), Some(second.clone()));
    assert!(ledger.has_failed_report().expect("has"));
    assert_eq!(ledger.take_failed_report().expect("take"), Some(second));
    assert!(!ledger.has_failed_report().expect("has"));

    ledger.clear_failed_updates().expect("clear");
    assert!(!ledger.is_failed_update("h1").expect("failed"));
    cleanup(&ledger);
}

#[test]
fn failed_confirmation_report_does_not_mark_package_failed() {
    let ledger = open_ledger();
    let confirmed = StatusReport::new(
        ReportStatus::UpdateConfirmed,
        Some("v1".to_string()),
        "1.0.0",
        "prod",
    )
    .with_package_hash("h1");

    ledger.save_failed_report(confirmed.clone()).expect("save");

    assert!(!ledger.is_failed_update("h1").expect("failed"));
    assert_eq!(ledger.failed_report().expect("read"), Some(confirmed));
    cleanup(&ledger);
}

#[test]
fn delivered_report_settles_failure_sent_with_previous_identity() {
    let ledger = open_ledger();
    let owed = rollback_report(&package(ledger.layout(), "v6", "h6"));
    ledger.save_failed_report(owed.clone()).expect("save");

    let previous = DeploymentIdentity {
        label_or_app_version: "v5".to_string(),
        deployment_key: "prod".to_string(),
    };
    let sent = owed.with_previous(Some(&previous));
    ledger.record_delivered_report(&sent).expect("deliver");

    assert!(!ledger.has_failed_report().expect("has"));
    assert!(ledger.is_failed_update("h6").expect("failed"));
    cleanup(&ledger);
}

#[test]
fn delivered_report_moves_last_deployment_and_settles_failure() {
    let ledger = open_ledger();
    let confirmed = StatusReport::new(
        ReportStatus::UpdateConfirmed,
        Some("v4".to_string()),
        "1.0.0",
        "prod",
    );
    ledger.save_failed_report(confirmed.clone()).expect("save");

    ledger.record_delivered_report(&confirmed).expect("deliver");

    assert!(!ledger.has_failed_report().expect("has"));
    let last = ledger.last_deployment().expect("last").expect("some");
    assert_eq!(last.label_or_app_version, "v4");

    let rolled_back = rollback_report(&package(ledger.layout(), "v5", "h5"));
    ledger.record_delivered_report(&rolled_back).expect("deliver");
    assert_eq!(
        ledger
            .last_deployment()
            .expect("last")
            .expect("some")
            .label_or_app_version,
        "v4"
    );
    cleanup(&ledger);
}

#[test]
fn ledger_survives_reopen_and_leaves_no_temp_file() {
    let layout = test_layout();
    {
        let ledger = MetadataLedger::open(layout.clone()).expect("open");
        confirmed_deployment(&ledger, "v1", "h1");
        ledger
            .save_pending(InstallOptions::new(InstallMode::OnNextResume, 30))
            .expect("pending");
    }

    let reopened = MetadataLedger::open(layout.clone()).expect("reopen");
    assert_eq!(
        reopened.current().expect("current").expect("some").label,
        "v1"
    );
    assert_eq!(
        reopened.pending().expect("pending"),
        Some(InstallOptions::new(InstallMode::OnNextResume, 30))
    );
    assert!(!layout.state_tmp_path().exists());

    let raw = fs::read_to_string(layout.state_path()).expect("state file");
    for key in [
        "\"version\"",
        "\"current_package\"",
        "\"previous_package\"",
        "\"pending_install\"",
        "\"needs_confirmation\"",
        "\"failed_updates\"",
    ] {
        assert!(raw.contains(key), "missing {key} in {raw}");
    }
    cleanup(&reopened);
}

#[test]
fn unsupported_ledger_version_is_rejected() {
    let ledger = open_ledger();
    fs::write(ledger.layout().state_path(), "{\"version\": 99}").expect("write");

    let err = ledger.current().expect_err("must reject");
    assert!(matches!(
        err,
        LedgerError::UnsupportedVersion {
            found: 99,
            expected: LEDGER_FORMAT_VERSION
        }
    ));
    cleanup(&ledger);
}

#[test]
fn corrupt_ledger_is_a_storage_error_and_is_not_overwritten() {
    let ledger = open_ledger();
    fs::write(ledger.layout().state_path(), "{not json").expect("write");

    let err = ledger
        .save_pending(InstallOptions::new(InstallMode::OnNextRestart, 0))
        .expect_err("must fail");
    assert!(matches!(err, LedgerError::Storage(_)));
    assert_eq!(
        fs::read_to_string(ledger.layout().state_path()).expect("read"),
        "{not json"
    );
    cleanup(&ledger);
}

#[test]
fn local_paths_cannot_escape_the_root() {
    let layout = test_layout();

    assert!(layout.resolve_local_path("../etc").is_none());
    assert!(layout.resolve_local_path("/etc/passwd").is_none());
    assert!(layout.resolve_local_path("").is_none());
    assert_eq!(
        layout.start_page("livepush/deploy/versions/h1"),
        Some(
            layout
                .root()
                .join("livepush/deploy/versions/h1")
                .join("public")
                .join("index.html")
        )
    );
}

fn tar_available() -> bool {
    Command::new("tar")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn build_tar(source: &Path, archive: &Path) {
    let status = Command::new("tar")
        .arg("-cf")
        .arg(archive)
        .arg("-C")
        .arg(source)
        .arg(".")
        .status()
        .expect("tar must run");
    assert!(status.success());
}

#[test]
fn stage_bundle_moves_archive_content_into_package_public_dir() {
    if !tar_available() {
        return;
    }
    let ledger = open_ledger();
    let source = ledger.layout().root().join("source");
    fs::create_dir_all(source.join("js")).expect("source dir");
    fs::write(source.join("index.html"), "<html></html>").expect("index");
    fs::write(source.join("js/app.js"), "1").expect("app");
    let archive = ledger.layout().root().join("update.tar");
    build_tar(&source, &archive);

    let package_dir = stage_bundle(ledger.layout(), &archive, "h1").expect("stage");

    assert_eq!(package_dir, ledger.layout().package_dir("h1"));
    assert!(package_dir.join("public/index.html").is_file());
    assert!(package_dir.join("public/js/app.js").is_file());
    assert!(!ledger.layout().unzip_dir().exists());

    remove_package_dir(ledger.layout(), "h1").expect("remove");
    assert!(!package_dir.exists());
    cleanup(&ledger);
}

#[test]
fn stage_bundle_unwraps_single_public_directory() {
    if !tar_available() {
        return;
    }
    let ledger = open_ledger();
    let source = ledger.layout().root().join("source");
    fs::create_dir_all(source.join("public")).expect("source dir");
    fs::write(source.join("public/index.html"), "<html></html>").expect("index");
    let archive = ledger.layout().root().join("update.tar");
    build_tar(&source, &archive);

    let package_dir = stage_bundle(ledger.layout(), &archive, "h2").expect("stage");
    assert!(package_dir.join("public/index.html").is_file());
    assert!(!package_dir.join("public/public").exists());
    cleanup(&ledger);
}

#[test]
fn stage_bundle_rejects_missing_archive_and_bad_hash() {
    let ledger = open_ledger();
    let missing = ledger.layout().root().join("missing.zip");

    assert!(extract_archive(&missing, &ledger.layout().unzip_dir()).is_err());
    assert!(stage_bundle(ledger.layout(), &missing, "../evil").is_err());
    cleanup(&ledger);
}
