use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};

use crate::LedgerLayout;

/// Unpacks a downloaded update archive into `dst`, trying each platform extractor in turn.
pub fn extract_archive(archive_path: &Path, dst: &Path) -> Result<()> {
    if !archive_path.is_file() {
        return Err(anyhow!(
            "update archive not found: {}",
            archive_path.display()
        ));
    }
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;

    let mut last_error = None;
    for extractor in extractors(archive_path, dst) {
        match run_extractor(extractor) {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(error = %format!("{err:#}"), "extractor failed, trying next");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("no archive extractor available")))
}

struct Extractor {
    name: &'static str,
    command: Command,
}

fn extractors(archive_path: &Path, dst: &Path) -> Vec<Extractor> {
    let mut candidates = Vec::with_capacity(3);
    if cfg!(windows) {
        let mut command = Command::new("powershell");
        command.args(["-NoProfile", "-Command"]).arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            quote_for_powershell(archive_path),
            quote_for_powershell(dst)
        ));
        candidates.push(Extractor {
            name: "powershell",
            command,
        });
    }

    let mut unzip = Command::new("unzip");
    unzip.args(["-q", "-o"]).arg(archive_path).arg("-d").arg(dst);
    candidates.push(Extractor {
        name: "unzip",
        command: unzip,
    });

    let mut tar = Command::new("tar");
    tar.arg("-xf").arg(archive_path).arg("-C").arg(dst);
    candidates.push(Extractor { name: "tar", command: tar });
    candidates
}

fn run_extractor(mut extractor: Extractor) -> Result<()> {
    let output = extractor
        .command
        .output()
        .with_context(|| format!("could not launch {} to unpack update", extractor.name))?;
    if output.status.success() {
        return Ok(());
    }
    Err(anyhow!(
        "{} exited with {}: {}",
        extractor.name,
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    ))
}

fn quote_for_powershell(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

/// Extracts `archive_path` through the scratch unzip directory and moves the bundle
/// content into `versions/<package_hash>/public`. Returns the package directory.
pub fn stage_bundle(
    layout: &LedgerLayout,
    archive_path: &Path,
    package_hash: &str,
) -> Result<PathBuf> {
    if package_hash.is_empty()
        || !package_hash
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        return Err(anyhow!("invalid package hash: '{package_hash}'"));
    }

    let unzip_dir = layout.unzip_dir();
    if unzip_dir.exists() {
        fs::remove_dir_all(&unzip_dir)
            .with_context(|| format!("failed to clean {}", unzip_dir.display()))?;
    }
    extract_archive(archive_path, &unzip_dir)?;

    let package_dir = layout.package_dir(package_hash);
    if package_dir.exists() {
        fs::remove_dir_all(&package_dir).with_context(|| {
            format!(
                "failed to remove existing package dir: {}",
                package_dir.display()
            )
        })?;
    }

    let source = bundle_content_root(&unzip_dir)?;
    relocate_bundle(&source, &package_dir.join("public"))?;

    if unzip_dir.exists() {
        if let Err(err) = fs::remove_dir_all(&unzip_dir) {
            warn!(path = %unzip_dir.display(), error = %err, "failed to clean unzip dir");
        }
    }
    Ok(package_dir)
}

pub fn remove_package_dir(layout: &LedgerLayout, package_hash: &str) -> Result<()> {
    let package_dir = layout.package_dir(package_hash);
    if package_dir.exists() {
        fs::remove_dir_all(&package_dir)
            .with_context(|| format!("failed to remove {}", package_dir.display()))?;
    }
    Ok(())
}

/// Archives either hold the web assets at their root or wrap them in a single `public/` dir.
fn bundle_content_root(unzip_dir: &Path) -> Result<PathBuf> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(unzip_dir)
        .with_context(|| format!("failed to read {}", unzip_dir.display()))?
    {
        let entry = entry?;
        if entry.file_name() == "__MACOSX" {
            continue;
        }
        entries.push(entry);
    }

    if entries.is_empty() {
        return Err(anyhow!("update archive is empty"));
    }
    if let [only] = entries.as_slice() {
        if only.file_name() == "public" && only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(unzip_dir.to_path_buf())
}

/// Renames `src` into place, copying across filesystems when a rename is refused.
fn relocate_bundle(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }

    copy_bundle_tree(src, dst)?;
    fs::remove_dir_all(src)
        .with_context(|| format!("failed to remove extracted copy: {}", src.display()))
}

fn copy_bundle_tree(src: &Path, dst: &Path) -> Result<()> {
    let mut pending = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((from_dir, to_dir)) = pending.pop() {
        fs::create_dir_all(&to_dir)
            .with_context(|| format!("failed to create {}", to_dir.display()))?;
        let entries = fs::read_dir(&from_dir)
            .with_context(|| format!("failed to read {}", from_dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let from = entry.path();
            let to = to_dir.join(entry.file_name());
            // Links inside an archive are not followed.
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push((from, to));
            } else if file_type.is_file() {
                fs::copy(&from, &to).with_context(|| {
                    format!("failed to copy {} into {}", from.display(), to.display())
                })?;
            }
        }
    }
    Ok(())
}
