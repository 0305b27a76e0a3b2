use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

pub const SIGNATURE_FILE_NAME: &str = ".codepushrelease";

/// Entries that never contribute to a bundle hash, at any depth.
pub const IGNORED_BUNDLE_ENTRIES: [&str; 3] = [SIGNATURE_FILE_NAME, ".DS_Store", "__MACOSX"];

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Sorted `relative/path:sha256` entries for every file under `root`.
pub fn bundle_manifest(root: &Path) -> Result<Vec<String>> {
    let mut entries = Vec::new();
    collect_manifest_entries(root, root, &mut entries)?;
    entries.sort();
    Ok(entries)
}

/// Hash of the bundle manifest serialized as a JSON string array.
pub fn bundle_hash(root: &Path) -> Result<String> {
    let entries = bundle_manifest(root)?;
    let serialized =
        serde_json::to_string(&entries).context("failed to serialize bundle manifest")?;
    Ok(sha256_hex(serialized.as_bytes()))
}

fn collect_manifest_entries(root: &Path, current: &Path, entries: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(current)
        .with_context(|| format!("failed to read bundle directory: {}", current.display()))?
    {
        let entry = entry?;
        let file_name = entry.file_name();
        if IGNORED_BUNDLE_ENTRIES
            .iter()
            .any(|ignored| file_name.to_str() == Some(*ignored))
        {
            continue;
        }

        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if file_type.is_dir() {
            collect_manifest_entries(root, &path, entries)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} escapes bundle root", path.display()))?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(format!("{relative}:{}", sha256_file(&path)?));
    }
    Ok(())
}
