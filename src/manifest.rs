use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::HeaderError;

const MANIFEST_PREFIX: &str = "download_list.";
const MANIFEST_SUFFIX: &str = ".txt";
const BACKUP_SUFFIX: &str = ".old";

/// Per-run list of filenames queued for remote retrieval. The file is only
/// created on the first append and is written in append mode, one filename
/// per line.
#[derive(Debug)]
pub struct RetrievalManifest {
    path: Utf8PathBuf,
    entries: Vec<String>,
    seen: HashSet<String>,
}

impl RetrievalManifest {
    pub fn new(dir: &Utf8Path, run_id: &str) -> Self {
        Self {
            path: manifest_path(dir, run_id),
            entries: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends `filename` unless it is already queued this run. Returns
    /// whether a line was written.
    pub fn append(&mut self, filename: &str) -> Result<bool, HeaderError> {
        if self.seen.contains(filename) {
            tracing::debug!(file = filename, "already queued for retrieval");
            return Ok(false);
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("open {}: {err}", self.path)))?;
        writeln!(file, "{filename}")
            .map_err(|err| HeaderError::Filesystem(format!("write {}: {err}", self.path)))?;
        tracing::info!(file = filename, manifest = %self.path, "writing to download list");
        self.seen.insert(filename.to_string());
        self.entries.push(filename.to_string());
        Ok(true)
    }

    pub fn read(path: &Utf8Path) -> Result<Vec<String>, HeaderError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("read {path}: {err}")))?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub fn manifest_path(dir: &Utf8Path, run_id: &str) -> Utf8PathBuf {
    dir.join(format!("{MANIFEST_PREFIX}{run_id}{MANIFEST_SUFFIX}"))
}

/// Moves manifests left by previous runs aside with an `.old` suffix.
/// Older backups are dropped first so at most one previous manifest is kept
/// next to the one the new run creates.
pub fn backup_previous(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, HeaderError> {
    if !dir.as_std_path().exists() {
        return Ok(Vec::new());
    }
    let mut current = Vec::new();
    let mut backups = Vec::new();
    let entries = dir
        .read_dir_utf8()
        .map_err(|err| HeaderError::Filesystem(format!("read {dir}: {err}")))?;
    for entry in entries {
        let entry = entry.map_err(|err| HeaderError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        if !name.starts_with(MANIFEST_PREFIX) || !entry.path().is_file() {
            continue;
        }
        if name.ends_with(&format!("{MANIFEST_SUFFIX}{BACKUP_SUFFIX}")) {
            backups.push(entry.path().to_path_buf());
        } else if name.ends_with(MANIFEST_SUFFIX) {
            current.push(entry.path().to_path_buf());
        }
    }

    if current.is_empty() {
        return Ok(Vec::new());
    }

    for backup in backups {
        tracing::debug!(path = %backup, "removing stale manifest backup");
        fs::remove_file(backup.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("remove {backup}: {err}")))?;
    }

    let mut renamed = Vec::new();
    current.sort();
    for path in current {
        let target = Utf8PathBuf::from(format!("{path}{BACKUP_SUFFIX}"));
        tracing::info!(from = %path, to = %target, "backing up previous download list");
        fs::rename(path.as_std_path(), target.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("rename {path}: {err}")))?;
        renamed.push(target);
    }
    Ok(renamed)
}
