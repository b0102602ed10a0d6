use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;

use crate::domain::StreamId;
use crate::error::HeaderError;
use crate::layout::{HEADER_SUFFIX, PathResolver};

/// Scratch directories owned by a single run.
#[derive(Debug, Clone)]
pub struct StagingArea {
    download_root: Utf8PathBuf,
    extraction_root: Utf8PathBuf,
}

impl StagingArea {
    pub fn new(download_root: Utf8PathBuf, extraction_root: Utf8PathBuf) -> Self {
        Self {
            download_root,
            extraction_root,
        }
    }

    pub fn download_root(&self) -> &Utf8Path {
        &self.download_root
    }

    pub fn extraction_root(&self) -> &Utf8Path {
        &self.extraction_root
    }

    pub fn ensure(&self) -> Result<(), HeaderError> {
        ensure_dir(&self.download_root)?;
        ensure_dir(&self.extraction_root)
    }

    pub fn reset_extraction(&self) -> Result<(), HeaderError> {
        tracing::debug!(dir = %self.extraction_root, "resetting extraction root");
        reset_dir(&self.extraction_root)
    }

    pub fn reset_downloads(&self) -> Result<(), HeaderError> {
        tracing::debug!(dir = %self.download_root, "resetting download root");
        reset_dir(&self.download_root)
    }

    /// Empties and recreates both scratch roots. Both are attempted even if
    /// the first fails; the first error is returned.
    pub fn reset(&self) -> Result<(), HeaderError> {
        let extraction = self.reset_extraction();
        let downloads = self.reset_downloads();
        extraction.and(downloads)
    }
}

/// Resets the staging area when dropped, so scratch space is reclaimed on
/// every exit path including early returns and panics.
pub struct ScratchGuard<'a> {
    staging: &'a StagingArea,
}

impl<'a> ScratchGuard<'a> {
    pub fn new(staging: &'a StagingArea) -> Self {
        Self { staging }
    }
}

impl Drop for ScratchGuard<'_> {
    fn drop(&mut self) {
        tracing::info!(
            download = %self.staging.download_root,
            extraction = %self.staging.extraction_root,
            "cleaning scratch directories"
        );
        if let Err(err) = self.staging.reset() {
            tracing::error!(error = %err, "scratch cleanup failed");
        }
    }
}

/// One `<stream>.header.txt` per stream.
#[derive(Debug, Clone)]
pub struct HeaderStore {
    root: Utf8PathBuf,
}

impl HeaderStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn ensure(&self) -> Result<(), HeaderError> {
        ensure_dir(&self.root)
    }

    pub fn header_path(&self, stream: &StreamId) -> Utf8PathBuf {
        PathResolver::stream_header_path(&self.root, stream)
    }

    pub fn list(&self) -> Result<Vec<Utf8PathBuf>, HeaderError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut headers = Vec::new();
        let entries = self
            .root
            .read_dir_utf8()
            .map_err(|err| HeaderError::Filesystem(format!("read {}: {err}", self.root)))?;
        for entry in entries {
            let entry = entry.map_err(|err| HeaderError::Filesystem(err.to_string()))?;
            if entry.path().is_file() && entry.file_name().ends_with(HEADER_SUFFIX) {
                headers.push(entry.path().to_path_buf());
            }
        }
        headers.sort();
        Ok(headers)
    }

    pub fn clear(&self) -> Result<(), HeaderError> {
        tracing::info!(dir = %self.root, "cleaning header store");
        reset_dir(&self.root)
    }
}

pub fn ensure_dir(path: &Utf8Path) -> Result<(), HeaderError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| HeaderError::Filesystem(format!("create {path}: {err}")))
}

pub fn reset_dir(path: &Utf8Path) -> Result<(), HeaderError> {
    match fs::remove_dir_all(path.as_std_path()) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => {
            return Err(HeaderError::Filesystem(format!("remove {path}: {err}")));
        }
    }
    ensure_dir(path)
}

pub fn remove_file_if_exists(path: &Utf8Path) -> Result<(), HeaderError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(HeaderError::Filesystem(format!("remove {path}: {err}"))),
    }
}

/// Temporary file next to `dest`, persisted over it on [`AtomicFile::commit`].
/// Dropping without committing discards everything written.
pub struct AtomicFile {
    dest: Utf8PathBuf,
    temp: NamedTempFile,
}

impl AtomicFile {
    pub fn create(dest: &Utf8Path) -> Result<Self, HeaderError> {
        let parent = dest
            .parent()
            .ok_or_else(|| HeaderError::Filesystem("invalid destination path".to_string()))?;
        ensure_dir(parent)?;
        let temp = tempfile::Builder::new()
            .prefix(".dd-headers")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| HeaderError::Filesystem(err.to_string()))?;
        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
        })
    }

    pub fn write_all(&mut self, content: &[u8]) -> Result<(), HeaderError> {
        self.temp
            .write_all(content)
            .map_err(|err| HeaderError::Filesystem(format!("write {}: {err}", self.dest)))
    }

    pub fn commit(mut self) -> Result<(), HeaderError> {
        self.temp
            .flush()
            .map_err(|err| HeaderError::Filesystem(err.to_string()))?;
        self.temp
            .persist(self.dest.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("persist {}: {err}", self.dest)))?;
        Ok(())
    }
}

/// Recursive walk returning every regular file below `root`.
pub fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, HeaderError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries = path
            .read_dir_utf8()
            .map_err(|err| HeaderError::Filesystem(format!("read {path}: {err}")))?;
        for entry in entries {
            let entry = entry.map_err(|err| HeaderError::Filesystem(err.to_string()))?;
            let file_type = entry
                .file_type()
                .map_err(|err| HeaderError::Filesystem(err.to_string()))?;
            if file_type.is_dir() {
                stack.push(entry.path().to_path_buf());
            } else if file_type.is_file() {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    Ok(files)
}
