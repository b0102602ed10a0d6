use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::is_structural_file;
use crate::error::HeaderError;
use crate::fs_util;
use crate::store::{ensure_dir, walk_files};

/// Finds retrieved bundles and turns them into structural files on disk.
#[derive(Debug, Clone)]
pub struct ArchiveUnpacker {
    bundle_marker: String,
}

impl ArchiveUnpacker {
    pub fn new(bundle_marker: String) -> Self {
        Self { bundle_marker }
    }

    /// Every file below `download_root` whose name contains the bundle
    /// marker anywhere, sorted.
    pub fn discover_bundles(
        &self,
        download_root: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, HeaderError> {
        if !download_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut bundles: Vec<Utf8PathBuf> = walk_files(download_root)?
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| name.contains(self.bundle_marker.as_str()))
                    .unwrap_or(false)
            })
            .collect();
        bundles.sort();
        tracing::debug!(count = bundles.len(), root = %download_root, "bundles found");
        Ok(bundles)
    }

    pub fn unpack(&self, bundle: &Utf8Path, extraction_root: &Utf8Path) -> Result<(), HeaderError> {
        tracing::info!(bundle = %bundle, target = %extraction_root, "extracting");
        ensure_dir(extraction_root)?;
        fs_util::extract_tar(bundle, extraction_root)
    }

    pub fn remove_bundle(&self, bundle: &Utf8Path) -> Result<(), HeaderError> {
        tracing::debug!(bundle = %bundle, "removing bundle");
        fs::remove_file(bundle.as_std_path())
            .map_err(|err| HeaderError::Filesystem(format!("remove {bundle}: {err}")))
    }

    /// `.nc`/`.cdf` files below `extraction_root`, in lexicographic order.
    pub fn discover_structural_files(
        &self,
        extraction_root: &Utf8Path,
    ) -> Result<Vec<Utf8PathBuf>, HeaderError> {
        tracing::info!(root = %extraction_root, "looking for netcdf files");
        if !extraction_root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<Utf8PathBuf> = walk_files(extraction_root)?
            .into_iter()
            .filter(|path| path.file_name().map(is_structural_file).unwrap_or(false))
            .collect();
        files.sort();
        tracing::debug!(files = ?files, "netcdf files found");
        Ok(files)
    }
}
