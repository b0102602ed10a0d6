use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use tar::Archive;

use crate::error::HeaderError;

fn is_gzip(path: &Utf8Path) -> bool {
    let name = path.file_name().unwrap_or_default();
    name.ends_with(".gz") || name.ends_with(".tgz")
}

/// Unpacks a (possibly gzip-compressed) tar bundle into `target_dir`.
/// Entries that would escape `target_dir` are refused by `tar` itself.
pub fn extract_tar(bundle: &Utf8Path, target_dir: &Utf8Path) -> Result<(), HeaderError> {
    let unpack_error = |message: String| HeaderError::Unpack {
        bundle: bundle.to_string(),
        message,
    };

    let file = File::open(bundle.as_std_path()).map_err(|err| unpack_error(err.to_string()))?;
    let reader: Box<dyn Read> = if is_gzip(bundle) {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(false);
    archive
        .unpack(target_dir.as_std_path())
        .map_err(|err| unpack_error(err.to_string()))
}
