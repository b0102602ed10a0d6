use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{CandidateFile, StreamId};

pub const HEADER_SUFFIX: &str = ".header.txt";

/// Maps candidates and bundles onto archive and header-store paths. Pure
/// string composition, nothing here touches the filesystem.
#[derive(Debug, Clone)]
pub struct PathResolver {
    archive_root: Utf8PathBuf,
}

impl PathResolver {
    pub fn new(archive_root: Utf8PathBuf) -> Self {
        Self { archive_root }
    }

    /// `<archive-root>/<site>/<stream>/<filename>`
    pub fn archive_path(&self, filename: &str, site: &str, stream: &str) -> Utf8PathBuf {
        self.archive_root.join(site).join(stream).join(filename)
    }

    pub fn candidate_archive_path(&self, candidate: &CandidateFile) -> Utf8PathBuf {
        self.archive_path(
            candidate.filename(),
            candidate.site(),
            candidate.stream().as_str(),
        )
    }

    pub fn header_path(header_root: &Utf8Path, stream: &str) -> Utf8PathBuf {
        header_root.join(format!("{stream}{HEADER_SUFFIX}"))
    }

    pub fn stream_header_path(header_root: &Utf8Path, stream: &StreamId) -> Utf8PathBuf {
        Self::header_path(header_root, stream.as_str())
    }

    /// Header path for a bundle, keyed by the stream in the first two
    /// dot-delimited tokens of its base name. Degenerate names yield a
    /// degenerate path; use [`bundle_stream`] to validate first.
    pub fn bundle_header_path(header_root: &Utf8Path, bundle_filename: &str) -> Utf8PathBuf {
        let stream = bundle_stream_tokens(bundle_filename);
        Self::header_path(header_root, &stream)
    }
}

fn bundle_base_name(bundle_filename: &str) -> &str {
    Utf8Path::new(bundle_filename)
        .file_name()
        .unwrap_or(bundle_filename)
}

fn bundle_stream_tokens(bundle_filename: &str) -> String {
    bundle_base_name(bundle_filename)
        .split('.')
        .take(2)
        .collect::<Vec<_>>()
        .join(".")
}

/// Stream identifier of a bundle, or `None` when its base name has fewer
/// than two non-empty dot-delimited tokens.
pub fn bundle_stream(bundle_filename: &str) -> Option<StreamId> {
    let base = bundle_base_name(bundle_filename);
    let tokens: Vec<&str> = base.split('.').take(2).collect();
    if tokens.len() < 2 || tokens.iter().any(|token| token.is_empty()) {
        return None;
    }
    tokens.join(".").parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_layout() {
        let resolver = PathResolver::new(Utf8PathBuf::from("/data/archive"));
        let path = resolver.archive_path("sgpmetE13.b1.20230101.nc", "sgp", "sgpmetE13.b1");
        assert_eq!(
            path,
            Utf8PathBuf::from("/data/archive/sgp/sgpmetE13.b1/sgpmetE13.b1.20230101.nc")
        );
    }

    #[test]
    fn bundle_header_uses_first_two_tokens() {
        let path = PathResolver::bundle_header_path(
            Utf8Path::new("/headers"),
            "/work/download/sgpmetE13.b1.20230101.000000.tar",
        );
        assert_eq!(path, Utf8PathBuf::from("/headers/sgpmetE13.b1.header.txt"));
    }

    #[test]
    fn degenerate_bundle_names() {
        assert!(bundle_stream("bundle").is_none());
        assert!(bundle_stream(".tar").is_none());
        assert_eq!(
            bundle_stream("sgpmetE13.b1.tar").map(|stream| stream.to_string()),
            Some("sgpmetE13.b1".to_string())
        );
    }
}
