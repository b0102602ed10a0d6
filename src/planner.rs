use camino::Utf8PathBuf;

use crate::domain::{CandidateFile, Classification, SkipList};
use crate::layout::PathResolver;

/// Decision for one candidate, carrying the path it was resolved against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    Skip { pattern: String },
    LocalHeader { archive_path: Utf8PathBuf },
    RemoteFetch { archive_path: Utf8PathBuf },
    Unavailable { archive_path: Utf8PathBuf },
}

impl Plan {
    pub fn classification(&self) -> Classification {
        match self {
            Plan::Skip { .. } => Classification::Skip,
            Plan::LocalHeader { .. } => Classification::LocalHeader,
            Plan::RemoteFetch { .. } => Classification::RemoteFetch,
            Plan::Unavailable { .. } => Classification::Unavailable,
        }
    }
}

/// Classifies candidates using only the filename and whether the file is in
/// the local archive, so reruns over the same catalog plan the same work.
#[derive(Debug, Clone)]
pub struct RetrievalPlanner {
    resolver: PathResolver,
    skip: SkipList,
    bundle_marker: String,
}

impl RetrievalPlanner {
    pub fn new(resolver: PathResolver, skip: SkipList, bundle_marker: String) -> Self {
        Self {
            resolver,
            skip,
            bundle_marker,
        }
    }

    pub fn classify(&self, candidate: &CandidateFile) -> Plan {
        let filename = candidate.filename();
        if let Some(rule) = self.skip.matching_rule(filename) {
            return Plan::Skip {
                pattern: rule.pattern().to_string(),
            };
        }

        let archive_path = self.resolver.candidate_archive_path(candidate);
        if archive_path.as_std_path().exists() {
            return Plan::LocalHeader { archive_path };
        }

        if filename.contains(self.bundle_marker.as_str()) {
            return Plan::RemoteFetch { archive_path };
        }

        Plan::Unavailable { archive_path }
    }
}
