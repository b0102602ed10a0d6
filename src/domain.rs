use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HeaderError;

/// Extensions of files whose structure gets dumped.
pub const STRUCTURAL_EXTENSIONS: [&str; 2] = [".nc", ".cdf"];

pub const DEFAULT_BUNDLE_MARKER: &str = ".tar";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = HeaderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty()
            && !normalized.contains(['/', '\\'])
            && !normalized.chars().any(char::is_whitespace)
            && normalized != "."
            && normalized != "..";
        if !is_valid {
            return Err(HeaderError::InvalidCandidate(format!(
                "invalid stream identifier: {value:?}"
            )));
        }
        Ok(Self(normalized.to_string()))
    }
}

/// One catalog row: the latest known file of a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFile {
    filename: String,
    site: String,
    stream: StreamId,
    reference_time: NaiveDateTime,
}

impl CandidateFile {
    pub fn new(
        filename: &str,
        stream: &str,
        reference_time: NaiveDateTime,
    ) -> Result<Self, HeaderError> {
        let filename = filename.trim();
        if filename.contains(['/', '\\']) {
            return Err(HeaderError::InvalidCandidate(format!(
                "filename must not contain a path separator: {filename}"
            )));
        }
        let site: String = filename.chars().take(3).collect();
        if site.chars().count() < 3 || !site.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(HeaderError::InvalidCandidate(format!(
                "filename has no site prefix: {filename:?}"
            )));
        }
        Ok(Self {
            filename: filename.to_string(),
            site,
            stream: stream.parse()?,
            reference_time,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    pub fn reference_time(&self) -> NaiveDateTime {
        self.reference_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Substring,
    Suffix,
    Regex,
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchMode::Substring => write!(f, "substring"),
            MatchMode::Suffix => write!(f, "suffix"),
            MatchMode::Regex => write!(f, "regex"),
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Substring(String),
    Suffix(String),
    Regex(Regex),
}

/// A single deny-list entry with an explicit matching rule.
#[derive(Debug, Clone)]
pub struct SkipRule {
    pattern: String,
    mode: MatchMode,
    matcher: Matcher,
}

impl SkipRule {
    pub fn new(pattern: &str, mode: MatchMode) -> Result<Self, HeaderError> {
        if pattern.is_empty() {
            return Err(HeaderError::InvalidSkipRule {
                pattern: pattern.to_string(),
                message: "pattern must not be empty".to_string(),
            });
        }
        let matcher = match mode {
            MatchMode::Substring => Matcher::Substring(pattern.to_string()),
            MatchMode::Suffix => Matcher::Suffix(pattern.to_string()),
            MatchMode::Regex => Matcher::Regex(Regex::new(pattern).map_err(|err| {
                HeaderError::InvalidSkipRule {
                    pattern: pattern.to_string(),
                    message: err.to_string(),
                }
            })?),
        };
        Ok(Self {
            pattern: pattern.to_string(),
            mode,
            matcher,
        })
    }

    pub fn substring(pattern: &str) -> Result<Self, HeaderError> {
        Self::new(pattern, MatchMode::Substring)
    }

    pub fn suffix(pattern: &str) -> Result<Self, HeaderError> {
        Self::new(pattern, MatchMode::Suffix)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn matches(&self, filename: &str) -> bool {
        match &self.matcher {
            Matcher::Substring(value) => filename.contains(value.as_str()),
            Matcher::Suffix(value) => filename.ends_with(value.as_str()),
            Matcher::Regex(regex) => regex.is_match(filename),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SkipList {
    rules: Vec<SkipRule>,
}

impl SkipList {
    pub fn new(rules: Vec<SkipRule>) -> Self {
        Self { rules }
    }

    /// Images, video and raw files never carry structural data; tars already
    /// split by type (`.tsv.tar`, `.pdf.tar`, ...) only hold non-structural payloads.
    pub fn defaults() -> Self {
        let substrings = [".png", ".mpg", ".raw", ".jpg", ".00."];
        let suffixes = [".tsv.tar", ".pdf.tar", ".txt.tar", ".asc.tar"];
        let rules = substrings
            .iter()
            .map(|pattern| (pattern, MatchMode::Substring))
            .chain(suffixes.iter().map(|pattern| (pattern, MatchMode::Suffix)))
            .map(|(pattern, mode)| SkipRule {
                pattern: pattern.to_string(),
                mode,
                matcher: match mode {
                    MatchMode::Suffix => Matcher::Suffix(pattern.to_string()),
                    _ => Matcher::Substring(pattern.to_string()),
                },
            })
            .collect();
        Self { rules }
    }

    pub fn rules(&self) -> &[SkipRule] {
        &self.rules
    }

    pub fn matching_rule(&self, filename: &str) -> Option<&SkipRule> {
        self.rules.iter().find(|rule| rule.matches(filename))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Skip,
    LocalHeader,
    RemoteFetch,
    /// Not deny-listed, not in the local archive and not a bundle.
    Unavailable,
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Skip => write!(f, "skip"),
            Classification::LocalHeader => write!(f, "local_header"),
            Classification::RemoteFetch => write!(f, "remote_fetch"),
            Classification::Unavailable => write!(f, "unavailable"),
        }
    }
}

pub fn is_structural_file(name: &str) -> bool {
    STRUCTURAL_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
