use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HeaderError {
    #[error("missing config file {0}")]
    MissingConfig(PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid skip rule {pattern}: {message}")]
    InvalidSkipRule { pattern: String, message: String },

    #[error("password for database user {0} not found")]
    MissingCredential(String),

    #[error("catalog query failed: {0}")]
    Catalog(String),

    #[error("invalid candidate file: {0}")]
    InvalidCandidate(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("retrieval agent failed: {0}")]
    RetrievalAgent(String),

    #[error("failed to unpack bundle {bundle}: {message}")]
    Unpack { bundle: String, message: String },

    #[error("header dump failed for {file}: {message}")]
    ExtractionTool { file: String, message: String },

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),
}

impl HeaderError {
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HeaderError::MissingConfig(_)
                | HeaderError::ConfigRead(_)
                | HeaderError::ConfigParse(_)
                | HeaderError::InvalidConfig(_)
                | HeaderError::InvalidSkipRule { .. }
                | HeaderError::MissingCredential(_)
        )
    }
}
