use std::process::{Command, Stdio};

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::error::HeaderError;

#[derive(Debug, Clone, Serialize)]
pub struct PublishInfo {
    pub destination: String,
    pub files: usize,
}

/// Ships header files to the host serving the catalog UI.
pub trait Publisher {
    fn publish(&self, headers: &[Utf8PathBuf]) -> Result<PublishInfo, HeaderError>;
}

#[derive(Debug, Clone)]
pub struct ScpPublisher {
    scp: String,
    destination: String,
}

impl ScpPublisher {
    pub fn new(scp: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            scp: scp.into(),
            destination: destination.into(),
        }
    }
}

impl Publisher for ScpPublisher {
    fn publish(&self, headers: &[Utf8PathBuf]) -> Result<PublishInfo, HeaderError> {
        tracing::info!(
            destination = %self.destination,
            files = headers.len(),
            "transferring headers"
        );
        if headers.is_empty() {
            return Ok(PublishInfo {
                destination: self.destination.clone(),
                files: 0,
            });
        }
        let output = Command::new(&self.scp)
            .arg("-q")
            .args(headers.iter().map(|path| path.as_std_path()))
            .arg(&self.destination)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    HeaderError::MissingTool(self.scp.clone())
                } else {
                    HeaderError::Publish(err.to_string())
                }
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(HeaderError::Publish(if stderr.is_empty() {
                format!("{} exited with {}", self.scp, output.status)
            } else {
                stderr
            }));
        }
        Ok(PublishInfo {
            destination: self.destination.clone(),
            files: headers.len(),
        })
    }
}
