use std::path::PathBuf;
use std::process::{Command, Stdio};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::HeaderError;
use crate::store::{AtomicFile, remove_file_if_exists};

pub const SECTION_DELIMITER_WIDTH: usize = 50;

pub fn section_delimiter() -> String {
    "=".repeat(SECTION_DELIMITER_WIDTH)
}

/// Produces the textual structure dump of one file.
pub trait HeaderDumper {
    fn dump(&self, file: &Utf8Path) -> Result<Vec<u8>, HeaderError>;
}

/// `ncdump -h <file>` or any tool with the same calling convention.
#[derive(Debug, Clone)]
pub struct CommandDumper {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandDumper {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl HeaderDumper for CommandDumper {
    fn dump(&self, file: &Utf8Path) -> Result<Vec<u8>, HeaderError> {
        let tool_error = |message: String| HeaderError::ExtractionTool {
            file: file.to_string(),
            message,
        };
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(file.as_std_path())
            .stdin(Stdio::null())
            .output()
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    HeaderError::MissingTool(self.program.display().to_string())
                } else {
                    tool_error(err.to_string())
                }
            })?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("{} exited with {}", self.program.display(), output.status)
        } else {
            stderr
        };
        Err(tool_error(message))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionFailure {
    pub file: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiDumpOutcome {
    pub header_path: String,
    pub sections: usize,
    pub written: bool,
    pub failures: Vec<SectionFailure>,
}

/// Writes dumps into the header store. Output is staged in a temporary file
/// next to the header and only moved into place once complete.
pub struct HeaderExtractor<D: HeaderDumper> {
    dumper: D,
}

impl<D: HeaderDumper> HeaderExtractor<D> {
    pub fn new(dumper: D) -> Self {
        Self { dumper }
    }

    pub fn dump_single(&self, file: &Utf8Path, header_path: &Utf8Path) -> Result<(), HeaderError> {
        remove_file_if_exists(header_path)?;
        tracing::info!("{file} > {header_path}");
        let content = self.dumper.dump(file)?;
        let mut out = AtomicFile::create(header_path)?;
        out.write_all(&content)?;
        out.commit()
    }

    /// One section per file, each followed by the delimiter line. Files whose
    /// dump fails are left out; if none succeed no header is written.
    pub fn dump_multi(
        &self,
        files: &[Utf8PathBuf],
        header_path: &Utf8Path,
    ) -> Result<MultiDumpOutcome, HeaderError> {
        if header_path.as_std_path().exists() {
            tracing::debug!(path = %header_path, "removing previous header");
        }
        remove_file_if_exists(header_path)?;
        tracing::info!(path = %header_path, files = files.len(), "writing multi-file header");

        let delimiter = section_delimiter();
        let mut out = AtomicFile::create(header_path)?;
        let mut sections = 0;
        let mut failures = Vec::new();
        for file in files {
            tracing::debug!(file = %file, "dumping section");
            match self.dumper.dump(file) {
                Ok(content) => {
                    out.write_all(&content)?;
                    if !content.is_empty() && !content.ends_with(b"\n") {
                        out.write_all(b"\n")?;
                    }
                    out.write_all(delimiter.as_bytes())?;
                    out.write_all(b"\n")?;
                    sections += 1;
                }
                Err(err) => {
                    tracing::warn!(file = %file, error = %err, "skipping section");
                    failures.push(SectionFailure {
                        file: file.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        let written = sections > 0;
        if written {
            out.commit()?;
        }
        Ok(MultiDumpOutcome {
            header_path: header_path.to_string(),
            sections,
            written,
            failures,
        })
    }
}
