use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Instant;

use camino::Utf8Path;
use serde_json::Value;

use crate::error::HeaderError;
use crate::pipeline::{Phase, ProgressEvent, ProgressSink};

const STDERR_TAIL_LINES: usize = 20;

/// One line of retrieval agent output.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentLine {
    Progress(String),
    Summary(Value),
}

impl AgentLine {
    /// A line is a summary when it parses as a JSON object; anything else is
    /// progress text.
    pub fn parse(raw: &str) -> Self {
        let line = raw.trim();
        match serde_json::from_str::<Value>(line) {
            Ok(value @ Value::Object(_)) => AgentLine::Summary(value),
            _ => AgentLine::Progress(line.to_string()),
        }
    }
}

/// Iterator over agent output lines. Stops at end of stream or at the first
/// read error, which is kept for [`AgentOutput::take_error`].
pub struct AgentOutput<R: BufRead> {
    reader: R,
    buffer: Vec<u8>,
    error: Option<std::io::Error>,
}

impl<R: BufRead> AgentOutput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<std::io::Error> {
        self.error.take()
    }
}

impl<R: BufRead> Iterator for AgentOutput<R> {
    type Item = AgentLine;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buffer.clear();
            match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => return None,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&self.buffer);
                    if text.trim().is_empty() {
                        continue;
                    }
                    return Some(AgentLine::parse(&text));
                }
                Err(err) => {
                    self.error = Some(err);
                    return None;
                }
            }
        }
    }
}

/// Bulk retrieval from tiered storage.
pub trait RetrievalAgent {
    /// Retrieves every file named in `manifest` into `download_dir`, blocking
    /// until done. Returns the last summary record the agent reported.
    fn stage(
        &self,
        manifest: &Utf8Path,
        download_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Option<Value>, HeaderError>;
}

/// Runs the `adrsws` retrieval script as `<script> -u <userid> -g <dir> <manifest>`.
#[derive(Debug, Clone)]
pub struct AdrswsAgent {
    program: std::path::PathBuf,
    userid: String,
}

impl AdrswsAgent {
    pub fn new(program: impl Into<std::path::PathBuf>, userid: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            userid: userid.into(),
        }
    }

    fn args(&self, manifest: &Utf8Path, download_dir: &Utf8Path) -> Vec<String> {
        vec![
            "-u".to_string(),
            self.userid.clone(),
            "-g".to_string(),
            download_dir.to_string(),
            manifest.to_string(),
        ]
    }
}

impl RetrievalAgent for AdrswsAgent {
    fn stage(
        &self,
        manifest: &Utf8Path,
        download_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Option<Value>, HeaderError> {
        let args = self.args(manifest, download_dir);
        tracing::info!("staging from tiered storage, this may take a while");
        tracing::debug!(
            program = %self.program.display(),
            args = ?args,
            "spawning retrieval agent"
        );

        let start = Instant::now();
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                HeaderError::RetrievalAgent(format!(
                    "failed to start {}: {err}",
                    self.program.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HeaderError::RetrievalAgent("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| HeaderError::RetrievalAgent("stderr not captured".to_string()))?;
        let stderr_reader = thread::spawn(move || drain_stderr(stderr));

        let summary = forward_output(BufReader::new(stdout), sink, start);

        let status = child
            .wait()
            .map_err(|err| HeaderError::RetrievalAgent(err.to_string()))?;
        let stderr_tail = stderr_reader.join().unwrap_or_default();
        tracing::info!(
            elapsed_s = start.elapsed().as_secs(),
            status = %status,
            "retrieval agent exited"
        );

        if !status.success() {
            let message = if stderr_tail.is_empty() {
                format!("{} exited with {status}", self.program.display())
            } else {
                format!(
                    "{} exited with {status}: {}",
                    self.program.display(),
                    stderr_tail.join("; ")
                )
            };
            return Err(HeaderError::RetrievalAgent(message));
        }
        Ok(summary)
    }
}

/// Forwards progress lines and returns the last summary. Takes the reader by
/// value so the pipe is closed on return, even after a read error; an agent
/// still writing then fails instead of blocking the caller's `wait`.
fn forward_output<R: BufRead>(
    reader: R,
    sink: &dyn ProgressSink,
    start: Instant,
) -> Option<Value> {
    let mut output = AgentOutput::new(reader);
    let mut summary = None;
    for line in output.by_ref() {
        match line {
            AgentLine::Progress(text) => {
                tracing::info!(target: "adrsws", "{text}");
                sink.event(ProgressEvent {
                    phase: Phase::Staging,
                    message: text,
                    elapsed: Some(start.elapsed()),
                });
            }
            AgentLine::Summary(record) => {
                tracing::info!(target: "adrsws", summary = %record, "order status");
                summary = Some(record);
            }
        }
    }
    if let Some(err) = output.take_error() {
        tracing::warn!(error = %err, "lost retrieval agent output");
    }
    summary
}

fn drain_stderr(stderr: impl Read) -> Vec<String> {
    let mut tail = Vec::new();
    for line in BufReader::new(stderr).lines() {
        let Ok(line) = line else {
            break;
        };
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        tracing::warn!(target: "adrsws", "{line}");
        tail.push(line);
        if tail.len() > STDERR_TAIL_LINES {
            tail.remove(0);
        }
    }
    tail
}
