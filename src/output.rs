use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{ProgressEvent, ProgressSink, RunReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(result: &RunReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the debug log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::debug!(
                phase = %event.phase,
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::debug!(phase = %event.phase, "{}", event.message),
        }
    }
}

pub fn print_summary(report: &RunReport) {
    println!("run {} finished in phase {}", report.run_id, report.phase);
    println!("  skipped:       {}", report.skipped.len());
    println!("  unavailable:   {}", report.unavailable.len());
    println!("  local headers: {}", report.local_headers.len());
    println!("  queued:        {}", report.queued.len());
    if let Some(manifest) = &report.manifest {
        println!("  manifest:      {manifest}");
    }
    if report.staged {
        println!("  bundles:       {}", report.bundles.len());
    }
    if let Some(published) = &report.published {
        println!(
            "  published:     {} files to {}",
            published.files, published.destination
        );
    }
    if report.has_failures() {
        println!("  failures:      {}", report.failures.len());
        for failure in &report.failures {
            println!("    [{}] {}: {}", failure.phase, failure.subject, failure.message);
        }
    }
}
