use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::Value;

use crate::catalog::{CatalogRow, CatalogSource};
use crate::config::ResolvedConfig;
use crate::error::HeaderError;
use crate::extractor::{HeaderDumper, HeaderExtractor, MultiDumpOutcome};
use crate::layout::{PathResolver, bundle_stream};
use crate::manifest::{self, RetrievalManifest};
use crate::planner::{Plan, RetrievalPlanner};
use crate::publish::{PublishInfo, Publisher};
use crate::stager::RetrievalAgent;
use crate::store::{HeaderStore, ScratchGuard, StagingArea, ensure_dir};
use crate::unpack::ArchiveUnpacker;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Init,
    Planning,
    Staging,
    Unpacking,
    Publish,
    Cleanup,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Init => "init",
            Phase::Planning => "planning",
            Phase::Staging => "staging",
            Phase::Unpacking => "unpacking",
            Phase::Publish => "publish",
            Phase::Cleanup => "cleanup",
            Phase::Done => "done",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run the staging, unpacking and remote dump phases.
    pub stage: bool,
    /// Classify only: no dumps, no manifest, no retrieval, no publish.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderRecord {
    pub stream: String,
    pub file: String,
    pub reference_time: NaiveDateTime,
    pub header_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleReport {
    pub bundle: String,
    pub stream: Option<String>,
    pub structural_files: usize,
    pub header: Option<MultiDumpOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub phase: Phase,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub phase: Phase,
    pub skipped: Vec<String>,
    pub unavailable: Vec<String>,
    pub local_headers: Vec<HeaderRecord>,
    pub queued: Vec<String>,
    pub manifest: Option<String>,
    pub manifest_backups: Vec<String>,
    pub staged: bool,
    pub staging_summary: Option<Value>,
    pub bundles: Vec<BundleReport>,
    pub published: Option<PublishInfo>,
    pub failures: Vec<Failure>,
}

impl RunReport {
    fn new(run_id: String) -> Self {
        Self {
            run_id,
            ..Self::default()
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn fail(&mut self, phase: Phase, subject: impl Into<String>, err: &HeaderError) {
        let subject = subject.into();
        tracing::error!(%phase, subject = %subject, error = %err, "recoverable failure");
        self.failures.push(Failure {
            phase,
            subject,
            message: err.to_string(),
        });
    }
}

pub fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// One end-to-end run: plan, dump local files, stage and unpack remote
/// bundles, publish. Scratch directories are reset on every exit path.
pub struct PipelineRunner<C, A, D, P>
where
    C: CatalogSource,
    A: RetrievalAgent,
    D: HeaderDumper,
    P: Publisher,
{
    catalog: C,
    agent: A,
    extractor: HeaderExtractor<D>,
    publisher: Option<P>,
    planner: RetrievalPlanner,
    unpacker: ArchiveUnpacker,
    staging: StagingArea,
    headers: HeaderStore,
    manifest_dir: Utf8PathBuf,
    clean_headers_after_publish: bool,
}

impl<C, A, D, P> PipelineRunner<C, A, D, P>
where
    C: CatalogSource,
    A: RetrievalAgent,
    D: HeaderDumper,
    P: Publisher,
{
    pub fn new(
        config: &ResolvedConfig,
        catalog: C,
        agent: A,
        dumper: D,
        publisher: Option<P>,
    ) -> Self {
        let paths = &config.paths;
        Self {
            catalog,
            agent,
            extractor: HeaderExtractor::new(dumper),
            publisher,
            planner: RetrievalPlanner::new(
                PathResolver::new(paths.archive_root.clone()),
                config.skip.clone(),
                config.retrieval.bundle_marker.clone(),
            ),
            unpacker: ArchiveUnpacker::new(config.retrieval.bundle_marker.clone()),
            staging: StagingArea::new(paths.download_loc.clone(), paths.extraction_loc.clone()),
            headers: HeaderStore::new(paths.header_dir.clone()),
            manifest_dir: paths.manifest_dir.clone(),
            clean_headers_after_publish: config.publish.clean_after,
        }
    }

    pub fn run(
        &self,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, HeaderError> {
        self.run_with_id(new_run_id(), options, sink)
    }

    pub fn run_with_id(
        &self,
        run_id: String,
        options: &RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunReport, HeaderError> {
        let start = Instant::now();
        let mut report = RunReport::new(run_id);
        let guard = ScratchGuard::new(&self.staging);

        self.enter(&mut report, Phase::Init, "preparing directories", start, sink);
        self.staging.ensure()?;
        self.headers.ensure()?;
        ensure_dir(&self.manifest_dir)?;
        if !options.dry_run {
            report.manifest_backups = manifest::backup_previous(&self.manifest_dir)?
                .into_iter()
                .map(|path| path.to_string())
                .collect();
        }

        let rows = self.catalog.latest_files()?;

        self.enter(
            &mut report,
            Phase::Planning,
            &format!("classifying {} catalog rows", rows.len()),
            start,
            sink,
        );
        let mut manifest = RetrievalManifest::new(&self.manifest_dir, &report.run_id);
        self.plan(&rows, options, &mut manifest, &mut report, sink)?;
        if !manifest.is_empty() {
            report.manifest = Some(manifest.path().to_string());
        }

        if options.dry_run {
            tracing::info!("dry run, stopping after planning");
        } else {
            if options.stage {
                self.enter(&mut report, Phase::Staging, "staging from tiered storage", start, sink);
                self.stage(&manifest, &mut report, sink);
                self.enter(&mut report, Phase::Unpacking, "unpacking bundles", start, sink);
                self.unpack_bundles(&mut report);
            } else {
                tracing::info!(
                    queued = report.queued.len(),
                    "remote retrieval disabled, skipping staging"
                );
            }

            self.enter(&mut report, Phase::Publish, "publishing headers", start, sink);
            self.publish(&mut report);
        }

        self.enter(&mut report, Phase::Cleanup, "cleaning scratch directories", start, sink);
        drop(guard);
        self.enter(&mut report, Phase::Done, "done", start, sink);
        tracing::info!(
            skipped = report.skipped.len(),
            local = report.local_headers.len(),
            queued = report.queued.len(),
            bundles = report.bundles.len(),
            failures = report.failures.len(),
            "run finished"
        );
        Ok(report)
    }

    fn enter(
        &self,
        report: &mut RunReport,
        phase: Phase,
        message: &str,
        start: Instant,
        sink: &dyn ProgressSink,
    ) {
        report.phase = phase;
        tracing::debug!(%phase, "{message}");
        sink.event(ProgressEvent {
            phase,
            message: message.to_string(),
            elapsed: Some(start.elapsed()),
        });
    }

    fn plan(
        &self,
        rows: &[CatalogRow],
        options: &RunOptions,
        manifest: &mut RetrievalManifest,
        report: &mut RunReport,
        sink: &dyn ProgressSink,
    ) -> Result<(), HeaderError> {
        for row in rows {
            let candidate = match row.to_candidate() {
                Ok(candidate) => candidate,
                Err(err) => {
                    report.fail(Phase::Planning, &row.filename, &err);
                    continue;
                }
            };
            let filename = candidate.filename();

            let plan = self.planner.classify(&candidate);
            tracing::debug!(file = filename, classification = %plan.classification(), "classified");
            match plan {
                Plan::Skip { pattern } => {
                    tracing::warn!(file = filename, pattern = %pattern, "Skipping: {filename}");
                    report.skipped.push(filename.to_string());
                }
                Plan::LocalHeader { archive_path } => {
                    let header_path = self.headers.header_path(candidate.stream());
                    if !options.dry_run {
                        if let Err(err) = self.extractor.dump_single(&archive_path, &header_path) {
                            report.fail(Phase::Planning, archive_path.as_str(), &err);
                            continue;
                        }
                        sink.event(ProgressEvent {
                            phase: Phase::Planning,
                            message: format!("header written for {}", candidate.stream()),
                            elapsed: None,
                        });
                    }
                    report.local_headers.push(HeaderRecord {
                        stream: candidate.stream().to_string(),
                        file: archive_path.to_string(),
                        reference_time: candidate.reference_time(),
                        header_path: header_path.to_string(),
                    });
                }
                Plan::RemoteFetch { archive_path } => {
                    tracing::info!(file = filename, "File not in archive: {archive_path}");
                    let queued = if options.dry_run {
                        !report.queued.iter().any(|queued| queued == filename)
                    } else {
                        manifest.append(filename)?
                    };
                    if queued {
                        report.queued.push(filename.to_string());
                    }
                }
                Plan::Unavailable { archive_path } => {
                    tracing::warn!(
                        file = filename,
                        stream = %candidate.stream(),
                        "not in archive and not retrievable: {archive_path}"
                    );
                    report.unavailable.push(filename.to_string());
                }
            }
        }
        Ok(())
    }

    fn stage(&self, manifest: &RetrievalManifest, report: &mut RunReport, sink: &dyn ProgressSink) {
        if manifest.is_empty() {
            tracing::info!("nothing queued for retrieval");
            return;
        }
        match self
            .agent
            .stage(manifest.path(), self.staging.download_root(), sink)
        {
            Ok(summary) => {
                report.staged = true;
                report.staging_summary = summary;
            }
            Err(err) => report.fail(Phase::Staging, manifest.path().as_str(), &err),
        }
    }

    fn unpack_bundles(&self, report: &mut RunReport) {
        let bundles = match self.unpacker.discover_bundles(self.staging.download_root()) {
            Ok(bundles) => bundles,
            Err(err) => {
                report.fail(Phase::Unpacking, self.staging.download_root().as_str(), &err);
                return;
            }
        };

        for bundle in &bundles {
            let entry = self.unpack_bundle(bundle, report);
            report.bundles.push(entry);
        }

        if let Err(err) = self.staging.reset_extraction() {
            report.fail(Phase::Unpacking, self.staging.extraction_root().as_str(), &err);
        }
    }

    fn unpack_bundle(&self, bundle: &Utf8Path, report: &mut RunReport) -> BundleReport {
        let mut entry = BundleReport {
            bundle: bundle.to_string(),
            stream: None,
            structural_files: 0,
            header: None,
        };

        let name = bundle.file_name().unwrap_or(bundle.as_str());
        let Some(stream) = bundle_stream(name) else {
            let err = HeaderError::InvalidCandidate(format!(
                "cannot derive a stream from bundle name {name:?}"
            ));
            report.fail(Phase::Unpacking, bundle.as_str(), &err);
            return entry;
        };
        entry.stream = Some(stream.to_string());

        let extraction_root = self.staging.extraction_root();
        if let Err(err) = self
            .staging
            .reset_extraction()
            .and_then(|()| self.unpacker.unpack(bundle, extraction_root))
        {
            report.fail(Phase::Unpacking, bundle.as_str(), &err);
            return entry;
        }
        if let Err(err) = self.unpacker.remove_bundle(bundle) {
            report.fail(Phase::Unpacking, bundle.as_str(), &err);
        }

        let files = match self.unpacker.discover_structural_files(extraction_root) {
            Ok(files) => files,
            Err(err) => {
                report.fail(Phase::Unpacking, bundle.as_str(), &err);
                return entry;
            }
        };
        entry.structural_files = files.len();
        if files.is_empty() {
            tracing::warn!(bundle = %bundle, stream = %stream, "bundle holds no netcdf files");
            return entry;
        }

        let header_path = PathResolver::bundle_header_path(self.headers.root(), name);
        match self.extractor.dump_multi(&files, &header_path) {
            Ok(outcome) => {
                for failure in &outcome.failures {
                    report.failures.push(Failure {
                        phase: Phase::Unpacking,
                        subject: failure.file.clone(),
                        message: failure.message.clone(),
                    });
                }
                entry.header = Some(outcome);
            }
            Err(err) => report.fail(Phase::Unpacking, header_path.as_str(), &err),
        }
        entry
    }

    fn publish(&self, report: &mut RunReport) {
        let Some(publisher) = &self.publisher else {
            tracing::info!(
                "no publish destination configured, headers stay in {}",
                self.headers.root()
            );
            return;
        };
        let result = self
            .headers
            .list()
            .and_then(|headers| publisher.publish(&headers));
        match result {
            Ok(info) => {
                report.published = Some(info);
                if self.clean_headers_after_publish {
                    if let Err(err) = self.headers.clear() {
                        report.fail(Phase::Publish, self.headers.root().as_str(), &err);
                    }
                }
            }
            Err(err) => report.fail(Phase::Publish, self.headers.root().as_str(), &err),
        }
    }
}
