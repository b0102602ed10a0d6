#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use serde_json::{Value, json};
use tempfile::TempDir;

use dd_headers::catalog::{CatalogRow, CatalogSource};
use dd_headers::config::{ConfigLoader, ResolvedConfig};
use dd_headers::error::HeaderError;
use dd_headers::extractor::HeaderDumper;
use dd_headers::pipeline::{ProgressEvent, ProgressSink};
use dd_headers::publish::{PublishInfo, Publisher};
use dd_headers::stager::RetrievalAgent;

pub struct Fixture {
    _temp: TempDir,
    pub root: Utf8PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        Self { _temp: temp, root }
    }

    pub fn archive_root(&self) -> Utf8PathBuf {
        self.root.join("archive")
    }

    pub fn header_dir(&self) -> Utf8PathBuf {
        self.root.join("headers")
    }

    pub fn download_loc(&self) -> Utf8PathBuf {
        self.root.join("work").join("download")
    }

    pub fn extraction_loc(&self) -> Utf8PathBuf {
        self.root.join("work").join("extraction")
    }

    pub fn manifest_dir(&self) -> Utf8PathBuf {
        self.root.join("work")
    }

    pub fn config_json(&self, stage: bool) -> Value {
        json!({
            "logging": { "log_dir": self.root.join("logs").as_str() },
            "paths": {
                "archive_root": self.archive_root().as_str(),
                "header_dir": self.header_dir().as_str(),
                "download_loc": self.download_loc().as_str(),
                "extraction_loc": self.extraction_loc().as_str()
            },
            "retrieval": {
                "stage": stage,
                "adrsws_path": "/opt/adrsws/bin/adrsws.sh",
                "userid": "tester"
            },
            "database": {
                "host": "localhost",
                "dbname": "arm_all",
                "user": "reader",
                "password": "secret"
            }
        })
    }

    pub fn config(&self, stage: bool) -> ResolvedConfig {
        ConfigLoader::resolve_str(&self.config_json(stage).to_string()).unwrap()
    }

    /// Places `filename` in the local archive under `<site>/<stream>/`.
    pub fn archive_file(&self, filename: &str, stream: &str) -> Utf8PathBuf {
        let dir = self.archive_root().join(&filename[..3]).join(stream);
        fs::create_dir_all(dir.as_std_path()).unwrap();
        let path = dir.join(filename);
        fs::write(path.as_std_path(), b"CDF\x01").unwrap();
        path
    }

    pub fn manifests(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.manifest_dir().as_std_path())
            .map(|entries| {
                entries
                    .flatten()
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .filter(|name| name.starts_with("download_list."))
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn header_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.header_dir().as_std_path())
            .map(|entries| {
                entries
                    .flatten()
                    .map(|entry| entry.file_name().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }
}

/// Catalog timestamp shared by every fixture row.
pub fn reference_time() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2023-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap()
}

pub fn is_empty_dir(path: &Utf8Path) -> bool {
    path.as_std_path().is_dir() && fs::read_dir(path.as_std_path()).unwrap().next().is_none()
}

/// Writes a plain tar at `path` holding `entries` as regular files.
pub fn build_bundle(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path()).unwrap();
    }
    let file = fs::File::create(path.as_std_path()).unwrap();
    let mut builder = tar::Builder::new(file);
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap();
}

pub struct StaticCatalog {
    rows: Vec<CatalogRow>,
}

impl StaticCatalog {
    pub fn new(rows: &[(&str, &str)]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|(filename, stream)| CatalogRow::new(filename, stream, reference_time()))
                .collect(),
        }
    }
}

impl CatalogSource for StaticCatalog {
    fn latest_files(&self) -> Result<Vec<CatalogRow>, HeaderError> {
        Ok(self.rows.clone())
    }
}

pub struct FailingCatalog;

impl CatalogSource for FailingCatalog {
    fn latest_files(&self) -> Result<Vec<CatalogRow>, HeaderError> {
        Err(HeaderError::Catalog("connection refused".to_string()))
    }
}

/// Emits `netcdf <name> {` for every file; files with `corrupt` in their
/// name fail like a real dump tool would on a damaged file.
pub struct FakeDumper;

impl HeaderDumper for FakeDumper {
    fn dump(&self, file: &Utf8Path) -> Result<Vec<u8>, HeaderError> {
        let name = file.file_name().unwrap_or_default();
        if name.contains("corrupt") {
            return Err(HeaderError::ExtractionTool {
                file: file.to_string(),
                message: "NetCDF: Unknown file format".to_string(),
            });
        }
        Ok(format!("netcdf {name} {{\ndimensions:\n\ttime = UNLIMITED ;\n}}\n").into_bytes())
    }
}

/// Copies prepared bundles into the download directory.
#[derive(Default)]
pub struct CopyAgent {
    pub bundles: Vec<Utf8PathBuf>,
    pub calls: Cell<usize>,
    pub manifests: RefCell<Vec<Vec<String>>>,
}

impl CopyAgent {
    pub fn new(bundles: Vec<Utf8PathBuf>) -> Self {
        Self {
            bundles,
            ..Self::default()
        }
    }
}

impl RetrievalAgent for CopyAgent {
    fn stage(
        &self,
        manifest: &Utf8Path,
        download_dir: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<Option<Value>, HeaderError> {
        self.calls.set(self.calls.get() + 1);
        self.manifests
            .borrow_mut()
            .push(dd_headers::manifest::RetrievalManifest::read(manifest)?);
        let order_dir = download_dir.join("order-1");
        fs::create_dir_all(order_dir.as_std_path()).unwrap();
        for bundle in &self.bundles {
            let target = order_dir.join(bundle.file_name().unwrap());
            fs::copy(bundle.as_std_path(), target.as_std_path()).unwrap();
            sink.event(ProgressEvent {
                phase: dd_headers::pipeline::Phase::Staging,
                message: format!("retrieved {target}"),
                elapsed: None,
            });
        }
        Ok(Some(json!({ "order_id": 1, "files": self.bundles.len() })))
    }
}

pub struct FailingAgent;

impl RetrievalAgent for FailingAgent {
    fn stage(
        &self,
        _manifest: &Utf8Path,
        _download_dir: &Utf8Path,
        _sink: &dyn ProgressSink,
    ) -> Result<Option<Value>, HeaderError> {
        Err(HeaderError::RetrievalAgent("exited with status 1".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    pub published: RefCell<Vec<String>>,
}

impl Publisher for RecordingPublisher {
    fn publish(&self, headers: &[Utf8PathBuf]) -> Result<PublishInfo, HeaderError> {
        self.published
            .borrow_mut()
            .extend(headers.iter().map(|path| path.file_name().unwrap_or_default().to_string()));
        Ok(PublishInfo {
            destination: "catalog@ui:/headers/".to_string(),
            files: headers.len(),
        })
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub messages: RefCell<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.borrow_mut().push(event.message);
    }
}
