use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{DEFAULT_BUNDLE_MARKER, MatchMode, SkipList, SkipRule};
use crate::error::HeaderError;

pub const PROD_CONFIG_FILE: &str = "dd-headers.prod.json";
pub const TEST_CONFIG_FILE: &str = "dd-headers.dev.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Production,
    Test,
}

impl Profile {
    pub fn default_config_file(self) -> &'static str {
        match self {
            Profile::Production => PROD_CONFIG_FILE,
            Profile::Test => TEST_CONFIG_FILE,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub logging: LoggingSection,
    pub paths: PathsSection,
    pub retrieval: RetrievalSection,
    #[serde(default)]
    pub extraction: Option<ExtractionSection>,
    pub database: DatabaseSection,
    #[serde(default)]
    pub publish: Option<PublishSection>,
    #[serde(default)]
    pub skip: Option<Vec<SkipEntry>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoggingSection {
    pub log_dir: String,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PathsSection {
    pub archive_root: String,
    pub header_dir: String,
    pub download_loc: String,
    pub extraction_loc: String,
    #[serde(default)]
    pub manifest_dir: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalSection {
    #[serde(default)]
    pub stage: bool,
    pub adrsws_path: String,
    pub userid: String,
    #[serde(default)]
    pub bundle_marker: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ExtractionSection {
    #[serde(default)]
    pub dump_tool: Option<String>,
    #[serde(default)]
    pub dump_args: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseSection {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    pub dbname: String,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub application_name: Option<String>,
    #[serde(default)]
    pub pgpass_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PublishSection {
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub scp_path: Option<String>,
    #[serde(default)]
    pub clean_after: bool,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SkipEntry {
    Shorthand(String),
    Detailed(SkipEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SkipEntryObject {
    pub pattern: String,
    #[serde(default, rename = "match")]
    pub mode: Option<MatchMode>,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_dir: Utf8PathBuf,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub archive_root: Utf8PathBuf,
    pub header_dir: Utf8PathBuf,
    pub download_loc: Utf8PathBuf,
    pub extraction_loc: Utf8PathBuf,
    pub manifest_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub stage: bool,
    pub adrsws_path: Utf8PathBuf,
    pub userid: String,
    pub bundle_marker: String,
}

#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub dump_tool: String,
    pub dump_args: Vec<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dump_tool: "ncdump".to_string(),
            dump_args: vec!["-h".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: Option<u16>,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    pub application_name: String,
    pub pgpass_path: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PublishConfig {
    pub destination: Option<String>,
    pub scp_path: String,
    pub clean_after: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            destination: None,
            scp_path: "scp".to_string(),
            clean_after: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
    pub retrieval: RetrievalConfig,
    pub extraction: ExtractionConfig,
    pub database: DatabaseConfig,
    pub publish: PublishConfig,
    pub skip: SkipList,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>, profile: Profile) -> Result<ResolvedConfig, HeaderError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Utf8PathBuf::from(profile.default_config_file()),
        };

        if !config_path.as_std_path().exists() {
            return Err(HeaderError::MissingConfig(config_path.into_std_path_buf()));
        }

        let content = fs::read_to_string(config_path.as_std_path())
            .map_err(|_| HeaderError::ConfigRead(config_path.clone().into_std_path_buf()))?;
        Self::resolve_str(&content)
    }

    pub fn resolve_str(content: &str) -> Result<ResolvedConfig, HeaderError> {
        let config: Config =
            serde_json::from_str(content).map_err(|err| HeaderError::ConfigParse(err.to_string()))?;
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HeaderError> {
        let logging = LoggingConfig {
            log_dir: required_path("logging.log_dir", &config.logging.log_dir)?,
            log_level: config
                .logging
                .log_level
                .unwrap_or_else(|| "info".to_string()),
        };

        let download_loc = required_path("paths.download_loc", &config.paths.download_loc)?;
        let extraction_loc = required_path("paths.extraction_loc", &config.paths.extraction_loc)?;
        if download_loc == extraction_loc {
            return Err(HeaderError::InvalidConfig(
                "paths.download_loc and paths.extraction_loc must differ".to_string(),
            ));
        }
        let manifest_dir = match config.paths.manifest_dir {
            Some(dir) => required_path("paths.manifest_dir", &dir)?,
            None => default_manifest_dir(&download_loc),
        };
        if manifest_dir.starts_with(&download_loc) || manifest_dir.starts_with(&extraction_loc) {
            return Err(HeaderError::InvalidConfig(
                "paths.manifest_dir must not live inside a scratch directory".to_string(),
            ));
        }
        let paths = PathsConfig {
            archive_root: required_path("paths.archive_root", &config.paths.archive_root)?,
            header_dir: required_path("paths.header_dir", &config.paths.header_dir)?,
            download_loc,
            extraction_loc,
            manifest_dir,
        };

        let bundle_marker = config
            .retrieval
            .bundle_marker
            .unwrap_or_else(|| DEFAULT_BUNDLE_MARKER.to_string());
        if bundle_marker.is_empty() {
            return Err(HeaderError::InvalidConfig(
                "retrieval.bundle_marker must not be empty".to_string(),
            ));
        }
        let retrieval = RetrievalConfig {
            stage: config.retrieval.stage,
            adrsws_path: Utf8PathBuf::from(config.retrieval.adrsws_path),
            userid: config.retrieval.userid,
            bundle_marker,
        };
        if retrieval.stage && retrieval.userid.trim().is_empty() {
            return Err(HeaderError::InvalidConfig(
                "retrieval.userid is required when staging is enabled".to_string(),
            ));
        }

        let extraction = match config.extraction {
            Some(section) => {
                let defaults = ExtractionConfig::default();
                ExtractionConfig {
                    dump_tool: section.dump_tool.unwrap_or(defaults.dump_tool),
                    dump_args: section.dump_args.unwrap_or(defaults.dump_args),
                }
            }
            None => ExtractionConfig::default(),
        };

        let database = DatabaseConfig {
            host: config.database.host,
            port: config.database.port,
            dbname: config.database.dbname,
            user: config.database.user,
            password: config.database.password,
            application_name: config
                .database
                .application_name
                .unwrap_or_else(|| "data_discovery_header_dump".to_string()),
            pgpass_path: config.database.pgpass_path.map(Utf8PathBuf::from),
        };

        let publish = match config.publish {
            Some(section) => PublishConfig {
                destination: section.destination.filter(|value| !value.trim().is_empty()),
                scp_path: section.scp_path.unwrap_or_else(|| "scp".to_string()),
                clean_after: section.clean_after,
            },
            None => PublishConfig::default(),
        };

        let skip = match config.skip {
            Some(entries) => SkipList::new(
                entries
                    .into_iter()
                    .map(|entry| match entry {
                        SkipEntry::Shorthand(pattern) => SkipRule::substring(&pattern),
                        SkipEntry::Detailed(obj) => {
                            SkipRule::new(&obj.pattern, obj.mode.unwrap_or(MatchMode::Substring))
                        }
                    })
                    .collect::<Result<Vec<_>, HeaderError>>()?,
            ),
            None => SkipList::defaults(),
        };

        Ok(ResolvedConfig {
            logging,
            paths,
            retrieval,
            extraction,
            database,
            publish,
            skip,
        })
    }
}

fn required_path(name: &str, value: &str) -> Result<Utf8PathBuf, HeaderError> {
    if value.trim().is_empty() {
        return Err(HeaderError::InvalidConfig(format!("{name} must not be empty")));
    }
    Ok(Utf8PathBuf::from(value))
}

fn default_manifest_dir(download_loc: &Utf8Path) -> Utf8PathBuf {
    download_loc
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .map(Utf8Path::to_path_buf)
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}
