use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDateTime;
use directories::BaseDirs;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};

use crate::config::DatabaseConfig;
use crate::domain::CandidateFile;
use crate::error::HeaderError;

pub const DEFAULT_PORT: u16 = 5432;

/// Latest file per stream. Ties on `start_time` return every tied file.
pub const LATEST_FILES_SQL: &str = "\
with dates as (
    select max(start_time) as last_file, zeb_platform
    from user_access_files.zebfile_timeplat
    group by zeb_platform
)
select z.old_filename, z.zeb_platform, d.last_file::timestamp as last_file
from user_access_files.zebfile_timeplat z
inner join dates d on z.start_time = d.last_file and z.zeb_platform = d.zeb_platform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub filename: String,
    pub stream: String,
    pub last_file: NaiveDateTime,
}

impl CatalogRow {
    pub fn new(filename: &str, stream: &str, last_file: NaiveDateTime) -> Self {
        Self {
            filename: filename.to_string(),
            stream: stream.to_string(),
            last_file,
        }
    }

    pub fn to_candidate(&self) -> Result<CandidateFile, HeaderError> {
        CandidateFile::new(&self.filename, &self.stream, self.last_file)
    }
}

pub trait CatalogSource {
    fn latest_files(&self) -> Result<Vec<CatalogRow>, HeaderError>;
}

/// Postgres catalog reached through `sqlx`. Each query opens a single
/// connection on a private current-thread runtime, so callers stay blocking.
#[derive(Debug, Clone)]
pub struct PgCatalog {
    options: PgConnectOptions,
    host: String,
    dbname: String,
}

impl PgCatalog {
    /// Uses the configured password, falling back to the user's `.pgpass`.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, HeaderError> {
        let port = config.port.unwrap_or(DEFAULT_PORT);
        let password = match &config.password {
            Some(password) => password.clone(),
            None => {
                let pgpass = match &config.pgpass_path {
                    Some(path) => path.clone(),
                    None => default_pgpass_path()?,
                };
                lookup_pgpass(&pgpass, &config.host, port, &config.dbname, &config.user)?
            }
        };
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(port)
            .database(&config.dbname)
            .username(&config.user)
            .password(&password)
            .application_name(&config.application_name);
        Ok(Self {
            options,
            host: config.host.clone(),
            dbname: config.dbname.clone(),
        })
    }

    async fn fetch(&self) -> Result<Vec<CatalogRow>, HeaderError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(self.options.clone())
            .await
            .map_err(|err| {
                HeaderError::Catalog(format!(
                    "failed to connect to {}/{}: {err}",
                    self.host, self.dbname
                ))
            })?;
        let rows = sqlx::query(LATEST_FILES_SQL).fetch_all(&pool).await;
        pool.close().await;
        rows.map_err(|err| HeaderError::Catalog(err.to_string()))?
            .iter()
            .map(row_to_catalog)
            .collect()
    }
}

impl CatalogSource for PgCatalog {
    fn latest_files(&self) -> Result<Vec<CatalogRow>, HeaderError> {
        tracing::info!(host = %self.host, dbname = %self.dbname, "querying catalog");
        let rows = block_on(self.fetch())??;
        tracing::info!(rows = rows.len(), "catalog returned rows");
        Ok(rows)
    }
}

fn row_to_catalog(row: &PgRow) -> Result<CatalogRow, HeaderError> {
    let filename: String = row
        .try_get("old_filename")
        .map_err(|err| HeaderError::Catalog(format!("missing old_filename: {err}")))?;
    let stream: String = row
        .try_get("zeb_platform")
        .map_err(|err| HeaderError::Catalog(format!("missing zeb_platform: {err}")))?;
    let last_file: NaiveDateTime = row
        .try_get("last_file")
        .map_err(|err| HeaderError::Catalog(format!("missing last_file: {err}")))?;
    Ok(CatalogRow {
        filename,
        stream,
        last_file,
    })
}

fn block_on<F: Future>(fut: F) -> Result<F::Output, HeaderError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| HeaderError::Catalog(format!("tokio runtime init failed: {err}")))?;
    Ok(runtime.block_on(fut))
}

/// `$PGPASSFILE`, else `~/.pgpass`.
fn default_pgpass_path() -> Result<Utf8PathBuf, HeaderError> {
    if let Some(path) = std::env::var_os("PGPASSFILE") {
        return Utf8PathBuf::from_path_buf(path.into()).map_err(|path| {
            HeaderError::InvalidConfig(format!("PGPASSFILE is not UTF-8: {}", path.display()))
        });
    }
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.home_dir().join(".pgpass")).ok())
        .ok_or_else(|| HeaderError::InvalidConfig("unable to resolve home directory".to_string()))
}

/// Looks up a password in a `hostname:port:database:username:password`
/// file. `*` matches any value in the first four fields; `\:` and `\\` are
/// literal characters. The first matching line wins.
pub fn lookup_pgpass(
    path: &Utf8Path,
    host: &str,
    port: u16,
    dbname: &str,
    user: &str,
) -> Result<String, HeaderError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| HeaderError::ConfigRead(path.to_path_buf().into_std_path_buf()))?;
    let port = port.to_string();
    let wanted = [host, port.as_str(), dbname, user];
    content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
        .filter_map(pgpass_fields)
        .find(|fields| {
            fields[..4]
                .iter()
                .zip(wanted)
                .all(|(field, value)| field == "*" || field == value)
        })
        .map(|mut fields| fields.swap_remove(4))
        .ok_or_else(|| HeaderError::MissingCredential(user.to_string()))
}

/// Splits one `.pgpass` line into its five unescaped fields. The password
/// field takes the rest of the line.
fn pgpass_fields(line: &str) -> Option<Vec<String>> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => current.extend(chars.next()),
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut current)),
            _ => current.push(ch),
        }
    }
    fields.push(current);
    (fields.len() == 5).then_some(fields)
}
