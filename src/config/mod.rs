//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{BackendArg, CliArgs, Command, GetArgs, Overrides, SearchArgs, TermsArgs};

use std::{
    fmt,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::PostTypes;
use crate::infra::fs::FrontmatterFormat;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "postindex";
const ENV_PREFIX: &str = "POSTINDEX";
const DEFAULT_CONTENT_ROOT: &str = "content";
const DEFAULT_WALK_BUFFER: u64 = 64;
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DATABASE_URL: &str = "sqlite://data/postindex.db";
const DEFAULT_MAX_CONNECTIONS: u64 = 4;
const DEFAULT_PAGE_SIZE: u64 = 10;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub content: ContentSettings,
    pub store: StoreSettings,
    pub query: QuerySettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ContentSettings {
    pub root: PathBuf,
    pub post_types: PostTypes,
    pub walk_buffer: NonZeroUsize,
    /// Syntax for frontmatter in documents written through the coordinator.
    pub frontmatter: FrontmatterFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Embedded,
    Sqlite,
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Embedded => "embedded",
            StoreBackend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "embedded" => Ok(StoreBackend::Embedded),
            "sqlite" => Ok(StoreBackend::Sqlite),
            other => Err(format!(
                "unknown backend `{other}`, expected memory, embedded or sqlite"
            )),
        }
    }
}

impl From<BackendArg> for StoreBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Memory => StoreBackend::Memory,
            BackendArg::Embedded => StoreBackend::Embedded,
            BackendArg::Sqlite => StoreBackend::Sqlite,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    /// Directory for the embedded backend's files.
    pub data_dir: PathBuf,
    pub database_url: String,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub default_page_size: NonZeroU32,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("content.post_types"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    content: RawContentSettings,
    store: RawStoreSettings,
    query: RawQuerySettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(root) = overrides.content_root.as_ref() {
            self.content.root = Some(root.clone());
        }
        if let Some(backend) = overrides.store_backend {
            self.store.backend = Some(StoreBackend::from(backend).as_str().to_string());
        }
        if let Some(dir) = overrides.store_data_dir.as_ref() {
            self.store.data_dir = Some(dir.clone());
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.store.database_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            content,
            store,
            query,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            content: build_content_settings(content)?,
            store: build_store_settings(store)?,
            query: build_query_settings(query)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_content_settings(content: RawContentSettings) -> Result<ContentSettings, LoadError> {
    let root = content
        .root
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_ROOT));
    if root.as_os_str().is_empty() {
        return Err(LoadError::invalid("content.root", "path must not be empty"));
    }

    let post_types = match content.post_types {
        Some(names) => PostTypes::new(names.iter().map(|name| name.trim()))
            .map_err(|err| LoadError::invalid("content.post_types", err.to_string()))?,
        None => PostTypes::default(),
    };

    let walk_buffer = content.walk_buffer.unwrap_or(DEFAULT_WALK_BUFFER);
    let walk_buffer = usize::try_from(walk_buffer)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| LoadError::invalid("content.walk_buffer", "must be greater than zero"))?;

    let frontmatter = match content.frontmatter {
        Some(value) => value
            .parse()
            .map_err(|reason: String| LoadError::invalid("content.frontmatter", reason))?,
        None => FrontmatterFormat::default(),
    };

    Ok(ContentSettings {
        root,
        post_types,
        walk_buffer,
        frontmatter,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let backend = match store.backend {
        Some(value) => value
            .parse()
            .map_err(|reason: String| LoadError::invalid("store.backend", reason))?,
        None => StoreBackend::Memory,
    };

    let data_dir = store
        .data_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    if data_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid("store.data_dir", "path must not be empty"));
    }

    let database_url = store
        .database_url
        .and_then(|value| {
            let trimmed = value.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
    if backend == StoreBackend::Sqlite && !database_url.starts_with("sqlite:") {
        return Err(LoadError::invalid(
            "store.database_url",
            "expected a sqlite: URL",
        ));
    }

    let max_connections = non_zero_u32(
        store.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
        "store.max_connections",
    )?;

    Ok(StoreSettings {
        backend,
        data_dir,
        database_url,
        max_connections,
    })
}

fn build_query_settings(query: RawQuerySettings) -> Result<QuerySettings, LoadError> {
    Ok(QuerySettings {
        default_page_size: non_zero_u32(
            query.default_page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            "query.default_page_size",
        )?,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawContentSettings {
    root: Option<PathBuf>,
    post_types: Option<Vec<String>>,
    walk_buffer: Option<u64>,
    frontmatter: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    backend: Option<String>,
    data_dir: Option<PathBuf>,
    database_url: Option<String>,
    max_connections: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawQuerySettings {
    default_page_size: Option<u64>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
