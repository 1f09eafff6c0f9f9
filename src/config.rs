//! Startup configuration
//!
//! Read from environment variables:
//! - `SPANCHUNK_HOST`: Bind address (default: 0.0.0.0)
//! - `SPANCHUNK_PORT`: Port number (default: 8080)
//! - `SPANCHUNK_TENANT`: Tenant chunks are written under (default: fake)
//! - `SPANCHUNK_STATIC_LABELS`: `k=v,k=v` labels added to every span (default: env=prod)
//! - `SPANCHUNK_STORE`: `memory` or `fs` (default: memory)
//! - `SPANCHUNK_DATA_DIR`: Root directory for the `fs` store (default: ./data)
//! - `SPANCHUNK_REFERENCE_INSTANT`: `span_start` or `wall_clock` (default: span_start)
//! - `SPANCHUNK_ON_STORE_ERROR`: `continue` or `abort` (default: continue)
//! - `SPANCHUNK_ENCODING`: `lz4` or `none` (default: lz4)
//! - `SPANCHUNK_BLOCK_SIZE_KB`: Uncompressed block size (default: 256)
//! - `SPANCHUNK_LINE_TEMPLATE`: Log line template for materialized entries

use std::path::PathBuf;
use std::sync::Arc;

use crate::chunk::Encoding;
use crate::labels::{Label, LabelEncoder};
use crate::store::{validate_tenant, ChunkStore, FsStore, MemoryStore, StoreError};
use crate::stream::{LineTemplate, ReferenceInstant};
use crate::writer::{ErrorPolicy, WriterConfig};

const DEFAULT_STATIC_LABELS: &str = "env=prod";
const DEFAULT_DATA_DIR: &str = "./data";

/// Which chunk store backs the writer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreConfig {
    #[default]
    Memory,
    Fs { data_dir: PathBuf },
}

impl StoreConfig {
    pub fn open(&self) -> Result<Arc<dyn ChunkStore>, StoreError> {
        match self {
            StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
            StoreConfig::Fs { data_dir } => Ok(Arc::new(FsStore::new(data_dir)?)),
        }
    }
}

/// Full process configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub writer: WriterConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            store: StoreConfig::default(),
            writer: WriterConfig::default(),
        }
    }
}

impl Config {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    pub fn with_writer(mut self, writer: WriterConfig) -> Self {
        self.writer = writer;
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = var("SPANCHUNK_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match var("SPANCHUNK_PORT") {
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid("SPANCHUNK_PORT", &p))?,
            None => 8080,
        };

        let tenant = var("SPANCHUNK_TENANT").unwrap_or_else(|| crate::store::DEFAULT_TENANT.to_string());
        validate_tenant(&tenant).map_err(|_| ConfigError::invalid("SPANCHUNK_TENANT", &tenant))?;

        let static_labels = parse_static_labels(
            &var("SPANCHUNK_STATIC_LABELS").unwrap_or_else(|| DEFAULT_STATIC_LABELS.to_string()),
        )?;
        LabelEncoder::with_static_labels(static_labels.clone())?;

        let store = match var("SPANCHUNK_STORE").as_deref().map(str::trim) {
            None | Some("memory") => StoreConfig::Memory,
            Some("fs") => StoreConfig::Fs {
                data_dir: PathBuf::from(
                    var("SPANCHUNK_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
                ),
            },
            Some(other) => return Err(ConfigError::invalid("SPANCHUNK_STORE", other)),
        };

        let reference_instant = match var("SPANCHUNK_REFERENCE_INSTANT") {
            Some(v) => ReferenceInstant::parse(v.trim())
                .ok_or_else(|| ConfigError::invalid("SPANCHUNK_REFERENCE_INSTANT", &v))?,
            None => ReferenceInstant::default(),
        };

        let on_store_error = match var("SPANCHUNK_ON_STORE_ERROR") {
            Some(v) => ErrorPolicy::parse(v.trim())
                .ok_or_else(|| ConfigError::invalid("SPANCHUNK_ON_STORE_ERROR", &v))?,
            None => ErrorPolicy::default(),
        };

        let encoding = match var("SPANCHUNK_ENCODING") {
            Some(v) => Encoding::parse(v.trim())
                .ok_or_else(|| ConfigError::invalid("SPANCHUNK_ENCODING", &v))?,
            None => Encoding::default(),
        };

        let block_size = match var("SPANCHUNK_BLOCK_SIZE_KB") {
            Some(v) => match v.trim().parse::<usize>() {
                Ok(kb) if kb > 0 => kb
                    .checked_mul(1024)
                    .ok_or_else(|| ConfigError::invalid("SPANCHUNK_BLOCK_SIZE_KB", &v))?,
                _ => return Err(ConfigError::invalid("SPANCHUNK_BLOCK_SIZE_KB", &v)),
            },
            None => crate::chunk::DEFAULT_BLOCK_SIZE,
        };

        let line_template = var("SPANCHUNK_LINE_TEMPLATE")
            .map(LineTemplate::new)
            .unwrap_or_default();

        Ok(Self {
            host,
            port,
            store,
            writer: WriterConfig {
                tenant,
                reference_instant,
                on_store_error,
                line_template,
                encoding,
                block_size,
                static_labels,
            },
        })
    }
}

/// Parse `k=v,k=v`; blank entries are skipped
pub fn parse_static_labels(s: &str) -> Result<Vec<Label>, ConfigError> {
    s.split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| ConfigError::invalid("SPANCHUNK_STATIC_LABELS", pair))?;
            Ok(Label::new(name.trim(), value.trim()))
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid static labels: {0}")]
    Labels(#[from] crate::labels::LabelError),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
        }
    }
}
