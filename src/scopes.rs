//! Required-scopes lookup backed by a hot-reloadable JSON document.
//!
//! The document is addressed with dotted paths such as
//! `scopesPerConsumerType.runtime`. A path resolves to a single scope string
//! or a list of scope strings. Reloads parse the whole file first and then
//! swap the parsed document in atomically, so readers see either the old or
//! the new document.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::model::ConsumerType;
use crate::utils::extract_json_path;

/// Path prefix of per-consumer-type scopes inside the document.
pub const SCOPES_PER_CONSUMER_TYPE_PREFIX: &str = "scopesPerConsumerType";

#[derive(Debug, Error)]
pub enum ScopesError {
    #[error("required scopes are not defined [path={0}]")]
    NotDefined(String),

    #[error("malformed scopes definition [path={path}]: {reason}")]
    Malformed { path: String, reason: String },

    #[error("while reading scopes file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("while parsing scopes file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Path of the scopes granted to a consumer type.
pub fn consumer_type_path(consumer_type: ConsumerType) -> String {
    format!(
        "{}.{}",
        SCOPES_PER_CONSUMER_TYPE_PREFIX,
        consumer_type.scopes_key()
    )
}

pub trait ScopesGetter: Send + Sync {
    fn get_required_scopes(&self, path: &str) -> Result<Vec<String>, ScopesError>;
}

/// Resolve a dotted path inside a parsed scopes document.
pub fn resolve_scopes(document: &Value, path: &str) -> Result<Vec<String>, ScopesError> {
    let malformed = |reason: &str| ScopesError::Malformed {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    match extract_json_path(document, path) {
        None | Some(Value::Null) => Err(ScopesError::NotDefined(path.to_string())),
        Some(Value::String(s)) if s.is_empty() => Err(ScopesError::NotDefined(path.to_string())),
        Some(Value::String(s)) => Ok(vec![s.clone()]),
        Some(Value::Array(items)) if items.is_empty() => {
            Err(ScopesError::NotDefined(path.to_string()))
        }
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed("list contains a non-string entry"))
            })
            .collect(),
        Some(_) => Err(malformed("expected a string or a list of strings")),
    }
}

/// [`ScopesGetter`] reading a JSON file, reloadable at runtime.
pub struct FileScopesGetter {
    path: Option<PathBuf>,
    document: ArcSwap<Value>,
}

impl FileScopesGetter {
    /// Load the document from `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScopesError> {
        let path = path.as_ref().to_path_buf();
        let document = read_document(&path)?;
        info!("Loaded scopes document from {}", path.display());
        Ok(Self {
            path: Some(path),
            document: ArcSwap::from_pointee(document),
        })
    }

    /// In-memory document without a backing file.
    pub fn from_value(document: Value) -> Self {
        Self {
            path: None,
            document: ArcSwap::from_pointee(document),
        }
    }

    /// Re-read the backing file. On error the previous document stays live.
    pub fn reload(&self) -> Result<(), ScopesError> {
        if let Some(document) = self.read()? {
            self.store(document);
        }
        Ok(())
    }

    /// Parse the backing file without making it live. `None` when the
    /// document has no backing file.
    pub fn read(&self) -> Result<Option<Value>, ScopesError> {
        self.path.as_deref().map(read_document).transpose()
    }

    pub fn store(&self, document: Value) {
        self.document.store(Arc::new(document));
        if let Some(path) = &self.path {
            debug!("Reloaded scopes document from {}", path.display());
        }
    }

    /// Reload the document every `period` until the handle is aborted.
    pub fn spawn_reloader(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.reload() {
                    warn!("Scopes reload failed, keeping previous document: {}", e);
                }
            }
        })
    }
}

impl ScopesGetter for FileScopesGetter {
    fn get_required_scopes(&self, path: &str) -> Result<Vec<String>, ScopesError> {
        let document = self.document.load();
        resolve_scopes(&document, path)
    }
}

fn read_document(path: &Path) -> Result<Value, ScopesError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ScopesError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ScopesError::Parse {
        path: path.display().to_string(),
        source,
    })
}
