//! File-backed tables of pre-provisioned static users and groups.
//!
//! Files are JSON arrays validated strictly: unknown fields and duplicate
//! names are rejected. A table is replaced as a whole on reload.

mod static_group;
mod static_user;

pub use static_group::{StaticGroup, StaticGroupRepository};
pub use static_user::{StaticUser, StaticUserRepository};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum StaticLoadError {
    #[error("while reading {kind} file {path}: {source}")]
    Io {
        kind: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("while parsing {kind} file {path}: {source}")]
    Parse {
        kind: &'static str,
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("duplicate {kind} entry: {name}")]
    Duplicate { kind: &'static str, name: String },
}

/// A record of a static table, addressed by its name.
pub trait StaticRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn name(&self) -> &str;
}

/// Records of a static table indexed by name.
pub type Records<T> = HashMap<String, T>;

/// Immutable name → record map, reloadable by atomic replacement.
pub struct StaticTable<T: StaticRecord> {
    path: Option<PathBuf>,
    records: ArcSwap<Records<T>>,
}

impl<T: StaticRecord> StaticTable<T> {
    pub fn new(records: Vec<T>) -> Result<Self, StaticLoadError> {
        Ok(Self {
            path: None,
            records: ArcSwap::from_pointee(index(records)?),
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StaticLoadError> {
        let path = path.as_ref().to_path_buf();
        let records = index(read_records(&path)?)?;
        info!("Loaded {} {} entries from {}", records.len(), T::KIND, path.display());
        Ok(Self {
            path: Some(path),
            records: ArcSwap::from_pointee(records),
        })
    }

    /// Re-read the backing file and swap the whole table in.
    pub fn reload(&self) -> Result<(), StaticLoadError> {
        if let Some(records) = self.read()? {
            self.store(records);
        }
        Ok(())
    }

    /// Parse and index the backing file without making it live. `None`
    /// when the table has no backing file.
    pub fn read(&self) -> Result<Option<Records<T>>, StaticLoadError> {
        match &self.path {
            Some(path) => Ok(Some(index(read_records(path)?)?)),
            None => Ok(None),
        }
    }

    pub fn store(&self, records: Records<T>) {
        info!("Reloaded {} {} entries", records.len(), T::KIND);
        self.records.store(Arc::new(records));
    }

    pub fn find(&self, name: &str) -> Option<T> {
        self.records.load().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_records<T: StaticRecord>(path: &Path) -> Result<Vec<T>, StaticLoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| StaticLoadError::Io {
        kind: T::KIND,
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| StaticLoadError::Parse {
        kind: T::KIND,
        path: path.display().to_string(),
        source,
    })
}

fn index<T: StaticRecord>(records: Vec<T>) -> Result<Records<T>, StaticLoadError> {
    let mut map = HashMap::with_capacity(records.len());
    for record in records {
        let name = record.name().to_string();
        if map.insert(name.clone(), record).is_some() {
            return Err(StaticLoadError::Duplicate {
                kind: T::KIND,
                name,
            });
        }
    }
    Ok(map)
}
