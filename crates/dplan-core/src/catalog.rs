//! Read-only lookup of requirement trees by major name.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("catalog {0} is not valid JSON: {1}")]
    Json(PathBuf, String),
    #[error("catalog must be an object keyed by major or an array of major rows")]
    Shape,
    #[error("no requirements found for major '{0}'")]
    UnknownMajor(String),
    #[error("no requirement catalog is configured")]
    NotConfigured,
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn majors(&self) -> Result<Vec<String>, CatalogError>;
    async fn requirements(&self, major: &str) -> Result<Option<Value>, CatalogError>;
}

/// Catalog held in a JSON file, either `{"<major>": <tree>}` or
/// `[{"major_name": ..., "json_data": ...}]`.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    majors: BTreeMap<String, Value>,
}

impl JsonCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&raw)
            .map_err(|err| CatalogError::Json(path.to_path_buf(), err.to_string()))?;
        let catalog = Self::from_value(value)?;
        debug!(path = %path.display(), majors = catalog.majors.len(), "Loaded requirement catalog");
        Ok(catalog)
    }

    pub fn from_value(value: Value) -> Result<Self, CatalogError> {
        let mut majors = BTreeMap::new();
        match value {
            Value::Object(map) => {
                for (name, tree) in map {
                    majors.insert(name.trim().to_string(), tree);
                }
            }
            Value::Array(rows) => {
                for row in rows {
                    let Some(name) = row.get("major_name").and_then(Value::as_str) else {
                        warn!("Skipping catalog row without major_name");
                        continue;
                    };
                    let tree = match row.get("json_data") {
                        Some(Value::String(text)) => match serde_json::from_str(text) {
                            Ok(tree) => tree,
                            Err(err) => {
                                warn!(major = name, error = %err, "Skipping catalog row with unreadable json_data");
                                continue;
                            }
                        },
                        Some(tree) => tree.clone(),
                        None => {
                            warn!(major = name, "Skipping catalog row without json_data");
                            continue;
                        }
                    };
                    majors.insert(name.trim().to_string(), tree);
                }
            }
            _ => return Err(CatalogError::Shape),
        }
        Ok(Self { majors })
    }

    fn find(&self, major: &str) -> Option<&Value> {
        let wanted = major.trim();
        self.majors.get(wanted).or_else(|| {
            self.majors
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
                .map(|(_, tree)| tree)
        })
    }
}

#[async_trait]
impl CatalogStore for JsonCatalog {
    async fn majors(&self) -> Result<Vec<String>, CatalogError> {
        Ok(self.majors.keys().cloned().collect())
    }

    async fn requirements(&self, major: &str) -> Result<Option<Value>, CatalogError> {
        Ok(self.find(major).cloned())
    }
}

/// Catalog used when none is configured.
#[derive(Debug, Clone, Default)]
pub struct EmptyCatalog;

#[async_trait]
impl CatalogStore for EmptyCatalog {
    async fn majors(&self) -> Result<Vec<String>, CatalogError> {
        Ok(Vec::new())
    }

    async fn requirements(&self, _major: &str) -> Result<Option<Value>, CatalogError> {
        Err(CatalogError::NotConfigured)
    }
}

/// Look up several majors and return the array-of-trees payload the
/// normalizer accepts.
pub async fn requirements_for(
    store: &dyn CatalogStore,
    majors: &[String],
) -> Result<Value, CatalogError> {
    let mut trees = Vec::with_capacity(majors.len());
    for major in majors {
        let tree = store
            .requirements(major)
            .await?
            .ok_or_else(|| CatalogError::UnknownMajor(major.clone()))?;
        trees.push(tree);
    }
    Ok(Value::Array(trees))
}
