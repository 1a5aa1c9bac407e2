//! Strategy registry: dotted path → ordered locator strategies.
//!
//! The registry is loaded lazily from its source on first use and cached as
//! one immutable generation. `reload` swaps the whole generation; the only
//! in-place change ever made is the `lastValidated` metadata timestamp.

pub mod document;

pub use document::{Group, RegistryDocument, RegistryMetadata, RegistryNode, StrategyEntry};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_yaml::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RegistryError {
    #[error("Failed to load selector registry from {origin}: {reason}")]
    ConfigLoad { origin: String, reason: String },

    #[error("Unknown selector '{path}': {reason}")]
    UnknownSelector { path: String, reason: String },

    #[error("Failed to write registry metadata to {origin}: {reason}")]
    Persist { origin: String, reason: String },
}

#[derive(Debug, Clone)]
pub enum RegistrySource {
    File(PathBuf),
    Inline(String),
}

impl fmt::Display for RegistrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistrySource::File(path) => write!(f, "{}", path.display()),
            RegistrySource::Inline(_) => f.write_str("<inline registry>"),
        }
    }
}

pub struct StrategyRegistry {
    source: RegistrySource,
    cache: RwLock<Option<Arc<RegistryDocument>>>,
    generation: AtomicU64,
}

impl StrategyRegistry {
    pub fn new(source: RegistrySource) -> Self {
        Self {
            source,
            cache: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::new(RegistrySource::File(path.into()))
    }

    pub fn inline(content: impl Into<String>) -> Self {
        Self::new(RegistrySource::Inline(content.into()))
    }

    pub fn source(&self) -> &RegistrySource {
        &self.source
    }

    /// Number of completed loads. Zero until the registry is first used.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub async fn is_loaded(&self) -> bool {
        self.cache.read().await.is_some()
    }

    /// Read and parse the source, replacing any cached generation.
    pub async fn load(&self) -> Result<Arc<RegistryDocument>, RegistryError> {
        let mut cache = self.cache.write().await;
        let document = Arc::new(self.read_source().await?);
        *cache = Some(document.clone());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Loaded selector registry from {} ({} entries, generation {})",
            self.source,
            document.len(),
            generation
        );
        for (path, reason) in document.invalid_entries() {
            warn!("Registry entry '{}' is unusable: {}", path, reason);
        }
        Ok(document)
    }

    /// Drop the cached generation and load the source again.
    pub async fn reload(&self) -> Result<Arc<RegistryDocument>, RegistryError> {
        self.cache.write().await.take();
        debug!("Registry cache dropped, reloading from {}", self.source);
        self.load().await
    }

    /// The current generation, loading it on first access.
    pub async fn snapshot(&self) -> Result<Arc<RegistryDocument>, RegistryError> {
        if let Some(document) = self.cache.read().await.as_ref() {
            return Ok(document.clone());
        }
        self.load().await
    }

    pub async fn lookup(&self, path: &str) -> Result<StrategyEntry, RegistryError> {
        let document = self.snapshot().await?;
        document.lookup(path).cloned()
    }

    pub async fn entries(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<(String, StrategyEntry)>, RegistryError> {
        let document = self.snapshot().await?;
        Ok(document
            .entries(category)?
            .into_iter()
            .map(|(path, entry)| (path, entry.clone()))
            .collect())
    }

    pub async fn categories(&self) -> Result<Vec<String>, RegistryError> {
        let document = self.snapshot().await?;
        Ok(document.categories().into_iter().map(str::to_string).collect())
    }

    pub async fn category(&self, name: &str) -> Result<RegistryNode, RegistryError> {
        let document = self.snapshot().await?;
        document
            .category(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSelector {
                path: name.to_string(),
                reason: "no such category".into(),
            })
    }

    pub async fn metadata(&self) -> Result<RegistryMetadata, RegistryError> {
        Ok(self.snapshot().await?.metadata().clone())
    }

    /// Stamp the registry as validated and write the timestamp back to a file source.
    ///
    /// Only `_meta.lastValidated` is touched; every other key of the source is
    /// preserved as written.
    pub async fn record_validation(&self, at: DateTime<Utc>) -> Result<String, RegistryError> {
        let timestamp = at.to_rfc3339_opts(SecondsFormat::Millis, true);

        {
            let mut cache = self.cache.write().await;
            if let Some(current) = cache.as_ref() {
                *cache = Some(Arc::new(current.with_last_validated(timestamp.clone())));
            }
        }

        if let RegistrySource::File(path) = &self.source {
            self.persist_timestamp(path, &timestamp).await?;
        }
        Ok(timestamp)
    }

    async fn read_source(&self) -> Result<RegistryDocument, RegistryError> {
        let origin = self.source.to_string();
        match &self.source {
            RegistrySource::File(path) => {
                let content =
                    tokio::fs::read_to_string(path)
                        .await
                        .map_err(|e| RegistryError::ConfigLoad {
                            origin: origin.clone(),
                            reason: e.to_string(),
                        })?;
                RegistryDocument::parse(&content, &origin)
            }
            RegistrySource::Inline(content) => RegistryDocument::parse(content, &origin),
        }
    }

    async fn persist_timestamp(&self, path: &Path, timestamp: &str) -> Result<(), RegistryError> {
        let persist_error = |reason: String| RegistryError::Persist {
            origin: path.display().to_string(),
            reason,
        };

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| persist_error(e.to_string()))?;
        let mut value: Value =
            serde_yaml::from_str(&content).map_err(|e| persist_error(e.to_string()))?;
        let Value::Mapping(root) = &mut value else {
            return Err(persist_error("top level is not a mapping".into()));
        };

        let meta = root
            .entry(Value::String(document::META_KEY.to_string()))
            .or_insert_with(|| Value::Mapping(Default::default()));
        if !matches!(meta, Value::Mapping(_)) {
            *meta = Value::Mapping(Default::default());
        }
        if let Value::Mapping(meta) = meta {
            meta.insert(
                Value::String("lastValidated".to_string()),
                Value::String(timestamp.to_string()),
            );
        }

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let rendered = if is_json {
            serde_json::to_string_pretty(&value).map_err(|e| persist_error(e.to_string()))? + "\n"
        } else {
            serde_yaml::to_string(&value).map_err(|e| persist_error(e.to_string()))?
        };

        tokio::fs::write(path, rendered)
            .await
            .map_err(|e| persist_error(e.to_string()))?;
        debug!("Recorded lastValidated={} in {}", timestamp, path.display());
        Ok(())
    }
}
