use super::diagnostics::{Artifact, DiagnosticsSink};
use crate::backend::{Backend, BackendError};
use crate::config::schema::ActionConfig;
use crate::resolution::{ResolutionEngine, ResolutionError, ResolveOptions, Resolved};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tether_common::protocol::{ElementHandle, ElementState};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("'{path}' resolved without an element to act on")]
    MissingElement { path: String },

    #[error("{action} failed: {source} (screenshot: {})", .screenshot.display())]
    Diagnosed {
        action: String,
        screenshot: PathBuf,
        source: Box<ActionError>,
    },
}

impl ActionError {
    /// The error underneath any diagnostics wrapping.
    pub fn root(&self) -> &ActionError {
        match self {
            ActionError::Diagnosed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn screenshot(&self) -> Option<&PathBuf> {
        match self {
            ActionError::Diagnosed { screenshot, .. } => Some(screenshot),
            _ => None,
        }
    }
}

/// `resolve → act` operations on registry paths.
///
/// Every fallible operation runs through [`ActionExecutor::with_diagnostics`],
/// so a failure leaves a `failure_<action>` screenshot behind.
pub struct ActionExecutor {
    engine: Arc<ResolutionEngine>,
    config: ActionConfig,
    sink: Arc<dyn DiagnosticsSink>,
}

impl ActionExecutor {
    pub fn new(
        engine: Arc<ResolutionEngine>,
        config: ActionConfig,
        sink: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            engine,
            config,
            sink,
        }
    }

    pub fn engine(&self) -> &Arc<ResolutionEngine> {
        &self.engine
    }

    pub fn config(&self) -> &ActionConfig {
        &self.config
    }

    pub async fn click<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<Resolved, ActionError> {
        let result = async {
            let (resolved, handle) = self.target(backend, path, timeout).await?;
            backend.click(&handle).await?;
            self.settle().await;
            Ok::<_, ActionError>(resolved)
        }
        .await;
        self.with_diagnostics(backend, "click", result).await
    }

    /// Replace the content of an input.
    pub async fn fill<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Resolved, ActionError> {
        let result = async {
            let (resolved, handle) = self.target(backend, path, timeout).await?;
            backend.fill(&handle, text).await?;
            self.settle().await;
            Ok::<_, ActionError>(resolved)
        }
        .await;
        self.with_diagnostics(backend, "fill", result).await
    }

    /// Type key by key, for inputs that react to individual key events.
    pub async fn type_sequentially<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Resolved, ActionError> {
        let result = async {
            let (resolved, handle) = self.target(backend, path, timeout).await?;
            backend
                .type_text(&handle, text, self.config.type_delay())
                .await?;
            self.settle().await;
            Ok::<_, ActionError>(resolved)
        }
        .await;
        self.with_diagnostics(backend, "type_sequentially", result)
            .await
    }

    pub async fn read_text<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<String, ActionError> {
        let result = async {
            let (_, handle) = self.target(backend, path, timeout).await?;
            Ok::<_, ActionError>(backend.inner_text(&handle).await?)
        }
        .await;
        self.with_diagnostics(backend, "read_text", result).await
    }

    /// Text of every element in a list region.
    pub async fn read_all_text<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, ActionError> {
        let result = async {
            let total = timeout.unwrap_or_else(|| self.engine.config().default_timeout());
            let resolved = self.engine.resolve_all(backend, path, total).await?;
            let mut texts = Vec::with_capacity(resolved.elements().len());
            for handle in resolved.handles() {
                texts.push(backend.inner_text(&handle).await?);
            }
            Ok::<_, ActionError>(texts)
        }
        .await;
        self.with_diagnostics(backend, "read_all_text", result)
            .await
    }

    /// Every element of a list region, or `None` when no strategy matched.
    ///
    /// An empty list is a normal answer, so exhaustion is not diagnosed.
    pub async fn list<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Resolved>, ActionError> {
        let total = timeout.unwrap_or(self.config.exists_timeout());
        let result = match self.engine.resolve_all(backend, path, total).await {
            Ok(resolved) => Ok(Some(resolved)),
            Err(ResolutionError::Exhausted(_)) => Ok(None),
            Err(e) => Err(ActionError::from(e)),
        };
        self.with_diagnostics(backend, "list", result).await
    }

    /// Click one element picked out of a list region.
    pub async fn click_handle<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        handle: &ElementHandle,
    ) -> Result<(), ActionError> {
        let result = async {
            backend.click(handle).await?;
            self.settle().await;
            Ok::<_, ActionError>(())
        }
        .await;
        self.with_diagnostics(backend, "click", result).await
    }

    /// Attach a local file to the file input behind `path`.
    ///
    /// File inputs are usually hidden, so attached is enough.
    pub async fn upload<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        file: &Path,
        timeout: Option<Duration>,
    ) -> Result<Resolved, ActionError> {
        let result = async {
            let options = ResolveOptions::attached(
                timeout.unwrap_or_else(|| self.engine.config().default_timeout()),
            );
            let resolved = self.engine.resolve(backend, path, options).await?;
            let handle = resolved
                .handle()
                .ok_or_else(|| ActionError::MissingElement {
                    path: path.to_string(),
                })?;
            backend.upload_file(&handle, file).await?;
            self.settle().await;
            Ok::<_, ActionError>(resolved)
        }
        .await;
        self.with_diagnostics(backend, "upload", result).await
    }

    /// Whether `path` is attached within a short timeout.
    ///
    /// Exhaustion is an answer here, not a failure. Unknown selectors still fail.
    pub async fn exists<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<bool, ActionError> {
        let options = ResolveOptions::attached(timeout.unwrap_or(self.config.exists_timeout()));
        let result = match self.engine.resolve(backend, path, options).await {
            Ok(_) => Ok(true),
            Err(ResolutionError::Exhausted(_)) => Ok(false),
            Err(e) => Err(ActionError::from(e)),
        };
        self.with_diagnostics(backend, "exists", result).await
    }

    /// Wait until nothing matching `path` is visible.
    pub async fn wait_for_disappearance<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        let options = ResolveOptions::hidden(
            timeout.unwrap_or_else(|| self.engine.config().default_timeout()),
        );
        let result = self
            .engine
            .resolve(backend, path, options)
            .await
            .map(|_| ())
            .map_err(ActionError::from);
        self.with_diagnostics(backend, "wait_for_disappearance", result)
            .await
    }

    pub async fn press_key<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        key: &str,
        modifiers: &[String],
    ) -> Result<(), ActionError> {
        let result = async {
            backend.press_key(key, modifiers).await?;
            self.settle().await;
            Ok::<_, ActionError>(())
        }
        .await;
        self.with_diagnostics(backend, "press_key", result).await
    }

    /// Explicit screenshot through the diagnostics sink.
    pub async fn capture<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        label: &str,
        full_page: bool,
    ) -> Result<Artifact, ActionError> {
        let png = backend.screenshot(full_page).await?;
        let artifact = self
            .sink
            .persist(label, &png)
            .await
            .map_err(BackendError::from)?;
        Ok(artifact)
    }

    /// Attach a `failure_<action>` screenshot to a failed action.
    ///
    /// Successful results pass through untouched. When the screenshot itself
    /// cannot be taken the original error propagates unchanged.
    pub async fn with_diagnostics<T, B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        action: &str,
        result: Result<T, ActionError>,
    ) -> Result<T, ActionError> {
        let error = match result {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        match self.failure_screenshot(backend, action).await {
            Some(screenshot) => Err(ActionError::Diagnosed {
                action: action.to_string(),
                screenshot,
                source: Box::new(error),
            }),
            None => Err(error),
        }
    }

    /// Persist a `failure_<action>` screenshot for a failure caught outside
    /// the action methods.
    ///
    /// `None` when failure screenshots are disabled or the capture failed.
    pub async fn failure_screenshot<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        action: &str,
    ) -> Option<PathBuf> {
        if !self.config.screenshot_on_failure {
            return None;
        }
        let label = format!("failure_{}", action);
        match self.capture(backend, &label, false).await {
            Ok(artifact) => {
                debug!("{} failed, screenshot at {}", action, artifact.path.display());
                Some(artifact.path)
            }
            Err(capture_error) => {
                warn!(
                    "Could not capture failure screenshot for {}: {}",
                    action, capture_error
                );
                None
            }
        }
    }

    async fn target<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        timeout: Option<Duration>,
    ) -> Result<(Resolved, ElementHandle), ActionError> {
        let options = match timeout {
            Some(t) => ResolveOptions::visible(t),
            None => self.engine.options(ElementState::Visible),
        };
        let resolved = self.engine.resolve(backend, path, options).await?;
        let handle = resolved
            .handle()
            .ok_or_else(|| ActionError::MissingElement {
                path: path.to_string(),
            })?;
        Ok((resolved, handle))
    }

    async fn settle(&self) {
        let delay = self.config.settle_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
