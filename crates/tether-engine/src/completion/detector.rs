//! Polling state machine deciding when a triggered operation has finished.
//!
//! The page offers no completion event, so the detector watches DOM signals:
//!
//! * `Started`: wait up to the grace window for a busy or thinking signal.
//!   A signal that never shows up means the operation was too fast to see.
//! * `InProgress`: an error banner whose text matches one of the error
//!   patterns ends in `Errored`. No busy signal, no thinking signal and a
//!   ready signal ends in `Completed`.
//! * The wall-clock budget ends everything else in `TimedOut`. Nothing is
//!   cancelled on the page when that happens.

use super::state::{CompletionError, CompletionOutcome, CompletionState};
use crate::backend::Backend;
use crate::config::schema::{CompletionConfig, CompletionSignals};
use crate::resolution::{ResolutionEngine, ResolutionError, ResolveOptions};
use regex::{Regex, RegexBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

pub struct CompletionDetector {
    engine: Arc<ResolutionEngine>,
    config: CompletionConfig,
    patterns: Vec<Regex>,
    budget: Duration,
    state: CompletionState,
    history: Vec<CompletionState>,
    started_at: Option<Instant>,
    signal_observed: bool,
    error_text: Option<String>,
}

impl CompletionDetector {
    pub fn new(
        engine: Arc<ResolutionEngine>,
        config: CompletionConfig,
    ) -> Result<Self, CompletionError> {
        let patterns = config
            .error_patterns
            .iter()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .collect::<Result<Vec<_>, _>>()?;
        let budget = config.timeout();

        Ok(Self {
            engine,
            config,
            patterns,
            budget,
            state: CompletionState::Idle,
            history: vec![CompletionState::Idle],
            started_at: None,
            signal_observed: false,
            error_text: None,
        })
    }

    /// Override the wall-clock budget for this operation.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[CompletionState] {
        &self.history
    }

    pub fn signal_observed(&self) -> bool {
        self.signal_observed
    }

    /// Banner text captured when the detector entered `Errored`.
    pub fn error_text(&self) -> Option<&str> {
        self.error_text.as_deref()
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at
            .map(|t| t.elapsed())
            .unwrap_or(Duration::ZERO)
    }

    /// The operation was just triggered on the page.
    pub fn trigger(&mut self) {
        if self.state != CompletionState::Idle {
            warn!("Completion detector re-triggered while {}", self.state);
        }
        self.started_at = Some(Instant::now());
        self.signal_observed = false;
        self.error_text = None;
        self.enter(CompletionState::Started);
    }

    /// One observation step.
    pub async fn tick<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<CompletionState, CompletionError> {
        match self.state {
            CompletionState::Started => {
                let signals = self.signals().clone();
                if self.any_visible(backend, &signals.busy).await?
                    || self.any_visible(backend, &signals.thinking).await?
                {
                    self.signal_observed = true;
                    self.enter(CompletionState::InProgress);
                } else if self.elapsed() >= self.config.grace() {
                    debug!("No busy signal within the grace window, checking for completion");
                    self.enter(CompletionState::InProgress);
                    self.observe_progress(backend).await?;
                }
            }
            CompletionState::InProgress => self.observe_progress(backend).await?,
            _ => return Ok(self.state),
        }

        if !self.state.is_terminal() && self.elapsed() >= self.budget {
            warn!(
                "Operation still {} after {:?}, giving up",
                self.state, self.budget
            );
            self.enter(CompletionState::TimedOut);
        }
        Ok(self.state)
    }

    /// Drive ticks at the poll interval until a terminal state.
    pub async fn run<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<CompletionOutcome, CompletionError> {
        if self.state == CompletionState::Idle {
            self.trigger();
        }

        loop {
            let previous = self.state;
            match self.tick(backend).await? {
                CompletionState::Completed => {
                    let text = self.extract(backend).await?;
                    return Ok(CompletionOutcome {
                        text,
                        elapsed: self.elapsed(),
                        signal_observed: self.signal_observed,
                    });
                }
                CompletionState::Errored => {
                    return Err(CompletionError::Remote(
                        self.error_text.clone().unwrap_or_default(),
                    ));
                }
                CompletionState::TimedOut => {
                    return Err(CompletionError::TimedOut {
                        budget: self.budget,
                        last_state: previous,
                    });
                }
                _ => sleep(self.config.poll_interval()).await,
            }
        }
    }

    async fn observe_progress<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<(), CompletionError> {
        if let Some(text) = self.matching_error_text(backend).await? {
            warn!("Error banner detected: {}", text);
            self.error_text = Some(text);
            self.enter(CompletionState::Errored);
            return Ok(());
        }

        let signals = self.signals().clone();
        if self.any_visible(backend, &signals.busy).await?
            || self.any_visible(backend, &signals.thinking).await?
        {
            self.signal_observed = true;
            return Ok(());
        }
        if self.any_visible(backend, &signals.ready).await? {
            self.enter(CompletionState::Completed);
        }
        Ok(())
    }

    /// Text of the first visible error banner matching an error pattern.
    ///
    /// Every error strategy is inspected: a toast under the first expression
    /// must not hide a real error under a later one. Empty or unrelated
    /// banners are ignored; plenty of pages keep an alert container mounted
    /// at all times.
    async fn matching_error_text<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Option<String>, CompletionError> {
        let matched = self
            .engine
            .sweep(backend, &self.signals().error, self.probe_options())
            .await?;
        if matched.is_empty() {
            return Ok(None);
        }

        let text = matched
            .iter()
            .flat_map(|(_, elements)| elements)
            .filter(|e| e.visible && !e.text.trim().is_empty())
            .map(|e| e.text.clone())
            .find(|text| self.patterns.iter().any(|p| p.is_match(text)));
        if text.is_none() {
            debug!("Error banner present without matching text, ignoring");
        }
        Ok(text)
    }

    async fn any_visible<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
    ) -> Result<bool, CompletionError> {
        let outcome = self
            .engine
            .probe(backend, path, self.probe_options())
            .await?;
        Ok(outcome.is_match())
    }

    /// Text of the last element in the output region.
    async fn extract<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Option<String>, CompletionError> {
        let path = &self.signals().output;
        let resolved = match self
            .engine
            .resolve_all(backend, path, self.config.extract_timeout())
            .await
        {
            Ok(resolved) => resolved,
            Err(ResolutionError::Exhausted(_)) => {
                info!("Operation completed but '{}' had no content", path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(handle) = resolved.handles().pop() else {
            return Ok(None);
        };
        let text = backend.inner_text(&handle).await?;
        if text.trim().is_empty() {
            info!("Operation completed with an empty result");
            return Ok(None);
        }
        Ok(Some(text))
    }

    fn probe_options(&self) -> ResolveOptions {
        ResolveOptions::visible(self.config.probe_timeout())
    }

    fn signals(&self) -> &CompletionSignals {
        &self.config.signals
    }

    fn enter(&mut self, next: CompletionState) {
        if next != self.state {
            debug!("Completion state {} -> {}", self.state, next);
        }
        if next.is_terminal() {
            info!("Operation {} after {:?}", next, self.elapsed());
        }
        self.state = next;
        self.history.push(next);
    }
}
