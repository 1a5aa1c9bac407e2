//! Ordered-fallback element resolution.
//!
//! Each registered expression is tried in order, once, inside its own wait
//! window. The first expression whose match set satisfies the required state
//! wins; there is no scoring across strategies.

use super::budget::strategy_budget;
use super::result::{
    ResolutionError, ResolutionExhausted, ResolutionOutcome, ResolveOptions, Resolved,
    StrategyFailure,
};
use crate::backend::{Backend, BackendError};
use crate::config::schema::ResolutionConfig;
use crate::registry::{StrategyEntry, StrategyRegistry};
use std::sync::Arc;
use std::time::Duration;
use tether_common::protocol::{ElementSnapshot, ElementState, LocatorExpression, StateMatch};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

pub struct ResolutionEngine {
    registry: Arc<StrategyRegistry>,
    config: ResolutionConfig,
}

enum Attempt {
    Matched {
        element: Option<ElementSnapshot>,
        elements: Vec<ElementSnapshot>,
    },
    Failed(String),
}

impl ResolutionEngine {
    pub fn new(registry: Arc<StrategyRegistry>, config: ResolutionConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ResolutionConfig {
        &self.config
    }

    /// Options for `state` with the configured default timeout.
    pub fn options(&self, state: ElementState) -> ResolveOptions {
        ResolveOptions::new(state, self.config.default_timeout())
    }

    /// Resolve `path` to the first element reaching `options.state`.
    pub async fn resolve<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        options: ResolveOptions,
    ) -> Result<Resolved, ResolutionError> {
        let outcome = self.probe(backend, path, options).await?;
        self.finish(outcome)
    }

    /// Resolve `path` to the whole match set of the first expression that
    /// matches anything.
    pub async fn resolve_all<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        total: Duration,
    ) -> Result<Resolved, ResolutionError> {
        self.resolve(backend, path, ResolveOptions::attached(total)).await
    }

    /// Run the fallback chain and report what happened without treating
    /// exhaustion as an error.
    ///
    /// Registry errors and session-fatal backend errors still fail.
    pub async fn probe<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        options: ResolveOptions,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        let entry = self.registry.lookup(path).await?;
        self.run_chain(backend, path, &entry, options).await
    }

    /// Give every strategy of `path` its wait window and collect the match
    /// set of each one that reached `options.state`, in registry order.
    ///
    /// Unlike [`probe`](Self::probe) a match does not end the chain, so
    /// callers can judge the content behind every expression.
    pub async fn sweep<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        options: ResolveOptions,
    ) -> Result<Vec<(LocatorExpression, Vec<ElementSnapshot>)>, ResolutionError> {
        let entry = self.registry.lookup(path).await?;
        let budget = strategy_budget(
            options.timeout,
            entry.strategies.len(),
            self.config.strategy_ceiling(),
            self.config.strategy_floor(),
        );

        let mut matched = Vec::new();
        for expression in &entry.strategies {
            match self.attempt(backend, expression, options.state, budget).await? {
                Attempt::Matched { elements, .. } => matched.push((expression.clone(), elements)),
                Attempt::Failed(message) => {
                    debug!("Sweep of '{}': '{}' {}", path, expression, message);
                }
            }
        }
        Ok(matched)
    }

    async fn run_chain<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
        entry: &StrategyEntry,
        options: ResolveOptions,
    ) -> Result<ResolutionOutcome, ResolutionError> {
        let budget = strategy_budget(
            options.timeout,
            entry.strategies.len(),
            self.config.strategy_ceiling(),
            self.config.strategy_floor(),
        );

        let mut outcome = ResolutionOutcome {
            path: path.to_string(),
            description: entry.description.clone(),
            state: options.state,
            matched_expression: None,
            element: None,
            elements: Vec::new(),
            attempted_expressions: Vec::with_capacity(entry.strategies.len()),
            failures: Vec::new(),
        };

        for (position, expression) in entry.strategies.iter().enumerate() {
            debug!(
                "Resolving '{}': trying strategy {}/{} '{}' ({} within {:?})",
                path,
                position + 1,
                entry.strategies.len(),
                expression,
                options.state,
                budget
            );
            outcome.attempted_expressions.push(expression.clone());

            match self.attempt(backend, expression, options.state, budget).await? {
                Attempt::Matched { element, elements } => {
                    if position > 0 {
                        info!(
                            "Resolved '{}' with fallback strategy {} '{}'",
                            path,
                            position + 1,
                            expression
                        );
                    }
                    outcome.matched_expression = Some(expression.clone());
                    outcome.element = element;
                    outcome.elements = elements;
                    return Ok(outcome);
                }
                Attempt::Failed(message) => {
                    debug!("Strategy '{}' for '{}' failed: {}", expression, path, message);
                    outcome.failures.push(StrategyFailure {
                        expression: expression.clone(),
                        message,
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// One wait window for one expression.
    async fn attempt<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        expression: &LocatorExpression,
        state: ElementState,
        budget: Duration,
    ) -> Result<Attempt, BackendError> {
        let deadline = Instant::now() + budget;
        let mut last_count;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match timeout(remaining, backend.query(expression)).await {
                Err(_) => {
                    return Ok(Attempt::Failed(format!(
                        "query did not answer within {:?}",
                        budget
                    )));
                }
                Ok(Err(e)) if e.is_session_fatal() => return Err(e),
                Ok(Err(e)) => return Ok(Attempt::Failed(e.to_string())),
                Ok(Ok(matches)) => {
                    if let Some(found) = state.evaluate(&matches) {
                        let element = match found {
                            StateMatch::Element(index) => {
                                matches.iter().find(|m| m.index == index).cloned()
                            }
                            StateMatch::Absent => None,
                        };
                        return Ok(Attempt::Matched {
                            element,
                            elements: matches,
                        });
                    }
                    last_count = matches.len();
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.config.poll_interval().min(deadline - now)).await;
        }

        Ok(Attempt::Failed(match (state, last_count) {
            (ElementState::Hidden, n) => {
                format!("still visible after {:?} ({} matched)", budget, n)
            }
            (_, 0) => format!("no match within {:?}", budget),
            (state, n) => format!("{} matched but none {} within {:?}", n, state, budget),
        }))
    }

    fn finish(&self, outcome: ResolutionOutcome) -> Result<Resolved, ResolutionError> {
        if outcome.is_match() {
            return Ok(Resolved { outcome });
        }

        let exhausted = ResolutionExhausted {
            hint: format!(
                "Update the strategies for '{}' in {} (run validate_selectors to see what still matches).",
                outcome.path,
                self.registry.source()
            ),
            path: outcome.path,
            description: outcome.description,
            state: outcome.state,
            attempted_expressions: outcome.attempted_expressions,
            failures: outcome.failures,
        };
        warn!("{}", exhausted.report().trim_end());
        Err(exhausted.into())
    }
}
