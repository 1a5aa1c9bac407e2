use crate::backend::BackendError;
use crate::registry::RegistryError;
use serde::Serialize;
use std::time::Duration;
use tether_common::protocol::{ElementHandle, ElementSnapshot, ElementState, LocatorExpression};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolveOptions {
    pub state: ElementState,
    pub timeout: Duration,
}

impl ResolveOptions {
    pub fn new(state: ElementState, timeout: Duration) -> Self {
        Self { state, timeout }
    }

    pub fn visible(timeout: Duration) -> Self {
        Self::new(ElementState::Visible, timeout)
    }

    pub fn attached(timeout: Duration) -> Self {
        Self::new(ElementState::Attached, timeout)
    }

    pub fn hidden(timeout: Duration) -> Self {
        Self::new(ElementState::Hidden, timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyFailure {
    pub expression: LocatorExpression,
    pub message: String,
}

/// Everything one resolution learned, whether it succeeded or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionOutcome {
    pub path: String,
    pub description: String,
    pub state: ElementState,
    pub matched_expression: Option<LocatorExpression>,
    /// The element that satisfied the state. `None` for a hidden state met by absence.
    pub element: Option<ElementSnapshot>,
    /// Full match set of the winning expression at the moment it succeeded.
    pub elements: Vec<ElementSnapshot>,
    pub attempted_expressions: Vec<LocatorExpression>,
    pub failures: Vec<StrategyFailure>,
}

impl ResolutionOutcome {
    pub fn is_match(&self) -> bool {
        self.matched_expression.is_some()
    }
}

/// A successful resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub outcome: ResolutionOutcome,
}

impl Resolved {
    pub fn expression(&self) -> Option<&LocatorExpression> {
        self.outcome.matched_expression.as_ref()
    }

    pub fn element(&self) -> Option<&ElementSnapshot> {
        self.outcome.element.as_ref()
    }

    pub fn elements(&self) -> &[ElementSnapshot] {
        &self.outcome.elements
    }

    /// Handle to the element that satisfied the state.
    pub fn handle(&self) -> Option<ElementHandle> {
        let expression = self.expression()?;
        let element = self.element()?;
        Some(ElementHandle::new(expression.clone(), element.index))
    }

    /// Handles to every element of the match set, in document order.
    pub fn handles(&self) -> Vec<ElementHandle> {
        match self.expression() {
            Some(expression) => self
                .elements()
                .iter()
                .map(|e| ElementHandle::new(expression.clone(), e.index))
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Every strategy of an entry failed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "Could not resolve '{path}' ({description}) as {state}: all {} strategies failed. {hint}",
    .attempted_expressions.len()
)]
pub struct ResolutionExhausted {
    pub path: String,
    pub description: String,
    pub state: ElementState,
    pub attempted_expressions: Vec<LocatorExpression>,
    pub failures: Vec<StrategyFailure>,
    pub hint: String,
}

impl ResolutionExhausted {
    /// Multi-line report listing each attempted expression and why it failed.
    pub fn report(&self) -> String {
        let mut out = format!("{}\n", self);
        for (i, failure) in self.failures.iter().enumerate() {
            out.push_str(&format!(
                "  {}. {} -> {}\n",
                i + 1,
                failure.expression,
                failure.message
            ));
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Exhausted(Box<ResolutionExhausted>),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl From<ResolutionExhausted> for ResolutionError {
    fn from(e: ResolutionExhausted) -> Self {
        ResolutionError::Exhausted(Box::new(e))
    }
}

impl ResolutionError {
    pub fn exhausted(&self) -> Option<&ResolutionExhausted> {
        match self {
            ResolutionError::Exhausted(e) => Some(e),
            _ => None,
        }
    }
}
