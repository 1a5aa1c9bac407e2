//! Discovery-mode health check across the whole registry.
//!
//! Every entry is resolved as `attached` with a short timeout and the outcome
//! recorded. Nothing here fails because an element is missing; that is what
//! the report is for.

use crate::backend::Backend;
use crate::config::schema::ValidationConfig;
use crate::registry::RegistryError;
use crate::resolution::{ResolutionEngine, ResolutionError, ResolveOptions};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tether_common::protocol::LocatorExpression;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ValidatorError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub path: String,
    pub description: String,
    pub found: bool,
    pub working_strategy: Option<LocatorExpression>,
    pub failed_strategies: Vec<LocatorExpression>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub category: Option<String>,
    pub results: Vec<ValidationResult>,
    /// Entries left out because they have no usable strategies.
    pub skipped: Vec<String>,
    pub validated_at: String,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn found_count(&self) -> usize {
        self.results.iter().filter(|r| r.found).count()
    }

    pub fn missing_count(&self) -> usize {
        self.total() - self.found_count()
    }

    pub fn missing(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| !r.found)
    }

    pub fn found(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.found)
    }

    pub fn summary(&self) -> String {
        let scope = self.category.as_deref().unwrap_or("all categories");
        let mut out = format!(
            "Selector validation ({}): {} checked, {} found, {} missing",
            scope,
            self.total(),
            self.found_count(),
            self.missing_count()
        );

        if self.missing_count() > 0 {
            out.push_str("\n\nMissing:");
            for result in self.missing() {
                out.push_str(&format!("\n- {} ({})", result.path, result.description));
                for expression in &result.failed_strategies {
                    out.push_str(&format!("\n    tried: {}", expression));
                }
            }
        }

        if self.found_count() > 0 {
            out.push_str("\n\nFound:");
            for result in self.found() {
                let strategy = result
                    .working_strategy
                    .as_ref()
                    .map(|s| s.as_str())
                    .unwrap_or("?");
                out.push_str(&format!("\n- {} -> {}", result.path, strategy));
            }
        }

        if !self.skipped.is_empty() {
            out.push_str("\n\nSkipped (no usable strategies):");
            for path in &self.skipped {
                out.push_str(&format!("\n- {}", path));
            }
        }
        out
    }
}

pub struct Validator {
    engine: Arc<ResolutionEngine>,
    config: ValidationConfig,
}

impl Validator {
    pub fn new(engine: Arc<ResolutionEngine>, config: ValidationConfig) -> Self {
        Self { engine, config }
    }

    pub async fn validate_all<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        category: Option<&str>,
    ) -> Result<ValidationReport, ValidatorError> {
        let registry = self.engine.registry();
        let document = registry.snapshot().await?;
        let entries = document.entries(category)?;

        let skipped: Vec<String> = document
            .invalid_entries()
            .into_iter()
            .filter(|(path, _)| in_category(path, category))
            .map(|(path, reason)| {
                warn!("Skipping '{}' during validation: {}", path, reason);
                path
            })
            .collect();

        let options = ResolveOptions::attached(self.config.entry_timeout());
        let mut results = Vec::with_capacity(entries.len());
        for (path, entry) in entries {
            let outcome = self.engine.probe(backend, &path, options).await?;
            let failed_strategies = outcome
                .failures
                .iter()
                .map(|f| f.expression.clone())
                .collect();
            results.push(ValidationResult {
                path,
                description: entry.description.clone(),
                found: outcome.is_match(),
                working_strategy: outcome.matched_expression,
                failed_strategies,
            });
        }

        let validated_at = if self.config.persist_timestamp {
            match registry.record_validation(Utc::now()).await {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    warn!("Validation finished but the timestamp was not saved: {}", e);
                    Utc::now().to_rfc3339()
                }
            }
        } else {
            Utc::now().to_rfc3339()
        };

        let report = ValidationReport {
            category: category.map(str::to_string),
            results,
            skipped,
            validated_at,
        };
        info!(
            "Validated {} selectors: {} found, {} missing",
            report.total(),
            report.found_count(),
            report.missing_count()
        );
        Ok(report)
    }
}

fn in_category(path: &str, category: Option<&str>) -> bool {
    match category {
        None => true,
        Some(name) => path
            .strip_prefix(name)
            .is_some_and(|rest| rest.starts_with('.')),
    }
}
