use chromiumoxide::Page;
use chromiumoxide::js::EvaluationResult;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tether_engine::backend::BackendError;
use tether_scanner::{PROBE_JS, QUERY_JS};

/// Upper bound for one script evaluation.
/// A page blocked by a dialog would otherwise hang the call.
const EVAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum retries for context errors during page navigation.
const MAX_CONTEXT_RETRIES: u32 = 10;

const CONTEXT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check if an error indicates the page context is unavailable (e.g., during navigation).
fn is_context_error(err: &str) -> bool {
    err.contains("Cannot find context")
        || err.contains("Execution context was destroyed")
        || err.contains("-32000")
}

enum EvalError {
    Timeout,
    Context(String),
    Other(String),
}

/// Install the query helper unless the page already has it.
async fn ensure_helper(page: &Page) -> Result<(), EvalError> {
    let installed = run_with_timeout(page, PROBE_JS)
        .await?
        .into_value::<bool>()
        .unwrap_or(false);
    if !installed {
        tracing::debug!("Injecting query helper");
        run_with_timeout(page, QUERY_JS).await?;
    }
    Ok(())
}

/// Evaluate a helper call, injecting the helper first.
///
/// Context errors (the page is navigating) are retried; anything the script
/// throws comes back as `BackendError::Script` with the exception text.
pub async fn evaluate<T: DeserializeOwned>(page: &Page, expression: &str) -> Result<T, BackendError> {
    let mut last_error = None;

    for attempt in 0..MAX_CONTEXT_RETRIES {
        let result = match ensure_helper(page).await {
            Ok(()) => evaluate_with_timeout(page, expression).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(EvalError::Timeout) => {
                return Err(BackendError::Timeout(
                    "script evaluation blocked, possibly by a dialog".into(),
                ));
            }
            Err(EvalError::Context(err_str)) => {
                tracing::debug!(
                    "Context error during evaluation (attempt {}/{}), retrying...",
                    attempt + 1,
                    MAX_CONTEXT_RETRIES
                );
                last_error = Some(err_str);
                tokio::time::sleep(CONTEXT_RETRY_DELAY).await;
            }
            Err(EvalError::Other(err_str)) => return Err(BackendError::Script(err_str)),
        }
    }

    Err(BackendError::Script(last_error.unwrap_or_else(|| {
        "page context unavailable after retries".to_string()
    })))
}

async fn run_with_timeout(page: &Page, expression: &str) -> Result<EvaluationResult, EvalError> {
    match tokio::time::timeout(EVAL_TIMEOUT, page.evaluate(expression)).await {
        Err(_) => Err(EvalError::Timeout),
        Ok(Err(e)) => {
            let err_str = e.to_string();
            if is_context_error(&err_str) {
                Err(EvalError::Context(err_str))
            } else {
                Err(EvalError::Other(err_str))
            }
        }
        Ok(Ok(result)) => Ok(result),
    }
}

async fn evaluate_with_timeout<T: DeserializeOwned>(
    page: &Page,
    expression: &str,
) -> Result<T, EvalError> {
    run_with_timeout(page, expression)
        .await?
        .into_value::<T>()
        .map_err(|e| EvalError::Other(format!("Failed to read result: {}", e)))
}
