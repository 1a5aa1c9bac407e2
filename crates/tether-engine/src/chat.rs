use crate::actions::{ActionError, ActionExecutor};
use crate::backend::Backend;
use crate::completion::{CompletionDetector, CompletionError, CompletionOutcome};
use crate::config::schema::CompletionConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const INPUT_PATH: &str = "chat.input";
pub const SEND_BUTTON_PATH: &str = "chat.sendButton";
pub const STOP_BUTTON_PATH: &str = "chat.stopButton";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("{source} (screenshot: {})", .screenshot.display())]
    Unfinished {
        screenshot: PathBuf,
        source: CompletionError,
    },
}

impl ChatError {
    /// The completion failure, whether or not a screenshot was attached.
    pub fn completion(&self) -> Option<&CompletionError> {
        match self {
            ChatError::Completion(e) | ChatError::Unfinished { source: e, .. } => Some(e),
            ChatError::Action(_) => None,
        }
    }
}

/// Send a message, wait for the reply, read it back.
pub struct ChatFlow {
    actions: Arc<ActionExecutor>,
    completion: CompletionConfig,
}

impl ChatFlow {
    pub fn new(actions: Arc<ActionExecutor>, completion: CompletionConfig) -> Self {
        Self {
            actions,
            completion,
        }
    }

    /// Submit `message`. With `wait`, block until the reply is complete.
    ///
    /// Returns `None` when not waiting. `budget` overrides the configured
    /// completion timeout.
    pub async fn send_message<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        message: &str,
        wait: bool,
        budget: Option<Duration>,
    ) -> Result<Option<CompletionOutcome>, ChatError> {
        let mut detector =
            CompletionDetector::new(self.actions.engine().clone(), self.completion.clone())?;
        if let Some(budget) = budget {
            detector = detector.with_budget(budget);
        }

        self.actions.fill(backend, INPUT_PATH, message, None).await?;
        if self.actions.exists(backend, SEND_BUTTON_PATH, None).await? {
            self.actions.click(backend, SEND_BUTTON_PATH, None).await?;
        } else {
            debug!("No send button found, submitting with Enter");
            self.actions.press_key(backend, "Enter", &[]).await?;
        }
        detector.trigger();
        info!("Message sent ({} chars)", message.chars().count());

        if !wait {
            return Ok(None);
        }
        match detector.run(backend).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(source) => Err(
                match self.actions.failure_screenshot(backend, "send_message").await {
                    Some(screenshot) => ChatError::Unfinished { screenshot, source },
                    None => ChatError::Completion(source),
                },
            ),
        }
    }

    /// Text of the latest reply, if there is one.
    pub async fn get_response<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Option<String>, ChatError> {
        let path = &self.completion.signals.output;
        let timeout = Some(self.completion.extract_timeout());
        if !self.actions.exists(backend, path, timeout).await? {
            return Ok(None);
        }
        let texts = self.actions.read_all_text(backend, path, timeout).await?;
        Ok(texts.into_iter().rev().find(|t| !t.trim().is_empty()))
    }

    /// Ask the page to stop generating. The only cancellation there is.
    pub async fn stop_response<B: Backend + ?Sized>(&self, backend: &mut B) -> Result<(), ChatError> {
        self.actions.click(backend, STOP_BUTTON_PATH, None).await?;
        info!("Stop requested");
        Ok(())
    }
}
