//! Command surface shared by every tether binary.
//!
//! One input line is a command name optionally followed by a JSON object of
//! arguments, e.g. `click {"path": "chat.sendButton"}`. The executor turns it
//! into a call against the action executor, the chat flow or the validator
//! and formats the result as text.

use crate::actions::{ActionError, ActionExecutor, DiagnosticsSink, DirectorySink};
use crate::backend::{Backend, BackendError, page_info_from};
use crate::chat::{ChatError, ChatFlow};
use crate::config::TetherConfig;
use crate::formatter::{format_completion, format_page_info, format_resolved};
use crate::projects::{Deletion, ProjectError, ProjectFlow};
use crate::registry::{RegistryError, StrategyRegistry};
use crate::resolution::ResolutionEngine;
use crate::validator::{Validator, ValidatorError};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_common::protocol::Command;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Validation(#[from] ValidatorError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Formatted output string for display.
    pub output: String,
}

impl ExecutionResult {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

pub struct CommandExecutor {
    registry: Arc<StrategyRegistry>,
    actions: Arc<ActionExecutor>,
    chat: ChatFlow,
    projects: ProjectFlow,
    validator: Validator,
    closed: bool,
}

impl CommandExecutor {
    /// Wire every component from configuration, with screenshots on disk.
    pub fn new(config: &TetherConfig) -> Self {
        let registry = Arc::new(StrategyRegistry::from_path(&config.registry.path));
        let sink = Arc::new(DirectorySink::new(&config.diagnostics.screenshot_dir));
        Self::with_components(registry, sink, config)
    }

    pub fn with_components(
        registry: Arc<StrategyRegistry>,
        sink: Arc<dyn DiagnosticsSink>,
        config: &TetherConfig,
    ) -> Self {
        let engine = Arc::new(ResolutionEngine::new(
            registry.clone(),
            config.resolution.clone(),
        ));
        let actions = Arc::new(ActionExecutor::new(
            engine.clone(),
            config.actions.clone(),
            sink,
        ));
        Self {
            chat: ChatFlow::new(actions.clone(), config.completion.clone()),
            projects: ProjectFlow::new(actions.clone(), config.site.clone()),
            validator: Validator::new(engine, config.validation.clone()),
            registry,
            actions,
            closed: false,
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Set once `close_browser` ran.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Parse `name [json-object]` into a command.
    pub fn parse_line(line: &str) -> Result<Command, ExecutorError> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };
        if name.is_empty() {
            return Err(ExecutorError::Parse("empty command".into()));
        }

        let mut args = if rest.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(rest) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(ExecutorError::Parse(format!(
                        "arguments for '{}' must be a JSON object",
                        name
                    )));
                }
                Err(e) => {
                    return Err(ExecutorError::Parse(format!(
                        "invalid arguments for '{}': {}",
                        name, e
                    )));
                }
            }
        };
        args.insert("command".into(), Value::String(name.to_string()));

        serde_json::from_value(Value::Object(args))
            .map_err(|e| ExecutorError::Parse(format!("{}: {}", name, e)))
    }

    /// Execute a line of input.
    pub async fn execute_line<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        line: &str,
    ) -> Result<ExecutionResult, ExecutorError> {
        let command = Self::parse_line(line)?;
        self.execute(backend, command).await
    }

    pub async fn execute<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        command: Command,
    ) -> Result<ExecutionResult, ExecutorError> {
        debug!("Executing {}", command.name());
        let actions = &self.actions;

        let output = match command {
            Command::Navigate(args) => {
                let res = backend
                    .navigate(&args.url)
                    .await
                    .map_err(|e| ExecutorError::Navigation(e.to_string()))?;
                format!("Navigated to {}", res.url)
            }
            Command::SendMessage(args) => {
                if let Some(project) = &args.project {
                    self.projects.ensure_open(backend, project).await?;
                }
                let budget = args.timeout_ms.map(Duration::from_millis);
                match self
                    .chat
                    .send_message(backend, &args.message, args.wait_for_response, budget)
                    .await?
                {
                    Some(outcome) => format_completion(&outcome),
                    None => "Message sent".to_string(),
                }
            }
            Command::GetResponse(_) => self
                .chat
                .get_response(backend)
                .await?
                .unwrap_or_else(|| "No response found".to_string()),
            Command::StopResponse(_) => {
                self.chat.stop_response(backend).await?;
                "Stop requested".to_string()
            }
            Command::Click(args) => {
                let resolved = actions
                    .click(backend, &args.path, timeout(args.timeout_ms))
                    .await?;
                format_resolved("Clicked", &args.path, &resolved)
            }
            Command::Fill(args) => {
                let resolved = actions
                    .fill(backend, &args.path, &args.text, timeout(args.timeout_ms))
                    .await?;
                format_resolved("Filled", &args.path, &resolved)
            }
            Command::TypeText(args) => {
                let resolved = actions
                    .type_sequentially(backend, &args.path, &args.text, timeout(args.timeout_ms))
                    .await?;
                format_resolved(
                    &format!("Typed {} characters into", args.text.chars().count()),
                    &args.path,
                    &resolved,
                )
            }
            Command::ReadText(args) => {
                actions
                    .read_text(backend, &args.path, timeout(args.timeout_ms))
                    .await?
            }
            Command::Exists(args) => actions
                .exists(backend, &args.path, timeout(args.timeout_ms))
                .await?
                .to_string(),
            Command::TakeScreenshot(args) => {
                let artifact = actions.capture(backend, &args.label, args.full_page).await?;
                format!("Screenshot saved to {}", artifact.path.display())
            }
            Command::ValidateSelectors(args) => self
                .validator
                .validate_all(backend, args.category.as_deref())
                .await?
                .summary(),
            Command::ReloadSelectors(_) => {
                let document = self.registry.reload().await?;
                format!(
                    "Reloaded {} selectors from {} (generation {})",
                    document.len(),
                    self.registry.source(),
                    self.registry.generation()
                )
            }
            Command::GetSelectors(args) => self.selectors_json(args.category.as_deref()).await?,
            Command::GetPageInfo(_) => {
                let nav = backend.page_info().await?;
                format_page_info(&page_info_from(&nav))
            }
            Command::ListProjects(_) => {
                serde_json::to_string_pretty(&self.projects.list_projects(backend).await?)?
            }
            Command::OpenProject(args) => serde_json::to_string_pretty(
                &self.projects.open_project(backend, &args.project).await?,
            )?,
            Command::CreateProject(args) => {
                let project = self
                    .projects
                    .create_project(backend, &args.name, args.instructions.as_deref())
                    .await?;
                format!("Created project '{}' at {}", project.name, project.url)
            }
            Command::DeleteProject(args) => match self
                .projects
                .delete_project(backend, &args.project, args.confirm)
                .await?
            {
                Deletion::Deleted(project) => format!("Deleted project '{}'", project.name),
                Deletion::NeedsConfirmation(message) => message,
            },
            Command::GetProjectDetails(args) => serde_json::to_string_pretty(
                &self.projects.project_details(backend, &args.project).await?,
            )?,
            Command::GetProjectMemory(args) => self
                .projects
                .project_memory(backend, &args.project)
                .await?
                .unwrap_or_else(|| "No project memory".to_string()),
            Command::GetProjectInstructions(args) => {
                self.projects
                    .project_instructions(backend, &args.project)
                    .await?
            }
            Command::SetProjectInstructions(args) => {
                let project = self
                    .projects
                    .set_project_instructions(backend, &args.project, &args.instructions)
                    .await?;
                format!("Instructions updated for '{}'", project.name)
            }
            Command::ListProjectFiles(args) => serde_json::to_string_pretty(
                &self.projects.list_files(backend, &args.project).await?,
            )?,
            Command::CreateFile(args) => {
                self.projects
                    .create_file(backend, &args.project, &args.file_name, &args.content)
                    .await?;
                format!("Created file '{}'", args.file_name)
            }
            Command::ReadFile(args) => {
                self.projects
                    .read_file(backend, &args.project, &args.file_name)
                    .await?
            }
            Command::DeleteFile(args) => {
                self.projects
                    .delete_file(backend, &args.project, &args.file_name)
                    .await?;
                format!("Deleted file '{}'", args.file_name)
            }
            Command::UploadFile(args) => {
                let name = self
                    .projects
                    .upload_file(backend, &args.project, Path::new(&args.file_path))
                    .await?;
                format!("Uploaded file '{}'", name)
            }
            Command::ListConversations(args) => serde_json::to_string_pretty(
                &self
                    .projects
                    .list_conversations(backend, args.project.as_deref())
                    .await?,
            )?,
            Command::OpenConversation(args) => {
                let url = self
                    .projects
                    .open_conversation(backend, &args.conversation_id)
                    .await?;
                format!("Opened conversation at {}", url)
            }
            Command::CloseBrowser(_) => {
                backend.close().await?;
                self.closed = true;
                info!("Browser session closed");
                "Browser closed".to_string()
            }
        };

        Ok(ExecutionResult::ok(output))
    }

    async fn selectors_json(&self, category: Option<&str>) -> Result<String, ExecutorError> {
        let value = match category {
            Some(name) => serde_json::to_value(self.registry.category(name).await?)?,
            None => {
                let document = self.registry.snapshot().await?;
                let mut root = match serde_json::to_value(document.root())? {
                    Value::Object(map) => map,
                    _ => Map::new(),
                };
                root.insert(
                    crate::registry::document::META_KEY.to_string(),
                    serde_json::to_value(document.metadata())?,
                );
                Value::Object(root)
            }
        };
        Ok(serde_json::to_string_pretty(&value)?)
    }
}

fn timeout(ms: Option<u64>) -> Option<Duration> {
    ms.map(Duration::from_millis)
}
