//! Projects, their knowledge files and their conversations.
//!
//! Everything here is composed from the action primitives: list regions are
//! read with [`ActionExecutor::list`], single controls go through the
//! registry paths below. Identity comes from link targets, display names from
//! the first line of an element's text.

use crate::actions::{ActionError, ActionExecutor};
use crate::backend::{Backend, BackendError};
use crate::config::schema::SiteConfig;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tether_common::protocol::{ElementHandle, ElementSnapshot};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

pub const PROJECT_ITEMS_PATH: &str = "projects.items";
pub const NEW_PROJECT_PATH: &str = "projects.newButton";
pub const PROJECT_NAME_INPUT_PATH: &str = "projects.nameInput";
pub const CREATE_PROJECT_PATH: &str = "projects.createButton";

pub const PROJECT_TITLE_PATH: &str = "project.title";
pub const PROJECT_DESCRIPTION_PATH: &str = "project.description";
pub const PROJECT_MEMORY_PATH: &str = "project.memory";
pub const PROJECT_CONVERSATIONS_PATH: &str = "project.conversations";
pub const PROJECT_FILES_PATH: &str = "project.files";
pub const PROJECT_MENU_PATH: &str = "project.menuButton";
pub const PROJECT_DELETE_PATH: &str = "project.deleteButton";
pub const PROJECT_CONFIRM_DELETE_PATH: &str = "project.confirmDeleteButton";
pub const INSTRUCTIONS_BUTTON_PATH: &str = "project.instructionsButton";
pub const INSTRUCTIONS_INPUT_PATH: &str = "project.instructionsInput";
pub const INSTRUCTIONS_SAVE_PATH: &str = "project.instructionsSave";

pub const FILE_ADD_PATH: &str = "files.addButton";
pub const FILE_ADD_TEXT_PATH: &str = "files.addTextButton";
pub const FILE_UPLOAD_INPUT_PATH: &str = "files.uploadInput";
pub const FILE_NAME_INPUT_PATH: &str = "files.nameInput";
pub const FILE_CONTENT_INPUT_PATH: &str = "files.contentInput";
pub const FILE_SAVE_PATH: &str = "files.saveButton";
pub const FILE_VIEWER_PATH: &str = "files.viewerContent";
pub const FILE_DELETE_PATH: &str = "files.deleteButton";
pub const FILE_CONFIRM_DELETE_PATH: &str = "files.confirmDeleteButton";

pub const SIDEBAR_CONVERSATIONS_PATH: &str = "sidebar.conversations";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("No {kind} matching '{name}'")]
    NotFound { kind: &'static str, name: String },

    #[error("Navigation error: {0}")]
    Navigation(String),

    #[error("Cannot read '{}': {source}", .path.display())]
    LocalFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenedProject {
    pub status: &'static str,
    pub id: String,
    pub name: String,
    pub url: String,
    pub conversations: Vec<ConversationSummary>,
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDetails {
    pub name: String,
    pub description: Option<String>,
    pub url: String,
    pub conversation_count: usize,
    pub file_count: usize,
}

/// Outcome of `delete_project`.
#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    Deleted(ProjectSummary),
    /// Nothing was touched because the caller did not confirm.
    NeedsConfirmation(String),
}

/// A link read out of a list region.
#[derive(Debug, Clone, PartialEq)]
struct Link {
    id: String,
    label: String,
    url: Url,
}

impl Link {
    fn from_snapshot(element: &ElementSnapshot, base: &Url) -> Option<Self> {
        let url = base.join(element.href.as_deref()?).ok()?;
        let id = url
            .path_segments()?
            .rev()
            .find(|segment| !segment.is_empty())?
            .to_string();
        let label = first_line(&element.text).unwrap_or_else(|| id.clone());
        Some(Self { id, label, url })
    }
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

fn links(elements: &[ElementSnapshot], base: &Url) -> Vec<Link> {
    let mut found: Vec<Link> = Vec::new();
    for link in elements.iter().filter_map(|e| Link::from_snapshot(e, base)) {
        if !found.iter().any(|known| known.url == link.url) {
            found.push(link);
        }
    }
    found
}

/// Pick a project by exact id, then by name ignoring case, then by substring.
fn pick<'a>(projects: &'a [ProjectSummary], query: &str) -> Option<&'a ProjectSummary> {
    let needle = query.trim().to_lowercase();
    projects
        .iter()
        .find(|p| p.id == query.trim())
        .or_else(|| projects.iter().find(|p| p.name.to_lowercase() == needle))
        .or_else(|| {
            projects
                .iter()
                .find(|p| p.name.to_lowercase().contains(&needle))
        })
}

pub struct ProjectFlow {
    actions: Arc<ActionExecutor>,
    site: SiteConfig,
    current: Option<ProjectSummary>,
}

impl ProjectFlow {
    pub fn new(actions: Arc<ActionExecutor>, site: SiteConfig) -> Self {
        Self {
            actions,
            site,
            current: None,
        }
    }

    /// The project the page was last switched to.
    pub fn current(&self) -> Option<&ProjectSummary> {
        self.current.as_ref()
    }

    pub async fn list_projects<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
    ) -> Result<Vec<ProjectSummary>, ProjectError> {
        let url = self.site_url(backend, &self.site.projects_path).await?;
        self.goto(backend, &url).await?;
        let projects = self
            .read_links(backend, PROJECT_ITEMS_PATH)
            .await?
            .into_iter()
            .map(|link| ProjectSummary {
                id: link.id,
                name: link.label,
                url: link.url.to_string(),
            })
            .collect::<Vec<_>>();
        debug!("Found {} projects", projects.len());
        Ok(projects)
    }

    /// Switch the page to a project, found by id or name.
    pub async fn open_project<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<OpenedProject, ProjectError> {
        let project = self.enter(backend, query).await?;
        let conversations = self.conversations_here(backend).await?;
        let files = self.files_here(backend).await?;
        info!("Opened project '{}'", project.name);
        Ok(OpenedProject {
            status: "opened",
            id: project.id,
            name: project.name,
            url: project.url,
            conversations,
            files,
        })
    }

    /// Make sure the page shows `query`'s project, navigating only if needed.
    pub async fn ensure_open<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<ProjectSummary, ProjectError> {
        if let Some(current) = &self.current
            && (current.id == query || current.name.eq_ignore_ascii_case(query))
            && backend.page_info().await?.url == current.url
        {
            return Ok(current.clone());
        }
        self.enter(backend, query).await
    }

    pub async fn create_project<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        name: &str,
        instructions: Option<&str>,
    ) -> Result<ProjectSummary, ProjectError> {
        let url = self.site_url(backend, &self.site.projects_path).await?;
        self.goto(backend, &url).await?;
        self.actions.click(backend, NEW_PROJECT_PATH, None).await?;
        self.actions
            .fill(backend, PROJECT_NAME_INPUT_PATH, name, None)
            .await?;
        self.actions.click(backend, CREATE_PROJECT_PATH, None).await?;

        let landed = Url::parse(&backend.page_info().await?.url)
            .map_err(|e| ProjectError::Navigation(e.to_string()))?;
        let id = landed
            .path_segments()
            .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
            .unwrap_or_default()
            .to_string();
        let project = ProjectSummary {
            id,
            name: name.to_string(),
            url: landed.to_string(),
        };
        self.current = Some(project.clone());
        info!("Created project '{}'", name);

        if let Some(instructions) = instructions {
            self.write_instructions(backend, instructions).await?;
        }
        Ok(project)
    }

    /// Delete a project. Without `confirm` nothing happens.
    pub async fn delete_project<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        confirm: bool,
    ) -> Result<Deletion, ProjectError> {
        if !confirm {
            return Ok(Deletion::NeedsConfirmation(format!(
                "Refusing to delete project '{}': pass \"confirm\": true to delete it",
                query
            )));
        }
        let project = self.ensure_open(backend, query).await?;
        self.actions.click(backend, PROJECT_MENU_PATH, None).await?;
        self.actions.click(backend, PROJECT_DELETE_PATH, None).await?;
        self.actions
            .click(backend, PROJECT_CONFIRM_DELETE_PATH, None)
            .await?;
        self.current = None;
        info!("Deleted project '{}'", project.name);
        Ok(Deletion::Deleted(project))
    }

    pub async fn project_details<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<ProjectDetails, ProjectError> {
        let project = self.ensure_open(backend, query).await?;
        let name = self
            .optional_text(backend, PROJECT_TITLE_PATH)
            .await?
            .and_then(|text| first_line(&text))
            .unwrap_or(project.name);
        let description = self.optional_text(backend, PROJECT_DESCRIPTION_PATH).await?;
        let conversation_count = self.conversations_here(backend).await?.len();
        let file_count = self.files_here(backend).await?.len();
        Ok(ProjectDetails {
            name,
            description,
            url: project.url,
            conversation_count,
            file_count,
        })
    }

    /// The memory panel text, `None` when the project has none yet.
    pub async fn project_memory<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<Option<String>, ProjectError> {
        self.ensure_open(backend, query).await?;
        self.optional_text(backend, PROJECT_MEMORY_PATH).await
    }

    pub async fn project_instructions<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<String, ProjectError> {
        self.ensure_open(backend, query).await?;
        self.actions
            .click(backend, INSTRUCTIONS_BUTTON_PATH, None)
            .await?;
        let text = self
            .actions
            .read_text(backend, INSTRUCTIONS_INPUT_PATH, None)
            .await?;
        self.actions.press_key(backend, "Escape", &[]).await?;
        Ok(text)
    }

    pub async fn set_project_instructions<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        instructions: &str,
    ) -> Result<ProjectSummary, ProjectError> {
        let project = self.ensure_open(backend, query).await?;
        self.write_instructions(backend, instructions).await?;
        info!("Instructions updated for '{}'", project.name);
        Ok(project)
    }

    pub async fn list_files<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<Vec<FileSummary>, ProjectError> {
        self.ensure_open(backend, query).await?;
        self.files_here(backend).await
    }

    /// Add a text file to the project's knowledge.
    pub async fn create_file<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        file_name: &str,
        content: &str,
    ) -> Result<(), ProjectError> {
        self.ensure_open(backend, query).await?;
        self.actions.click(backend, FILE_ADD_PATH, None).await?;
        self.actions.click(backend, FILE_ADD_TEXT_PATH, None).await?;
        self.actions
            .fill(backend, FILE_NAME_INPUT_PATH, file_name, None)
            .await?;
        self.actions
            .fill(backend, FILE_CONTENT_INPUT_PATH, content, None)
            .await?;
        self.actions.click(backend, FILE_SAVE_PATH, None).await?;
        info!("Created file '{}'", file_name);
        Ok(())
    }

    pub async fn read_file<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        file_name: &str,
    ) -> Result<String, ProjectError> {
        self.ensure_open(backend, query).await?;
        self.open_file(backend, file_name).await?;
        let content = self
            .actions
            .read_text(backend, FILE_VIEWER_PATH, None)
            .await?;
        self.actions.press_key(backend, "Escape", &[]).await?;
        Ok(content)
    }

    pub async fn delete_file<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        file_name: &str,
    ) -> Result<(), ProjectError> {
        self.ensure_open(backend, query).await?;
        self.open_file(backend, file_name).await?;
        self.actions.click(backend, FILE_DELETE_PATH, None).await?;
        if self
            .actions
            .exists(backend, FILE_CONFIRM_DELETE_PATH, None)
            .await?
        {
            self.actions
                .click(backend, FILE_CONFIRM_DELETE_PATH, None)
                .await?;
        }
        info!("Deleted file '{}'", file_name);
        Ok(())
    }

    /// Upload a local file. Returns the name it was uploaded under.
    pub async fn upload_file<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
        file: &Path,
    ) -> Result<String, ProjectError> {
        let metadata = tokio::fs::metadata(file)
            .await
            .map_err(|source| ProjectError::LocalFile {
                path: file.to_path_buf(),
                source,
            })?;
        if !metadata.is_file() {
            return Err(ProjectError::LocalFile {
                path: file.to_path_buf(),
                source: std::io::Error::other("not a regular file"),
            });
        }

        self.ensure_open(backend, query).await?;
        self.actions.click(backend, FILE_ADD_PATH, None).await?;
        self.actions
            .upload(backend, FILE_UPLOAD_INPUT_PATH, file, None)
            .await?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        info!("Uploaded file '{}'", name);
        Ok(name)
    }

    /// Conversations of a project, or the recent ones in the sidebar.
    pub async fn list_conversations<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        project: Option<&str>,
    ) -> Result<Vec<ConversationSummary>, ProjectError> {
        match project {
            Some(query) => {
                self.ensure_open(backend, query).await?;
                self.conversations_here(backend).await
            }
            None => Ok(self
                .read_links(backend, SIDEBAR_CONVERSATIONS_PATH)
                .await?
                .into_iter()
                .map(conversation)
                .collect()),
        }
    }

    /// Navigate to a conversation by id or full URL.
    pub async fn open_conversation<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        id: &str,
    ) -> Result<String, ProjectError> {
        let url = if id.starts_with("http://") || id.starts_with("https://") {
            Url::parse(id).map_err(|e| ProjectError::Navigation(e.to_string()))?
        } else {
            let path = self.site.conversation_path.replace("{id}", id.trim());
            self.site_url(backend, &path).await?
        };
        self.goto(backend, &url).await
    }

    async fn enter<B: Backend + ?Sized>(
        &mut self,
        backend: &mut B,
        query: &str,
    ) -> Result<ProjectSummary, ProjectError> {
        let projects = self.list_projects(backend).await?;
        let project = pick(&projects, query)
            .cloned()
            .ok_or_else(|| ProjectError::NotFound {
                kind: "project",
                name: query.to_string(),
            })?;
        let url = Url::parse(&project.url).map_err(|e| ProjectError::Navigation(e.to_string()))?;
        let landed = self.goto(backend, &url).await?;
        let project = ProjectSummary {
            url: landed,
            ..project
        };
        self.current = Some(project.clone());
        Ok(project)
    }

    async fn write_instructions<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        instructions: &str,
    ) -> Result<(), ProjectError> {
        self.actions
            .click(backend, INSTRUCTIONS_BUTTON_PATH, None)
            .await?;
        self.actions
            .fill(backend, INSTRUCTIONS_INPUT_PATH, instructions, None)
            .await?;
        self.actions
            .click(backend, INSTRUCTIONS_SAVE_PATH, None)
            .await?;
        Ok(())
    }

    async fn open_file<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        file_name: &str,
    ) -> Result<(), ProjectError> {
        let handle = self
            .file_handle(backend, file_name)
            .await?
            .ok_or_else(|| ProjectError::NotFound {
                kind: "file",
                name: file_name.to_string(),
            })?;
        self.actions.click_handle(backend, &handle).await?;
        Ok(())
    }

    async fn file_handle<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        file_name: &str,
    ) -> Result<Option<ElementHandle>, ProjectError> {
        let Some(resolved) = self.actions.list(backend, PROJECT_FILES_PATH, None).await? else {
            return Ok(None);
        };
        let handle = resolved
            .elements()
            .iter()
            .zip(resolved.handles())
            .find(|(element, _)| first_line(&element.text).as_deref() == Some(file_name.trim()))
            .map(|(_, handle)| handle);
        Ok(handle)
    }

    async fn files_here<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Vec<FileSummary>, ProjectError> {
        let Some(resolved) = self.actions.list(backend, PROJECT_FILES_PATH, None).await? else {
            return Ok(Vec::new());
        };
        let mut files: Vec<FileSummary> = Vec::new();
        for name in resolved.elements().iter().filter_map(|e| first_line(&e.text)) {
            if !files.iter().any(|f| f.name == name) {
                files.push(FileSummary { name });
            }
        }
        Ok(files)
    }

    async fn conversations_here<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
    ) -> Result<Vec<ConversationSummary>, ProjectError> {
        Ok(self
            .read_links(backend, PROJECT_CONVERSATIONS_PATH)
            .await?
            .into_iter()
            .map(conversation)
            .collect())
    }

    async fn read_links<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
    ) -> Result<Vec<Link>, ProjectError> {
        let Some(resolved) = self.actions.list(backend, path, None).await? else {
            return Ok(Vec::new());
        };
        let base = self.page_url(backend).await?;
        Ok(links(resolved.elements(), &base))
    }

    async fn optional_text<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
    ) -> Result<Option<String>, ProjectError> {
        if !self.actions.exists(backend, path, None).await? {
            return Ok(None);
        }
        let text = self.actions.read_text(backend, path, None).await?;
        Ok(Some(text.trim().to_string()).filter(|t| !t.is_empty()))
    }

    async fn page_url<B: Backend + ?Sized>(&self, backend: &mut B) -> Result<Url, ProjectError> {
        let current = backend.page_info().await?.url;
        Url::parse(&current).map_err(|e| ProjectError::Navigation(format!("{}: {}", current, e)))
    }

    /// `path` joined to the configured origin, or to the current page's.
    async fn site_url<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        path: &str,
    ) -> Result<Url, ProjectError> {
        let base = match &self.site.base_url {
            Some(base) => Url::parse(base).map_err(|e| ProjectError::Navigation(e.to_string()))?,
            None => self.page_url(backend).await?,
        };
        if base.cannot_be_a_base() {
            return Err(ProjectError::Navigation(format!(
                "{} cannot anchor site paths",
                base
            )));
        }
        base.join(path)
            .map_err(|e| ProjectError::Navigation(e.to_string()))
    }

    /// Navigate and return the URL the page ended up on.
    async fn goto<B: Backend + ?Sized>(
        &self,
        backend: &mut B,
        url: &Url,
    ) -> Result<String, ProjectError> {
        let result = backend
            .navigate(url.as_str())
            .await
            .map_err(|e| ProjectError::Navigation(e.to_string()))?;
        Ok(result.url)
    }
}

fn conversation(link: Link) -> ConversationSummary {
    ConversationSummary {
        id: link.id,
        title: link.label,
        url: link.url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(text: &str, href: Option<&str>) -> ElementSnapshot {
        ElementSnapshot {
            index: 0,
            tag: "a".into(),
            text: text.into(),
            visible: true,
            enabled: true,
            href: href.map(str::to_string),
        }
    }

    fn project(id: &str, name: &str) -> ProjectSummary {
        ProjectSummary {
            id: id.into(),
            name: name.into(),
            url: format!("https://chat.example.com/project/{}", id),
        }
    }

    #[test]
    fn test_links_resolve_relative_targets_and_dedupe() {
        let base = Url::parse("https://chat.example.com/projects").unwrap();
        let elements = vec![
            snapshot("\n  Research\nUpdated 2 days ago", Some("/project/abc")),
            snapshot("Research", Some("https://chat.example.com/project/abc")),
            snapshot("No link", None),
            snapshot("", Some("/project/def/")),
        ];
        let found = links(&elements, &base);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "abc");
        assert_eq!(found[0].label, "Research");
        assert_eq!(found[0].url.as_str(), "https://chat.example.com/project/abc");
        assert_eq!(found[1].id, "def");
        assert_eq!(found[1].label, "def");
    }

    #[test]
    fn test_pick_prefers_id_then_exact_name() {
        let projects = vec![
            project("p1", "Research notes"),
            project("p2", "research"),
            project("research", "Archive"),
        ];
        assert_eq!(pick(&projects, "research").unwrap().id, "research");
        assert_eq!(pick(&projects, "RESEARCH").unwrap().id, "p2");
        assert_eq!(pick(&projects, "notes").unwrap().id, "p1");
        assert!(pick(&projects, "missing").is_none());
    }
}
