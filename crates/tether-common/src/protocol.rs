use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// An opaque query string evaluated against the live page.
///
/// The engine never looks inside an expression: it only asks a backend for
/// the elements it currently matches. Backends decide how to interpret it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorExpression(String);

impl LocatorExpression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self(expression.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LocatorExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LocatorExpression {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LocatorExpression {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// The state a resolved element has to reach before resolution succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementState {
    /// Present in the tree, regardless of visibility.
    Attached,
    /// Present and rendered.
    #[default]
    Visible,
    /// Absent, or present but not rendered.
    Hidden,
}

/// Which element satisfied a state check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateMatch {
    /// The match at this index satisfied the state.
    Element(usize),
    /// The state was satisfied by the absence of any match.
    Absent,
}

impl ElementState {
    /// Evaluate the state against the current match set.
    ///
    /// `Attached` picks the first match, `Visible` the first visible match,
    /// `Hidden` holds while nothing is visible.
    pub fn evaluate(&self, matches: &[ElementSnapshot]) -> Option<StateMatch> {
        match self {
            ElementState::Attached => matches.first().map(|m| StateMatch::Element(m.index)),
            ElementState::Visible => matches
                .iter()
                .find(|m| m.visible)
                .map(|m| StateMatch::Element(m.index)),
            ElementState::Hidden => {
                if matches.iter().any(|m| m.visible) {
                    None
                } else {
                    Some(
                        matches
                            .first()
                            .map(|m| StateMatch::Element(m.index))
                            .unwrap_or(StateMatch::Absent),
                    )
                }
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ElementState::Attached => "attached",
            ElementState::Visible => "visible",
            ElementState::Hidden => "hidden",
        }
    }
}

impl fmt::Display for ElementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A point-in-time view of one element matched by an expression.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementSnapshot {
    /// Position of the element in the expression's match list.
    pub index: usize,
    #[serde(default)]
    pub tag: String,
    #[serde(default, deserialize_with = "deserialize_nullable_string")]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Target of the link the element is, sits in, or wraps.
    #[serde(default)]
    pub href: Option<String>,
}

fn default_enabled() -> bool {
    true
}

/// The query helper reports `null` text for elements without any.
fn deserialize_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Addresses one element on the live page: the n-th match of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    pub expression: LocatorExpression,
    pub index: usize,
}

impl ElementHandle {
    pub fn new(expression: LocatorExpression, index: usize) -> Self {
        Self { expression, index }
    }
}

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [#{}]", self.expression, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub url: String,
    pub title: String,
    /// Coarse location inside the target application (first URL path segment).
    pub context: String,
}

/// Commands accepted by the command surface, one per input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Navigate(NavigateArgs),
    SendMessage(SendMessageArgs),
    GetResponse(EmptyArgs),
    StopResponse(EmptyArgs),
    Click(TargetArgs),
    Fill(TextArgs),
    TypeText(TextArgs),
    ReadText(TargetArgs),
    Exists(TargetArgs),
    TakeScreenshot(ScreenshotArgs),
    ValidateSelectors(CategoryArgs),
    ReloadSelectors(EmptyArgs),
    GetSelectors(CategoryArgs),
    GetPageInfo(EmptyArgs),
    CloseBrowser(EmptyArgs),
    ListProjects(EmptyArgs),
    OpenProject(ProjectArgs),
    CreateProject(CreateProjectArgs),
    DeleteProject(DeleteProjectArgs),
    GetProjectDetails(ProjectArgs),
    GetProjectMemory(ProjectArgs),
    GetProjectInstructions(ProjectArgs),
    SetProjectInstructions(InstructionsArgs),
    ListProjectFiles(ProjectArgs),
    CreateFile(CreateFileArgs),
    ReadFile(FileArgs),
    DeleteFile(FileArgs),
    UploadFile(UploadFileArgs),
    ListConversations(OptionalProjectArgs),
    OpenConversation(ConversationArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Navigate(_) => "navigate",
            Command::SendMessage(_) => "send_message",
            Command::GetResponse(_) => "get_response",
            Command::StopResponse(_) => "stop_response",
            Command::Click(_) => "click",
            Command::Fill(_) => "fill",
            Command::TypeText(_) => "type_text",
            Command::ReadText(_) => "read_text",
            Command::Exists(_) => "exists",
            Command::TakeScreenshot(_) => "take_screenshot",
            Command::ValidateSelectors(_) => "validate_selectors",
            Command::ReloadSelectors(_) => "reload_selectors",
            Command::GetSelectors(_) => "get_selectors",
            Command::GetPageInfo(_) => "get_page_info",
            Command::CloseBrowser(_) => "close_browser",
            Command::ListProjects(_) => "list_projects",
            Command::OpenProject(_) => "open_project",
            Command::CreateProject(_) => "create_project",
            Command::DeleteProject(_) => "delete_project",
            Command::GetProjectDetails(_) => "get_project_details",
            Command::GetProjectMemory(_) => "get_project_memory",
            Command::GetProjectInstructions(_) => "get_project_instructions",
            Command::SetProjectInstructions(_) => "set_project_instructions",
            Command::ListProjectFiles(_) => "list_project_files",
            Command::CreateFile(_) => "create_file",
            Command::ReadFile(_) => "read_file",
            Command::DeleteFile(_) => "delete_file",
            Command::UploadFile(_) => "upload_file",
            Command::ListConversations(_) => "list_conversations",
            Command::OpenConversation(_) => "open_conversation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmptyArgs {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigateArgs {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessageArgs {
    pub message: String,
    /// Project to open before sending, by name or id.
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default = "default_wait_for_response")]
    pub wait_for_response: bool,
    /// Overrides the configured completion budget.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_wait_for_response() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetArgs {
    /// Dotted registry path, e.g. `chat.sendButton`.
    pub path: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextArgs {
    pub path: String,
    pub text: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotArgs {
    #[serde(default = "default_screenshot_label")]
    pub label: String,
    #[serde(default)]
    pub full_page: bool,
}

fn default_screenshot_label() -> String {
    "manual".to_string()
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CategoryArgs {
    #[serde(default)]
    pub category: Option<String>,
}

/// A project addressed by name or id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectArgs {
    pub project: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OptionalProjectArgs {
    #[serde(default)]
    pub project: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProjectArgs {
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteProjectArgs {
    pub project: String,
    /// Nothing is deleted unless this is `true`.
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstructionsArgs {
    pub project: String,
    pub instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileArgs {
    pub project: String,
    pub file_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFileArgs {
    pub project: String,
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadFileArgs {
    pub project: String,
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationArgs {
    pub conversation_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(index: usize, visible: bool) -> ElementSnapshot {
        ElementSnapshot {
            index,
            tag: "div".into(),
            visible,
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_state_evaluation() {
        let none: Vec<ElementSnapshot> = vec![];
        let mixed = vec![snap(0, false), snap(1, true)];

        assert_eq!(ElementState::Attached.evaluate(&none), None);
        assert_eq!(
            ElementState::Attached.evaluate(&mixed),
            Some(StateMatch::Element(0))
        );
        assert_eq!(
            ElementState::Visible.evaluate(&mixed),
            Some(StateMatch::Element(1))
        );
        assert_eq!(ElementState::Hidden.evaluate(&mixed), None);
        assert_eq!(ElementState::Hidden.evaluate(&none), Some(StateMatch::Absent));
        assert_eq!(
            ElementState::Hidden.evaluate(&[snap(0, false)]),
            Some(StateMatch::Element(0))
        );
    }

    #[test]
    fn test_command_parsing() {
        let cmd: Command = serde_json::from_value(serde_json::json!({
            "command": "send_message",
            "message": "hi"
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::SendMessage(SendMessageArgs {
                message: "hi".into(),
                project: None,
                wait_for_response: true,
                timeout_ms: None,
            })
        );

        let cmd: Command =
            serde_json::from_value(serde_json::json!({ "command": "reload_selectors" })).unwrap();
        assert_eq!(cmd.name(), "reload_selectors");

        let cmd: Command = serde_json::from_value(serde_json::json!({
            "command": "delete_project",
            "project": "Research"
        }))
        .unwrap();
        assert_eq!(
            cmd,
            Command::DeleteProject(DeleteProjectArgs {
                project: "Research".into(),
                confirm: false,
            })
        );
    }

    #[test]
    fn test_snapshot_null_text() {
        let snap: ElementSnapshot =
            serde_json::from_value(serde_json::json!({ "index": 0, "tag": "p", "text": null }))
                .unwrap();
        assert_eq!(snap.text, "");
        assert!(snap.enabled);
        assert_eq!(snap.href, None);
    }
}
