use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TetherConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub resolution: ResolutionConfig,
    #[serde(default)]
    pub actions: ActionConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("./selectors.json")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    #[serde(default = "default_resolve_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Upper bound for a single strategy's wait window.
    #[serde(default = "default_strategy_ceiling_ms")]
    pub strategy_ceiling_ms: u64,
    /// Lower bound for a single strategy's wait window.
    #[serde(default = "default_strategy_floor_ms")]
    pub strategy_floor_ms: u64,
    #[serde(default = "default_resolve_poll_ms")]
    pub poll_interval_ms: u64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_resolve_timeout_ms(),
            strategy_ceiling_ms: default_strategy_ceiling_ms(),
            strategy_floor_ms: default_strategy_floor_ms(),
            poll_interval_ms: default_resolve_poll_ms(),
        }
    }
}

impl ResolutionConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    pub fn strategy_ceiling(&self) -> Duration {
        Duration::from_millis(self.strategy_ceiling_ms)
    }

    pub fn strategy_floor(&self) -> Duration {
        Duration::from_millis(self.strategy_floor_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_resolve_timeout_ms() -> u64 {
    10000
}

fn default_strategy_ceiling_ms() -> u64 {
    5000
}

fn default_strategy_floor_ms() -> u64 {
    100
}

fn default_resolve_poll_ms() -> u64 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Pause after UI-mutating actions so client-side rendering can catch up.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default = "default_type_delay_ms")]
    pub type_delay_ms: u64,
    #[serde(default = "default_exists_timeout_ms")]
    pub exists_timeout_ms: u64,
    #[serde(default = "default_screenshot_on_failure")]
    pub screenshot_on_failure: bool,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            type_delay_ms: default_type_delay_ms(),
            exists_timeout_ms: default_exists_timeout_ms(),
            screenshot_on_failure: default_screenshot_on_failure(),
        }
    }
}

impl ActionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn type_delay(&self) -> Duration {
        Duration::from_millis(self.type_delay_ms)
    }

    pub fn exists_timeout(&self) -> Duration {
        Duration::from_millis(self.exists_timeout_ms)
    }
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_type_delay_ms() -> u64 {
    20
}

fn default_exists_timeout_ms() -> u64 {
    1000
}

fn default_screenshot_on_failure() -> bool {
    true
}

/// Registry paths the completion detector watches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionSignals {
    #[serde(default = "default_busy_signal")]
    pub busy: String,
    #[serde(default = "default_thinking_signal")]
    pub thinking: String,
    #[serde(default = "default_ready_signal")]
    pub ready: String,
    #[serde(default = "default_error_signal")]
    pub error: String,
    #[serde(default = "default_output_signal")]
    pub output: String,
}

impl Default for CompletionSignals {
    fn default() -> Self {
        Self {
            busy: default_busy_signal(),
            thinking: default_thinking_signal(),
            ready: default_ready_signal(),
            error: default_error_signal(),
            output: default_output_signal(),
        }
    }
}

fn default_busy_signal() -> String {
    "chat.streamingIndicator".to_string()
}

fn default_thinking_signal() -> String {
    "chat.thinkingIndicator".to_string()
}

fn default_ready_signal() -> String {
    "chat.readyIndicator".to_string()
}

fn default_error_signal() -> String {
    "chat.errorBanner".to_string()
}

fn default_output_signal() -> String {
    "chat.responseContent".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_poll_ms")]
    pub poll_interval_ms: u64,
    /// How long to wait for a busy/thinking signal before assuming a fast operation.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    #[serde(default = "default_completion_timeout_ms")]
    pub timeout_ms: u64,
    /// Wait window for each signal probe. Zero means a single query.
    #[serde(default)]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_extract_timeout_ms")]
    pub extract_timeout_ms: u64,
    /// Case-insensitive patterns an error banner's text must match.
    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,
    #[serde(default)]
    pub signals: CompletionSignals,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_completion_poll_ms(),
            grace_ms: default_grace_ms(),
            timeout_ms: default_completion_timeout_ms(),
            probe_timeout_ms: 0,
            extract_timeout_ms: default_extract_timeout_ms(),
            error_patterns: default_error_patterns(),
            signals: CompletionSignals::default(),
        }
    }
}

impl CompletionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_millis(self.extract_timeout_ms)
    }
}

fn default_completion_poll_ms() -> u64 {
    500
}

fn default_grace_ms() -> u64 {
    3000
}

fn default_completion_timeout_ms() -> u64 {
    300_000
}

fn default_extract_timeout_ms() -> u64 {
    5000
}

fn default_error_patterns() -> Vec<String> {
    vec!["error".to_string(), "limit".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default = "default_entry_timeout_ms")]
    pub entry_timeout_ms: u64,
    #[serde(default = "default_persist_timestamp")]
    pub persist_timestamp: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            entry_timeout_ms: default_entry_timeout_ms(),
            persist_timestamp: default_persist_timestamp(),
        }
    }
}

impl ValidationConfig {
    pub fn entry_timeout(&self) -> Duration {
        Duration::from_millis(self.entry_timeout_ms)
    }
}

fn default_entry_timeout_ms() -> u64 {
    2000
}

fn default_persist_timestamp() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    #[serde(default = "default_screenshot_dir")]
    pub screenshot_dir: PathBuf,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            screenshot_dir: default_screenshot_dir(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("./screenshots")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Page opened right after launch.
    #[serde(default)]
    pub start_url: Option<String>,
    /// Persistent profile directory, so a logged-in session survives restarts.
    #[serde(default)]
    pub user_data_dir: Option<PathBuf>,
    #[serde(default)]
    pub headed: bool,
}

/// URL layout of the target application. `{id}` is replaced by the item id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Origin the paths below are joined to. Defaults to the current page's.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_projects_path")]
    pub projects_path: String,
    #[serde(default = "default_conversation_path")]
    pub conversation_path: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            projects_path: default_projects_path(),
            conversation_path: default_conversation_path(),
        }
    }
}

fn default_projects_path() -> String {
    "/projects".to_string()
}

fn default_conversation_path() -> String {
    "/chat/{id}".to_string()
}
