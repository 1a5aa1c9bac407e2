use async_trait::async_trait;
pub use tether_common::error::backend_error::BackendError;
use tether_common::protocol::{ElementHandle, ElementSnapshot, LocatorExpression, PageInfo};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// The Backend trait is the session provider every browser driver implements.
///
/// It owns exactly one live page. The engine never manages the session
/// itself: it only asks the backend for the current tree and acts on it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the backend (start browser, connect to a driver, etc.)
    async fn launch(&mut self) -> Result<(), BackendError>;

    /// Close the backend and cleanup resources.
    async fn close(&mut self) -> Result<(), BackendError>;

    /// Check if the backend is ready to accept commands.
    async fn is_ready(&self) -> bool;

    /// Navigate to a specific URL.
    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError>;

    /// URL and title of the current page.
    async fn page_info(&mut self) -> Result<NavigationResult, BackendError>;

    /// Every element the expression currently matches, in document order.
    async fn query(
        &mut self,
        expression: &LocatorExpression,
    ) -> Result<Vec<ElementSnapshot>, BackendError>;

    /// Click an element.
    async fn click(&mut self, target: &ElementHandle) -> Result<(), BackendError>;

    /// Replace the content of an editable element.
    async fn fill(&mut self, target: &ElementHandle, text: &str) -> Result<(), BackendError>;

    /// Type text key by key, pausing `delay` between characters.
    async fn type_text(
        &mut self,
        target: &ElementHandle,
        text: &str,
        delay: Duration,
    ) -> Result<(), BackendError>;

    /// Rendered text of an element.
    async fn inner_text(&mut self, target: &ElementHandle) -> Result<String, BackendError>;

    /// Capture a PNG screenshot of the viewport, or the whole page.
    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError>;

    /// Press a key (with optional modifiers).
    async fn press_key(&mut self, _key: &str, _modifiers: &[String]) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("press_key".into()))
    }

    /// Attach a local file to a file input element.
    async fn upload_file(
        &mut self,
        _target: &ElementHandle,
        _file: &Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("upload_file".into()))
    }
}

/// Build a `PageInfo` from a navigation result.
///
/// The context is the first path segment of the URL (`home` for the root).
pub fn page_info_from(nav: &NavigationResult) -> PageInfo {
    let context = url::Url::parse(&nav.url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.find(|s| !s.is_empty()).map(str::to_string))
        })
        .unwrap_or_else(|| "home".to_string());

    PageInfo {
        url: nav.url.clone(),
        title: nav.title.clone(),
        context,
    }
}
