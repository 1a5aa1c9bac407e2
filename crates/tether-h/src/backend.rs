use crate::cdp::{CdpClient, LaunchOptions};
use crate::inject::evaluate;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::element::Element;
use chromiumoxide::page::ScreenshotParams;
use std::path::Path;
use std::time::Duration;
use tether_engine::backend::{Backend, BackendError, NavigationResult};
use tether_engine::protocol::{ElementHandle, ElementSnapshot, LocatorExpression};
use tether_scanner::{STALE_MARKER, fill_call, focus_call, mark_call, mark_selector, query_call, text_call};
use tracing::{debug, info};

pub struct HeadlessBackend {
    client: Option<CdpClient>,
    options: LaunchOptions,
    marks: u64,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_options(LaunchOptions::default())
    }

    pub fn with_options(options: LaunchOptions) -> Self {
        Self {
            client: None,
            options,
            marks: 0,
        }
    }

    fn page(&self) -> Result<&Page, BackendError> {
        self.client
            .as_ref()
            .map(|client| &client.page)
            .ok_or(BackendError::NotReady)
    }

    async fn get_navigation_result(page: &Page) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }

    /// Tag the addressed element and look it up natively, so clicks and key
    /// input go through real input events.
    async fn native_element(&mut self, target: &ElementHandle) -> Result<Element, BackendError> {
        self.marks += 1;
        let token = format!("m{}", self.marks);
        let page = self.page()?;

        evaluate::<bool>(page, &mark_call(target.expression.as_str(), target.index, &token))
            .await
            .map_err(|e| element_error(e, target))?;
        page.find_element(mark_selector(&token))
            .await
            .map_err(|_| BackendError::StaleElement(target.to_string()))
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Script failures on an addressed element mean it is gone when the helper says so.
fn element_error(err: BackendError, target: &ElementHandle) -> BackendError {
    match err {
        BackendError::Script(message) if message.contains(STALE_MARKER) => {
            BackendError::StaleElement(target.to_string())
        }
        other => other,
    }
}

/// CDP key event fields for keys that carry more than a name.
fn key_definition(key: &str) -> (Option<&'static str>, Option<i64>) {
    match key {
        "Enter" => (Some("\r"), Some(13)),
        "Tab" => (Some("\t"), Some(9)),
        "Backspace" => (None, Some(8)),
        "Escape" => (None, Some(27)),
        "ArrowDown" => (None, Some(40)),
        "ArrowUp" => (None, Some(38)),
        _ => (None, None),
    }
}

fn modifier_flags(modifiers: &[String]) -> i64 {
    let mut flags = 0;
    for m in modifiers {
        match m.to_lowercase().as_str() {
            "alt" => flags |= 1,
            "ctrl" | "control" => flags |= 2,
            "meta" | "cmd" | "command" => flags |= 4,
            "shift" => flags |= 8,
            _ => {}
        }
    }
    flags
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Launching headless backend (Chromium)...");
        let client = CdpClient::launch(&self.options)
            .await
            .map_err(|e| BackendError::Other(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.is_some()
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;

        info!("Navigating to: {}", url);
        page.goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        Self::get_navigation_result(page).await
    }

    async fn page_info(&mut self) -> Result<NavigationResult, BackendError> {
        Self::get_navigation_result(self.page()?).await
    }

    async fn query(
        &mut self,
        expression: &LocatorExpression,
    ) -> Result<Vec<ElementSnapshot>, BackendError> {
        let page = self.page()?;
        evaluate(page, &query_call(expression.as_str()))
            .await
            .map_err(|e| match e {
                BackendError::Script(message) => BackendError::Query {
                    expression: expression.to_string(),
                    message,
                },
                other => other,
            })
    }

    async fn click(&mut self, target: &ElementHandle) -> Result<(), BackendError> {
        let element = self.native_element(target).await?;
        element
            .click()
            .await
            .map_err(|e| BackendError::Other(format!("click on {} failed: {}", target, e)))?;
        debug!("Clicked {}", target);
        Ok(())
    }

    async fn fill(&mut self, target: &ElementHandle, text: &str) -> Result<(), BackendError> {
        let page = self.page()?;
        evaluate::<bool>(page, &fill_call(target.expression.as_str(), target.index, text))
            .await
            .map_err(|e| element_error(e, target))?;
        Ok(())
    }

    async fn type_text(
        &mut self,
        target: &ElementHandle,
        text: &str,
        delay: Duration,
    ) -> Result<(), BackendError> {
        let element = self.native_element(target).await?;
        evaluate::<bool>(self.page()?, &focus_call(target.expression.as_str(), target.index))
            .await
            .map_err(|e| element_error(e, target))?;

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| BackendError::Other(format!("typing into {} failed: {}", target, e)))?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn inner_text(&mut self, target: &ElementHandle) -> Result<String, BackendError> {
        let page = self.page()?;
        evaluate(page, &text_call(target.expression.as_str(), target.index))
            .await
            .map_err(|e| element_error(e, target))
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError> {
        let page = self.page()?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(full_page)
            .build();
        page.screenshot(params)
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn press_key(&mut self, key: &str, modifiers: &[String]) -> Result<(), BackendError> {
        let page = self.page()?;
        let flags = modifier_flags(modifiers);
        let (text, key_code) = key_definition(key);

        for (event_type, is_down) in [
            (DispatchKeyEventType::KeyDown, true),
            (DispatchKeyEventType::KeyUp, false),
        ] {
            let mut builder = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key(key)
                .code(key)
                .modifiers(flags);
            if let Some(code) = key_code {
                builder = builder
                    .windows_virtual_key_code(code)
                    .native_virtual_key_code(code);
            }
            if is_down && let Some(text) = text {
                builder = builder.text(text);
            }
            let event = builder
                .build()
                .map_err(|e| BackendError::Other(format!("Failed to build key event: {:?}", e)))?;
            page.execute(event)
                .await
                .map_err(|e| BackendError::Other(format!("press_key {} failed: {}", key, e)))?;
        }
        Ok(())
    }

    async fn upload_file(&mut self, target: &ElementHandle, file: &Path) -> Result<(), BackendError> {
        let element = self.native_element(target).await?;
        let mut params = SetFileInputFilesParams::new(vec![file.display().to_string()]);
        params.backend_node_id = Some(element.backend_node_id);
        self.page()?
            .execute(params)
            .await
            .map_err(|e| BackendError::Other(format!("upload to {} failed: {}", target, e)))?;
        info!("Attached {} to {}", file.display(), target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_flags() {
        let mods = vec!["Ctrl".to_string(), "shift".to_string(), "hyper".to_string()];
        assert_eq!(modifier_flags(&mods), 10);
        assert_eq!(modifier_flags(&[]), 0);
    }

    #[test]
    fn test_stale_script_error_maps_to_stale_element() {
        let target = ElementHandle::new("#send".into(), 2);
        let err = element_error(
            BackendError::Script("Error: tether:stale #send #2".into()),
            &target,
        );
        assert!(matches!(err, BackendError::StaleElement(ref s) if s == "#send [#2]"));

        let err = element_error(BackendError::Script("boom".into()), &target);
        assert!(matches!(err, BackendError::Script(_)));
    }
}
