use crate::webdriver::{DriverOptions, WebDriverClient};
use async_trait::async_trait;
use fantoccini::Locator;
use fantoccini::elements::Element;
use fantoccini::key::Key;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tether_engine::backend::{Backend, BackendError, NavigationResult};
use tether_engine::protocol::{ElementHandle, ElementSnapshot, LocatorExpression};
use tether_scanner::{
    PROBE_JS, QUERY_JS, STALE_MARKER, fill_call, mark_call, mark_selector, query_call, text_call,
};
use tracing::{debug, info, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct WebDriverBackend {
    client: Option<WebDriverClient>,
    options: DriverOptions,
    marks: u64,
}

impl WebDriverBackend {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            client: None,
            options,
            marks: 0,
        }
    }

    pub fn options(&self) -> &DriverOptions {
        &self.options
    }

    fn client(&self) -> Result<&WebDriverClient, BackendError> {
        self.client.as_ref().ok_or(BackendError::NotReady)
    }

    async fn get_navigation_result(
        client: &WebDriverClient,
    ) -> Result<NavigationResult, BackendError> {
        let title = client.client.title().await.unwrap_or_default();
        let url = client
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();

        Ok(NavigationResult { url, title })
    }

    /// Run a helper call, injecting the helper first when the page lost it.
    async fn call<T: DeserializeOwned>(&self, expression: &str) -> Result<T, BackendError> {
        let client = self.client()?;
        let script = format!("return {};", expression);
        let probe = format!("return {};", PROBE_JS);

        let mut last_error = None;
        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                warn!("Retrying helper call (attempt {})...", attempt);
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let installed = match client.client.execute(&probe, vec![]).await {
                Ok(val) => val.as_bool().unwrap_or(false),
                Err(_) => false,
            };
            if !installed {
                debug!("Injecting query helper");
                if let Err(e) = client.client.execute(QUERY_JS, vec![]).await {
                    last_error = Some(BackendError::Script(format!(
                        "Failed to inject query helper: {}",
                        e
                    )));
                    continue;
                }
            }

            match client.client.execute(&script, vec![]).await {
                // A null result means the document went away mid-call.
                Ok(Value::Null) => {
                    last_error = Some(BackendError::Script("helper returned null".into()));
                    continue;
                }
                Ok(value) => return Ok(serde_json::from_value(value)?),
                Err(e) => {
                    let err_msg = e.to_string();
                    if err_msg.contains("__tether is undefined")
                        || err_msg.contains("undefined is not an object")
                    {
                        last_error = Some(BackendError::Script(err_msg));
                        continue;
                    }
                    return Err(BackendError::Script(err_msg));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BackendError::Script("Failed after maximum retries".into())))
    }

    async fn native_element(&mut self, target: &ElementHandle) -> Result<Element, BackendError> {
        self.marks += 1;
        let token = format!("m{}", self.marks);
        self.call::<bool>(&mark_call(target.expression.as_str(), target.index, &token))
            .await
            .map_err(|e| element_error(e, target))?;
        self.client()?
            .client
            .find(Locator::Css(&mark_selector(&token)))
            .await
            .map_err(|_| BackendError::StaleElement(target.to_string()))
    }
}

fn element_error(err: BackendError, target: &ElementHandle) -> BackendError {
    match err {
        BackendError::Script(message) if message.contains(STALE_MARKER) => {
            BackendError::StaleElement(target.to_string())
        }
        other => other,
    }
}

/// WebDriver key sequence: modifiers held, the key, then a release of everything.
fn key_sequence(key: &str, modifiers: &[String]) -> String {
    let mut out = String::new();
    for m in modifiers {
        let modifier = match m.to_lowercase().as_str() {
            "alt" => Key::Alt,
            "ctrl" | "control" => Key::Control,
            "meta" | "cmd" | "command" => Key::Meta,
            "shift" => Key::Shift,
            _ => continue,
        };
        out.push(char::from(modifier));
    }

    let named = match key {
        "Enter" => Some(Key::Enter),
        "Tab" => Some(Key::Tab),
        "Escape" => Some(Key::Escape),
        "Backspace" => Some(Key::Backspace),
        "ArrowUp" => Some(Key::Up),
        "ArrowDown" => Some(Key::Down),
        _ => None,
    };
    match named {
        Some(k) => out.push(char::from(k)),
        None => out.push_str(key),
    }
    if !modifiers.is_empty() {
        out.push(char::from(Key::Null));
    }
    out
}

#[async_trait]
impl Backend for WebDriverBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        info!("Connecting to WebDriver at {}...", self.options.url);
        let client = WebDriverClient::connect(&self.options.url, self.options.capabilities())
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
        let client = self.client()?;

        info!("Navigating to: {}", url);
        client
            .client
            .goto(url)
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?;

        Self::get_navigation_result(client).await
    }

    async fn page_info(&mut self) -> Result<NavigationResult, BackendError> {
        Self::get_navigation_result(self.client()?).await
    }

    async fn query(
        &mut self,
        expression: &LocatorExpression,
    ) -> Result<Vec<ElementSnapshot>, BackendError> {
        self.call(&query_call(expression.as_str()))
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
        Ok(())
    }

    async fn fill(&mut self, target: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.call::<bool>(&fill_call(target.expression.as_str(), target.index, text))
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
        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element
                .send_keys(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| BackendError::Other(format!("typing into {} failed: {}", target, e)))?;
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(())
    }

    async fn inner_text(&mut self, target: &ElementHandle) -> Result<String, BackendError> {
        self.call(&text_call(target.expression.as_str(), target.index))
            .await
            .map_err(|e| element_error(e, target))
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError> {
        if full_page {
            debug!("WebDriver captures the viewport only");
        }
        self.client()?
            .client
            .screenshot()
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))
    }

    async fn press_key(&mut self, key: &str, modifiers: &[String]) -> Result<(), BackendError> {
        let client = self.client()?;
        let active = client
            .client
            .active_element()
            .await
            .map_err(|e| BackendError::Other(format!("press_key failed: {}", e)))?;
        active
            .send_keys(&key_sequence(key, modifiers))
            .await
            .map_err(|e| BackendError::Other(format!("press_key failed: {}", e)))?;
        Ok(())
    }

    /// WebDriver attaches files by sending their path to the input.
    async fn upload_file(&mut self, target: &ElementHandle, file: &Path) -> Result<(), BackendError> {
        let path = std::path::absolute(file)?;
        let element = self.native_element(target).await?;
        element
            .send_keys(&path.display().to_string())
            .await
            .map_err(|e| BackendError::Other(format!("upload to {} failed: {}", target, e)))?;
        info!("Attached {} to {}", path.display(), target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_sequence() {
        assert_eq!(key_sequence("Enter", &[]), char::from(Key::Enter).to_string());
        assert_eq!(key_sequence("a", &[]), "a");

        let seq = key_sequence("a", &["Ctrl".to_string()]);
        let chars: Vec<char> = seq.chars().collect();
        assert_eq!(
            chars,
            vec![char::from(Key::Control), 'a', char::from(Key::Null)]
        );
    }
}
