#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tether_engine::actions::{MemorySink, ActionExecutor};
use tether_engine::backend::{Backend, BackendError, NavigationResult};
use tether_engine::config::TetherConfig;
use tether_engine::protocol::{ElementHandle, ElementSnapshot, LocatorExpression};
use tether_engine::registry::StrategyRegistry;
use tether_engine::resolution::ResolutionEngine;
use tokio::time::{Instant, sleep};

/// Registry covering every path the chat flow and completion detector use.
pub const CHAT_REGISTRY: &str = r##"
_meta:
  version: "1"
chat:
  input:
    description: Message input
    strategies: ["#input", "textarea"]
  sendButton:
    description: Send button
    strategies: ["#send-a", "#send-b"]
  stopButton:
    description: Stop generating
    strategies: ["#stop"]
  streamingIndicator:
    description: Streaming indicator
    strategies: ["#busy"]
  thinkingIndicator:
    description: Thinking indicator
    strategies: ["#thinking"]
  readyIndicator:
    description: Input ready again
    strategies: ["#ready"]
  errorBanner:
    description: Error alert
    strategies: ["#alert"]
  responseContent:
    description: Assistant messages
    strategies: ["#response"]
"##;

#[derive(Debug, Clone)]
pub struct MockElement {
    pub tag: String,
    pub text: String,
    pub visible: bool,
    pub enabled: bool,
    pub href: Option<String>,
}

impl MockElement {
    pub fn visible(text: &str) -> Self {
        Self {
            tag: "div".into(),
            text: text.into(),
            visible: true,
            enabled: true,
            href: None,
        }
    }

    /// A visible anchor pointing at `href`.
    pub fn link(text: &str, href: &str) -> Self {
        Self {
            tag: "a".into(),
            href: Some(href.into()),
            ..Self::visible(text)
        }
    }

    pub fn hidden(text: &str) -> Self {
        Self {
            visible: false,
            ..Self::visible(text)
        }
    }
}

/// What every expression matches at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Dom(HashMap<String, Vec<MockElement>>);

impl Dom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, expression: &str, elements: Vec<MockElement>) -> Self {
        self.0.insert(expression.to_string(), elements);
        self
    }

    pub fn show(self, expression: &str, text: &str) -> Self {
        self.with(expression, vec![MockElement::visible(text)])
    }

    pub fn hide(self, expression: &str, text: &str) -> Self {
        self.with(expression, vec![MockElement::hidden(text)])
    }

    fn get(&self, expression: &str) -> &[MockElement] {
        self.0.get(expression).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A page whose DOM changes on a schedule.
///
/// Frames are `(offset, dom)` pairs; the DOM in effect is the last frame whose
/// offset has elapsed since the backend was created.
pub struct MockBackend {
    frames: Vec<(Duration, Dom)>,
    origin: Instant,
    pub query_delay: Duration,
    pub failing: HashSet<String>,
    pub ready: bool,
    pub screenshot_fails: bool,
    pub calls: Vec<String>,
    pub url: String,
}

impl MockBackend {
    pub fn new(dom: Dom) -> Self {
        Self {
            frames: vec![(Duration::ZERO, dom)],
            origin: Instant::now(),
            query_delay: Duration::ZERO,
            failing: HashSet::new(),
            ready: true,
            screenshot_fails: false,
            calls: Vec::new(),
            url: "https://chat.example.com/project/42".into(),
        }
    }

    /// From `at_ms` on, the page looks like `dom`.
    pub fn then(mut self, at_ms: u64, dom: Dom) -> Self {
        self.frames.push((Duration::from_millis(at_ms), dom));
        self.frames.sort_by_key(|(at, _)| *at);
        self
    }

    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = delay;
        self
    }

    pub fn failing(mut self, expression: &str) -> Self {
        self.failing.insert(expression.to_string());
        self
    }

    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .cloned()
            .collect()
    }

    fn current(&self) -> &Dom {
        let elapsed = self.origin.elapsed();
        self.frames
            .iter()
            .rev()
            .find(|(at, _)| *at <= elapsed)
            .map(|(_, dom)| dom)
            .unwrap_or(&self.frames[0].1)
    }

    fn element(&self, target: &ElementHandle) -> Result<MockElement, BackendError> {
        self.current()
            .get(target.expression.as_str())
            .get(target.index)
            .cloned()
            .ok_or_else(|| BackendError::StaleElement(target.to_string()))
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self) -> Result<(), BackendError> {
        self.ready = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BackendError> {
        self.calls.push("close".into());
        self.ready = false;
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.ready
    }

    async fn navigate(&mut self, url: &str) -> Result<NavigationResult, BackendError> {
        self.calls.push(format!("navigate:{}", url));
        self.url = url.to_string();
        self.page_info().await
    }

    async fn page_info(&mut self) -> Result<NavigationResult, BackendError> {
        Ok(NavigationResult {
            url: self.url.clone(),
            title: "Mock Chat".into(),
        })
    }

    async fn query(
        &mut self,
        expression: &LocatorExpression,
    ) -> Result<Vec<ElementSnapshot>, BackendError> {
        self.calls.push(format!("query:{}", expression));
        if !self.ready {
            return Err(BackendError::NotReady);
        }
        if !self.query_delay.is_zero() {
            sleep(self.query_delay).await;
        }
        if self.failing.contains(expression.as_str()) {
            return Err(BackendError::Query {
                expression: expression.to_string(),
                message: "SyntaxError: not a valid selector".into(),
            });
        }

        Ok(self
            .current()
            .get(expression.as_str())
            .iter()
            .enumerate()
            .map(|(index, e)| ElementSnapshot {
                index,
                tag: e.tag.clone(),
                text: e.text.clone(),
                visible: e.visible,
                enabled: e.enabled,
                href: e.href.clone(),
            })
            .collect())
    }

    async fn click(&mut self, target: &ElementHandle) -> Result<(), BackendError> {
        self.element(target)?;
        self.calls.push(format!("click:{}", target));
        Ok(())
    }

    async fn fill(&mut self, target: &ElementHandle, text: &str) -> Result<(), BackendError> {
        self.element(target)?;
        self.calls.push(format!("fill:{}={}", target, text));
        Ok(())
    }

    async fn type_text(
        &mut self,
        target: &ElementHandle,
        text: &str,
        _delay: Duration,
    ) -> Result<(), BackendError> {
        self.element(target)?;
        self.calls.push(format!("type:{}={}", target, text));
        Ok(())
    }

    async fn inner_text(&mut self, target: &ElementHandle) -> Result<String, BackendError> {
        Ok(self.element(target)?.text)
    }

    async fn screenshot(&mut self, full_page: bool) -> Result<Vec<u8>, BackendError> {
        if self.screenshot_fails {
            return Err(BackendError::Other("renderer crashed".into()));
        }
        self.calls.push(format!("screenshot:{}", full_page));
        Ok(b"\x89PNG mock".to_vec())
    }

    async fn press_key(&mut self, key: &str, _modifiers: &[String]) -> Result<(), BackendError> {
        self.calls.push(format!("press:{}", key));
        Ok(())
    }

    async fn upload_file(&mut self, target: &ElementHandle, file: &Path) -> Result<(), BackendError> {
        self.element(target)?;
        self.calls.push(format!("upload:{}={}", target, file.display()));
        Ok(())
    }
}

pub fn registry(source: &str) -> Arc<StrategyRegistry> {
    Arc::new(StrategyRegistry::inline(source))
}

pub fn engine(source: &str) -> Arc<ResolutionEngine> {
    Arc::new(ResolutionEngine::new(
        registry(source),
        TetherConfig::default().resolution,
    ))
}

pub fn actions(source: &str) -> (Arc<ActionExecutor>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let executor = ActionExecutor::new(engine(source), TetherConfig::default().actions, sink.clone());
    (Arc::new(executor), sink)
}
