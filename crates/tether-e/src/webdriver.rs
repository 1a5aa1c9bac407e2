use fantoccini::{Client, ClientBuilder};
use serde_json::{Map, Value, json};
use std::path::PathBuf;
use tether_engine::config::schema::BrowserConfig;

/// Where chromedriver listens unless told otherwise.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Session settings for an externally started driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub url: String,
    pub headed: bool,
    pub user_data_dir: Option<PathBuf>,
    pub chrome_binary: Option<String>,
}

impl DriverOptions {
    /// `TETHER_WEBDRIVER_URL` and `CHROME_BIN` from the environment, the rest from config.
    pub fn from_config(url: Option<String>, settings: &BrowserConfig) -> Self {
        let url = url
            .or_else(|| std::env::var("TETHER_WEBDRIVER_URL").ok())
            .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string());
        Self {
            url,
            headed: settings.headed,
            user_data_dir: settings.user_data_dir.clone(),
            chrome_binary: std::env::var("CHROME_BIN").ok(),
        }
    }

    /// W3C capabilities for a Chromium-family session.
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut args = Vec::new();
        if !self.headed {
            args.push("--headless=new".to_string());
        }
        if let Some(dir) = &self.user_data_dir {
            args.push(format!("--user-data-dir={}", dir.display()));
        }

        let mut chrome = Map::new();
        chrome.insert("args".into(), json!(args));
        if let Some(binary) = &self.chrome_binary {
            chrome.insert("binary".into(), json!(binary));
        }

        let mut caps = Map::new();
        caps.insert("goog:chromeOptions".into(), Value::Object(chrome));
        caps.insert("unhandledPromptBehavior".into(), json!("accept"));
        caps
    }
}

pub struct WebDriverClient {
    pub client: Client,
}

impl WebDriverClient {
    pub async fn connect(
        url: &str,
        capabilities: Map<String, Value>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = ClientBuilder::native()
            .capabilities(capabilities)
            .connect(url)
            .await
            .map_err(|e| format!("Failed to connect to WebDriver at {}: {}", url, e))?;

        Ok(Self { client })
    }

    pub async fn close(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.client
            .close()
            .await
            .map_err(|e| format!("Failed to close session: {}", e))?;
        Ok(())
    }
}
