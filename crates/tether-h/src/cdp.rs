use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tether_engine::config::schema::BrowserConfig as BrowserSettings;
use tokio::task::JoinHandle;

/// How to start Chromium.
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub headed: bool,
    /// Persistent profile. A throwaway one is created when unset.
    pub user_data_dir: Option<PathBuf>,
}

impl LaunchOptions {
    /// Settings from configuration, overridden by `HEADED` and
    /// `TETHER_USER_DATA_DIR` in the environment.
    pub fn from_config(settings: &BrowserSettings) -> Self {
        let headed = settings.headed || env_flag("HEADED");
        let user_data_dir = std::env::var("TETHER_USER_DATA_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| settings.user_data_dir.clone());
        Self {
            headed,
            user_data_dir,
        }
    }
}

pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    pub page: Page,
    user_data_dir: PathBuf,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn launch(
        options: &LaunchOptions,
    ) -> Result<Self, LaunchError> {
        let (user_data_dir, cleanup_user_data_dir) =
            resolve_user_data_dir(options.user_data_dir.as_ref())?;
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(&user_data_dir);
        if options.headed {
            builder = builder.with_head();
        }
        if let Ok(binary) = std::env::var("CHROME_BIN") {
            tracing::info!("Chromium binary from CHROME_BIN: {}", binary);
            builder = builder.chrome_executable(binary);
        }
        tracing::info!(headed = options.headed, "Starting Chromium");

        let config = builder
            .build()
            .map_err(|e| format!("invalid browser config: {}", e))?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| format!("Chromium did not start: {}", e))?;

        // The connection only makes progress while its handler is polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("CDP handler: {}", e);
                }
            }
            tracing::debug!("CDP handler finished");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;

        forward_console(&page).await?;
        accept_dialogs(&page).await?;

        Ok(Self {
            browser,
            handler_task,
            page,
            user_data_dir,
            cleanup_user_data_dir,
        })
    }

    pub async fn close(mut self) -> Result<(), LaunchError> {
        self.browser
            .close()
            .await
            .map_err(|e| format!("Error closing browser: {}", e))?;
        self.handler_task
            .await
            .map_err(|e| format!("Error awaiting handler: {}", e))?;

        if self.cleanup_user_data_dir
            && let Err(e) = std::fs::remove_dir_all(&self.user_data_dir)
        {
            tracing::debug!(
                "Failed to clean up user-data-dir {}: {}",
                self.user_data_dir.display(),
                e
            );
        }

        Ok(())
    }
}

type LaunchError = Box<dyn std::error::Error + Send + Sync>;

/// Mirrors page console output into debug logs.
async fn forward_console(page: &Page) -> Result<(), LaunchError> {
    let mut events = page
        .event_listener::<EventConsoleApiCalled>()
        .await
        .map_err(|e| format!("console subscription: {}", e))?;
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let text = event
                .args
                .iter()
                .filter_map(|arg| {
                    arg.description
                        .clone()
                        .or_else(|| arg.value.as_ref().map(ToString::to_string))
                })
                .collect::<Vec<_>>()
                .join(" ");
            tracing::debug!(kind = ?event.r#type, "page console: {}", text);
        }
    });
    Ok(())
}

/// Open dialogs stall every evaluation, so they are accepted as they appear.
async fn accept_dialogs(page: &Page) -> Result<(), LaunchError> {
    let mut events = page
        .event_listener::<EventJavascriptDialogOpening>()
        .await
        .map_err(|e| format!("dialog subscription: {}", e))?;
    let page = page.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            tracing::info!(message = %event.message, "accepting page dialog");
            if let Err(e) = page.execute(HandleJavaScriptDialogParams::new(true)).await {
                tracing::warn!("dialog left open: {}", e);
            }
        }
    });
    Ok(())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|value| is_truthy(&value))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Returns the profile directory and whether it is ours to delete on close.
fn resolve_user_data_dir(
    configured: Option<&PathBuf>,
) -> Result<(PathBuf, bool), LaunchError> {
    if let Some(path) = configured {
        std::fs::create_dir_all(path)?;
        tracing::info!("Using persistent user data dir: {}", path.display());
        return Ok((path.clone(), false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("System clock error: {}", e))?
        .as_nanos();
    let unique = format!("tether-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::info!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
