use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tether_e::{DriverOptions, WebDriverBackend};
use tether_engine::backend::Backend;
use tether_engine::cli::{self, FileOptions, OutputHandlers, ReplOptions};
use tether_engine::config::{ConfigLoader, TetherConfig};
use tether_engine::executor::CommandExecutor;
use tether_h::{HeadlessBackend, LaunchOptions};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether", version, about = "Drive a chat web UI through a resilient selector registry")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Command file to execute (non-interactive mode)
    #[arg(long, global = true)]
    file: Option<PathBuf>,

    /// Config file (default: ./tether.yaml, then ~/.tether/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Selector registry, overriding the configured path
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Mode {
    /// Chromium via CDP
    Headless {
        /// Show the browser window
        #[arg(long)]
        visible: bool,
    },
    /// Any browser behind an already running WebDriver server
    Embedded {
        /// WebDriver URL (default: $TETHER_WEBDRIVER_URL or http://localhost:9515)
        #[arg(long)]
        driver_url: Option<String>,
    },
}

async fn load_config(args: &Args) -> Result<TetherConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => ConfigLoader::load_from(path).await?,
        None => ConfigLoader::load_default().await?,
    };
    if let Some(registry) = &args.registry {
        config.registry.path = registry.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries command output only.
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = load_config(&args).await?;
    info!("Using selector registry {}", config.registry.path.display());

    let mut backend: Box<dyn Backend> = match &args.mode {
        Mode::Headless { visible } => {
            let mut options = LaunchOptions::from_config(&config.browser);
            options.headed |= *visible;
            Box::new(HeadlessBackend::with_options(options))
        }
        Mode::Embedded { driver_url } => Box::new(WebDriverBackend::new(
            DriverOptions::from_config(driver_url.clone(), &config.browser),
        )),
    };

    if let Err(e) = backend.launch().await {
        eprintln!("Failed to launch backend: {}", e);
        return Err(e.into());
    }

    if let Some(url) = &config.browser.start_url
        && let Err(e) = backend.navigate(url).await
    {
        warn!("Could not open start URL {}: {}", url, e);
    }

    let mut executor = CommandExecutor::new(&config);
    let output = OutputHandlers::default();
    let repl_options = ReplOptions {
        banner_lines: &[
            "Browser ready. Commands take an optional JSON object of arguments, e.g.",
            "  send_message {\"message\": \"Hello\"}",
            "  click {\"path\": \"chat.sendButton\"}",
            "  open_project {\"project\": \"Research\"}",
            "Type 'exit' or 'quit' to close.",
        ],
        prompt: "> ",
        exit_commands: &["exit", "quit"],
        handle_ctrl_c: true,
    };

    let result = match &args.file {
        Some(path) => {
            cli::run_file(
                &mut *backend,
                &mut executor,
                output,
                path,
                FileOptions::default(),
            )
            .await
            .map_err(|e| {
                eprintln!("Error executing file {}: {}", path.display(), e);
                e
            })
        }
        None => cli::run_repl(&mut *backend, &mut executor, output, repl_options)
            .await
            .map_err(|e| {
                eprintln!("Error during session: {}", e);
                e
            }),
    };

    if !executor.is_closed() {
        backend.close().await?;
    }
    result
}
