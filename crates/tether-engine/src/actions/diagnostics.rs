use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// A persisted piece of evidence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artifact {
    pub path: PathBuf,
    pub timestamp: DateTime<Utc>,
}

const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Where screenshots go.
#[async_trait]
pub trait DiagnosticsSink: Send + Sync {
    async fn persist(&self, label: &str, png: &[u8]) -> std::io::Result<Artifact>;
}

/// Writes `<dir>/<label>_<YYYYmmdd_HHMMSS_mmm>.png`.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DiagnosticsSink for DirectorySink {
    async fn persist(&self, label: &str, png: &[u8]) -> std::io::Result<Artifact> {
        let timestamp = Utc::now();
        let stem = format!(
            "{}_{}",
            sanitize_label(label),
            timestamp.format("%Y%m%d_%H%M%S_%3f")
        );
        tokio::fs::create_dir_all(&self.dir).await?;

        // Same label within the same millisecond gets a numeric suffix.
        let mut attempt = 0u32;
        let (path, mut file) = loop {
            let filename = match attempt {
                0 => format!("{}.png", stem),
                n => format!("{}_{}.png", stem, n),
            };
            let path = self.dir.join(filename);
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };
        file.write_all(png).await?;
        file.flush().await?;
        debug!(path = %path.display(), size_kb = png.len() / 1024, "screenshot saved");

        Ok(Artifact { path, timestamp })
    }
}

/// Keeps screenshots in memory, for embedders that ship evidence elsewhere.
#[derive(Default)]
pub struct MemorySink {
    captured: Mutex<Vec<(String, Vec<u8>, Artifact)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Labels captured so far, oldest first.
    pub async fn labels(&self) -> Vec<String> {
        self.captured
            .lock()
            .await
            .iter()
            .map(|(label, _, _)| label.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.captured.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.captured.lock().await.is_empty()
    }

    pub async fn bytes(&self, label: &str) -> Option<Vec<u8>> {
        self.captured
            .lock()
            .await
            .iter()
            .find(|(l, _, _)| l == label)
            .map(|(_, png, _)| png.clone())
    }
}

#[async_trait]
impl DiagnosticsSink for MemorySink {
    async fn persist(&self, label: &str, png: &[u8]) -> std::io::Result<Artifact> {
        let mut captured = self.captured.lock().await;
        let artifact = Artifact {
            path: PathBuf::from(format!("memory/{}/{}.png", captured.len(), sanitize_label(label))),
            timestamp: Utc::now(),
        };
        captured.push((label.to_string(), png.to_vec(), artifact.clone()));
        Ok(artifact)
    }
}

fn sanitize_label(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "screenshot".to_string()
    } else {
        cleaned
    }
}
