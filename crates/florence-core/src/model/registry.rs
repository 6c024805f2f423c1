//! Model registry: resolves bundle files from the local cache or the hub.
//!
//! Files live under `{model_dir}/{owner}--{name}/{remote_path}`. A missing file
//! is fetched from `{endpoint}/{repo}/resolve/{revision}/{remote_path}` unless
//! the registry is offline.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::error::{CaptionError, CaptionResult};

/// Bytes between progress log lines.
const PROGRESS_INTERVAL: u64 = 50 * 1024 * 1024;

/// Resolves model files for one repository.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    endpoint: String,
    repo: String,
    revision: String,
    cache_dir: PathBuf,
    offline: bool,
}

impl ModelRegistry {
    pub fn new(
        endpoint: impl Into<String>,
        repo: impl Into<String>,
        revision: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            repo: repo.into(),
            revision: revision.into(),
            cache_dir: cache_dir.into(),
            offline: false,
        }
    }

    /// Build a registry from the `[model]` section and the resolved model dir.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.model.endpoint,
            &config.model.repo,
            &config.model.revision,
            config.model_dir(),
        )
        .with_offline(config.model.offline)
    }

    /// Never touch the network; missing files become load errors.
    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    /// Local directory holding this repository's files.
    pub fn repo_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo.replace('/', "--"))
    }

    /// Where `remote_path` is (or would be) cached locally.
    pub fn local_path(&self, remote_path: &str) -> PathBuf {
        self.repo_dir().join(remote_path)
    }

    pub fn is_cached(&self, remote_path: &str) -> bool {
        self.local_path(remote_path).exists()
    }

    /// Download URL for a file in this repository.
    pub fn url(&self, remote_path: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint.trim_end_matches('/'),
            self.repo,
            self.revision,
            remote_path
        )
    }

    /// Return the local path for `remote_path`, fetching it first if needed.
    pub fn resolve(&self, remote_path: &str) -> CaptionResult<PathBuf> {
        let local = self.local_path(remote_path);
        if local.exists() {
            tracing::debug!("Using cached {} at {:?}", remote_path, local);
            return Ok(local);
        }

        if self.offline {
            return Err(self.load_error(format!(
                "{remote_path} not found at {local:?} and the registry is offline. \
                 Run `florence models download` first."
            )));
        }

        self.fetch(remote_path)
    }

    /// Download `remote_path` into the cache, replacing any existing copy.
    pub fn fetch(&self, remote_path: &str) -> CaptionResult<PathBuf> {
        let dest = self.local_path(remote_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| self.load_error(format!("Cannot create {parent:?}: {e}")))?;
        }

        let url = self.url(remote_path);
        tracing::info!("Downloading {}...", remote_path);
        tracing::info!("  Source: {}", url);
        tracing::info!("  Destination: {:?}", dest);

        let client = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| self.load_error(format!("Failed to build HTTP client: {e}")))?;

        let size = download_file(&client, &url, &dest).map_err(|e| self.load_error(e))?;
        tracing::info!(
            "  {} complete ({:.1} MB)",
            remote_path,
            size as f64 / (1024.0 * 1024.0)
        );

        Ok(dest)
    }

    fn load_error(&self, message: String) -> CaptionError {
        CaptionError::ModelLoad {
            model: self.repo.clone(),
            message,
        }
    }
}

/// Stream a URL into `dest` through a `.part` file.
///
/// The partial file is removed on any failure so the next run starts clean.
fn download_file(
    client: &reqwest::blocking::Client,
    url: &str,
    dest: &Path,
) -> Result<u64, String> {
    let part = partial_path(dest);
    let result = stream_to(client, url, &part).and_then(|size| {
        std::fs::rename(&part, dest)
            .map(|_| size)
            .map_err(|e| format!("Failed to move download into place: {e}"))
    });

    if result.is_err() {
        let _ = std::fs::remove_file(&part);
    }
    result
}

fn stream_to(client: &reqwest::blocking::Client, url: &str, part: &Path) -> Result<u64, String> {
    let mut response = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| format!("Download failed: {e}"))?;

    let total_size = response.content_length();
    if let Some(size) = total_size {
        tracing::info!("  Size: {:.1} MB", size as f64 / (1024.0 * 1024.0));
    }

    let mut file = File::create(part).map_err(|e| format!("Cannot create {part:?}: {e}"))?;
    let mut buf = vec![0u8; 1024 * 1024];
    let mut downloaded: u64 = 0;

    loop {
        let n = response
            .read(&mut buf)
            .map_err(|e| format!("Download interrupted: {e}"))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .map_err(|e| format!("Write failed: {e}"))?;
        downloaded += n as u64;

        if let Some(total) = total_size {
            if downloaded % PROGRESS_INTERVAL < n as u64 {
                tracing::info!(
                    "  Progress: {:.0}%",
                    downloaded as f64 / total as f64 * 100.0
                );
            }
        }
    }

    file.flush().map_err(|e| format!("Flush failed: {e}"))?;
    Ok(downloaded)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}
