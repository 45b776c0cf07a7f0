//! Cached artwork for identified movies.
//!
//! Downloads are best effort: callers log failures and move on.

use anyhow::Context;
use async_trait::async_trait;
use shared::{ArtifactKind, DataPaths};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Failure downloading or storing an artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Storage for downloaded images, keyed by kind and id.
#[async_trait]
pub trait ArtifactCache: Send + Sync {
    fn exists(&self, kind: ArtifactKind, id: i64) -> bool;

    async fn download_and_store(
        &self,
        url: &str,
        kind: ArtifactKind,
        id: i64,
    ) -> Result<(), ArtifactError>;

    /// Remove a cached artifact. Removing a missing artifact is not an error.
    fn remove(&self, kind: ArtifactKind, id: i64) -> Result<(), ArtifactError>;
}

/// Filesystem artifact cache under the data directory
#[derive(Debug, Clone)]
pub struct FsArtifactCache {
    paths: DataPaths,
    client: reqwest::Client,
}

impl FsArtifactCache {
    /// Create a new artifact cache rooted at `paths`
    pub fn new(paths: DataPaths, timeout_seconds: u64) -> anyhow::Result<Self> {
        paths.create_dirs().with_context(|| {
            format!(
                "Failed to create artifact directories under {}",
                paths.root().display()
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        info!(root = %paths.root().display(), "Artifact cache initialized");
        Ok(Self { paths, client })
    }

    /// File backing the given artifact
    pub fn path(&self, kind: ArtifactKind, id: i64) -> PathBuf {
        self.paths.artifact(kind, id)
    }
}

#[async_trait]
impl ArtifactCache for FsArtifactCache {
    fn exists(&self, kind: ArtifactKind, id: i64) -> bool {
        self.path(kind, id).exists()
    }

    async fn download_and_store(
        &self,
        url: &str,
        kind: ArtifactKind,
        id: i64,
    ) -> Result<(), ArtifactError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ArtifactError::Download {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| ArtifactError::Download {
                url: url.to_string(),
                source,
            })?;

        // Write beside the target and rename so a partial file never counts as cached
        let path = self.path(kind, id);
        let partial = path.with_extension("part");
        let io_err = |source| ArtifactError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&partial, &bytes).await.map_err(io_err)?;
        tokio::fs::rename(&partial, &path).await.map_err(io_err)?;

        debug!(kind = %kind, id = id, bytes = bytes.len(), path = %path.display(), "Artifact stored");
        Ok(())
    }

    fn remove(&self, kind: ArtifactKind, id: i64) -> Result<(), ArtifactError> {
        let path = self.path(kind, id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(kind = %kind, id = id, "Artifact removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ArtifactError::Io { path, source }),
        }
    }
}
