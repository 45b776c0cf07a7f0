//! File path utilities for cached artifacts.
//!
//! Posters, backdrops and collection posters are stored under the data
//! directory, one file per movie (or collection) id.

use crate::models::ArtifactKind;
use std::path::{Path, PathBuf};

/// File path manager for data files
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Create a new DataPaths with the given root directory
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Get the root data directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for movie posters
    pub fn thumbs_dir(&self) -> PathBuf {
        self.root.join("thumbs")
    }

    /// Directory for movie backdrops
    pub fn backdrops_dir(&self) -> PathBuf {
        self.root.join("backdrops")
    }

    /// Directory for collection posters
    pub fn collections_dir(&self) -> PathBuf {
        self.root.join("collections")
    }

    /// Poster file for a movie
    pub fn movie_thumb(&self, id: i64) -> PathBuf {
        self.thumbs_dir().join(format!("{}.jpg", id))
    }

    /// Backdrop file for a movie
    pub fn movie_backdrop(&self, id: i64) -> PathBuf {
        self.backdrops_dir().join(format!("{}_bg.jpg", id))
    }

    /// Poster file for a collection
    pub fn collection_thumb(&self, id: i64) -> PathBuf {
        self.collections_dir().join(format!("{}.jpg", id))
    }

    /// File backing an artifact of the given kind
    pub fn artifact(&self, kind: ArtifactKind, id: i64) -> PathBuf {
        match kind {
            ArtifactKind::Poster => self.movie_thumb(id),
            ArtifactKind::Backdrop => self.movie_backdrop(id),
            ArtifactKind::CollectionPoster => self.collection_thumb(id),
        }
    }

    /// Create all artifact directories
    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.thumbs_dir())?;
        std::fs::create_dir_all(self.backdrops_dir())?;
        std::fs::create_dir_all(self.collections_dir())?;
        Ok(())
    }
}
