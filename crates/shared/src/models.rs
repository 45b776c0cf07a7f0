//! Data models for the identification pipeline.
//!
//! This module defines the local file descriptors produced by a library scan,
//! the records returned by the metadata provider, and the rows persisted in
//! the movie library.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a movie in the remote metadata database.
///
/// [`MovieId::UNIDENTIFIED`] marks files that could not be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl MovieId {
    /// Reserved id for "no match found / not yet identified".
    pub const UNIDENTIFIED: MovieId = MovieId(-1);

    pub fn is_unidentified(self) -> bool {
        self == Self::UNIDENTIFIED
    }

    /// Only positive ids refer to real provider entries.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MovieId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(MovieId)
            .map_err(|e| anyhow::anyhow!("Invalid movie id {:?}: {}", s, e))
    }
}

/// One local video file to be identified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Full path of the video file
    pub path: PathBuf,
    /// IMDb-style cross reference embedded in the file or folder name
    pub external_id: Option<String>,
    /// Title inferred from the file name
    pub title: String,
    /// Release year inferred from the file or folder name
    pub year: Option<i32>,
    /// Cleaned name of the containing folder
    pub parent_folder: String,
}

impl FileDescriptor {
    /// Path as stored in the filepath mapping table.
    pub fn path_key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Year usable as a search filter; negative years count as unknown.
    pub fn search_year(&self) -> Option<i32> {
        self.year.filter(|y| *y >= 0)
    }
}

/// Lightweight search hit from the metadata provider.
///
/// Ordering of a result list is the provider's relevance rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: MovieId,
    pub title: String,
    pub release_date: Option<String>,
}

/// Collection (franchise) a movie belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub poster_path: Option<String>,
}

/// Full canonical record of a matched movie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: MovieId,
    pub title: String,
    pub overview: String,
    pub imdb_id: Option<String>,
    pub rating: f64,
    pub tagline: String,
    pub release_date: String,
    pub runtime: u32,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub collection: Option<Collection>,
}

impl MetadataRecord {
    /// Empty record standing in for a file nothing matched.
    pub fn unidentified() -> Self {
        Self {
            id: MovieId::UNIDENTIFIED,
            title: String::new(),
            overview: String::new(),
            imdb_id: None,
            rating: 0.0,
            tagline: String::new(),
            release_date: String::new(),
            runtime: 0,
            poster_path: None,
            backdrop_path: None,
            collection: None,
        }
    }

    pub fn is_identified(&self) -> bool {
        !self.id.is_unidentified()
    }
}

/// Persistent path -> movie id association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilepathMapping {
    pub path: String,
    pub movie_id: MovieId,
}

/// Movie row stored in the library.
///
/// Fields the identification step cannot know yet (certification, trailer,
/// genres, cast) are stored empty and filled in by later enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMovie {
    pub id: MovieId,
    pub title: String,
    pub plot: String,
    pub imdb_id: String,
    pub rating: f64,
    pub tagline: String,
    pub release_date: String,
    pub certification: String,
    pub runtime: u32,
    pub trailer: String,
    pub genres: String,
    pub cast: String,
    pub collection_name: String,
    pub collection_id: String,
    pub favourite: bool,
    pub to_watch: bool,
    pub has_watched: bool,
    pub updated_at: DateTime<Utc>,
}

impl PersistedMovie {
    /// Build the row written for a freshly identified record.
    pub fn from_record(record: &MetadataRecord, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: record.id,
            title: record.title.clone(),
            plot: record.overview.clone(),
            imdb_id: record.imdb_id.clone().unwrap_or_default(),
            rating: record.rating,
            tagline: record.tagline.clone(),
            release_date: record.release_date.clone(),
            certification: String::new(),
            runtime: record.runtime,
            trailer: String::new(),
            genres: String::new(),
            cast: String::new(),
            collection_name: record
                .collection
                .as_ref()
                .map(|c| c.name.clone())
                .unwrap_or_default(),
            collection_id: record
                .collection
                .as_ref()
                .map(|c| c.id.to_string())
                .unwrap_or_default(),
            favourite: false,
            to_watch: false,
            has_watched: false,
            updated_at,
        }
    }
}

/// Kind of cached artifact downloaded for a movie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Poster,
    Backdrop,
    CollectionPoster,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Poster => write!(f, "poster"),
            ArtifactKind::Backdrop => write!(f, "backdrop"),
            ArtifactKind::CollectionPoster => write!(f, "collection_poster"),
        }
    }
}
