//! TMDb API v3 response types.
//!
//! These types represent the JSON responses from the TMDb API.

use serde::{Deserialize, Serialize};
use shared::{CandidateRecord, Collection, MetadataRecord, MovieId};

/// Response of `/find/{external_id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindResponse {
    #[serde(default)]
    pub movie_results: Vec<MovieResult>,
}

/// Response of `/search/movie`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub results: Vec<MovieResult>,
    #[serde(default)]
    pub total_results: u32,
}

/// Search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieResult {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<String>,
    pub popularity: Option<f64>,
}

/// Response of `/movie/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieDetails {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    pub overview: Option<String>,
    pub imdb_id: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    pub tagline: Option<String>,
    pub release_date: Option<String>,
    pub runtime: Option<u32>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    pub belongs_to_collection: Option<CollectionRef>,
}

/// Collection reference embedded in movie details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRef {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
}

/// Error body returned by TMDb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbStatus {
    pub status_code: Option<i32>,
    pub status_message: Option<String>,
}

impl From<MovieResult> for CandidateRecord {
    fn from(result: MovieResult) -> Self {
        Self {
            id: MovieId(result.id),
            title: result.title,
            release_date: result.release_date.filter(|d| !d.is_empty()),
        }
    }
}

impl From<MovieDetails> for MetadataRecord {
    fn from(details: MovieDetails) -> Self {
        Self {
            id: MovieId(details.id),
            title: details.title,
            overview: details.overview.unwrap_or_default(),
            imdb_id: details.imdb_id.filter(|id| !id.is_empty()),
            rating: details.vote_average,
            tagline: details.tagline.unwrap_or_default(),
            release_date: details.release_date.unwrap_or_default(),
            runtime: details.runtime.unwrap_or(0),
            poster_path: details.poster_path.filter(|p| !p.is_empty()),
            backdrop_path: details.backdrop_path.filter(|p| !p.is_empty()),
            collection: details.belongs_to_collection.map(|c| Collection {
                id: c.id,
                name: c.name,
                poster_path: c.poster_path.filter(|p| !p.is_empty()),
            }),
        }
    }
}
