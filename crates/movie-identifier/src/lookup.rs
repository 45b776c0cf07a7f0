//! Lookup client contract for the remote metadata provider.
//!
//! Not-found is never an error: searches return an empty list and
//! [`LookupClient::fetch_full`] returns `Ok(None)`. Errors are reserved for
//! transport and protocol failures, which callers log and treat as empty.

use async_trait::async_trait;
use shared::{CandidateRecord, MetadataRecord, MovieId};
use thiserror::Error;

/// Transport or protocol failure talking to the metadata provider.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no TMDb API key configured")]
    MissingApiKey,
}

/// Calls against the external metadata provider.
#[async_trait]
pub trait LookupClient: Send + Sync {
    /// Find movies by an external cross-reference id (IMDb id).
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CandidateRecord>, LookupError>;

    /// Free-text search, optionally restricted to a release year.
    /// The first element is the provider's best match.
    async fn search_by_text(
        &self,
        text: &str,
        year: Option<i32>,
    ) -> Result<Vec<CandidateRecord>, LookupError>;

    /// Hydrate the full record for a movie id in the given language.
    async fn fetch_full(
        &self,
        id: MovieId,
        language: &str,
    ) -> Result<Option<MetadataRecord>, LookupError>;
}
