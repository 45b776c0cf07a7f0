//! TMDb API client with rate limiting and retry logic.

use super::rate_limiter::RateLimiter;
use super::types::*;
use crate::lookup::{LookupClient, LookupError};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::config::TmdbConfig;
use shared::{CandidateRecord, MetadataRecord, MovieId};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

/// TMDb API v3 client
#[derive(Debug)]
pub struct TmdbClient {
    /// HTTP client
    client: Client,
    /// Base URL for the API
    base_url: String,
    /// v3 API key
    api_key: String,
    /// Rate limiter shared by all requests of this client
    rate_limiter: Mutex<RateLimiter>,
    /// Maximum retries for failed requests
    max_retries: u32,
    /// Base delay for retry (exponential backoff)
    retry_delay_ms: u64,
}

impl TmdbClient {
    /// Create a new TMDb client from the `[tmdb]` config section
    pub fn new(config: &TmdbConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("movie-identifier/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            rate_limiter: Mutex::new(RateLimiter::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.requests_per_minute,
            )),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    /// Make a GET request with rate limiting and retry logic.
    ///
    /// A 404 is returned as `Ok(None)`.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, LookupError> {
        if self.api_key.is_empty() {
            return Err(LookupError::MissingApiKey);
        }

        let url = format!("{}{}", self.base_url, endpoint);

        let mut attempt = 0;
        loop {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
                debug!(
                    url = %url,
                    attempt = attempt + 1,
                    minute_requests = limiter.current_minute_count(),
                    "Making API request"
                );
            }

            let result = self
                .client
                .get(&url)
                .query(&[("api_key", self.api_key.as_str())])
                .query(query)
                .send()
                .await;

            let retryable = match result {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body = response.text().await.map_err(|source| {
                            LookupError::Transport {
                                url: url.clone(),
                                source,
                            }
                        })?;
                        let data = serde_json::from_str::<T>(&body).map_err(|source| {
                            warn!(url = %url, error = %source, "Failed to parse response");
                            LookupError::Decode {
                                url: url.clone(),
                                source,
                            }
                        })?;
                        debug!(url = %url, "Request successful");
                        return Ok(Some(data));
                    }

                    if status == StatusCode::NOT_FOUND {
                        debug!(url = %url, "Resource not found");
                        return Ok(None);
                    }

                    let message = response
                        .json::<TmdbStatus>()
                        .await
                        .ok()
                        .and_then(|s| s.status_message)
                        .unwrap_or_default();
                    warn!(url = %url, status = %status, message = %message, "Request failed");

                    let error = LookupError::Status {
                        url: url.clone(),
                        status: status.as_u16(),
                    };
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        error
                    } else {
                        return Err(error);
                    }
                }
                Err(source) => {
                    warn!(url = %url, error = %source, "Request error");
                    LookupError::Transport {
                        url: url.clone(),
                        source,
                    }
                }
            };

            if attempt >= self.max_retries {
                return Err(retryable);
            }

            let delay = self.backoff(attempt);
            debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl LookupClient for TmdbClient {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CandidateRecord>, LookupError> {
        debug!(external_id = external_id, "Looking up movie by external id");
        let response: Option<FindResponse> = self
            .get(
                &format!("/find/{}", external_id),
                &[("external_source", "imdb_id".to_string())],
            )
            .await?;

        Ok(response
            .map(|r| r.movie_results.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }

    async fn search_by_text(
        &self,
        text: &str,
        year: Option<i32>,
    ) -> Result<Vec<CandidateRecord>, LookupError> {
        debug!(query = text, year = ?year, "Searching movies");
        let mut query = vec![("query", text.to_string())];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }

        let response: Option<SearchResponse> = self.get("/search/movie", &query).await?;

        Ok(response
            .map(|r| r.results.into_iter().map(Into::into).collect())
            .unwrap_or_default())
    }

    async fn fetch_full(
        &self,
        id: MovieId,
        language: &str,
    ) -> Result<Option<MetadataRecord>, LookupError> {
        debug!(movie_id = %id, language = language, "Fetching movie details");
        let details: Option<MovieDetails> = self
            .get(
                &format!("/movie/{}", id),
                &[("language", language.to_string())],
            )
            .await?;

        Ok(details.map(Into::into))
    }
}
