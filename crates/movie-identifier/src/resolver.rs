//! Candidate resolution: one file descriptor to zero-or-one metadata record.
//!
//! Without an override the resolver walks [`Strategy::CHAIN`] and stops at
//! the first step that returns candidates; the top-ranked candidate is then
//! hydrated with [`LookupClient::fetch_full`]. With an override the chain is
//! skipped and the override id is hydrated directly. Provider failures never
//! escape: a failed step counts as empty and an exhausted chain yields
//! [`MetadataRecord::unidentified`].

use crate::lookup::{LookupClient, LookupError};
use shared::{CandidateRecord, FileDescriptor, MetadataRecord, MovieId};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One search step of the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ExternalId,
    TitleWithYear,
    Title,
    FolderWithYear,
    Folder,
}

impl Strategy {
    /// Steps in the order they are tried
    pub const CHAIN: [Strategy; 5] = [
        Strategy::ExternalId,
        Strategy::TitleWithYear,
        Strategy::Title,
        Strategy::FolderWithYear,
        Strategy::Folder,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::ExternalId => "external_id",
            Strategy::TitleWithYear => "title_with_year",
            Strategy::Title => "title",
            Strategy::FolderWithYear => "folder_with_year",
            Strategy::Folder => "folder",
        }
    }

    /// Query this step would run, or `None` if the descriptor lacks its input.
    pub fn query<'a>(&self, descriptor: &'a FileDescriptor) -> Option<Query<'a>> {
        let text = |s: &'a str| Some(s.trim()).filter(|s| !s.is_empty());

        match self {
            Strategy::ExternalId => descriptor
                .external_id
                .as_deref()
                .and_then(text)
                .map(Query::ExternalId),
            Strategy::TitleWithYear => Some(Query::Text {
                text: text(descriptor.title.as_str())?,
                year: Some(descriptor.search_year()?),
            }),
            Strategy::Title => Some(Query::Text {
                text: text(descriptor.title.as_str())?,
                year: None,
            }),
            Strategy::FolderWithYear => Some(Query::Text {
                text: text(descriptor.parent_folder.as_str())?,
                year: Some(descriptor.search_year()?),
            }),
            Strategy::Folder => Some(Query::Text {
                text: text(descriptor.parent_folder.as_str())?,
                year: None,
            }),
        }
    }
}

/// Provider call made by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query<'a> {
    ExternalId(&'a str),
    Text { text: &'a str, year: Option<i32> },
}

/// Result of running one step
#[derive(Debug)]
pub enum StepOutcome {
    Matched(Vec<CandidateRecord>),
    Empty,
    Failed(LookupError),
}

impl From<Result<Vec<CandidateRecord>, LookupError>> for StepOutcome {
    fn from(result: Result<Vec<CandidateRecord>, LookupError>) -> Self {
        match result {
            Ok(candidates) if candidates.is_empty() => StepOutcome::Empty,
            Ok(candidates) => StepOutcome::Matched(candidates),
            Err(e) => StepOutcome::Failed(e),
        }
    }
}

/// How a resolution was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// Hydrated from the session's override id
    Override,
    /// The override id could not be fetched
    OverrideFailed,
    /// Top candidate of the given step
    Search(Strategy),
    /// No step matched, or the match could not be hydrated
    Unidentified,
}

/// A record plus how it was found
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub record: MetadataRecord,
    pub source: ResolutionSource,
}

impl Resolution {
    fn unidentified(source: ResolutionSource) -> Self {
        Self {
            record: MetadataRecord::unidentified(),
            source,
        }
    }
}

/// Runs the fallback chain against a lookup client
#[derive(Clone)]
pub struct CandidateResolver {
    lookup: Arc<dyn LookupClient>,
}

impl std::fmt::Debug for CandidateResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateResolver").finish_non_exhaustive()
    }
}

impl CandidateResolver {
    pub fn new(lookup: Arc<dyn LookupClient>) -> Self {
        Self { lookup }
    }

    /// Resolve one descriptor, bypassing search when `override_id` is set.
    pub async fn resolve(
        &self,
        descriptor: &FileDescriptor,
        override_id: Option<MovieId>,
        language: &str,
    ) -> Resolution {
        if let Some(id) = override_id {
            return match self.hydrate(id, language).await {
                Some(record) => Resolution {
                    record,
                    source: ResolutionSource::Override,
                },
                None => {
                    warn!(
                        path = %descriptor.path.display(),
                        movie_id = %id,
                        "Override movie could not be fetched"
                    );
                    Resolution::unidentified(ResolutionSource::OverrideFailed)
                }
            };
        }

        let Some((strategy, candidate)) = self.search(descriptor).await else {
            info!(path = %descriptor.path.display(), "No candidates found");
            return Resolution::unidentified(ResolutionSource::Unidentified);
        };

        match self.hydrate(candidate.id, language).await {
            Some(record) => Resolution {
                record,
                source: ResolutionSource::Search(strategy),
            },
            None => Resolution::unidentified(ResolutionSource::Unidentified),
        }
    }

    /// Walk the chain and return the top candidate of the first step that matched.
    pub async fn search(&self, descriptor: &FileDescriptor) -> Option<(Strategy, CandidateRecord)> {
        for strategy in Strategy::CHAIN {
            let Some(query) = strategy.query(descriptor) else {
                continue;
            };

            match self.run(query).await {
                StepOutcome::Matched(candidates) => {
                    let best = candidates.into_iter().next()?;
                    debug!(
                        path = %descriptor.path.display(),
                        strategy = strategy.as_str(),
                        movie_id = %best.id,
                        title = %best.title,
                        "Candidate found"
                    );
                    return Some((strategy, best));
                }
                StepOutcome::Empty => {
                    debug!(strategy = strategy.as_str(), "No candidates, falling back");
                }
                StepOutcome::Failed(e) => {
                    warn!(
                        path = %descriptor.path.display(),
                        strategy = strategy.as_str(),
                        error = %e,
                        "Lookup failed, falling back"
                    );
                }
            }
        }

        None
    }

    async fn run(&self, query: Query<'_>) -> StepOutcome {
        match query {
            Query::ExternalId(id) => self.lookup.find_by_external_id(id).await.into(),
            Query::Text { text, year } => self.lookup.search_by_text(text, year).await.into(),
        }
    }

    async fn hydrate(&self, id: MovieId, language: &str) -> Option<MetadataRecord> {
        match self.lookup.fetch_full(id, language).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => {
                warn!(movie_id = %id, "Movie not found by provider");
                None
            }
            Err(e) => {
                warn!(movie_id = %id, error = %e, "Failed to fetch movie");
                None
            }
        }
    }
}
