//! Movie identification library.
//!
//! Turns video files into movie library entries: infers a title and year from
//! each filename, looks the movie up on TMDb through a fallback chain of
//! searches, and reconciles the result into the SQLite library while caching
//! poster and backdrop artwork.

pub mod api;
pub mod artifacts;
pub mod descriptor;
pub mod identification;
pub mod lookup;
pub mod observer;
pub mod reconcile;
pub mod resolver;
pub mod scan;

#[cfg(test)]
mod testing;

pub use api::{RateLimiter, TmdbClient};
pub use artifacts::{ArtifactCache, ArtifactError, FsArtifactCache};
pub use identification::{
    CancelHandle, IdentificationSession, IdentificationStats, MovieIdentification, SessionState,
};
pub use lookup::{LookupClient, LookupError};
pub use observer::{
    ChannelObserver, IdentificationEvent, IdentificationObserver, ItemOutcome, LoggingObserver,
    ProgressUpdate,
};
pub use reconcile::{ImageUrls, Mode, ReconciliationEngine};
pub use resolver::{CandidateResolver, Resolution, ResolutionSource, Strategy};
pub use scan::{describe_file, scan_directory};
