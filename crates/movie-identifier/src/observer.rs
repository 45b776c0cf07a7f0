//! Progress reporting for identification batches.

use shared::MovieId;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// What happened to one file
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    /// Matched and stored under a real movie id
    Identified,
    /// Nothing matched; the file is mapped to [`MovieId::UNIDENTIFIED`]
    Unidentified,
    /// Automatic run found the path already mapped to another movie and left it alone
    Unchanged { existing: MovieId },
    /// The item was aborted; the rest of the batch continues
    Failed { message: String },
}

impl ItemOutcome {
    /// Whether the library was written for this item
    pub fn changed_library(&self) -> bool {
        matches!(self, ItemOutcome::Identified | ItemOutcome::Unidentified)
    }
}

/// Reported once per processed file, in processing order
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub path: String,
    pub title: String,
    pub movie_id: MovieId,
    /// Files processed so far in this session, this one included
    pub count: usize,
    pub outcome: ItemOutcome,
}

/// Events forwarded by [`ChannelObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum IdentificationEvent {
    MovieAdded(ProgressUpdate),
    LibraryChanged,
}

/// Receives batch progress synchronously from the driver.
pub trait IdentificationObserver: Send + Sync {
    fn on_movie_added(&self, update: &ProgressUpdate);

    /// Called after each item that wrote to the library.
    fn on_library_changed(&self) {}
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<IdentificationEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<IdentificationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: IdentificationEvent) {
        // The receiver going away only means nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl IdentificationObserver for ChannelObserver {
    fn on_movie_added(&self, update: &ProgressUpdate) {
        self.send(IdentificationEvent::MovieAdded(update.clone()));
    }

    fn on_library_changed(&self) {
        self.send(IdentificationEvent::LibraryChanged);
    }
}

/// Logs every update
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl IdentificationObserver for LoggingObserver {
    fn on_movie_added(&self, update: &ProgressUpdate) {
        match &update.outcome {
            ItemOutcome::Failed { message } => warn!(
                count = update.count,
                path = %update.path,
                error = %message,
                "Identification failed"
            ),
            outcome => info!(
                count = update.count,
                path = %update.path,
                title = %update.title,
                movie_id = %update.movie_id,
                outcome = ?outcome,
                "Movie processed"
            ),
        }
    }
}
