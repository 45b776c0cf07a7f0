//! Batch identification sessions.
//!
//! A [`MovieIdentification`] owns one batch of file descriptors and drives
//! each through resolution and reconciliation in order, reporting progress to
//! an observer after every file. Only one batch touches the library at a
//! time; cancellation is checked before each item, so an in-flight item
//! always finishes.

use crate::observer::{IdentificationObserver, ItemOutcome, ProgressUpdate};
use crate::reconcile::{Mode, ReconciliationEngine};
use crate::resolver::CandidateResolver;
use shared::{FileDescriptor, MovieId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
}

/// Shared cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session parameters
#[derive(Debug, Clone)]
pub struct IdentificationSession {
    pub descriptors: Vec<FileDescriptor>,
    pub language: String,
    pub override_mode: bool,
    /// Movie every file is identified as when `override_mode` is set
    pub target_movie_id: MovieId,
    /// What the file was identified as before the override
    pub current_movie_id: Option<MovieId>,
}

/// Totals for a finished session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentificationStats {
    pub processed: usize,
    pub identified: usize,
    pub unidentified: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl IdentificationStats {
    fn record(&mut self, outcome: &ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Identified => self.identified += 1,
            ItemOutcome::Unidentified => self.unidentified += 1,
            ItemOutcome::Unchanged { .. } => self.unchanged += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Batch driver
pub struct MovieIdentification {
    session: IdentificationSession,
    resolver: CandidateResolver,
    engine: ReconciliationEngine,
    observer: Arc<dyn IdentificationObserver>,
    cancel: CancelHandle,
    state: SessionState,
    count: usize,
}

impl MovieIdentification {
    pub fn new(
        descriptors: Vec<FileDescriptor>,
        language: impl Into<String>,
        resolver: CandidateResolver,
        engine: ReconciliationEngine,
        observer: Arc<dyn IdentificationObserver>,
    ) -> Self {
        Self {
            session: IdentificationSession {
                descriptors,
                language: language.into(),
                override_mode: false,
                target_movie_id: MovieId::UNIDENTIFIED,
                current_movie_id: None,
            },
            resolver,
            engine,
            observer,
            cancel: CancelHandle::new(),
            state: SessionState::Idle,
            count: 0,
        }
    }

    /// Use an externally owned cancellation flag
    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Identify every file in the batch as `id`, skipping search.
    ///
    /// Non-positive ids turn override mode off.
    pub fn set_movie_id(&mut self, id: MovieId) {
        self.session.override_mode = id.is_valid();
        self.session.target_movie_id = id;
    }

    /// Record what the file was identified as before an override.
    pub fn set_current_movie_id(&mut self, id: Option<MovieId>) {
        self.session.current_movie_id = id;
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.session.language = language.into();
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Files processed so far
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn session(&self) -> &IdentificationSession {
        &self.session
    }

    fn mode(&self) -> Mode {
        if self.session.override_mode {
            Mode::Override {
                target: self.session.target_movie_id,
                previous: self.session.current_movie_id,
            }
        } else {
            Mode::Automatic
        }
    }

    fn override_id(&self) -> Option<MovieId> {
        self.session
            .override_mode
            .then_some(self.session.target_movie_id)
    }

    /// Run the batch to completion or until cancelled.
    ///
    /// A session runs once; later calls return empty stats.
    pub async fn start(&mut self) -> IdentificationStats {
        let mut stats = IdentificationStats::default();
        if self.state != SessionState::Idle {
            warn!(state = ?self.state, "Session already ran, ignoring start");
            stats.cancelled = self.state == SessionState::Cancelled;
            return stats;
        }

        let _library = self.engine.lock_library().await;

        self.state = SessionState::Running;
        let started = Instant::now();
        info!(
            files = self.session.descriptors.len(),
            override_mode = self.session.override_mode,
            language = %self.session.language,
            "Identification started"
        );

        let mode = self.mode();
        let override_id = self.override_id();
        let descriptors = std::mem::take(&mut self.session.descriptors);

        for descriptor in &descriptors {
            if self.cancel.is_cancelled() {
                warn!(processed = self.count, "Identification cancelled");
                self.state = SessionState::Cancelled;
                break;
            }

            self.count += 1;

            let resolution = self
                .resolver
                .resolve(descriptor, override_id, &self.session.language)
                .await;

            let outcome = match self.engine.reconcile(descriptor, &resolution, mode).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        path = %descriptor.path.display(),
                        error = %e,
                        "Failed to update library"
                    );
                    ItemOutcome::Failed {
                        message: format!("{:#}", e),
                    }
                }
            };

            let (title, movie_id) = match &outcome {
                ItemOutcome::Identified => (resolution.record.title.clone(), resolution.record.id),
                ItemOutcome::Unchanged { existing } => (descriptor.title.clone(), *existing),
                _ => (descriptor.title.clone(), MovieId::UNIDENTIFIED),
            };

            stats.record(&outcome);
            let changed = outcome.changed_library();

            self.observer.on_movie_added(&ProgressUpdate {
                path: descriptor.path_key(),
                title,
                movie_id,
                count: self.count,
                outcome,
            });
            if changed {
                self.observer.on_library_changed();
            }
        }

        self.session.descriptors = descriptors;

        if self.state == SessionState::Running {
            self.state = SessionState::Completed;
        }
        stats.cancelled = self.state == SessionState::Cancelled;

        info!(
            processed = stats.processed,
            identified = stats.identified,
            unidentified = stats.unidentified,
            unchanged = stats.unchanged,
            failed = stats.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Identification finished"
        );

        stats
    }
}
