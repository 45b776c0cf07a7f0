//! Fakes shared by the unit tests of this crate.

use crate::artifacts::{ArtifactCache, ArtifactError};
use crate::identification::CancelHandle;
use crate::lookup::{LookupClient, LookupError};
use crate::observer::{IdentificationObserver, ProgressUpdate};
use anyhow::{bail, Result};
use async_trait::async_trait;
use shared::{
    ArtifactKind, CandidateRecord, Collection, FileDescriptor, FilepathMapping, LibraryStats,
    MetadataRecord, MovieId, MovieStore, PersistedMovie, SqliteMovieStore, StoreWrite,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn descriptor(path: &str, title: &str, year: Option<i32>, folder: &str) -> FileDescriptor {
    FileDescriptor {
        path: PathBuf::from(path),
        external_id: None,
        title: title.to_string(),
        year,
        parent_folder: folder.to_string(),
    }
}

pub fn candidate(id: i64, title: &str) -> CandidateRecord {
    CandidateRecord {
        id: MovieId(id),
        title: title.to_string(),
        release_date: None,
    }
}

pub fn record(id: i64, title: &str) -> MetadataRecord {
    MetadataRecord {
        id: MovieId(id),
        title: title.to_string(),
        overview: format!("Overview of {}", title),
        imdb_id: None,
        rating: 7.5,
        tagline: String::new(),
        release_date: "2010-07-15".to_string(),
        runtime: 120,
        poster_path: Some(format!("/{}.jpg", id)),
        backdrop_path: Some(format!("/{}_bg.jpg", id)),
        collection: None,
    }
}

pub fn record_in_collection(id: i64, title: &str, collection_id: i64) -> MetadataRecord {
    MetadataRecord {
        collection: Some(Collection {
            id: collection_id,
            name: format!("{} Collection", title),
            poster_path: Some(format!("/c{}.jpg", collection_id)),
        }),
        ..record(id, title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupCall {
    FindByExternalId(String),
    Search { text: String, year: Option<i32> },
    FetchFull(MovieId, String),
}

/// Lookup client answering from canned responses; anything unscripted is empty.
#[derive(Debug, Default)]
pub struct ScriptedLookup {
    external: HashMap<String, Vec<CandidateRecord>>,
    searches: HashMap<(String, Option<i32>), Vec<CandidateRecord>>,
    failing_searches: HashSet<(String, Option<i32>)>,
    movies: HashMap<MovieId, MetadataRecord>,
    failing_fetches: HashSet<MovieId>,
    calls: Mutex<Vec<LookupCall>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_external(mut self, id: &str, candidates: Vec<CandidateRecord>) -> Self {
        self.external.insert(id.to_string(), candidates);
        self
    }

    pub fn with_search(
        mut self,
        text: &str,
        year: Option<i32>,
        candidates: Vec<CandidateRecord>,
    ) -> Self {
        self.searches.insert((text.to_string(), year), candidates);
        self
    }

    pub fn with_search_error(mut self, text: &str, year: Option<i32>) -> Self {
        self.failing_searches.insert((text.to_string(), year));
        self
    }

    pub fn with_movie(mut self, record: MetadataRecord) -> Self {
        self.movies.insert(record.id, record);
        self
    }

    pub fn with_fetch_error(mut self, id: MovieId) -> Self {
        self.failing_fetches.insert(id);
        self
    }

    pub fn calls(&self) -> Vec<LookupCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: LookupCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn failure(url: &str) -> LookupError {
        LookupError::Status {
            url: url.to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl LookupClient for ScriptedLookup {
    async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Vec<CandidateRecord>, LookupError> {
        self.record_call(LookupCall::FindByExternalId(external_id.to_string()));
        Ok(self.external.get(external_id).cloned().unwrap_or_default())
    }

    async fn search_by_text(
        &self,
        text: &str,
        year: Option<i32>,
    ) -> Result<Vec<CandidateRecord>, LookupError> {
        self.record_call(LookupCall::Search {
            text: text.to_string(),
            year,
        });
        let key = (text.to_string(), year);
        if self.failing_searches.contains(&key) {
            return Err(Self::failure("/search/movie"));
        }
        Ok(self.searches.get(&key).cloned().unwrap_or_default())
    }

    async fn fetch_full(
        &self,
        id: MovieId,
        language: &str,
    ) -> Result<Option<MetadataRecord>, LookupError> {
        self.record_call(LookupCall::FetchFull(id, language.to_string()));
        if self.failing_fetches.contains(&id) {
            return Err(Self::failure("/movie"));
        }
        Ok(self.movies.get(&id).cloned())
    }
}

/// Artifact cache that records downloads instead of performing them
#[derive(Debug, Default)]
pub struct RecordingArtifacts {
    stored: Mutex<HashSet<(ArtifactKind, i64)>>,
    downloads: Mutex<Vec<(String, ArtifactKind, i64)>>,
    removed: Mutex<Vec<(ArtifactKind, i64)>>,
    fail_downloads: bool,
}

impl RecordingArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_downloads: true,
            ..Self::default()
        }
    }

    pub fn with_stored(self, kind: ArtifactKind, id: i64) -> Self {
        self.stored.lock().unwrap().insert((kind, id));
        self
    }

    pub fn downloads(&self) -> Vec<(String, ArtifactKind, i64)> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<(ArtifactKind, i64)> {
        self.removed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactCache for RecordingArtifacts {
    fn exists(&self, kind: ArtifactKind, id: i64) -> bool {
        self.stored.lock().unwrap().contains(&(kind, id))
    }

    async fn download_and_store(
        &self,
        url: &str,
        kind: ArtifactKind,
        id: i64,
    ) -> Result<(), ArtifactError> {
        self.downloads
            .lock()
            .unwrap()
            .push((url.to_string(), kind, id));
        if self.fail_downloads {
            return Err(ArtifactError::Status {
                url: url.to_string(),
                status: 500,
            });
        }
        self.stored.lock().unwrap().insert((kind, id));
        Ok(())
    }

    fn remove(&self, kind: ArtifactKind, id: i64) -> Result<(), ArtifactError> {
        self.stored.lock().unwrap().remove(&(kind, id));
        self.removed.lock().unwrap().push((kind, id));
        Ok(())
    }
}

/// Observer that records updates and can cancel the batch after N items
#[derive(Debug, Default)]
pub struct RecordingObserver {
    updates: Mutex<Vec<ProgressUpdate>>,
    library_changes: AtomicUsize,
    cancel_after: Option<(usize, CancelHandle)>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(count: usize, handle: CancelHandle) -> Self {
        Self {
            cancel_after: Some((count, handle)),
            ..Self::default()
        }
    }

    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn library_changes(&self) -> usize {
        self.library_changes.load(Ordering::SeqCst)
    }
}

impl IdentificationObserver for RecordingObserver {
    fn on_movie_added(&self, update: &ProgressUpdate) {
        self.updates.lock().unwrap().push(update.clone());
        if let Some((count, handle)) = &self.cancel_after {
            if update.count >= *count {
                handle.cancel();
            }
        }
    }

    fn on_library_changed(&self) {
        self.library_changes.fetch_add(1, Ordering::SeqCst);
    }
}

/// SQLite store whose transactional writes fail for one path
pub struct FailingStore {
    inner: Arc<SqliteMovieStore>,
    fail_path: String,
}

impl FailingStore {
    pub fn new(inner: Arc<SqliteMovieStore>, fail_path: &str) -> Self {
        Self {
            inner,
            fail_path: fail_path.to_string(),
        }
    }
}

impl MovieStore for FailingStore {
    fn get_filepath_mapping(&self, path: &str) -> Result<Option<MovieId>> {
        self.inner.get_filepath_mapping(path)
    }

    fn get_paths_for_id(&self, id: MovieId) -> Result<BTreeSet<String>> {
        self.inner.get_paths_for_id(id)
    }

    fn create_mapping(&self, path: &str, id: MovieId) -> Result<bool> {
        self.inner.create_mapping(path, id)
    }

    fn create_or_update_mapping(&self, path: &str, id: MovieId) -> Result<()> {
        self.inner.create_or_update_mapping(path, id)
    }

    fn update_mapping_id(&self, path: &str, old: MovieId, new: MovieId) -> Result<bool> {
        self.inner.update_mapping_id(path, old, new)
    }

    fn delete_movie(&self, id: MovieId) -> Result<()> {
        self.inner.delete_movie(id)
    }

    fn upsert_movie(&self, movie: &PersistedMovie) -> Result<()> {
        self.inner.upsert_movie(movie)
    }

    fn get_movie(&self, id: MovieId) -> Result<Option<PersistedMovie>> {
        self.inner.get_movie(id)
    }

    fn apply(&self, path: &str, writes: &[StoreWrite]) -> Result<()> {
        if path == self.fail_path {
            bail!("disk I/O error writing {}", path);
        }
        self.inner.apply(path, writes)
    }

    fn unidentified_mappings(&self) -> Result<Vec<FilepathMapping>> {
        self.inner.unidentified_mappings()
    }

    fn stats(&self) -> Result<LibraryStats> {
        self.inner.stats()
    }
}
