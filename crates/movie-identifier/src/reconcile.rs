//! Reconciliation of resolved records into the movie library.
//!
//! Every item is planned from a read of the current mappings and then written
//! as one ordered [`StoreWrite`] list in a single transaction. Lists are
//! ordered create-first, delete-last, so no mapping ever points at a movie
//! row that does not exist.
//!
//! Automatic runs create missing mappings and upgrade paths that an earlier
//! run left unidentified; a path already mapped to a different movie is left
//! alone. Manual (override) runs repoint the path from whatever the store
//! currently maps it to, and delete that movie once nothing else references it.

use crate::artifacts::ArtifactCache;
use crate::observer::ItemOutcome;
use crate::resolver::{Resolution, ResolutionSource};
use anyhow::Result;
use chrono::Utc;
use shared::config::TmdbConfig;
use shared::{ArtifactKind, FileDescriptor, MetadataRecord, MovieId, MovieStore, PersistedMovie, StoreWrite};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// How the current session identifies files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Library scan: search, then create missing mappings
    Automatic,
    /// User picked `target`; `previous` is what the file was identified as before
    Override {
        target: MovieId,
        previous: Option<MovieId>,
    },
}

/// Writes planned for one file
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub writes: Vec<StoreWrite>,
    pub outcome: ItemOutcome,
    /// Movie removed by this plan, whose artifacts must go too
    pub deleted: Option<MovieId>,
}

impl Plan {
    fn untouched(outcome: ItemOutcome) -> Self {
        Self {
            writes: Vec::new(),
            outcome,
            deleted: None,
        }
    }
}

/// URL prefixes for artwork paths returned by the provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrls {
    pub poster_base: String,
    pub backdrop_base: String,
}

impl ImageUrls {
    pub fn from_config(config: &TmdbConfig) -> Self {
        Self {
            poster_base: config.poster_base_url.trim_end_matches('/').to_string(),
            backdrop_base: config.backdrop_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// Merges resolutions into the store and fetches artwork
///
/// Clones share the library lock, so batches driven through clones of one
/// engine never interleave.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn MovieStore>,
    artifacts: Arc<dyn ArtifactCache>,
    images: ImageUrls,
    library_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("images", &self.images)
            .finish_non_exhaustive()
    }
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn MovieStore>,
        artifacts: Arc<dyn ArtifactCache>,
        images: ImageUrls,
    ) -> Self {
        Self {
            store,
            artifacts,
            images,
            library_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &Arc<dyn MovieStore> {
        &self.store
    }

    /// Exclusive access to the library for the duration of a batch
    pub async fn lock_library(&self) -> OwnedMutexGuard<()> {
        self.library_lock.clone().lock_owned().await
    }

    /// Decide the writes for one file without touching the store.
    pub fn plan(
        &self,
        descriptor: &FileDescriptor,
        resolution: &Resolution,
        mode: Mode,
    ) -> Result<Plan> {
        let path = descriptor.path_key();
        let record = &resolution.record;

        match mode {
            Mode::Automatic => {
                let existing = self.store.get_filepath_mapping(&path)?;
                let upgrade = match existing {
                    // An earlier miss never blocks a later match
                    Some(existing) if existing.is_unidentified() && record.is_identified() => {
                        info!(path = %path, movie_id = %record.id, "Previously unidentified file matched");
                        true
                    }
                    Some(existing) if existing != record.id => {
                        debug!(
                            path = %path,
                            existing = %existing,
                            resolved = %record.id,
                            "Path already mapped, keeping existing mapping"
                        );
                        return Ok(Plan::untouched(ItemOutcome::Unchanged { existing }));
                    }
                    _ => false,
                };

                let mut writes = Vec::with_capacity(2);
                if record.is_identified() {
                    writes.push(StoreWrite::UpsertMovie(self.movie_row(record)));
                }
                writes.push(if upgrade {
                    StoreWrite::SetMapping(record.id)
                } else {
                    StoreWrite::CreateMapping(record.id)
                });

                Ok(Plan {
                    writes,
                    outcome: outcome_for(record),
                    deleted: None,
                })
            }
            Mode::Override { target, previous } => {
                if resolution.source == ResolutionSource::OverrideFailed || !record.is_identified() {
                    return Ok(Plan::untouched(ItemOutcome::Failed {
                        message: format!("movie {} could not be fetched", target),
                    }));
                }

                // The stored mapping wins over the caller-supplied previous id
                let actual = self.store.get_filepath_mapping(&path)?;
                if actual != previous {
                    warn!(
                        path = %path,
                        supplied = ?previous,
                        stored = ?actual,
                        "Previous id does not match stored mapping, using stored mapping"
                    );
                }

                let new = record.id;
                let mut writes = vec![StoreWrite::UpsertMovie(self.movie_row(record))];
                let mut deleted = None;

                match actual {
                    Some(prev) if prev.is_valid() && prev != new => {
                        let paths = self.store.get_paths_for_id(prev)?;
                        let mapped_here = paths.contains(&path);
                        let shared_with_others = paths.iter().any(|p| *p != path);

                        if shared_with_others {
                            // Other files still reference the previous movie; keep it
                            writes.push(if mapped_here {
                                StoreWrite::RepointMapping { from: prev, to: new }
                            } else {
                                StoreWrite::SetMapping(new)
                            });
                        } else {
                            writes.push(StoreWrite::SetMapping(new));
                            writes.push(StoreWrite::DeleteMovie(prev));
                            deleted = Some(prev);
                        }
                    }
                    _ => writes.push(StoreWrite::SetMapping(new)),
                }

                Ok(Plan {
                    writes,
                    outcome: ItemOutcome::Identified,
                    deleted,
                })
            }
        }
    }

    /// Plan, commit, then clean up and fetch artwork for one file.
    ///
    /// Store failures are returned; artwork failures are only logged.
    pub async fn reconcile(
        &self,
        descriptor: &FileDescriptor,
        resolution: &Resolution,
        mode: Mode,
    ) -> Result<ItemOutcome> {
        let plan = self.plan(descriptor, resolution, mode)?;

        if !plan.writes.is_empty() {
            self.store.apply(&descriptor.path_key(), &plan.writes)?;
        }

        if let Some(old) = plan.deleted {
            info!(
                path = %descriptor.path.display(),
                old = %old,
                new = %resolution.record.id,
                "Previous movie replaced"
            );
            self.remove_artifacts(old);
        }

        if plan.outcome == ItemOutcome::Identified {
            self.download_artifacts(&resolution.record).await;
        }

        Ok(plan.outcome)
    }

    fn movie_row(&self, record: &MetadataRecord) -> PersistedMovie {
        PersistedMovie::from_record(record, Utc::now())
    }

    fn remove_artifacts(&self, id: MovieId) {
        for kind in [ArtifactKind::Poster, ArtifactKind::Backdrop] {
            if let Err(e) = self.artifacts.remove(kind, id.0) {
                warn!(movie_id = %id, kind = %kind, error = %e, "Failed to remove artifact");
            }
        }
    }

    async fn download_artifacts(&self, record: &MetadataRecord) {
        let mut wanted = vec![
            (
                ArtifactKind::Poster,
                record.id.0,
                &self.images.poster_base,
                record.poster_path.as_deref(),
            ),
            (
                ArtifactKind::Backdrop,
                record.id.0,
                &self.images.backdrop_base,
                record.backdrop_path.as_deref(),
            ),
        ];
        if let Some(collection) = &record.collection {
            wanted.push((
                ArtifactKind::CollectionPoster,
                collection.id,
                &self.images.poster_base,
                collection.poster_path.as_deref(),
            ));
        }

        for (kind, id, base, source) in wanted {
            let Some(source) = source.filter(|s| !s.is_empty()) else {
                continue;
            };
            if self.artifacts.exists(kind, id) {
                continue;
            }

            let url = format!("{}{}", base, source);
            match self.artifacts.download_and_store(&url, kind, id).await {
                Ok(()) => debug!(kind = %kind, id = id, "Artifact downloaded"),
                Err(e) => warn!(kind = %kind, id = id, url = %url, error = %e, "Artifact download failed"),
            }
        }
    }
}

fn outcome_for(record: &MetadataRecord) -> ItemOutcome {
    if record.is_identified() {
        ItemOutcome::Identified
    } else {
        ItemOutcome::Unidentified
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Strategy;
    use crate::testing::*;
    use shared::SqliteMovieStore;

    struct Fixture {
        store: Arc<SqliteMovieStore>,
        artifacts: Arc<RecordingArtifacts>,
        engine: ReconciliationEngine,
    }

    fn fixture_with(artifacts: RecordingArtifacts) -> Fixture {
        let store = Arc::new(SqliteMovieStore::in_memory().unwrap());
        let artifacts = Arc::new(artifacts);
        let engine = ReconciliationEngine::new(
            store.clone(),
            artifacts.clone(),
            ImageUrls {
                poster_base: "http://img/w500".to_string(),
                backdrop_base: "http://img/w1280".to_string(),
            },
        );
        Fixture {
            store,
            artifacts,
            engine,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(RecordingArtifacts::new())
    }

    fn found(record: MetadataRecord) -> Resolution {
        Resolution {
            record,
            source: ResolutionSource::Search(Strategy::TitleWithYear),
        }
    }

    fn overridden(record: MetadataRecord) -> Resolution {
        Resolution {
            record,
            source: ResolutionSource::Override,
        }
    }

    fn unidentified() -> Resolution {
        Resolution {
            record: MetadataRecord::unidentified(),
            source: ResolutionSource::Unidentified,
        }
    }

    /// Library with `paths` identified as movie `id`
    async fn seed(f: &Fixture, paths: &[&str], id: i64) {
        for path in paths {
            f.engine
                .reconcile(
                    &descriptor(path, "seed", None, "m"),
                    &found(record(id, "Seed")),
                    Mode::Automatic,
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_automatic_creates_mapping_and_movie() -> Result<()> {
        let f = fixture();
        let d = descriptor("/m/Inception.2010.mkv", "Inception", Some(2010), "m");

        let outcome = f
            .engine
            .reconcile(&d, &found(record(27205, "Inception")), Mode::Automatic)
            .await?;

        assert_eq!(outcome, ItemOutcome::Identified);
        assert_eq!(
            f.store.get_filepath_mapping("/m/Inception.2010.mkv")?,
            Some(MovieId(27205))
        );
        let movie = f.store.get_movie(MovieId(27205))?.unwrap();
        assert_eq!(movie.title, "Inception");
        assert_eq!(movie.certification, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_automatic_is_idempotent() -> Result<()> {
        let f = fixture();
        let d = descriptor("/m/Inception.2010.mkv", "Inception", Some(2010), "m");
        let resolution = found(record(27205, "Inception"));

        f.engine.reconcile(&d, &resolution, Mode::Automatic).await?;
        f.engine.reconcile(&d, &resolution, Mode::Automatic).await?;

        let stats = f.store.stats()?;
        assert_eq!(stats.mappings, 1);
        assert_eq!(stats.movies, 1);
        assert_eq!(
            f.store.get_filepath_mapping("/m/Inception.2010.mkv")?,
            Some(MovieId(27205))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_automatic_never_repoints_existing_mapping() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 10).await;

        let outcome = f
            .engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &found(record(20, "Other")),
                Mode::Automatic,
            )
            .await?;

        assert_eq!(
            outcome,
            ItemOutcome::Unchanged {
                existing: MovieId(10)
            }
        );
        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(10)));
        assert!(f.store.get_movie(MovieId(20))?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_automatic_rerun_upgrades_unidentified_mapping() -> Result<()> {
        let f = fixture();
        let d = descriptor("/m/Inception.2010.mkv", "Inception", Some(2010), "m");
        f.engine.reconcile(&d, &unidentified(), Mode::Automatic).await?;

        let outcome = f
            .engine
            .reconcile(&d, &found(record(27205, "Inception")), Mode::Automatic)
            .await?;

        assert_eq!(outcome, ItemOutcome::Identified);
        assert_eq!(
            f.store.get_filepath_mapping("/m/Inception.2010.mkv")?,
            Some(MovieId(27205))
        );
        assert!(f.store.get_movie(MovieId(27205))?.is_some());
        let stats = f.store.stats()?;
        assert_eq!(stats.mappings, 1);
        assert_eq!(stats.unidentified, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_automatic_miss_keeps_real_mapping() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 10).await;

        let outcome = f
            .engine
            .reconcile(&descriptor("/m/a.mkv", "a", None, "m"), &unidentified(), Mode::Automatic)
            .await?;

        assert_eq!(
            outcome,
            ItemOutcome::Unchanged {
                existing: MovieId(10)
            }
        );
        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(10)));
        Ok(())
    }

    #[tokio::test]
    async fn test_override_uses_stored_mapping_over_stale_previous() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 10).await;

        f.engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &overridden(record(20, "New")),
                Mode::Override {
                    target: MovieId(20),
                    previous: None,
                },
            )
            .await?;

        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(20)));
        assert!(f.store.get_movie(MovieId(10))?.is_none());
        assert_eq!(f.store.stats()?.movies, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_automatic_unidentified_maps_sentinel_without_movie_row() -> Result<()> {
        let f = fixture();

        let outcome = f
            .engine
            .reconcile(
                &descriptor("/m/zzz.mkv", "zzz", None, "m"),
                &unidentified(),
                Mode::Automatic,
            )
            .await?;

        assert_eq!(outcome, ItemOutcome::Unidentified);
        assert_eq!(
            f.store.get_filepath_mapping("/m/zzz.mkv")?,
            Some(MovieId::UNIDENTIFIED)
        );
        assert_eq!(f.store.stats()?.movies, 0);
        assert!(f.artifacts.downloads().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_override_shared_previous_only_repoints_target() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv", "/m/b.mkv", "/m/c.mkv"], 10).await;

        f.engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &overridden(record(20, "New")),
                Mode::Override {
                    target: MovieId(20),
                    previous: Some(MovieId(10)),
                },
            )
            .await?;

        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(20)));
        let remaining = f.store.get_paths_for_id(MovieId(10))?;
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains("/m/b.mkv") && remaining.contains("/m/c.mkv"));
        assert!(f.store.get_movie(MovieId(10))?.is_some());
        assert!(f.artifacts.removed().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_override_sole_previous_deletes_old_movie() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 10).await;

        f.engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &overridden(record(20, "New")),
                Mode::Override {
                    target: MovieId(20),
                    previous: Some(MovieId(10)),
                },
            )
            .await?;

        assert!(f.store.get_movie(MovieId(10))?.is_none());
        assert!(f.store.get_movie(MovieId(20))?.is_some());
        let stats = f.store.stats()?;
        assert_eq!(stats.mappings, 1);
        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(20)));
        assert_eq!(
            f.artifacts.removed(),
            vec![(ArtifactKind::Poster, 10), (ArtifactKind::Backdrop, 10)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_override_from_unidentified_repoints() -> Result<()> {
        let f = fixture();
        let d = descriptor("/m/zzz.mkv", "zzz", None, "m");
        f.engine.reconcile(&d, &unidentified(), Mode::Automatic).await?;
        f.engine
            .reconcile(&descriptor("/m/yyy.mkv", "yyy", None, "m"), &unidentified(), Mode::Automatic)
            .await?;

        f.engine
            .reconcile(
                &d,
                &overridden(record(30, "Found")),
                Mode::Override {
                    target: MovieId(30),
                    previous: Some(MovieId::UNIDENTIFIED),
                },
            )
            .await?;

        assert_eq!(f.store.get_filepath_mapping("/m/zzz.mkv")?, Some(MovieId(30)));
        assert_eq!(
            f.store.get_filepath_mapping("/m/yyy.mkv")?,
            Some(MovieId::UNIDENTIFIED)
        );
        assert_eq!(f.store.stats()?.movies, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_override_to_same_id_is_noop_on_mappings() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 42).await;
        let before = f.store.stats()?;

        f.engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &overridden(record(42, "Answer")),
                Mode::Override {
                    target: MovieId(42),
                    previous: Some(MovieId(42)),
                },
            )
            .await?;

        assert_eq!(f.store.stats()?, before);
        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(42)));
        assert!(f.store.get_movie(MovieId(42))?.is_some());
        assert!(f.artifacts.removed().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_override_fetch_failure_leaves_library_untouched() -> Result<()> {
        let f = fixture();
        seed(&f, &["/m/a.mkv"], 10).await;

        let outcome = f
            .engine
            .reconcile(
                &descriptor("/m/a.mkv", "a", None, "m"),
                &Resolution {
                    record: MetadataRecord::unidentified(),
                    source: ResolutionSource::OverrideFailed,
                },
                Mode::Override {
                    target: MovieId(20),
                    previous: Some(MovieId(10)),
                },
            )
            .await?;

        assert!(matches!(outcome, ItemOutcome::Failed { .. }));
        assert_eq!(f.store.get_filepath_mapping("/m/a.mkv")?, Some(MovieId(10)));
        assert!(f.store.get_movie(MovieId(10))?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_artifacts_downloaded_once_with_collection() -> Result<()> {
        let f = fixture_with(RecordingArtifacts::new().with_stored(ArtifactKind::Backdrop, 603));
        let d = descriptor("/m/The.Matrix.1999.mkv", "The Matrix", Some(1999), "m");

        f.engine
            .reconcile(&d, &found(record_in_collection(603, "The Matrix", 2344)), Mode::Automatic)
            .await?;

        assert_eq!(
            f.artifacts.downloads(),
            vec![
                ("http://img/w500/603.jpg".to_string(), ArtifactKind::Poster, 603),
                (
                    "http://img/w500/c2344.jpg".to_string(),
                    ArtifactKind::CollectionPoster,
                    2344
                ),
            ]
        );
        let movie = f.store.get_movie(MovieId(603))?.unwrap();
        assert_eq!(movie.collection_id, "2344");
        Ok(())
    }

    #[tokio::test]
    async fn test_download_failure_is_not_fatal() -> Result<()> {
        let f = fixture_with(RecordingArtifacts::failing());
        let d = descriptor("/m/Inception.2010.mkv", "Inception", Some(2010), "m");

        let outcome = f
            .engine
            .reconcile(&d, &found(record(27205, "Inception")), Mode::Automatic)
            .await?;

        assert_eq!(outcome, ItemOutcome::Identified);
        assert_eq!(f.artifacts.downloads().len(), 2);
        assert!(f.store.get_movie(MovieId(27205))?.is_some());
        Ok(())
    }
}
