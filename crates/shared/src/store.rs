//! Persistent movie library: filepath mappings and movie rows.
//!
//! The [`MovieStore`] trait is the narrow surface the reconciliation engine
//! writes through; [`SqliteMovieStore`] is the SQLite-backed implementation.

use crate::models::*;
use crate::Database;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// One write against the library, applied in order by [`MovieStore::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreWrite {
    /// Insert the movie or refresh its metadata columns
    UpsertMovie(PersistedMovie),
    /// Map the path to the id unless the path is already mapped
    CreateMapping(MovieId),
    /// Map the path to the id, replacing any existing mapping
    SetMapping(MovieId),
    /// Repoint the path's mapping only if it currently points at `from`
    RepointMapping { from: MovieId, to: MovieId },
    /// Delete a movie and every mapping that references it
    DeleteMovie(MovieId),
}

/// Library-wide counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryStats {
    pub mappings: usize,
    pub movies: usize,
    pub unidentified: usize,
}

/// Storage operations for the movie library.
pub trait MovieStore: Send + Sync {
    /// Movie id the path is mapped to, if any.
    fn get_filepath_mapping(&self, path: &str) -> Result<Option<MovieId>>;

    /// Every path mapped to the given id.
    fn get_paths_for_id(&self, id: MovieId) -> Result<BTreeSet<String>>;

    /// Create a mapping if the path has none. Returns true if a row was inserted.
    fn create_mapping(&self, path: &str, id: MovieId) -> Result<bool>;

    /// Create the mapping or overwrite the path's existing one.
    fn create_or_update_mapping(&self, path: &str, id: MovieId) -> Result<()>;

    /// Change the path's mapping from `old` to `new`. Returns false if the
    /// path was not mapped to `old`.
    fn update_mapping_id(&self, path: &str, old: MovieId, new: MovieId) -> Result<bool>;

    /// Delete a movie row and all mappings to it.
    fn delete_movie(&self, id: MovieId) -> Result<()>;

    /// Insert or refresh a movie row. User flags survive a refresh.
    fn upsert_movie(&self, movie: &PersistedMovie) -> Result<()>;

    fn get_movie(&self, id: MovieId) -> Result<Option<PersistedMovie>>;

    /// Apply the writes for one path in a single transaction.
    fn apply(&self, path: &str, writes: &[StoreWrite]) -> Result<()>;

    /// Mappings of files no lookup could match, ordered by path.
    fn unidentified_mappings(&self) -> Result<Vec<FilepathMapping>>;

    fn stats(&self) -> Result<LibraryStats>;
}

/// SQLite-backed movie store
#[derive(Debug)]
pub struct SqliteMovieStore {
    db: Mutex<Database>,
}

impl SqliteMovieStore {
    /// Create a new store over the given database
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Store over a fresh in-memory database
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| anyhow!("Movie store lock poisoned"))
    }
}

impl MovieStore for SqliteMovieStore {
    fn get_filepath_mapping(&self, path: &str) -> Result<Option<MovieId>> {
        let db = self.lock()?;
        db.conn()
            .query_row(
                "SELECT movie_id FROM filepath_mappings WHERE path = ?1",
                params![path],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|id| id.map(MovieId))
            .context("Failed to query filepath mapping")
    }

    fn get_paths_for_id(&self, id: MovieId) -> Result<BTreeSet<String>> {
        let db = self.lock()?;
        let mut stmt = db
            .conn()
            .prepare("SELECT path FROM filepath_mappings WHERE movie_id = ?1")?;
        let paths = stmt
            .query_map(params![id.0], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()
            .context("Failed to query paths for movie")?;
        Ok(paths)
    }

    fn create_mapping(&self, path: &str, id: MovieId) -> Result<bool> {
        let db = self.lock()?;
        insert_mapping(db.conn(), path, id)
    }

    fn create_or_update_mapping(&self, path: &str, id: MovieId) -> Result<()> {
        let db = self.lock()?;
        set_mapping(db.conn(), path, id)
    }

    fn update_mapping_id(&self, path: &str, old: MovieId, new: MovieId) -> Result<bool> {
        let db = self.lock()?;
        repoint_mapping(db.conn(), path, old, new)
    }

    fn delete_movie(&self, id: MovieId) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.begin_transaction()?;
        delete_movie(&tx, id)?;
        tx.commit().context("Failed to commit movie deletion")?;
        Ok(())
    }

    fn upsert_movie(&self, movie: &PersistedMovie) -> Result<()> {
        let db = self.lock()?;
        upsert_movie(db.conn(), movie)
    }

    fn get_movie(&self, id: MovieId) -> Result<Option<PersistedMovie>> {
        let db = self.lock()?;
        db.conn()
            .query_row(
                "SELECT id, title, plot, imdb_id, rating, tagline, release_date,
                        certification, runtime, trailer, genres, cast_list,
                        collection_name, collection_id, favourite, to_watch,
                        has_watched, updated_at
                 FROM movies WHERE id = ?1",
                params![id.0],
                row_to_movie,
            )
            .optional()
            .context("Failed to query movie")
    }

    fn apply(&self, path: &str, writes: &[StoreWrite]) -> Result<()> {
        let mut db = self.lock()?;
        let tx = db.begin_transaction()?;

        for write in writes {
            match write {
                StoreWrite::UpsertMovie(movie) => upsert_movie(&tx, movie)?,
                StoreWrite::CreateMapping(id) => {
                    insert_mapping(&tx, path, *id)?;
                }
                StoreWrite::SetMapping(id) => set_mapping(&tx, path, *id)?,
                StoreWrite::RepointMapping { from, to } => {
                    if !repoint_mapping(&tx, path, *from, *to)? {
                        return Err(anyhow!(
                            "Path {} is not mapped to movie {}",
                            path,
                            from
                        ));
                    }
                }
                StoreWrite::DeleteMovie(id) => delete_movie(&tx, *id)?,
            }
        }

        tx.commit()
            .with_context(|| format!("Failed to commit library update for {}", path))?;

        debug!(path = path, writes = writes.len(), "Applied library update");
        Ok(())
    }

    fn unidentified_mappings(&self) -> Result<Vec<FilepathMapping>> {
        let db = self.lock()?;
        let mut stmt = db.conn().prepare(
            "SELECT path, movie_id FROM filepath_mappings WHERE movie_id = ?1 ORDER BY path",
        )?;
        let mappings = stmt
            .query_map(params![MovieId::UNIDENTIFIED.0], |row| {
                Ok(FilepathMapping {
                    path: row.get(0)?,
                    movie_id: MovieId(row.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to query unidentified mappings")?;
        Ok(mappings)
    }

    fn stats(&self) -> Result<LibraryStats> {
        let db = self.lock()?;
        let conn = db.conn();

        let mappings: i64 =
            conn.query_row("SELECT COUNT(*) FROM filepath_mappings", [], |row| row.get(0))?;
        let movies: i64 = conn.query_row("SELECT COUNT(*) FROM movies", [], |row| row.get(0))?;
        let unidentified: i64 = conn.query_row(
            "SELECT COUNT(*) FROM filepath_mappings WHERE movie_id = ?1",
            params![MovieId::UNIDENTIFIED.0],
            |row| row.get(0),
        )?;

        Ok(LibraryStats {
            mappings: mappings as usize,
            movies: movies as usize,
            unidentified: unidentified as usize,
        })
    }
}

fn insert_mapping(conn: &Connection, path: &str, id: MovieId) -> Result<bool> {
    let inserted = conn
        .execute(
            "INSERT OR IGNORE INTO filepath_mappings (path, movie_id) VALUES (?1, ?2)",
            params![path, id.0],
        )
        .context("Failed to create filepath mapping")?;

    if inserted > 0 {
        debug!(path = path, movie_id = %id, "Created filepath mapping");
    } else {
        debug!(path = path, "Filepath mapping already exists");
    }
    Ok(inserted > 0)
}

fn set_mapping(conn: &Connection, path: &str, id: MovieId) -> Result<()> {
    conn.execute(
        "INSERT INTO filepath_mappings (path, movie_id) VALUES (?1, ?2)
         ON CONFLICT(path) DO UPDATE SET movie_id = excluded.movie_id",
        params![path, id.0],
    )
    .context("Failed to set filepath mapping")?;

    debug!(path = path, movie_id = %id, "Set filepath mapping");
    Ok(())
}

fn repoint_mapping(conn: &Connection, path: &str, old: MovieId, new: MovieId) -> Result<bool> {
    let updated = conn
        .execute(
            "UPDATE filepath_mappings SET movie_id = ?1 WHERE path = ?2 AND movie_id = ?3",
            params![new.0, path, old.0],
        )
        .context("Failed to update filepath mapping")?;

    debug!(path = path, from = %old, to = %new, updated = updated, "Repointed filepath mapping");
    Ok(updated > 0)
}

fn delete_movie(conn: &Connection, id: MovieId) -> Result<()> {
    let mappings = conn
        .execute("DELETE FROM filepath_mappings WHERE movie_id = ?1", params![id.0])
        .context("Failed to delete filepath mappings")?;
    let movies = conn
        .execute("DELETE FROM movies WHERE id = ?1", params![id.0])
        .context("Failed to delete movie")?;

    info!(movie_id = %id, mappings = mappings, movies = movies, "Deleted movie");
    Ok(())
}

fn upsert_movie(conn: &Connection, movie: &PersistedMovie) -> Result<()> {
    conn.execute(
        "INSERT INTO movies (
            id, title, plot, imdb_id, rating, tagline, release_date,
            certification, runtime, trailer, genres, cast_list,
            collection_name, collection_id, favourite, to_watch,
            has_watched, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16,
            ?17, ?18
        )
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            plot = excluded.plot,
            imdb_id = excluded.imdb_id,
            rating = excluded.rating,
            tagline = excluded.tagline,
            release_date = excluded.release_date,
            runtime = excluded.runtime,
            collection_name = excluded.collection_name,
            collection_id = excluded.collection_id,
            updated_at = excluded.updated_at",
        params![
            movie.id.0,
            movie.title,
            movie.plot,
            movie.imdb_id,
            movie.rating,
            movie.tagline,
            movie.release_date,
            movie.certification,
            movie.runtime,
            movie.trailer,
            movie.genres,
            movie.cast,
            movie.collection_name,
            movie.collection_id,
            movie.favourite,
            movie.to_watch,
            movie.has_watched,
            movie.updated_at,
        ],
    )
    .context("Failed to upsert movie")?;

    debug!(movie_id = %movie.id, title = %movie.title, "Upserted movie");
    Ok(())
}

fn row_to_movie(row: &Row) -> rusqlite::Result<PersistedMovie> {
    Ok(PersistedMovie {
        id: MovieId(row.get(0)?),
        title: row.get(1)?,
        plot: row.get(2)?,
        imdb_id: row.get(3)?,
        rating: row.get(4)?,
        tagline: row.get(5)?,
        release_date: row.get(6)?,
        certification: row.get(7)?,
        runtime: row.get(8)?,
        trailer: row.get(9)?,
        genres: row.get(10)?,
        cast: row.get(11)?,
        collection_name: row.get(12)?,
        collection_id: row.get(13)?,
        favourite: row.get(14)?,
        to_watch: row.get(15)?,
        has_watched: row.get(16)?,
        updated_at: row.get(17)?,
    })
}
