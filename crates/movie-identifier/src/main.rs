//! Movie identifier CLI application.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use movie_identifier::{
    describe_file, scan_directory, CandidateResolver, ChannelObserver, FsArtifactCache,
    IdentificationEvent, IdentificationObserver, IdentificationStats, ImageUrls, LoggingObserver,
    MovieIdentification, ReconciliationEngine, TmdbClient,
};
use shared::{Config, DataPaths, Database, FileDescriptor, MovieId, MovieStore, SqliteMovieStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify every video file under a directory
    Scan {
        dir: PathBuf,

        /// Metadata language, e.g. "en" or "da"
        #[arg(long)]
        language: Option<String>,
    },
    /// Identify one file as the given TMDb movie
    Identify {
        file: PathBuf,

        #[arg(long)]
        movie_id: MovieId,

        #[arg(long)]
        language: Option<String>,
    },
    /// Show library counts
    Status {
        /// Also list files that could not be identified
        #[arg(long)]
        unidentified: bool,
    },
    /// Write the default configuration to the config path
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Command::InitConfig = args.command {
        if args.config.exists() {
            bail!("{} already exists", args.config.display());
        }
        Config::default().save(&args.config)?;
        println!("Wrote default configuration to {}", args.config.display());
        return Ok(());
    }

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    shared::logging::init(shared::LogConfig::from_config(
        &config,
        "movie-identifier",
        args.verbose,
    ))?;

    info!("Movie identifier starting");
    info!(config_file = %args.config.display(), "Loaded configuration");

    let db_path = config.database_path();
    info!(db_path = %db_path.display(), "Opening database");
    let database = Database::open(&db_path).context("Failed to open database")?;
    let store = Arc::new(SqliteMovieStore::new(database));

    match args.command {
        Command::Scan { dir, language } => {
            let descriptors = scan_directory(&dir)
                .with_context(|| format!("Failed to scan {}", dir.display()))?;

            let language = language.unwrap_or_else(|| config.identification.language.clone());
            let (session, events) = build_session(&config, store, descriptors, language)?;
            run_session(session, events).await?;
        }
        Command::Identify {
            file,
            movie_id,
            language,
        } => {
            if !movie_id.is_valid() {
                bail!("Movie id must be positive, got {}", movie_id);
            }

            let descriptor = describe_file(&file)?;
            let previous = store
                .get_filepath_mapping(&descriptor.path_key())
                .context("Failed to read current mapping")?;
            info!(
                file = %file.display(),
                previous = ?previous,
                target = %movie_id,
                "Manual identification"
            );

            let language = language.unwrap_or_else(|| config.identification.language.clone());
            let (mut session, events) =
                build_session(&config, store, vec![descriptor], language)?;
            session.set_movie_id(movie_id);
            session.set_current_movie_id(previous);
            run_session(session, events).await?;
        }
        Command::Status { unidentified } => {
            let stats = store.stats().context("Failed to read library stats")?;
            println!("Mapped files:  {}", stats.mappings);
            println!("Movies:        {}", stats.movies);
            println!("Unidentified:  {}", stats.unidentified);

            if unidentified {
                for mapping in store.unidentified_mappings()? {
                    println!("  {}", mapping.path);
                }
            }
        }
        // Handled before the library is opened
        Command::InitConfig => {}
    }

    info!("Movie identifier finished");
    Ok(())
}

fn build_session(
    config: &Config,
    store: Arc<SqliteMovieStore>,
    descriptors: Vec<FileDescriptor>,
    language: String,
) -> Result<(MovieIdentification, UnboundedReceiver<IdentificationEvent>)> {
    config.require_api_key()?;
    let client = TmdbClient::new(&config.tmdb).context("Failed to create TMDb client")?;
    let artifacts = FsArtifactCache::new(
        DataPaths::new(config.data_dir()),
        config.tmdb.timeout_seconds,
    )
    .context("Failed to initialize artifact cache")?;

    let engine = ReconciliationEngine::new(
        store,
        Arc::new(artifacts),
        ImageUrls::from_config(&config.tmdb),
    );
    let resolver = CandidateResolver::new(Arc::new(client));
    let (observer, events) = ChannelObserver::channel();

    let session = MovieIdentification::new(
        descriptors,
        language,
        resolver,
        engine,
        Arc::new(observer),
    );
    Ok((session, events))
}

async fn run_session(
    mut session: MovieIdentification,
    mut events: UnboundedReceiver<IdentificationEvent>,
) -> Result<IdentificationStats> {
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing current file");
            cancel.cancel();
        }
    });

    let batch = tokio::spawn(async move { session.start().await });

    let logger = LoggingObserver;
    while let Some(event) = events.recv().await {
        match event {
            IdentificationEvent::MovieAdded(update) => logger.on_movie_added(&update),
            IdentificationEvent::LibraryChanged => {}
        }
    }

    let stats = batch.await.context("Identification task failed")?;

    info!("=== Identification Complete ===");
    info!("Processed: {}", stats.processed);
    info!("Identified: {}", stats.identified);
    info!("Unidentified: {}", stats.unidentified);
    info!("Unchanged: {}", stats.unchanged);
    info!("Failed: {}", stats.failed);
    if stats.cancelled {
        warn!("Identification was cancelled");
    }

    Ok(stats)
}
