//! Tracing setup for the identifier binaries.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! File output rolls daily under the configured log directory, one file
//! prefix per component.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: PathBuf,
    /// Log file prefix and default filter target
    pub component: String,
    pub default_level: Level,
    pub console: bool,
    pub file: bool,
    /// JSON lines in the log file instead of plain text
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("data/logs"),
            component: "movie-identifier".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Build from the `[logging]` section; `verbose` forces DEBUG.
    pub fn from_config(config: &crate::Config, component: &str, verbose: bool) -> Self {
        let default_level = if verbose {
            Level::DEBUG
        } else {
            config
                .logging
                .default_level
                .parse()
                .unwrap_or(Level::INFO)
        };

        Self {
            log_dir: config.log_dir(),
            component: component.to_string(),
            default_level,
            console: config.logging.console,
            file: config.logging.file,
            json_format: config.logging.json_format,
        }
    }

    /// Filter used when RUST_LOG is unset. HTTP internals stay at warn.
    fn filter_directives(&self) -> String {
        format!(
            "{}={level},shared={level},hyper=warn,reqwest=warn,h2=warn",
            self.component.replace('-', "_"),
            level = self.default_level,
        )
    }

    fn console_layer(&self) -> BoxedLayer {
        fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_span_events(FmtSpan::NONE)
            .with_writer(std::io::stderr)
            .boxed()
    }

    fn file_layer(&self) -> Result<BoxedLayer> {
        std::fs::create_dir_all(&self.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", self.log_dir.display())
        })?;
        let appender = tracing_appender::rolling::daily(&self.log_dir, &self.component);

        let layer = if self.json_format {
            fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(appender)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(appender)
                .boxed()
        };
        Ok(layer)
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: LogConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let mut layers: Vec<BoxedLayer> = Vec::new();
    if config.console {
        layers.push(config.console_layer());
    }
    if config.file {
        layers.push(config.file_layer()?);
    }

    tracing_subscriber::registry()
        .with(layers.with_filter(env_filter))
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir.display(),
        "Logging initialized"
    );

    Ok(())
}
