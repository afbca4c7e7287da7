//! Diagnostics setup
//!
//! Three sinks share one registry:
//! - stderr, filtered by `RUST_LOG` or `--log-level`
//! - `general.log`: INFO and WARN events from this workspace
//! - `error.log`: ERROR events from this workspace
//!
//! The fmt layer renders each event into one buffer and writes it under the
//! file's mutex, so lines from concurrent workers never interleave.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use tagsync_core::RunId;
use tracing::{Level, Metadata, Subscriber};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub(crate) const GENERAL_LOG: &str = "general.log";
pub(crate) const ERROR_LOG: &str = "error.log";

/// Log files of one run
pub(crate) struct LogFiles {
    general: File,
    error: File,
}

impl LogFiles {
    /// Open both files for appending and mark the start of a run
    pub(crate) fn open(dir: &Path, run_id: RunId) -> io::Result<Self> {
        std::fs::create_dir_all(dir)?;
        let mut files = Self {
            general: append(&dir.join(GENERAL_LOG))?,
            error: append(&dir.join(ERROR_LOG))?,
        };

        let marker = format!(
            "new run: [{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            run_id
        );
        files.general.write_all(marker.as_bytes())?;
        files.error.write_all(marker.as_bytes())?;
        Ok(files)
    }

    /// Layers writing to the two files
    pub(crate) fn layers<S>(self) -> impl Layer<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        file_layer(self.general, is_general).and_then(file_layer(self.error, is_error))
    }
}

/// Install the global subscriber
pub(crate) fn init(dir: &Path, log_level: &str, run_id: RunId) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let files = LogFiles::open(dir, run_id)?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(env_filter),
        )
        .with(files.layers())
        .try_init()?;
    Ok(())
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_layer<S>(file: File, keep: fn(&Metadata<'_>) -> bool) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(filter_fn(keep))
}

fn is_ours(meta: &Metadata<'_>) -> bool {
    meta.target().starts_with("tagsync")
}

fn is_general(meta: &Metadata<'_>) -> bool {
    is_ours(meta) && matches!(*meta.level(), Level::INFO | Level::WARN)
}

fn is_error(meta: &Metadata<'_>) -> bool {
    is_ours(meta) && *meta.level() == Level::ERROR
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    fn read(dir: &Path, name: &str) -> String {
        std::fs::read_to_string(dir.join(name)).unwrap()
    }

    #[test]
    fn routes_events_by_level() {
        let dir = tempfile::tempdir().unwrap();
        let files = LogFiles::open(dir.path(), RunId::new()).unwrap();
        let subscriber = Registry::default().with(files.layers());

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "tagsync_core::paginator", "Fetched orders: Page 1");
            tracing::warn!(target: "tagsync_core::tagger", "Pagination stopped early");
            tracing::error!(target: "tagsync_core::transport", "API request failed");
            tracing::debug!(target: "tagsync_core::classifier", "no gateway");
            tracing::info!(target: "hyper::client", "connection reused");
        });

        let general = read(dir.path(), GENERAL_LOG);
        assert!(general.contains("Fetched orders: Page 1"));
        assert!(general.contains("Pagination stopped early"));
        assert!(!general.contains("API request failed"));
        assert!(!general.contains("no gateway"));
        assert!(!general.contains("connection reused"));

        let errors = read(dir.path(), ERROR_LOG);
        assert!(errors.contains("API request failed"));
        assert!(!errors.contains("Fetched orders"));
    }

    #[test]
    fn appends_run_marker_to_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let first = RunId::new();
        let second = RunId::new();
        drop(LogFiles::open(dir.path(), first).unwrap());
        drop(LogFiles::open(dir.path(), second).unwrap());

        for name in [GENERAL_LOG, ERROR_LOG] {
            let content = read(dir.path(), name);
            let markers: Vec<_> = content.lines().filter(|l| l.starts_with("new run: [")).collect();
            assert_eq!(markers.len(), 2);
            assert!(markers[0].ends_with(&first.to_string()));
            assert!(markers[1].ends_with(&second.to_string()));
        }
    }

    #[test]
    fn creates_log_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs");
        LogFiles::open(&nested, RunId::new()).unwrap();
        assert!(nested.join(GENERAL_LOG).exists());
        assert!(nested.join(ERROR_LOG).exists());
    }
}
