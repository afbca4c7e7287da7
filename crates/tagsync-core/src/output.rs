//! Result file persistence
//!
//! One run writes at most one file, `orders_<YYYYmmdd_HHMMSS>.json`. Files
//! are opened with `create_new`, so an existing result is never overwritten;
//! a numeric suffix is added instead.

use crate::error::OutputError;
use crate::types::Record;
use chrono::{DateTime, Local};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Give up after this many name clashes within one second
const MAX_SUFFIX: u32 = 1000;

/// Writes the final record set as pretty-printed JSON
#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    /// Create writer targeting `dir`
    #[inline]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target directory
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write records stamped with the current local time
    ///
    /// # Errors
    /// `OutputError` on serialization or file system failure
    pub fn write(&self, records: &[Record]) -> Result<PathBuf, OutputError> {
        self.write_at(records, Local::now())
    }

    /// Write records stamped with `at`
    ///
    /// # Errors
    /// `OutputError` on serialization or file system failure
    pub fn write_at(&self, records: &[Record], at: DateTime<Local>) -> Result<PathBuf, OutputError> {
        let json = serde_json::to_vec_pretty(records)?;

        std::fs::create_dir_all(&self.dir).map_err(|source| OutputError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let stem = format!("orders_{}", at.format("%Y%m%d_%H%M%S"));
        for suffix in 0..MAX_SUFFIX {
            let name = if suffix == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}_{suffix}.json")
            };
            let path = self.dir.join(name);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(OutputError::Io { path, source }),
            };
            file.write_all(&json)
                .and_then(|()| file.sync_all())
                .map_err(|source| OutputError::Io {
                    path: path.clone(),
                    source,
                })?;
            return Ok(path);
        }

        Err(OutputError::Io {
            path: self.dir.join(format!("{stem}.json")),
            source: std::io::Error::new(ErrorKind::AlreadyExists, "no free output file name"),
        })
    }
}
