//! Flat-file reading store.
//!
//! The whole history lives in one JSON array. Every operation reads the full
//! file and mutating operations rewrite it, so a `ReadingStore` must have a
//! single owner; concurrent access goes through the store worker in
//! `skylog-services`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{NaiveDateTime, TimeDelta};
use skylog_core::StorageError;

use crate::types::Reading;

#[derive(Debug, Clone)]
pub struct ReadingStore {
    path: PathBuf,
}

impl ReadingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one reading at the end of the stored sequence.
    ///
    /// Creates the file when it does not exist yet. An existing file that is
    /// not a valid reading array is left untouched and reported as corrupt.
    pub fn append(&self, reading: Reading) -> Result<(), StorageError> {
        let mut readings = self.read_existing()?.unwrap_or_default();
        readings.push(reading);
        self.write(&readings)?;
        tracing::debug!(
            "Appended reading, {} stored in {}",
            readings.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Load every stored reading in insertion order; empty when the file is absent.
    pub fn load_all(&self) -> Result<Vec<Reading>, StorageError> {
        Ok(self.read_existing()?.unwrap_or_default())
    }

    /// Last reading by insertion order, whichever city it belongs to.
    pub fn last(&self) -> Result<Option<Reading>, StorageError> {
        Ok(self.load_all()?.pop())
    }

    /// Remove readings strictly older than `now - retention`.
    ///
    /// Returns how many were removed. A missing file is not an error.
    pub fn prune(&self, retention: TimeDelta, now: NaiveDateTime) -> Result<usize, StorageError> {
        let Some(readings) = self.read_existing()? else {
            return Ok(0);
        };

        let Some(cutoff) = now.checked_sub_signed(retention) else {
            return Ok(0);
        };

        let before = readings.len();
        let kept: Vec<Reading> = readings
            .into_iter()
            .filter(|r| r.datetime >= cutoff)
            .collect();
        let removed = before - kept.len();

        if removed > 0 {
            self.write(&kept)?;
            tracing::info!(
                "Pruned {} readings older than {}",
                removed,
                cutoff.format("%Y-%m-%d %H:%M:%S")
            );
        }

        Ok(removed)
    }

    fn read_existing(&self) -> Result<Option<Vec<Reading>>, StorageError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(&self.path, e)),
        };

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn write(&self, readings: &[Reading]) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let json = serde_json::to_string(readings).map_err(|source| StorageError::Encode {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, json).map_err(|e| StorageError::io(&self.path, e))
    }
}
