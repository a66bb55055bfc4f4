//! Persisted list of known city names.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use skylog_core::StorageError;

/// Cities offered when no list has been saved yet
pub const DEFAULT_CITIES: [&str; 2] = ["Omaha", "Paris"];

#[derive(Debug, Clone)]
pub struct CityList {
    path: PathBuf,
    names: Vec<String>,
}

impl CityList {
    /// Load the list from `path`, falling back to [`DEFAULT_CITIES`] when the
    /// file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let names = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                StorageError::Corrupt {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No city list at {}, using defaults", path.display());
                DEFAULT_CITIES.iter().map(|c| c.to_string()).collect()
            }
            Err(e) => return Err(StorageError::io(&path, e)),
        };

        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn first(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// Add a city. Returns false for blank names and names already listed.
    pub fn add(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.names.push(name.to_string());
        true
    }

    /// Write the list back to its file.
    pub fn save(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let json = serde_json::to_string(&self.names).map_err(|source| StorageError::Encode {
            path: self.path.clone(),
            source,
        })?;

        fs::write(&self.path, json).map_err(|e| StorageError::io(&self.path, e))
    }
}
