//! JSON file storage

use std::{
    fs::{self, File},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use super::PersistenceAdapter;
use crate::error::PersistenceError;

/// Stores the collection in a single JSON file, replaced atomically on save
#[derive(Debug, Clone)]
pub struct JsonFileAdapter {
    path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "timers.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl PersistenceAdapter for JsonFileAdapter {
    fn load(&self) -> Result<Option<String>, PersistenceError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                debug!("Loaded {} bytes from {}", content.len(), self.path.display());
                Ok(Some(content))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, serialized: &str) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp = self.temp_path();
        let mut file = File::create(&temp)?;
        file.write_all(serialized.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&temp, &self.path)?;

        debug!("Saved {} bytes to {}", serialized.len(), self.path.display());
        Ok(())
    }
}
