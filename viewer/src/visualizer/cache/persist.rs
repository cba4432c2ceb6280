//! Storage backends for [`ViewerPreferences`].
//!
//! Absence of stored preferences is never an error: `load` returns `Ok(None)`
//! and the viewer starts from defaults.

use crate::error::StorageError;
use shared::ViewerPreferences;
use std::cell::RefCell;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub trait PreferenceStorage {
    fn load(&self) -> Result<Option<ViewerPreferences>, StorageError>;
    fn save(&self, preferences: &ViewerPreferences) -> Result<(), StorageError>;
}

/// Keeps the serialized document in memory, mirroring a browser local-storage slot.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    document: RefCell<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: RefCell::new(Some(document.into())),
        }
    }

    pub fn document(&self) -> Option<String> {
        self.document.borrow().clone()
    }
}

impl PreferenceStorage for MemoryStorage {
    fn load(&self) -> Result<Option<ViewerPreferences>, StorageError> {
        Ok(self.document.borrow().as_deref().and_then(parse_document))
    }

    fn save(&self, preferences: &ViewerPreferences) -> Result<(), StorageError> {
        *self.document.borrow_mut() = Some(preferences.to_toml()?);
        Ok(())
    }
}

/// Stores preferences as `viewer_preferences.toml` inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub const FILE_NAME: &'static str = "viewer_preferences.toml";

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(Self::FILE_NAME)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl PreferenceStorage for FileStorage {
    fn load(&self) -> Result<Option<ViewerPreferences>, StorageError> {
        match fs::read_to_string(self.path()) {
            Ok(text) => Ok(parse_document(&text)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }

    fn save(&self, preferences: &ViewerPreferences) -> Result<(), StorageError> {
        let text = preferences.to_toml()?;
        fs::create_dir_all(&self.dir)?;
        // The previous document stays in place until the replacement is fully written.
        let temp = self.dir.join(format!("{}.tmp", Self::FILE_NAME));
        fs::write(&temp, text)?;
        fs::rename(&temp, self.path())?;
        Ok(())
    }
}

fn parse_document(text: &str) -> Option<ViewerPreferences> {
    match ViewerPreferences::from_toml(text) {
        Ok(preferences) => Some(preferences),
        Err(error) => {
            log::warn!("Ignoring unreadable viewer preferences: {error}");
            None
        }
    }
}
