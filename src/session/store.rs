//! Local key/value state file.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key holding the session spend.
pub const SESSION_COST_KEY: &str = "imagegen_session_cost";
/// Key holding the remaining quota.
pub const IMAGES_REMAINING_KEY: &str = "imagegen_images_remaining";
/// Key holding the saved gallery.
pub const GALLERY_KEY: &str = "imagegen_gallery";

/// JSON object on disk, read whole and written whole.
///
/// Unreadable content is logged and treated as empty, so a damaged file
/// resets the session instead of locking the user out.
#[derive(Debug)]
pub struct LocalStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl LocalStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "ignoring unreadable state file: {e}");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads a value. A value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.entries.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key, "ignoring malformed state entry: {e}");
                None
            }
        }
    }

    /// Sets a value in memory. Call [`LocalStore::flush`] to persist.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        self.entries
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Writes the store to disk via a temporary file and rename.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&self.entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("state.json")).unwrap();
        assert_eq!(store.get::<u32>(IMAGES_REMAINING_KEY), None);
    }

    #[test]
    fn test_set_flush_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let mut store = LocalStore::open(&path).unwrap();
        store.set(IMAGES_REMAINING_KEY, &7u32).unwrap();
        store.flush().unwrap();

        let reopened = LocalStore::open(&path).unwrap();
        assert_eq!(reopened.get::<u32>(IMAGES_REMAINING_KEY), Some(7));
    }

    #[test]
    fn test_corrupt_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get::<u32>(IMAGES_REMAINING_KEY), None);
    }

    #[test]
    fn test_wrong_shape_reads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, r#"{"imagegen_images_remaining": "lots"}"#).unwrap();

        let store = LocalStore::open(&path).unwrap();
        assert_eq!(store.get::<u32>(IMAGES_REMAINING_KEY), None);
    }
}
