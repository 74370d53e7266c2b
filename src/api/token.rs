//! Bearer token persistence

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("Token file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the opaque auth token is kept
pub trait TokenStore: Send + Sync {
    /// `Ok(None)` when no token has been saved
    fn load(&self) -> Result<Option<String>, TokenStoreError>;
    fn save(&self, token: &str) -> Result<(), TokenStoreError>;
    /// Removing an absent token is not an error
    fn clear(&self) -> Result<(), TokenStoreError>;
}

/// Token kept in a plain file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> TokenStoreError {
        TokenStoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e)),
        }
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }
        std::fs::write(&self.path, token).map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Saved auth token");
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// In-process token, lost on exit
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, TokenStoreError> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &str) -> Result<(), TokenStoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("token"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_file_store_save_load_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token"));

        store.save("abc123").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("abc123"));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        // Second clear is a no-op
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_blank_file_is_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileTokenStore::new(path).load().unwrap(), None);
    }

    #[test]
    fn test_file_store_read_error() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be
        let store = FileTokenStore::new(dir.path());
        assert!(matches!(store.load(), Err(TokenStoreError::Io { .. })));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryTokenStore::with_token("t");
        assert_eq!(store.load().unwrap().as_deref(), Some("t"));
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.save("u").unwrap();
        assert_eq!(store.load().unwrap().as_deref(), Some("u"));
    }
}
