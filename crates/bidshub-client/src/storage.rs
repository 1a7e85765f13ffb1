// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

//! Token storage abstraction for the BIDS Hub client.
//!
//! Hub tokens are persisted behind the [`TokenStorage`] trait so the client
//! works both with the token cache written by the hub's own CLI tooling and
//! with ephemeral in-memory tokens in tests.
//!
//! # Storage Implementations
//!
//! - [`FileTokenStorage`]: file-based storage, defaulting to the hub CLI's
//!   token cache (`~/.cache/huggingface/token` on Linux) so a prior
//!   `huggingface-cli login` is picked up automatically
//! - [`MemoryTokenStorage`]: in-memory storage (no persistence)

use directories::BaseDirs;
use log::debug;
use std::{path::PathBuf, sync::RwLock};

/// Error type for token storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// Storage is not available (e.g. cannot determine the cache directory).
    NotAvailable(String),
    /// Failed to read token from storage.
    ReadError(String),
    /// Failed to write token to storage.
    WriteError(String),
    /// Failed to clear token from storage.
    ClearError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::NotAvailable(msg) => write!(f, "Token storage not available: {}", msg),
            StorageError::ReadError(msg) => write!(f, "Failed to read token: {}", msg),
            StorageError::WriteError(msg) => write!(f, "Failed to write token: {}", msg),
            StorageError::ClearError(msg) => write!(f, "Failed to clear token: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Trait for persistent hub token storage.
///
/// Implementations must be thread-safe (`Send + Sync`). The client only
/// calls these methods at construction, login, and logout; never on the
/// upload hot path.
pub trait TokenStorage: Send + Sync {
    /// Store the authentication token.
    fn store(&self, token: &str) -> Result<(), StorageError>;

    /// Load the stored authentication token.
    ///
    /// Returns `Ok(None)` if no token is stored.
    fn load(&self) -> Result<Option<String>, StorageError>;

    /// Clear the stored authentication token.
    fn clear(&self) -> Result<(), StorageError>;
}

/// File-based token storage.
///
/// By default the token lives in the hub CLI's cache location
/// (`<cache dir>/huggingface/token`), which means tokens written by
/// `huggingface-cli login` are found without any extra configuration, and
/// tokens written by `bids-hub login` are visible to the Python tooling.
#[derive(Debug, Clone)]
pub struct FileTokenStorage {
    path: PathBuf,
}

impl FileTokenStorage {
    /// Create a new `FileTokenStorage` using the hub CLI's default token
    /// cache path (`~/.cache/huggingface/token` on Linux).
    pub fn new() -> Result<Self, StorageError> {
        let path = BaseDirs::new()
            .ok_or_else(|| {
                StorageError::NotAvailable("Could not determine user cache directory".to_string())
            })?
            .cache_dir()
            .join("huggingface")
            .join("token");

        debug!("FileTokenStorage using default path: {:?}", path);
        Ok(Self { path })
    }

    /// Create a new `FileTokenStorage` with a custom file path.
    pub fn with_path(path: PathBuf) -> Self {
        debug!("FileTokenStorage using custom path: {:?}", path);
        Self { path }
    }

    /// Returns the path where the token is stored.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl TokenStorage for FileTokenStorage {
    fn store(&self, token: &str) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::WriteError(format!("Failed to create directory {:?}: {}", parent, e))
            })?;
        }

        std::fs::write(&self.path, token).map_err(|e| {
            StorageError::WriteError(format!("Failed to write token to {:?}: {}", self.path, e))
        })?;

        debug!("Token stored to {:?}", self.path);
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        if !self.path.exists() {
            debug!("No token file found at {:?}", self.path);
            return Ok(None);
        }

        let token = std::fs::read_to_string(&self.path).map_err(|e| {
            StorageError::ReadError(format!("Failed to read token from {:?}: {}", self.path, e))
        })?;

        // The hub CLI writes the token with a trailing newline
        let token = token.trim().to_string();
        if token.is_empty() {
            debug!("Token file at {:?} is empty", self.path);
            return Ok(None);
        }

        debug!("Token loaded from {:?}", self.path);
        Ok(Some(token))
    }

    fn clear(&self) -> Result<(), StorageError> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).map_err(|e| {
                StorageError::ClearError(format!(
                    "Failed to remove token file {:?}: {}",
                    self.path, e
                ))
            })?;
            debug!("Token file removed from {:?}", self.path);
        }
        Ok(())
    }
}

/// In-memory token storage (no persistence).
///
/// The token is lost when the process exits. Used in tests and when the
/// caller manages persistence externally (e.g. CI secrets).
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStorage {
    /// Create a new `MemoryTokenStorage`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn store(&self, token: &str) -> Result<(), StorageError> {
        let mut guard = self.token.write().map_err(|e| {
            StorageError::WriteError(format!("Failed to acquire write lock: {}", e))
        })?;
        *guard = Some(token.to_string());
        Ok(())
    }

    fn load(&self) -> Result<Option<String>, StorageError> {
        let guard = self
            .token
            .read()
            .map_err(|e| StorageError::ReadError(format!("Failed to acquire read lock: {}", e)))?;
        Ok(guard.clone())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut guard = self.token.write().map_err(|e| {
            StorageError::ClearError(format!("Failed to acquire write lock: {}", e))
        })?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_storage_store_load_clear() {
        let storage = MemoryTokenStorage::new();

        assert_eq!(storage.load().unwrap(), None);

        storage.store("hf_testtoken").unwrap();
        assert_eq!(storage.load().unwrap(), Some("hf_testtoken".to_string()));

        storage.clear().unwrap();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_file_storage_store_load_clear() {
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("token");
        let storage = FileTokenStorage::with_path(token_path.clone());

        assert_eq!(storage.load().unwrap(), None);

        storage.store("hf_filetoken").unwrap();
        assert!(token_path.exists());
        assert_eq!(storage.load().unwrap(), Some("hf_filetoken".to_string()));

        storage.clear().unwrap();
        assert!(!token_path.exists());
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn test_file_storage_trims_trailing_newline() {
        // huggingface-cli writes the token followed by a newline
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("token");
        std::fs::write(&token_path, "hf_newline\n").unwrap();

        let storage = FileTokenStorage::with_path(token_path);
        assert_eq!(storage.load().unwrap(), Some("hf_newline".to_string()));
    }

    #[test]
    fn test_file_storage_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let token_path = temp_dir.path().join("nested").join("huggingface").join("token");
        let storage = FileTokenStorage::with_path(token_path.clone());

        storage.store("hf_nested").unwrap();
        assert!(token_path.exists());
    }

    #[test]
    fn test_file_storage_clear_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileTokenStorage::with_path(temp_dir.path().join("missing"));
        assert!(storage.clear().is_ok());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::NotAvailable("no cache dir".to_string());
        assert!(err.to_string().contains("no cache dir"));
        assert!(err.to_string().contains("not available"));
    }
}
