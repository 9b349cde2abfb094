//! Contract boundary for the optional Git-backed file store.
//!
//! `original_source/llm_os/memory/file_storage.py` and
//! `llm_os/functions/function_sets/file_storage.py` show a Git-tracked
//! document store (`open_file`, `edit_file`, `close_file`, `search_files`).
//! `spec.md` §1 marks this out of scope beyond its contract, and §6's
//! persisted layout lists `files/` as optional. We implement only the
//! trait shape here, so the Agent and dispatcher compile against the same
//! interface a real Git-backed store would fill in, plus a stub that always
//! reports the feature unavailable.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FileStoreError {
    #[error("file store is not configured for this conversation")]
    Unavailable,

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("file store I/O error: {0}")]
    Io(String),
}

/// A single open file's contents and path, as the `open_file`/`edit_file`
/// tool pair would hand back and forth.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub path: String,
    pub content: String,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn open_file(&self, path: &str) -> Result<OpenFile, FileStoreError>;
    async fn edit_file(&self, path: &str, new_content: &str) -> Result<(), FileStoreError>;
    async fn close_file(&self, path: &str) -> Result<(), FileStoreError>;
    async fn search_files(&self, query: &str) -> Result<Vec<String>, FileStoreError>;
}

/// The default file store: every operation reports [`FileStoreError::Unavailable`].
/// Installed when a conversation has no Git-backed file tree configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFileStore;

#[async_trait]
impl FileStore for NoFileStore {
    async fn open_file(&self, _path: &str) -> Result<OpenFile, FileStoreError> {
        Err(FileStoreError::Unavailable)
    }

    async fn edit_file(&self, _path: &str, _new_content: &str) -> Result<(), FileStoreError> {
        Err(FileStoreError::Unavailable)
    }

    async fn close_file(&self, _path: &str) -> Result<(), FileStoreError> {
        Err(FileStoreError::Unavailable)
    }

    async fn search_files(&self, _query: &str) -> Result<Vec<String>, FileStoreError> {
        Err(FileStoreError::Unavailable)
    }
}
