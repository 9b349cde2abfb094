//! On-disk JSON persistence for per-conversation memory state.
//!
//! `spec.md` §6 lays out the layout this crate owns:
//!
//! ```text
//! persistent_storage/<conv>/
//!   fifo_queue.json        {fifo_queue, total_no_messages, no_messages_in_queue}
//!   working_context.json   {last_2_human_ids, persona, humans:{id:text}}
//!   misc_info.json         {memory_pressure_warning_alr_given, ...}
//!   recall_storage.json    [record, ...]
//!   files/                 optional Git-tracked file tree (out of core scope)
//! ```
//!
//! Ported from `original_source/llm_os/agent.py`'s `__write_*_to_*_path_dat`
//! family: every mutation rewrites its whole file rather than diffing, and
//! each file lives directly under the conversation's directory. `memos-core`
//! and `memos-memory` never touch a filesystem themselves; this crate is the
//! only place `tokio::fs` appears, wired in by `memos-runtime` at Agent
//! construction and handed to `Memory`/`Agent` as boxed trait objects.

use std::path::{Path, PathBuf};

use memos_agent::{FlagsStore, MiscFlagsState};
use memos_memory::{ArchivalNote, FifoState, RecallLog, WorkingContextState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("conversation directory already exists: {0}")]
    AlreadyExists(String),

    #[error("conversation not found: {0}")]
    NotFound(String),
}

const FIFO_QUEUE_FILE: &str = "fifo_queue.json";
const WORKING_CONTEXT_FILE: &str = "working_context.json";
const MISC_INFO_FILE: &str = "misc_info.json";
const RECALL_STORAGE_FILE: &str = "recall_storage.json";
const ARCHIVAL_STORAGE_FILE: &str = "archival_storage.json";

/// The five JSON documents that make up one conversation's persisted state,
/// loaded or written as a unit. `archival_storage.json` stands in for the
/// `<vector store>` entry `spec.md` §6's persisted layout names — a real
/// deployment could swap this file for a proper vector database behind the
/// same `ConversationStore` interface without touching `memos-runtime`.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    pub fifo: FifoState,
    pub working_context: WorkingContextState,
    pub misc_flags: MiscFlagsState,
    pub recall: Vec<memos_core::MessageRecord>,
    pub archival: Vec<ArchivalNote>,
}

/// Owns `persistent_storage/` and every conversation directory under it.
/// `memos-runtime` holds one of these and asks it for a conversation's
/// directory path, id list, or full state.
#[derive(Debug, Clone)]
pub struct ConversationStore {
    root: PathBuf,
}

impl ConversationStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn conv_dir(&self, conv_id: &str) -> PathBuf {
        self.root.join(conv_id)
    }

    /// Lists every directory under the storage root — the ids
    /// `GET /conversation-ids` returns.
    pub async fn list_conv_ids(&self) -> Result<Vec<String>, PersistenceError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| io_err(&self.root, e))?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&self.root, e))? {
            if entry.file_type().await.map_err(|e| io_err(&self.root, e))?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Creates a fresh conversation directory with blank state. Errors if
    /// the directory already exists — callers choose conversation names, so
    /// a collision is a client error, not a condition to paper over.
    pub async fn create(&self, conv_id: &str, initial: &ConversationState) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        if dir.exists() {
            return Err(PersistenceError::AlreadyExists(conv_id.to_string()));
        }
        tokio::fs::create_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        write_state(&dir, initial).await
    }

    /// Loads a conversation's full persisted state. Errors if the directory
    /// doesn't exist.
    pub async fn load(&self, conv_id: &str) -> Result<ConversationState, PersistenceError> {
        let dir = self.conv_dir(conv_id);
        if !dir.exists() {
            return Err(PersistenceError::NotFound(conv_id.to_string()));
        }
        Ok(ConversationState {
            fifo: read_json(&dir.join(FIFO_QUEUE_FILE)).await?,
            working_context: read_json(&dir.join(WORKING_CONTEXT_FILE)).await?,
            misc_flags: read_json(&dir.join(MISC_INFO_FILE)).await?,
            recall: read_json(&dir.join(RECALL_STORAGE_FILE)).await?,
            archival: read_json(&dir.join(ARCHIVAL_STORAGE_FILE)).await?,
        })
    }

    /// Removes the conversation's directory if it has no recall history yet
    /// — matches `ConversationRuntime`'s delete-if-empty teardown
    /// (`spec.md` §4.10).
    pub async fn remove_if_empty(&self, conv_id: &str) -> Result<bool, PersistenceError> {
        let dir = self.conv_dir(conv_id);
        if !dir.exists() {
            return Ok(false);
        }
        let state = self.load(conv_id).await?;
        if !state.recall.is_empty() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        Ok(true)
    }

    /// Unconditionally deletes a conversation's directory — the `DELETE
    /// /agent` route's teardown (`spec.md` §6), distinct from
    /// [`Self::remove_if_empty`]'s cache-eviction use.
    pub async fn delete(&self, conv_id: &str) -> Result<bool, PersistenceError> {
        let dir = self.conv_dir(conv_id);
        if !dir.exists() {
            return Ok(false);
        }
        tokio::fs::remove_dir_all(&dir).await.map_err(|e| io_err(&dir, e))?;
        Ok(true)
    }

    /// Writes `fifo_queue.json` only, matching the original's practice of
    /// rewriting individual files on individual mutations rather than the
    /// whole directory on every append.
    pub async fn write_fifo(&self, conv_id: &str, fifo: &FifoState) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        write_json(&dir.join(FIFO_QUEUE_FILE), fifo).await
    }

    pub async fn write_working_context(
        &self,
        conv_id: &str,
        state: &WorkingContextState,
    ) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        write_json(&dir.join(WORKING_CONTEXT_FILE), state).await
    }

    pub async fn write_misc_flags(&self, conv_id: &str, flags: &MiscFlagsState) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        write_json(&dir.join(MISC_INFO_FILE), flags).await
    }

    pub async fn write_recall(
        &self,
        conv_id: &str,
        records: &[memos_core::MessageRecord],
    ) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        write_json(&dir.join(RECALL_STORAGE_FILE), records).await
    }

    pub async fn write_archival(&self, conv_id: &str, notes: &[ArchivalNote]) -> Result<(), PersistenceError> {
        let dir = self.conv_dir(conv_id);
        write_json(&dir.join(ARCHIVAL_STORAGE_FILE), notes).await
    }
}

async fn write_state(dir: &Path, state: &ConversationState) -> Result<(), PersistenceError> {
    write_json(&dir.join(FIFO_QUEUE_FILE), &state.fifo).await?;
    write_json(&dir.join(WORKING_CONTEXT_FILE), &state.working_context).await?;
    write_json(&dir.join(MISC_INFO_FILE), &state.misc_flags).await?;
    write_json(&dir.join(RECALL_STORAGE_FILE), &state.recall).await?;
    write_json(&dir.join(ARCHIVAL_STORAGE_FILE), &state.archival).await
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, PersistenceError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| PersistenceError::Parse { path: path.to_path_buf(), source: e })
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PersistenceError::Parse { path: path.to_path_buf(), source: e })?;
    tokio::fs::write(path, bytes).await.map_err(|e| io_err(path, e))
}

fn io_err(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io { path: path.to_path_buf(), source }
}

/// Write-through [`FlagsStore`] backed by `misc_info.json`. Every setter on
/// `memos_agent::MiscFlags` calls [`FlagsStore::write`] synchronously, so
/// this blocks on the handed-in runtime handle rather than widening the
/// trait to `async fn` — the flags file is tiny (four scalar fields) and the
/// original rewrites it synchronously on every property set too.
pub struct DiskFlagsStore {
    path: PathBuf,
    handle: tokio::runtime::Handle,
}

impl DiskFlagsStore {
    pub fn new(conv_dir: impl Into<PathBuf>, handle: tokio::runtime::Handle) -> Self {
        Self { path: conv_dir.into().join(MISC_INFO_FILE), handle }
    }
}

impl FlagsStore for DiskFlagsStore {
    fn write(&self, state: &MiscFlagsState) -> Result<(), memos_core::MemoryError> {
        let path = self.path.clone();
        let state = *state;
        tokio::task::block_in_place(|| {
            self.handle
                .block_on(async { write_json(&path, &state).await })
                .map_err(|e| memos_core::MemoryError::Persistence(e.to_string()))
        })
    }
}

/// Loads `recall_storage.json` into a [`RecallLog`] at Agent construction
/// time; `memos-agent`/`memos-memory` never read this file themselves.
pub async fn load_recall_log(conv_dir: &Path) -> Result<RecallLog, PersistenceError> {
    let records: Vec<memos_core::MessageRecord> = read_json(&conv_dir.join(RECALL_STORAGE_FILE)).await?;
    Ok(RecallLog::from_records(records))
}
