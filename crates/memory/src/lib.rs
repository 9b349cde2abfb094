//! Tiered agent memory: working context, FIFO queue, recall log, archival
//! store, and the composing `Memory` object the agent step loop drives.

pub mod archival;
pub mod fifo;
pub mod file_store;
pub mod memory;
pub mod recall;
pub mod working_context;

pub use archival::{ArchivalNote, ArchivalStore};
pub use fifo::{FifoQueue, FifoState};
pub use file_store::{FileStore, FileStoreError, NoFileStore, OpenFile};
pub use memory::Memory;
pub use recall::RecallLog;
pub use working_context::{Section, WorkingContext, WorkingContextState};
