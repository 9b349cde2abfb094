//! Persisted per-conversation step-loop flags (`misc_info.json` in `spec.md`
//! §6), ported from `original_source/llm_os/agent.py`'s four flag properties
//! whose setters call `__write_misc_info_vars_to_misc_info_path_dat` after
//! every mutation.
//!
//! Modeled on `memos-memory::file_store`'s `FileStore`/`NoFileStore` pattern:
//! a trait boundary for the real persistence, plus a no-op default so
//! `memos-agent` never touches a filesystem directly.

use memos_core::MemoryError;
use serde::{Deserialize, Serialize};

/// The four flags the step loop reads and writes every step.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MiscFlagsState {
    pub memory_pressure_warning_alr_given: bool,
    pub conscious_memory_write_alr_forced: bool,
    pub messages_since_last_conscious_memory_write: i64,
    pub memory_write_function_forced: bool,
}

/// Write-through sink for [`MiscFlagsState`]. Rewrites the whole struct on
/// every setter call, matching the original's "rewrite the whole file on
/// every property set" behavior rather than diffing fields.
pub trait FlagsStore: Send + Sync {
    fn write(&self, state: &MiscFlagsState) -> Result<(), MemoryError>;
}

/// Installed when a conversation has no on-disk flags file configured (tests,
/// or a runtime checkpointing flags some other way).
#[derive(Default)]
pub struct NoFlagsStore;

impl FlagsStore for NoFlagsStore {
    fn write(&self, _state: &MiscFlagsState) -> Result<(), MemoryError> {
        Ok(())
    }
}

/// The flags plus their write-through sink, owned by [`crate::Agent`].
pub struct MiscFlags {
    state: MiscFlagsState,
    store: Box<dyn FlagsStore>,
}

impl MiscFlags {
    pub fn new(state: MiscFlagsState, store: Box<dyn FlagsStore>) -> Self {
        Self { state, store }
    }

    pub fn state(&self) -> MiscFlagsState {
        self.state
    }

    pub fn memory_pressure_warning_alr_given(&self) -> bool {
        self.state.memory_pressure_warning_alr_given
    }

    pub fn conscious_memory_write_alr_forced(&self) -> bool {
        self.state.conscious_memory_write_alr_forced
    }

    pub fn messages_since_last_conscious_memory_write(&self) -> i64 {
        self.state.messages_since_last_conscious_memory_write
    }

    pub fn memory_write_function_forced(&self) -> bool {
        self.state.memory_write_function_forced
    }

    pub fn set_memory_pressure_warning_alr_given(&mut self, value: bool) -> Result<(), MemoryError> {
        self.state.memory_pressure_warning_alr_given = value;
        self.persist()
    }

    pub fn set_conscious_memory_write_alr_forced(&mut self, value: bool) -> Result<(), MemoryError> {
        self.state.conscious_memory_write_alr_forced = value;
        self.persist()
    }

    pub fn set_messages_since_last_conscious_memory_write(&mut self, value: i64) -> Result<(), MemoryError> {
        self.state.messages_since_last_conscious_memory_write = value;
        self.persist()
    }

    pub fn increment_messages_since_last_conscious_memory_write(&mut self) -> Result<(), MemoryError> {
        let next = self.state.messages_since_last_conscious_memory_write + 1;
        self.set_messages_since_last_conscious_memory_write(next)
    }

    pub fn set_memory_write_function_forced(&mut self, value: bool) -> Result<(), MemoryError> {
        self.state.memory_write_function_forced = value;
        self.persist()
    }

    fn persist(&self) -> Result<(), MemoryError> {
        self.store.write(&self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_advances_the_counter_and_persists() {
        let mut flags = MiscFlags::new(MiscFlagsState::default(), Box::new(NoFlagsStore));
        flags.increment_messages_since_last_conscious_memory_write().unwrap();
        flags.increment_messages_since_last_conscious_memory_write().unwrap();
        assert_eq!(flags.messages_since_last_conscious_memory_write(), 2);
    }

    #[test]
    fn setters_round_trip_through_state() {
        let mut flags = MiscFlags::new(MiscFlagsState::default(), Box::new(NoFlagsStore));
        flags.set_memory_pressure_warning_alr_given(true).unwrap();
        flags.set_conscious_memory_write_alr_forced(true).unwrap();
        flags.set_memory_write_function_forced(true).unwrap();
        assert!(flags.memory_pressure_warning_alr_given());
        assert!(flags.conscious_memory_write_alr_forced());
        assert!(flags.memory_write_function_forced());
    }

    struct FailingStore;
    impl FlagsStore for FailingStore {
        fn write(&self, _state: &MiscFlagsState) -> Result<(), MemoryError> {
            Err(MemoryError::Persistence("disk full".to_string()))
        }
    }

    #[test]
    fn a_failing_store_surfaces_the_error_from_every_setter() {
        let mut flags = MiscFlags::new(MiscFlagsState::default(), Box::new(FailingStore));
        assert!(flags.set_memory_write_function_forced(true).is_err());
    }
}
