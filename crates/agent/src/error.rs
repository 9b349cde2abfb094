//! The step loop's top-level error type: the union of the failure modes its
//! collaborators can raise that are not themselves handled in-band as a
//! protocol-error system message (those are folded into a heartbeat'd
//! response record instead of propagated — see [`crate::step`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Host(#[from] memos_core::HostError),

    #[error(transparent)]
    Tokenizer(#[from] memos_tokenizer::TokenizerError),

    #[error(transparent)]
    Memory(#[from] memos_core::MemoryError),

    #[error(transparent)]
    Protocol(#[from] memos_core::ProtocolError),
}
