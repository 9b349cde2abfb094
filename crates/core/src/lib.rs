//! Shared data model and collaborator traits for the agent runtime.
//!
//! Every other crate in the workspace depends on this one and nothing else
//! in the reverse direction; it exists so that `memos-memory`, `memos-agent`
//! and `memos-server` can all speak about messages, models and errors
//! without importing each other.

pub mod error;
pub mod interface;
pub mod message;
pub mod model;

pub use error::{ConfigError, HostError, MemoryError, ProtocolError};
pub use interface::{AgentInterface, BufferedInterface, FunctionResult, ServerMessage};
pub use message::{MessageKind, MessageRecord, Role};
pub use model::{
    ChatMessage, ChatOptions, ChatResponse, EmbeddingModel, InferenceFormat, LanguageModel,
};
