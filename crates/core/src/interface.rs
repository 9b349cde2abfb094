//! The agent's one-way output channel towards whatever is watching a step.
//!
//! The original system prints emoji-prefixed lines to a terminal; a server
//! buffers the same events into a `server_message_stack` that is drained and
//! streamed to a client after each step (see `spec.md` §6). Both are the same
//! shape: a sink of typed events. `memos-agent` is generic over it so the
//! step loop never needs to know whether it's driving a CLI or an HTTP
//! response body.

use serde::{Deserialize, Serialize};

/// One entry in a step's `server_message_stack`.
///
/// `kind` matches the wire vocabulary in `spec.md` §6 exactly so
/// `memos-server` can serialize these without a translation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    WarningMessage { arguments: String },
    DebugMessage { arguments: String },
    InnerEmotion { arguments: (String, f64) },
    InternalMonologue { arguments: String },
    AssistantMessage { arguments: String },
    MemoryMessage { arguments: String },
    SystemMessage { arguments: String },
    UserMessage { arguments: String },
    FunctionCallMessage { arguments: serde_json::Value },
    FunctionResMessage { arguments: FunctionResult },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResult {
    pub message: String,
    pub has_error: bool,
}

/// Sink an agent step writes its user-facing and debug events to.
///
/// Implementations accumulate events and are drained once per step (the CLI
/// implementation prints immediately; the server implementation buffers into
/// a `Vec<ServerMessage>` it hands back in the streamed response body).
pub trait AgentInterface: Send + Sync {
    fn push(&self, message: ServerMessage);

    fn warning_message(&self, msg: &str) {
        self.push(ServerMessage::WarningMessage { arguments: msg.to_string() });
    }

    fn debug_message(&self, msg: &str) {
        self.push(ServerMessage::DebugMessage { arguments: msg.to_string() });
    }

    fn inner_emotion(&self, label: &str, intensity: f64) {
        self.push(ServerMessage::InnerEmotion {
            arguments: (label.to_string(), intensity),
        });
    }

    fn internal_monologue(&self, msg: &str) {
        self.push(ServerMessage::InternalMonologue { arguments: msg.to_string() });
    }

    fn assistant_message(&self, msg: &str) {
        self.push(ServerMessage::AssistantMessage { arguments: msg.to_string() });
    }

    fn memory_message(&self, msg: &str) {
        self.push(ServerMessage::MemoryMessage { arguments: msg.to_string() });
    }

    fn system_message(&self, msg: &str) {
        self.push(ServerMessage::SystemMessage { arguments: msg.to_string() });
    }

    fn user_message(&self, msg: &str) {
        self.push(ServerMessage::UserMessage { arguments: msg.to_string() });
    }

    fn function_call_message(&self, name: &str, arguments: &serde_json::Value) {
        let mut payload = serde_json::Map::new();
        payload.insert("name".to_string(), serde_json::Value::String(name.to_string()));
        payload.insert("arguments".to_string(), arguments.clone());
        self.push(ServerMessage::FunctionCallMessage {
            arguments: serde_json::Value::Object(payload),
        });
    }

    fn function_res_message(&self, message: &str, has_error: bool) {
        self.push(ServerMessage::FunctionResMessage {
            arguments: FunctionResult {
                message: message.to_string(),
                has_error,
            },
        });
    }
}

/// An interface that buffers events in insertion order, draining them per
/// step. This is the shape both the CLI and HTTP front ends build on: the
/// CLI variant prints on `push`, the server variant only buffers.
#[derive(Default)]
pub struct BufferedInterface {
    buffer: parking_lot::Mutex<Vec<ServerMessage>>,
}

impl BufferedInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every event buffered since the last drain.
    pub fn drain(&self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.buffer.lock())
    }
}

impl AgentInterface for BufferedInterface {
    fn push(&self, message: ServerMessage) {
        self.buffer.lock().push(message);
    }
}
