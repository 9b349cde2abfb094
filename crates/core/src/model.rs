use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The three ways the agent can constrain a single inference call.
///
/// `Unconstrained` lets the model answer free-form (used for summarization);
/// `Json` asks the host to guarantee syntactically valid JSON without
/// constraining its shape; `Schema` additionally pins the JSON to a schema the
/// host enforces token-by-token, when the host supports it.
#[derive(Debug, Clone)]
pub enum InferenceFormat {
    Unconstrained,
    Json,
    Schema(serde_json::Value),
}

#[derive(Debug, Clone, Copy)]
pub struct ChatOptions {
    pub num_ctx: usize,
    pub temperature: f32,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            num_ctx: 8192,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: ChatMessage,
}

/// A chat-completion backed model host. Implemented by `memos-llm` against
/// the local model server; swappable with a scripted fake in tests.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
        format: InferenceFormat,
    ) -> Result<ChatResponse, HostError>;
}

/// A text embedding host, used for archival memory chunk vectors.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError>;
}
