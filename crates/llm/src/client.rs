//! `reqwest`-backed implementation of [`LanguageModel`]/[`EmbeddingModel`]
//! against the local model host's `chat`/`generate`/`embed` endpoints
//! (`spec.md` §6's LLM host contract: `chat(model, messages, options{num_ctx},
//! format?) -> {message: {content}}`; `embed(input) -> vectors`).
//!
//! Grounded on the request/response handling shape in the example pack's
//! embedding clients (build a JSON body, `.send().await?`, check status,
//! decode); unlike those examples we propagate failures as [`HostError`]
//! rather than falling back to a zero vector, since `SPEC_FULL.md` §7 routes
//! transient I/O failures up to the caller as a 5xx rather than swallowing
//! them.

use std::time::Duration;

use async_trait::async_trait;
use memos_core::{ChatMessage, ChatOptions, ChatResponse, EmbeddingModel, HostError, InferenceFormat, LanguageModel};
use serde::Deserialize;
use serde_json::json;

/// Thin HTTP client for the local model host. One instance is shared across
/// all conversations (it is stateless beyond connection pooling).
pub struct HostClient {
    base_url: String,
    client: reqwest::Client,
}

impl HostClient {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::builder()
                .timeout(request_timeout)
                .build()
                .expect("reqwest client builder with only a timeout never fails"),
        }
    }

    /// Issues a warm-up `generate` call so the host loads the model before
    /// the first real request pays the cold-start latency.
    pub async fn warm_up(&self, model: &str) -> Result<(), HostError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({ "model": model, "prompt": "", "stream": false });
        self.client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| HostError::Request(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ChatEnvelope {
    message: ChatMessagePayload,
}

#[derive(Debug, Deserialize)]
struct ChatMessagePayload {
    content: String,
}

#[derive(Debug, Deserialize)]
struct EmbedEnvelope {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl LanguageModel for HostClient {
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: ChatOptions,
        format: InferenceFormat,
    ) -> Result<ChatResponse, HostError> {
        let url = format!("{}/api/chat", self.base_url);
        let mut body = json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "num_ctx": options.num_ctx, "temperature": options.temperature },
        });
        match format {
            InferenceFormat::Unconstrained => {}
            InferenceFormat::Json => {
                body["format"] = json!("json");
            }
            InferenceFormat::Schema(schema) => {
                body["format"] = schema;
            }
        }

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(to_host_error)?;

        if !response.status().is_success() {
            return Err(HostError::Request(format!(
                "model host returned status {}",
                response.status()
            )));
        }

        let envelope: ChatEnvelope = response
            .json()
            .await
            .map_err(|e| HostError::MalformedResponse(e.to_string()))?;

        Ok(ChatResponse {
            message: ChatMessage::assistant(envelope.message.content),
        })
    }
}

#[async_trait]
impl EmbeddingModel for HostClient {
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
        let url = format!("{}/api/embed", self.base_url);
        let body = json!({ "model": model, "input": inputs });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(to_host_error)?;

        if !response.status().is_success() {
            return Err(HostError::Request(format!(
                "embedding host returned status {}",
                response.status()
            )));
        }

        let envelope: EmbedEnvelope = response
            .json()
            .await
            .map_err(|e| HostError::MalformedResponse(e.to_string()))?;

        if envelope.embeddings.len() != inputs.len() {
            return Err(HostError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                envelope.embeddings.len()
            )));
        }

        Ok(envelope.embeddings)
    }
}

fn to_host_error(err: reqwest::Error) -> HostError {
    if err.is_timeout() {
        HostError::Timeout(Duration::default())
    } else {
        HostError::Request(err.to_string())
    }
}
