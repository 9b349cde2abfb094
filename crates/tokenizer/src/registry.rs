//! Model identifier -> loaded tokenizer + context window + chat-template
//! family, mirroring `original_source/llm_os/tokenisers.py`'s
//! `get_tokeniser_and_context_window` dispatch table.

use std::collections::HashMap;
use std::path::PathBuf;

use memos_core::ChatMessage;
use thiserror::Error;
use tokenizers::Tokenizer;

use crate::chat_template;
use crate::TokenCounter;

/// The chat-template family a model belongs to. Unrecognized identifiers are
/// registered as `Generic` rather than rejected outright, so a new model can
/// be pointed at without a code change as long as its tokenizer file loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFamily {
    Llama3,
    OpenHermes,
    Mistral,
    Generic,
}

impl ModelFamily {
    /// Best-effort classification from a model identifier, matching the
    /// substring checks `tokenisers.py` used against Ollama model names.
    pub fn from_model_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("llama3") || lower.contains("llama-3") {
            ModelFamily::Llama3
        } else if lower.contains("hermes") {
            ModelFamily::OpenHermes
        } else if lower.contains("mistral") || lower.contains("mixtral") {
            ModelFamily::Mistral
        } else {
            ModelFamily::Generic
        }
    }

    fn render(self, messages: &[ChatMessage]) -> Result<String, TokenizerError> {
        match self {
            ModelFamily::Llama3 => Ok(chat_template::render_llama3(messages)),
            ModelFamily::OpenHermes => Ok(chat_template::render_chatml(messages)),
            ModelFamily::Mistral => {
                let folded = chat_template::fold_leading_system_into_user(messages)
                    .map_err(TokenizerError::ChatTemplate)?;
                Ok(chat_template::render_mistral(&folded))
            }
            ModelFamily::Generic => Ok(chat_template::render_generic(messages)),
        }
    }
}

#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("model '{0}' is not registered")]
    UnknownModel(String),
    #[error("failed to load tokenizer file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to encode text: {0}")]
    Encode(Box<dyn std::error::Error + Send + Sync>),
    #[error("chat template error: {0}")]
    ChatTemplate(String),
}

/// One registered model: its loaded tokenizer, context window, and family.
struct Entry {
    tokenizer: Tokenizer,
    context_window: usize,
    family: ModelFamily,
}

/// A bound view of one [`Entry`] implementing [`TokenCounter`]; obtained
/// from [`TokenizerRegistry::counter`].
pub struct ModelTokenCounter<'a> {
    entry: &'a Entry,
}

impl TokenCounter for ModelTokenCounter<'_> {
    fn count_str(&self, text: &str) -> Result<usize, TokenizerError> {
        let encoding = self
            .entry
            .tokenizer
            .encode(text, false)
            .map_err(TokenizerError::Encode)?;
        Ok(encoding.get_ids().len())
    }

    fn count_chat(&self, messages: &[ChatMessage]) -> Result<usize, TokenizerError> {
        let rendered = self.entry.family.render(messages)?;
        self.count_str(&rendered)
    }

    fn context_window(&self) -> usize {
        self.entry.context_window
    }
}

/// Static configuration for one model: where its `tokenizer.json` file lives
/// and what context window it was served with.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model_name: String,
    pub tokenizer_file: PathBuf,
    pub context_window: usize,
}

/// Loads and holds every configured model's tokenizer. Construction fails
/// fast on any model whose tokenizer file is missing or malformed, matching
/// the original's "unsupported model" `ValueError` at agent-startup time
/// rather than at first use.
pub struct TokenizerRegistry {
    models: HashMap<String, Entry>,
}

impl TokenizerRegistry {
    pub fn new(specs: &[ModelSpec]) -> Result<Self, TokenizerError> {
        let mut models = HashMap::with_capacity(specs.len());
        for spec in specs {
            let tokenizer =
                Tokenizer::from_file(&spec.tokenizer_file).map_err(|source| TokenizerError::Load {
                    path: spec.tokenizer_file.clone(),
                    source,
                })?;
            models.insert(
                spec.model_name.clone(),
                Entry {
                    tokenizer,
                    context_window: spec.context_window,
                    family: ModelFamily::from_model_name(&spec.model_name),
                },
            );
        }
        Ok(Self { models })
    }

    /// Returns a [`TokenCounter`] bound to `model_name`, or
    /// [`TokenizerError::UnknownModel`] if it was never registered.
    pub fn counter(&self, model_name: &str) -> Result<ModelTokenCounter<'_>, TokenizerError> {
        self.models
            .get(model_name)
            .map(|entry| ModelTokenCounter { entry })
            .ok_or_else(|| TokenizerError::UnknownModel(model_name.to_string()))
    }

    pub fn family_of(&self, model_name: &str) -> Result<ModelFamily, TokenizerError> {
        self.models
            .get(model_name)
            .map(|entry| entry.family)
            .ok_or_else(|| TokenizerError::UnknownModel(model_name.to_string()))
    }

    /// Exposes the raw loaded tokenizer for `model_name`, for callers (the
    /// archival chunker) that need to hand it to `text-splitter` directly
    /// rather than go through [`TokenCounter`].
    pub fn raw_tokenizer(&self, model_name: &str) -> Result<&Tokenizer, TokenizerError> {
        self.models
            .get(model_name)
            .map(|entry| &entry.tokenizer)
            .ok_or_else(|| TokenizerError::UnknownModel(model_name.to_string()))
    }
}
