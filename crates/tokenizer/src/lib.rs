//! Model-family token counting and context-window bookkeeping.
//!
//! Ported from `original_source/llm_os/tokenisers.py`'s
//! `get_tokeniser_and_context_window`: a model identifier selects a
//! tokenizer, a context-window size, and (for some families) a chat-template
//! folding rule, all behind one registry so `memos-memory` and `memos-agent`
//! never special-case a model by name themselves.

mod chat_template;
mod registry;

pub use chat_template::fold_leading_system_into_user;
pub use registry::{ModelFamily, ModelSpec, ModelTokenCounter, TokenizerError, TokenizerRegistry};
/// Re-exported so downstream crates (e.g. `memos-memory`'s archival chunker)
/// can hand a raw tokenizer to `text-splitter`'s `ChunkConfig::with_sizer`
/// without taking their own direct dependency on the `tokenizers` crate.
pub use tokenizers::Tokenizer;

use memos_core::ChatMessage;

/// A model-bound token counter: one string-counting entry point and one
/// chat-templated-sequence entry point, matching `num_token_func` vs
/// `ct_num_token_func` in the original.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens a bare string encodes to.
    fn count_str(&self, text: &str) -> Result<usize, TokenizerError>;

    /// Number of tokens a chat-templated message sequence encodes to, after
    /// any model-family-specific folding (e.g. Mistral's leading-system-into-
    /// user fold) has been applied.
    fn count_chat(&self, messages: &[ChatMessage]) -> Result<usize, TokenizerError>;

    /// The model's context window, in tokens.
    fn context_window(&self) -> usize;
}
