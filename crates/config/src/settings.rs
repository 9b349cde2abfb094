//! Layered runtime configuration.
//!
//! Mirrors the teacher's `config::Config` + `serde` pattern: defaults are
//! baked into [`Settings::default`], a TOML file overrides them, and
//! environment variables prefixed `MEMOS_` override the file. Nothing in the
//! runtime looks up an env var or a file path directly — everything is
//! threaded through this struct at `Agent`/`ConversationRuntime`
//! construction (Design Notes §9, "Global state").

use std::path::PathBuf;

use memos_core::ConfigError;
use serde::{Deserialize, Serialize};

use crate::constants::{dispatch, memory, retrieval};
use crate::prompts::PromptDefaults;

/// Memory-pressure and working-context token budgets. Defaults match
/// `spec.md` §4; every field is overridable from `[memory]` in the config
/// file so operators can tune thresholds per deployed model without a
/// rebuild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default = "memory::default_persona_max_tokens")]
    pub persona_max_tokens: usize,
    #[serde(default = "memory::default_human_max_tokens")]
    pub human_max_tokens: usize,
    #[serde(default = "memory::default_warning_frac")]
    pub warning_token_frac: f64,
    #[serde(default = "memory::default_flush_frac")]
    pub flush_token_frac: f64,
    #[serde(default = "memory::default_truncation_frac")]
    pub truncation_token_frac: f64,
    #[serde(default = "memory::default_keep_last_n")]
    pub keep_last_n_messages: usize,
    #[serde(default = "memory::default_forced_write_after")]
    pub forced_memory_write_after_messages: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            persona_max_tokens: memory::WORKING_CTX_PERSONA_MAX_TOKENS,
            human_max_tokens: memory::WORKING_CTX_HUMAN_MAX_TOKENS,
            warning_token_frac: memory::WARNING_TOKEN_FRAC,
            flush_token_frac: memory::FLUSH_TOKEN_FRAC,
            truncation_token_frac: memory::TRUNCATION_TOKEN_FRAC,
            keep_last_n_messages: memory::KEEP_LAST_N_MESSAGES,
            forced_memory_write_after_messages: memory::FORCED_MEMORY_WRITE_AFTER_MESSAGES,
        }
    }
}

/// Retrieval page sizes and search fan-out, overridable from `[retrieval]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default = "retrieval::default_page_size")]
    pub default_page_size: usize,
    #[serde(default = "retrieval::default_archival_chunk_tokens")]
    pub archival_chunk_tokens: usize,
    #[serde(default = "retrieval::default_archival_top_k")]
    pub archival_search_top_k: usize,
    #[serde(default = "retrieval::default_function_schema_top_k")]
    pub function_schema_search_top_k: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_page_size: retrieval::DEFAULT_PAGE_SIZE,
            archival_chunk_tokens: retrieval::ARCHIVAL_CHUNK_TOKENS,
            archival_search_top_k: retrieval::ARCHIVAL_SEARCH_TOP_K,
            function_schema_search_top_k: retrieval::FUNCTION_SCHEMA_SEARCH_TOP_K,
        }
    }
}

/// The local model host's connection details and chat/embedding model ids,
/// plus the tokenizer files `memos-runtime` loads a [`memos_tokenizer::TokenizerRegistry`]
/// from at startup (the original resolved these by a hardcoded model-name
/// dispatch table in `tokenisers.py`; a config-driven lookup is the
/// idiomatic port since the host model is itself config-driven here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSettings {
    #[serde(default = "HostSettings::default_url")]
    pub url: String,
    #[serde(default = "HostSettings::default_model_name")]
    pub model_name: String,
    #[serde(default = "HostSettings::default_embedding_model_name")]
    pub embedding_model_name: String,
    #[serde(default = "HostSettings::default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "HostSettings::default_model_tokenizer_file")]
    pub model_tokenizer_file: PathBuf,
    #[serde(default = "HostSettings::default_model_context_window")]
    pub model_context_window: usize,
    #[serde(default = "HostSettings::default_embedding_tokenizer_file")]
    pub embedding_tokenizer_file: PathBuf,
    #[serde(default = "HostSettings::default_embedding_context_window")]
    pub embedding_context_window: usize,
}

impl HostSettings {
    fn default_url() -> String {
        "http://localhost:11434".to_string()
    }
    fn default_model_name() -> String {
        "llama3".to_string()
    }
    fn default_embedding_model_name() -> String {
        "nomic-embed-text".to_string()
    }
    fn default_request_timeout_secs() -> u64 {
        120
    }
    fn default_model_tokenizer_file() -> PathBuf {
        PathBuf::from("tokenizers/llama3.json")
    }
    fn default_model_context_window() -> usize {
        8192
    }
    fn default_embedding_tokenizer_file() -> PathBuf {
        PathBuf::from("tokenizers/nomic-embed-text.json")
    }
    fn default_embedding_context_window() -> usize {
        8192
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            model_name: Self::default_model_name(),
            embedding_model_name: Self::default_embedding_model_name(),
            request_timeout_secs: Self::default_request_timeout_secs(),
            model_tokenizer_file: Self::default_model_tokenizer_file(),
            model_context_window: Self::default_model_context_window(),
            embedding_tokenizer_file: Self::default_embedding_tokenizer_file(),
            embedding_context_window: Self::default_embedding_context_window(),
        }
    }
}

/// Filesystem layout: persona directories and the persistent-storage root
/// described in `spec.md` §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSettings {
    #[serde(default = "PathSettings::default_persistent_storage_root")]
    pub persistent_storage_root: PathBuf,
    #[serde(default = "PathSettings::default_agent_personas_dir")]
    pub agent_personas_dir: PathBuf,
    #[serde(default = "PathSettings::default_human_personas_dir")]
    pub human_personas_dir: PathBuf,
}

impl PathSettings {
    fn default_persistent_storage_root() -> PathBuf {
        PathBuf::from("persistent_storage")
    }
    fn default_agent_personas_dir() -> PathBuf {
        PathBuf::from("personas/agents")
    }
    fn default_human_personas_dir() -> PathBuf {
        PathBuf::from("personas/humans")
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            persistent_storage_root: Self::default_persistent_storage_root(),
            agent_personas_dir: Self::default_agent_personas_dir(),
            human_personas_dir: Self::default_human_personas_dir(),
        }
    }
}

/// The inference-constraint mode the step loop asks the model host for.
/// Matches `original_source/llm_os/agent.py`'s `INFERENCE_STRICTNESS` match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceStrictness {
    Unconstrained,
    Json,
    Structured,
}

impl Default for InferenceStrictness {
    fn default() -> Self {
        InferenceStrictness::Structured
    }
}

/// Top-level settings object threaded into `Agent`/`ConversationRuntime`
/// construction. Never looked up ad hoc at a call site (Design Notes §9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub host: HostSettings,
    #[serde(default)]
    pub memory: MemorySettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub paths: PathSettings,
    #[serde(default)]
    pub inference_strictness: InferenceStrictness,
    #[serde(default)]
    pub prompts: PromptDefaults,
}

impl Settings {
    /// Load defaults, then a TOML file at `path` if present, then
    /// `MEMOS_`-prefixed environment variables (double-underscore separated,
    /// e.g. `MEMOS_HOST__MODEL_NAME`).
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MEMOS")
                .separator("__")
                .try_parsing(true),
        );

        let built = builder
            .build()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.truncation_token_frac >= self.memory.warning_token_frac {
            return Err(ConfigError::Invalid {
                key: "memory.truncation_token_frac".to_string(),
                reason: "must be lower than memory.warning_token_frac".to_string(),
            });
        }
        if self.memory.warning_token_frac >= self.memory.flush_token_frac {
            return Err(ConfigError::Invalid {
                key: "memory.warning_token_frac".to_string(),
                reason: "must be lower than memory.flush_token_frac".to_string(),
            });
        }
        if self.memory.flush_token_frac > 1.0 {
            return Err(ConfigError::Invalid {
                key: "memory.flush_token_frac".to_string(),
                reason: "must not exceed 1.0".to_string(),
            });
        }
        if self.host.url.is_empty() {
            return Err(ConfigError::Missing("host.url".to_string()));
        }
        Ok(())
    }
}

/// The argument name the dispatcher strips from the user-visible argument
/// list before validating it, re-exported here so config stays the single
/// place every crate imports protocol constants from.
pub const REQUEST_HEARTBEAT_ARG: &str = dispatch::REQUEST_HEARTBEAT_ARG;
