//! Centralized defaults for the memory subsystem and function dispatch.
//!
//! These are the numbers the original system hardcoded in `constants.py`;
//! they are collected here as `const`s so [`crate::settings::Settings`] has a
//! single place to override them from and every crate sees the same values.

/// Working-context token budgets and queue-pressure thresholds.
pub mod memory {
    /// Max tokens for the persona block of the working context.
    pub const WORKING_CTX_PERSONA_MAX_TOKENS: usize = 750;

    /// Max tokens for a single human block of the working context.
    pub const WORKING_CTX_HUMAN_MAX_TOKENS: usize = 500;

    /// Fraction of the context window at which the agent warns (in its next
    /// reply) that memory is getting full.
    pub const WARNING_TOKEN_FRAC: f64 = 0.95;

    /// Fraction of the context window at which the agent is forced to
    /// summarize before the next model call.
    pub const FLUSH_TOKEN_FRAC: f64 = 0.98;

    /// Fraction of the context window the summarizer truncates the FIFO
    /// queue down to.
    pub const TRUNCATION_TOKEN_FRAC: f64 = 0.5;

    /// Minimum number of most-recent FIFO entries the summarizer always
    /// keeps, regardless of token pressure.
    pub const KEEP_LAST_N_MESSAGES: usize = 3;

    /// Number of in-context messages after which, absent a voluntary
    /// `core_memory_append`/`core_memory_replace`, the agent is forced to
    /// write to core memory.
    pub const FORCED_MEMORY_WRITE_AFTER_MESSAGES: usize = 7;

    /// Word budget the summarizer's system prompt holds the model to.
    pub const SUMMARY_WORD_LIMIT: usize = 100;

    pub(crate) fn default_persona_max_tokens() -> usize {
        WORKING_CTX_PERSONA_MAX_TOKENS
    }
    pub(crate) fn default_human_max_tokens() -> usize {
        WORKING_CTX_HUMAN_MAX_TOKENS
    }
    pub(crate) fn default_warning_frac() -> f64 {
        WARNING_TOKEN_FRAC
    }
    pub(crate) fn default_flush_frac() -> f64 {
        FLUSH_TOKEN_FRAC
    }
    pub(crate) fn default_truncation_frac() -> f64 {
        TRUNCATION_TOKEN_FRAC
    }
    pub(crate) fn default_keep_last_n() -> usize {
        KEEP_LAST_N_MESSAGES
    }
    pub(crate) fn default_forced_write_after() -> usize {
        FORCED_MEMORY_WRITE_AFTER_MESSAGES
    }
}

/// Archival and recall search defaults.
pub mod retrieval {
    /// Default page size for `conversation_search`/`archival_memory_search`
    /// when the model omits `count`.
    pub const DEFAULT_PAGE_SIZE: usize = 5;

    /// Token length archival content is chunked to before embedding.
    pub const ARCHIVAL_CHUNK_TOKENS: usize = 8192;

    /// Default number of nearest neighbors considered before paging.
    pub const ARCHIVAL_SEARCH_TOP_K: usize = 100;

    /// Default number of nearest neighbors considered when searching
    /// out-of-context function descriptions.
    pub const FUNCTION_SCHEMA_SEARCH_TOP_K: usize = 10;

    pub(crate) fn default_page_size() -> usize {
        DEFAULT_PAGE_SIZE
    }
    pub(crate) fn default_archival_chunk_tokens() -> usize {
        ARCHIVAL_CHUNK_TOKENS
    }
    pub(crate) fn default_archival_top_k() -> usize {
        ARCHIVAL_SEARCH_TOP_K
    }
    pub(crate) fn default_function_schema_top_k() -> usize {
        FUNCTION_SCHEMA_SEARCH_TOP_K
    }
}

/// Function-calling protocol constants.
pub mod dispatch {
    /// The reserved argument name the model uses to request another step
    /// without waiting on a new user message.
    pub const REQUEST_HEARTBEAT_ARG: &str = "request_heartbeat";

    /// Functions that may be called on the very first message of a brand new
    /// conversation, before any human persona has been established.
    pub const FIRST_MESSAGE_COMPULSORY_FUNCTIONS: &[&str] =
        &["send_message", "conversation_search"];

    /// Functions whose successful call resets the forced-memory-write
    /// counter and clears the "memory write expected" gate.
    pub const MEMORY_EDITING_FUNCTIONS: &[&str] =
        &["core_memory_append", "core_memory_replace", "archival_memory_insert"];

    /// The one function whose first-message heartbeat rule is relaxed (it is
    /// allowed to not request a heartbeat even on the first message).
    pub const SEND_MESSAGE_FUNCTION_NAME: &str = "send_message";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pressure_thresholds_are_ordered() {
        assert!(memory::TRUNCATION_TOKEN_FRAC < memory::WARNING_TOKEN_FRAC);
        assert!(memory::WARNING_TOKEN_FRAC < memory::FLUSH_TOKEN_FRAC);
        assert!(memory::FLUSH_TOKEN_FRAC <= 1.0);
    }

    #[test]
    fn first_message_allowlist_contains_send_message_and_search() {
        assert!(dispatch::FIRST_MESSAGE_COMPULSORY_FUNCTIONS.contains(&"send_message"));
        assert!(dispatch::FIRST_MESSAGE_COMPULSORY_FUNCTIONS.contains(&"conversation_search"));
    }
}
