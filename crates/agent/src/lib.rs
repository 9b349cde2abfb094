//! The agent step loop: one conversation's memory plus the collaborators
//! (model host, tokenizer registry, function registry, output sink) needed
//! to run it forward one turn at a time.
//!
//! `memos-runtime` owns the lifecycle (construction, persistence, which
//! conversation a request belongs to); this crate only knows how to step one
//! already-assembled [`Agent`] forward.

pub mod dispatch;
pub mod error;
pub mod misc_flags;
pub mod response;
pub mod step;
pub mod summarize;

use std::sync::Arc;

use memos_config::Settings;
use memos_core::{AgentInterface, EmbeddingModel, LanguageModel};
use memos_functions::FunctionRegistry;
use memos_memory::Memory;
use memos_tokenizer::TokenizerRegistry;

pub use error::StepError;
pub use misc_flags::{FlagsStore, MiscFlags, MiscFlagsState, NoFlagsStore};
pub use step::StepOutcome;

/// One conversation's live state plus everything needed to step it:
/// `memory` is the tiered store ([`memos_memory::Memory`]); `registry` is the
/// shared, read-only function catalogue; `llm`/`embedder` are the shared
/// model host clients (often the same object playing both roles, see
/// `memos_llm::HostClient`); `tokenizer_registry` resolves the configured
/// model's token counter and context window; `interface` is the per-step
/// output sink; `misc_flags` persists the four memory-pressure bookkeeping
/// flags; `conversation_user_id` is the id system/assistant records are
/// stamped with.
pub struct Agent {
    pub memory: Memory,
    pub registry: Arc<FunctionRegistry>,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub tokenizer_registry: Arc<TokenizerRegistry>,
    pub settings: Settings,
    pub interface: Arc<dyn AgentInterface>,
    pub misc_flags: MiscFlags,
    pub conversation_user_id: i64,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        memory: Memory,
        registry: Arc<FunctionRegistry>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
        tokenizer_registry: Arc<TokenizerRegistry>,
        settings: Settings,
        interface: Arc<dyn AgentInterface>,
        misc_flags: MiscFlags,
        conversation_user_id: i64,
    ) -> Self {
        Self {
            memory,
            registry,
            llm,
            embedder,
            tokenizer_registry,
            settings,
            interface,
            misc_flags,
            conversation_user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memos_core::{ChatMessage, ChatOptions, ChatResponse, HostError, InferenceFormat, ServerMessage};
    use memos_memory::{ArchivalStore, FifoQueue, FifoState, NoFileStore, RecallLog, WorkingContext, WorkingContextState};
    use memos_tokenizer::ModelSpec;
    use std::sync::Mutex;

    struct ScriptedModel {
        replies: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: ChatOptions,
            _format: InferenceFormat,
        ) -> Result<ChatResponse, HostError> {
            let mut replies = self.replies.lock().unwrap();
            let content = if replies.is_empty() {
                "{\"emotions\":[],\"thoughts\":[],\"function_call\":{\"name\":\"send_message\",\"arguments\":{\"message\":\"done\"}}}".to_string()
            } else {
                replies.remove(0)
            };
            Ok(ChatResponse { message: ChatMessage::assistant(content) })
        }
    }

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    struct NullInterface;
    impl AgentInterface for NullInterface {
        fn push(&self, _message: ServerMessage) {}
    }

    fn tokenizer_file() -> std::path::PathBuf {
        // Any valid tokenizer.json fixture shipped for unit tests would go
        // here; build a BPE tokenizer in-memory and write it out once.
        let dir = std::env::temp_dir().join("memos-agent-test-tokenizer");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tokenizer.json");
        if !path.exists() {
            let tokenizer = tokenizers::Tokenizer::new(tokenizers::models::bpe::BPE::default());
            tokenizer.save(&path, false).unwrap();
        }
        path
    }

    fn test_agent(replies: Vec<String>) -> Agent {
        let mut wc = WorkingContext::new(WorkingContextState::default(), 750, 500);
        struct WordCounter;
        impl memos_tokenizer::TokenCounter for WordCounter {
            fn count_str(&self, text: &str) -> Result<usize, memos_tokenizer::TokenizerError> {
                Ok(text.split_whitespace().count())
            }
            fn count_chat(&self, _messages: &[ChatMessage]) -> Result<usize, memos_tokenizer::TokenizerError> {
                Ok(0)
            }
            fn context_window(&self) -> usize {
                8192
            }
        }
        wc.add_new_human_persona(1, "a curious human", &WordCounter).unwrap();
        wc.submit_used_human_id(1);

        let memory = Memory::new(
            wc,
            FifoQueue::new(FifoState::default()),
            RecallLog::default(),
            ArchivalStore::new(Vec::new(), 8192, 100),
            Box::new(NoFileStore),
        );

        let registry = Arc::new(memos_functions::default_registry().unwrap());
        let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedModel { replies: Mutex::new(replies) });
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(FakeEmbedder);

        let mut settings = Settings::default();
        settings.host.model_name = "test-model".to_string();
        settings.host.embedding_model_name = "test-model".to_string();

        let tokenizer_registry = Arc::new(
            TokenizerRegistry::new(&[ModelSpec {
                model_name: "test-model".to_string(),
                tokenizer_file: tokenizer_file(),
                context_window: 8192,
            }])
            .unwrap(),
        );

        let interface: Arc<dyn AgentInterface> = Arc::new(NullInterface);
        let misc_flags = MiscFlags::new(MiscFlagsState::default(), Box::new(NoFlagsStore));

        Agent::new(memory, registry, llm, embedder, tokenizer_registry, settings, interface, misc_flags, 1)
    }

    #[tokio::test]
    async fn a_well_formed_first_reply_sends_a_message_without_a_heartbeat() {
        let mut agent = test_agent(vec![]);
        agent.memory.append(memos_core::MessageRecord::user("hello", 1));
        let outcome = agent.step(1, true).await.unwrap();
        assert!(!outcome.function_failed);
        assert!(!outcome.heartbeat);
    }

    #[tokio::test]
    async fn malformed_json_is_recorded_as_a_protocol_error_and_requests_a_heartbeat() {
        let mut agent = test_agent(vec!["not valid json".to_string()]);
        agent.memory.append(memos_core::MessageRecord::user("hello", 1));
        let outcome = agent.step(1, true).await.unwrap();
        assert!(outcome.function_failed);
        assert!(outcome.heartbeat);
        let last = agent.memory.fifo.records().back().unwrap();
        assert!(last.content.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn a_schema_violating_function_call_fails_with_a_heartbeat() {
        let bad_call = "{\"emotions\":[],\"thoughts\":[],\"function_call\":{\"name\":\"nonexistent_tool\",\"arguments\":{}}}".to_string();
        let mut agent = test_agent(vec![bad_call]);
        agent.memory.append(memos_core::MessageRecord::user("hello", 1));
        let outcome = agent.step(1, true).await.unwrap();
        assert!(outcome.function_failed);
        assert!(outcome.heartbeat);
    }

    #[tokio::test]
    async fn a_memory_edit_resets_the_forced_write_counter() {
        let call = "{\"emotions\":[],\"thoughts\":[],\"function_call\":{\"name\":\"core_memory_append\",\"arguments\":{\"section_name\":\"human\",\"content\":\"likes tea\"}}}".to_string();
        let mut agent = test_agent(vec![call]);
        agent.misc_flags.set_messages_since_last_conscious_memory_write(5).unwrap();
        agent.memory.append(memos_core::MessageRecord::user("hello", 1));
        let outcome = agent.step(1, false).await.unwrap();
        assert!(!outcome.function_failed);
        assert_eq!(agent.misc_flags.messages_since_last_conscious_memory_write(), 0);
    }
}
