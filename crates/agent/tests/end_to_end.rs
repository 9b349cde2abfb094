//! End-to-end scenarios from `spec.md` §8 that exercise the full step loop
//! (memory pressure -> forced memory edits -> summarizer flush) rather than
//! one module in isolation. Unlike the unit tests colocated with each
//! module, these drive [`Agent::step`]/[`Agent::maybe_summarize`] directly
//! against a real (if tiny) word-level tokenizer so token-pressure fractions
//! actually move, instead of the zero-vocab `BPE::default()` fixture the
//! unit tests use for cases that don't care about token counts.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use memos_agent::{Agent, MiscFlags, MiscFlagsState, NoFlagsStore};
use memos_config::Settings;
use memos_core::{
    AgentInterface, BufferedInterface, ChatMessage, ChatOptions, ChatResponse, EmbeddingModel,
    HostError, InferenceFormat, LanguageModel, MessageRecord, ServerMessage,
};
use memos_memory::{ArchivalStore, FifoQueue, FifoState, Memory, NoFileStore, RecallLog, WorkingContext, WorkingContextState};
use memos_tokenizer::{ModelSpec, TokenizerRegistry};

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
        if replies.is_empty() {
            panic!("scripted model ran out of replies");
        }
        Ok(ChatResponse { message: ChatMessage::assistant(replies.remove(0)) })
    }
}

struct FakeEmbedder;

#[async_trait]
impl EmbeddingModel for FakeEmbedder {
    async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
        Ok(inputs.iter().map(|_| vec![1.0]).collect())
    }
}

/// A minimal `tokenizer.json` whose model counts one token per
/// whitespace-separated word, so token-pressure fractions move
/// predictably with the amount of filler text seeded into the FIFO —
/// `BPE::default()`'s empty vocab (used by the module-level unit tests)
/// always counts zero tokens, which can't exercise pressure thresholds.
fn wordlevel_tokenizer_file() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join("memos-agent-e2e-wordlevel-tokenizer");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("tokenizer.json");
    if !path.exists() {
        let json = r#"{
  "version": "1.0",
  "truncation": null,
  "padding": null,
  "added_tokens": [],
  "normalizer": null,
  "pre_tokenizer": { "type": "Whitespace" },
  "post_processor": null,
  "decoder": null,
  "model": {
    "type": "WordLevel",
    "vocab": { "<unk>": 0 },
    "unk_token": "<unk>"
  }
}"#;
        std::fs::write(&path, json).unwrap();
    }
    path
}

struct WordCounter;
impl memos_tokenizer::TokenCounter for WordCounter {
    fn count_str(&self, text: &str) -> Result<usize, memos_tokenizer::TokenizerError> {
        Ok(text.split_whitespace().count())
    }
    fn count_chat(&self, _messages: &[ChatMessage]) -> Result<usize, memos_tokenizer::TokenizerError> {
        Ok(0)
    }
    fn context_window(&self) -> usize {
        usize::MAX
    }
}

const TEST_MODEL: &str = "wordlevel-test-model";

fn test_agent(context_window: usize, replies: Vec<String>) -> (Agent, Arc<BufferedInterface>) {
    let mut wc = WorkingContext::new(WorkingContextState::default(), 750, 500);
    wc.add_new_human_persona(1, "a curious human", &WordCounter).unwrap();
    wc.submit_used_human_id(1);

    let memory = Memory::new(
        wc,
        FifoQueue::new(FifoState::default()),
        RecallLog::default(),
        ArchivalStore::new(Vec::new(), context_window, 100),
        Box::new(NoFileStore),
    );

    let registry = Arc::new(memos_functions::default_registry().unwrap());
    let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedModel { replies: Mutex::new(replies) });
    let embedder: Arc<dyn EmbeddingModel> = Arc::new(FakeEmbedder);

    let mut settings = Settings::default();
    settings.host.model_name = TEST_MODEL.to_string();
    settings.host.embedding_model_name = TEST_MODEL.to_string();

    let tokenizer_registry = Arc::new(
        TokenizerRegistry::new(&[ModelSpec {
            model_name: TEST_MODEL.to_string(),
            tokenizer_file: wordlevel_tokenizer_file(),
            context_window,
        }])
        .unwrap(),
    );

    let buffered = Arc::new(BufferedInterface::new());
    let interface: Arc<dyn AgentInterface> = buffered.clone();
    let misc_flags = MiscFlags::new(MiscFlagsState::default(), Box::new(NoFlagsStore));

    let agent = Agent::new(memory, registry, llm, embedder, tokenizer_registry, settings, interface, misc_flags, 1);
    (agent, buffered)
}

fn send_message_reply(message: &str) -> String {
    format!(
        "{{\"emotions\":[],\"thoughts\":[],\"function_call\":{{\"name\":\"send_message\",\"arguments\":{{\"message\":\"{message}\"}}}}}}"
    )
}

fn core_memory_append_reply() -> String {
    "{\"emotions\":[],\"thoughts\":[],\"function_call\":{\"name\":\"core_memory_append\",\"arguments\":{\"section_name\":\"human\",\"content\":\"likes tea\"}}}".to_string()
}

/// Grows the FIFO one short record at a time until token pressure reaches
/// `target_frac`, without overshooting into the next threshold — each
/// append moves pressure by roughly one message's worth of tokens, which is
/// tiny next to the gap between adjacent threshold fractions at this
/// context window size.
fn seed_until_pressure(agent: &mut Agent, target_frac: f64) {
    let mut guard = 0;
    while agent.current_token_pressure().unwrap() < target_frac {
        agent.memory.append(MessageRecord::user("x", 1));
        guard += 1;
        assert!(guard < 20_000, "token pressure never reached {target_frac}; wordlevel tokenizer may not be counting tokens");
    }
}

/// Scenario 3: memory pressure crossing the warning threshold forces the
/// next reply into the memory-editing function set; a non-memory call is
/// rejected, and a successful memory-editing call clears the forced flags.
#[tokio::test]
async fn memory_warning_forces_a_memory_edit_before_releasing_the_gate() {
    let (mut agent, interface) = test_agent(
        10_000,
        vec![send_message_reply("hi"), send_message_reply("still here"), core_memory_append_reply()],
    );

    seed_until_pressure(&mut agent, agent.settings.memory.warning_token_frac);
    assert!(agent.current_token_pressure().unwrap() < agent.settings.memory.flush_token_frac);

    agent.memory.append(MessageRecord::user("hello", 1));
    let outcome = agent.step(1, false).await.unwrap();
    assert!(!outcome.function_failed);
    assert!(outcome.heartbeat, "crossing the warning threshold must force another step");
    assert!(agent.misc_flags.memory_write_function_forced());

    let drained = interface.drain();
    assert!(drained.iter().any(|m| matches!(m, ServerMessage::WarningMessage { .. })));

    // A non-memory-editing call is rejected while the gate is up.
    let outcome = agent.step(1, false).await.unwrap();
    assert!(outcome.function_failed);
    assert!(outcome.heartbeat);
    assert!(agent.misc_flags.memory_write_function_forced());

    // The next memory-editing call succeeds and clears every forced flag.
    let outcome = agent.step(1, false).await.unwrap();
    assert!(!outcome.function_failed);
    assert!(!agent.misc_flags.memory_write_function_forced());
    assert!(!agent.misc_flags.conscious_memory_write_alr_forced());
    assert_eq!(agent.misc_flags.messages_since_last_conscious_memory_write(), 0);
}

/// Scenario 4: once token pressure reaches the flush threshold, the
/// summarizer pops the oldest FIFO records, asks the model for a summary,
/// and prepends a system note — shrinking the queue while leaving recall
/// untouched.
#[tokio::test]
async fn flush_summarizer_shrinks_the_fifo_and_prepends_a_note() {
    let (mut agent, _interface) = test_agent(10_000, vec!["a concise summary".to_string()]);

    seed_until_pressure(&mut agent, agent.settings.memory.flush_token_frac);

    let pressure_before = agent.current_token_pressure().unwrap();
    let in_queue_before = agent.memory.fifo.no_messages_in_queue();
    let recall_before = agent.memory.recall.records().len();

    let note = agent.maybe_summarize().await.unwrap().expect("flush threshold must trigger summarization");
    assert!(note.content.starts_with("Note:"));
    assert_eq!(agent.memory.fifo.records().front().unwrap().content, note.content);
    assert!(agent.memory.fifo.no_messages_in_queue() < in_queue_before);
    assert_eq!(agent.memory.recall.records().len(), recall_before, "summarizing must not touch recall");

    let pressure_after = agent.current_token_pressure().unwrap();
    assert!(pressure_after < pressure_before);
}

/// Below the warning threshold, nothing about memory pressure intervenes:
/// a normal reply just runs with no forced flags and no heartbeat.
#[tokio::test]
async fn low_pressure_steps_do_not_force_a_memory_edit() {
    let (mut agent, interface) = test_agent(10_000, vec![send_message_reply("hi")]);
    agent.memory.append(MessageRecord::user("hello", 1));

    let outcome = agent.step(1, false).await.unwrap();
    assert!(!outcome.function_failed);
    assert!(!outcome.heartbeat);
    assert!(!agent.misc_flags.memory_write_function_forced());

    let drained = interface.drain();
    assert!(!drained.iter().any(|m| matches!(m, ServerMessage::WarningMessage { .. })));
}
