//! Conversation lifecycle: agent cache, serialized stepping, persistence
//! wiring.
//!
//! Ported from `original_source/server.py`'s `loaded_agents` global dict plus
//! a single `asyncio.Semaphore(1)` guarding the step loop — `SPEC_FULL.md`
//! §4.10 generalizes the dict to a `DashMap<ConvId, Arc<Mutex<Agent>>>`
//! (teacher's `dashmap` dependency) so lookups don't need a crate-wide lock,
//! while the semaphore stays global because a single local model host is the
//! actual bottleneck (Design Notes §9, "Semaphore granularity").

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use memos_agent::{Agent, MiscFlags, MiscFlagsState};
use memos_config::Settings;
use memos_core::{AgentInterface, ChatMessage, EmbeddingModel, LanguageModel};
use memos_functions::FunctionRegistry;
use memos_memory::{ArchivalStore, FifoQueue, Memory, NoFileStore, RecallLog, WorkingContext};
use memos_persistence::{ConversationState, ConversationStore, DiskFlagsStore, PersistenceError};
use memos_tokenizer::{ModelSpec, TokenizerRegistry};
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown conversation id: {0}")]
    UnknownConversation(String),

    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Tokenizer(#[from] memos_tokenizer::TokenizerError),

    #[error(transparent)]
    Memory(#[from] memos_core::MemoryError),

    #[error(transparent)]
    Step(#[from] memos_agent::StepError),

    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything shared across every conversation: the model host clients, the
/// tokenizer registry, the function catalogue, and the settings they were
/// all built from. Constructed once at server startup.
pub struct SharedResources {
    pub settings: Settings,
    pub registry: Arc<FunctionRegistry>,
    pub llm: Arc<dyn LanguageModel>,
    pub embedder: Arc<dyn EmbeddingModel>,
    pub tokenizer_registry: Arc<TokenizerRegistry>,
}

impl SharedResources {
    pub fn new(
        settings: Settings,
        registry: Arc<FunctionRegistry>,
        llm: Arc<dyn LanguageModel>,
        embedder: Arc<dyn EmbeddingModel>,
    ) -> Result<Self, RuntimeError> {
        let tokenizer_registry = TokenizerRegistry::new(&[
            ModelSpec {
                model_name: settings.host.model_name.clone(),
                tokenizer_file: settings.host.model_tokenizer_file.clone(),
                context_window: settings.host.model_context_window,
            },
            ModelSpec {
                model_name: settings.host.embedding_model_name.clone(),
                tokenizer_file: settings.host.embedding_tokenizer_file.clone(),
                context_window: settings.host.embedding_context_window,
            },
        ])?;
        Ok(Self {
            settings,
            registry,
            llm,
            embedder,
            tokenizer_registry: Arc::new(tokenizer_registry),
        })
    }
}

/// Caches `conv_id -> Agent` in a process-local map, lazily building an
/// Agent from disk state on first access, and serializes step execution
/// behind a single global semaphore (`spec.md` §5).
pub struct ConversationRuntime {
    shared: SharedResources,
    store: ConversationStore,
    agents: DashMap<String, Arc<Mutex<Agent>>>,
    step_permit: Arc<Semaphore>,
}

impl ConversationRuntime {
    pub fn new(shared: SharedResources) -> Self {
        let store = ConversationStore::new(shared.settings.paths.persistent_storage_root.clone());
        Self {
            shared,
            store,
            agents: DashMap::new(),
            step_permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.shared.settings
    }

    pub async fn list_conv_ids(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.store.list_conv_ids().await?)
    }

    pub async fn list_agent_personas(&self) -> Result<Vec<String>, RuntimeError> {
        list_persona_names(&self.shared.settings.paths.agent_personas_dir).await
    }

    pub async fn list_human_personas(&self) -> Result<Vec<String>, RuntimeError> {
        list_persona_names(&self.shared.settings.paths.human_personas_dir).await
    }

    /// Creates a new conversation: reads the two named persona files,
    /// allocates a unique directory name (`{agent}--{human}@{uuid}-{uuid}`,
    /// retried on collision exactly as `original_source/server.py::init_agent`
    /// does), and persists the initial blank FIFO/recall/misc-flags state
    /// alongside the seeded working context.
    pub async fn create_conversation(
        &self,
        agent_persona_name: &str,
        human_persona_name: &str,
    ) -> Result<String, RuntimeError> {
        let agent_persona = read_persona(&self.shared.settings.paths.agent_personas_dir, agent_persona_name).await?;
        let human_persona = read_persona(&self.shared.settings.paths.human_personas_dir, human_persona_name).await?;

        let agent_stub = strip_extension(agent_persona_name);
        let human_stub = strip_extension(human_persona_name);

        let mut conv_name = format!("{agent_stub}--{human_stub}@{}-{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        while self.store.conv_dir(&conv_name).exists() {
            conv_name = format!("{agent_stub}--{human_stub}@{}-{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        }

        let mut state = ConversationState::default();
        state.working_context.persona = agent_persona;
        state.working_context.humans.insert(1, human_persona);
        state.working_context.last_2_human_ids = vec![1];

        self.store.create(&conv_name, &state).await?;
        Ok(conv_name)
    }

    /// Adds a new human persona to an existing conversation's working
    /// context, assigning it the next unused id.
    pub async fn add_human(&self, conv_id: &str, human_persona_name: &str) -> Result<i64, RuntimeError> {
        let human_persona = read_persona(&self.shared.settings.paths.human_personas_dir, human_persona_name).await?;
        let agent = self.get_or_load(conv_id).await?;
        let mut agent = agent.lock().await;

        let counter = self.shared.tokenizer_registry.counter(&self.shared.settings.host.model_name)?;
        let new_id = agent
            .memory
            .working_context
            .state()
            .humans
            .keys()
            .max()
            .copied()
            .unwrap_or(0)
            + 1;
        agent.memory.working_context.add_new_human_persona(new_id, &human_persona, &counter)?;
        self.store
            .write_working_context(conv_id, agent.memory.working_context.state())
            .await?;
        Ok(new_id)
    }

    pub async fn list_humans(&self, conv_id: &str) -> Result<Vec<i64>, RuntimeError> {
        let agent = self.get_or_load(conv_id).await?;
        let agent = agent.lock().await;
        let mut ids: Vec<i64> = agent.memory.working_context.state().humans.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    /// Removes a conversation's directory and evicts it from the cache —
    /// the `DELETE /agent` route's teardown (`spec.md` §6).
    pub async fn delete_conversation(&self, conv_id: &str) -> Result<bool, RuntimeError> {
        self.agents.remove(conv_id);
        Ok(self.store.delete(conv_id).await?)
    }

    /// Looks up a cached Agent, or builds one from disk state and inserts it
    /// into the cache.
    pub async fn get_or_load(&self, conv_id: &str) -> Result<Arc<Mutex<Agent>>, RuntimeError> {
        if let Some(existing) = self.agents.get(conv_id) {
            return Ok(existing.clone());
        }

        let state = self
            .store
            .load(conv_id)
            .await
            .map_err(|_| RuntimeError::UnknownConversation(conv_id.to_string()))?;

        let working_context = WorkingContext::new(
            state.working_context,
            self.shared.settings.memory.persona_max_tokens,
            self.shared.settings.memory.human_max_tokens,
        );
        let fifo = FifoQueue::new(state.fifo);
        let recall = RecallLog::from_records(state.recall);
        let archival = ArchivalStore::new(
            state.archival,
            self.shared.settings.retrieval.archival_chunk_tokens,
            self.shared.settings.retrieval.archival_search_top_k,
        );

        let memory = Memory::new(working_context, fifo, recall, archival, Box::new(NoFileStore));

        let flags_store = DiskFlagsStore::new(self.store.conv_dir(conv_id), tokio::runtime::Handle::current());
        let misc_flags = MiscFlags::new(state.misc_flags, Box::new(flags_store));

        let interface: Arc<dyn memos_core::AgentInterface> = Arc::new(memos_core::BufferedInterface::new());

        let agent = Agent::new(
            memory,
            self.shared.registry.clone(),
            self.shared.llm.clone(),
            self.shared.embedder.clone(),
            self.shared.tokenizer_registry.clone(),
            self.shared.settings.clone(),
            interface,
            misc_flags,
            conversation_user_id(conv_id),
        );

        let agent = Arc::new(Mutex::new(agent));
        self.agents.insert(conv_id.to_string(), agent.clone());
        Ok(agent)
    }

    /// Runs one step for `conv_id`, appending `trigger` to memory first if
    /// given (a user message, or nothing for a heartbeat-continuation
    /// step), serialized behind the global step semaphore. Persists the
    /// FIFO and recall state after the step completes, successful or not —
    /// crash-consistency up to the last in-flight step (`spec.md` §5).
    ///
    /// A fresh [`memos_core::BufferedInterface`] is swapped in for the
    /// duration of the step and drained afterward into the returned
    /// `server_message_stack`, matching the per-step streamed object
    /// `spec.md` §6 describes; the cached Agent never keeps one across
    /// requests.
    pub async fn step(
        &self,
        conv_id: &str,
        user_id: i64,
        trigger: Option<ChatMessage>,
        is_first_message: bool,
    ) -> Result<RuntimeStepOutcome, RuntimeError> {
        let agent_handle = self.get_or_load(conv_id).await?;
        let _permit = self.step_permit.acquire().await.expect("semaphore is never closed");
        let mut agent = agent_handle.lock().await;

        let interface = Arc::new(memos_core::BufferedInterface::new());
        agent.interface = interface.clone();

        if let Some(message) = trigger {
            match message.role {
                memos_core::model::Role::User => {
                    interface.user_message(&message.content);
                    agent.memory.append(memos_core::MessageRecord::user(message.content, user_id));
                }
                memos_core::model::Role::Assistant => {
                    agent.memory.append(memos_core::MessageRecord::assistant(message.content, user_id));
                }
                memos_core::model::Role::System => {
                    interface.system_message(&message.content);
                    agent.memory.append(memos_core::MessageRecord::system(message.content, user_id));
                }
            }
        }

        let outcome = agent.step(user_id, is_first_message).await;

        self.store.write_fifo(conv_id, agent.memory.fifo.state()).await?;
        self.store
            .write_recall(conv_id, agent.memory.recall.records())
            .await?;
        self.store
            .write_working_context(conv_id, agent.memory.working_context.state())
            .await?;
        self.store
            .write_archival(conv_id, agent.memory.archival.notes())
            .await?;
        // misc_flags is written through on every mutation via DiskFlagsStore,
        // not re-persisted here.

        let counter = self.shared.tokenizer_registry.counter(&self.shared.settings.host.model_name)?;
        let ctx_window = counter.context_window();
        let current_ctx_token_count = agent.memory.main_ctx_message_seq_no_tokens(
            &self.shared.settings.prompts.system_instructions,
            &serde_json::Value::Array(self.shared.registry.in_context_schemas()),
            &counter,
        )?;

        let outcome = outcome?;
        Ok(RuntimeStepOutcome {
            heartbeat: outcome.heartbeat,
            function_failed: outcome.function_failed,
            server_message_stack: interface.drain(),
            current_ctx_token_count,
            ctx_window,
        })
    }
}

impl ConversationRuntime {
    /// Appends a system-role record and moves `user_id` to the front of the
    /// working context's MRU without running the step loop at all — the
    /// `POST /messages/send/no-heartbeat` route (`spec.md` §6), ported from
    /// `original_source/server.py::send_message_without_heartbeat`.
    pub async fn send_no_heartbeat(
        &self,
        conv_id: &str,
        user_id: i64,
        message: String,
    ) -> Result<RuntimeStepOutcome, RuntimeError> {
        let agent_handle = self.get_or_load(conv_id).await?;
        let mut agent = agent_handle.lock().await;

        let interface = Arc::new(memos_core::BufferedInterface::new());
        interface.system_message(&message);

        agent.memory.append(memos_core::MessageRecord::system(message, user_id));
        agent.memory.working_context.submit_used_human_id(user_id);

        self.store.write_fifo(conv_id, agent.memory.fifo.state()).await?;
        self.store
            .write_recall(conv_id, agent.memory.recall.records())
            .await?;
        self.store
            .write_working_context(conv_id, agent.memory.working_context.state())
            .await?;

        let counter = self.shared.tokenizer_registry.counter(&self.shared.settings.host.model_name)?;
        let ctx_window = counter.context_window();
        let current_ctx_token_count = agent.memory.main_ctx_message_seq_no_tokens(
            &self.shared.settings.prompts.system_instructions,
            &serde_json::Value::Array(self.shared.registry.in_context_schemas()),
            &counter,
        )?;

        Ok(RuntimeStepOutcome {
            heartbeat: false,
            function_failed: false,
            server_message_stack: interface.drain(),
            current_ctx_token_count,
            ctx_window,
        })
    }
}

/// The per-step result a streamed HTTP response carries: the step loop's
/// outcome plus the buffered events and token-pressure snapshot `spec.md`
/// §6's per-step object names (`duration` is added by the caller, which
/// knows when the request started).
pub struct RuntimeStepOutcome {
    pub heartbeat: bool,
    pub function_failed: bool,
    pub server_message_stack: Vec<memos_core::ServerMessage>,
    pub current_ctx_token_count: usize,
    pub ctx_window: usize,
}

/// `System`/`Assistant` records are stamped with the conversation's own id
/// rather than a human's; the original just reuses `1` as a sentinel
/// (`original_source/llm_os/agent.py` passes `self.conv_user_id`, itself
/// always `1` per conversation — there is exactly one "conversation owner"
/// id, distinct from individual human ids in the working context). We keep
/// that same convention.
fn conversation_user_id(_conv_id: &str) -> i64 {
    1
}

async fn list_persona_names(dir: &Path) -> Result<Vec<String>, RuntimeError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_err(dir, e))?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(dir, e))? {
        if entry.file_type().await.map_err(|e| io_err(dir, e))?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

async fn read_persona(dir: &Path, name: &str) -> Result<String, RuntimeError> {
    let path = dir.join(name);
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| RuntimeError::UnknownPersona(name.to_string()))
}

fn strip_extension(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}

fn io_err(path: &Path, source: std::io::Error) -> RuntimeError {
    RuntimeError::Io { path: path.to_path_buf(), source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use memos_core::{ChatOptions, ChatResponse, HostError, InferenceFormat};

    struct ScriptedModel;
    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: ChatOptions,
            _format: InferenceFormat,
        ) -> Result<ChatResponse, HostError> {
            Ok(ChatResponse {
                message: ChatMessage::assistant(
                    "{\"emotions\":[],\"thoughts\":[],\"function_call\":{\"name\":\"send_message\",\"arguments\":{\"message\":\"hi\"}}}",
                ),
            })
        }
    }

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn tokenizer_file(dir: &Path, name: &str) -> std::path::PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        let tokenizer = tokenizers::Tokenizer::new(tokenizers::models::bpe::BPE::default());
        tokenizer.save(&path, false).unwrap();
        path
    }

    async fn test_runtime() -> (tempfile::TempDir, ConversationRuntime) {
        let root = tempfile::tempdir().unwrap();
        let agents_dir = root.path().join("personas/agents");
        let humans_dir = root.path().join("personas/humans");
        tokio::fs::create_dir_all(&agents_dir).await.unwrap();
        tokio::fs::create_dir_all(&humans_dir).await.unwrap();
        tokio::fs::write(agents_dir.join("sam.txt"), "a helpful agent").await.unwrap();
        tokio::fs::write(humans_dir.join("alice.txt"), "a curious human").await.unwrap();

        let mut settings = Settings::default();
        settings.host.model_name = "test-model".to_string();
        settings.host.embedding_model_name = "test-embed".to_string();
        settings.host.model_tokenizer_file = tokenizer_file(&root.path().join("tok"), "model.json");
        settings.host.embedding_tokenizer_file = tokenizer_file(&root.path().join("tok"), "embed.json");
        settings.paths.persistent_storage_root = root.path().join("persistent_storage");
        settings.paths.agent_personas_dir = agents_dir;
        settings.paths.human_personas_dir = humans_dir;

        let registry = Arc::new(memos_functions::default_registry().unwrap());
        let llm: Arc<dyn LanguageModel> = Arc::new(ScriptedModel);
        let embedder: Arc<dyn EmbeddingModel> = Arc::new(FakeEmbedder);
        let shared = SharedResources::new(settings, registry, llm, embedder).unwrap();
        (root, ConversationRuntime::new(shared))
    }

    #[tokio::test]
    async fn lists_persona_names_from_their_directories() {
        let (_guard, runtime) = test_runtime().await;
        assert_eq!(runtime.list_agent_personas().await.unwrap(), vec!["sam.txt".to_string()]);
        assert_eq!(runtime.list_human_personas().await.unwrap(), vec!["alice.txt".to_string()]);
    }

    #[tokio::test]
    async fn create_conversation_seeds_persona_text_into_working_context() {
        let (_guard, runtime) = test_runtime().await;
        let conv_id = runtime.create_conversation("sam.txt", "alice.txt").await.unwrap();
        assert!(conv_id.starts_with("sam--alice@"));

        let agent = runtime.get_or_load(&conv_id).await.unwrap();
        let agent = agent.lock().await;
        assert_eq!(agent.memory.working_context.persona(), "a helpful agent");
        assert_eq!(agent.memory.working_context.human(1), Some("a curious human"));
    }

    #[tokio::test]
    async fn step_persists_fifo_growth_across_reloads() {
        let (_guard, runtime) = test_runtime().await;
        let conv_id = runtime.create_conversation("sam.txt", "alice.txt").await.unwrap();

        let outcome = runtime
            .step(&conv_id, 1, Some(ChatMessage::user("hello")), true)
            .await
            .unwrap();
        assert!(!outcome.heartbeat);

        runtime.agents.remove(&conv_id);
        let reloaded = runtime.get_or_load(&conv_id).await.unwrap();
        let reloaded = reloaded.lock().await;
        assert_eq!(reloaded.memory.fifo.no_messages_in_queue(), 3);
    }

    #[tokio::test]
    async fn delete_conversation_removes_it_from_disk_and_cache() {
        let (_guard, runtime) = test_runtime().await;
        let conv_id = runtime.create_conversation("sam.txt", "alice.txt").await.unwrap();
        runtime.get_or_load(&conv_id).await.unwrap();
        assert!(runtime.delete_conversation(&conv_id).await.unwrap());
        assert!(runtime.get_or_load(&conv_id).await.is_err());
    }
}
