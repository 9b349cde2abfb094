//! Validates a model's `function_call` against the declared tool surface and
//! runs it, ported from `original_source/llm_os/agent.py`'s
//! `Agent.step`/`__check_function_call` validation chain plus the `try/except`
//! around the actual call.
//!
//! Every failure here becomes a `Status: Failed. Result: …` tool response
//! folded back into the conversation rather than a propagated error — a bad
//! function call is the model's mistake to recover from, not a crash.

use std::collections::BTreeSet;

use memos_core::{AgentInterface, MessageRecord, ProtocolError};
use memos_functions::{execute, FunctionRegistry, ToolExecCtx, ToolError};
use memos_config::constants::dispatch::{
    FIRST_MESSAGE_COMPULSORY_FUNCTIONS, MEMORY_EDITING_FUNCTIONS, REQUEST_HEARTBEAT_ARG,
};

use crate::misc_flags::MiscFlagsState;

/// What dispatching one function call produced: the records to append to the
/// conversation, whether the step should continue without waiting on the
/// human (`heartbeat`), whether the call failed validation or execution
/// (`function_failed`), and whether it wrote to core memory (`memory_edited`,
/// used by the caller to clear the forced-memory-write flag).
pub struct DispatchOutcome {
    pub records: Vec<MessageRecord>,
    pub heartbeat: bool,
    pub function_failed: bool,
    pub memory_edited: bool,
}

/// Runs `call` against `registry`, enforcing every invariant in order:
/// presence and type of `name`, its existence in the registry, the
/// first-message and forced-memory-write gates, argument shape, unknown and
/// missing argument names, argument count, and per-argument types — before
/// finally invoking the tool. `conversation_user_id` is the record owner for
/// the resulting tool-response/system messages; `is_first_message` and
/// `flags` carry the two call-site gates that depend on conversation state
/// rather than the call itself.
pub async fn call_function(
    call: &serde_json::Value,
    registry: &FunctionRegistry,
    ctx: &mut ToolExecCtx<'_>,
    conversation_user_id: i64,
    is_first_message: bool,
    flags: MiscFlagsState,
) -> DispatchOutcome {
    match validate_and_run(call, registry, ctx, conversation_user_id, is_first_message, flags).await {
        Ok(outcome) => outcome,
        Err(err) => fail(&err.to_string(), conversation_user_id),
    }
}

async fn validate_and_run(
    call: &serde_json::Value,
    registry: &FunctionRegistry,
    ctx: &mut ToolExecCtx<'_>,
    conversation_user_id: i64,
    is_first_message: bool,
    flags: MiscFlagsState,
) -> Result<DispatchOutcome, ProtocolError> {
    let obj = call.as_object().ok_or(ProtocolError::ArgumentsNotObject)?;

    let name = match obj.get("name") {
        None | Some(serde_json::Value::Null) => return Err(ProtocolError::MissingFunctionName),
        Some(v) => v.as_str().ok_or(ProtocolError::FunctionNameNotString)?,
    };

    let tool = registry
        .get(name)
        .ok_or_else(|| ProtocolError::UnknownFunction(name.to_string()))?;

    if is_first_message && !FIRST_MESSAGE_COMPULSORY_FUNCTIONS.contains(&name) {
        return Err(ProtocolError::NotAllowedAsFirstMessage { function: name.to_string() });
    }

    if flags.memory_write_function_forced && !MEMORY_EDITING_FUNCTIONS.contains(&name) {
        return Err(ProtocolError::MemoryWriteRequired { function: name.to_string() });
    }

    let mut args = match obj.get("arguments") {
        None | Some(serde_json::Value::Null) => serde_json::Value::Object(serde_json::Map::new()),
        Some(v) => v.clone(),
    };
    let args_obj = args.as_object_mut().ok_or(ProtocolError::ArgumentsNotObject)?;

    // Lives inside `arguments` on the wire but isn't a tool parameter; pull it
    // out before the unknown/missing/type checks below see it.
    let request_heartbeat = args_obj
        .remove(REQUEST_HEARTBEAT_ARG)
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let declared: BTreeSet<&str> = tool.params.iter().map(|p| p.name.as_str()).collect();
    if let Some(unknown) = args_obj.keys().find(|k| !declared.contains(k.as_str())) {
        return Err(ProtocolError::UnknownArgument {
            function: name.to_string(),
            argument: unknown.clone(),
        });
    }

    if let Some(missing) = tool.required_params().find(|p| !args_obj.contains_key(&p.name)) {
        return Err(ProtocolError::MissingArgument {
            function: name.to_string(),
            argument: missing.name.clone(),
        });
    }

    if args_obj.len() > tool.params.len() {
        return Err(ProtocolError::TooManyArguments {
            function: name.to_string(),
            received: args_obj.len(),
            max: tool.params.len(),
        });
    }

    for param in &tool.params {
        if let Some(value) = args_obj.get(&param.name) {
            if !param.param_type.matches(value) {
                return Err(ProtocolError::WrongArgumentType {
                    function: name.to_string(),
                    argument: param.name.clone(),
                });
            }
        }
    }

    ctx.interface.function_call_message(name, &args);

    let memory_edited = MEMORY_EDITING_FUNCTIONS.contains(&name);
    let outcome = match execute(name, &args, ctx).await {
        Ok(result) => success(name, &result, conversation_user_id, request_heartbeat, memory_edited, ctx.interface),
        Err(err) => fail_tool(name, &err, conversation_user_id, ctx.interface),
    };
    Ok(outcome)
}

fn success(
    name: &str,
    result: &str,
    conversation_user_id: i64,
    request_heartbeat: bool,
    memory_edited: bool,
    interface: &dyn AgentInterface,
) -> DispatchOutcome {
    let message = if result.is_empty() {
        format!("Status: OK. Result: function '{name}' executed successfully.")
    } else {
        format!("Status: OK. Result: {result}")
    };
    interface.function_res_message(&message, false);
    DispatchOutcome {
        records: vec![MessageRecord::tool(message, conversation_user_id)],
        heartbeat: request_heartbeat,
        function_failed: false,
        memory_edited,
    }
}

fn fail_tool(
    name: &str,
    err: &ToolError,
    conversation_user_id: i64,
    interface: &dyn AgentInterface,
) -> DispatchOutcome {
    fail_with_interface(&format!("function '{name}' failed: {err}"), conversation_user_id, Some(interface))
}

fn fail(reason: &str, conversation_user_id: i64) -> DispatchOutcome {
    fail_with_interface(reason, conversation_user_id, None)
}

fn fail_with_interface(
    reason: &str,
    conversation_user_id: i64,
    interface: Option<&dyn AgentInterface>,
) -> DispatchOutcome {
    let message = format!("Status: Failed. Result: {reason}");
    if let Some(interface) = interface {
        interface.function_res_message(&message, true);
    }
    DispatchOutcome {
        records: vec![MessageRecord::tool(message, conversation_user_id)],
        heartbeat: true,
        function_failed: true,
        memory_edited: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memos_core::{ChatMessage, EmbeddingModel, HostError, ServerMessage};
    use memos_functions::registry::{ParamType, ToolSpec};
    use memos_memory::{ArchivalStore, FifoQueue, FifoState, Memory, NoFileStore, RecallLog, WorkingContext, WorkingContextState};
    use memos_tokenizer::{TokenCounter, TokenizerError, Tokenizer};
    use async_trait::async_trait;

    struct NullInterface;
    impl AgentInterface for NullInterface {
        fn push(&self, _message: ServerMessage) {}
    }

    struct WordCounter;
    impl TokenCounter for WordCounter {
        fn count_str(&self, text: &str) -> Result<usize, TokenizerError> {
            Ok(text.split_whitespace().count())
        }
        fn count_chat(&self, _messages: &[ChatMessage]) -> Result<usize, TokenizerError> {
            Ok(0)
        }
        fn context_window(&self) -> usize {
            8192
        }
    }

    struct FakeEmbedder;
    #[async_trait]
    impl EmbeddingModel for FakeEmbedder {
        async fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, HostError> {
            Ok(inputs.iter().map(|_| vec![1.0]).collect())
        }
    }

    fn registry() -> FunctionRegistry {
        memos_functions::default_registry().unwrap()
    }

    fn new_memory() -> Memory {
        let mut wc = WorkingContext::new(WorkingContextState::default(), 750, 500);
        let counter = WordCounter;
        wc.add_new_human_persona(1, "a curious human", &counter).unwrap();
        wc.submit_used_human_id(1);
        Memory::new(
            wc,
            FifoQueue::new(FifoState::default()),
            RecallLog::default(),
            ArchivalStore::new(Vec::new(), 8192, 100),
            Box::new(NoFileStore),
        )
    }

    #[tokio::test]
    async fn unknown_function_name_fails_with_heartbeat() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "not_a_function", "arguments": {}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(outcome.function_failed);
        assert!(outcome.heartbeat);
        assert!(outcome.records[0].content.contains("unknown function"));
    }

    #[tokio::test]
    async fn first_message_may_only_call_send_message() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "archival_memory_insert", "arguments": {"content": "x"}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, true, MiscFlagsState::default()).await;
        assert!(outcome.function_failed);
        assert!(outcome.records[0].content.contains("first message"));
    }

    #[tokio::test]
    async fn forced_memory_write_rejects_non_memory_functions() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "send_message", "arguments": {"message": "hi"}});
        let flags = MiscFlagsState { memory_write_function_forced: true, ..Default::default() };
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, flags).await;
        assert!(outcome.function_failed);
        assert!(outcome.records[0].content.contains("requires a prior memory write"));
    }

    #[tokio::test]
    async fn unknown_argument_name_fails_before_execution() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "send_message", "arguments": {"message": "hi", "extra": 1}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(outcome.function_failed);
        assert!(outcome.records[0].content.contains("unknown argument"));
    }

    #[tokio::test]
    async fn missing_required_argument_fails_before_execution() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "send_message", "arguments": {}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(outcome.function_failed);
        assert!(outcome.records[0].content.contains("missing required argument"));
    }

    #[tokio::test]
    async fn wrong_argument_type_fails_before_execution() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "send_message", "arguments": {"message": 5}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(outcome.function_failed);
        assert!(outcome.records[0].content.contains("wrong type"));
    }

    #[tokio::test]
    async fn a_well_formed_call_succeeds_and_honors_request_heartbeat() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({"name": "send_message", "arguments": {"message": "hi", "request_heartbeat": true}});
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(!outcome.function_failed);
        assert!(outcome.heartbeat);
        assert!(!outcome.memory_edited);
    }

    #[tokio::test]
    async fn a_memory_editing_call_reports_memory_edited() {
        let mut memory = new_memory();
        let interface = NullInterface;
        let counter = WordCounter;
        let embedder = FakeEmbedder;
        let tok = Tokenizer::new(tokenizers::models::bpe::BPE::default());
        let mut ctx = ToolExecCtx {
            memory: &mut memory,
            interface: &interface,
            user_id: 1,
            token_counter: &counter,
            embedder: &embedder,
            embedding_model_name: "embed",
            embedding_tokenizer: &tok,
            page_size: 5,
        };
        let call = serde_json::json!({
            "name": "core_memory_append",
            "arguments": {"section_name": "human", "content": "likes tea"}
        });
        let outcome = call_function(&call, &registry(), &mut ctx, 1, false, MiscFlagsState::default()).await;
        assert!(!outcome.function_failed);
        assert!(outcome.memory_edited);
    }
}
