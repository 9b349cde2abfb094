//! The in-context base function set, ported from
//! `original_source/llm_os/functions/function_sets/base.py`: `send_message`,
//! `core_memory_append`, `core_memory_replace`, `conversation_search`,
//! `conversation_search_date`, `archival_memory_insert`,
//! `archival_memory_search`.
//!
//! Each function takes a `&mut ToolExecCtx` and its raw JSON arguments
//! (already validated against its [`ToolSpec`](crate::registry::ToolSpec) by
//! `memos-agent::dispatch` before `execute` is reached) and returns the
//! result text the dispatcher wraps as `Status: OK. Result: …` — or an error
//! it wraps as `Status: Failed. Result: …`.

use chrono::NaiveDate;
use memos_core::AgentInterface;
use memos_memory::{Memory, Section};
use memos_tokenizer::{TokenCounter, Tokenizer};
use memos_core::EmbeddingModel;
use thiserror::Error;

use crate::registry::{ParamType, ToolSpec};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    Memory(#[from] memos_core::MemoryError),

    #[error("{0}")]
    Host(#[from] memos_core::HostError),

    #[error("{0}")]
    Tokenizer(#[from] memos_tokenizer::TokenizerError),

    #[error("'{argument}' argument must be {expected}")]
    InvalidArgument { argument: String, expected: String },

    #[error("no human has been established for this conversation yet")]
    NoActiveHuman,
}

/// Everything a built-in function needs to run: the conversation's memory,
/// its output sink, the human this step belongs to, and the collaborators
/// (tokenizer, embedding host) memory operations need.
pub struct ToolExecCtx<'a> {
    pub memory: &'a mut Memory,
    pub interface: &'a dyn AgentInterface,
    pub user_id: i64,
    pub token_counter: &'a dyn TokenCounter,
    pub embedder: &'a dyn EmbeddingModel,
    pub embedding_model_name: &'a str,
    pub embedding_tokenizer: &'a Tokenizer,
    pub page_size: usize,
}

impl ToolExecCtx<'_> {
    /// Resolves the "human last conversed with" a tool implicitly targets:
    /// the tail of the working context's MRU, falling back to the step's
    /// own `user_id` if the MRU is empty (first message of a conversation).
    fn active_human_id(&self) -> i64 {
        self.memory
            .working_context
            .last_2_human_ids()
            .last()
            .copied()
            .unwrap_or(self.user_id)
    }
}

/// Declares the seven built-in in-context tools' schemas, set name `"base"`.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "send_message",
            "Sends a message to the human user. Use other functions first if you need them to answer the user's query.",
            "base",
            true,
        )
        .param("message", ParamType::String, "message contents", true),
        ToolSpec::new(
            "core_memory_append",
            "Append to the contents of core memory.",
            "base",
            true,
        )
        .param(
            "section_name",
            ParamType::String,
            "'persona' or 'human' (the human you last conversed with)",
            true,
        )
        .param("content", ParamType::String, "content to append", true),
        ToolSpec::new(
            "core_memory_replace",
            "Replace the contents of core memory. Use an empty new_content to delete.",
            "base",
            true,
        )
        .param(
            "section_name",
            ParamType::String,
            "'persona' or 'human' (the human you last conversed with)",
            true,
        )
        .param("old_content", ParamType::String, "exact string to replace", true)
        .param("new_content", ParamType::String, "replacement content", true),
        ToolSpec::new(
            "conversation_search",
            "Search prior conversation history with the user you last conversed with using case-insensitive string matching.",
            "base",
            true,
        )
        .param("query", ParamType::String, "string to search for", true)
        .param("page", ParamType::Integer, "page index, defaults to 0", false),
        ToolSpec::new(
            "conversation_search_date",
            "Search prior conversation history with the user you last conversed with using a date range.",
            "base",
            true,
        )
        .param("start_date", ParamType::String, "'YYYY-MM-DD'", true)
        .param("end_date", ParamType::String, "'YYYY-MM-DD'", true)
        .param("page", ParamType::Integer, "page index, defaults to 0", false),
        ToolSpec::new(
            "archival_memory_insert",
            "Add to archival memory. Phrase the content so it can be queried later.",
            "base",
            true,
        )
        .param("content", ParamType::String, "content to write", true),
        ToolSpec::new(
            "archival_memory_search",
            "Search archival memory using semantic (embedding-based) search.",
            "base",
            true,
        )
        .param("query", ParamType::String, "string to search for", true)
        .param("page", ParamType::Integer, "page index, defaults to 0", false),
    ]
}

/// Runs one built-in function by name. The caller (`memos-agent::dispatch`)
/// has already validated `args` against the declared schema.
pub async fn execute(name: &str, args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    match name {
        "send_message" => send_message(args, ctx),
        "core_memory_append" => core_memory_append(args, ctx),
        "core_memory_replace" => core_memory_replace(args, ctx),
        "conversation_search" => conversation_search(args, ctx),
        "conversation_search_date" => conversation_search_date(args, ctx),
        "archival_memory_insert" => archival_memory_insert(args, ctx).await,
        "archival_memory_search" => archival_memory_search(args, ctx).await,
        other => unreachable!("dispatch validated '{other}' as a known function before calling execute"),
    }
}

fn str_arg<'a>(args: &'a serde_json::Value, name: &str) -> &'a str {
    args.get(name).and_then(|v| v.as_str()).unwrap_or_default()
}

fn page_arg(args: &serde_json::Value) -> Result<usize, ToolError> {
    match args.get("page") {
        None | Some(serde_json::Value::Null) => Ok(0),
        Some(v) => v.as_u64().map(|n| n as usize).ok_or_else(|| ToolError::InvalidArgument {
            argument: "page".to_string(),
            expected: "an integer".to_string(),
        }),
    }
}

fn section_of(ctx: &ToolExecCtx<'_>, raw: &str) -> Result<Section, ToolError> {
    if raw == "human" {
        Ok(Section::Human(ctx.active_human_id()))
    } else {
        Section::parse(raw).ok_or_else(|| ToolError::InvalidArgument {
            argument: "section_name".to_string(),
            expected: "'persona' or 'human'".to_string(),
        })
    }
}

fn send_message(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let message = str_arg(args, "message");
    ctx.interface.assistant_message(message);
    Ok(String::new())
}

fn core_memory_append(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let section = section_of(ctx, str_arg(args, "section_name"))?;
    let content = str_arg(args, "content");
    ctx.memory
        .working_context
        .edit_append(section, content, ctx.token_counter)?;
    Ok(String::new())
}

fn core_memory_replace(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let section = section_of(ctx, str_arg(args, "section_name"))?;
    let old_content = str_arg(args, "old_content");
    let new_content = str_arg(args, "new_content");
    ctx.memory
        .working_context
        .edit_replace(section, old_content, new_content, ctx.token_counter)?;
    Ok(String::new())
}

fn conversation_search(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let query = str_arg(args, "query");
    let page = page_arg(args)?;
    let count = ctx.page_size;
    let user_id = ctx.active_human_id();
    let (results, total) = ctx.memory.recall.text_search(query, user_id, count, page * count);
    Ok(format_page_result(&results, total, count, page, |r| {
        format!("timestamp: '{}', role: '{:?}' - {}", r.timestamp, r.role, r.content)
    }))
}

fn conversation_search_date(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let start = parse_date(str_arg(args, "start_date"))?;
    let end = parse_date(str_arg(args, "end_date"))?;
    let page = page_arg(args)?;
    let count = ctx.page_size;
    let user_id = ctx.active_human_id();
    let (results, total) = ctx.memory.recall.date_search(start, end, user_id, count, page * count);
    Ok(format_page_result(&results, total, count, page, |r| {
        format!("timestamp: '{}', role: '{:?}' message: {}", r.timestamp, r.role, r.content)
    }))
}

async fn archival_memory_insert(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let content = str_arg(args, "content");
    let user_id = ctx.active_human_id();
    ctx.memory
        .archival
        .insert(user_id, content, ctx.embedding_tokenizer, ctx.embedder, ctx.embedding_model_name)
        .await?;
    Ok(String::new())
}

async fn archival_memory_search(args: &serde_json::Value, ctx: &mut ToolExecCtx<'_>) -> Result<String, ToolError> {
    let query = str_arg(args, "query");
    let page = page_arg(args)?;
    let count = ctx.page_size;
    let user_id = ctx.active_human_id();
    let (results, total) = ctx
        .memory
        .archival
        .search(query, user_id, count, page * count, ctx.embedder, ctx.embedding_model_name)
        .await?;
    if results.is_empty() {
        return Ok("No results found.".to_string());
    }
    let num_pages = total.div_ceil(count).saturating_sub(1);
    let formatted: Vec<String> = results
        .iter()
        .map(|n| format!("timestamp: '{}', memory: '{}'", n.timestamp, n.content))
        .collect();
    Ok(format!(
        "Showing {} of {} results (page {}/{}): {}",
        results.len(),
        total,
        page,
        num_pages,
        serde_json::to_string(&formatted).unwrap_or_default()
    ))
}

fn format_page_result<T>(
    results: &[T],
    total: usize,
    count: usize,
    page: usize,
    render: impl Fn(&T) -> String,
) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }
    let num_pages = total.div_ceil(count).saturating_sub(1);
    let formatted: Vec<String> = results.iter().map(render).collect();
    format!(
        "Showing {} of {} results (page {}/{}): {}",
        results.len(),
        total,
        page,
        num_pages,
        serde_json::to_string(&formatted).unwrap_or_default()
    )
}

fn parse_date(raw: &str) -> Result<NaiveDate, ToolError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| ToolError::InvalidArgument {
        argument: "date".to_string(),
        expected: "'YYYY-MM-DD'".to_string(),
    })
}
