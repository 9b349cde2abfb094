//! Out-of-context tool contracts for collaborators `spec.md` §1 marks
//! "interfaces only": a sandboxed code executor and a web-search client.
//!
//! `original_source/llm_os/functions/function_sets/web.py` and
//! `interpreter.py` show `web_search`/`open_url`-style tools and an AILang
//! code-executor tool. We declare their [`ToolSpec`]s here so the dispatcher
//! has a known schema and error shape to validate against, and define the
//! trait boundary a concrete implementation would satisfy — no sandboxed
//! execution or HTTP fetch lives in this crate (`SPEC_FULL.md` §4.12).

use async_trait::async_trait;
use thiserror::Error;

use crate::registry::{ParamType, ToolSpec};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolBackendError {
    #[error("no web search client is configured")]
    NoWebSearchClient,

    #[error("no code executor is configured")]
    NoCodeExecutor,

    #[error("backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait WebSearchClient: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<String>, ToolBackendError>;
    async fn open_url(&self, url: &str) -> Result<String, ToolBackendError>;
}

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn run(&self, code: &str) -> Result<String, ToolBackendError>;
}

/// Installed when no web search client is configured; every call fails with
/// [`ToolBackendError::NoWebSearchClient`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWebSearchClient;

#[async_trait]
impl WebSearchClient for NoWebSearchClient {
    async fn search(&self, _query: &str) -> Result<Vec<String>, ToolBackendError> {
        Err(ToolBackendError::NoWebSearchClient)
    }

    async fn open_url(&self, _url: &str) -> Result<String, ToolBackendError> {
        Err(ToolBackendError::NoWebSearchClient)
    }
}

/// Installed when no code executor is configured; every call fails with
/// [`ToolBackendError::NoCodeExecutor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCodeExecutor;

#[async_trait]
impl CodeExecutor for NoCodeExecutor {
    async fn run(&self, _code: &str) -> Result<String, ToolBackendError> {
        Err(ToolBackendError::NoCodeExecutor)
    }
}

/// The out-of-context `ToolSpec`s for this set, loaded into the registry
/// alongside the built-in memory functions.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new(
            "web_search",
            "Search the web and return a list of result snippets.",
            "web",
            false,
        )
        .param("query", ParamType::String, "the search query", true),
        ToolSpec::new(
            "open_url",
            "Fetch a URL's page contents as text.",
            "web",
            false,
        )
        .param("url", ParamType::String, "the URL to fetch", true),
        ToolSpec::new(
            "run_code",
            "Execute a snippet of code in a sandboxed interpreter and return its output.",
            "interpreter",
            false,
        )
        .param("code", ParamType::String, "the code to execute", true),
    ]
}
