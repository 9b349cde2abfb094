use thiserror::Error;

/// Failures talking to the local model host (chat completion or embeddings).
#[derive(Debug, Error)]
pub enum HostError {
    #[error("model host request failed: {0}")]
    Request(String),

    #[error("model host returned malformed response: {0}")]
    MalformedResponse(String),

    #[error("model host timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures loading or validating runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("missing required configuration key: {0}")]
    Missing(String),

    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid { key: String, reason: String },
}

/// Failures in the memory subsystem (working context, FIFO queue, recall,
/// archival store) that are not simple I/O errors.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("unknown human id: {0}")]
    UnknownHuman(i64),

    #[error("archival memory note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    #[error("embedding error: {0}")]
    Embedding(#[from] HostError),

    #[error("'{section}' would grow to {tokens} tokens, over its {max}-token limit")]
    OversizeBlock {
        section: String,
        tokens: usize,
        max: usize,
    },

    #[error("old content for edit_replace must not be empty")]
    EmptyOldContent,

    #[error("'{old}' was not found in section '{section}'")]
    ContentNotFound { section: String, old: String },

    #[error("human id {0} already has a persona")]
    HumanAlreadyExists(i64),
}

/// Failures parsing or validating a model's structured step output.
///
/// These correspond to the places the original agent loop would raise and
/// retry rather than crash: malformed JSON, a shape the validator rejects, or
/// a function call that doesn't match the declared tool surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("model output was not valid JSON: {0}")]
    InvalidJson(String),

    #[error("model output JSON object had a duplicate key: {0}")]
    DuplicateKey(String),

    #[error("model output is missing required key: {0}")]
    MissingKey(String),

    #[error("model output has unexpected top-level key: {0}")]
    UnexpectedKey(String),

    #[error("function call is missing a name")]
    MissingFunctionName,

    #[error("function call name is not a string")]
    FunctionNameNotString,

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("function '{function}' may not be called as the first message of a conversation")]
    NotAllowedAsFirstMessage { function: String },

    #[error("function '{function}' requires a prior memory write this step")]
    MemoryWriteRequired { function: String },

    #[error("function call arguments must be a JSON object")]
    ArgumentsNotObject,

    #[error("function '{function}' received unknown argument '{argument}'")]
    UnknownArgument { function: String, argument: String },

    #[error("function '{function}' is missing required argument '{argument}'")]
    MissingArgument { function: String, argument: String },

    #[error("function '{function}' received too many arguments ({received} > {max})")]
    TooManyArguments {
        function: String,
        received: usize,
        max: usize,
    },

    #[error("function '{function}' argument '{argument}' has the wrong type")]
    WrongArgumentType { function: String, argument: String },

    #[error("model emotions field failed validation: {0}")]
    InvalidEmotions(String),

    #[error("model thoughts field failed validation: {0}")]
    InvalidThoughts(String),
}
