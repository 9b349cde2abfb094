//! Configuration loading: model host, memory-pressure thresholds, persona
//! and persistence paths.
//!
//! This is the only crate that reads environment variables or config files;
//! everything downstream receives a fully-resolved [`Settings`] value (or a
//! narrower view of it) at construction time.

pub mod constants;
pub mod prompts;
pub mod settings;

pub use prompts::{summarize_system_prompt, PromptDefaults};
pub use settings::{
    HostSettings, InferenceStrictness, MemorySettings, PathSettings, RetrievalSettings, Settings,
};
