//! HTTP client for the local model host: chat completion and embeddings.

pub mod client;

pub use client::HostClient;
