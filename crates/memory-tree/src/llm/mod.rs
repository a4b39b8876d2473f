//! Text-generation collaborators
//!
//! The core only sees two infallible contracts. Whatever the backend returns,
//! or however it fails, is absorbed in here and comes out as plain text.

pub mod client;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;

pub use client::LlmClient;

/// Upper bound on summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 250;

/// Marker prefixed to responses recorded after a generation failure.
pub const LLM_ERROR_PREFIX: &str = "[LLM error]";

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce a response for `prompt`. On failure the returned text starts
    /// with [`LLM_ERROR_PREFIX`] so the node still records what happened.
    async fn generate(&self, prompt: &str) -> String;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Condense a prompt/response pair to at most [`SUMMARY_MAX_CHARS`]
    /// characters, falling back to a truncation of the raw pair on failure.
    async fn summarize(&self, prompt: &str, response: &str) -> String;
}
