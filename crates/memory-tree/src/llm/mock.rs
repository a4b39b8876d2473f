//! Scripted collaborator for tests
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use async_trait::async_trait;

use super::{ResponseGenerator, Summarizer};

/// Records every prompt and answers with a fixed pattern.
#[derive(Default)]
pub struct MockLlm {
    pub summary: Option<String>,
    pub generate_calls: AtomicUsize,
    pub summarize_calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every summarize call returns `summary` verbatim.
    pub fn with_summary(summary: &str) -> Self {
        Self {
            summary: Some(summary.to_string()),
            ..Self::default()
        }
    }

    pub fn generate_count(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn summarize_count(&self) -> usize {
        self.summarize_calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

#[async_trait]
impl ResponseGenerator for MockLlm {
    async fn generate(&self, prompt: &str) -> String {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        format!("echo: {}", prompt)
    }
}

#[async_trait]
impl Summarizer for MockLlm {
    async fn summarize(&self, prompt: &str, _response: &str) -> String {
        self.summarize_calls.fetch_add(1, Ordering::SeqCst);
        self.summary
            .clone()
            .unwrap_or_else(|| format!("summary of {}", prompt))
    }
}
