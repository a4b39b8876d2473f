//! Decides how much of a parent node is forwarded with a child's prompt

use tracing::{debug, info, warn};

use crate::llm::{Summarizer, SUMMARY_MAX_CHARS};
use crate::memory_db::{MemoryNode, NodeStore};
use crate::utils::TextUtils;

/// Raw parent context longer than this is replaced by a summary.
pub const CONTEXT_THRESHOLD_CHARS: usize = 250;

/// Where the forwarded context came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextSource {
    /// The parent's `Q:`/`A:` text, short enough to send verbatim.
    Raw,
    /// A summary already cached on the parent.
    CachedSummary,
    /// A summary produced for this request and cached on the parent.
    FreshSummary,
    /// The summarizer gave nothing usable; the raw text was truncated.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedContext {
    pub text: String,
    pub source: ContextSource,
}

#[derive(Debug, Clone)]
pub struct CompressionPolicy {
    threshold_chars: usize,
    summary_max_chars: usize,
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self {
            threshold_chars: CONTEXT_THRESHOLD_CHARS,
            summary_max_chars: SUMMARY_MAX_CHARS,
        }
    }
}

impl CompressionPolicy {
    pub fn new(threshold_chars: usize, summary_max_chars: usize) -> Self {
        Self { threshold_chars, summary_max_chars }
    }

    /// Pick the context to forward for a child of `parent`.
    ///
    /// A freshly generated summary is written back to `parent` through
    /// `store`. Never fails: a broken summarizer or a failed cache write
    /// degrades to a bounded value and a log line.
    pub async fn select_context(
        &self,
        parent: &MemoryNode,
        summarizer: &dyn Summarizer,
        store: &NodeStore,
    ) -> SelectedContext {
        let raw = TextUtils::qa_block(&parent.prompt, &parent.response);
        if TextUtils::char_len(&raw) <= self.threshold_chars {
            return SelectedContext { text: raw, source: ContextSource::Raw };
        }

        if let Some(cached) = parent.cached_summary() {
            debug!("Using cached summary of node {}", parent.id);
            return SelectedContext {
                text: self.bound(cached),
                source: ContextSource::CachedSummary,
            };
        }

        let summary = summarizer.summarize(&parent.prompt, &parent.response).await;
        let summary = self.bound(&summary);
        if summary.trim().is_empty() {
            warn!("Summarizer returned nothing for node {}; truncating raw context", parent.id);
            return SelectedContext {
                text: self.bound(&raw),
                source: ContextSource::Fallback,
            };
        }

        match store.update_summary(parent.id, &summary) {
            Ok(true) => info!("Cached summary for node {} ({} chars)", parent.id, TextUtils::char_len(&summary)),
            Ok(false) => debug!("Node {} disappeared before its summary could be cached", parent.id),
            Err(e) => warn!("Failed to cache summary for node {}: {}", parent.id, e),
        }

        SelectedContext { text: summary, source: ContextSource::FreshSummary }
    }

    fn bound(&self, text: &str) -> String {
        TextUtils::truncate_chars(text, self.summary_max_chars).into_owned()
    }

    /// The prompt actually sent to the response generator.
    pub fn compose_prompt(context: Option<&str>, message: &str) -> String {
        match context {
            None => message.to_string(),
            Some(context) => format!(
                "Previous context:\n{}\n\nNow, answer this:\n{}",
                context, message
            ),
        }
    }
}
