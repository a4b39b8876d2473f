//! OpenAI-compatible chat completions client
//!
//! One explicitly constructed handle serves both the response generator and
//! the summarizer; it is shared through `Arc` rather than a process global.
use std::time::Duration;
use async_trait::async_trait;
use tracing::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::utils::TextUtils;
use super::{ResponseGenerator, Summarizer, LLM_ERROR_PREFIX, SUMMARY_MAX_CHARS};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a summarization expert. Summarize the following Q&A in exactly 250 characters or less. Be concise and capture the main idea.";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ReplyMessage>,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

pub struct LlmClient {
    backend_url: String,
    model: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl LlmClient {
    pub fn new(
        backend_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let backend_url = backend_url.into();
        let model = model.into();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        info!("LLM client initialized with backend: {} (model {})", backend_url, model);
        Ok(Self {
            backend_url,
            model,
            api_key,
            http_client,
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        Self::new(
            cfg.llm_base_url.clone(),
            cfg.llm_model.clone(),
            cfg.llm_api_key.clone(),
            Duration::from_secs(cfg.llm_timeout_seconds),
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.backend_url.trim_end_matches('/'))
    }

    /// Send one chat completion and return the first choice's text.
    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
            stream: false,
        };
        let mut builder = self.http_client.post(self.completions_url()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("LLM backend request failed: {}", e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM backend returned {}: {}", status, body));
        }
        let completion: ChatCompletionResponse = response.json().await
            .map_err(|e| anyhow::anyhow!("Failed to parse LLM response: {}", e))?;
        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| anyhow::anyhow!("LLM response contained no message content"))
    }
}

#[async_trait]
impl ResponseGenerator for LlmClient {
    async fn generate(&self, prompt: &str) -> String {
        debug!("Generating response for prompt ({} chars)", TextUtils::char_len(prompt));
        let messages = vec![ChatMessage { role: "user", content: prompt }];
        match self.complete(messages).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Response generation failed: {}", e);
                format!("{} {}", LLM_ERROR_PREFIX, e)
            }
        }
    }
}

#[async_trait]
impl Summarizer for LlmClient {
    async fn summarize(&self, prompt: &str, response: &str) -> String {
        let qa = TextUtils::qa_block(prompt, response);
        let messages = vec![
            ChatMessage { role: "system", content: SUMMARY_SYSTEM_PROMPT },
            ChatMessage { role: "user", content: &qa },
        ];
        let text = match self.complete(messages).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!("Summarization failed, falling back to truncation: {}", e);
                qa.clone()
            }
        };
        TextUtils::truncate_chars(&text, SUMMARY_MAX_CHARS).into_owned()
    }
}
