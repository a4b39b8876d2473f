// memory-tree/crates/memory-tree/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub api_host: String,
    pub api_port: u16,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Drop and recreate the node table when the stored schema version differs.
    pub allow_destructive_reset: bool,
    pub default_root_prompt: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            warn!("Failed to load .env file: {}. Using system environment variables.", e);
        } else {
            info!("Loaded environment variables from .env file");
        }

        let llm_api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.trim().is_empty());
        if llm_api_key.is_none() {
            warn!("LLM_API_KEY not set; requests to the LLM backend are sent without authorization");
        }

        Ok(Self {
            database_path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/memory_tree.db".into()),
            ),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            api_port: parse_var("API_PORT", "8000")?,
            llm_base_url: env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai".into()),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "llama-3.1-8b-instant".into()),
            llm_api_key,
            llm_timeout_seconds: parse_var("LLM_TIMEOUT_SECONDS", "120")?,
            request_timeout_seconds: parse_var("REQUEST_TIMEOUT_SECONDS", "600")?,
            allow_destructive_reset: parse_var("ALLOW_DESTRUCTIVE_RESET", "true")?,
            default_root_prompt: env::var("DEFAULT_ROOT_PROMPT").unwrap_or_else(|_| "Hi".into()),
        })
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Database: {}", self.database_path.display());
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- LLM Backend: {} (model {})", self.llm_base_url, self.llm_model);
        info!("- LLM API Key: {}", if self.llm_api_key.is_some() { "<redacted>" } else { "<unset>" });
        info!("- LLM Timeout: {}s", self.llm_timeout_seconds);
        info!("- Request Timeout: {}s", self.request_timeout_seconds);
        info!("- Destructive Schema Reset: {}", self.allow_destructive_reset);
        info!("- Default Root Prompt: {:?}", self.default_root_prompt);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = env::var(name).unwrap_or_else(|_| default.into());
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", name, raw))
}
