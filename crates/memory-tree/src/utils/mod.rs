//! Utilities module - text helpers shared by the policy and the LLM client

pub mod text_utils;

pub use text_utils::TextUtils;
