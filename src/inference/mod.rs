//! Model invocation boundary. The pipeline only sees [`InferenceGateway`];
//! the HTTP client in [`ark`] is the production implementation.

pub mod ark;

use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use ark::ArkClient;

/// Token accounting reported by the model service.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// Raw text returned by one call plus its usage, when the service reports it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

#[async_trait::async_trait]
pub trait InferenceGateway: Send + Sync {
    /// Stage 1: the model watches `video` and answers `prompt`.
    async fn transcribe(&self, video: &Path, prompt: &str, model: &str) -> Result<Completion>;

    /// Stage 2: text-only completion.
    async fn synthesize(&self, prompt: &str, model: &str) -> Result<Completion>;
}
