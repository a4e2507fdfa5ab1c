use std::{path::Path, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Completion, InferenceGateway, TokenUsage};
use crate::settings::{SettingsStore, API_KEY_ENV};
use crate::utils::logging::preview;
use crate::{log_debug, log_info};

const ENABLE_LOGS: bool = true;

/// Client for an OpenAI-compatible `chat/completions` endpoint (Volcengine
/// Ark by default). Endpoint and key are read from settings on every call so
/// a key change takes effect without rebuilding the client.
pub struct ArkClient {
    client: Client,
    settings: Arc<SettingsStore>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    VideoUrl { video_url: MediaUrl },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct MediaUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ArkClient {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    async fn complete(&self, model: &str, content: Vec<ContentPart>) -> Result<Completion> {
        let gateway = self.settings.gateway();
        let api_key = gateway
            .resolved_api_key()
            .ok_or_else(|| anyhow!("no API key configured and {API_KEY_ENV} is not set"))?;
        let url = format!("{}/chat/completions", gateway.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("model service returned {status}: {}", preview(&body, 500));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to decode chat completion")?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("chat completion contained no message"))?;

        log_info!("Model {model} answered with {} characters", text.len());
        log_debug!("Model response: {}", preview(&text, 500));

        Ok(Completion {
            text,
            usage: parsed.usage,
        })
    }
}

#[async_trait::async_trait]
impl InferenceGateway for ArkClient {
    async fn transcribe(&self, video: &Path, prompt: &str, model: &str) -> Result<Completion> {
        let bytes = tokio::fs::read(video)
            .await
            .with_context(|| format!("failed to read video {}", video.display()))?;
        log_info!(
            "Sending {} ({} bytes) to {model} for transcription",
            video.display(),
            bytes.len()
        );

        let content = vec![
            ContentPart::VideoUrl {
                video_url: MediaUrl {
                    url: format!("data:video/mp4;base64,{}", STANDARD.encode(&bytes)),
                },
            },
            ContentPart::Text {
                text: prompt.to_string(),
            },
        ];
        self.complete(model, content).await
    }

    async fn synthesize(&self, prompt: &str, model: &str) -> Result<Completion> {
        log_info!("Requesting activity cards from {model} ({} prompt characters)", prompt.len());
        self.complete(
            model,
            vec![ContentPart::Text {
                text: prompt.to_string(),
            }],
        )
        .await
    }
}
