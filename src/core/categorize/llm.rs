//! Recognition model client seam.
//!
//! The recognizer talks to a [`RecognitionModel`] trait object so tests can
//! script replies. The production implementation calls the Anthropic
//! Messages API over HTTPS with temperature 0 and reports token usage for
//! cost accounting.

use crate::errors::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

/// One completed model call.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Anything that can complete a recognition prompt.
#[async_trait]
pub trait RecognitionModel: Send + Sync {
    /// Runs one prompt to completion.
    ///
    /// # Errors
    /// Transport or API failures; the recognizer degrades these to an
    /// `unknown` categorization rather than failing the receipt.
    async fn complete(&self, prompt: &str) -> Result<ModelReply>;
}

/// Anthropic Messages API client.
pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl AnthropicModel {
    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[async_trait]
impl RecognitionModel for AnthropicModel {
    async fn complete(&self, prompt: &str) -> Result<ModelReply> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            // Deterministic for consistency
            temperature: 0.0,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Recognition {
                message: format!("request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Recognition {
                message: format!("API returned {status}: {body}"),
            });
        }

        let parsed: MessagesResponse =
            response.json().await.map_err(|e| Error::Recognition {
                message: format!("malformed API response: {e}"),
            })?;

        let text = parsed
            .content
            .first()
            .map(|block| block.text.clone())
            .unwrap_or_default();

        tracing::debug!(
            input_tokens = parsed.usage.input_tokens,
            output_tokens = parsed.usage.output_tokens,
            "recognition_model_completed"
        );

        Ok(ModelReply {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
        })
    }
}
