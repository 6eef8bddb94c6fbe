//! Client for the hosted multimodal model (Anthropic messages API).

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::constants::ANTHROPIC_VERSION;

/// One build request: an image plus the prompt text.
#[derive(Debug)]
pub struct ModelRequest<'a> {
    /// Model identifier.
    pub model: &'a str,
    /// Output token cap.
    pub max_tokens: u32,
    /// Full prompt text.
    pub prompt: &'a str,
    /// Raw image bytes, base64-encoded on the wire.
    pub image: &'a [u8],
    /// Media type of `image`.
    pub media_type: &'a str,
}

/// What the model sent back.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelResponse {
    /// The first text block of the reply.
    pub text: String,
    /// Input tokens billed.
    pub input_tokens: u64,
    /// Output tokens billed.
    pub output_tokens: u64,
    /// Model that actually served the request, if reported.
    pub model: Option<String>,
}

/// Failures calling the model.
#[derive(Debug)]
pub enum ModelError {
    /// Transport-level failure (DNS, connect, TLS, reading the body).
    Request(String),
    /// The call did not finish within the configured timeout.
    Timeout,
    /// The API answered with a non-success status.
    Api {
        /// HTTP status code
        status: u16,
        /// Provider's error message
        message: String,
    },
    /// The body was not the JSON we expected.
    Malformed(String),
    /// The reply held no text.
    EmptyResponse,
    /// Generation stopped at the output token cap.
    TokenLimit(u32),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(err) => write!(f, "Model request failed: {err}"),
            Self::Timeout => write!(f, "Model request timed out"),
            Self::Api { status, message } => write!(f, "Model API error {status}: {message}"),
            Self::Malformed(err) => write!(f, "Malformed model response: {err}"),
            Self::EmptyResponse => write!(f, "Model returned no text"),
            Self::TokenLimit(max) => write!(
                f,
                "Model output was cut off at the {max} token limit; raise --max-tokens"
            ),
        }
    }
}

impl std::error::Error for ModelError {}

impl From<reqwest::Error> for ModelError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ModelError::Timeout
        } else {
            ModelError::Request(err.to_string())
        }
    }
}

/// Something that can turn an image and prompt into text.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends one request and waits for the whole reply.
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ModelError>;
}

#[derive(Serialize, Debug)]
struct CreateMessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Serialize, Debug)]
struct Message<'a> {
    role: &'static str,
    content: [ContentBlock<'a>; 2],
}

#[derive(Serialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Image { source: ImageSource<'a> },
    Text { text: &'a str },
}

#[derive(Serialize, Debug)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'a str,
    data: String,
}

#[derive(Deserialize, Debug)]
struct CreateMessageResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(tag = "type")]
enum ResponseBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// [`ModelClient`] backed by the Anthropic messages API.
#[derive(Clone, Debug)]
pub struct ClaudeClient {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ClaudeClient {
    /// Builds a client using the key, base URL and timeout from `config`.
    pub fn new(config: &Config) -> Result<Self, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            endpoint: format!("{}/v1/messages", config.api_base),
        })
    }
}

fn api_error(status: u16, body: &[u8]) -> ModelError {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).to_string());
    ModelError::Api { status, message }
}

fn into_model_response(
    parsed: CreateMessageResponse,
    max_tokens: u32,
) -> Result<ModelResponse, ModelError> {
    if parsed.stop_reason.as_deref() == Some("max_tokens") {
        return Err(ModelError::TokenLimit(max_tokens));
    }
    let text = parsed
        .content
        .into_iter()
        .find_map(|block| match block {
            ResponseBlock::Text { text } => Some(text),
            ResponseBlock::Other => None,
        })
        .filter(|text| !text.trim().is_empty())
        .ok_or(ModelError::EmptyResponse)?;

    Ok(ModelResponse {
        text,
        input_tokens: parsed.usage.input_tokens,
        output_tokens: parsed.usage.output_tokens,
        model: parsed.model,
    })
}

#[async_trait]
impl ModelClient for ClaudeClient {
    async fn generate(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = CreateMessageRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            messages: [Message {
                role: "user",
                content: [
                    ContentBlock::Image {
                        source: ImageSource {
                            kind: "base64",
                            media_type: request.media_type,
                            data: general_purpose::STANDARD.encode(request.image),
                        },
                    },
                    ContentBlock::Text {
                        text: request.prompt,
                    },
                ],
            }],
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        debug!("Model API answered {} with {} bytes", status, bytes.len());
        if !status.is_success() {
            return Err(api_error(status.as_u16(), &bytes));
        }

        let parsed: CreateMessageResponse = serde_json::from_slice(&bytes)
            .map_err(|err| ModelError::Malformed(err.to_string()))?;
        into_model_response(parsed, request.max_tokens)
    }
}
