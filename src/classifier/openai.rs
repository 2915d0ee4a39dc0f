//! OpenAI-backed [`ModerationApi`].
//!
//! Text goes to `/v1/moderations`; images go to `/v1/chat/completions` with a
//! constrained prompt. The scheduler is synchronous, so the async client is
//! driven by a private current-thread runtime.

use crate::classifier::preprocess::encode_png;
use crate::classifier::remote::{ModerationApi, ModerationError, TextModeration};
use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const VISION_MAX_TOKENS: u32 = 150;

const VISION_PROMPT: &str = "Describe this image in one short sentence. Then answer: does it show \
inappropriate/adult content, graphic violence, self-harm, or bullying/hate? Reply with ONLY: SAFE \
or one or more of: INAPPROPRIATE, VIOLENCE, SELF_HARM, BULLYING_HATE.";

/// Connection settings for the OpenAI API.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
    pub vision_model: String,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: api_key.into(),
            vision_model: "gpt-4o-mini".to_string(),
        }
    }

    pub fn moderations_url(&self) -> String {
        format!("{}/v1/moderations", self.base_url.trim_end_matches('/'))
    }

    pub fn chat_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResultBody>,
}

#[derive(Debug, Deserialize)]
struct ModerationResultBody {
    #[serde(default)]
    categories: BTreeMap<String, Value>,
    #[serde(default)]
    category_scores: BTreeMap<String, Value>,
}

impl From<ModerationResultBody> for TextModeration {
    fn from(body: ModerationResultBody) -> Self {
        Self {
            categories: body
                .categories
                .into_iter()
                .filter_map(|(k, v)| v.as_bool().map(|b| (k, b)))
                .collect(),
            category_scores: body
                .category_scores
                .into_iter()
                .filter_map(|(k, v)| v.as_f64().map(|s| (k, s)))
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Build the vision request body for a PNG-encoded frame.
fn vision_request(model: &str, png: &[u8]) -> ChatRequest {
    let data_url = format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png)
    );
    ChatRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: VISION_PROMPT.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl { url: data_url },
                },
            ],
        }],
        max_tokens: VISION_MAX_TOKENS,
    }
}

/// Blocking OpenAI moderation client.
pub struct OpenAiModerationClient {
    config: OpenAiConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl OpenAiModerationClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, ModerationError> {
        if config.api_key.trim().is_empty() {
            return Err(ModerationError::Config("missing API key".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ModerationError::Config(format!("Failed to create HTTP client: {e}")))?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ModerationError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            config,
            client,
            runtime,
        })
    }

    async fn post<T: Serialize, R: DeserializeOwned>(
        &self,
        url: String,
        body: &T,
    ) -> Result<R, ModerationError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ModerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModerationError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| ModerationError::Decode(e.to_string()))
    }

    async fn moderate_text_async(&self, text: &str) -> Result<TextModeration, ModerationError> {
        let response: ModerationResponse = self
            .post(self.config.moderations_url(), &ModerationRequest { input: text })
            .await?;
        response
            .results
            .into_iter()
            .next()
            .map(TextModeration::from)
            .ok_or_else(|| ModerationError::Decode("no moderation results".to_string()))
    }

    async fn classify_image_async(&self, png: &[u8]) -> Result<String, ModerationError> {
        let request = vision_request(&self.config.vision_model, png);
        let response: ChatResponse = self.post(self.config.chat_url(), &request).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}

impl ModerationApi for OpenAiModerationClient {
    fn moderate_text(&self, text: &str) -> Result<TextModeration, ModerationError> {
        self.runtime.block_on(self.moderate_text_async(text))
    }

    fn classify_image(&self, image: &DynamicImage) -> Result<String, ModerationError> {
        let png = encode_png(image).map_err(|e| ModerationError::Encode(e.to_string()))?;
        self.runtime.block_on(self.classify_image_async(&png))
    }
}
