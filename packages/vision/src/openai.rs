//! `OpenAI` chat-completions vision provider.

use serde::{Deserialize, Serialize};

use crate::{COMPARISON_IMAGES, VisionConfig, VisionError, VisionProvider};

/// Fixed system instruction establishing the analytical persona.
const SYSTEM_INSTRUCTION: &str = "You are a professional geospatial analyst with expertise in \
     satellite image interpretation. Return a structured JSON.";

/// Fixed user instruction enumerating the required output keys.
const USER_INSTRUCTION: &str = "Compare these satellite images and return your observations in \
     structured JSON with these keys:
- \"land_use_change\": analysis and if applicable, include a polygon as [ [lng, lat], ... ]
- \"vegetation_change\": description and affected area if identifiable
- \"cloud_coverage_change\": cloud movement or patterns
- \"urban_expansion\": if new constructions are seen, include polygon if possible
- \"water_body_change\": any movement or drying or increase, and polygon
- \"confidence\": High/Medium/Low
- \"summary\": one-line change summary
- \"geojson\": a valid GeoJSON FeatureCollection with all polygons used above (if any)

Respond with a single JSON. Do not include text before or after it.";

/// Trailing reinforcement demanding JSON-only output.
const JSON_ONLY_REMINDER: &str =
    "Return only a JSON object. Do not include any explanation outside the JSON.";

/// `OpenAI` vision provider.
pub struct OpenAiVision {
    config: VisionConfig,
    client: reqwest::Client,
}

impl OpenAiVision {
    /// Creates a new `OpenAI` vision provider.
    #[must_use]
    pub const fn new(config: VisionConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: MessageContent<'a>,
}

/// Message content — plain text for the system turn, structured blocks
/// for the multimodal user turn.
#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent<'a> {
    Text(&'a str),
    Blocks(Vec<ContentBlock<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text {
        text: &'a str,
    },
    ImageUrl {
        image_url: ImageRef<'a>,
    },
}

#[derive(Serialize)]
struct ImageRef<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Builds the one fixed comparison request: system persona, key contract,
/// the three image references in temporal order (earliest first), and the
/// JSON-only reinforcement.
fn build_request<'a>(
    model: &'a str,
    images: &'a [String; COMPARISON_IMAGES],
) -> ChatRequest<'a> {
    let mut blocks = vec![ContentBlock::Text {
        text: USER_INSTRUCTION,
    }];
    for url in images {
        blocks.push(ContentBlock::ImageUrl {
            image_url: ImageRef { url },
        });
    }
    blocks.push(ContentBlock::Text {
        text: JSON_ONLY_REMINDER,
    });

    ChatRequest {
        model,
        messages: vec![
            ChatMessage {
                role: "system",
                content: MessageContent::Text(SYSTEM_INSTRUCTION),
            },
            ChatMessage {
                role: "user",
                content: MessageContent::Blocks(blocks),
            },
        ],
    }
}

#[async_trait::async_trait]
impl VisionProvider for OpenAiVision {
    async fn describe_changes(
        &self,
        images: &[String; COMPARISON_IMAGES],
    ) -> Result<String, VisionError> {
        let request = build_request(&self.config.model, images);

        log::debug!("Invoking {} for change analysis", self.config.model);

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            let err: ApiError = serde_json::from_str(&body).unwrap_or_else(|_| ApiError {
                error: ApiErrorDetail {
                    message: format!("HTTP {status}: {body}"),
                },
            });
            return Err(VisionError::Provider {
                message: err.error.message,
            });
        }

        let response: ChatResponse =
            serde_json::from_str(&body).map_err(|e| VisionError::Provider {
                message: format!("Unparseable completion response: {e}"),
            })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| VisionError::Provider {
                message: "No content in completion response".to_string(),
            })
    }
}
