#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Vision model invocation and report normalization.
//!
//! [`openai`] submits three temporally ordered image URLs to a
//! vision-capable chat model with a fixed instruction contract; [`report`]
//! coerces the model's free-form answer into a guaranteed-parseable
//! [`landwatch_models::ChangeReport`] or fails explicitly.
//!
//! The instruction text is deliberately not configurable per request —
//! the stability of the seven-key output contract is what makes the
//! normalizer reliable.

pub mod openai;
pub mod report;

use thiserror::Error;

/// Number of images submitted per comparison.
pub const COMPARISON_IMAGES: usize = 3;

/// Errors from vision model invocation.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// HTTP request to the model provider failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider-level error (non-success status or unusable response).
    #[error("Provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },
}

/// Immutable vision model configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// Provider API root.
    pub base_url: String,
    /// API key for the provider.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
}

impl VisionConfig {
    /// Reads the vision configuration from environment variables.
    ///
    /// `OPENAI_API_KEY` is required; `VISION_BASE_URL` defaults to the
    /// `OpenAI` API root and `VISION_MODEL` to `gpt-4o`.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError::MissingEnv`] if `OPENAI_API_KEY` is unset.
    pub fn from_env() -> Result<Self, VisionError> {
        Ok(Self {
            base_url: std::env::var("VISION_BASE_URL")
                .unwrap_or_else(|_| "https://api.openai.com".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").map_err(|_| VisionError::MissingEnv {
                name: "OPENAI_API_KEY".to_string(),
            })?,
            model: std::env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
        })
    }
}

/// Trait for vision-capable comparison providers.
#[async_trait::async_trait]
pub trait VisionProvider: Send + Sync {
    /// Submits exactly three image URLs, earliest capture first, and
    /// returns the model's raw textual answer.
    ///
    /// # Errors
    ///
    /// Returns [`VisionError`] if the model call fails.
    async fn describe_changes(
        &self,
        images: &[String; COMPARISON_IMAGES],
    ) -> Result<String, VisionError>;
}
