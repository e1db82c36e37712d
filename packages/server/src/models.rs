//! API request and response types for the search endpoint.
//!
//! These mirror the wire contract exactly, quirks included: the request
//! names longitude `lang`, and the response carries the misspelled
//! `geojosn` field that existing clients already read.

use landwatch_models::{ChangeReport, PipelineResult};
use serde::{Deserialize, Serialize};

/// A coordinate value as callers send it — either a JSON number or a
/// numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Coordinate {
    /// Plain JSON number.
    Number(f64),
    /// Numeric string, e.g. `"28.6"`.
    Text(String),
}

impl Coordinate {
    /// The coordinate as a decimal degree value, if it parses.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// `POST /search` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    /// Latitude.
    pub lat: Coordinate,
    /// Longitude (historical wire name).
    pub lang: Coordinate,
}

/// `POST /search` success response body.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The three durable image URLs, earliest capture first.
    pub photos: Vec<String>,
    /// The normalized change report.
    pub data: ChangeReport,
    /// Copy of `data.geojson`, under the misspelled field name existing
    /// clients depend on. Omitted when the report has no `geojson`.
    #[serde(rename = "geojosn", skip_serializing_if = "Option::is_none")]
    pub geojson: Option<serde_json::Value>,
}

impl From<PipelineResult> for SearchResponse {
    fn from(result: PipelineResult) -> Self {
        let geojson = result.report.geojson.clone();
        Self {
            photos: result.images.into_iter().map(|image| image.url).collect(),
            data: result.report,
            geojson,
        }
    }
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiHealth {
    /// Always `true` when the server is up.
    pub healthy: bool,
    /// Crate version.
    pub version: String,
}
