#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared data model types for the landwatch pipeline.
//!
//! Everything here is request-scoped: a [`LocationQuery`] comes in, a set
//! of [`CaptureRecord`]s is found in the imagery archive, each selected
//! record becomes a [`StoredImage`] in durable storage, and the vision
//! model's comparison is normalized into a [`ChangeReport`]. Nothing in
//! this crate outlives the request that produced it, except the uploaded
//! images themselves, which stay resolvable at their returned URL.

use serde::{Deserialize, Serialize};

/// A geographic point to analyze, supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationQuery {
    /// Latitude in decimal degrees (WGS84).
    pub latitude: f64,
    /// Longitude in decimal degrees (WGS84).
    pub longitude: f64,
}

/// One available satellite capture for a location, as returned by the
/// imagery archive's product search.
///
/// Only the fields needed to build a retrieval URL are deserialized; the
/// rest of the archive's metadata is ignored. Records arrive in the
/// archive's native chronological order, most recent last — the archive
/// exposes no timestamp field the client may rely on, so that ordering is
/// treated as an upstream invariant rather than re-derived locally.
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureRecord {
    /// Remote directory path of the capture, relative to the archive root.
    #[serde(rename = "DIRPATH")]
    pub dir_path: String,
    /// File stem of the capture image (no extension).
    #[serde(rename = "FILENAME")]
    pub file_name: String,
}

/// A durably stored, publicly addressable copy of one capture image.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoredImage {
    /// Stable public URL reported by the storage provider.
    pub url: String,
}

/// Model confidence in the reported changes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Confidence {
    /// High confidence.
    High,
    /// Medium confidence.
    Medium,
    /// Low confidence.
    Low,
}

/// The normalized change-detection report.
///
/// All fields are optional: the normalizer guarantees syntactic validity
/// of the model's JSON, not coverage of every key. The five change keys
/// hold free-form JSON because the model may answer with a plain
/// description or with an object carrying a `[[lng, lat], ...]` polygon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeReport {
    /// Land use change analysis, optionally with a polygon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub land_use_change: Option<serde_json::Value>,
    /// Vegetation change description and affected area.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vegetation_change: Option<serde_json::Value>,
    /// Cloud movement or pattern changes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_coverage_change: Option<serde_json::Value>,
    /// New construction, optionally with a polygon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urban_expansion: Option<serde_json::Value>,
    /// Water body movement, drying, or growth.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub water_body_change: Option<serde_json::Value>,
    /// Model confidence in the above.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Confidence>,
    /// One-line change summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// GeoJSON `FeatureCollection` unioning all polygons referenced by
    /// the change keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geojson: Option<serde_json::Value>,
}

/// Terminal artifact of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The three stored image URLs, earliest capture first.
    pub images: Vec<StoredImage>,
    /// The normalized change report.
    pub report: ChangeReport,
}
