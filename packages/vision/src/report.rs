//! Response normalization: model text in, [`ChangeReport`] out.
//!
//! The model is instructed to answer with a single JSON object, usually
//! wrapped in a fenced code block labeled `json`. Extraction is tolerant
//! about surrounding prose but strict about the payload: exactly one
//! labeled block wins, a bare balanced JSON object is accepted as a
//! fallback, and anything else — no candidate, ambiguous candidates, or
//! a candidate that does not parse — is a hard failure. There is no
//! partial recovery and no retry of the model call.

use landwatch_models::ChangeReport;
use thiserror::Error;

/// Opening fence of a labeled JSON block.
const FENCE_OPEN: &str = "```json";

/// Closing fence.
const FENCE_CLOSE: &str = "```";

/// Errors from normalizing model output.
#[derive(Debug, Error)]
pub enum ReportError {
    /// No fenced JSON block and no bare JSON object in the text.
    #[error("No JSON found in model response")]
    MissingJson,

    /// More than one labeled JSON block; which one is authoritative is
    /// ambiguous.
    #[error("Ambiguous model response: {found} fenced JSON blocks")]
    Ambiguous {
        /// Number of labeled blocks found.
        found: usize,
    },

    /// The extracted candidate is not valid JSON or does not match the
    /// report shape.
    #[error("Invalid JSON in model response: {0}")]
    Parse(#[from] serde_json::Error),

    /// The report's `geojson` member is present but not valid GeoJSON.
    #[error("Invalid GeoJSON in model response: {message}")]
    InvalidGeoJson {
        /// Description of the GeoJSON violation.
        message: String,
    },
}

/// Normalizes raw model output into a [`ChangeReport`].
///
/// Presence of the seven report keys is not enforced — fields may be
/// legitimately absent — but when the `geojson` member is present it
/// must be syntactically valid GeoJSON.
///
/// # Errors
///
/// Returns [`ReportError`] when no unambiguous JSON candidate exists,
/// the candidate does not parse, or its `geojson` member is invalid.
pub fn normalize(raw: &str) -> Result<ChangeReport, ReportError> {
    let candidate = extract_json(raw)?;
    let report: ChangeReport = serde_json::from_str(candidate.trim())?;

    if let Some(value) = &report.geojson {
        geojson::GeoJson::from_json_value(value.clone()).map_err(|e| {
            ReportError::InvalidGeoJson {
                message: e.to_string(),
            }
        })?;
    }

    Ok(report)
}

/// Locates the JSON candidate within the model's text.
///
/// Exactly one `json`-labeled fenced block is authoritative. With no
/// labeled block, falls back to a balanced-brace scan for the first
/// complete JSON object in the text.
fn extract_json(raw: &str) -> Result<&str, ReportError> {
    let blocks = labeled_blocks(raw);
    match blocks.len() {
        1 => Ok(blocks[0]),
        0 => first_json_object(raw).ok_or(ReportError::MissingJson),
        found => Err(ReportError::Ambiguous { found }),
    }
}

/// Collects the contents of all terminated ```` ```json … ``` ```` blocks.
fn labeled_blocks(raw: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = raw;

    while let Some(open) = rest.find(FENCE_OPEN) {
        let body_start = open + FENCE_OPEN.len();
        let Some(close) = rest[body_start..].find(FENCE_CLOSE) else {
            // Unterminated fence: nothing authoritative past this point.
            break;
        };
        blocks.push(&rest[body_start..body_start + close]);
        rest = &rest[body_start + close + FENCE_CLOSE.len()..];
    }

    blocks
}

/// Finds the first balanced JSON object in `raw`, respecting string
/// literals and escapes.
fn first_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use landwatch_models::Confidence;

    #[test]
    fn normalizes_fenced_report() {
        let raw = "```json\n{\"summary\":\"No major change\",\"confidence\":\"High\"}\n```";
        let report = normalize(raw).unwrap();
        assert_eq!(report.summary.as_deref(), Some("No major change"));
        assert_eq!(report.confidence, Some(Confidence::High));
    }

    #[test]
    fn normalizes_fence_with_surrounding_prose() {
        let raw = "Here is my analysis:\n```json\n{\"confidence\":\"Low\"}\n```\nHope it helps!";
        let report = normalize(raw).unwrap();
        assert_eq!(report.confidence, Some(Confidence::Low));
    }

    #[test]
    fn falls_back_to_bare_json_object() {
        let raw = "The result is {\"summary\":\"stable\"} as requested.";
        let report = normalize(raw).unwrap();
        assert_eq!(report.summary.as_deref(), Some("stable"));
    }

    #[test]
    fn balanced_scan_respects_braces_in_strings() {
        let raw = "{\"summary\":\"brace } inside\",\"confidence\":\"Medium\"}";
        let report = normalize(raw).unwrap();
        assert_eq!(report.summary.as_deref(), Some("brace } inside"));
        assert_eq!(report.confidence, Some(Confidence::Medium));
    }

    #[test]
    fn balanced_scan_handles_nested_objects() {
        let raw = "```json\n{\"land_use_change\":{\"polygon\":[[77.2,28.6],[77.3,28.7]]}}\n```";
        let report = normalize(raw).unwrap();
        assert!(report.land_use_change.is_some());
    }

    #[test]
    fn plain_prose_is_missing_json() {
        let err = normalize("I could not detect any changes in these images.").unwrap_err();
        assert!(matches!(err, ReportError::MissingJson));
    }

    #[test]
    fn two_labeled_blocks_are_ambiguous() {
        let raw = "```json\n{\"summary\":\"a\"}\n```\ntext\n```json\n{\"summary\":\"b\"}\n```";
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, ReportError::Ambiguous { found: 2 }));
    }

    #[test]
    fn unterminated_fence_falls_back_to_bare_object() {
        let raw = "```json\n{\"summary\":\"unclosed\"}";
        let report = normalize(raw).unwrap();
        assert_eq!(report.summary.as_deref(), Some("unclosed"));
    }

    #[test]
    fn invalid_json_in_fence_fails_parse() {
        let err = normalize("```json\n{\"summary\": not quoted}\n```").unwrap_err();
        assert!(matches!(err, ReportError::Parse(_)));
    }

    #[test]
    fn valid_feature_collection_passes() {
        let raw = r#"```json
{"summary":"new construction","geojson":{"type":"FeatureCollection","features":[{"type":"Feature","properties":{},"geometry":{"type":"Polygon","coordinates":[[[77.2,28.6],[77.3,28.6],[77.3,28.7],[77.2,28.6]]]}}]}}
```"#;
        let report = normalize(raw).unwrap();
        assert!(report.geojson.is_some());
    }

    #[test]
    fn invalid_geojson_member_is_rejected() {
        let raw = r#"```json
{"summary":"x","geojson":{"type":"NotAGeoJsonType"}}
```"#;
        let err = normalize(raw).unwrap_err();
        assert!(matches!(err, ReportError::InvalidGeoJson { .. }));
    }

    #[test]
    fn absent_geojson_member_is_fine() {
        let report = normalize("```json\n{\"summary\":\"quiet\"}\n```").unwrap();
        assert!(report.geojson.is_none());
    }
}
