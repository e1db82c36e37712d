#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Imagery archive search client.
//!
//! Resolves a coordinate into the set of satellite captures the archive
//! holds for that location, via the Bhoonidhi `ProductSearch` endpoint.
//! The search window, satellite selection, and radius are fixed policy —
//! callers supply a coordinate and nothing else.
//!
//! The archive requires session-style credentials (`cookie` and `token`
//! headers) supplied through [`ArchiveConfig`]; they are read from the
//! environment once at startup and never from inside request handling.

use landwatch_models::{CaptureRecord, LocationQuery};
use serde::{Deserialize, Serialize};

/// Number of captures the pipeline needs: a "before", an "after", and one
/// additional comparison frame.
pub const REQUIRED_CAPTURES: usize = 3;

/// Fixed product catalog sent with every search.
const PRODUCT: &str = "Standard";

/// Fixed satellite selection (pre-encoded as the archive expects it).
const SATELLITES: &str =
    "ResourceSat-2A_AWIFS_L2%2CResourceSat-2A_LISS4(MX70)_L2%2CResourceSat-2A_LISS4(MX23)";

/// Fixed search window start (pre-encoded `MON/D/YYYY`).
const SEARCH_START: &str = "JAN%2F5%2F2025";

/// Fixed search window end (pre-encoded `MON/D/YYYY`).
const SEARCH_END: &str = "JUL%2F5%2F2025";

/// Fixed search radius in kilometres.
const RADIUS_KM: &str = "10";

/// Errors from imagery archive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Missing required environment variable.
    #[error("Missing environment variable: {name}")]
    MissingEnv {
        /// Name of the missing environment variable.
        name: String,
    },

    /// The archive could not be reached or its response could not be read.
    #[error("Archive request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive answered with a non-success status.
    #[error("Archive returned HTTP {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The archive returned fewer captures than the pipeline needs.
    ///
    /// This is a precondition failure, not a transient condition — the
    /// pipeline aborts before any transfer or analysis work starts.
    #[error("Archive returned {found} captures, need at least 3")]
    InsufficientResults {
        /// How many captures the archive returned.
        found: usize,
    },
}

/// Immutable archive configuration, built once at process start.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Archive root URL (also the prefix of capture retrieval URLs).
    pub base_url: String,
    /// Archive account identifier sent with each search.
    pub user_id: String,
    /// Session cookie header value.
    pub cookie: String,
    /// Session token header value.
    pub token: String,
}

impl ArchiveConfig {
    /// Reads the archive configuration from environment variables.
    ///
    /// `ARCHIVE_USER_ID`, `ARCHIVE_COOKIE`, and `ARCHIVE_TOKEN` are
    /// required; `ARCHIVE_BASE_URL` defaults to the public Bhoonidhi
    /// instance.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::MissingEnv`] if a required variable is
    /// unset.
    pub fn from_env() -> Result<Self, ArchiveError> {
        Ok(Self {
            base_url: std::env::var("ARCHIVE_BASE_URL")
                .unwrap_or_else(|_| "https://bhoonidhi.nrsc.gov.in".to_string()),
            user_id: require_env("ARCHIVE_USER_ID")?,
            cookie: require_env("ARCHIVE_COOKIE")?,
            token: require_env("ARCHIVE_TOKEN")?,
        })
    }
}

/// `ProductSearch` request body.
///
/// Field values mirror the archive's form conventions verbatim, including
/// the pre-encoded commas and slashes in the fixed fields.
#[derive(Debug, Serialize)]
struct SearchPayload<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    prod: &'a str,
    #[serde(rename = "selSats")]
    sel_sats: &'a str,
    offset: &'a str,
    sdate: &'a str,
    edate: &'a str,
    query: &'a str,
    #[serde(rename = "queryType")]
    query_type: &'a str,
    #[serde(rename = "isMX")]
    is_mx: &'a str,
    loc: &'a str,
    lat: String,
    lon: String,
    radius: &'a str,
    filters: &'a str,
}

impl<'a> SearchPayload<'a> {
    fn new(user_id: &'a str, query: &LocationQuery) -> Self {
        Self {
            user_id,
            prod: PRODUCT,
            sel_sats: SATELLITES,
            offset: "0",
            sdate: SEARCH_START,
            edate: SEARCH_END,
            query: "area",
            query_type: "location",
            is_mx: "No",
            loc: "Decimal",
            lat: query.latitude.to_string(),
            lon: query.longitude.to_string(),
            radius: RADIUS_KM,
            filters: "%7B%7D",
        }
    }
}

/// `ProductSearch` response body.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(rename = "Results", default)]
    results: Vec<CaptureRecord>,
}

/// Client for the imagery archive's product search.
pub struct ArchiveClient {
    config: ArchiveConfig,
    client: reqwest::Client,
}

impl ArchiveClient {
    /// Creates a new archive client.
    #[must_use]
    pub const fn new(config: ArchiveConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    /// Searches the archive for captures covering `query`.
    ///
    /// Returns the archive's full result list in its native chronological
    /// order (most recent last). Coordinate validation is deferred to the
    /// archive itself.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError::Http`] or [`ArchiveError::Status`] when the
    /// archive cannot be reached, answers with a non-success status, or
    /// returns a body that does not match the expected shape.
    pub async fn locate(&self, query: &LocationQuery) -> Result<Vec<CaptureRecord>, ArchiveError> {
        let url = format!("{}/bhoonidhi/ProductSearch", self.config.base_url);
        let payload = SearchPayload::new(&self.config.user_id, query);

        log::debug!(
            "Searching archive for lat={}, lon={}",
            query.latitude,
            query.longitude
        );

        let resp = self
            .client
            .post(&url)
            .header("cookie", &self.config.cookie)
            .header("token", &self.config.token)
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ArchiveError::Status {
                status: status.as_u16(),
            });
        }

        let body: SearchResponse = resp.json().await?;
        log::debug!("Archive returned {} captures", body.results.len());

        Ok(body.results)
    }

    /// Builds the retrieval URL for a capture record.
    #[must_use]
    pub fn retrieval_url(&self, record: &CaptureRecord) -> String {
        format!(
            "{}{}/{}.jpg",
            self.config.base_url, record.dir_path, record.file_name
        )
    }
}

/// Selects the captures to compare: the last [`REQUIRED_CAPTURES`]
/// entries of the archive's result list.
///
/// No re-sort is performed — the archive returns results most-recent-last
/// and exposes no timestamp field to sort by, so selection correctness
/// relies on that upstream ordering convention.
///
/// # Errors
///
/// Returns [`ArchiveError::InsufficientResults`] when fewer than
/// [`REQUIRED_CAPTURES`] records are available.
pub fn select_recent(records: Vec<CaptureRecord>) -> Result<Vec<CaptureRecord>, ArchiveError> {
    let found = records.len();
    if found < REQUIRED_CAPTURES {
        return Err(ArchiveError::InsufficientResults { found });
    }
    Ok(records
        .into_iter()
        .skip(found - REQUIRED_CAPTURES)
        .collect())
}

/// Reads a required environment variable.
fn require_env(name: &str) -> Result<String, ArchiveError> {
    std::env::var(name).map_err(|_| ArchiveError::MissingEnv {
        name: name.to_string(),
    })
}
