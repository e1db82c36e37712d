#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Request-scoped acquisition-and-analysis pipeline.
//!
//! One [`Pipeline::run`] call moves strictly forward through
//! Locate → Transfer → Analyze → Normalize, with the three transfers
//! running concurrently behind an all-or-nothing join barrier. There are
//! no retries, no cross-request state, and no mid-flight cancellation:
//! a run either produces a [`PipelineResult`] or fails with the
//! originating error kind.
//!
//! The three external collaborators sit behind traits so the
//! orchestration itself is testable with in-memory fakes; the production
//! implementations are [`landwatch_archive::ArchiveClient`],
//! [`landwatch_storage::StorageClient`], and
//! [`landwatch_vision::openai::OpenAiVision`].

use std::sync::Arc;

use landwatch_archive::{ArchiveClient, ArchiveError, select_recent};
use landwatch_models::{CaptureRecord, LocationQuery, PipelineResult, StoredImage};
use landwatch_storage::{StorageClient, StorageError};
use landwatch_vision::report::{self, ReportError};
use landwatch_vision::{COMPARISON_IMAGES, VisionError, VisionProvider};
use thiserror::Error;

/// Errors from a pipeline run.
///
/// Each variant carries the component error that terminated the run.
/// The HTTP boundary maps [`ArchiveError::InsufficientResults`] to a
/// specific caller-visible message and everything else to a generic one,
/// so the distinct kinds here exist for logs, not for callers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Imagery archive search failed or found too few captures.
    #[error("Imagery search failed: {0}")]
    Archive(#[from] ArchiveError),

    /// One of the image transfers failed.
    #[error("Image transfer failed: {0}")]
    Storage(#[from] StorageError),

    /// The vision model call failed.
    #[error("Change analysis failed: {0}")]
    Vision(#[from] VisionError),

    /// The model's output could not be normalized.
    #[error("Malformed model response: {0}")]
    Report(#[from] ReportError),

    /// A transfer task terminated abnormally.
    #[error("Transfer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PipelineError {
    /// Whether this failure is the too-few-captures precondition, which
    /// the HTTP boundary surfaces with a specific message.
    #[must_use]
    pub const fn is_insufficient_results(&self) -> bool {
        matches!(
            self,
            Self::Archive(ArchiveError::InsufficientResults { .. })
        )
    }
}

/// Resolves a location into the archive's capture records.
#[async_trait::async_trait]
pub trait ImageLocator: Send + Sync {
    /// Searches the archive for captures covering `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the archive cannot be queried.
    async fn locate(&self, query: &LocationQuery) -> Result<Vec<CaptureRecord>, ArchiveError>;

    /// Builds the retrieval URL for one capture record.
    fn retrieval_url(&self, record: &CaptureRecord) -> String;
}

#[async_trait::async_trait]
impl ImageLocator for ArchiveClient {
    async fn locate(&self, query: &LocationQuery) -> Result<Vec<CaptureRecord>, ArchiveError> {
        Self::locate(self, query).await
    }

    fn retrieval_url(&self, record: &CaptureRecord) -> String {
        Self::retrieval_url(self, record)
    }
}

/// Moves one image into durable public storage.
#[async_trait::async_trait]
pub trait ImageStore: Send + Sync {
    /// Transfers the image at `source_url` and returns its durable URL.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] when the download or upload fails.
    async fn transfer(&self, source_url: &str) -> Result<StoredImage, StorageError>;
}

#[async_trait::async_trait]
impl ImageStore for StorageClient {
    async fn transfer(&self, source_url: &str) -> Result<StoredImage, StorageError> {
        Self::transfer(self, source_url).await
    }
}

/// The pipeline orchestrator. Cheap to clone per request via the shared
/// collaborator handles; holds no request state of its own.
#[derive(Clone)]
pub struct Pipeline {
    locator: Arc<dyn ImageLocator>,
    store: Arc<dyn ImageStore>,
    vision: Arc<dyn VisionProvider>,
}

impl Pipeline {
    /// Creates a pipeline over the three collaborators.
    #[must_use]
    pub fn new(
        locator: Arc<dyn ImageLocator>,
        store: Arc<dyn ImageStore>,
        vision: Arc<dyn VisionProvider>,
    ) -> Self {
        Self {
            locator,
            store,
            vision,
        }
    }

    /// Runs the full pipeline for one location query.
    ///
    /// The three transfers are spawned concurrently and all awaited;
    /// the first observed failure fails the run, but already-started
    /// siblings run to completion so their spool files are released.
    /// No transfer or analysis work starts when the archive holds too
    /// few captures.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] carrying the component error that
    /// terminated the run.
    pub async fn run(&self, query: LocationQuery) -> Result<PipelineResult, PipelineError> {
        let records = self.locator.locate(&query).await?;
        let selected = select_recent(records)?;

        let sources: Vec<String> = selected
            .iter()
            .map(|record| self.locator.retrieval_url(record))
            .collect();

        log::info!(
            "Transferring {} captures for lat={}, lon={}",
            sources.len(),
            query.latitude,
            query.longitude
        );

        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let store = Arc::clone(&self.store);
                let source = source.clone();
                tokio::spawn(async move { store.transfer(&source).await })
            })
            .collect();

        // All-or-nothing join barrier: every outcome is awaited before
        // the first failure (in transfer order) is surfaced.
        let mut images = Vec::with_capacity(COMPARISON_IMAGES);
        let mut failure: Option<PipelineError> = None;
        for handle in handles {
            match handle.await? {
                Ok(image) => images.push(image),
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(e.into());
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        // The join barrier only falls through with all three transfers
        // complete, in the selected (earliest-first) order.
        let ordered: [String; COMPARISON_IMAGES] = [
            images[0].url.clone(),
            images[1].url.clone(),
            images[2].url.clone(),
        ];

        let raw = self.vision.describe_changes(&ordered).await?;
        let report = report::normalize(&raw)?;

        Ok(PipelineResult { images, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landwatch_models::Confidence;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeLocator {
        records: Vec<CaptureRecord>,
        calls: AtomicUsize,
    }

    impl FakeLocator {
        fn with_stems(stems: &[&str]) -> Self {
            let records = stems
                .iter()
                .map(|stem| {
                    serde_json::from_value(serde_json::json!({
                        "DIRPATH": "/captures",
                        "FILENAME": stem,
                    }))
                    .unwrap()
                })
                .collect();
            Self {
                records,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ImageLocator for FakeLocator {
        async fn locate(&self, _query: &LocationQuery) -> Result<Vec<CaptureRecord>, ArchiveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }

        fn retrieval_url(&self, record: &CaptureRecord) -> String {
            format!("https://archive.test{}/{}.jpg", record.dir_path, record.file_name)
        }
    }

    struct FakeStore {
        fail_on: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeStore {
        const fn ok() -> Self {
            Self {
                fail_on: None,
                calls: AtomicUsize::new(0),
            }
        }

        const fn failing_on(stem: &'static str) -> Self {
            Self {
                fail_on: Some(stem),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ImageStore for FakeStore {
        async fn transfer(&self, source_url: &str) -> Result<StoredImage, StorageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stem) = self.fail_on
                && source_url.contains(stem)
            {
                return Err(StorageError::Download {
                    url: source_url.to_string(),
                    source: "HTTP 502".into(),
                });
            }
            Ok(StoredImage {
                url: source_url.replace("https://archive.test", "https://stored.test"),
            })
        }
    }

    struct FakeVision {
        answer: &'static str,
        calls: AtomicUsize,
    }

    impl FakeVision {
        const fn answering(answer: &'static str) -> Self {
            Self {
                answer,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl VisionProvider for FakeVision {
        async fn describe_changes(
            &self,
            _images: &[String; COMPARISON_IMAGES],
        ) -> Result<String, VisionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.to_string())
        }
    }

    fn pipeline(
        locator: Arc<FakeLocator>,
        store: Arc<FakeStore>,
        vision: Arc<FakeVision>,
    ) -> Pipeline {
        Pipeline::new(locator, store, vision)
    }

    fn query() -> LocationQuery {
        LocationQuery {
            latitude: 28.6,
            longitude: 77.2,
        }
    }

    #[tokio::test]
    async fn success_selects_last_three_and_reports() {
        let locator = Arc::new(FakeLocator::with_stems(&[
            "jan", "feb", "mar", "jun", "jul",
        ]));
        let store = Arc::new(FakeStore::ok());
        let vision = Arc::new(FakeVision::answering(
            "```json\n{\"summary\":\"No major change\",\"confidence\":\"High\"}\n```",
        ));

        let result = pipeline(locator, Arc::clone(&store), Arc::clone(&vision))
            .run(query())
            .await
            .unwrap();

        let urls: Vec<&str> = result.images.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://stored.test/captures/mar.jpg",
                "https://stored.test/captures/jun.jpg",
                "https://stored.test/captures/jul.jpg",
            ]
        );
        assert_eq!(result.report.confidence, Some(Confidence::High));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn insufficient_captures_do_no_further_work() {
        let locator = Arc::new(FakeLocator::with_stems(&["only"]));
        let store = Arc::new(FakeStore::ok());
        let vision = Arc::new(FakeVision::answering("```json\n{}\n```"));

        let err = pipeline(locator, Arc::clone(&store), Arc::clone(&vision))
            .run(query())
            .await
            .unwrap_err();

        assert!(err.is_insufficient_results());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn single_transfer_failure_fails_the_run() {
        let locator = Arc::new(FakeLocator::with_stems(&["a", "b", "c"]));
        let store = Arc::new(FakeStore::failing_on("b"));
        let vision = Arc::new(FakeVision::answering("```json\n{}\n```"));

        let err = pipeline(locator, Arc::clone(&store), Arc::clone(&vision))
            .run(query())
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(!err.is_insufficient_results());
        // All three transfers were started and awaited; no report produced.
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
        assert_eq!(vision.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_model_output_fails_after_analysis() {
        let locator = Arc::new(FakeLocator::with_stems(&["a", "b", "c"]));
        let store = Arc::new(FakeStore::ok());
        let vision = Arc::new(FakeVision::answering(
            "I could not find any structured changes.",
        ));

        let err = pipeline(locator, store, Arc::clone(&vision))
            .run(query())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Report(ReportError::MissingJson)
        ));
        assert_eq!(vision.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn images_keep_temporal_order_under_concurrency() {
        let locator = Arc::new(FakeLocator::with_stems(&["x", "y", "z"]));
        let store = Arc::new(FakeStore::ok());
        let vision = Arc::new(FakeVision::answering("```json\n{}\n```"));

        let result = pipeline(locator, store, vision).run(query()).await.unwrap();

        assert_eq!(result.images.len(), 3);
        assert!(result.images[0].url.ends_with("x.jpg"));
        assert!(result.images[2].url.ends_with("z.jpg"));
    }
}
