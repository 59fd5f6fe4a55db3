//! Result Filtering & Persistence
//!
//! Applies the confidence threshold to raw detections and writes survivors
//! through the result-store collaborator under an idempotent key. When every
//! label falls below the threshold, nothing is written at all.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::clients::ResultStore;
use crate::error::Result;
use crate::models::{AnalysisResult, CaptureContext, DetectionLabel};
use crate::retry::RetryPolicy;

pub mod sqlite;

pub use sqlite::SqliteResultStore;

/// Default minimum confidence (0-100) a label must meet to be persisted.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 80.0;

/// What a store call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
    Stored,
    Skipped,
}

/// Confidence-filters detections and persists surviving results.
pub struct ResultWriter {
    results: Arc<dyn ResultStore>,
    retry: Arc<RetryPolicy>,
    threshold: f32,
}

impl ResultWriter {
    pub fn new(results: Arc<dyn ResultStore>, retry: Arc<RetryPolicy>, threshold: f32) -> Self {
        Self {
            results,
            retry,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Filters `labels` to those meeting the threshold and persists the
    /// survivors keyed by `id`. Repeated delivery of the same identity
    /// overwrites rather than duplicates. Returns `Skipped` without writing
    /// when no label survives.
    pub async fn store(
        &self,
        id: &str,
        labels: Vec<DetectionLabel>,
        context: &CaptureContext,
        video_key: Option<&str>,
    ) -> Result<StoreOutcome> {
        let kept: Vec<DetectionLabel> = labels
            .into_iter()
            .filter(|label| label.confidence >= self.threshold)
            .collect();

        if kept.is_empty() {
            info!(
                id,
                threshold = self.threshold,
                "no labels above confidence threshold, skipping"
            );
            return Ok(StoreOutcome::Skipped);
        }

        let record = AnalysisResult {
            id: id.to_string(),
            camera_id: context.camera_id.clone(),
            location: context.location.clone(),
            labels: kept,
            video_key: video_key.map(str::to_string),
            timestamp: Utc::now(),
        };

        self.retry
            .execute("store analysis result", || self.results.put(&record))
            .await?;
        info!(id, labels = record.labels.len(), "analysis result stored");
        Ok(StoreOutcome::Stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryResultStore;
    use crate::retry::{RetryConfig, RetryPolicy};

    fn writer(store: Arc<MemoryResultStore>, threshold: f32) -> ResultWriter {
        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryConfig::default()
        });
        ResultWriter::new(store, Arc::new(retry), threshold)
    }

    fn context() -> CaptureContext {
        CaptureContext {
            camera_id: "cam-7".into(),
            location: "garage".into(),
        }
    }

    #[tokio::test]
    async fn test_threshold_boundary_is_inclusive() {
        let store = Arc::new(MemoryResultStore::new());
        let writer = writer(Arc::clone(&store), 80.0);

        let labels = vec![
            DetectionLabel::new("Person", 80.0),
            DetectionLabel::new("Shadow", 79.9),
        ];
        let outcome = writer.store("frame-1", labels, &context(), None).await.unwrap();

        assert_eq!(outcome, StoreOutcome::Stored);
        let record = store.get("frame-1").unwrap();
        assert_eq!(record.labels, vec![DetectionLabel::new("Person", 80.0)]);
    }

    #[tokio::test]
    async fn test_all_filtered_skips_the_write() {
        let store = Arc::new(MemoryResultStore::new());
        let writer = writer(Arc::clone(&store), 80.0);

        let labels = vec![
            DetectionLabel::new("Cat", 42.0),
            DetectionLabel::new("Dog", 79.99),
        ];
        let outcome = writer.store("frame-2", labels, &context(), None).await.unwrap();

        assert_eq!(outcome, StoreOutcome::Skipped);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_label_set_skips_the_write() {
        let store = Arc::new(MemoryResultStore::new());
        let writer = writer(Arc::clone(&store), 80.0);

        let outcome = writer.store("frame-3", Vec::new(), &context(), None).await.unwrap();
        assert_eq!(outcome, StoreOutcome::Skipped);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_repeated_delivery_does_not_duplicate() {
        let store = Arc::new(MemoryResultStore::new());
        let writer = writer(Arc::clone(&store), 80.0);

        let labels = vec![DetectionLabel::new("Person", 95.0)];
        writer
            .store("job-1", labels.clone(), &context(), Some("videos/cam-7/a.mp4"))
            .await
            .unwrap();
        writer
            .store("job-1", labels, &context(), Some("videos/cam-7/a.mp4"))
            .await
            .unwrap();

        assert_eq!(store.record_count(), 1);
        let record = store.get("job-1").unwrap();
        assert_eq!(record.camera_id, "cam-7");
        assert_eq!(record.video_key.as_deref(), Some("videos/cam-7/a.mp4"));
    }
}
