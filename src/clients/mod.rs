//! External Collaborator Interfaces
//!
//! Narrow trait seams for everything the pipeline talks to over the network:
//! the object store, both detection capabilities, the result store, and the
//! metrics sink. Concrete backends live outside the core; tests and local
//! runs use the in-memory implementations in [`memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{AnalysisResult, DetectionLabel, JobId, JobStatusReport};

pub mod memory;

pub use memory::{MemoryObjectStore, MemoryResultStore, RecordingMetrics};

// =============================================================================
// Object Store
// =============================================================================

/// Server-side encryption mode for object uploads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EncryptionMode {
    None,
    Aes256,
}

/// Reference to an uploaded image the synchronous detector can read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRef {
    pub bucket: String,
    pub key: String,
}

/// Durable blob storage for raw videos and encoded frames.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        encryption: EncryptionMode,
    ) -> Result<()>;

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Mints a time-limited access URL for a stored object.
    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String>;
}

// =============================================================================
// Detection Capabilities
// =============================================================================

/// Synchronous per-image object detection.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect(
        &self,
        image: &ImageRef,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<DetectionLabel>>;
}

/// Asynchronous whole-video object detection: submit once, then poll.
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    /// Starts label detection on a stored video, optionally wiring a
    /// completion notification target. Returns the remote job id.
    async fn submit(&self, video_ref: &str, notification_target: Option<&str>) -> Result<JobId>;

    async fn poll_status(&self, job_id: &JobId) -> Result<JobStatusReport>;
}

// =============================================================================
// Result Store
// =============================================================================

/// Filter for stored analysis results. `start`/`end` bound the record
/// timestamp inclusively; `camera_id` and `label` narrow further when set.
#[derive(Clone, Debug)]
pub struct ResultQuery {
    pub camera_id: Option<String>,
    pub label: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Persistence for confidence-filtered analysis records. `put` must be
/// idempotent on `AnalysisResult::id`.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn put(&self, record: &AnalysisResult) -> Result<()>;

    async fn query(&self, query: &ResultQuery) -> Result<Vec<AnalysisResult>>;
}

// =============================================================================
// Metrics Sink
// =============================================================================

/// Comparison operator for metric alarms.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlarmComparator {
    GreaterThanThreshold,
    LessThanThreshold,
}

/// Alarm definition over an emitted metric.
#[derive(Clone, Debug)]
pub struct AlarmSpec {
    pub metric_name: String,
    pub threshold: f64,
    pub comparator: AlarmComparator,
    pub evaluation_periods: u32,
    pub period_secs: u64,
    pub notify_target: Option<String>,
}

/// Optional observability collaborator. Emission failures are logged by the
/// caller and never fail pipeline work.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn emit(&self, name: &str, value: f64, unit: &str) -> Result<()>;

    async fn create_alarm(&self, spec: &AlarmSpec) -> Result<()>;
}

/// Metrics sink that drops everything. Default when no sink is wired.
pub struct NoopMetrics;

#[async_trait]
impl MetricsSink for NoopMetrics {
    async fn emit(&self, _name: &str, _value: f64, _unit: &str) -> Result<()> {
        Ok(())
    }

    async fn create_alarm(&self, _spec: &AlarmSpec) -> Result<()> {
        Ok(())
    }
}
