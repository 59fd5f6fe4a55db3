//! StreamLens Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Camera unique identifier
pub type CameraId = String;

/// Ingested stream unique identifier
pub type StreamId = String;

/// Asynchronous detection job unique identifier
pub type JobId = String;

/// Time in seconds (floating point)
pub type TimeSec = f64;

// =============================================================================
// Stream Types
// =============================================================================

/// Metadata attached to an ingested camera stream.
/// Every field is required at registration time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub camera_id: CameraId,
    pub location: String,
    /// Capture resolution, e.g. "1080p"
    pub resolution: String,
    /// Capture frame rate, e.g. "30fps"
    pub frame_rate: String,
    /// Container/codec, e.g. "H.264"
    pub video_format: String,
    pub stream_id: StreamId,
}

/// An ingested video stream: registration metadata plus an opaque,
/// sequentially-readable byte payload. The payload is consumed exactly once
/// by the frame extractor and is never rewound.
pub struct VideoStream {
    pub metadata: StreamMetadata,
    pub payload: Box<dyn std::io::Read + Send>,
}

impl VideoStream {
    pub fn new(metadata: StreamMetadata, payload: Box<dyn std::io::Read + Send>) -> Self {
        Self { metadata, payload }
    }
}

impl std::fmt::Debug for VideoStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoStream")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Frame Types
// =============================================================================

/// Packed RGB8 pixel buffer, row-major.
#[derive(Clone, Debug)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// One sampled frame. `index` is the zero-based ordinal within the sampled
/// sequence and is strictly increasing; `timestamp` is the offset into the
/// stream derived from the decode counter and intrinsic frame rate.
#[derive(Clone, Debug)]
pub struct RawFrame {
    pub index: u64,
    pub timestamp: TimeSec,
    pub pixels: PixelBuffer,
}

/// A frame after resize, denoise, and compression, ready for upload.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    pub index: u64,
    pub timestamp: TimeSec,
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
}

// =============================================================================
// Detection Types
// =============================================================================

/// A detected label with model confidence in percent (0-100).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionLabel {
    pub name: String,
    pub confidence: f32,
}

impl DetectionLabel {
    pub fn new(name: impl Into<String>, confidence: f32) -> Self {
        Self {
            name: name.into(),
            confidence,
        }
    }
}

/// Lifecycle state of an asynchronous whole-video detection job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Submitted,
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::TimedOut
        )
    }
}

/// An asynchronous detection job tracked by the poller. Mutated only by the
/// poller; `attempts` is monotonically non-decreasing and capped by
/// configuration.
#[derive(Clone, Debug)]
pub struct DetectionJob {
    pub job_id: JobId,
    /// Object-store key of the submitted video.
    pub video_ref: String,
    pub state: JobState,
    pub attempts: u32,
}

/// Status reported by the asynchronous detection capability for one poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    InProgress,
    Succeeded,
    Failed,
    /// Any status the poller does not recognize; treated as still running.
    Other(String),
}

/// One poll response: the remote status plus the result payload, which is
/// only meaningful once the status is `Succeeded`.
#[derive(Clone, Debug)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub labels: Vec<DetectionLabel>,
}

// =============================================================================
// Result Types
// =============================================================================

/// Ambient capture context carried from the stream into persisted results.
#[derive(Clone, Debug, Default)]
pub struct CaptureContext {
    pub camera_id: CameraId,
    pub location: String,
}

/// Persisted analysis record. `id` is the job or frame identity and acts as
/// the idempotency key: repeated delivery never creates duplicates.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: String,
    pub camera_id: CameraId,
    pub location: String,
    /// Labels that survived the confidence filter, in detector order.
    pub labels: Vec<DetectionLabel>,
    /// Object-store key of the archived source video, when known.
    pub video_key: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_terminality() {
        assert!(!JobState::Submitted.is_terminal());
        assert!(!JobState::Polling.is_terminal());
        assert!(JobState::Succeeded.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::TimedOut.is_terminal());
    }
}
