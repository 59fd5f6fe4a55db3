//! Stream Ingestion Support
//!
//! Validation of stream registration metadata and archival of raw video
//! bytes to the object store. The actual stream transport is an external
//! ingestion collaborator; the core only sees its metadata and payload.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::clients::{EncryptionMode, ObjectStore};
use crate::error::{Error, Result};
use crate::models::StreamMetadata;
use crate::retry::RetryPolicy;

/// Validates stream registration metadata. Every field is required.
pub fn validate_metadata(meta: &StreamMetadata) -> Result<()> {
    let fields = [
        ("camera_id", &meta.camera_id),
        ("location", &meta.location),
        ("resolution", &meta.resolution),
        ("frame_rate", &meta.frame_rate),
        ("video_format", &meta.video_format),
        ("stream_id", &meta.stream_id),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "stream metadata field '{name}' must be provided"
            )));
        }
    }
    Ok(())
}

/// Archives raw camera video for long-term storage.
pub struct VideoArchiver {
    objects: Arc<dyn ObjectStore>,
    retry: Arc<RetryPolicy>,
    bucket: String,
}

impl VideoArchiver {
    pub fn new(objects: Arc<dyn ObjectStore>, retry: Arc<RetryPolicy>, bucket: String) -> Self {
        Self {
            objects,
            retry,
            bucket,
        }
    }

    /// Stores raw video bytes under a per-camera timestamped key with
    /// at-rest encryption. Returns the object key.
    pub async fn archive(&self, camera_id: &str, video: &[u8]) -> Result<String> {
        if camera_id.is_empty() {
            return Err(Error::InvalidInput("camera_id must be provided".into()));
        }
        if video.is_empty() {
            return Err(Error::InvalidInput("video data must be provided".into()));
        }

        let key = format!(
            "videos/{}/{}.mp4",
            camera_id,
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        );
        self.retry
            .execute("archive video", || {
                self.objects
                    .put(&self.bucket, &key, video, EncryptionMode::Aes256)
            })
            .await?;
        info!(camera_id, key = %key, "raw video archived");
        Ok(key)
    }
}
