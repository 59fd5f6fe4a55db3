//! Result Lookup
//!
//! Time-windowed label queries over stored analysis results, returning a
//! presigned clip URL per match. This is the library core behind the query
//! shell; conversational formatting stays outside.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::clients::{ObjectStore, ResultQuery, ResultStore};
use crate::error::{Error, Result};
use crate::models::AnalysisResult;
use crate::retry::RetryPolicy;

/// How long presigned clip URLs stay valid.
pub const DEFAULT_URL_TTL_SECS: u64 = 3_600;

/// One matching result with a time-limited access URL for its source clip.
#[derive(Clone, Debug)]
pub struct ClipMatch {
    pub result: AnalysisResult,
    pub url: String,
}

/// Looks up stored detections and mints access URLs for the matching clips.
pub struct ResultQueryService {
    results: Arc<dyn ResultStore>,
    objects: Arc<dyn ObjectStore>,
    retry: Arc<RetryPolicy>,
    video_bucket: String,
    url_ttl_secs: u64,
}

impl ResultQueryService {
    pub fn new(
        results: Arc<dyn ResultStore>,
        objects: Arc<dyn ObjectStore>,
        retry: Arc<RetryPolicy>,
        video_bucket: String,
    ) -> Self {
        Self {
            results,
            objects,
            retry,
            video_bucket,
            url_ttl_secs: DEFAULT_URL_TTL_SECS,
        }
    }

    pub fn with_url_ttl(mut self, ttl_secs: u64) -> Self {
        self.url_ttl_secs = ttl_secs;
        self
    }

    /// Finds results carrying `label` within `[start, end]`, optionally
    /// narrowed to one camera, and presigns the archived source video of
    /// each match. Records without an archived video fall back to their id
    /// as the object key.
    pub async fn find_clips(
        &self,
        camera_id: Option<&str>,
        label: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ClipMatch>> {
        if label.trim().is_empty() {
            return Err(Error::InvalidInput("object type must be provided".into()));
        }
        if end < start {
            return Err(Error::InvalidInput(format!(
                "time range end {end} precedes start {start}"
            )));
        }

        let query = ResultQuery {
            camera_id: camera_id.map(str::to_string),
            label: Some(label.to_string()),
            start,
            end,
        };
        let records = self
            .retry
            .execute("query analysis results", || self.results.query(&query))
            .await?;

        let mut clips = Vec::with_capacity(records.len());
        for record in records {
            let key = record
                .video_key
                .clone()
                .unwrap_or_else(|| record.id.clone());
            let url = self
                .retry
                .execute("presign clip url", || {
                    self.objects
                        .presigned_url(&self.video_bucket, &key, self.url_ttl_secs)
                })
                .await?;
            clips.push(ClipMatch {
                result: record,
                url,
            });
        }

        info!(label, matches = clips.len(), "result query completed");
        Ok(clips)
    }
}
