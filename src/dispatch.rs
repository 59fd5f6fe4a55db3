//! Detection Dispatch
//!
//! Bounded worker pool fanning encoded frames out to the synchronous
//! detection capability. Workers consume frames from a shared queue, upload
//! each to the object store, run detection through the retry policy, and
//! publish outcomes to an aggregation channel. Every frame is attempted
//! exactly once; completion order is unspecified; one frame's failure never
//! blocks or cancels its siblings.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::clients::{EncryptionMode, ImageRef, LabelDetector, ObjectStore};
use crate::error::Result;
use crate::models::{DetectionLabel, EncodedFrame};
use crate::retry::RetryPolicy;

// =============================================================================
// Configuration
// =============================================================================

/// Dispatcher configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of concurrent workers
    pub width: usize,
    /// Bucket encoded frames are uploaded to
    pub frame_bucket: String,
    /// Maximum labels requested per frame
    pub max_labels: u32,
    /// Minimum confidence requested from the detector (0-100)
    pub min_confidence: f32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            width: 5,
            frame_bucket: "processed-frames-storage".to_string(),
            max_labels: 10,
            min_confidence: 80.0,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Outcome of one frame's detection attempt. `key` is the per-frame object
/// key the frame was uploaded under and doubles as the result identity.
#[derive(Debug)]
pub struct FrameOutcome {
    pub index: u64,
    pub key: String,
    pub result: Result<Vec<DetectionLabel>>,
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Sends encoded frames to the synchronous detection capability with bounded
/// concurrency.
pub struct DetectionDispatcher {
    objects: Arc<dyn ObjectStore>,
    detector: Arc<dyn LabelDetector>,
    retry: Arc<RetryPolicy>,
    config: DispatcherConfig,
}

impl DetectionDispatcher {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        detector: Arc<dyn LabelDetector>,
        retry: Arc<RetryPolicy>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            objects,
            detector,
            retry,
            config,
        }
    }

    /// Attempts every frame exactly once and returns after all workers have
    /// drained the queue. `request_id` namespaces the per-frame object keys
    /// so concurrent streams never collide.
    pub async fn dispatch(&self, frames: Vec<EncodedFrame>, request_id: &str) -> Vec<FrameOutcome> {
        if frames.is_empty() {
            return Vec::new();
        }

        let total = frames.len();
        let width = self.config.width.max(1).min(total);
        let queue = Arc::new(Mutex::new(VecDeque::from(frames)));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let mut workers = Vec::with_capacity(width);
        for worker_id in 0..width {
            let queue = Arc::clone(&queue);
            let outcome_tx = outcome_tx.clone();
            let objects = Arc::clone(&self.objects);
            let detector = Arc::clone(&self.detector);
            let retry = Arc::clone(&self.retry);
            let config = self.config.clone();
            let request_id = request_id.to_string();

            workers.push(tokio::spawn(async move {
                loop {
                    // Lock scope stays synchronous; never held across await.
                    let frame = queue.lock().unwrap().pop_front();
                    let Some(frame) = frame else { break };

                    let outcome =
                        process_frame(&*objects, &*detector, &retry, &config, &request_id, frame)
                            .await;
                    debug!(worker_id, index = outcome.index, "frame attempted");
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(outcome_tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = outcome_rx.recv().await {
            outcomes.push(outcome);
        }
        for worker in workers {
            let _ = worker.await;
        }
        outcomes
    }
}

/// Upload one frame and run detection on it, isolating any failure into the
/// returned outcome.
async fn process_frame(
    objects: &dyn ObjectStore,
    detector: &dyn LabelDetector,
    retry: &RetryPolicy,
    config: &DispatcherConfig,
    request_id: &str,
    frame: EncodedFrame,
) -> FrameOutcome {
    let key = format!("frames/{}_{}.jpg", frame.index, request_id);
    let image = ImageRef {
        bucket: config.frame_bucket.clone(),
        key: key.clone(),
    };

    let upload = retry.execute("frame upload", || {
        objects.put(&image.bucket, &image.key, &frame.bytes, EncryptionMode::Aes256)
    });
    let result = match upload.await {
        Ok(()) => {
            retry
                .execute("detect labels", || {
                    detector.detect(&image, config.max_labels, config.min_confidence)
                })
                .await
        }
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        warn!(index = frame.index, key = %key, "frame detection failed: {e}");
    }
    FrameOutcome {
        index: frame.index,
        key,
        result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::MemoryObjectStore;
    use crate::error::Error;
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Detector that records attempts per frame index and fails on request.
    #[derive(Default)]
    struct CountingDetector {
        attempts: Mutex<HashMap<String, usize>>,
        fail_keys_containing: Option<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl LabelDetector for CountingDetector {
        async fn detect(
            &self,
            image: &ImageRef,
            _max_labels: u32,
            _min_confidence: f32,
        ) -> Result<Vec<DetectionLabel>> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            *self
                .attempts
                .lock()
                .unwrap()
                .entry(image.key.clone())
                .or_insert(0) += 1;

            // Yield so siblings can overlap.
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if let Some(marker) = &self.fail_keys_containing {
                if image.key.contains(marker) {
                    return Err(Error::InvalidInput("unreadable image".into()));
                }
            }
            Ok(vec![DetectionLabel::new("Person", 91.5)])
        }
    }

    fn frames(count: u64) -> Vec<EncodedFrame> {
        (0..count)
            .map(|index| EncodedFrame {
                index,
                timestamp: index as f64,
                bytes: vec![0xff, 0xd8, index as u8],
                mime_type: "image/jpeg",
            })
            .collect()
    }

    fn dispatcher(detector: Arc<CountingDetector>, width: usize) -> DetectionDispatcher {
        let retry = RetryPolicy::new(RetryConfig {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
            ..RetryConfig::default()
        });
        DetectionDispatcher::new(
            Arc::new(MemoryObjectStore::new()),
            detector,
            Arc::new(retry),
            DispatcherConfig {
                width,
                ..DispatcherConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn test_every_frame_attempted_exactly_once() {
        for width in [1, 3, 16] {
            let detector = Arc::new(CountingDetector::default());
            let outcomes = dispatcher(Arc::clone(&detector), width)
                .dispatch(frames(12), "req-1")
                .await;

            assert_eq!(outcomes.len(), 12, "width {width}");
            let mut seen: Vec<u64> = outcomes.iter().map(|o| o.index).collect();
            seen.sort_unstable();
            assert_eq!(seen, (0..12).collect::<Vec<_>>(), "width {width}");

            let attempts = detector.attempts.lock().unwrap();
            assert!(attempts.values().all(|&n| n == 1), "width {width}");
        }
    }

    #[tokio::test]
    async fn test_frame_failure_is_isolated() {
        let detector = Arc::new(CountingDetector {
            fail_keys_containing: Some("frames/5_".to_string()),
            ..CountingDetector::default()
        });
        let outcomes = dispatcher(detector, 4).dispatch(frames(10), "req-2").await;

        let failed: Vec<u64> = outcomes
            .iter()
            .filter(|o| o.result.is_err())
            .map(|o| o.index)
            .collect();
        assert_eq!(failed, vec![5]);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 9);
    }

    #[tokio::test]
    async fn test_frames_are_uploaded_before_detection() {
        let store = Arc::new(MemoryObjectStore::new());
        let retry = Arc::new(RetryPolicy::new(RetryConfig {
            max_attempts: 1,
            ..RetryConfig::default()
        }));
        let dispatcher = DetectionDispatcher::new(
            Arc::clone(&store) as Arc<dyn ObjectStore>,
            Arc::new(CountingDetector::default()),
            retry,
            DispatcherConfig::default(),
        );

        dispatcher.dispatch(frames(4), "req-3").await;

        assert_eq!(store.object_count(), 4);
        assert!(store.contains("processed-frames-storage", "frames/0_req-3.jpg"));
    }

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let detector = Arc::new(CountingDetector::default());
        let outcomes = dispatcher(detector, 5).dispatch(Vec::new(), "req-4").await;
        assert!(outcomes.is_empty());
    }
}
