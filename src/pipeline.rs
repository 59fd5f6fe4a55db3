//! Pipeline Orchestration
//!
//! Wires the components together: extraction into preprocessing into the
//! dispatcher into the result writer for per-frame analysis, and the poller
//! into the result writer for whole-video jobs. Collaborators are
//! constructed once and injected here; no global client state exists
//! anywhere in the crate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{
    AlarmComparator, AlarmSpec, LabelDetector, MetricsSink, ObjectStore, ResultStore,
    VideoAnalyzer,
};
use crate::dispatch::{DetectionDispatcher, DispatcherConfig};
use crate::error::Result;
use crate::extract::{FrameExtractor, StreamDecoder};
use crate::ingest::validate_metadata;
use crate::models::{CaptureContext, RawFrame, VideoStream};
use crate::poller::{JobPoller, PollerConfig};
use crate::preprocess::{FramePreprocessor, DEFAULT_JPEG_QUALITY};
use crate::results::{ResultWriter, StoreOutcome, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::retry::{RetryConfig, RetryPolicy};

// =============================================================================
// Configuration
// =============================================================================

/// Top-level pipeline configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seconds of stream time between sampled frames
    pub sample_interval_secs: f64,
    /// JPEG quality for preprocessed frames (1-100)
    pub jpeg_quality: u8,
    /// Minimum confidence (0-100) for persisting a label
    pub confidence_threshold: f32,
    /// Bucket holding archived source videos
    pub video_bucket: String,
    pub dispatcher: DispatcherConfig,
    pub poller: PollerConfig,
    pub retry: RetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 1.0,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            video_bucket: "video-storage".to_string(),
            dispatcher: DispatcherConfig::default(),
            poller: PollerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

// =============================================================================
// Collaborators
// =============================================================================

/// Everything the pipeline talks to, injected once at construction.
pub struct Collaborators {
    pub decoder: Arc<dyn StreamDecoder>,
    pub objects: Arc<dyn ObjectStore>,
    pub detector: Arc<dyn LabelDetector>,
    pub analyzer: Arc<dyn VideoAnalyzer>,
    pub results: Arc<dyn ResultStore>,
    pub metrics: Arc<dyn MetricsSink>,
}

// =============================================================================
// Reports
// =============================================================================

/// Summary of one stream's trip through the frame pipeline.
#[derive(Clone, Debug, Default, Serialize)]
pub struct StreamReport {
    pub request_id: String,
    pub frames_sampled: usize,
    pub frames_encoded: usize,
    pub frames_detected: usize,
    pub frames_failed: usize,
    pub results_stored: usize,
    pub results_skipped: usize,
}

// =============================================================================
// Analysis Pipeline
// =============================================================================

/// The assembled analysis pipeline.
pub struct AnalysisPipeline {
    extractor: FrameExtractor,
    preprocessor: FramePreprocessor,
    dispatcher: DetectionDispatcher,
    poller: JobPoller,
    writer: ResultWriter,
    metrics: Arc<dyn MetricsSink>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        let retry = Arc::new(RetryPolicy::new(config.retry.clone()));

        let extractor = FrameExtractor::new(collaborators.decoder);
        let preprocessor = FramePreprocessor::new(config.jpeg_quality);
        let dispatcher = DetectionDispatcher::new(
            collaborators.objects,
            collaborators.detector,
            Arc::clone(&retry),
            config.dispatcher.clone(),
        );
        let poller = JobPoller::new(
            collaborators.analyzer,
            Arc::clone(&retry),
            config.poller.clone(),
        );
        let writer = ResultWriter::new(collaborators.results, retry, config.confidence_threshold);

        Self {
            extractor,
            preprocessor,
            dispatcher,
            poller,
            writer,
            metrics: collaborators.metrics,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs the frame pipeline for one stream: sample, preprocess, dispatch,
    /// filter, persist. A fatal extraction error aborts only this stream;
    /// frame-level failures are isolated and counted in the report.
    /// Detection outcomes already produced when a frame's sibling fails are
    /// still persisted.
    pub async fn analyze_stream(&self, stream: VideoStream) -> Result<StreamReport> {
        validate_metadata(&stream.metadata)?;

        let request_id = Uuid::new_v4().to_string();
        let context = CaptureContext {
            camera_id: stream.metadata.camera_id.clone(),
            location: stream.metadata.location.clone(),
        };

        let sampler = self
            .extractor
            .extract(stream, self.config.sample_interval_secs)?;
        let raw: Vec<RawFrame> = sampler.collect();
        let frames_sampled = raw.len();

        let encoded = self.preprocessor.encode_all(raw);
        let frames_encoded = encoded.len();

        let outcomes = self.dispatcher.dispatch(encoded, &request_id).await;

        let mut report = StreamReport {
            request_id: request_id.clone(),
            frames_sampled,
            frames_encoded,
            ..StreamReport::default()
        };

        for outcome in outcomes {
            match outcome.result {
                Ok(labels) => {
                    report.frames_detected += 1;
                    match self.writer.store(&outcome.key, labels, &context, None).await {
                        Ok(StoreOutcome::Stored) => report.results_stored += 1,
                        Ok(StoreOutcome::Skipped) => report.results_skipped += 1,
                        Err(e) => {
                            report.frames_failed += 1;
                            warn!(index = outcome.index, "failed to store frame result: {e}");
                        }
                    }
                }
                Err(_) => report.frames_failed += 1,
            }
        }

        self.emit_stream_metrics(&report).await;
        info!(
            request_id = %report.request_id,
            frames = report.frames_sampled,
            stored = report.results_stored,
            failed = report.frames_failed,
            "stream analysis complete"
        );
        Ok(report)
    }

    /// Submits an archived video for asynchronous analysis, polls the job to
    /// completion, and persists the confidence-filtered outcome keyed by the
    /// job id.
    pub async fn analyze_video(
        &self,
        video_key: &str,
        context: &CaptureContext,
        notification_target: Option<&str>,
    ) -> Result<StoreOutcome> {
        let (job, labels) = self
            .poller
            .run_to_completion(video_key, notification_target)
            .await?;
        self.writer
            .store(&job.job_id, labels, context, Some(video_key))
            .await
    }

    /// Installs the default operational alarms on the metrics sink.
    pub async fn install_alarms(&self, notify_target: Option<&str>) -> Result<()> {
        let alarm = AlarmSpec {
            metric_name: "FramesFailed".to_string(),
            threshold: 10.0,
            comparator: AlarmComparator::GreaterThanThreshold,
            evaluation_periods: 1,
            period_secs: 300,
            notify_target: notify_target.map(str::to_string),
        };
        self.metrics.create_alarm(&alarm).await
    }

    /// Metric emission is best effort and never fails the pipeline.
    async fn emit_stream_metrics(&self, report: &StreamReport) {
        let counters = [
            ("FramesSampled", report.frames_sampled),
            ("FramesFailed", report.frames_failed),
            ("ResultsStored", report.results_stored),
        ];
        for (name, value) in counters {
            if let Err(e) = self.metrics.emit(name, value as f64, "Count").await {
                warn!("metric emission failed for {name}: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::RecordingMetrics;
    use crate::clients::{MemoryObjectStore, MemoryResultStore};
    use crate::error::Error;
    use crate::extract::{DecodedStream, StreamDecoder};
    use crate::models::{
        DetectionLabel, JobStatus, JobStatusReport, PixelBuffer, StreamMetadata,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct SyntheticDecoded {
        remaining: u64,
    }

    impl DecodedStream for SyntheticDecoded {
        fn frame_rate(&self) -> Option<f64> {
            Some(30.0)
        }

        fn next_frame(&mut self) -> Option<crate::Result<PixelBuffer>> {
            if self.remaining == 0 {
                return None;
            }
            self.remaining -= 1;
            Some(Ok(PixelBuffer {
                width: 8,
                height: 8,
                data: vec![200; 8 * 8 * 3],
            }))
        }
    }

    struct SyntheticDecoder {
        total: u64,
    }

    impl StreamDecoder for SyntheticDecoder {
        fn open(&self, _stream: VideoStream) -> crate::Result<Box<dyn DecodedStream>> {
            Ok(Box::new(SyntheticDecoded {
                remaining: self.total,
            }))
        }
    }

    struct StaticDetector {
        labels: Vec<DetectionLabel>,
    }

    #[async_trait]
    impl LabelDetector for StaticDetector {
        async fn detect(
            &self,
            _image: &crate::clients::ImageRef,
            _max_labels: u32,
            _min_confidence: f32,
        ) -> crate::Result<Vec<DetectionLabel>> {
            Ok(self.labels.clone())
        }
    }

    struct ScriptedAnalyzer {
        statuses: Mutex<std::vec::IntoIter<JobStatus>>,
        labels: Vec<DetectionLabel>,
    }

    #[async_trait]
    impl VideoAnalyzer for ScriptedAnalyzer {
        async fn submit(
            &self,
            _video_ref: &str,
            _notification_target: Option<&str>,
        ) -> crate::Result<String> {
            Ok("job-7".to_string())
        }

        async fn poll_status(&self, _job_id: &String) -> crate::Result<JobStatusReport> {
            let status = self
                .statuses
                .lock()
                .unwrap()
                .next()
                .unwrap_or(JobStatus::InProgress);
            let labels = if status == JobStatus::Succeeded {
                self.labels.clone()
            } else {
                Vec::new()
            };
            Ok(JobStatusReport { status, labels })
        }
    }

    fn stream(total_frames: u64) -> (VideoStream, SyntheticDecoder) {
        let stream = VideoStream::new(
            StreamMetadata {
                camera_id: "cam-1".into(),
                location: "lobby".into(),
                resolution: "1080p".into(),
                frame_rate: "30fps".into(),
                video_format: "H.264".into(),
                stream_id: "stream-1".into(),
            },
            Box::new(std::io::empty()),
        );
        (stream, SyntheticDecoder {
            total: total_frames,
        })
    }

    fn pipeline(
        decoder: SyntheticDecoder,
        detector_labels: Vec<DetectionLabel>,
        results: Arc<MemoryResultStore>,
        metrics: Arc<RecordingMetrics>,
    ) -> AnalysisPipeline {
        let collaborators = Collaborators {
            decoder: Arc::new(decoder),
            objects: Arc::new(MemoryObjectStore::new()),
            detector: Arc::new(StaticDetector {
                labels: detector_labels,
            }),
            analyzer: Arc::new(ScriptedAnalyzer {
                statuses: Mutex::new(vec![JobStatus::InProgress, JobStatus::Succeeded].into_iter()),
                labels: vec![DetectionLabel::new("Person", 97.0)],
            }),
            results,
            metrics,
        };
        let config = PipelineConfig {
            retry: RetryConfig {
                max_attempts: 2,
                base_delay_ms: 1,
                max_delay_ms: 2,
                ..RetryConfig::default()
            },
            ..PipelineConfig::default()
        };
        AnalysisPipeline::new(collaborators, config)
    }

    #[tokio::test]
    async fn test_stream_analysis_persists_confident_frames() {
        let results = Arc::new(MemoryResultStore::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let (stream, decoder) = stream(300);
        let pipeline = pipeline(
            decoder,
            vec![DetectionLabel::new("Person", 91.0)],
            Arc::clone(&results),
            Arc::clone(&metrics),
        );

        let report = pipeline.analyze_stream(stream).await.unwrap();

        assert_eq!(report.frames_sampled, 10);
        assert_eq!(report.frames_encoded, 10);
        assert_eq!(report.results_stored, 10);
        assert_eq!(report.frames_failed, 0);
        assert_eq!(results.record_count(), 10);
        assert!(metrics
            .emitted()
            .iter()
            .any(|(name, value, _)| name == "FramesSampled" && *value == 10.0));
    }

    #[tokio::test]
    async fn test_low_confidence_stream_stores_nothing() {
        let results = Arc::new(MemoryResultStore::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let (stream, decoder) = stream(300);
        let pipeline = pipeline(
            decoder,
            vec![DetectionLabel::new("Shadow", 45.0)],
            Arc::clone(&results),
            metrics,
        );

        let report = pipeline.analyze_stream(stream).await.unwrap();

        assert_eq!(report.frames_sampled, 10);
        assert_eq!(report.results_skipped, 10);
        assert_eq!(results.record_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_metadata_aborts_before_extraction() {
        let results = Arc::new(MemoryResultStore::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let (mut stream, decoder) = stream(30);
        stream.metadata.camera_id.clear();
        let pipeline = pipeline(decoder, Vec::new(), results, metrics);

        let result = pipeline.analyze_stream(stream).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_video_analysis_persists_job_result() {
        let results = Arc::new(MemoryResultStore::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let (_, decoder) = stream(0);
        let pipeline = pipeline(decoder, Vec::new(), Arc::clone(&results), metrics);

        let context = CaptureContext {
            camera_id: "cam-1".into(),
            location: "lobby".into(),
        };
        let outcome = pipeline
            .analyze_video("videos/cam-1/clip.mp4", &context, None)
            .await
            .unwrap();

        assert_eq!(outcome, StoreOutcome::Stored);
        let record = results.get("job-7").unwrap();
        assert_eq!(record.video_key.as_deref(), Some("videos/cam-1/clip.mp4"));
        assert_eq!(record.labels, vec![DetectionLabel::new("Person", 97.0)]);
    }

    #[tokio::test]
    async fn test_install_alarms_wires_notify_target() {
        let results = Arc::new(MemoryResultStore::new());
        let metrics = Arc::new(RecordingMetrics::new());
        let (_, decoder) = stream(0);
        let pipeline = pipeline(decoder, Vec::new(), results, Arc::clone(&metrics));

        pipeline.install_alarms(Some("ops-topic")).await.unwrap();

        let alarms = metrics.alarms();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].metric_name, "FramesFailed");
        assert_eq!(alarms[0].notify_target.as_deref(), Some("ops-topic"));
    }
}
