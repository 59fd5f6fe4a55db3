//! Frame Extraction
//!
//! Samples a decoded video stream at a fixed time interval. Decoding itself
//! is an external collaborator behind [`StreamDecoder`]; this module owns the
//! sampling arithmetic and the single-pass iteration contract.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::models::{PixelBuffer, RawFrame, VideoStream};

// =============================================================================
// Decoder Seam
// =============================================================================

/// Decoded container handle. Frames come back in decode order and the handle
/// is consumed by iteration; there is no rewind.
pub trait DecodedStream: Send {
    /// Intrinsic frame rate declared by the container, if any.
    fn frame_rate(&self) -> Option<f64>;

    /// Next frame in decode order; `None` once the stream is exhausted.
    /// `Some(Err(..))` is a single-frame decode failure, not end of stream.
    fn next_frame(&mut self) -> Option<Result<PixelBuffer>>;
}

/// Opens a video container from an ingested stream. Implementations must
/// return [`Error::Extraction`] when the container cannot be opened.
pub trait StreamDecoder: Send + Sync {
    fn open(&self, stream: VideoStream) -> Result<Box<dyn DecodedStream>>;
}

// =============================================================================
// Frame Extractor
// =============================================================================

/// Turns an ingested stream into a finite, lazily sampled frame sequence.
pub struct FrameExtractor {
    decoder: Arc<dyn StreamDecoder>,
}

impl FrameExtractor {
    pub fn new(decoder: Arc<dyn StreamDecoder>) -> Self {
        Self { decoder }
    }

    /// Opens `stream` and returns the sampled sequence: one frame every
    /// `interval_secs` seconds of stream time. Single pass; the underlying
    /// stream is consumed and the sequence is not restartable.
    pub fn extract(&self, stream: VideoStream, interval_secs: f64) -> Result<FrameSampler> {
        if interval_secs <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "sample interval must be positive, got {interval_secs}"
            )));
        }

        let stream_id = stream.metadata.stream_id.clone();
        let decoded = self.decoder.open(stream)?;
        let fps = decoded
            .frame_rate()
            .filter(|fps| *fps > 0.0)
            .ok_or_else(|| {
                Error::Extraction(format!(
                    "stream {stream_id}: frame rate could not be determined"
                ))
            })?;

        info!(stream = %stream_id, fps, interval_secs, "starting frame extraction");
        Ok(FrameSampler::new(decoded, fps, interval_secs))
    }
}

// =============================================================================
// Frame Sampler
// =============================================================================

/// Lazy sampling iterator: emits the decoded frame whenever the zero-based
/// decode counter is a multiple of `round(fps * interval)`. Per-frame decode
/// failures are logged and skipped; exhaustion ends the sequence normally.
pub struct FrameSampler {
    inner: Box<dyn DecodedStream>,
    fps: f64,
    step: u64,
    decode_counter: u64,
    emitted: u64,
}

impl FrameSampler {
    fn new(inner: Box<dyn DecodedStream>, fps: f64, interval_secs: f64) -> Self {
        // A sub-frame interval still samples every frame.
        let step = (fps * interval_secs).round().max(1.0) as u64;
        Self {
            inner,
            fps,
            step,
            decode_counter: 0,
            emitted: 0,
        }
    }

    /// Decode positions between emitted frames.
    pub fn step(&self) -> u64 {
        self.step
    }
}

impl Iterator for FrameSampler {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        loop {
            let counter = self.decode_counter;
            let pixels = match self.inner.next_frame() {
                None => return None,
                Some(Err(e)) => {
                    self.decode_counter += 1;
                    warn!("skipping undecodable frame at position {counter}: {e}");
                    continue;
                }
                Some(Ok(pixels)) => pixels,
            };
            self.decode_counter += 1;

            if counter % self.step == 0 {
                let index = self.emitted;
                self.emitted += 1;
                return Some(RawFrame {
                    index,
                    timestamp: counter as f64 / self.fps,
                    pixels,
                });
            }
        }
    }
}
