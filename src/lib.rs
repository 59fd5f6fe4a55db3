//! StreamLens Analysis Core
//!
//! Library core for a video surveillance pipeline: ingested camera streams
//! are sampled into frames, preprocessed, and fanned out to an external
//! object-detection capability by a bounded worker pool. Whole videos can
//! alternatively be submitted as long-running asynchronous detection jobs
//! tracked by a polling state machine. Surviving detections are
//! confidence-filtered and persisted idempotently.
//!
//! All external collaborators (object store, detection capabilities, result
//! store, metrics sink) are narrow traits in [`clients`]; every call to them
//! goes through the shared [`retry::RetryPolicy`].

pub mod clients;
pub mod dispatch;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod pipeline;
pub mod poller;
pub mod preprocess;
pub mod query;
pub mod results;
pub mod retry;

// Re-export common types
mod models;
pub use models::*;

mod error;
pub use error::*;
