//! In-memory collaborator implementations.
//!
//! Back the trait seams with plain maps for tests, local runs, and demos.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::AnalysisResult;

use super::{AlarmSpec, EncryptionMode, MetricsSink, ObjectStore, ResultQuery, ResultStore};

// =============================================================================
// Memory Object Store
// =============================================================================

/// Object store backed by a `(bucket, key) -> bytes` map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        bytes: &[u8],
        _encryption: EncryptionMode,
    ) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no such object: {bucket}/{key}")))
    }

    async fn presigned_url(&self, bucket: &str, key: &str, ttl_secs: u64) -> Result<String> {
        if !self.contains(bucket, key) {
            return Err(Error::Storage(format!("no such object: {bucket}/{key}")));
        }
        Ok(format!("memory://{bucket}/{key}?expires_in={ttl_secs}"))
    }
}

// =============================================================================
// Memory Result Store
// =============================================================================

/// Result store backed by an `id -> record` map. Inserts overwrite, which
/// gives the same idempotency as the real store's upsert.
#[derive(Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<String, AnalysisResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn get(&self, id: &str) -> Option<AnalysisResult> {
        self.records.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(&self, record: &AnalysisResult) -> Result<()> {
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn query(&self, query: &ResultQuery) -> Result<Vec<AnalysisResult>> {
        let records = self.records.lock().unwrap();
        let mut matches: Vec<AnalysisResult> = records
            .values()
            .filter(|r| r.timestamp >= query.start && r.timestamp <= query.end)
            .filter(|r| {
                query
                    .camera_id
                    .as_ref()
                    .map_or(true, |camera| &r.camera_id == camera)
            })
            .filter(|r| {
                query.label.as_ref().map_or(true, |wanted| {
                    r.labels.iter().any(|l| l.name.eq_ignore_ascii_case(wanted))
                })
            })
            .cloned()
            .collect();
        matches.sort_by_key(|r| r.timestamp);
        Ok(matches)
    }
}

// =============================================================================
// Recording Metrics
// =============================================================================

/// Metrics sink that records every emission and alarm for inspection.
#[derive(Default)]
pub struct RecordingMetrics {
    emitted: Mutex<Vec<(String, f64, String)>>,
    alarms: Mutex<Vec<AlarmSpec>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> Vec<(String, f64, String)> {
        self.emitted.lock().unwrap().clone()
    }

    pub fn alarms(&self) -> Vec<AlarmSpec> {
        self.alarms.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSink for RecordingMetrics {
    async fn emit(&self, name: &str, value: f64, unit: &str) -> Result<()> {
        self.emitted
            .lock()
            .unwrap()
            .push((name.to_string(), value, unit.to_string()));
        Ok(())
    }

    async fn create_alarm(&self, spec: &AlarmSpec) -> Result<()> {
        self.alarms.lock().unwrap().push(spec.clone());
        Ok(())
    }
}
