//! In-memory cache for single-node deployments and tests.

use super::{Cache, Slot, SlotValue};
use crate::error::CacheError;
use crate::types::PipelineId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct Record {
    slots: HashMap<Slot, SlotValue>,
    expires_at: Option<Instant>,
}

impl Record {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Process-local [`Cache`] backed by a map of pipeline records.
///
/// Expired records read as absent; [`purge_expired`](Self::purge_expired)
/// reclaims their memory. Nothing here runs in the background.
#[derive(Debug, Default)]
pub struct LocalCache {
    records: RwLock<HashMap<PipelineId, Record>>,
}

impl LocalCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired record. Returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(now));
        let purged = before - records.len();
        if purged > 0 {
            tracing::debug!(purged, remaining = records.len(), "Purged expired pipeline records");
        }
        purged
    }

    /// Number of live records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.records
            .read()
            .await
            .values()
            .filter(|record| !record.is_expired(now))
            .count()
    }

    /// Whether no live record exists.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Cache for LocalCache {
    async fn set_value(&self, id: PipelineId, value: SlotValue) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut records = self.records.write().await;
        let record = records.entry(id).or_default();
        if record.is_expired(now) {
            *record = Record::default();
        }
        tracing::trace!(pipeline_id = %id, slot = %value.slot(), "Cache write");
        record.slots.insert(value.slot(), value);
        Ok(())
    }

    async fn get_value(&self, id: PipelineId, slot: Slot) -> Result<SlotValue, CacheError> {
        let now = Instant::now();
        let records = self.records.read().await;
        records
            .get(&id)
            .filter(|record| !record.is_expired(now))
            .and_then(|record| record.slots.get(&slot))
            .cloned()
            .ok_or(CacheError::NotFound {
                pipeline_id: id,
                slot,
            })
    }

    async fn set_expiration(&self, id: PipelineId, ttl: Duration) -> Result<(), CacheError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) => {
                record.expires_at = Some(Instant::now() + ttl);
                tracing::trace!(pipeline_id = %id, ttl_ms = ttl.as_millis() as u64, "Record expiration set");
            }
            None => {
                tracing::debug!(pipeline_id = %id, "No record to expire");
            }
        }
        Ok(())
    }

    async fn remove(&self, id: PipelineId) -> Result<(), CacheError> {
        self.records.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_missing_slot_is_not_found() {
        let cache = LocalCache::new();
        let id = PipelineId::new();
        let err = cache.get_value(id, Slot::RunOutput).await.unwrap_err();
        assert_eq!(
            err,
            CacheError::NotFound {
                pipeline_id: id,
                slot: Slot::RunOutput
            }
        );
    }

    #[tokio::test]
    async fn test_empty_string_is_not_absent() {
        let cache = LocalCache::new();
        let id = PipelineId::new();
        cache
            .set_value(id, SlotValue::CompileOutput(String::new()))
            .await
            .unwrap();
        assert_eq!(
            cache.get_value(id, Slot::CompileOutput).await.unwrap(),
            SlotValue::CompileOutput(String::new())
        );
        assert!(cache.get_value(id, Slot::RunOutput).await.is_err());
    }

    #[tokio::test]
    async fn test_records_are_isolated() {
        let cache = LocalCache::new();
        let a = PipelineId::new();
        let b = PipelineId::new();
        cache
            .set_value(a, SlotValue::Status(Status::Finished))
            .await
            .unwrap();
        assert!(cache.get_value(b, Slot::Status).await.is_err());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value() {
        let cache = LocalCache::new();
        let id = PipelineId::new();
        cache.set_value(id, SlotValue::Canceled(false)).await.unwrap();
        cache.set_value(id, SlotValue::Canceled(true)).await.unwrap();
        assert_eq!(
            cache.get_value(id, Slot::Canceled).await.unwrap(),
            SlotValue::Canceled(true)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_reads_as_absent() {
        let cache = LocalCache::new();
        let id = PipelineId::new();
        cache
            .set_value(id, SlotValue::RunOutput("hi".into()))
            .await
            .unwrap();
        cache
            .set_expiration(id, Duration::from_secs(10))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get_value(id, Slot::RunOutput).await.is_ok());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.get_value(id, Slot::RunOutput).await.is_err());
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[tokio::test]
    async fn test_remove_drops_record() {
        let cache = LocalCache::new();
        let id = PipelineId::new();
        cache.set_value(id, SlotValue::RunOutputIndex(1)).await.unwrap();
        cache.remove(id).await.unwrap();
        assert!(cache.is_empty().await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_pipelines() {
        let cache = Arc::new(LocalCache::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                let id = PipelineId::new();
                cache
                    .set_value(id, SlotValue::RunOutput(format!("out-{i}")))
                    .await
                    .unwrap();
                (id, i)
            }));
        }
        for handle in handles {
            let (id, i) = handle.await.unwrap();
            assert_eq!(
                cache.get_value(id, Slot::RunOutput).await.unwrap(),
                SlotValue::RunOutput(format!("out-{i}"))
            );
        }
        assert_eq!(cache.len().await, 32);
    }
}
