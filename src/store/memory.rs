//! In-memory chunk store

use super::{check_put, ChunkStore, StoreError, WriteContext};
use crate::chunk::Chunk;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

/// Chunks keyed by external key, plus the order they were put in
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: DashMap<String, Chunk>,
    order: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<Chunk> {
        self.chunks.get(key).map(|c| c.value().clone())
    }

    /// Keys in put order (a re-put key appears once per put)
    pub fn keys(&self) -> Vec<String> {
        self.order.lock().clone()
    }

    /// All chunks in put order
    pub fn chunks(&self) -> Vec<Chunk> {
        self.order
            .lock()
            .iter()
            .filter_map(|key| self.get(key))
            .collect()
    }

    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.value().encoded().len()).sum()
    }
}

impl ChunkStore for MemoryStore {
    fn put_one(
        &self,
        ctx: &WriteContext,
        _from: DateTime<Utc>,
        _through: DateTime<Utc>,
        chunk: Chunk,
    ) -> Result<(), StoreError> {
        check_put(ctx, &chunk)?;

        let key = chunk.external_key().to_string();
        self.chunks.insert(key.clone(), chunk);
        self.order.lock().push(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::build_chunk;
    use crate::stream::Entry;
    use chrono::TimeZone;

    fn chunk(tenant: &str, service: &str) -> Chunk {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        build_chunk(
            &format!("{{service_name=\"{}\"}}", service),
            &[Entry::new(ts, "line")],
            tenant,
        )
        .unwrap()
    }

    #[test]
    fn test_put_and_get() {
        let store = MemoryStore::new();
        let ctx = WriteContext::default();

        let a = chunk("fake", "a");
        let b = chunk("fake", "b");
        let (key_a, key_b) = (a.external_key().to_string(), b.external_key().to_string());

        store.put_one(&ctx, a.from(), a.through(), a).unwrap();
        store.put_one(&ctx, b.from(), b.through(), b).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.keys(), vec![key_a.clone(), key_b]);
        assert_eq!(store.get(&key_a).unwrap().labels().get("service_name"), Some("a"));
        assert!(store.total_bytes() > 0);
    }

    #[test]
    fn test_tenant_mismatch() {
        let store = MemoryStore::new();
        let c = chunk("other", "a");
        let result = store.put_one(&WriteContext::default(), c.from(), c.through(), c);
        assert!(matches!(result, Err(StoreError::TenantMismatch { .. })));
        assert!(store.is_empty());
    }
}
