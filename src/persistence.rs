use async_trait::async_trait;
use dashmap::DashMap;

/// Storage capability for a keyed registry (saved queries, dashboards,
/// trace shares, ...). The default implementation is an in-memory map
/// behind a reader/writer guard (`DashMap` gives us that per-shard without
/// a single global lock); a persistent backend slots in later without
/// touching the callers.
#[async_trait]
pub trait Persistence<T: Clone + Send + Sync>: Send + Sync {
    async fn save(&self, id: String, value: T);
    async fn load(&self, id: &str) -> Option<T>;
    async fn load_all(&self) -> Vec<T>;
    async fn delete(&self, id: &str) -> bool;
}

pub struct InMemoryStore<T> {
    map: DashMap<String, T>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self { map: DashMap::new() }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> Persistence<T> for InMemoryStore<T> {
    async fn save(&self, id: String, value: T) {
        self.map.insert(id, value);
    }

    async fn load(&self, id: &str) -> Option<T> {
        self.map.get(id).map(|r| r.value().clone())
    }

    async fn load_all(&self) -> Vec<T> {
        self.map.iter().map(|r| r.value().clone()).collect()
    }

    async fn delete(&self, id: &str) -> bool {
        self.map.remove(id).is_some()
    }
}
