// src/store/memory.rs
//! In-process store for tests and throwaway runs

use crate::store::{summarize, WorldStore, WorldSummary};
use crate::utils::errors::{EngineError, Result};
use crate::world::ids::WorldId;
use crate::world::state::WorldState;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryWorldStore {
    worlds: RwLock<HashMap<WorldId, WorldState>>,
    saves: AtomicU64,
    offline: AtomicBool,
}

impl MemoryWorldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::Relaxed)
    }

    /// Simulate the store becoming unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            Err(EngineError::StorageFailed("store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorldStore for MemoryWorldStore {
    async fn load_world(&self, id: &WorldId) -> Result<Option<WorldState>> {
        self.check_online()?;
        Ok(self.worlds.read().get(id).cloned())
    }

    async fn save_world(&self, world: &WorldState) -> Result<()> {
        self.check_online()?;
        self.worlds.write().insert(world.id().clone(), world.clone());
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn list_worlds(&self) -> Result<Vec<WorldSummary>> {
        self.check_online()?;
        let mut worlds: Vec<WorldSummary> = self.worlds.read().values().map(summarize).collect();
        worlds.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(worlds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testing::office_world;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryWorldStore::new();
        let world = office_world();

        assert!(store.load_world(world.id()).await.unwrap().is_none());
        store.save_world(&world).await.unwrap();

        let loaded = store.load_world(world.id()).await.unwrap().unwrap();
        assert_eq!(loaded.snapshot(), world.snapshot());
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.list_worlds().await.unwrap()[0].status, "active");
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryWorldStore::new();
        store.set_offline(true);

        let err = store.save_world(&office_world()).await.unwrap_err();
        assert!(err.is_universe_fatal());
    }
}
