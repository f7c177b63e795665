// Prefab registry: owned prefab table with a catalog fallback for misses.

use crate::domain::{
    CUSTOM_ENTITIES_COLLECTION, EditorError, EntityPrefab, PrefabCatalog, PrefabPatch, PrefabRef,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Single owner of every prefab known to this client.
///
/// Writes are local and synchronous; reads may suspend on a catalog fetch when the
/// prefab is not cached yet. A write is visible to the next read on this client.
pub struct PrefabRegistry {
    catalog: Arc<dyn PrefabCatalog>,
    prefabs: HashMap<PrefabRef, EntityPrefab>,
    // Entries written on this client; never dropped by a retry.
    local_writes: HashSet<PrefabRef>,
    next_revision: u64,
}

impl PrefabRegistry {
    pub fn new(catalog: Arc<dyn PrefabCatalog>) -> Self {
        Self {
            catalog,
            prefabs: HashMap::new(),
            local_writes: HashSet::new(),
            next_revision: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.prefabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefabs.is_empty()
    }

    pub fn contains(&self, key: &PrefabRef) -> bool {
        self.prefabs.contains_key(key)
    }

    /// Cached prefab, without touching the catalog.
    pub fn cached(&self, key: &PrefabRef) -> Option<&EntityPrefab> {
        self.prefabs.get(key)
    }

    pub fn prefabs(&self) -> impl Iterator<Item = &EntityPrefab> {
        self.prefabs.values()
    }

    /// Stores a prefab under a new revision, replacing any previous copy.
    pub fn insert_prefab(&mut self, mut prefab: EntityPrefab) -> &EntityPrefab {
        prefab.revision = self.bump_revision();
        let key = prefab.key();
        self.prefabs.insert(key.clone(), prefab);
        &self.prefabs[&key]
    }

    /// Stores a prefab created on this client, such as an upload.
    pub fn insert_local_prefab(&mut self, prefab: EntityPrefab) -> &EntityPrefab {
        self.local_writes.insert(prefab.key());
        self.insert_prefab(prefab)
    }

    /// True when the cached copy carries writes made on this client.
    pub fn has_local_writes(&self, key: &PrefabRef) -> bool {
        self.local_writes.contains(key)
    }

    /// Applies a partial update to a custom prefab.
    pub fn modify_prefab(
        &mut self,
        id: &str,
        patch: &PrefabPatch,
    ) -> Result<&EntityPrefab, EditorError> {
        let key = PrefabRef::custom(id);
        let revision = self.next_revision;
        let prefab = self
            .prefabs
            .get_mut(&key)
            .ok_or_else(|| EditorError::apply(key.to_string(), "prefab not loaded"))?;

        patch.apply(prefab);
        prefab.revision = revision;
        self.next_revision += 1;
        self.local_writes.insert(key.clone());
        debug!(prefab = %key, revision, "prefab modified");
        Ok(prefab)
    }

    /// Returns the prefab, fetching it from the catalog on a cache miss.
    pub async fn get_prefab(
        &mut self,
        collection: &str,
        id: &str,
    ) -> Result<Option<EntityPrefab>, EditorError> {
        let key = PrefabRef::new(collection, id);
        if let Some(prefab) = self.prefabs.get(&key) {
            return Ok(Some(prefab.clone()));
        }

        let fetched = self.catalog.fetch_prefab(&key).await.map_err(|e| {
            warn!(prefab = %key, error = %e, "prefab fetch failed");
            EditorError::apply(key.to_string(), format!("catalog unavailable: {e}"))
        })?;

        match fetched {
            Some(prefab) if prefab.matches(&key) => {
                debug!(prefab = %key, "prefab fetched from catalog");
                Ok(Some(self.insert_prefab(prefab).clone()))
            }
            Some(prefab) => Err(EditorError::apply(
                key.to_string(),
                format!("catalog answered with {}", prefab.key()),
            )),
            None => Ok(None),
        }
    }

    pub async fn get_custom_prefab(&mut self, id: &str) -> Result<Option<EntityPrefab>, EditorError> {
        self.get_prefab(CUSTOM_ENTITIES_COLLECTION, id).await
    }

    pub fn remove_prefab(&mut self, key: &PrefabRef) -> Option<EntityPrefab> {
        self.local_writes.remove(key);
        self.prefabs.remove(key)
    }

    /// Drops the cached copy so the next read refetches it.
    pub fn invalidate(&mut self, key: &PrefabRef) -> bool {
        self.local_writes.remove(key);
        let removed = self.prefabs.remove(key).is_some();
        if removed {
            debug!(prefab = %key, "prefab cache entry invalidated");
        }
        removed
    }

    /// Drops a cached catalog copy. Entries with local writes are kept.
    pub fn invalidate_fetched(&mut self, key: &PrefabRef) -> bool {
        if self.local_writes.contains(key) {
            debug!(prefab = %key, "prefab has local writes; cache entry kept");
            return false;
        }
        self.invalidate(key)
    }

    fn bump_revision(&mut self) -> u64 {
        let revision = self.next_revision;
        self.next_revision += 1;
        revision
    }
}
