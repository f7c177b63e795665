// Placed entity instances.

use crate::domain::{EntityPrefab, PrefabRef};

/// A placed occurrence of a prefab on the map.
///
/// Holds the prefab key rather than the prefab, plus the prefab revision it last
/// observed. Setters are crate-private: only the entities manager mutates instances.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityInstance {
    id: String,
    prefab: PrefabRef,
    x: u32,
    y: u32,
    depth: f64,
    prefab_revision: u64,
}

impl EntityInstance {
    pub fn new(id: impl Into<String>, prefab: &EntityPrefab, x: u32, y: u32) -> Self {
        Self {
            id: id.into(),
            prefab: prefab.key(),
            x,
            y,
            depth: prefab.effective_depth(),
            prefab_revision: prefab.revision,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn prefab(&self) -> &PrefabRef {
        &self.prefab
    }

    pub fn position(&self) -> (u32, u32) {
        (self.x, self.y)
    }

    /// Effective rendering depth of this instance.
    pub fn depth(&self) -> f64 {
        self.depth
    }

    pub fn prefab_revision(&self) -> u64 {
        self.prefab_revision
    }

    pub fn references(&self, key: &PrefabRef) -> bool {
        &self.prefab == key
    }

    pub fn is_stale(&self, prefab: &EntityPrefab) -> bool {
        self.prefab_revision != prefab.revision
    }

    pub(crate) fn update_prefab(&mut self, prefab: &EntityPrefab) {
        self.prefab_revision = prefab.revision;
    }

    pub(crate) fn set_depth(&mut self, depth: f64) {
        self.depth = depth;
    }

    pub(crate) fn set_position(&mut self, x: u32, y: u32) {
        self.x = x;
        self.y = y;
    }
}
