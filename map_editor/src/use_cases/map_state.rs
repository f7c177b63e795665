// Client-side map state owned by the editor task.

use crate::domain::{
    CollisionGrid, EditorError, EntityInstance, EntityPrefab, Footprint, PrefabCatalog,
};
use crate::use_cases::{EntitiesManager, PrefabRegistry};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registry, placed entities and the collision grid derived from them.
pub struct MapState {
    pub registry: PrefabRegistry,
    pub entities: EntitiesManager,
    pub collision: CollisionGrid,
}

/// Outcome of a collision rebuild.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecomputeReport {
    /// Instances whose prefab revision lagged and was refreshed first.
    pub refreshed: usize,
    /// Instances skipped because their prefab is gone.
    pub dangling: Vec<EditorError>,
}

/// Read model handed to renderers and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub prefabs: Vec<EntityPrefab>,
    pub entities: Vec<EntityInstance>,
    pub collision_generation: u64,
    pub blocked_cells: usize,
}

impl MapState {
    pub fn new(catalog: Arc<dyn PrefabCatalog>, width: u32, height: u32) -> Self {
        Self {
            registry: PrefabRegistry::new(catalog),
            entities: EntitiesManager::new(),
            collision: CollisionGrid::new(width, height),
        }
    }

    /// Rebuilds the collision grid from every placed entity.
    ///
    /// Stale instance references are refreshed instead of failing. Instances whose
    /// prefab is no longer in the registry are left out and reported.
    pub fn recompute_entities_collision_grid(&mut self) -> RecomputeReport {
        let mut report = RecomputeReport::default();

        let mut stale = Vec::new();
        for entity in self.entities.get_entities() {
            match self.registry.cached(entity.prefab()) {
                Some(prefab) if entity.is_stale(prefab) => stale.push(entity.id().to_string()),
                Some(_) => {}
                None => report.dangling.push(EditorError::StaleReference {
                    entity_id: entity.id().to_string(),
                    prefab: entity.prefab().clone(),
                }),
            }
        }
        for entity_id in stale {
            if let Some(entity) = self.entities.get_mut(&entity_id) {
                if let Some(prefab) = self.registry.cached(entity.prefab()) {
                    entity.update_prefab(prefab);
                    report.refreshed += 1;
                }
            }
        }

        let registry = &self.registry;
        let footprints = self.entities.get_entities().filter_map(|entity| {
            let cells = registry.cached(entity.prefab())?.collision_grid.as_deref()?;
            let (x, y) = entity.position();
            Some(Footprint { x, y, cells })
        });
        self.collision.rebuild(footprints);

        if report.refreshed > 0 {
            debug!(refreshed = report.refreshed, "refreshed stale entity references");
        }
        for dangling in &report.dangling {
            warn!(error = %dangling, "entity skipped during collision rebuild");
        }
        debug!(
            generation = self.collision.generation(),
            blocked = self.collision.blocked_count(),
            "collision grid rebuilt"
        );
        report
    }

    pub fn snapshot(&self) -> MapSnapshot {
        let mut prefabs: Vec<EntityPrefab> = self.registry.prefabs().cloned().collect();
        prefabs.sort_by(|a, b| a.key().cmp(&b.key()));
        MapSnapshot {
            prefabs,
            entities: self.entities.get_entities().cloned().collect(),
            collision_generation: self.collision.generation(),
            blocked_cells: self.collision.blocked_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldUpdate, PrefabPatch, PrefabRef};
    use crate::use_cases::test_support::{InMemoryCatalog, lamp_prefab};

    fn state() -> MapState {
        MapState::new(Arc::new(InMemoryCatalog::default()), 8, 8)
    }

    #[test]
    fn when_instance_revision_lags_then_rebuild_refreshes_it() {
        let mut state = state();
        let lamp = state.registry.insert_prefab(lamp_prefab("P1")).clone();
        state
            .entities
            .add_entity(EntityInstance::new("E1", &lamp, 2, 2))
            .expect("unique id");
        state
            .registry
            .modify_prefab(
                "P1",
                &PrefabPatch {
                    tags: FieldUpdate::Set(vec!["dim".to_string()]),
                    ..Default::default()
                },
            )
            .expect("prefab is loaded");

        let report = state.recompute_entities_collision_grid();

        let current = state
            .registry
            .cached(&PrefabRef::custom("P1"))
            .map(|p| p.revision);
        assert_eq!(report.refreshed, 1);
        assert_eq!(
            state.entities.get("E1").map(|e| e.prefab_revision()),
            current
        );
        assert!(state.collision.is_blocked(2, 2));
    }

    #[test]
    fn when_prefab_is_gone_then_instance_is_skipped_and_reported() {
        let mut state = state();
        let lamp = state.registry.insert_prefab(lamp_prefab("P1")).clone();
        state
            .entities
            .add_entity(EntityInstance::new("E1", &lamp, 1, 1))
            .expect("unique id");
        state.registry.remove_prefab(&lamp.key());

        let report = state.recompute_entities_collision_grid();

        assert!(matches!(
            report.dangling.as_slice(),
            [EditorError::StaleReference { entity_id, .. }] if entity_id == "E1"
        ));
        assert!(!state.collision.is_blocked(1, 1));
        assert_eq!(state.collision.generation(), 1);
    }
}
