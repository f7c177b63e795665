// Entities manager: owns the live set of placed instances.

use crate::domain::{EditorError, EntityInstance, EntityPrefab, PrefabRef};

/// Placed instances in insertion order.
///
/// None of the update operations recompute collisions; callers trigger that once
/// after all their changes.
#[derive(Debug, Default)]
pub struct EntitiesManager {
    entities: Vec<EntityInstance>,
}

impl EntitiesManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Live view of every instance, in insertion order.
    pub fn get_entities(&self) -> impl Iterator<Item = &EntityInstance> {
        self.entities.iter()
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityInstance> {
        self.entities.iter().find(|e| e.id() == entity_id)
    }

    pub fn add_entity(&mut self, entity: EntityInstance) -> Result<(), EditorError> {
        if self.get(entity.id()).is_some() {
            return Err(EditorError::apply(entity.id(), "entity already exists"));
        }
        self.entities.push(entity);
        Ok(())
    }

    pub fn remove_entity(&mut self, entity_id: &str) -> Option<EntityInstance> {
        let index = self.entities.iter().position(|e| e.id() == entity_id)?;
        Some(self.entities.remove(index))
    }

    /// Removes every instance of a prefab, returning them in insertion order.
    pub fn remove_entities_of(&mut self, key: &PrefabRef) -> Vec<EntityInstance> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entities)
            .into_iter()
            .partition(|e| e.references(key));
        self.entities = kept;
        removed
    }

    pub fn move_entity(&mut self, entity_id: &str, x: u32, y: u32) -> Result<(), EditorError> {
        let entity = self
            .entities
            .iter_mut()
            .find(|e| e.id() == entity_id)
            .ok_or_else(|| EditorError::apply(entity_id, "entity not found"))?;
        entity.set_position(x, y);
        Ok(())
    }

    /// Points every instance of the prefab at its refreshed revision.
    pub fn update_prefab(&mut self, prefab: &EntityPrefab) -> usize {
        let key = prefab.key();
        let mut updated = 0;
        for entity in self.entities.iter_mut().filter(|e| e.references(&key)) {
            entity.update_prefab(prefab);
            updated += 1;
        }
        updated
    }

    /// Sets the effective depth of every instance of the prefab.
    pub fn update_entities_depth(&mut self, key: &PrefabRef, depth: f64) -> usize {
        let mut updated = 0;
        for entity in self.entities.iter_mut().filter(|e| e.references(key)) {
            entity.set_depth(depth);
            updated += 1;
        }
        updated
    }

    pub(crate) fn get_mut(&mut self, entity_id: &str) -> Option<&mut EntityInstance> {
        self.entities.iter_mut().find(|e| e.id() == entity_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::lamp_prefab;

    fn manager_with(ids: &[&str], prefab: &EntityPrefab) -> EntitiesManager {
        let mut manager = EntitiesManager::new();
        for (i, id) in ids.iter().enumerate() {
            manager
                .add_entity(EntityInstance::new(*id, prefab, i as u32, 0))
                .expect("unique id");
        }
        manager
    }

    #[test]
    fn when_iterating_then_insertion_order_is_kept() {
        let lamp = lamp_prefab("P1");
        let manager = manager_with(&["E3", "E1", "E2"], &lamp);

        let ids: Vec<&str> = manager.get_entities().map(|e| e.id()).collect();

        assert_eq!(ids, vec!["E3", "E1", "E2"]);
    }

    #[test]
    fn when_adding_a_duplicate_id_then_returns_apply_error() {
        let lamp = lamp_prefab("P1");
        let mut manager = manager_with(&["E1"], &lamp);

        let result = manager.add_entity(EntityInstance::new("E1", &lamp, 0, 0));

        assert!(matches!(result, Err(EditorError::Apply { .. })));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn when_updating_depth_then_only_instances_of_that_prefab_change() {
        let lamp = lamp_prefab("P1");
        let chair = lamp_prefab("P2");
        let mut manager = manager_with(&["E1", "E2"], &lamp);
        manager
            .add_entity(EntityInstance::new("C1", &chair, 0, 0))
            .expect("unique id");

        let updated = manager.update_entities_depth(&lamp.key(), 5.0);

        assert_eq!(updated, 2);
        assert_eq!(manager.get("E1").map(|e| e.depth()), Some(5.0));
        assert_eq!(manager.get("C1").map(|e| e.depth()), Some(0.0));
    }

    #[test]
    fn when_removing_entities_of_a_prefab_then_others_keep_their_order() {
        let lamp = lamp_prefab("P1");
        let chair = lamp_prefab("P2");
        let mut manager = EntitiesManager::new();
        for (id, prefab) in [("A", &chair), ("B", &lamp), ("C", &chair), ("D", &lamp)] {
            manager
                .add_entity(EntityInstance::new(id, prefab, 0, 0))
                .expect("unique id");
        }

        let removed = manager.remove_entities_of(&lamp.key());

        assert_eq!(removed.len(), 2);
        let ids: Vec<&str> = manager.get_entities().map(|e| e.id()).collect();
        assert_eq!(ids, vec!["A", "C"]);
    }
}
