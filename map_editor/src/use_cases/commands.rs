// Command execution against the client map state.

use crate::domain::{
    CommandPayload, CreateEntity, DeleteCustomEntity, DeleteEntity, EditorError, EntityInstance,
    EntityPrefab, MapCommand, ModifyCustomEntity, MoveEntity, PrefabRef, UploadCustomEntity,
    command::UndoState, validate_collision_grid,
};
use crate::use_cases::MapState;
use tracing::debug;

/// What a successful execution touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Entity instances affected by the command.
    pub touched_entities: usize,
    /// Collision grid generation after the command, if it rebuilt the grid.
    pub collision_generation: Option<u64>,
    /// Post-apply problems. The command stays applied.
    pub warnings: Vec<EditorError>,
}

impl MapCommand {
    /// Applies the payload to local state.
    ///
    /// Validation and target lookups happen before the first mutation, so a failed
    /// command leaves the state untouched. Executing the same command twice is
    /// refused; duplicate deliveries are filtered by the dispatcher before this.
    pub async fn execute(&mut self, state: &mut MapState) -> Result<ExecutionReport, EditorError> {
        if self.is_executed() {
            return Err(EditorError::apply(
                self.id().to_string(),
                "command already executed",
            ));
        }

        let payload = self.payload().clone();
        let (report, undo) = match &payload {
            CommandPayload::ModifyCustomEntity(p) => modify_custom_entity(p, state).await?,
            CommandPayload::UploadCustomEntity(p) => upload_custom_entity(p, state)?,
            CommandPayload::DeleteCustomEntity(p) => delete_custom_entity(p, state).await?,
            CommandPayload::CreateEntity(p) => create_entity(p, state).await?,
            CommandPayload::MoveEntity(p) => move_entity(p, state)?,
            CommandPayload::DeleteEntity(p) => delete_entity(p, state)?,
        };

        self.complete(undo);
        Ok(report)
    }

    // Shared completion step: records the inverse for the undo history.
    fn complete(&mut self, undo: UndoState) {
        self.undo = undo;
        debug!(command_id = %self.id(), kind = %self.kind(), "command completed");
    }
}

fn rebuild(state: &mut MapState, report: &mut ExecutionReport) {
    let recompute = state.recompute_entities_collision_grid();
    report.collision_generation = Some(state.collision.generation());
    report.warnings.extend(recompute.dangling);
}

async fn modify_custom_entity(
    payload: &ModifyCustomEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    payload.patch.validate()?;
    let key = PrefabRef::custom(payload.entity_id.clone());

    // Make sure the prefab is loaded before mutating anything.
    if state
        .registry
        .get_custom_prefab(&payload.entity_id)
        .await?
        .is_none()
    {
        return Err(EditorError::apply(key.to_string(), "custom entity not found"));
    }

    state.registry.modify_prefab(&payload.entity_id, &payload.patch)?;

    // Re-read the merged prefab from the registry rather than trusting any local copy.
    let prefab = state
        .registry
        .get_custom_prefab(&payload.entity_id)
        .await?
        .ok_or_else(|| EditorError::apply(key.to_string(), "custom entity vanished"))?;

    let mut report = ExecutionReport {
        touched_entities: state.entities.update_prefab(&prefab),
        ..Default::default()
    };

    if payload.patch.depth_offset.is_present() {
        let depth = payload.patch.depth_offset.as_set().copied().unwrap_or(0.0);
        state.entities.update_entities_depth(&key, depth);
    }

    // Any field may change occlusion or collision, so always rebuild.
    rebuild(state, &mut report);

    Ok((
        report,
        UndoState::Unsupported("modifying a custom entity cannot be undone"),
    ))
}

fn upload_custom_entity(
    payload: &UploadCustomEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    if let Some(grid) = &payload.collision_grid {
        validate_collision_grid(grid)?;
    }
    let key = PrefabRef::custom(payload.entity_id.clone());
    if state.registry.contains(&key) {
        return Err(EditorError::apply(key.to_string(), "custom entity already exists"));
    }

    state.registry.insert_local_prefab(EntityPrefab {
        collection: key.collection.clone(),
        id: key.id.clone(),
        name: payload.name.clone(),
        tags: payload.tags.clone(),
        depth_offset: payload.depth_offset,
        collision_grid: payload.collision_grid.clone(),
        image_path: payload.image_path.clone(),
        revision: 0,
    });

    Ok((
        ExecutionReport::default(),
        UndoState::Inverse(CommandPayload::DeleteCustomEntity(DeleteCustomEntity {
            entity_id: payload.entity_id.clone(),
        })),
    ))
}

async fn delete_custom_entity(
    payload: &DeleteCustomEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    let key = PrefabRef::custom(payload.entity_id.clone());
    if state
        .registry
        .get_custom_prefab(&payload.entity_id)
        .await?
        .is_none()
    {
        return Err(EditorError::apply(key.to_string(), "custom entity not found"));
    }

    state.registry.remove_prefab(&key);
    let removed = state.entities.remove_entities_of(&key);

    let mut report = ExecutionReport {
        touched_entities: removed.len(),
        ..Default::default()
    };
    rebuild(state, &mut report);

    Ok((
        report,
        UndoState::Unsupported("deleting a custom entity removes its placed instances"),
    ))
}

async fn create_entity(
    payload: &CreateEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    if state.entities.get(&payload.entity_id).is_some() {
        return Err(EditorError::apply(
            payload.entity_id.clone(),
            "entity already exists",
        ));
    }
    let prefab = state
        .registry
        .get_prefab(&payload.prefab.collection, &payload.prefab.id)
        .await?
        .ok_or_else(|| EditorError::apply(payload.prefab.to_string(), "prefab not found"))?;

    state.entities.add_entity(EntityInstance::new(
        payload.entity_id.clone(),
        &prefab,
        payload.x,
        payload.y,
    ))?;

    let mut report = ExecutionReport {
        touched_entities: 1,
        ..Default::default()
    };
    rebuild(state, &mut report);

    Ok((
        report,
        UndoState::Inverse(CommandPayload::DeleteEntity(DeleteEntity {
            entity_id: payload.entity_id.clone(),
        })),
    ))
}

fn move_entity(
    payload: &MoveEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    let (old_x, old_y) = state
        .entities
        .get(&payload.entity_id)
        .map(|e| e.position())
        .ok_or_else(|| EditorError::apply(payload.entity_id.clone(), "entity not found"))?;

    state
        .entities
        .move_entity(&payload.entity_id, payload.x, payload.y)?;

    let mut report = ExecutionReport {
        touched_entities: 1,
        ..Default::default()
    };
    rebuild(state, &mut report);

    Ok((
        report,
        UndoState::Inverse(CommandPayload::MoveEntity(MoveEntity {
            entity_id: payload.entity_id.clone(),
            x: old_x,
            y: old_y,
        })),
    ))
}

fn delete_entity(
    payload: &DeleteEntity,
    state: &mut MapState,
) -> Result<(ExecutionReport, UndoState), EditorError> {
    let removed = state
        .entities
        .remove_entity(&payload.entity_id)
        .ok_or_else(|| EditorError::apply(payload.entity_id.clone(), "entity not found"))?;

    let mut report = ExecutionReport {
        touched_entities: 1,
        ..Default::default()
    };
    rebuild(state, &mut report);

    let (x, y) = removed.position();
    Ok((
        report,
        UndoState::Inverse(CommandPayload::CreateEntity(CreateEntity {
            entity_id: payload.entity_id.clone(),
            prefab: removed.prefab().clone(),
            x,
            y,
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FieldUpdate, PrefabPatch};
    use crate::use_cases::test_support::{InMemoryCatalog, lamp_prefab};
    use std::sync::Arc;

    fn modify(entity_id: &str, patch: PrefabPatch) -> MapCommand {
        MapCommand::new(CommandPayload::ModifyCustomEntity(ModifyCustomEntity {
            entity_id: entity_id.to_string(),
            patch,
        }))
    }

    async fn lamp_scene(catalog: Arc<InMemoryCatalog>) -> MapState {
        let mut state = MapState::new(catalog, 16, 16);
        for (i, id) in ["E1", "E2", "E3"].iter().enumerate() {
            let mut create = MapCommand::new(CommandPayload::CreateEntity(CreateEntity {
                entity_id: id.to_string(),
                prefab: PrefabRef::custom("P1"),
                x: i as u32 * 2,
                y: 0,
            }));
            create.execute(&mut state).await.expect("lamp placed");
        }
        state
    }

    #[tokio::test]
    async fn when_modifying_depth_of_lamp_then_scenario_holds() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = lamp_scene(catalog).await;
        let generation_before = state.collision.generation();

        let mut command = modify(
            "P1",
            PrefabPatch {
                depth_offset: FieldUpdate::Set(5.0),
                ..Default::default()
            },
        );
        let report = command.execute(&mut state).await.expect("modify applies");

        let prefab = state
            .registry
            .cached(&PrefabRef::custom("P1"))
            .expect("prefab cached")
            .clone();
        assert_eq!(prefab.name, "Lamp");
        assert_eq!(prefab.tags, vec!["light".to_string()]);
        assert_eq!(prefab.depth_offset, Some(5.0));
        for entity in state.entities.get_entities() {
            assert_eq!(entity.depth(), 5.0);
            assert_eq!(entity.prefab_revision(), prefab.revision);
        }
        assert_eq!(report.touched_entities, 3);
        assert_eq!(state.collision.generation(), generation_before + 1);
    }

    #[tokio::test]
    async fn when_modify_omits_depth_then_instance_depth_is_kept() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = lamp_scene(catalog).await;

        let mut command = modify(
            "P1",
            PrefabPatch {
                collision_grid: FieldUpdate::Set(vec![vec![1, 1]]),
                ..Default::default()
            },
        );
        command.execute(&mut state).await.expect("modify applies");

        assert!(state.entities.get_entities().all(|e| e.depth() == 0.0));
        assert!(state.collision.is_blocked(1, 0));
    }

    #[tokio::test]
    async fn when_modify_clears_depth_then_instances_reset_to_zero() {
        let mut seeded = lamp_prefab("P1");
        seeded.depth_offset = Some(3.0);
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([seeded]));
        let mut state = lamp_scene(catalog).await;
        assert!(state.entities.get_entities().all(|e| e.depth() == 3.0));

        let mut command = modify(
            "P1",
            PrefabPatch {
                depth_offset: FieldUpdate::Clear,
                ..Default::default()
            },
        );
        command.execute(&mut state).await.expect("modify applies");

        assert!(state.entities.get_entities().all(|e| e.depth() == 0.0));
    }

    #[tokio::test]
    async fn when_modify_targets_unknown_prefab_then_nothing_changes() {
        let mut state = MapState::new(Arc::new(InMemoryCatalog::default()), 4, 4);

        let mut command = modify(
            "ghost",
            PrefabPatch {
                name: FieldUpdate::Set("Ghost".to_string()),
                ..Default::default()
            },
        );
        let result = command.execute(&mut state).await;

        assert!(matches!(result, Err(EditorError::Apply { .. })));
        assert!(state.registry.is_empty());
        assert_eq!(state.collision.generation(), 0);
        assert!(!command.is_executed());
    }

    #[tokio::test]
    async fn when_modify_has_ragged_grid_then_it_fails_before_fetching() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = MapState::new(catalog.clone(), 4, 4);

        let mut command = modify(
            "P1",
            PrefabPatch {
                collision_grid: FieldUpdate::Set(vec![vec![1], vec![]]),
                ..Default::default()
            },
        );
        let result = command.execute(&mut state).await;

        assert!(matches!(result, Err(EditorError::InvalidPayload(_))));
        assert_eq!(catalog.fetch_count(), 0);
    }

    #[tokio::test]
    async fn when_deleting_an_entity_then_undo_recreates_it_in_place() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = lamp_scene(catalog).await;

        let mut delete = MapCommand::new(CommandPayload::DeleteEntity(DeleteEntity {
            entity_id: "E2".to_string(),
        }));
        delete.execute(&mut state).await.expect("delete applies");
        assert!(state.entities.get("E2").is_none());

        let mut undo = delete.undo_command().expect("delete is invertible");
        undo.execute(&mut state).await.expect("undo applies");

        assert_eq!(state.entities.get("E2").map(|e| e.position()), Some((2, 0)));
    }

    #[tokio::test]
    async fn when_deleting_custom_entity_then_instances_go_and_undo_is_unsupported() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = lamp_scene(catalog).await;

        let mut delete = MapCommand::new(CommandPayload::DeleteCustomEntity(DeleteCustomEntity {
            entity_id: "P1".to_string(),
        }));
        let report = delete.execute(&mut state).await.expect("delete applies");

        assert_eq!(report.touched_entities, 3);
        assert!(state.entities.is_empty());
        assert_eq!(state.collision.blocked_count(), 0);
        assert!(matches!(
            delete.undo_command(),
            Err(EditorError::UnsupportedOperation(_))
        ));
    }

    #[tokio::test]
    async fn when_uploading_then_undo_deletes_the_custom_entity() {
        let mut state = MapState::new(Arc::new(InMemoryCatalog::default()), 4, 4);
        let mut upload = MapCommand::new(CommandPayload::UploadCustomEntity(UploadCustomEntity {
            entity_id: "P7".to_string(),
            name: "Chair".to_string(),
            tags: vec![],
            depth_offset: None,
            collision_grid: None,
            image_path: "chair.png".to_string(),
        }));

        upload.execute(&mut state).await.expect("upload applies");
        let mut undo = upload.undo_command().expect("upload is invertible");
        undo.execute(&mut state).await.expect("undo applies");

        assert!(!state.registry.contains(&PrefabRef::custom("P7")));
    }

    #[tokio::test]
    async fn when_executing_twice_then_second_run_is_refused() {
        let catalog = Arc::new(InMemoryCatalog::with_prefabs([lamp_prefab("P1")]));
        let mut state = lamp_scene(catalog).await;
        let mut command = MapCommand::new(CommandPayload::MoveEntity(MoveEntity {
            entity_id: "E1".to_string(),
            x: 9,
            y: 9,
        }));

        command.execute(&mut state).await.expect("move applies");
        let second = command.execute(&mut state).await;

        assert!(matches!(second, Err(EditorError::Apply { .. })));
        assert_eq!(state.entities.get("E1").map(|e| e.position()), Some((9, 9)));
    }
}
