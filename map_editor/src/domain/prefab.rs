// Prefab templates and the partial update applied to them.

use crate::domain::{EditorError, FieldUpdate, PrefabRef};

/// Template shared by every placed instance of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPrefab {
    pub collection: String,
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub depth_offset: Option<f64>,
    /// Footprint rows; a non-zero cell blocks movement.
    pub collision_grid: Option<Vec<Vec<i64>>>,
    pub image_path: String,
    /// Assigned by the registry on every write.
    pub revision: u64,
}

impl EntityPrefab {
    pub fn key(&self) -> PrefabRef {
        PrefabRef::new(self.collection.clone(), self.id.clone())
    }

    pub fn matches(&self, key: &PrefabRef) -> bool {
        self.collection == key.collection && self.id == key.id
    }

    pub fn effective_depth(&self) -> f64 {
        self.depth_offset.unwrap_or(0.0)
    }
}

/// Partial update of a custom prefab. Unchanged fields keep their value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PrefabPatch {
    pub name: FieldUpdate<String>,
    pub tags: FieldUpdate<Vec<String>>,
    pub depth_offset: FieldUpdate<f64>,
    pub collision_grid: FieldUpdate<Vec<Vec<i64>>>,
}

impl PrefabPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_unchanged()
            && self.tags.is_unchanged()
            && self.depth_offset.is_unchanged()
            && self.collision_grid.is_unchanged()
    }

    pub fn validate(&self) -> Result<(), EditorError> {
        if let Some(depth) = self.depth_offset.as_set() {
            if !depth.is_finite() {
                return Err(EditorError::InvalidPayload(
                    "depth offset must be finite".to_string(),
                ));
            }
        }
        if let Some(grid) = self.collision_grid.as_set() {
            validate_collision_grid(grid)?;
        }
        Ok(())
    }

    pub fn apply(&self, prefab: &mut EntityPrefab) {
        self.name.apply_or_default(&mut prefab.name);
        self.tags.apply_or_default(&mut prefab.tags);
        self.depth_offset.apply_to(&mut prefab.depth_offset);
        self.collision_grid.apply_to(&mut prefab.collision_grid);
    }
}

/// Rows must all share the same width.
pub fn validate_collision_grid(grid: &[Vec<i64>]) -> Result<(), EditorError> {
    let Some(first) = grid.first() else {
        return Ok(());
    };
    if grid.iter().any(|row| row.len() != first.len()) {
        return Err(EditorError::InvalidPayload(
            "collision grid rows must have equal length".to_string(),
        ));
    }
    Ok(())
}
