// Domain layer: map editing types, rules and ports.

pub mod collision;
pub mod command;
pub mod entity;
pub mod errors;
pub mod field_update;
pub mod ids;
pub mod ports;
pub mod prefab;

pub use collision::{CollisionGrid, Footprint};
pub use command::{
    CommandKind, CommandPayload, CreateEntity, DeleteCustomEntity, DeleteEntity, MapCommand,
    ModifyCustomEntity, MoveEntity, UploadCustomEntity,
};
pub use entity::EntityInstance;
pub use errors::{CatalogError, EditorError};
pub use field_update::FieldUpdate;
pub use ids::{CUSTOM_ENTITIES_COLLECTION, CommandId, PrefabRef};
pub use ports::{MapConnection, PrefabCatalog};
pub use prefab::{EntityPrefab, PrefabPatch, validate_collision_grid};
