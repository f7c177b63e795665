use async_trait::async_trait;

use crate::domain::{CatalogError, EditorError, EntityPrefab, MapCommand, PrefabRef};

// Port for the remote prefab catalog backing the registry.
// The registry depends on this trait, not the concrete HTTP client.
#[async_trait]
pub trait PrefabCatalog: Send + Sync {
    async fn fetch_prefab(&self, key: &PrefabRef) -> Result<Option<EntityPrefab>, CatalogError>;
}

// Port for the connection to the authority. Sending is fire-and-forget: success
// only means the command was handed to the transport, not that it was sequenced.
pub trait MapConnection: Send + Sync {
    fn emit_map_editor_command(&self, command: &MapCommand) -> Result<(), EditorError>;
}
