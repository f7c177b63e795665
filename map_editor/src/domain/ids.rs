// Identifiers shared by commands, prefabs and placed entities.

use std::fmt;
use uuid::Uuid;

/// Collection holding prefabs that users upload and edit from the map editor.
pub const CUSTOM_ENTITIES_COLLECTION: &str = "custom entities";

/// Globally unique command identity, stable across network hops.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(String);

impl CommandId {
    /// Generates a fresh random identity for a locally created command.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CommandId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for CommandId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup key of a prefab in the registry.
///
/// Entity instances hold this key instead of the prefab itself, so replacing a
/// prefab only changes what the key resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PrefabRef {
    pub collection: String,
    pub id: String,
}

impl PrefabRef {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn custom(id: impl Into<String>) -> Self {
        Self::new(CUSTOM_ENTITIES_COLLECTION, id)
    }
}

impl fmt::Display for PrefabRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}
