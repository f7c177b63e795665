// Map mutation commands: identity, immutable payload, undo linkage.
//
// The set of command kinds is closed. Each kind is one `CommandPayload` variant and
// every per-kind behaviour (apply, undo, wire encoding) is a `match` over it.

use crate::domain::{CommandId, EditorError, PrefabPatch, PrefabRef};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    ModifyCustomEntity,
    UploadCustomEntity,
    DeleteCustomEntity,
    CreateEntity,
    MoveEntity,
    DeleteEntity,
}

impl CommandKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::ModifyCustomEntity => "modify_custom_entity",
            CommandKind::UploadCustomEntity => "upload_custom_entity",
            CommandKind::DeleteCustomEntity => "delete_custom_entity",
            CommandKind::CreateEntity => "create_entity",
            CommandKind::MoveEntity => "move_entity",
            CommandKind::DeleteEntity => "delete_entity",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModifyCustomEntity {
    /// Id of the custom prefab being edited.
    pub entity_id: String,
    pub patch: PrefabPatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadCustomEntity {
    pub entity_id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub depth_offset: Option<f64>,
    pub collision_grid: Option<Vec<Vec<i64>>>,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteCustomEntity {
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateEntity {
    pub entity_id: String,
    pub prefab: PrefabRef,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoveEntity {
    pub entity_id: String,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteEntity {
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandPayload {
    ModifyCustomEntity(ModifyCustomEntity),
    UploadCustomEntity(UploadCustomEntity),
    DeleteCustomEntity(DeleteCustomEntity),
    CreateEntity(CreateEntity),
    MoveEntity(MoveEntity),
    DeleteEntity(DeleteEntity),
}

impl CommandPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            CommandPayload::ModifyCustomEntity(_) => CommandKind::ModifyCustomEntity,
            CommandPayload::UploadCustomEntity(_) => CommandKind::UploadCustomEntity,
            CommandPayload::DeleteCustomEntity(_) => CommandKind::DeleteCustomEntity,
            CommandPayload::CreateEntity(_) => CommandKind::CreateEntity,
            CommandPayload::MoveEntity(_) => CommandKind::MoveEntity,
            CommandPayload::DeleteEntity(_) => CommandKind::DeleteEntity,
        }
    }

    /// Id of the prefab or instance this payload targets.
    pub fn target_id(&self) -> &str {
        match self {
            CommandPayload::ModifyCustomEntity(p) => &p.entity_id,
            CommandPayload::UploadCustomEntity(p) => &p.entity_id,
            CommandPayload::DeleteCustomEntity(p) => &p.entity_id,
            CommandPayload::CreateEntity(p) => &p.entity_id,
            CommandPayload::MoveEntity(p) => &p.entity_id,
            CommandPayload::DeleteEntity(p) => &p.entity_id,
        }
    }

    /// Prefab whose cached copy should be dropped before retrying a failed apply.
    pub fn prefab_target(&self) -> Option<PrefabRef> {
        match self {
            CommandPayload::ModifyCustomEntity(p) => Some(PrefabRef::custom(p.entity_id.clone())),
            CommandPayload::DeleteCustomEntity(p) => Some(PrefabRef::custom(p.entity_id.clone())),
            CommandPayload::CreateEntity(p) => Some(p.prefab.clone()),
            CommandPayload::UploadCustomEntity(_)
            | CommandPayload::MoveEntity(_)
            | CommandPayload::DeleteEntity(_) => None,
        }
    }
}

/// Inverse information captured while a command executes.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum UndoState {
    NotExecuted,
    Inverse(CommandPayload),
    Unsupported(&'static str),
}

/// An identifiable, executable map mutation.
///
/// The payload is shared and never mutated after construction; cloning a command
/// keeps its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MapCommand {
    id: CommandId,
    payload: Arc<CommandPayload>,
    pub(crate) undo: UndoState,
}

impl MapCommand {
    /// Creates a command with a fresh identity.
    pub fn new(payload: CommandPayload) -> Self {
        Self::with_id(CommandId::generate(), payload)
    }

    /// Rebuilds a command received from the network with its original identity.
    pub fn with_id(id: CommandId, payload: CommandPayload) -> Self {
        Self {
            id,
            payload: Arc::new(payload),
            undo: UndoState::NotExecuted,
        }
    }

    pub fn id(&self) -> &CommandId {
        &self.id
    }

    pub fn payload(&self) -> &CommandPayload {
        &self.payload
    }

    pub fn kind(&self) -> CommandKind {
        self.payload.kind()
    }

    pub fn is_executed(&self) -> bool {
        !matches!(self.undo, UndoState::NotExecuted)
    }

    /// Same payload under a new identity, used when redoing.
    pub fn reissue(&self) -> Self {
        Self {
            id: CommandId::generate(),
            payload: Arc::clone(&self.payload),
            undo: UndoState::NotExecuted,
        }
    }

    /// Produces the inverse command with a fresh identity.
    pub fn undo_command(&self) -> Result<MapCommand, EditorError> {
        if let CommandPayload::ModifyCustomEntity(_) = self.payload.as_ref() {
            // Prior prefab state is not retained.
            return Err(EditorError::UnsupportedOperation(
                "modifying a custom entity cannot be undone".to_string(),
            ));
        }
        match &self.undo {
            UndoState::Inverse(payload) => Ok(MapCommand::new(payload.clone())),
            UndoState::Unsupported(reason) => {
                Err(EditorError::UnsupportedOperation((*reason).to_string()))
            }
            UndoState::NotExecuted => Err(EditorError::UnsupportedOperation(
                "command has not been executed".to_string(),
            )),
        }
    }
}
