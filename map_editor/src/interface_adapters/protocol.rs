// Wire protocol DTOs shared by the editor client and the map authority.
// Field names are camelCase on the wire; optional modify fields keep absent vs null apart.

use crate::domain::{
    CommandId, CommandPayload, CreateEntity, DeleteCustomEntity, DeleteEntity, EditorError,
    FieldUpdate, MapCommand, ModifyCustomEntity, MoveEntity, PrefabPatch, PrefabRef,
    UploadCustomEntity,
};
use serde::{Deserialize, Serialize};

const MAX_ID_LEN: usize = 128;

/// Messages a client sends to the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Must be the first message on a connection.
    Join(JoinPayload),
    MapEditorCommand(CommandMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    pub room_id: String,
    // Highest seq the client has applied; the authority replays everything after it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seq: Option<u64>,
}

/// Messages the authority sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Welcome {
        client_id: String,
        head_seq: u64,
        // Older commands than the first replayed one were evicted from the log.
        replay_truncated: bool,
    },
    MapEditorCommand(SequencedCommand),
    // Answer to a resubmitted command that was already sequenced.
    #[serde(rename_all = "camelCase")]
    CommandAcknowledged { command_id: String, seq: u64 },
    #[serde(rename_all = "camelCase")]
    CommandRejected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command_id: Option<String>,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedCommand {
    pub seq: u64,
    pub command: CommandMessage,
}

/// One map editor command on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum CommandMessage {
    ModifyCustomEntity(ModifyCustomEntityDto),
    UploadCustomEntity(UploadCustomEntityDto),
    DeleteCustomEntity(DeleteByIdDto),
    CreateEntity(CreateEntityDto),
    MoveEntity(MoveEntityDto),
    DeleteEntity(DeleteByIdDto),
}

impl CommandMessage {
    pub fn command_id(&self) -> &str {
        match self {
            CommandMessage::ModifyCustomEntity(p) => &p.command_id,
            CommandMessage::UploadCustomEntity(p) => &p.command_id,
            CommandMessage::CreateEntity(p) => &p.command_id,
            CommandMessage::MoveEntity(p) => &p.command_id,
            CommandMessage::DeleteCustomEntity(p) | CommandMessage::DeleteEntity(p) => {
                &p.command_id
            }
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CommandMessage::ModifyCustomEntity(_) => "ModifyCustomEntity",
            CommandMessage::UploadCustomEntity(_) => "UploadCustomEntity",
            CommandMessage::DeleteCustomEntity(_) => "DeleteCustomEntity",
            CommandMessage::CreateEntity(_) => "CreateEntity",
            CommandMessage::MoveEntity(_) => "MoveEntity",
            CommandMessage::DeleteEntity(_) => "DeleteEntity",
        }
    }

    /// Checks the identifiers the authority relies on, without touching map semantics.
    pub fn validate(&self) -> Result<(), EditorError> {
        check_id("commandId", self.command_id())?;
        match self {
            CommandMessage::ModifyCustomEntity(p) => check_id("entityId", &p.entity_id),
            CommandMessage::UploadCustomEntity(p) => check_id("entityId", &p.entity_id),
            CommandMessage::CreateEntity(p) => {
                check_id("entityId", &p.entity_id)?;
                check_id("collection", &p.collection)?;
                check_id("prefabId", &p.prefab_id)
            }
            CommandMessage::MoveEntity(p) => check_id("entityId", &p.entity_id),
            CommandMessage::DeleteCustomEntity(p) | CommandMessage::DeleteEntity(p) => {
                check_id("entityId", &p.entity_id)
            }
        }
    }
}

fn check_id(field: &str, value: &str) -> Result<(), EditorError> {
    if value.trim().is_empty() {
        return Err(EditorError::InvalidPayload(format!("{field} is empty")));
    }
    if value.len() > MAX_ID_LEN {
        return Err(EditorError::InvalidPayload(format!(
            "{field} exceeds {MAX_ID_LEN} bytes"
        )));
    }
    Ok(())
}

/// `{ commandId, entityId, name?, tags?, depthOffset?, collisionGrid? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyCustomEntityDto {
    pub command_id: String,
    pub entity_id: String,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub name: FieldUpdate<String>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub tags: FieldUpdate<Vec<String>>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub depth_offset: FieldUpdate<f64>,
    #[serde(default, skip_serializing_if = "FieldUpdate::is_unchanged")]
    pub collision_grid: FieldUpdate<Vec<Vec<i64>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCustomEntityDto {
    pub command_id: String,
    pub entity_id: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collision_grid: Option<Vec<Vec<i64>>>,
    pub image_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteByIdDto {
    pub command_id: String,
    pub entity_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntityDto {
    pub command_id: String,
    pub entity_id: String,
    pub collection: String,
    pub prefab_id: String,
    pub x: u32,
    pub y: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEntityDto {
    pub command_id: String,
    pub entity_id: String,
    pub x: u32,
    pub y: u32,
}

impl From<&MapCommand> for CommandMessage {
    fn from(command: &MapCommand) -> Self {
        let command_id = command.id().to_string();
        match command.payload() {
            CommandPayload::ModifyCustomEntity(p) => {
                CommandMessage::ModifyCustomEntity(ModifyCustomEntityDto {
                    command_id,
                    entity_id: p.entity_id.clone(),
                    name: p.patch.name.clone(),
                    tags: p.patch.tags.clone(),
                    depth_offset: p.patch.depth_offset.clone(),
                    collision_grid: p.patch.collision_grid.clone(),
                })
            }
            CommandPayload::UploadCustomEntity(p) => {
                CommandMessage::UploadCustomEntity(UploadCustomEntityDto {
                    command_id,
                    entity_id: p.entity_id.clone(),
                    name: p.name.clone(),
                    tags: p.tags.clone(),
                    depth_offset: p.depth_offset,
                    collision_grid: p.collision_grid.clone(),
                    image_path: p.image_path.clone(),
                })
            }
            CommandPayload::DeleteCustomEntity(p) => {
                CommandMessage::DeleteCustomEntity(DeleteByIdDto {
                    command_id,
                    entity_id: p.entity_id.clone(),
                })
            }
            CommandPayload::CreateEntity(p) => CommandMessage::CreateEntity(CreateEntityDto {
                command_id,
                entity_id: p.entity_id.clone(),
                collection: p.prefab.collection.clone(),
                prefab_id: p.prefab.id.clone(),
                x: p.x,
                y: p.y,
            }),
            CommandPayload::MoveEntity(p) => CommandMessage::MoveEntity(MoveEntityDto {
                command_id,
                entity_id: p.entity_id.clone(),
                x: p.x,
                y: p.y,
            }),
            CommandPayload::DeleteEntity(p) => CommandMessage::DeleteEntity(DeleteByIdDto {
                command_id,
                entity_id: p.entity_id.clone(),
            }),
        }
    }
}

impl TryFrom<CommandMessage> for MapCommand {
    type Error = EditorError;

    fn try_from(message: CommandMessage) -> Result<Self, Self::Error> {
        message.validate()?;
        let command_id = CommandId::from(message.command_id());
        let payload = match message {
            CommandMessage::ModifyCustomEntity(dto) => {
                let patch = PrefabPatch {
                    name: dto.name,
                    tags: dto.tags,
                    depth_offset: dto.depth_offset,
                    collision_grid: dto.collision_grid,
                };
                patch.validate()?;
                CommandPayload::ModifyCustomEntity(ModifyCustomEntity {
                    entity_id: dto.entity_id,
                    patch,
                })
            }
            CommandMessage::UploadCustomEntity(dto) => {
                CommandPayload::UploadCustomEntity(UploadCustomEntity {
                    entity_id: dto.entity_id,
                    name: dto.name,
                    tags: dto.tags,
                    depth_offset: dto.depth_offset,
                    collision_grid: dto.collision_grid,
                    image_path: dto.image_path,
                })
            }
            CommandMessage::DeleteCustomEntity(dto) => {
                CommandPayload::DeleteCustomEntity(DeleteCustomEntity {
                    entity_id: dto.entity_id,
                })
            }
            CommandMessage::CreateEntity(dto) => CommandPayload::CreateEntity(CreateEntity {
                entity_id: dto.entity_id,
                prefab: PrefabRef::new(dto.collection, dto.prefab_id),
                x: dto.x,
                y: dto.y,
            }),
            CommandMessage::MoveEntity(dto) => CommandPayload::MoveEntity(MoveEntity {
                entity_id: dto.entity_id,
                x: dto.x,
                y: dto.y,
            }),
            CommandMessage::DeleteEntity(dto) => CommandPayload::DeleteEntity(DeleteEntity {
                entity_id: dto.entity_id,
            }),
        };
        Ok(MapCommand::with_id(command_id, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn when_modify_has_absent_and_null_fields_then_both_survive_a_round_trip() {
        let wire = json!({
            "kind": "ModifyCustomEntity",
            "payload": {
                "commandId": "c-1",
                "entityId": "P1",
                "depthOffset": 5.0,
                "collisionGrid": null
            }
        });

        let message: CommandMessage = serde_json::from_value(wire.clone()).expect("valid payload");
        let command = MapCommand::try_from(message).expect("valid ids");
        let CommandPayload::ModifyCustomEntity(modify) = command.payload() else {
            panic!("expected a modify payload");
        };
        assert_eq!(modify.patch.name, FieldUpdate::Unchanged);
        assert_eq!(modify.patch.depth_offset, FieldUpdate::Set(5.0));
        assert_eq!(modify.patch.collision_grid, FieldUpdate::Clear);

        let back = serde_json::to_value(CommandMessage::from(&command)).expect("serializes");
        assert_eq!(back, wire);
    }

    #[test]
    fn when_collision_grid_holds_arbitrary_integers_then_they_round_trip_unchanged() {
        let wire = json!({
            "kind": "ModifyCustomEntity",
            "payload": {
                "commandId": "c-2",
                "entityId": "P1",
                "collisionGrid": [[0, 300], [-1, 2]]
            }
        });

        let message: CommandMessage = serde_json::from_value(wire.clone()).expect("valid payload");
        let command = MapCommand::try_from(message).expect("valid ids");

        let back = serde_json::to_value(CommandMessage::from(&command)).expect("serializes");
        assert_eq!(back, wire);
    }

    #[test]
    fn when_command_is_wrapped_in_client_message_then_envelope_is_adjacently_tagged() {
        let command = MapCommand::with_id(
            CommandId::from("c-9"),
            CommandPayload::MoveEntity(MoveEntity {
                entity_id: "E1".to_string(),
                x: 3,
                y: 4,
            }),
        );

        let value = serde_json::to_value(ClientMessage::MapEditorCommand(CommandMessage::from(
            &command,
        )))
        .expect("serializes");

        assert_eq!(
            value,
            json!({
                "type": "MapEditorCommand",
                "data": {
                    "kind": "MoveEntity",
                    "payload": { "commandId": "c-9", "entityId": "E1", "x": 3, "y": 4 }
                }
            })
        );
    }

    #[test]
    fn when_command_id_is_blank_then_conversion_is_rejected() {
        let message = CommandMessage::DeleteEntity(DeleteByIdDto {
            command_id: "  ".to_string(),
            entity_id: "E1".to_string(),
        });

        assert!(matches!(
            MapCommand::try_from(message),
            Err(EditorError::InvalidPayload(_))
        ));
    }

    #[test]
    fn when_create_is_converted_then_prefab_reference_is_split_into_fields() {
        let command = MapCommand::new(CommandPayload::CreateEntity(CreateEntity {
            entity_id: "E1".to_string(),
            prefab: PrefabRef::custom("P1"),
            x: 1,
            y: 2,
        }));

        let message = CommandMessage::from(&command);
        let CommandMessage::CreateEntity(dto) = &message else {
            panic!("expected a create payload");
        };
        assert_eq!(dto.collection, "custom entities");
        assert_eq!(dto.prefab_id, "P1");
        assert_eq!(message.command_id(), command.id().as_str());
    }

    #[test]
    fn when_server_sends_welcome_then_fields_are_camel_case() {
        let value = serde_json::to_value(ServerMessage::Welcome {
            client_id: "7".to_string(),
            head_seq: 12,
            replay_truncated: false,
        })
        .expect("serializes");

        assert_eq!(
            value,
            json!({
                "type": "Welcome",
                "data": { "clientId": "7", "headSeq": 12, "replayTruncated": false }
            })
        );
    }
}
