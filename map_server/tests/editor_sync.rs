mod support;

use async_trait::async_trait;
use map_editor::domain::{
    CatalogError, CommandPayload, CreateEntity, EntityPrefab, FieldUpdate, MapCommand,
    ModifyCustomEntity, PrefabCatalog, PrefabPatch, PrefabRef, UploadCustomEntity,
};
use map_editor::interface_adapters::ConnectionSettings;
use map_editor::use_cases::{
    DispatcherSettings, EditorUpdate, MapSnapshot, OfflinePolicy,
};
use map_editor::{EditorClient, EditorSettings};
use std::sync::Arc;
use std::time::Duration;

// Custom entities arrive through upload commands, so the catalog never has anything.
struct EmptyCatalog;

#[async_trait]
impl PrefabCatalog for EmptyCatalog {
    async fn fetch_prefab(&self, _key: &PrefabRef) -> Result<Option<EntityPrefab>, CatalogError> {
        Ok(None)
    }
}

fn settings(room_id: &str) -> EditorSettings {
    EditorSettings {
        connection: ConnectionSettings {
            url: support::ws_url(),
            room_id: room_id.to_string(),
            reconnect_delay: Duration::from_millis(100),
            handshake_timeout: Duration::from_secs(2),
            outgoing_capacity: 64,
        },
        dispatcher: DispatcherSettings {
            undo_history_limit: 16,
            dedup_window: 256,
            ack_timeout: Duration::from_secs(5),
            offline_policy: OfflinePolicy::Queue,
            outbox_capacity: 64,
        },
        map_width: 16,
        map_height: 16,
        ack_sweep_interval: Duration::from_millis(100),
    }
}

async fn connected_editor(room_id: &str) -> EditorClient {
    let client = EditorClient::start(settings(room_id), Arc::new(EmptyCatalog));
    let mut updates = client.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(EditorUpdate::ConnectionChanged { connected: true }) = updates.recv().await {
                return;
            }
        }
    })
    .await
    .expect("editor should connect");
    client
}

// Polls until `check` holds for the editor's snapshot.
async fn eventually(client: &EditorClient, check: impl Fn(&MapSnapshot) -> bool) -> MapSnapshot {
    for _ in 0..100 {
        let snapshot = client.handle().snapshot().await.expect("editor running");
        if check(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("editor did not converge");
}

#[tokio::test]
async fn when_one_editor_changes_the_map_then_the_other_converges() {
    let room = support::unique_room();
    let alice = connected_editor(&room).await;
    let bob = connected_editor(&room).await;

    alice
        .handle()
        .submit(MapCommand::new(CommandPayload::UploadCustomEntity(
            UploadCustomEntity {
                entity_id: "P1".to_string(),
                name: "Lamp".to_string(),
                tags: vec!["light".to_string()],
                depth_offset: Some(0.0),
                collision_grid: Some(vec![vec![1]]),
                image_path: "lamp.png".to_string(),
            },
        )))
        .await
        .expect("upload applies");
    for (id, x) in [("E1", 0), ("E2", 3)] {
        alice
            .handle()
            .submit(MapCommand::new(CommandPayload::CreateEntity(CreateEntity {
                entity_id: id.to_string(),
                prefab: PrefabRef::custom("P1"),
                x,
                y: 0,
            })))
            .await
            .expect("placement applies");
    }
    alice
        .handle()
        .submit(MapCommand::new(CommandPayload::ModifyCustomEntity(
            ModifyCustomEntity {
                entity_id: "P1".to_string(),
                patch: PrefabPatch {
                    depth_offset: FieldUpdate::Set(5.0),
                    ..Default::default()
                },
            },
        )))
        .await
        .expect("modify applies");

    let seen = eventually(&bob, |s| {
        s.entities.len() == 2 && s.entities.iter().all(|e| e.depth() == 5.0)
    })
    .await;

    assert_eq!(seen.prefabs.len(), 1);
    assert_eq!(seen.prefabs[0].name, "Lamp");
    assert_eq!(seen.prefabs[0].depth_offset, Some(5.0));
    assert_eq!(seen.blocked_cells, 2);
    let mine = alice.handle().snapshot().await.expect("editor running");
    assert_eq!(mine.blocked_cells, seen.blocked_cells);

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test]
async fn when_editor_joins_late_then_it_replays_the_room_history() {
    let room = support::unique_room();
    let alice = connected_editor(&room).await;
    alice
        .handle()
        .submit(MapCommand::new(CommandPayload::UploadCustomEntity(
            UploadCustomEntity {
                entity_id: "P9".to_string(),
                name: "Crate".to_string(),
                tags: vec![],
                depth_offset: None,
                collision_grid: Some(vec![vec![1, 1]]),
                image_path: "crate.png".to_string(),
            },
        )))
        .await
        .expect("upload applies");
    alice
        .handle()
        .submit(MapCommand::new(CommandPayload::CreateEntity(CreateEntity {
            entity_id: "C1".to_string(),
            prefab: PrefabRef::custom("P9"),
            x: 5,
            y: 5,
        })))
        .await
        .expect("placement applies");

    let carol = connected_editor(&room).await;
    let seen = eventually(&carol, |s| s.entities.len() == 1).await;

    assert_eq!(seen.blocked_cells, 2);
    assert_eq!(seen.entities[0].position(), (5, 5));

    alice.shutdown().await;
    carol.shutdown().await;
}
