use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::{
    CUSTOM_ENTITIES_COLLECTION, CatalogError, EditorError, EntityPrefab, MapCommand,
    MapConnection, PrefabCatalog, PrefabRef,
};
use crate::use_cases::{CommandDispatcher, DispatcherSettings, MapState, OfflinePolicy};

// Prefab used by most scenarios: "Lamp", tagged "light", no depth offset, one blocked cell.
pub(crate) fn lamp_prefab(id: &str) -> EntityPrefab {
    EntityPrefab {
        collection: CUSTOM_ENTITIES_COLLECTION.to_string(),
        id: id.to_string(),
        name: "Lamp".to_string(),
        tags: vec!["light".to_string()],
        depth_offset: Some(0.0),
        collision_grid: Some(vec![vec![1]]),
        image_path: "lamp.png".to_string(),
        revision: 0,
    }
}

// Catalog fake with optional latency and failure injection.
#[derive(Default)]
pub(crate) struct InMemoryCatalog {
    prefabs: Mutex<HashMap<PrefabRef, EntityPrefab>>,
    fetches: AtomicUsize,
    fail: AtomicBool,
    fail_next: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl InMemoryCatalog {
    pub(crate) fn with_prefabs(prefabs: impl IntoIterator<Item = EntityPrefab>) -> Self {
        let catalog = Self::default();
        {
            let mut guard = catalog.prefabs.lock().expect("catalog mutex poisoned");
            for prefab in prefabs {
                guard.insert(prefab.key(), prefab);
            }
        }
        catalog
    }

    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().expect("catalog mutex poisoned") = Some(delay);
        self
    }

    pub(crate) fn fail_fetches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    // Fails only the next `count` fetches.
    pub(crate) fn fail_next_fetches(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrefabCatalog for InMemoryCatalog {
    async fn fetch_prefab(&self, key: &PrefabRef) -> Result<Option<EntityPrefab>, CatalogError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().expect("catalog mutex poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let fail_once = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail_once || self.fail.load(Ordering::SeqCst) {
            return Err(CatalogError::Transport("catalog offline".to_string()));
        }
        let guard = self.prefabs.lock().expect("catalog mutex poisoned");
        Ok(guard.get(key).cloned())
    }
}

// Connection fake that records every emitted command.
pub(crate) struct RecordingConnection {
    sent: Mutex<Vec<MapCommand>>,
    online: AtomicBool,
}

impl RecordingConnection {
    pub(crate) fn online() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
        }
    }

    pub(crate) fn offline() -> Self {
        let connection = Self::online();
        connection.set_online(false);
        connection
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn sent(&self) -> Vec<MapCommand> {
        self.sent.lock().expect("sent mutex poisoned").clone()
    }
}

impl MapConnection for RecordingConnection {
    fn emit_map_editor_command(&self, command: &MapCommand) -> Result<(), EditorError> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(EditorError::NetworkUnavailable("test connection offline".to_string()));
        }
        self.sent.lock().expect("sent mutex poisoned").push(command.clone());
        Ok(())
    }
}

pub(crate) fn test_settings(offline_policy: OfflinePolicy) -> DispatcherSettings {
    DispatcherSettings {
        undo_history_limit: 16,
        dedup_window: 64,
        ack_timeout: Duration::from_millis(500),
        offline_policy,
        outbox_capacity: 2,
    }
}

pub(crate) fn test_dispatcher(
    catalog: Arc<InMemoryCatalog>,
    connection: Arc<RecordingConnection>,
    offline_policy: OfflinePolicy,
) -> CommandDispatcher {
    let (updates_tx, _updates_rx) = broadcast::channel(64);
    let mut dispatcher = CommandDispatcher::new(
        MapState::new(catalog, 16, 16),
        connection.clone(),
        test_settings(offline_policy),
        updates_tx,
    );
    dispatcher.connection_changed(connection.online.load(Ordering::SeqCst));
    dispatcher
}
