// Use cases layer: map editing workflows on the client.

pub mod commands;
pub mod dispatcher;
pub mod editor;
pub mod entities;
pub mod history;
pub mod map_state;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use commands::ExecutionReport;
pub use dispatcher::{
    CommandDispatcher, CommandOrigin, CommandState, DispatcherSettings, EditorUpdate,
    LocalOutcome, OfflinePolicy, RemoteOutcome,
};
pub use editor::{EditorEvent, EditorHandle, editor_task};
pub use entities::EntitiesManager;
pub use history::{RecentIds, UndoHistory};
pub use map_state::{MapSnapshot, MapState, RecomputeReport};
pub use registry::PrefabRegistry;
