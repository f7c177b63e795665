// Domain-level errors for map editing workflows.

use crate::domain::PrefabRef;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum EditorError {
    /// Target entity or prefab is missing or stale at apply time.
    Apply { target: String, reason: String },
    /// Undo requested for a command whose effect cannot be inverted.
    UnsupportedOperation(String),
    /// The command could not be handed to the authority.
    NetworkUnavailable(String),
    /// A cached handle no longer matches the registry.
    StaleReference { entity_id: String, prefab: PrefabRef },
    /// Malformed command payload, rejected before any mutation.
    InvalidPayload(String),
    /// The editor task has shut down.
    EditorClosed,
}

impl EditorError {
    pub fn apply(target: impl Into<String>, reason: impl Into<String>) -> Self {
        EditorError::Apply {
            target: target.into(),
            reason: reason.into(),
        }
    }

    pub fn is_apply(&self) -> bool {
        matches!(self, EditorError::Apply { .. })
    }
}

impl fmt::Display for EditorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorError::Apply { target, reason } => write!(f, "cannot apply to {target}: {reason}"),
            EditorError::UnsupportedOperation(reason) => write!(f, "unsupported operation: {reason}"),
            EditorError::NetworkUnavailable(reason) => write!(f, "network unavailable: {reason}"),
            EditorError::StaleReference { entity_id, prefab } => {
                write!(f, "entity {entity_id} holds a stale reference to {prefab}")
            }
            EditorError::InvalidPayload(reason) => write!(f, "invalid payload: {reason}"),
            EditorError::EditorClosed => write!(f, "editor task closed"),
        }
    }
}

impl std::error::Error for EditorError {}

/// Failures reported by a prefab catalog backend.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    Transport(String),
    Upstream { status: u16, message: Option<String> },
    Decode(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Transport(err) => write!(f, "catalog transport error: {err}"),
            CatalogError::Upstream { status, message } => {
                if let Some(message) = message {
                    write!(f, "catalog upstream error {status}: {message}")
                } else {
                    write!(f, "catalog upstream error {status}")
                }
            }
            CatalogError::Decode(err) => write!(f, "catalog response decode error: {err}"),
        }
    }
}

impl std::error::Error for CatalogError {}
