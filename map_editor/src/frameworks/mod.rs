// Frameworks: configuration and process bootstrap for the editor client.

pub mod client;
pub mod config;
pub mod runtime;

pub use client::{EditorClient, EditorSettings};
