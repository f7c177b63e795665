pub mod domain;
pub mod frameworks;
pub mod interface_adapters;
pub mod use_cases;

pub use frameworks::client::{EditorClient, EditorSettings};
pub use frameworks::runtime::{init_runtime, run_with_config};
