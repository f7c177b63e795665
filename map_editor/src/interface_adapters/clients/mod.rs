// Outbound clients for services the editor depends on.

pub mod catalog;

pub use catalog::HttpPrefabCatalog;
