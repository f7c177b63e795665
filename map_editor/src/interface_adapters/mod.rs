// Interface adapters: wire protocol, authority connection and catalog client.

pub mod clients;
pub mod net;
pub mod protocol;

pub use clients::HttpPrefabCatalog;
pub use net::{ConnectionSettings, WsConnection};
