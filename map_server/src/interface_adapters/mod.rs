// Interface adapters: websocket relay and HTTP routes.

pub mod http;
pub mod net;
pub mod state;
pub mod utils;
