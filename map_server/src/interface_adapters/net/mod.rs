// Network adapter modules split by editor sockets vs HTTP inspection routes.

pub mod client;
pub mod internal;

pub use client::ws_handler;
pub use internal::room_info_handler;
