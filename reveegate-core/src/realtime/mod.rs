//! Live donation feed: the connection hub actor and the per-connection
//! protocol driven by the WebSocket handlers.

pub mod connection;
pub mod hub;

pub use connection::{
    ConnectionConfig, ConnectionConfigError, ConnectionReader, ConnectionWriter, InboundReply,
    open_connection,
};
pub use hub::{ConnectionHub, DetachedConnections, HubConfig, HubError, HubHandle};
