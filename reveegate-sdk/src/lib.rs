//! Shared wire types for ReveeGate.
//!
//! - [`objects`]: webhook payloads, socket envelopes, broker events and admin objects.
//! - [`signature`]: provider callback authentication primitives.
//! - `client` (feature `client`): overlay WebSocket consumer and admin HTTP client.

pub mod objects;
pub mod signature;

#[cfg(feature = "client")]
pub mod client;
