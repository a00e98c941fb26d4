#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod auth;
pub mod entities;
pub mod events;
pub mod framework;
pub mod processors;
pub mod providers;
pub mod realtime;
pub mod store;
