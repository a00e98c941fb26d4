//! TOML file configuration structures.
//!
//! These structs directly map to the `reveegate-config.toml` file format.
//! Database and Redis URLs are read from the environment instead.

use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Provider sections are optional; an absent section disables the provider.
    pub midtrans: Option<MidtransConfig>,
    pub xendit: Option<XenditConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

#[derive(Debug, Clone, Deserialize)]
pub struct MidtransConfig {
    pub server_key: String,
    #[serde(default)]
    pub is_production: bool,
    /// Overrides the sandbox/production API root.
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct XenditConfig {
    /// Expected `x-callback-token` value.
    pub webhook_token: String,
    /// API key used for status polling.
    pub secret_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HS256 secret of admin JWTs.
    pub jwt_secret: String,
    #[serde(default = "default_min_overlay_token_len")]
    pub min_overlay_token_len: usize,
}

fn default_min_overlay_token_len() -> usize {
    reveegate_core::auth::DEFAULT_MIN_OVERLAY_TOKEN_LEN
}

/// Feed connection tuning. The ping period is derived from `pong_wait_secs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub write_wait_secs: u64,
    pub pong_wait_secs: u64,
    pub max_message_size: usize,
    pub send_buffer: usize,
    /// Deliver donation broadcasts to admin channels too.
    pub admin_donation_feed: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            write_wait_secs: 10,
            pong_wait_secs: 60,
            max_message_size: 4096,
            send_buffer: 256,
            admin_donation_feed: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    pub ttl_secs: u64,
    /// Answer 503 while Redis is unreachable instead of processing
    /// callbacks without duplicate protection.
    pub fail_closed: bool,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 24 * 60 * 60,
            fail_closed: false,
        }
    }
}
