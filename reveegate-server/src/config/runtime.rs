//! Validated configuration handed to the core constructors.

use reveegate_core::processors::IngressConfig;
use reveegate_core::providers::{MidtransConfig, XenditConfig};
use reveegate_core::realtime::{ConnectionConfig, HubConfig};
use std::net::SocketAddr;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: SocketAddr,
    pub midtrans: Option<MidtransConfig>,
    pub xendit: Option<XenditConfig>,
    pub jwt_secret: String,
    pub min_overlay_token_len: usize,
    pub connection: ConnectionConfig,
    pub hub: HubConfig,
    pub ingress: IngressConfig,
}
