//! Application state shared across all request handlers.

use std::sync::Arc;

use reveegate_core::auth::{JwtValidator, OverlayTokenValidator, TokenValidator};
use reveegate_core::processors::{EventPublisher, ReconciliationEngine, WebhookIngress};
use reveegate_core::providers::{MidtransProvider, ProviderRegistry, XenditProvider};
use reveegate_core::realtime::{ConnectionConfig, ConnectionHub, HubHandle};
use reveegate_core::store::{Broker, DonationStore, IdempotencyStore};

use crate::config::runtime::RuntimeConfig;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub ingress: Arc<WebhookIngress>,
    pub engine: ReconciliationEngine,
    pub hub: HubHandle,
    pub overlay_auth: Arc<dyn TokenValidator>,
    pub admin_auth: Arc<dyn TokenValidator>,
    pub connection: ConnectionConfig,
}

impl AppState {
    /// Wire the pipeline from its collaborators.
    ///
    /// The returned hub must be spawned by the caller.
    pub fn new(
        config: &RuntimeConfig,
        store: Arc<dyn DonationStore>,
        idempotency: Arc<dyn IdempotencyStore>,
        broker: Arc<dyn Broker>,
    ) -> (Self, ConnectionHub) {
        let mut providers = ProviderRegistry::new();
        if let Some(midtrans) = &config.midtrans {
            providers = providers.with(Arc::new(MidtransProvider::new(midtrans.clone())));
        }
        if let Some(xendit) = &config.xendit {
            providers = providers.with(Arc::new(XenditProvider::new(xendit.clone())));
        }

        let engine = ReconciliationEngine::new(
            store.clone(),
            EventPublisher::new(broker),
            providers.clone(),
        );
        let ingress = WebhookIngress::new(
            providers,
            idempotency,
            store,
            engine.clone(),
            config.ingress,
        );
        let (hub, handle) = ConnectionHub::new(config.hub);

        let state = Self {
            ingress: Arc::new(ingress),
            engine,
            hub: handle,
            overlay_auth: Arc::new(OverlayTokenValidator::new(config.min_overlay_token_len)),
            admin_auth: Arc::new(JwtValidator::new(&config.jwt_secret)),
            connection: config.connection,
        };
        (state, hub)
    }
}
