//! Admin API client (admin dashboard → ReveeGate server).
//!
//! All requests carry the admin JWT as a bearer token.

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::{ClientError, parse_response};
use crate::objects::admin::{HubStats, ReconcileRequest, ReconcileResponse, SyncResponse};

/// Typed HTTP client for the ReveeGate **Admin API**.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl AdminClient {
    /// Create a new `AdminClient`.
    ///
    /// * `base_url` – root URL of the ReveeGate server.
    /// * `token` – an admin JWT issued by the auth service.
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// `POST /api/v1/admin/reconcile` – manually settle or fail a pending payment.
    pub async fn reconcile(
        &self,
        request: &ReconcileRequest,
    ) -> Result<ReconcileResponse, ClientError> {
        let url = self.base_url.join("/api/v1/admin/reconcile")?;

        let resp = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;

        parse_response(resp).await
    }

    /// `POST /api/v1/admin/payments/{payment_id}/sync` – pull the payment
    /// status from its provider and apply it.
    pub async fn sync_payment(&self, payment_id: Uuid) -> Result<SyncResponse, ClientError> {
        let url = self
            .base_url
            .join(&format!("/api/v1/admin/payments/{payment_id}/sync"))?;

        let resp = self.http.post(url).bearer_auth(&self.token).send().await?;

        parse_response(resp).await
    }

    /// `GET /api/v1/admin/realtime/stats` – connection hub snapshot.
    pub async fn realtime_stats(&self) -> Result<HubStats, ClientError> {
        let url = self.base_url.join("/api/v1/admin/realtime/stats")?;

        let resp = self.http.get(url).bearer_auth(&self.token).send().await?;

        parse_response(resp).await
    }
}
