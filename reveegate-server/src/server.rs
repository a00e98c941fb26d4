//! Axum server setup and router configuration.

use crate::api;
use crate::shutdown::shutdown_signal;
use crate::state::AppState;
use axum::{Json, Router, response::IntoResponse, routing::get};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Build the main application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(api::router())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    connections: usize,
}

/// Simple health check - returns OK if the server is running.
async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        connections: state.hub.client_count().await,
    })
}

/// Run the server with graceful shutdown support.
pub async fn run_server(router: Router, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);
    serve(listener, router, shutdown_signal()).await
}

/// Serve `router` on an already bound listener until `shutdown` completes.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::runtime::RuntimeConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use jsonwebtoken::{EncodingKey, Header, encode};
    use reveegate_core::entities::{Donation, Payment, PaymentProvider, PaymentStatus};
    use reveegate_core::processors::{DistributionBridge, IngressConfig};
    use reveegate_core::providers::{MidtransConfig, XenditConfig};
    use reveegate_core::realtime::{ConnectionConfig, HubConfig};
    use reveegate_core::store::{MemoryBroker, MemoryDonationStore, MemoryIdempotencyStore};
    use reveegate_sdk::client::{AdminClient, ClientError, FeedClient};
    use reveegate_sdk::objects::{ManualStatus, ReconcileRequest, WsMessageKind};
    use reveegate_sdk::signature::{CALLBACK_TOKEN_HEADER, midtrans_signature};
    use std::sync::Arc;
    use std::time::Duration;
    use futures_util::{SinkExt, StreamExt};
    use tokio::sync::oneshot;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as RawMessage;
    use tower::ServiceExt;
    use url::Url;

    const SERVER_KEY: &str = "SB-Mid-server-test";
    const XENDIT_TOKEN: &str = "xnd-callback-token";
    const JWT_SECRET: &str = "server-test-jwt-secret";
    const OVERLAY_TOKEN: &str = "stream-key-0123456789abcdefghijklmnop";

    fn runtime_config() -> RuntimeConfig {
        runtime_config_with(ConnectionConfig::default())
    }

    fn runtime_config_with(connection: ConnectionConfig) -> RuntimeConfig {
        RuntimeConfig {
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            midtrans: Some(MidtransConfig {
                server_key: SERVER_KEY.into(),
                is_production: false,
                base_url: None,
            }),
            xendit: Some(XenditConfig {
                webhook_token: XENDIT_TOKEN.into(),
                secret_key: "xnd_development_key".into(),
                base_url: None,
            }),
            jwt_secret: JWT_SECRET.into(),
            min_overlay_token_len: 32,
            connection,
            hub: HubConfig::default(),
            ingress: IngressConfig::default(),
        }
    }

    fn admin_jwt(sub: &str) -> String {
        #[derive(Serialize)]
        struct Claims<'a> {
            sub: &'a str,
            exp: i64,
        }
        let exp = time::OffsetDateTime::now_utc().unix_timestamp() + 3600;
        encode(
            &Header::default(),
            &Claims { sub, exp },
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .unwrap()
    }

    struct TestServer {
        http: Url,
        ws: Url,
        store: Arc<MemoryDonationStore>,
        midtrans_payment: Payment,
        xendit_payment: Payment,
        _shutdown: oneshot::Sender<()>,
    }

    async fn seeded_state() -> (AppState, Arc<MemoryDonationStore>, Payment, Payment) {
        seeded_state_with(runtime_config()).await
    }

    async fn seeded_state_with(
        config: RuntimeConfig,
    ) -> (AppState, Arc<MemoryDonationStore>, Payment, Payment) {
        let store = Arc::new(MemoryDonationStore::new());
        let donation = Donation::new("Budi", Some("semangat!".into()), 50_000);
        let midtrans_payment =
            Payment::new(donation.id, PaymentProvider::Midtrans, "DON-abc", "qris", 50_000);
        store.insert(midtrans_payment.clone(), donation).await;
        let donation = Donation::new("Sari", None, 75_000);
        let xendit_payment =
            Payment::new(donation.id, PaymentProvider::Xendit, "DON-xyz", "ewallet", 75_000);
        store.insert(xendit_payment.clone(), donation).await;

        let broker = Arc::new(MemoryBroker::new());
        let (state, hub) = AppState::new(
            &config,
            store.clone(),
            Arc::new(MemoryIdempotencyStore::new()),
            broker.clone(),
        );
        tokio::spawn(hub.run());
        tokio::spawn(DistributionBridge::new(broker.clone(), state.hub.clone()).run());
        timeout(Duration::from_secs(2), async {
            while broker.subscriber_count() == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        (state, store, midtrans_payment, xendit_payment)
    }

    async fn start() -> TestServer {
        start_with(ConnectionConfig::default()).await
    }

    async fn start_with(connection: ConnectionConfig) -> TestServer {
        let (state, store, midtrans_payment, xendit_payment) =
            seeded_state_with(runtime_config_with(connection)).await;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(serve(listener, build_router(state), async {
            let _ = rx.await;
        }));
        TestServer {
            http: Url::parse(&format!("http://{addr}")).unwrap(),
            ws: Url::parse(&format!("ws://{addr}")).unwrap(),
            store,
            midtrans_payment,
            xendit_payment,
            _shutdown: tx,
        }
    }

    fn midtrans_settlement() -> serde_json::Value {
        serde_json::json!({
            "order_id": "DON-abc",
            "transaction_id": "tx-1",
            "transaction_status": "settlement",
            "transaction_time": "2024-01-15 17:20:11",
            "settlement_time": "2024-01-15 17:21:00",
            "status_code": "200",
            "gross_amount": "50000.00",
            "signature_key": midtrans_signature("DON-abc", "200", "50000.00", SERVER_KEY),
            "fraud_status": "accept"
        })
    }

    async fn wait_for_clients(admin: &AdminClient, expected: usize) {
        timeout(Duration::from_secs(2), async {
            loop {
                if admin.realtime_stats().await.unwrap().total_clients == expected {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn webhook_to_overlay_end_to_end() {
        let server = start().await;
        let admin = AdminClient::new(server.http.clone(), admin_jwt("admin-1"));
        let mut overlay = FeedClient::new(server.ws.clone())
            .connect_overlay(OVERLAY_TOKEN)
            .await
            .unwrap();

        let welcome = overlay.next_envelope().await.unwrap().unwrap();
        assert_eq!(welcome.kind, WsMessageKind::Welcome);
        wait_for_clients(&admin, 1).await;

        let http = reqwest::Client::new();
        let url = server.http.join("/api/v1/webhooks/midtrans").unwrap();
        let resp = http.post(url.clone()).json(&midtrans_settlement()).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let donation = timeout(Duration::from_secs(2), overlay.next_donation())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(donation.donor_name, "Budi");
        assert_eq!(donation.amount, 50_000);

        // The replay is acknowledged but produces no second alert.
        let resp = http.post(url).json(&midtrans_settlement()).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        overlay.ping().await.unwrap();
        let next = timeout(Duration::from_secs(2), overlay.next_envelope())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(next.kind, WsMessageKind::Pong);

        let payment = server.store.payment(server.midtrans_payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(server.store.webhook_logs().await.len(), 2);
    }

    #[tokio::test]
    async fn webhook_rejections() {
        let server = start().await;
        let http = reqwest::Client::new();

        let resp = http
            .post(server.http.join("/api/v1/webhooks/xendit").unwrap())
            .header(CALLBACK_TOKEN_HEADER, "wrong-token")
            .body(r#"{"id":"inv-1","external_id":"DON-xyz","status":"PAID","amount":75000}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let mut tampered = midtrans_settlement();
        tampered["gross_amount"] = "1.00".into();
        let resp = http
            .post(server.http.join("/api/v1/webhooks/midtrans").unwrap())
            .json(&tampered)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let payment = server.store.payment(server.xendit_payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn short_overlay_token_is_refused() {
        let server = start().await;
        let result = FeedClient::new(server.ws.clone()).connect_overlay("short").await;
        assert!(matches!(result, Err(ClientError::WebSocket(_))));
    }

    #[tokio::test]
    async fn manual_reconcile_through_admin_api() {
        let server = start().await;
        let jwt = admin_jwt("admin-1");
        let admin = AdminClient::new(server.http.clone(), jwt.clone());
        let mut dashboard = FeedClient::new(server.ws.clone())
            .connect_admin(&jwt)
            .await
            .unwrap();
        let welcome = dashboard.next_envelope().await.unwrap().unwrap();
        assert_eq!(welcome.kind, WsMessageKind::Welcome);
        wait_for_clients(&admin, 1).await;

        let err = admin
            .reconcile(&ReconcileRequest {
                payment_id: server.xendit_payment.id,
                status: ManualStatus::Paid,
                reason: "short".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::BAD_REQUEST));

        let response = admin
            .reconcile(&ReconcileRequest {
                payment_id: server.xendit_payment.id,
                status: ManualStatus::Paid,
                reason: "bank transfer confirmed by phone".into(),
            })
            .await
            .unwrap();
        assert!(response.changed);

        let stats = admin.realtime_stats().await.unwrap();
        assert_eq!(stats.channels.get("admin:admin-1"), Some(&1));

        let payment = server.store.payment(server.xendit_payment.id).await.unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
        assert_eq!(payment.metadata["reconciled_by"], "admin-1");

        let err = admin.sync_payment(uuid::Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ClientError::Api { status, .. } if status == StatusCode::NOT_FOUND));
    }

    #[tokio::test]
    async fn admin_routes_require_a_token() {
        let (state, ..) = seeded_state().await;
        let router = build_router(state);

        let resp = router
            .clone()
            .oneshot(
                Request::get("/api/v1/admin/realtime/stats")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let resp = router
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    // -----------------------------------------------------------------------
    // WebSocket transport: heartbeat, read deadline, frame size limit
    // -----------------------------------------------------------------------

    type RawSocket = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect_raw(server: &TestServer) -> RawSocket {
        let url = server
            .ws
            .join(&format!("/ws/overlay?token={OVERLAY_TOKEN}"))
            .unwrap();
        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        socket
    }

    /// Read until the server closes the session; returns everything seen.
    async fn read_until_closed(socket: &mut RawSocket) -> Vec<RawMessage> {
        timeout(Duration::from_secs(2), async {
            let mut seen = Vec::new();
            loop {
                match socket.next().await {
                    Some(Ok(msg @ RawMessage::Close(_))) => {
                        seen.push(msg);
                        break;
                    }
                    Some(Ok(msg)) => seen.push(msg),
                    None | Some(Err(_)) => break,
                }
            }
            seen
        })
        .await
        .expect("server kept the session open")
    }

    #[tokio::test]
    async fn server_pings_and_a_ponging_client_stays_connected() {
        let config = ConnectionConfig::new(
            Duration::from_secs(1),
            Duration::from_millis(300),
            1024,
            16,
        );
        let server = start_with(config).await;
        let admin = AdminClient::new(server.http.clone(), admin_jwt("admin-1"));
        let mut socket = connect_raw(&server).await;

        let first_ping = timeout(config.ping_period + Duration::from_millis(500), async {
            loop {
                match socket.next().await {
                    Some(Ok(RawMessage::Ping(_))) => break,
                    Some(Ok(RawMessage::Close(_))) | None | Some(Err(_)) => {
                        panic!("session ended before the first ping")
                    }
                    Some(Ok(_)) => {}
                }
            }
        })
        .await;
        assert!(first_ping.is_ok(), "no ping within the ping period");

        // Reading lets tungstenite answer each ping, which keeps the read
        // deadline moving for several pong_wait periods.
        let until = tokio::time::Instant::now() + config.pong_wait * 3;
        let mut pings = 0;
        while let Ok(frame) = tokio::time::timeout_at(until, socket.next()).await {
            match frame {
                Some(Ok(RawMessage::Ping(_))) => pings += 1,
                Some(Ok(RawMessage::Close(_))) | None | Some(Err(_)) => {
                    panic!("ponging client was disconnected")
                }
                Some(Ok(_)) => {}
            }
        }
        assert!(pings >= 2);
        assert_eq!(admin.realtime_stats().await.unwrap().total_clients, 1);
    }

    #[tokio::test]
    async fn silent_client_is_dropped_after_pong_wait() {
        let config = ConnectionConfig::new(
            Duration::from_secs(1),
            Duration::from_millis(300),
            1024,
            16,
        );
        let server = start_with(config).await;
        let admin = AdminClient::new(server.http.clone(), admin_jwt("admin-1"));
        let started = tokio::time::Instant::now();
        let mut socket = connect_raw(&server).await;

        // Never reading means the server's pings go unanswered.
        wait_for_clients(&admin, 1).await;
        wait_for_clients(&admin, 0).await;
        assert!(started.elapsed() >= Duration::from_millis(250));

        let seen = read_until_closed(&mut socket).await;
        assert!(matches!(seen.first(), Some(RawMessage::Text(_))));
        if let Some(RawMessage::Close(Some(frame))) = seen.last() {
            assert_eq!(u16::from(frame.code), 1001);
        }
    }

    #[tokio::test]
    async fn oversized_frame_ends_the_session() {
        let config = ConnectionConfig::new(Duration::from_secs(1), Duration::from_secs(30), 64, 16);
        let server = start_with(config).await;
        let admin = AdminClient::new(server.http.clone(), admin_jwt("admin-1"));
        let mut socket = connect_raw(&server).await;

        let welcome = timeout(Duration::from_secs(2), socket.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(matches!(welcome, RawMessage::Text(_)));
        wait_for_clients(&admin, 1).await;

        // Small frames are still answered.
        socket
            .send(RawMessage::Text(r#"{"type":"ping"}"#.into()))
            .await
            .unwrap();
        let reply = timeout(Duration::from_secs(2), async {
            loop {
                if let Some(Ok(RawMessage::Text(text))) = socket.next().await {
                    break text;
                }
            }
        })
        .await
        .unwrap();
        assert!(reply.contains("pong"));

        socket
            .send(RawMessage::Text("x".repeat(200).into()))
            .await
            .unwrap();
        read_until_closed(&mut socket).await;
        wait_for_clients(&admin, 0).await;
    }
}
