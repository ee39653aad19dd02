//! Integration test harness for Atacado.
//!
//! [`MockBackend`] serves the backend API under `/api/` and both webhook
//! endpoint roots under `/hooks/test/` and `/hooks/production/` from one
//! ephemeral port, and records every request it receives. Responses can be
//! scripted and delayed per path to exercise retries, rejections and
//! requests still in flight.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p atacado-integration-tests
//! ```

use std::collections::{HashMap, VecDeque};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use atacado_core::{
    DeploymentEnvironment, NewLineItem, Price, Quantity, TierSchedule, WebhookEnvironment,
    WebhookEventType,
};
use atacado_storefront::Storefront;
use atacado_storefront::clock::ManualClock;
use atacado_storefront::config::{AbandonmentConfig, StorefrontConfig, WebhookConfig};
use atacado_storefront::storage::KeyValueStore;
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use url::Url;

/// Path of the backend order endpoint.
pub const ORDERS: &str = "/api/orders";
/// Path of the backend cart snapshot endpoint.
pub const CART_SYNC: &str = "/api/cart-sync";
/// Path of the backend mark-contacted endpoint.
pub const MARK_CONTACTED: &str = "/api/cart-mark-contacted";
/// Path of the backend webhook settings endpoint.
pub const WEBHOOK_SETTINGS: &str = "/api/webhook-settings";

/// Order id returned by the mock for accepted orders.
pub const MOCK_ORDER_ID: &str = "order-1001";

/// Path a webhook lands on.
#[must_use]
pub fn hook_path(environment: WebhookEnvironment, event: WebhookEventType) -> String {
    format!("/hooks/{environment}/{}", event.as_str())
}

/// A request seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    /// Body parsed as JSON, `Null` when it is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or(Value::Null)
    }

    /// Header value as text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
struct MockState {
    requests: Vec<RecordedRequest>,
    scripted: HashMap<String, VecDeque<u16>>,
    delays: HashMap<String, Duration>,
    settings: Option<Value>,
}

type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend and webhook endpoints on one ephemeral port.
pub struct MockBackend {
    addr: SocketAddr,
    state: Shared,
    task: JoinHandle<()>,
}

impl MockBackend {
    /// Bind and start serving.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn start() -> Self {
        let state: Shared = Arc::default();
        let app = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .expect("bind mock backend");
        let addr = listener.local_addr().expect("mock backend address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    /// Absolute URL of `path` on the mock.
    ///
    /// # Panics
    ///
    /// Panics if `path` does not form a valid URL.
    #[must_use]
    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}/{}", self.addr, path.trim_start_matches('/')))
            .expect("mock URL")
    }

    /// Storefront configuration pointing every outbound call at the mock.
    ///
    /// Retries are fast, the sweep effectively never runs on its own and
    /// the heartbeat is off, so tests drive the detector explicitly.
    #[must_use]
    pub fn config(&self, data_dir: &Path) -> StorefrontConfig {
        StorefrontConfig {
            host: Ipv4Addr::LOCALHOST.into(),
            port: 0,
            environment: DeploymentEnvironment::Local,
            data_dir: data_dir.to_path_buf(),
            backend_url: self.url("api/"),
            webhooks: WebhookConfig {
                test_base_url: self.url("hooks/test/"),
                production_base_url: self.url("hooks/production/"),
                signing_secret: None,
                timeout: Duration::from_secs(2),
                max_attempts: 3,
                retry_delay: Duration::from_millis(10),
                settings_ttl: Duration::from_secs(300),
            },
            abandonment: AbandonmentConfig {
                threshold: Duration::from_secs(30 * 60),
                sweep_interval: Duration::from_secs(3600),
            },
            heartbeat_interval: None,
            min_order_units: 30,
            sentry_dsn: None,
        }
    }

    /// Serve remote webhook settings enabling every event towards
    /// `environment`.
    pub fn enable_all_webhooks(&self, environment: WebhookEnvironment) {
        let rows: Vec<Value> = WebhookEventType::ALL
            .iter()
            .map(|event| {
                json!({
                    "webhookType": event.as_str(),
                    "enabled": true,
                    "environment": environment,
                })
            })
            .collect();
        self.set_webhook_settings(Value::Array(rows));
    }

    /// Serve `settings` from the settings endpoint.
    pub fn set_webhook_settings(&self, settings: Value) {
        lock(&self.state).settings = Some(settings);
    }

    /// Answer the next requests to `path` with `statuses`, in order. Once
    /// they are used up the path answers normally again.
    pub fn respond_with(&self, path: &str, statuses: &[u16]) {
        lock(&self.state)
            .scripted
            .entry(path.to_string())
            .or_default()
            .extend(statuses);
    }

    /// Hold every response on `path` for `delay` after recording the
    /// request.
    pub fn delay(&self, path: &str, delay: Duration) {
        lock(&self.state).delays.insert(path.to_string(), delay);
    }

    /// Requests received on `path` so far.
    #[must_use]
    pub fn requests(&self, path: &str) -> Vec<RecordedRequest> {
        lock(&self.state)
            .requests
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    /// Wait up to five seconds for `count` requests on `path`, then return
    /// whatever arrived.
    pub async fn wait_for(&self, path: &str, count: usize) -> Vec<RecordedRequest> {
        for _ in 0..250 {
            let seen = self.requests(path);
            if seen.len() >= count {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.requests(path)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn handle(
    State(state): State<Shared>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let (status, settings, delay) = {
        let mut guard = lock(&state);
        let status = guard
            .scripted
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or(200);
        guard.requests.push(RecordedRequest {
            method,
            path: path.clone(),
            headers,
            body,
        });
        let delay = guard.delays.get(&path).copied();
        (status, guard.settings.clone(), delay)
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if !status.is_success() {
        return (status, "scripted failure").into_response();
    }

    match path.as_str() {
        WEBHOOK_SETTINGS => settings.map_or_else(
            || StatusCode::NOT_FOUND.into_response(),
            |settings| Json(settings).into_response(),
        ),
        ORDERS => (StatusCode::CREATED, Json(json!({ "id": MOCK_ORDER_ID }))).into_response(),
        _ => Json(json!({ "ok": true })).into_response(),
    }
}

/// Fixed starting instant for manual clocks.
#[must_use]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0)
        .single()
        .expect("valid start time")
}

/// Start a storefront context with a manual clock.
///
/// # Panics
///
/// Panics if the context fails to start.
pub async fn storefront(
    config: &StorefrontConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<ManualClock>,
) -> Storefront {
    Storefront::init(config, store, clock)
        .await
        .expect("storefront init")
}

/// A phone case sold per model with two wholesale tiers.
#[must_use]
pub fn phone_case(model: &str, units: u32) -> NewLineItem {
    NewLineItem::new(
        "capa-silicone",
        "Capa Silicone Aveludada",
        Quantity::new(units),
        TierSchedule::retail(Price::from_cents(1_200))
            .with_special(Price::from_cents(900), Quantity::new(10))
            .with_super_wholesale(Price::from_cents(750), Quantity::new(50)),
    )
    .with_model(model, model.to_uppercase())
}

/// A simple product with retail pricing only.
#[must_use]
pub fn charger(units: u32) -> NewLineItem {
    NewLineItem::new(
        "carregador-20w",
        "Carregador USB-C 20W",
        Quantity::new(units),
        TierSchedule::retail(Price::from_cents(2_500)),
    )
}
