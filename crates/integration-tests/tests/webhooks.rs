//! Webhook routing, retry and signing against the mock endpoints.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use atacado_core::{
    ContactUpdate, DeliveryOutcome, WebhookEnvironment, WebhookEventType, WhatsAppNumber,
};
use atacado_integration_tests::{MockBackend, hook_path, start_time, storefront};
use atacado_storefront::Storefront;
use atacado_storefront::clock::ManualClock;
use atacado_storefront::config::StorefrontConfig;
use atacado_storefront::services::webhook::{EVENT_HEADER, SIGNATURE_HEADER, sign};
use atacado_storefront::storage::MemoryStore;
use secrecy::SecretString;
use serde_json::json;

const SECRET: &str = "k7#Qz2!mV9pL4xR8";

fn heartbeat_path(environment: WebhookEnvironment) -> String {
    hook_path(environment, WebhookEventType::AnalyticsHeartbeat)
}

async fn start(config: &StorefrontConfig) -> Storefront {
    storefront(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(ManualClock::new(start_time())),
    )
    .await
}

async fn with_contact(sf: &Storefront) {
    let number = WhatsAppNumber::parse("+55 21 99999-0000").unwrap();
    sf.track_whatsapp_collection(number).await;
}

#[tokio::test]
async fn test_heartbeat_requires_contact() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;

    assert!(sf.send_heartbeat().await.is_none());
    assert!(mock.requests(&heartbeat_path(WebhookEnvironment::Test)).is_empty());

    sf.dispose();
}

#[tokio::test]
async fn test_retries_until_exhausted() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    mock.respond_with(&heartbeat_path(WebhookEnvironment::Test), &[503, 503, 503]);
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    with_contact(&sf).await;

    let outcome = sf.send_heartbeat().await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 3, .. }));
    assert_eq!(mock.requests(&heartbeat_path(WebhookEnvironment::Test)).len(), 3);

    let log = sf.deliveries().await;
    let recorded = log
        .iter()
        .rev()
        .find(|r| r.event == WebhookEventType::AnalyticsHeartbeat)
        .unwrap();
    assert_eq!(recorded.outcome, outcome);

    sf.dispose();
}

#[tokio::test]
async fn test_retry_recovers_after_transient_failure() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    mock.respond_with(&heartbeat_path(WebhookEnvironment::Test), &[500]);
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    with_contact(&sf).await;

    let outcome = sf.send_heartbeat().await.unwrap();
    assert_eq!(
        outcome,
        DeliveryOutcome::Delivered {
            status: 200,
            attempts: 2
        }
    );

    sf.dispose();
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    mock.respond_with(&heartbeat_path(WebhookEnvironment::Test), &[400]);
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    with_contact(&sf).await;

    let outcome = sf.send_heartbeat().await.unwrap();
    assert!(matches!(outcome, DeliveryOutcome::Failed { attempts: 1, .. }));
    assert_eq!(mock.requests(&heartbeat_path(WebhookEnvironment::Test)).len(), 1);

    sf.dispose();
}

#[tokio::test]
async fn test_local_default_skips_without_settings() {
    // No settings served: the settings endpoint answers 404.
    let mock = MockBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    with_contact(&sf).await;

    assert_eq!(sf.send_heartbeat().await, Some(DeliveryOutcome::Skipped));
    assert!(mock.requests(&heartbeat_path(WebhookEnvironment::Test)).is_empty());
    assert!(mock.requests(&heartbeat_path(WebhookEnvironment::Production)).is_empty());

    let routes = sf.webhook_routes().await;
    assert_eq!(routes.len(), WebhookEventType::ALL.len());
    assert!(routes.iter().all(|(_, route)| !route.enabled));

    sf.dispose();
}

#[tokio::test]
async fn test_settings_route_to_production() {
    let mock = MockBackend::start().await;
    mock.set_webhook_settings(json!([
        { "webhookType": "analyticsHeartbeat", "enabled": true, "environment": "production" },
        { "webhookType": "whatsappCollected", "enabled": false, "environment": "test" }
    ]));
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    with_contact(&sf).await;

    let outcome = sf.send_heartbeat().await.unwrap();
    assert!(outcome.is_delivered());
    assert_eq!(
        mock.requests(&heartbeat_path(WebhookEnvironment::Production)).len(),
        1
    );
    assert!(mock.requests(&heartbeat_path(WebhookEnvironment::Test)).is_empty());

    sf.dispose();
}

#[tokio::test]
async fn test_body_is_signed() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    let dir = tempfile::tempdir().unwrap();
    let mut config = mock.config(dir.path());
    config.webhooks.signing_secret = Some(SecretString::from(SECRET));
    let sf = start(&config).await;
    with_contact(&sf).await;

    assert!(sf.send_heartbeat().await.unwrap().is_delivered());

    let sent = mock.requests(&heartbeat_path(WebhookEnvironment::Test));
    let request = sent.first().unwrap();
    let expected = sign(&SecretString::from(SECRET), &request.body).unwrap();
    assert_eq!(request.header(SIGNATURE_HEADER), Some(expected.as_str()));
    assert_eq!(request.header(EVENT_HEADER), Some("analyticsHeartbeat"));
    assert_eq!(request.json()["event"], "analyticsHeartbeat");

    sf.dispose();
}

#[tokio::test]
async fn test_whatsapp_resubmission_sends_once() {
    let mock = MockBackend::start().await;
    mock.enable_all_webhooks(WebhookEnvironment::Test);
    let dir = tempfile::tempdir().unwrap();
    let sf = start(&mock.config(dir.path())).await;
    let path = hook_path(WebhookEnvironment::Test, WebhookEventType::WhatsappCollected);

    let number = WhatsAppNumber::parse("21 99999-0000").unwrap();
    assert_eq!(
        sf.track_whatsapp_collection(number.clone()).await,
        ContactUpdate::Collected
    );
    assert_eq!(
        sf.track_whatsapp_collection(number).await,
        ContactUpdate::Unchanged
    );

    let sent = mock.wait_for(&path, 1).await;
    assert_eq!(sent.len(), 1);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(mock.requests(&path).len(), 1);

    // Editing the number announces it again with the previous one.
    let edited = WhatsAppNumber::parse("21 98888-1111").unwrap();
    assert!(matches!(
        sf.track_whatsapp_collection(edited).await,
        ContactUpdate::Changed { .. }
    ));
    let sent = mock.wait_for(&path, 2).await;
    let body = sent.last().unwrap().json();
    assert_eq!(body["data"]["whatsapp"], "21988881111");
    assert_eq!(body["data"]["previous"], "21999990000");

    sf.dispose();
}

async fn heartbeats(sf: &Storefront) -> usize {
    sf.deliveries()
        .await
        .iter()
        .filter(|r| r.event == WebhookEventType::AnalyticsHeartbeat)
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_loop_sends_once_contact_is_known() {
    let mock = MockBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = mock.config(dir.path());
    config.heartbeat_interval = Some(Duration::from_secs(600));
    let sf = start(&config).await;

    // First tick without a contact sends nothing.
    tokio::time::advance(Duration::from_secs(600)).await;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(heartbeats(&sf).await, 0);

    with_contact(&sf).await;
    for expected in 1..=2 {
        tokio::time::advance(Duration::from_secs(600)).await;
        let mut seen = heartbeats(&sf).await;
        for _ in 0..600 {
            if seen >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
            seen = heartbeats(&sf).await;
        }
        assert_eq!(seen, expected);
    }

    sf.dispose();
}
