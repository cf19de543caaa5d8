mod common;

use common::{payment_notification, TestEnv, BUYER, SELLER, WEBHOOK_SECRET};
use pix_contact_gate::adapters::{InMemoryProfileDirectory, InMemoryTransactionRepository};
use pix_contact_gate::config::CorsOrigins;
use pix_contact_gate::domain::{ExternalReference, PaymentStatus};
use pix_contact_gate::poller::{HttpGateway, Poller, PollerConfig, PollerState};
use pix_contact_gate::ports::TransactionRepository;
use pix_contact_gate::processor::ProcessorClient;
use pix_contact_gate::services::webhook::compute_signature;
use pix_contact_gate::{create_app, AppState, ServiceSettings};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn spawn_app(state: AppState, cors: CorsOrigins) -> String {
    let app = create_app(state, &cors);

    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    format!("http://{}", actual_addr)
}

async fn setup() -> (TestEnv, String) {
    let env = TestEnv::new().await;
    let base_url = spawn_app(env.state.clone(), CorsOrigins::Any).await;
    (env, base_url)
}

async fn create_charge(client: &reqwest::Client, base_url: &str) -> String {
    let res = client
        .post(format!("{}/payments/pix", base_url))
        .json(&json!({ "buyerId": BUYER, "sellerId": SELLER }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    body["paymentId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_reports_store_state() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();

    let res = client.get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");

    env.transactions.set_unavailable(true);
    let res = client.get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_create_charge_accepts_legacy_field_names() {
    let (_env, base_url) = setup().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/payments/pix", base_url))
        .json(&json!({ "clienteId": BUYER, "prestadorId": SELLER }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().contains_key("x-request-id"));
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "pending");
    assert!(body["paymentId"].is_string());
    assert!(body["qrCode"].is_string());
    assert!(body["qrCodeImage"].is_string());
}

#[tokio::test]
async fn test_bad_request_body_is_a_validation_error() {
    let (_env, base_url) = setup().await;
    let client = reqwest::Client::new();

    let res = client
        .post(format!("{}/payments/pix", base_url))
        .json(&json!({ "buyerId": BUYER }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .post(format!("{}/payments/status", base_url))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_processor_outage_is_service_unavailable() {
    let (env, base_url) = setup().await;
    env.processor.set_unavailable(true);

    let res = reqwest::Client::new()
        .post(format!("{}/payments/pix", base_url))
        .json(&json!({ "buyerId": BUYER, "sellerId": SELLER }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "processor_unavailable");
    assert!(env.transactions.is_empty().await);
}

#[tokio::test]
async fn test_status_accepts_numeric_payment_id() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();
    let payment_id = create_charge(&client, &base_url).await;
    env.processor.set_status(&payment_id, PaymentStatus::Approved);

    let numeric: u64 = payment_id.parse().unwrap();
    let res = client
        .post(format!("{}/payments/status", base_url))
        .json(&json!({ "paymentId": numeric }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "approved");
    assert_eq!(body["approved"], true);
    assert_eq!(body["fallback"], false);
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();
    let payment_id = create_charge(&client, &base_url).await;
    env.processor.set_status(&payment_id, PaymentStatus::Approved);
    let body = payment_notification(&payment_id);

    let res = client
        .post(format!("{}/webhooks/payment", base_url))
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let forged = compute_signature("wrong_secret", &body).unwrap();
    let res = client
        .post(format!("{}/webhooks/payment", base_url))
        .header("x-signature", forged)
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let stored = env
        .transactions
        .find_by_external_id(&payment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
}

#[tokio::test]
async fn test_signed_webhook_records_status() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();
    let payment_id = create_charge(&client, &base_url).await;
    env.processor.set_status(&payment_id, PaymentStatus::Approved);

    let body = payment_notification(&payment_id);
    let signature = compute_signature(WEBHOOK_SECRET, &body).unwrap();
    let res = client
        .post(format!("{}/webhooks/payment", base_url))
        .header("x-signature", format!("sha256={}", signature))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let response: Value = res.json().await.unwrap();
    assert_eq!(response["received"], true);
    assert_eq!(response["outcome"], "updated");
}

#[tokio::test]
async fn test_ignored_webhooks_still_answer_ok() {
    let (_env, base_url) = setup().await;
    let client = reqwest::Client::new();

    for body in [
        br#"{"type":"merchant_order","data":{"id":"1"}}"#.to_vec(),
        b"not json".to_vec(),
        payment_notification("31337"),
    ] {
        let signature = compute_signature(WEBHOOK_SECRET, &body).unwrap();
        let res = client
            .post(format!("{}/webhooks/payment", base_url))
            .header("x-signature", signature)
            .body(body)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let response: Value = res.json().await.unwrap();
        assert_eq!(response["outcome"], "ignored");
    }
}

#[tokio::test]
async fn test_webhook_processor_outage_requests_redelivery() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();
    let payment_id = create_charge(&client, &base_url).await;
    env.processor.set_unavailable(true);

    let body = payment_notification(&payment_id);
    let signature = compute_signature(WEBHOOK_SECRET, &body).unwrap();
    let res = client
        .post(format!("{}/webhooks/payment", base_url))
        .header("x-signature", signature)
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_contact_is_gated_on_approval() {
    let (env, base_url) = setup().await;
    let client = reqwest::Client::new();
    let payment_id = create_charge(&client, &base_url).await;

    let res = client
        .post(format!("{}/contact-access", base_url))
        .json(&json!({ "paymentId": payment_id, "sellerId": SELLER }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYMENT_REQUIRED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "payment_required");

    env.processor.set_status(&payment_id, PaymentStatus::Approved);

    let res = client
        .post(format!("{}/contact-access", base_url))
        .json(&json!({ "paymentId": payment_id, "sellerId": "seller-2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .post(format!("{}/contact-access", base_url))
        .json(&json!({ "paymentId": payment_id, "prestadorId": SELLER }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["sellerId"], SELLER);
    assert_eq!(body["whatsappUrl"], "https://wa.me/5511987654321");
}

#[tokio::test]
async fn test_poller_reveals_contact_after_approval() {
    let (env, base_url) = setup().await;
    let gateway = HttpGateway::new(base_url, Duration::from_secs(5));
    let poller = Poller::new(
        Arc::new(gateway),
        PollerConfig {
            interval: Duration::from_millis(50),
            timeout: Duration::from_secs(10),
            ..PollerConfig::default()
        },
    );

    let handle = poller.start(BUYER, SELLER);
    let mut states = handle.subscribe();
    let payment_id = loop {
        if let PollerState::Waiting { payment_id, .. } = &*states.borrow_and_update() {
            break payment_id.clone();
        }
        states.changed().await.unwrap();
    };

    env.processor.set_status(&payment_id, PaymentStatus::Approved);
    handle.check_now();

    let state = tokio::time::timeout(Duration::from_secs(5), handle.wait_terminal())
        .await
        .unwrap();
    match state {
        PollerState::Approved {
            payment_id: approved,
            contact: Some(contact),
        } => {
            assert_eq!(approved, payment_id);
            assert_eq!(contact.seller_id, SELLER);
            assert_eq!(contact.whatsapp_url, "https://wa.me/5511987654321");
        }
        other => panic!("expected approval with contact, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cors_preflight_allows_any_origin_by_default() {
    let (_env, base_url) = setup().await;

    let res = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, format!("{}/payments/status", base_url))
        .header("origin", "https://app.example.com")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert!(res.status().is_success());
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}

#[tokio::test]
async fn test_cors_allow_list_only_echoes_known_origins() {
    let env = TestEnv::new().await;
    let base_url = spawn_app(
        env.state.clone(),
        CorsOrigins::List(vec!["https://app.example.com".to_string()]),
    )
    .await;
    let client = reqwest::Client::new();

    let preflight = |origin: &'static str| {
        client
            .request(reqwest::Method::OPTIONS, format!("{}/payments/pix", base_url))
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .send()
    };

    let res = preflight("https://app.example.com").await.unwrap();
    assert_eq!(
        res.headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://app.example.com")
    );

    let res = preflight("https://evil.example.net").await.unwrap();
    assert!(res.headers().get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_status_against_mocked_processor_api() {
    let mut server = mockito::Server::new_async().await;
    let reference = ExternalReference::new(BUYER, SELLER).encode();
    let _m = server
        .mock("GET", "/v1/payments/1234567")
        .match_header("authorization", "Bearer TEST-token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 1234567,
                "status": "approved",
                "status_detail": "accredited",
                "transaction_amount": 2.0,
                "external_reference": reference,
                "date_created": "2024-05-01T12:00:00.000-03:00",
                "date_approved": "2024-05-01T12:01:10.000-03:00"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let transactions = Arc::new(InMemoryTransactionRepository::new());
    let state = AppState::new(
        Arc::new(ProcessorClient::new(
            server.url(),
            "TEST-token".to_string(),
            Duration::from_secs(5),
        )),
        transactions.clone(),
        Arc::new(InMemoryProfileDirectory::new()),
        ServiceSettings {
            contact_fee: common::contact_fee(),
            notification_url: "https://api.example.com/webhooks/payment".to_string(),
            charge_expiration: chrono::Duration::minutes(30),
            webhook_secret: WEBHOOK_SECRET.to_string(),
        },
    );
    let base_url = spawn_app(state, CorsOrigins::Any).await;

    let res = reqwest::Client::new()
        .post(format!("{}/payments/status", base_url))
        .json(&json!({ "paymentId": "1234567" }))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["approved"], true);
    assert_eq!(transactions.len().await, 1);
}
