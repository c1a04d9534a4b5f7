use actix_web::{http::StatusCode, test::TestRequest};
use serde_json::json;
use settlement_engine::{
    db_types::PaymentStatus,
    test_utils::webhooks::{payment_captured_body, payment_failed_body, sign},
    EventLedger,
};

use super::helpers::{bearer, post_json, TestServer, WEBHOOK_SECRET};
use crate::{
    auth::Role,
    routes::{EVENT_ID_HEADER, SIGNATURE_HEADER},
};

const WEBHOOK: &str = "/payments/gateway/webhook";

fn webhook(body: &str, signature: &str, event_id: Option<&str>) -> TestRequest {
    let mut req = TestRequest::post()
        .uri(WEBHOOK)
        .insert_header(("Content-Type", "application/json"))
        .insert_header((SIGNATURE_HEADER, signature.to_string()))
        .set_payload(body.to_string());
    if let Some(id) = event_id {
        req = req.insert_header((EVENT_ID_HEADER, id.to_string()));
    }
    req
}

async fn created_order(server: &TestServer, number: &str, amount: i64) -> (i64, String) {
    let order = server.new_order(number, "alice", amount).await;
    let req = post_json("/payments/gateway/create-order", json!({ "orderId": order.id }))
        .insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    (order.id, body["id"].as_str().unwrap().to_string())
}

#[actix_web::test]
async fn captured_payment_settles_the_order_once() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-200", 50_000).await;
    let body = payment_captured_body("pay_200", &gateway_order_id, 50_000);
    let signature = sign(WEBHOOK_SECRET, &body);

    let (status, ack) = server.send_json(webhook(&body, &signature, Some("evt_200"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["eventId"], "evt_200");
    assert_eq!(ack["duplicate"], false);
    let order = server.reload(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert!(order.paid_at.is_some());
    assert_eq!(order.gateway_payment_id.as_deref(), Some("pay_200"));

    let (status, ack) = server.send_json(webhook(&body, &signature, Some("evt_200"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["duplicate"], true);
    let again = server.reload(order_id).await;
    assert_eq!(again.payment_status, PaymentStatus::Paid);
    assert_eq!(again.paid_at, order.paid_at);

    let event = server.db().fetch_event("evt_200").await.unwrap().unwrap();
    assert_eq!(event.retry_count, 1);
    assert!(event.processed);
}

#[actix_web::test]
async fn tampered_body_is_rejected() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-201", 50_000).await;
    let body = payment_captured_body("pay_201", &gateway_order_id, 50_000);
    let signature = sign(WEBHOOK_SECRET, &body);
    let tampered = format!("{body} ");

    let (status, err) = server.send_json(webhook(&tampered, &signature, Some("evt_201"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["kind"], "validation");
    assert!(server.db().fetch_event("evt_201").await.unwrap().is_none());
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Created);

    let (status, _) = server.send_json(webhook(&body, "", Some("evt_201"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(server.db().fetch_event("evt_201").await.unwrap().is_none());
}

#[actix_web::test]
async fn failures_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-202", 50_000).await;

    // A captured amount that does not match the order is recorded, acknowledged and never applied
    let forged = payment_captured_body("pay_202", &gateway_order_id, 49_999);
    let (status, ack) = server.send_json(webhook(&forged, &sign(WEBHOOK_SECRET, &forged), Some("evt_202a"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Created);
    let event = server.db().fetch_event("evt_202a").await.unwrap().unwrap();
    assert!(event.error.is_some());

    let failed = payment_failed_body("pay_202b", &gateway_order_id, 50_000, "Card declined");
    let (status, _) = server.send_json(webhook(&failed, &sign(WEBHOOK_SECRET, &failed), Some("evt_202b"))).await;
    assert_eq!(status, StatusCode::OK);
    let order = server.reload(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.payment_attempts, 1);
}

#[actix_web::test]
async fn event_id_falls_back_to_a_digest_of_the_body() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let body = r#"{"event":"order.paid","payload":{}}"#;
    let signature = sign(WEBHOOK_SECRET, body);
    let (status, first) = server.send_json(webhook(body, &signature, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, second) = server.send_json(webhook(body, &signature, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["eventId"], second["eventId"]);
    assert_eq!(second["duplicate"], true);
}
