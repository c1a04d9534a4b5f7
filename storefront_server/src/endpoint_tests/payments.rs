use actix_web::{http::StatusCode, test::TestRequest};
use gateway_tools::GatewayApiError;
use serde_json::json;
use settlement_engine::{
    db_types::PaymentStatus,
    test_utils::{mock_gateway::captured_payment, webhooks::sign_confirmation},
};

use super::helpers::{bearer, post_json, TestServer, PAYMENT_SECRET};
use crate::auth::Role;

const CREATE_ORDER: &str = "/payments/gateway/create-order";
const VERIFY: &str = "/payments/gateway/verify";

#[actix_web::test]
async fn health() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (status, body) = server.send(TestRequest::get().uri("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn create_order_without_a_token() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order = server.new_order("ORD-100", "alice", 50_000).await;
    let (status, body) = server.send_json(post_json(CREATE_ORDER, json!({ "orderId": order.id }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "authentication");
    assert_eq!(server.gateway.create_order_calls(), 0);
}

#[actix_web::test]
async fn create_order_with_a_bad_token() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order = server.new_order("ORD-101", "alice", 50_000).await;
    let (name, mut value) = bearer("alice", &[Role::User]);
    value.replace_range(value.len() - 6.., "AAAAAA");
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header((name, value));
    let (status, _) = server.send_json(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn create_order() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order = server.new_order("ORD-102", "alice", 50_000).await;
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 50_000);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["key"], "rzp_test_mockkey");
    assert_eq!(body["orderId"], order.id);
    let order = server.reload(order.id).await;
    assert_eq!(order.payment_status, PaymentStatus::Created);
    assert_eq!(body["id"], order.gateway_order_id.unwrap());

    // A second attempt is refused and the gateway is not called again
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "conflict");
    assert_eq!(server.gateway.create_order_calls(), 1);
    assert_eq!(server.reload(order.id).await.payment_status, PaymentStatus::Created);
}

#[actix_web::test]
async fn create_order_for_someone_elses_order() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order = server.new_order("ORD-103", "alice", 50_000).await;
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header(bearer("mallory", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "ownership");
    assert_eq!(server.reload(order.id).await.payment_status, PaymentStatus::Pending);
}

#[actix_web::test]
async fn create_order_edge_cases() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let req = post_json(CREATE_ORDER, json!({ "orderId": 9999 })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let small = server.new_order("ORD-104", "alice", 99).await;
    let req = post_json(CREATE_ORDER, json!({ "orderId": small.id })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let req = post_json(CREATE_ORDER, json!({ "order": "nope" })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[actix_web::test]
async fn create_order_while_the_gateway_is_down() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order = server.new_order("ORD-105", "alice", 50_000).await;
    server.gateway.fail_next(GatewayApiError::Timeout("operation timed out".into()));
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["kind"], "gateway_unavailable");
    let order = server.reload(order.id).await;
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(order.gateway_order_id.is_none());
}

async fn created_order(server: &TestServer, number: &str, amount: i64) -> (i64, String) {
    let order = server.new_order(number, "alice", amount).await;
    let req = post_json(CREATE_ORDER, json!({ "orderId": order.id })).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    (order.id, body["id"].as_str().unwrap().to_string())
}

fn verify_body(order_id: i64, gateway_order_id: &str, payment_id: &str, signature: &str) -> serde_json::Value {
    json!({
        "gateway_order_id": gateway_order_id,
        "gateway_payment_id": payment_id,
        "gateway_signature": signature,
        "orderId": order_id,
    })
}

#[actix_web::test]
async fn verify_payment() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-110", 50_000).await;
    server.gateway.set_payment(captured_payment("pay_110", &gateway_order_id, 50_000));
    let signature = sign_confirmation(PAYMENT_SECRET, &gateway_order_id, "pay_110");
    let req = post_json(VERIFY, verify_body(order_id, &gateway_order_id, "pay_110", &signature))
        .insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["orderId"], order_id);
    assert_eq!(body["status"], "VERIFICATION_PENDING");
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::VerificationPending);
}

#[actix_web::test]
async fn verify_payment_with_a_forged_signature() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-111", 50_000).await;
    server.gateway.set_payment(captured_payment("pay_111", &gateway_order_id, 50_000));
    let signature = sign_confirmation("not-the-key-secret", &gateway_order_id, "pay_111");
    let req = post_json(VERIFY, verify_body(order_id, &gateway_order_id, "pay_111", &signature))
        .insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Created);
}

#[actix_web::test]
async fn verify_payment_with_a_short_payment() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-112", 10_000).await;
    server.gateway.set_payment(captured_payment("pay_112", &gateway_order_id, 9_999));
    let signature = sign_confirmation(PAYMENT_SECRET, &gateway_order_id, "pay_112");
    let req = post_json(VERIFY, verify_body(order_id, &gateway_order_id, "pay_112", &signature))
        .insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "fraud_suspect");
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Created);
}

#[actix_web::test]
async fn verify_someone_elses_payment() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-113", 50_000).await;
    server.gateway.set_payment(captured_payment("pay_113", &gateway_order_id, 50_000));
    let signature = sign_confirmation(PAYMENT_SECRET, &gateway_order_id, "pay_113");
    let req = post_json(VERIFY, verify_body(order_id, &gateway_order_id, "pay_113", &signature))
        .insert_header(bearer("mallory", &[Role::User]));
    let (status, _) = server.send_json(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Created);
}

#[actix_web::test]
async fn payment_summary() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let (order_id, gateway_order_id) = created_order(&server, "ORD-120", 50_000).await;
    let path = format!("/orders/{order_id}/payment");

    let req = TestRequest::get().uri(&path).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_number"], "ORD-120");
    assert_eq!(body["amount"], 50_000);
    assert_eq!(body["payment_status"], "CREATED");
    assert_eq!(body["gateway_order_id"], gateway_order_id);

    let req = TestRequest::get().uri(&path).insert_header(bearer("mallory", &[Role::User]));
    let (status, _) = server.send_json(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = TestRequest::get().uri(&path).insert_header(bearer("support", &[Role::User, Role::Admin]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["order_id"], order_id);

    let req = TestRequest::get().uri("/orders/abc/payment").insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}
