use actix_web::{http::StatusCode, test::TestRequest};
use gateway_tools::GatewayApiError;
use serde_json::json;
use settlement_engine::{
    db_types::{PaymentStatus, RefundStatus},
    test_utils::webhooks::{payment_captured_body, refund_processed_body, sign},
};

use super::helpers::{bearer, post_json, TestServer, WEBHOOK_SECRET};
use crate::{auth::Role, routes::SIGNATURE_HEADER};

async fn deliver(server: &TestServer, body: &str) {
    let req = TestRequest::post()
        .uri("/payments/gateway/webhook")
        .insert_header((SIGNATURE_HEADER, sign(WEBHOOK_SECRET, body)))
        .set_payload(body.to_string());
    let (status, _) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
}

/// A paid order for `amount`. Returns the order id.
async fn paid_order(server: &TestServer, number: &str, amount: i64) -> i64 {
    let order = server.new_order(number, "alice", amount).await;
    let req = post_json("/payments/gateway/create-order", json!({ "orderId": order.id }))
        .insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    let gateway_order_id = body["id"].as_str().unwrap().to_string();
    deliver(server, &payment_captured_body(&format!("pay_{number}"), &gateway_order_id, amount)).await;
    assert_eq!(server.reload(order.id).await.payment_status, PaymentStatus::Paid);
    order.id
}

#[actix_web::test]
async fn only_admins_can_refund() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order_id = paid_order(&server, "ORD-300", 50_000).await;
    let path = format!("/orders/{order_id}/refund");

    let (status, body) = server.send_json(post_json(&path, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "authentication");

    let req = post_json(&path, json!({})).insert_header(bearer("alice", &[Role::User]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "forbidden");
    assert!(server.gateway.refunds().is_empty());
}

#[actix_web::test]
async fn partial_then_full_refund() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order_id = paid_order(&server, "ORD-301", 50_000).await;
    let path = format!("/orders/{order_id}/refund");

    let req = post_json(&path, json!({ "amount": 20_000, "reason": "Damaged item" }))
        .insert_header(bearer("support", &[Role::User, Role::Admin]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["orderId"], order_id);
    assert_eq!(body["refundStatus"], "pending");
    assert_eq!(body["amount"], 20_000);
    let refund_id = body["refundId"].as_str().unwrap().to_string();
    // Nothing moves until the gateway says so
    let order = server.reload(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.refund_status, Some(RefundStatus::Pending));

    // A second refund while the first is in flight is refused
    let req = post_json(&path, json!({ "amount": 1_000 })).insert_header(bearer("support", &[Role::Admin]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "conflict");

    deliver(&server, &refund_processed_body(&refund_id, "pay_ORD-301", 20_000)).await;
    let order = server.reload(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::PartiallyRefunded);
    assert_eq!(order.total_refunded.value(), 20_000);

    // No amount means whatever is left
    let req = post_json(&path, json!({})).insert_header(bearer("support", &[Role::Admin]));
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"], 30_000);
    let refund_id = body["refundId"].as_str().unwrap().to_string();
    deliver(&server, &refund_processed_body(&refund_id, "pay_ORD-301", 30_000)).await;
    assert_eq!(server.reload(order_id).await.payment_status, PaymentStatus::Refunded);
}

#[actix_web::test]
async fn refund_edge_cases() {
    let _ = env_logger::try_init().ok();
    let server = TestServer::new().await;
    let order_id = paid_order(&server, "ORD-302", 50_000).await;
    let path = format!("/orders/{order_id}/refund");
    let admin = || bearer("support", &[Role::Admin]);

    let (status, body) = server.send_json(post_json(&path, json!({ "amount": 60_000 })).insert_header(admin())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    server.gateway.fail_next(GatewayApiError::Rejected {
        status: 400,
        code: "BAD_REQUEST_ERROR".into(),
        description: "The payment has been fully refunded already".into(),
    });
    let (status, body) = server.send_json(post_json(&path, json!({})).insert_header(admin())).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["kind"], "gateway_rejected");
    let order = server.reload(order_id).await;
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.refund_status, Some(RefundStatus::Failed));

    let unpaid = server.new_order("ORD-303", "alice", 50_000).await;
    let req = post_json(&format!("/orders/{}/refund", unpaid.id), json!({})).insert_header(admin());
    let (status, body) = server.send_json(req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "conflict");

    let (status, _) = server.send_json(post_json("/orders/424242/refund", json!({})).insert_header(admin())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
