//! Builders for signed gateway webhook bodies.
use serde_json::json;

use crate::helpers::{calculate_signature, confirmation_message};

pub fn payment_captured_body(payment_id: &str, gateway_order_id: &str, amount: i64) -> String {
    payment_event("payment.captured", payment_id, gateway_order_id, amount, "captured", None)
}

pub fn payment_failed_body(payment_id: &str, gateway_order_id: &str, amount: i64, reason: &str) -> String {
    payment_event("payment.failed", payment_id, gateway_order_id, amount, "failed", Some(reason))
}

pub fn refund_processed_body(refund_id: &str, payment_id: &str, amount: i64) -> String {
    refund_event("refund.processed", refund_id, payment_id, amount, "processed")
}

pub fn refund_failed_body(refund_id: &str, payment_id: &str, amount: i64) -> String {
    refund_event("refund.failed", refund_id, payment_id, amount, "failed")
}

pub fn sign(secret: &str, body: &str) -> String {
    calculate_signature(secret.as_bytes(), body.as_bytes())
}

/// The signature the gateway hands the browser after a successful payment.
pub fn sign_confirmation(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    let message = confirmation_message(gateway_order_id, payment_id);
    calculate_signature(secret.as_bytes(), message.as_bytes())
}

fn payment_event(
    event: &str,
    payment_id: &str,
    gateway_order_id: &str,
    amount: i64,
    status: &str,
    reason: Option<&str>,
) -> String {
    json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": event,
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": payment_id,
                    "entity": "payment",
                    "amount": amount,
                    "currency": "INR",
                    "status": status,
                    "order_id": gateway_order_id,
                    "method": "card",
                    "captured": status == "captured",
                    "error_code": reason.map(|_| "BAD_REQUEST_ERROR"),
                    "error_description": reason,
                }
            }
        },
        "created_at": 1717200000
    })
    .to_string()
}

fn refund_event(event: &str, refund_id: &str, payment_id: &str, amount: i64, status: &str) -> String {
    json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": event,
        "contains": ["refund", "payment"],
        "payload": {
            "refund": {
                "entity": {
                    "id": refund_id,
                    "entity": "refund",
                    "amount": amount,
                    "currency": "INR",
                    "payment_id": payment_id,
                    "status": status,
                }
            }
        },
        "created_at": 1717200000
    })
    .to_string()
}
