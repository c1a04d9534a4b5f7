//! Parsing for the gateway's webhook envelope.
//!
//! ```json
//! {
//!   "entity": "event",
//!   "event": "payment.captured",
//!   "contains": ["payment"],
//!   "payload": { "payment": { "entity": { "id": "pay_...", "order_id": "order_...", "amount": 50000, ... } } },
//!   "created_at": 1567674606
//! }
//! ```
use std::fmt::Display;

use gateway_tools::{GatewayOrder, GatewayPayment, GatewayRefund};
use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEnvelope {
    /// Not all deliveries carry an id in the body. See [`resolve_event_id`].
    #[serde(default)]
    pub id: Option<String>,
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl WebhookEnvelope {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn event_type(&self) -> WebhookEventType {
        WebhookEventType::from(self.event.as_str())
    }

    pub fn payment(&self) -> Option<&GatewayPayment> {
        self.payload.payment.as_ref().map(|p| &p.entity)
    }

    pub fn refund(&self) -> Option<&GatewayRefund> {
        self.payload.refund.as_ref().map(|r| &r.entity)
    }

    pub fn order(&self) -> Option<&GatewayOrder> {
        self.payload.order.as_ref().map(|o| &o.entity)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub payment: Option<Entity<GatewayPayment>>,
    #[serde(default)]
    pub refund: Option<Entity<GatewayRefund>>,
    #[serde(default)]
    pub order: Option<Entity<GatewayOrder>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Entity<T> {
    pub entity: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    PaymentCaptured,
    PaymentFailed,
    RefundProcessed,
    RefundFailed,
    Other(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "payment.captured" => Self::PaymentCaptured,
            "payment.failed" => Self::PaymentFailed,
            "refund.processed" => Self::RefundProcessed,
            "refund.failed" => Self::RefundFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PaymentCaptured => write!(f, "payment.captured"),
            Self::PaymentFailed => write!(f, "payment.failed"),
            Self::RefundProcessed => write!(f, "refund.processed"),
            Self::RefundFailed => write!(f, "refund.failed"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// The ledger key for a delivery: the gateway's event id header if present, otherwise the id in the body, otherwise a
/// digest of the body. Redeliveries of the same event carry the same bytes, so the digest is stable across them.
pub fn resolve_event_id(header_hint: Option<&str>, envelope_id: Option<&str>, body: &[u8]) -> String {
    let non_blank = |s: &&str| !s.trim().is_empty();
    if let Some(id) = header_hint.filter(non_blank) {
        return id.trim().to_string();
    }
    if let Some(id) = envelope_id.filter(non_blank) {
        return id.trim().to_string();
    }
    format!("sha256:{}", hex::encode(Sha256::digest(body)))
}
