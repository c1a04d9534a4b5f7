use chrono::{DateTime, Utc};
use gateway_tools::RemoteRefundStatus;
use serde::{Deserialize, Serialize};
use storefront_common::Secret;

use crate::db_types::{MinorUnits, Order, PaymentStatus, RefundStatus};

/// Settings for [`SettlementApi`](crate::SettlementApi). Built once at startup.
#[derive(Debug, Clone)]
pub struct SettlementOptions {
    /// Key for client payment confirmation signatures (the gateway API key secret)
    pub payment_secret: Secret<String>,
    /// Key for webhook signatures
    pub webhook_secret: Secret<String>,
    /// Gateway orders below this amount are refused before calling the gateway
    pub min_amount: MinorUnits,
    /// Failed payments for orders above this amount are escalated to operators
    pub high_value_threshold: MinorUnits,
}

impl SettlementOptions {
    pub fn new(
        payment_secret: Secret<String>,
        webhook_secret: Secret<String>,
        high_value_threshold: MinorUnits,
    ) -> Self {
        Self { payment_secret, webhook_secret, min_amount: MinorUnits::from(100), high_value_threshold }
    }

    pub fn with_min_amount(mut self, min_amount: MinorUnits) -> Self {
        self.min_amount = min_amount;
        self
    }
}

/// Who is asking. Customer-facing flows only operate on the caller's own orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub customer_id: String,
    pub is_admin: bool,
}

impl Principal {
    pub fn customer(customer_id: &str) -> Self {
        Self { customer_id: customer_id.to_string(), is_admin: false }
    }

    pub fn admin(customer_id: &str) -> Self {
        Self { customer_id: customer_id.to_string(), is_admin: true }
    }
}

/// What the checkout page needs to open the gateway's payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayCheckout {
    pub order_id: i64,
    pub gateway_order_id: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub key_id: String,
}

/// The customer's browser hands this back after the gateway's payment form reports success.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentConfirmation {
    pub order_id: i64,
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmationResult {
    pub order_id: i64,
    pub status: PaymentStatus,
    /// The order had already been settled (usually by the webhook), so nothing was written
    pub already_settled: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RefundRequest {
    /// Defaults to everything not yet refunded
    #[serde(default)]
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl RefundRequest {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn partial(amount: MinorUnits) -> Self {
        Self { amount: Some(amount), reason: None }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }
}

/// The result of issuing a refund. The order's payment status is untouched until the gateway's refund webhook arrives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundTicket {
    pub order_id: i64,
    pub refund_id: String,
    pub refund_status: RefundStatus,
    /// What the gateway said in its synchronous response. Informational only.
    pub gateway_status: RemoteRefundStatus,
    pub amount: MinorUnits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The event was applied. The order's payment status is now this
    Applied(PaymentStatus),
    /// The event was valid but there was nothing to do
    NoOp(String),
    /// Event types we do not act on
    Ignored,
    /// Side effects failed; recorded on the ledger entry
    Failed(String),
}

impl WebhookOutcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            WebhookOutcome::Failed(e) => Some(e.as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookReceipt {
    pub event_id: String,
    pub event_type: String,
    /// A delivery of an event that had already been settled. Nothing was re-applied.
    pub duplicate: bool,
    pub outcome: WebhookOutcome,
}

/// The payment-facing view of an order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentSummary {
    pub order_id: i64,
    pub order_number: String,
    pub amount: MinorUnits,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_attempts: i64,
    pub refund_status: Option<RefundStatus>,
    pub total_refunded: MinorUnits,
}

impl PaymentSummary {
    pub fn new(order: &Order, amount: MinorUnits) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            amount,
            currency: order.currency.clone(),
            payment_status: order.payment_status,
            gateway_order_id: order.gateway_order_id.clone(),
            gateway_payment_id: order.gateway_payment_id.clone(),
            payment_method: order.payment_method.clone(),
            paid_at: order.paid_at,
            payment_attempts: order.payment_attempts,
            refund_status: order.refund_status,
            total_refunded: order.total_refunded,
        }
    }
}

/// An order that has been waiting on its webhook for too long, and what the gateway currently says about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleVerification {
    pub order_id: i64,
    pub gateway_order_id: Option<String>,
    /// `None` if the gateway could not be asked
    pub remote_status: Option<String>,
    pub remote_paid: bool,
}
