use std::{collections::HashMap, fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow, Type};
pub use storefront_common::{MinorUnits, MinorUnitsConversionError};
use thiserror::Error;

//--------------------------------------   PaymentStatus     ---------------------------------------------------------
/// The payment sub-state of an order.
///
/// ```text
///   PENDING ──► CREATED ──► VERIFICATION_PENDING ──► PAID ──► PARTIALLY_REFUNDED ──► REFUNDED
///                  │               │                  ▲  └──────────────────────────────▲
///                  └──────► FAILED ◄┘                  │
///                             └────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// The order exists, but no gateway order has been created for it yet.
    Pending,
    /// A gateway order exists and the customer can pay.
    Created,
    /// The customer's browser reported a successful payment. Advisory only; waiting for the gateway webhook.
    VerificationPending,
    /// The gateway confirmed the capture.
    Paid,
    /// The last payment attempt failed. Not terminal; a later capture still settles the order.
    Failed,
    Refunded,
    PartiallyRefunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Created => "CREATED",
            PaymentStatus::VerificationPending => "VERIFICATION_PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::PartiallyRefunded => "PARTIALLY_REFUNDED",
        }
    }

    /// True once the gateway has confirmed the money was captured, including after (partial) refunds.
    pub fn is_settled(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::Refunded | PaymentStatus::PartiallyRefunded)
    }

    pub fn is_refundable(&self) -> bool {
        matches!(self, PaymentStatus::Paid | PaymentStatus::PartiallyRefunded)
    }
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("Invalid status: {0}")]
pub struct ConversionError(String);

impl FromStr for PaymentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CREATED" => Ok(Self::Created),
            "VERIFICATION_PENDING" => Ok(Self::VerificationPending),
            "PAID" => Ok(Self::Paid),
            "FAILED" => Ok(Self::Failed),
            "REFUNDED" => Ok(Self::Refunded),
            "PARTIALLY_REFUNDED" => Ok(Self::PartiallyRefunded),
            s => Err(ConversionError(s.to_string())),
        }
    }
}

//--------------------------------------    RefundStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "pending"),
            RefundStatus::Processed => write!(f, "processed"),
            RefundStatus::Failed => write!(f, "failed"),
        }
    }
}

//--------------------------------------        Order         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub customer_id: String,
    pub amount: Option<MinorUnits>,
    pub total: f64,
    pub currency: String,
    pub payment_status: PaymentStatus,
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refund_id: Option<String>,
    pub refund_status: Option<RefundStatus>,
    pub refund_amount: Option<MinorUnits>,
    pub total_refunded: MinorUnits,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refund_error: Option<String>,
    pub payment_attempts: i64,
    pub metadata: Json<HashMap<String, String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// The amount every settlement comparison is made against. Rows that predate the integer amount column fall back
    /// to the legacy decimal total.
    pub fn effective_amount(&self) -> Result<MinorUnits, MinorUnitsConversionError> {
        match self.amount {
            Some(amount) => Ok(amount),
            None => {
                let amount = MinorUnits::from_legacy_total(self.total)?;
                debug!("🗃️ Order {} has no amount. Using legacy total {} -> {amount}", self.id, self.total);
                Ok(amount)
            },
        }
    }

    pub fn is_owned_by(&self, customer_id: &str) -> bool {
        self.customer_id == customer_id
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.0.get(key).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub customer_id: String,
    pub amount: Option<MinorUnits>,
    pub total: f64,
    pub currency: String,
}

impl NewOrder {
    pub fn new(order_number: &str, customer_id: &str, amount: MinorUnits, currency: &str) -> Self {
        Self {
            order_number: order_number.to_string(),
            customer_id: customer_id.to_string(),
            amount: Some(amount),
            total: amount.to_major(),
            currency: currency.to_string(),
        }
    }

    /// An order carrying only the decimal total, as written before amounts were stored in minor units.
    pub fn legacy(order_number: &str, customer_id: &str, total: f64, currency: &str) -> Self {
        Self {
            order_number: order_number.to_string(),
            customer_id: customer_id.to_string(),
            amount: None,
            total,
            currency: currency.to_string(),
        }
    }
}

//--------------------------------------     OrderUpdate      ---------------------------------------------------------
/// The set of fields a settlement transition writes. Fields left as `None` are untouched.
#[derive(Debug, Clone, Default)]
pub struct OrderUpdate {
    pub payment_status: Option<PaymentStatus>,
    pub gateway_order_id: Option<String>,
    /// Only written if the stored amount is NULL (legacy rows)
    pub amount_if_unset: Option<MinorUnits>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub payment_method: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub increment_attempts: bool,
    pub metadata: Vec<(String, String)>,
    pub refund_id: Option<String>,
    pub refund_status: Option<RefundStatus>,
    pub refund_amount: Option<MinorUnits>,
    pub add_to_total_refunded: Option<MinorUnits>,
    pub refunded_at: Option<DateTime<Utc>>,
    /// `Some(None)` clears the column
    pub refund_error: Option<Option<String>>,
}

impl OrderUpdate {
    pub fn with_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn with_gateway_order(mut self, gateway_order_id: &str, amount: MinorUnits) -> Self {
        self.gateway_order_id = Some(gateway_order_id.to_string());
        self.amount_if_unset = Some(amount);
        self
    }

    pub fn with_confirmation(mut self, payment_id: &str, signature: &str) -> Self {
        self.gateway_payment_id = Some(payment_id.to_string());
        self.gateway_signature = Some(signature.to_string());
        self
    }

    pub fn with_capture(mut self, payment_id: &str, method: Option<String>, paid_at: DateTime<Utc>) -> Self {
        self.gateway_payment_id = Some(payment_id.to_string());
        self.payment_method = method;
        self.paid_at = Some(paid_at);
        self
    }

    pub fn increment_attempts(mut self) -> Self {
        self.increment_attempts = true;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_refund_status(mut self, status: RefundStatus) -> Self {
        self.refund_status = Some(status);
        self
    }

    pub fn with_refund_id(mut self, refund_id: &str) -> Self {
        self.refund_id = Some(refund_id.to_string());
        self
    }

    pub fn with_refund_settled(mut self, amount: MinorUnits, refunded_at: DateTime<Utc>) -> Self {
        self.refund_status = Some(RefundStatus::Processed);
        self.refund_amount = Some(amount);
        self.add_to_total_refunded = Some(amount);
        self.refunded_at = Some(refunded_at);
        self.refund_error = Some(None);
        self
    }

    pub fn with_refund_error(mut self, error: Option<String>) -> Self {
        self.refund_error = Some(error);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.payment_status.is_none() &&
            self.gateway_order_id.is_none() &&
            self.amount_if_unset.is_none() &&
            self.gateway_payment_id.is_none() &&
            self.gateway_signature.is_none() &&
            self.payment_method.is_none() &&
            self.paid_at.is_none() &&
            !self.increment_attempts &&
            self.metadata.is_empty() &&
            self.refund_id.is_none() &&
            self.refund_status.is_none() &&
            self.refund_amount.is_none() &&
            self.add_to_total_refunded.is_none() &&
            self.refunded_at.is_none() &&
            self.refund_error.is_none()
    }
}

//--------------------------------------   TransitionGuard    ---------------------------------------------------------
/// Extra conditions on the refund columns that must hold for a conditional update to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundGuard {
    /// No refund is currently waiting on the gateway.
    NoneInFlight,
    /// A refund is waiting on the gateway.
    InFlight,
    /// The given refund has not been applied yet, and the cumulative refunded total is still the given value.
    NotYetApplied { refund_id: String, total_refunded: MinorUnits },
    /// The refund on record is the given one, or a refund is waiting on the gateway and has not been identified yet.
    MatchesOrPending(String),
}

/// The compare half of a compare-and-set order update: the set of statuses the order must currently be in, and an
/// optional refund condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionGuard {
    pub from: Vec<PaymentStatus>,
    pub refund: Option<RefundGuard>,
}

impl TransitionGuard {
    pub fn from_status(from: &[PaymentStatus]) -> Self {
        Self { from: from.to_vec(), refund: None }
    }

    pub fn with_refund_guard(mut self, guard: RefundGuard) -> Self {
        self.refund = Some(guard);
        self
    }
}

//--------------------------------------     GatewayEvent     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct GatewayEvent {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    /// The request body exactly as it was received
    pub payload: String,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// How many times this event was delivered again after the first time
    pub retry_count: i64,
    pub created_at: DateTime<Utc>,
    /// When a delivery last took the right to run this event's side effects
    pub claimed_at: Option<DateTime<Utc>>,
}

impl GatewayEvent {
    /// Side effects ran to completion. Redeliveries of this event are no-ops.
    pub fn is_settled(&self) -> bool {
        self.processed && self.error.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct NewGatewayEvent {
    pub event_id: String,
    pub event_type: String,
    pub payload: String,
}

impl NewGatewayEvent {
    pub fn new(event_id: &str, event_type: &str, payload: String) -> Self {
        Self { event_id: event_id.to_string(), event_type: event_type.to_string(), payload }
    }
}

//--------------------------------------       CartItem       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct CartItem {
    pub id: i64,
    pub customer_id: String,
    pub sku: String,
    pub quantity: i64,
    pub added_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_names_round_trip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Created,
            PaymentStatus::VerificationPending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
            PaymentStatus::Refunded,
            PaymentStatus::PartiallyRefunded,
        ] {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
        assert!("paid".parse::<PaymentStatus>().is_err());
        let json = serde_json::to_string(&PaymentStatus::VerificationPending).unwrap();
        assert_eq!(json, "\"VERIFICATION_PENDING\"");
    }

    #[test]
    fn settled_states() {
        assert!(PaymentStatus::Paid.is_settled());
        assert!(PaymentStatus::PartiallyRefunded.is_settled());
        assert!(!PaymentStatus::Failed.is_settled());
        assert!(!PaymentStatus::VerificationPending.is_settled());
        assert!(PaymentStatus::PartiallyRefunded.is_refundable());
        assert!(!PaymentStatus::Refunded.is_refundable());
    }

    #[test]
    fn new_order_keeps_total_in_sync() {
        let order = NewOrder::new("ORD-1", "cust-1", MinorUnits::from(123456), "INR");
        assert_eq!(order.total, 1234.56);
        let legacy = NewOrder::legacy("ORD-2", "cust-1", 99.5, "INR");
        assert!(legacy.amount.is_none());
    }

    #[test]
    fn empty_update() {
        assert!(OrderUpdate::default().is_empty());
        assert!(!OrderUpdate::default().increment_attempts().is_empty());
        assert!(!OrderUpdate::default().with_refund_error(None).is_empty());
    }
}
