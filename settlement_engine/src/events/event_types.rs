use serde::Serialize;

use crate::db_types::{MinorUnits, Order};

/// The gateway confirmed the capture and the order moved to `PAID`. Emitted exactly once per order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// The customer reported a successful payment and the claim checked out against the gateway. The order is not paid
/// yet, but the customer's cart can be emptied.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentConfirmedEvent {
    pub order: Order,
}

impl PaymentConfirmedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentFailedEvent {
    pub order: Order,
    pub reason: String,
    /// The order amount is above the configured threshold, so the operators want to hear about it.
    pub high_value: bool,
}

impl PaymentFailedEvent {
    pub fn new(order: Order, reason: &str, high_value: bool) -> Self {
        Self { order, reason: reason.to_string(), high_value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundProcessedEvent {
    pub order: Order,
    pub refund_id: String,
    pub amount: MinorUnits,
}

impl RefundProcessedEvent {
    pub fn new(order: Order, refund_id: &str, amount: MinorUnits) -> Self {
        Self { order, refund_id: refund_id.to_string(), amount }
    }
}

/// The gateway's record of a payment disagrees with our order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FraudAlertEvent {
    pub order_id: i64,
    pub order_number: String,
    /// Where the mismatch was detected, e.g. "client confirmation" or "webhook"
    pub context: String,
    pub expected: MinorUnits,
    pub reported: MinorUnits,
    pub expected_currency: String,
    pub reported_currency: String,
}

impl FraudAlertEvent {
    pub fn for_order(order: &Order, context: &str, expected: MinorUnits, reported: MinorUnits, currency: &str) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            context: context.to_string(),
            expected,
            reported,
            expected_currency: order.currency.clone(),
            reported_currency: currency.to_string(),
        }
    }
}

/// Something an operator needs to look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorAlertEvent {
    pub subject: String,
    pub message: String,
    pub order_id: Option<i64>,
}

impl OperatorAlertEvent {
    pub fn new(subject: &str, message: &str, order_id: Option<i64>) -> Self {
        Self { subject: subject.to_string(), message: message.to_string(), order_id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    PaymentConfirmed(PaymentConfirmedEvent),
    PaymentFailed(PaymentFailedEvent),
    RefundProcessed(RefundProcessedEvent),
    FraudAlert(FraudAlertEvent),
    OperatorAlert(OperatorAlertEvent),
}
