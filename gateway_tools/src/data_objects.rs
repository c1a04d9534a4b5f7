use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use storefront_common::MinorUnits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGatewayOrder {
    pub amount: MinorUnits,
    pub currency: String,
    /// Our own reference for the order. The gateway echoes it back, and it shows up in their dashboard.
    pub receipt: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

impl NewGatewayOrder {
    pub fn new(amount: MinorUnits, currency: &str, receipt: &str) -> Self {
        Self { amount, currency: currency.to_string(), receipt: receipt.to_string(), notes: HashMap::new() }
    }

    pub fn with_note(mut self, key: &str, value: &str) -> Self {
        self.notes.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub amount_paid: MinorUnits,
    #[serde(default)]
    pub amount_due: MinorUnits,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    /// `created`, `attempted` or `paid`
    pub status: String,
    #[serde(default)]
    pub attempts: i64,
}

impl GatewayOrder {
    pub fn is_paid(&self) -> bool {
        self.status == "paid"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemotePaymentStatus {
    Created,
    Authorized,
    Captured,
    Refunded,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayPayment {
    pub id: String,
    #[serde(default)]
    pub order_id: Option<String>,
    pub amount: MinorUnits,
    pub currency: String,
    pub status: RemotePaymentStatus,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub captured: bool,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl GatewayPayment {
    pub fn is_captured(&self) -> bool {
        self.status == RemotePaymentStatus::Captured
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefund {
    pub amount: MinorUnits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub notes: HashMap<String, String>,
}

impl NewRefund {
    pub fn new(amount: MinorUnits) -> Self {
        Self { amount, receipt: None, notes: HashMap::new() }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.notes.insert("reason".to_string(), reason.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteRefundStatus {
    Pending,
    Processed,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRefund {
    pub id: String,
    pub payment_id: String,
    pub amount: MinorUnits,
    #[serde(default)]
    pub currency: Option<String>,
    pub status: RemoteRefundStatus,
}
