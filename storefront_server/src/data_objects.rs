//! Request and response bodies of the HTTP API. Field names follow what the storefront's checkout page sends and
//! expects, hence the mix of `orderId` and `gateway_*`.
use gateway_tools::RemoteRefundStatus;
use serde::{Deserialize, Serialize};
use settlement_engine::{
    db_types::{PaymentStatus, RefundStatus},
    settlement_objects::{
        ConfirmationResult,
        GatewayCheckout,
        PaymentConfirmation,
        RefundRequest,
        RefundTicket,
        WebhookReceipt,
    },
};
use storefront_common::MinorUnits;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderParams {
    #[serde(rename = "orderId")]
    pub order_id: i64,
}

/// What the checkout page needs to open the gateway's payment form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResponse {
    /// The gateway order id
    pub id: String,
    pub amount: MinorUnits,
    pub currency: String,
    /// The gateway's public key id
    pub key: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
}

impl From<GatewayCheckout> for CheckoutResponse {
    fn from(checkout: GatewayCheckout) -> Self {
        Self {
            id: checkout.gateway_order_id,
            amount: checkout.amount,
            currency: checkout.currency,
            key: checkout.key_id,
            order_id: checkout.order_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyPaymentParams {
    pub gateway_order_id: String,
    pub gateway_payment_id: String,
    pub gateway_signature: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
}

impl From<VerifyPaymentParams> for PaymentConfirmation {
    fn from(params: VerifyPaymentParams) -> Self {
        Self {
            order_id: params.order_id,
            gateway_order_id: params.gateway_order_id,
            gateway_payment_id: params.gateway_payment_id,
            gateway_signature: params.gateway_signature,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "orderId")]
    pub order_id: i64,
    pub status: PaymentStatus,
}

impl From<ConfirmationResult> for VerifyPaymentResponse {
    fn from(result: ConfirmationResult) -> Self {
        Self { success: true, message: result.message, order_id: result.order_id, status: result.status }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    pub event_id: String,
    pub duplicate: bool,
}

impl From<WebhookReceipt> for WebhookAck {
    fn from(receipt: WebhookReceipt) -> Self {
        Self { received: true, event_id: receipt.event_id, duplicate: receipt.duplicate }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundParams {
    /// Minor units. Everything not yet refunded if omitted.
    #[serde(default)]
    pub amount: Option<MinorUnits>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl From<RefundParams> for RefundRequest {
    fn from(params: RefundParams) -> Self {
        Self { amount: params.amount, reason: params.reason }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResponse {
    pub order_id: i64,
    pub refund_id: String,
    pub refund_status: RefundStatus,
    pub gateway_status: RemoteRefundStatus,
    pub amount: MinorUnits,
}

impl From<RefundTicket> for RefundResponse {
    fn from(ticket: RefundTicket) -> Self {
        Self {
            order_id: ticket.order_id,
            refund_id: ticket.refund_id,
            refund_status: ticket.refund_status,
            gateway_status: ticket.gateway_status,
            amount: ticket.amount,
        }
    }
}
