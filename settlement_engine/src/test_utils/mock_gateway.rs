//! An in-process stand-in for the payment gateway.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use gateway_tools::{
    GatewayApiError,
    GatewayOrder,
    GatewayPayment,
    GatewayRefund,
    NewGatewayOrder,
    NewRefund,
    RemotePaymentStatus,
    RemoteRefundStatus,
};
use storefront_common::MinorUnits;

use crate::traits::PaymentGateway;

#[derive(Default)]
struct GatewayState {
    orders: HashMap<String, GatewayOrder>,
    payments: HashMap<String, GatewayPayment>,
    refunds: Vec<(String, NewRefund)>,
    failures: VecDeque<GatewayApiError>,
    order_requests: Vec<NewGatewayOrder>,
    next_id: u64,
}

/// Cloning shares the state, so a test can keep a handle while the API owns another.
#[derive(Clone, Default)]
pub struct MockGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next gateway call, whichever it is, fails with `err`.
    pub fn fail_next(&self, err: GatewayApiError) {
        self.state.lock().unwrap().failures.push_back(err);
    }

    pub fn set_payment(&self, payment: GatewayPayment) {
        self.state.lock().unwrap().payments.insert(payment.id.clone(), payment);
    }

    /// Marks a gateway order as paid on the gateway's side, e.g. when the capture webhook was lost.
    pub fn mark_order_paid(&self, gateway_order_id: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(order) = state.orders.get_mut(gateway_order_id) {
            order.status = "paid".to_string();
            order.amount_paid = order.amount;
            order.amount_due = MinorUnits::from(0);
        }
    }

    pub fn create_order_calls(&self) -> usize {
        self.state.lock().unwrap().order_requests.len()
    }

    pub fn order_requests(&self) -> Vec<NewGatewayOrder> {
        self.state.lock().unwrap().order_requests.clone()
    }

    /// (payment id, request) for every refund issued
    pub fn refunds(&self) -> Vec<(String, NewRefund)> {
        self.state.lock().unwrap().refunds.clone()
    }

    fn take_failure(&self) -> Result<(), GatewayApiError> {
        match self.state.lock().unwrap().failures.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{prefix}_test{:06}", state.next_id)
    }
}

fn not_found(id: &str) -> GatewayApiError {
    GatewayApiError::Rejected {
        status: 400,
        code: "BAD_REQUEST_ERROR".to_string(),
        description: format!("The id provided does not exist: {id}"),
    }
}

/// A captured payment for the given gateway order.
pub fn captured_payment(payment_id: &str, gateway_order_id: &str, amount: i64) -> GatewayPayment {
    GatewayPayment {
        id: payment_id.to_string(),
        order_id: Some(gateway_order_id.to_string()),
        amount: MinorUnits::from(amount),
        currency: "INR".to_string(),
        status: RemotePaymentStatus::Captured,
        method: Some("upi".to_string()),
        captured: true,
        error_code: None,
        error_description: None,
    }
}

impl PaymentGateway for MockGateway {
    fn key_id(&self) -> &str {
        "rzp_test_mockkey"
    }

    async fn create_order(&self, order: &NewGatewayOrder) -> Result<GatewayOrder, GatewayApiError> {
        self.take_failure()?;
        let id = self.next_id("order");
        let remote = GatewayOrder {
            id: id.clone(),
            amount: order.amount,
            amount_paid: MinorUnits::from(0),
            amount_due: order.amount,
            currency: order.currency.clone(),
            receipt: Some(order.receipt.clone()),
            status: "created".to_string(),
            attempts: 0,
        };
        let mut state = self.state.lock().unwrap();
        state.order_requests.push(order.clone());
        state.orders.insert(id, remote.clone());
        Ok(remote)
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayApiError> {
        self.take_failure()?;
        self.state.lock().unwrap().payments.get(payment_id).cloned().ok_or_else(|| not_found(payment_id))
    }

    async fn fetch_order(&self, gateway_order_id: &str) -> Result<GatewayOrder, GatewayApiError> {
        self.take_failure()?;
        self.state.lock().unwrap().orders.get(gateway_order_id).cloned().ok_or_else(|| not_found(gateway_order_id))
    }

    async fn create_refund(&self, payment_id: &str, refund: &NewRefund) -> Result<GatewayRefund, GatewayApiError> {
        self.take_failure()?;
        let id = self.next_id("rfnd");
        self.state.lock().unwrap().refunds.push((payment_id.to_string(), refund.clone()));
        Ok(GatewayRefund {
            id,
            payment_id: payment_id.to_string(),
            amount: refund.amount,
            currency: Some("INR".to_string()),
            status: RemoteRefundStatus::Pending,
        })
    }
}
