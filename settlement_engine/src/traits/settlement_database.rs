use chrono::Duration;
use thiserror::Error;

use crate::{
    db_types::{NewOrder, Order, OrderUpdate, PaymentStatus, TransitionGuard},
    traits::EventLedger,
};

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Could not run database migrations: {0}")]
    MigrationError(String),
    #[error("Cannot insert order, since order number {0} already exists")]
    OrderAlreadyExists(String),
    #[error("The requested order update is empty. Nothing to do.")]
    EmptyUpdate,
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}

/// This trait defines the order store behaviour needed by the settlement engine.
///
/// Every change to an order's payment state goes through [`SettlementDatabase::update_order_if`]. Implementations MUST
/// perform the guard check and the write as one atomic statement; a read followed by a separate write reintroduces the
/// races between client confirmation and webhook delivery that the guard exists to close.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + EventLedger {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a brand-new order with status `PENDING`. Fails with [`SettlementDbError::OrderAlreadyExists`] if the
    /// order number is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementDbError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_order_number(&self, order_number: &str) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_gateway_order_id(&self, gateway_order_id: &str)
        -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_gateway_payment_id(&self, payment_id: &str) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_refund_id(&self, refund_id: &str) -> Result<Option<Order>, SettlementDbError>;

    /// Compare-and-set. Applies `update` to order `id` only if the order currently satisfies `guard`.
    ///
    /// Returns the updated order, or `None` if the order does not exist or the guard did not hold. Callers that get
    /// `None` back should re-read the order to decide whether that is a conflict or an idempotent no-op.
    async fn update_order_if(
        &self,
        id: i64,
        guard: &TransitionGuard,
        update: OrderUpdate,
    ) -> Result<Option<Order>, SettlementDbError>;

    /// Orders that have been sitting in `status` without any update for longer than `older_than`.
    async fn fetch_stale_orders(
        &self,
        status: PaymentStatus,
        older_than: Duration,
    ) -> Result<Vec<Order>, SettlementDbError>;

    /// Closes the database connection pool.
    async fn close(&mut self) -> Result<(), SettlementDbError>;
}
