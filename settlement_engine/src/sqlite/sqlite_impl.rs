//! `SqliteDatabase` is the concrete backend of the settlement engine.
//!
//! It uses SQLite for storage and implements all the traits defined in the [`traits`](crate::traits) module.
use std::fmt::Debug;

use chrono::Duration;
use log::*;
use sqlx::SqlitePool;

use super::db::{carts, events, new_pool, orders};
use crate::{
    db_types::{
        CartItem,
        GatewayEvent,
        NewGatewayEvent,
        NewOrder,
        Order,
        OrderUpdate,
        PaymentStatus,
        TransitionGuard,
    },
    traits::{CartManagement, EventLedger, SettlementDatabase, SettlementDbError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::insert_order(order, &mut conn).await?;
        debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_number, order.id);
        Ok(order)
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_id(id, &mut conn).await?)
    }

    async fn fetch_order_by_order_number(&self, order_number: &str) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_order_number(order_number, &mut conn).await?)
    }

    async fn fetch_order_by_gateway_order_id(
        &self,
        gateway_order_id: &str,
    ) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_gateway_order_id(gateway_order_id, &mut conn).await?)
    }

    async fn fetch_order_by_gateway_payment_id(&self, payment_id: &str) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_gateway_payment_id(payment_id, &mut conn).await?)
    }

    async fn fetch_order_by_refund_id(&self, refund_id: &str) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_refund_id(refund_id, &mut conn).await?)
    }

    async fn update_order_if(
        &self,
        id: i64,
        guard: &TransitionGuard,
        update: OrderUpdate,
    ) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = orders::update_order_if(id, guard, update, &mut conn).await?;
        if let Some(order) = &result {
            debug!("🗃️ Order {id} is now {}", order.payment_status);
        }
        Ok(result)
    }

    async fn fetch_stale_orders(
        &self,
        status: PaymentStatus,
        older_than: Duration,
    ) -> Result<Vec<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_stale_orders(status, older_than, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}

impl EventLedger for SqliteDatabase {
    async fn record_if_new(&self, event: NewGatewayEvent) -> Result<(GatewayEvent, bool), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let (record, existed) = events::record_if_new(event, &mut conn).await?;
        if existed {
            info!("🗃️ Gateway event {} has been delivered {} times", record.event_id, record.retry_count + 1);
        }
        Ok((record, existed))
    }

    async fn claim_event(&self, event_id: &str, lease: Duration) -> Result<Option<GatewayEvent>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::claim_event(event_id, lease.num_seconds(), &mut conn).await?)
    }

    async fn mark_processed(&self, event_id: &str, error: Option<&str>) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let n = events::mark_processed(event_id, error, &mut conn).await?;
        if n == 0 {
            warn!("🗃️ Tried to mark gateway event {event_id} as processed, but it is not in the ledger");
        }
        Ok(())
    }

    async fn fetch_event(&self, event_id: &str) -> Result<Option<GatewayEvent>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::fetch_event(event_id, &mut conn).await?)
    }

    async fn count_events(&self) -> Result<i64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(events::count_events(&mut conn).await?)
    }
}

impl CartManagement for SqliteDatabase {
    async fn add_cart_item(&self, customer_id: &str, sku: &str, quantity: i64) -> Result<CartItem, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carts::add_item(customer_id, sku, quantity, &mut conn).await?)
    }

    async fn fetch_cart(&self, customer_id: &str) -> Result<Vec<CartItem>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(carts::fetch_cart(customer_id, &mut conn).await?)
    }

    async fn clear_cart(&self, customer_id: &str) -> Result<u64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let n = carts::clear_cart(customer_id, &mut conn).await?;
        debug!("🗃️ Removed {n} cart lines for customer {customer_id}");
        Ok(n)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementDbError> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start.
    pub async fn migrate(&self) -> Result<(), SettlementDbError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementDbError::MigrationError(e.to_string()))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
