use chrono::Duration;
use log::{debug, trace};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderUpdate, PaymentStatus, RefundGuard, RefundStatus, TransitionGuard},
    traits::SettlementDbError,
};

/// Inserts a new order into the database using the given connection. The order starts out `PENDING`.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, SettlementDbError> {
    let order_number = order.order_number.clone();
    let result = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                amount,
                total,
                currency
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.amount)
    .bind(order.total)
    .bind(order.currency)
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => Ok(order),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            Err(SettlementDbError::OrderAlreadyExists(order_number))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_order_number(
    order_number: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_number = $1")
        .bind(order_number)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_gateway_order_id(
    gateway_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE gateway_order_id = $1")
        .bind(gateway_order_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Returns the most recently updated order carrying the given gateway payment id.
pub async fn fetch_order_by_gateway_payment_id(
    payment_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE gateway_payment_id = $1 ORDER BY updated_at DESC LIMIT 1")
        .bind(payment_id)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_order_by_refund_id(
    refund_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order =
        sqlx::query_as("SELECT * FROM orders WHERE refund_id = $1").bind(refund_id).fetch_optional(conn).await?;
    Ok(order)
}

/// Orders in the given status whose last update is older than `older_than`.
///
/// The cutoff is computed by SQLite itself so that it is compared in the same format `CURRENT_TIMESTAMP` writes.
pub async fn fetch_stale_orders(
    status: PaymentStatus,
    older_than: Duration,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let modifier = format!("-{} seconds", older_than.num_seconds().max(0));
    let orders = sqlx::query_as(
        "SELECT * FROM orders WHERE payment_status = $1 AND updated_at < datetime('now', $2) ORDER BY updated_at ASC",
    )
    .bind(status)
    .bind(modifier)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

/// The compare-and-set primitive for order transitions.
///
/// Builds a single `UPDATE .. WHERE id = ? AND payment_status IN (..) [AND <refund guard>] RETURNING *` statement, so
/// the check and the write cannot be separated by a concurrent writer. Returns `None` when the guard did not hold.
pub async fn update_order_if(
    id: i64,
    guard: &TransitionGuard,
    update: OrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, SettlementDbError> {
    if update.is_empty() {
        debug!("📝️ No fields to update for order {id}. Update request skipped.");
        return Err(SettlementDbError::EmptyUpdate);
    }
    if guard.from.is_empty() {
        return Err(SettlementDbError::DatabaseError("A transition guard needs at least one source status".into()));
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP");
    push_assignments(&mut builder, update);
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" AND payment_status IN (");
    let mut statuses = builder.separated(", ");
    for status in &guard.from {
        statuses.push_bind(*status);
    }
    builder.push(")");
    if let Some(refund_guard) = &guard.refund {
        push_refund_guard(&mut builder, refund_guard);
    }
    builder.push(" RETURNING *");
    trace!("📝️ Executing query: {}", builder.sql());
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    match &order {
        Some(o) => trace!("📝️ Order {id} updated. Status is now {}", o.payment_status),
        None => trace!("📝️ Order {id} did not satisfy the guard {guard:?}. Nothing written."),
    }
    Ok(order)
}

fn push_assignments(builder: &mut QueryBuilder<'_, Sqlite>, update: OrderUpdate) {
    if let Some(status) = update.payment_status {
        builder.push(", payment_status = ").push_bind(status);
    }
    if let Some(gateway_order_id) = update.gateway_order_id {
        builder.push(", gateway_order_id = ").push_bind(gateway_order_id);
    }
    if let Some(amount) = update.amount_if_unset {
        builder.push(", amount = COALESCE(amount, ").push_bind(amount).push(")");
    }
    if let Some(payment_id) = update.gateway_payment_id {
        builder.push(", gateway_payment_id = ").push_bind(payment_id);
    }
    if let Some(signature) = update.gateway_signature {
        builder.push(", gateway_signature = ").push_bind(signature);
    }
    if let Some(method) = update.payment_method {
        builder.push(", payment_method = ").push_bind(method);
    }
    if let Some(paid_at) = update.paid_at {
        builder.push(", paid_at = ").push_bind(paid_at);
    }
    if update.increment_attempts {
        builder.push(", payment_attempts = payment_attempts + 1");
    }
    if !update.metadata.is_empty() {
        // json_set takes any number of path/value pairs. Assigning `metadata` more than once in one statement would
        // silently keep only the last assignment.
        builder.push(", metadata = json_set(metadata");
        for (key, value) in update.metadata {
            builder.push(", ").push_bind(metadata_path(&key));
            builder.push(", ").push_bind(value);
        }
        builder.push(")");
    }
    if let Some(refund_id) = update.refund_id {
        builder.push(", refund_id = ").push_bind(refund_id);
    }
    if let Some(refund_status) = update.refund_status {
        builder.push(", refund_status = ").push_bind(refund_status);
    }
    if let Some(amount) = update.refund_amount {
        builder.push(", refund_amount = ").push_bind(amount);
    }
    if let Some(amount) = update.add_to_total_refunded {
        builder.push(", total_refunded = total_refunded + ").push_bind(amount);
    }
    if let Some(refunded_at) = update.refunded_at {
        builder.push(", refunded_at = ").push_bind(refunded_at);
    }
    match update.refund_error {
        Some(Some(error)) => {
            builder.push(", refund_error = ").push_bind(error);
        },
        Some(None) => {
            builder.push(", refund_error = NULL");
        },
        None => {},
    }
}

fn push_refund_guard(builder: &mut QueryBuilder<'_, Sqlite>, guard: &RefundGuard) {
    match guard {
        RefundGuard::NoneInFlight => {
            builder.push(" AND COALESCE(refund_status, '') != ").push_bind(RefundStatus::Pending);
        },
        RefundGuard::InFlight => {
            builder.push(" AND refund_status = ").push_bind(RefundStatus::Pending);
        },
        RefundGuard::NotYetApplied { refund_id, total_refunded } => {
            builder.push(" AND NOT (COALESCE(refund_id, '') = ").push_bind(refund_id.clone());
            builder.push(" AND COALESCE(refund_status, '') = ").push_bind(RefundStatus::Processed).push(")");
            builder.push(" AND total_refunded = ").push_bind(*total_refunded);
        },
        RefundGuard::MatchesOrPending(refund_id) => {
            builder.push(" AND (COALESCE(refund_id, '') = ").push_bind(refund_id.clone());
            builder.push(" OR COALESCE(refund_status, '') = ").push_bind(RefundStatus::Pending).push(")");
        },
    }
}

/// JSON path for a metadata key, quoted so that keys containing dots or brackets stay a single member.
fn metadata_path(key: &str) -> String {
    let key = key.replace('"', "");
    format!("$.\"{key}\"")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn metadata_paths_are_quoted() {
        assert_eq!(metadata_path("last_failure_reason"), "$.\"last_failure_reason\"");
        assert_eq!(metadata_path("a.b"), "$.\"a.b\"");
        assert_eq!(metadata_path("evil\"key"), "$.\"evilkey\"");
    }
}
