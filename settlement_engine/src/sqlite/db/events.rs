use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{GatewayEvent, NewGatewayEvent};

/// Records the event if its id has never been seen before.
///
/// The insert and the duplicate check are one statement. On conflict the existing row is kept as-is apart from its
/// redelivery counter, and the stored row is returned. The returned flag is `true` if the event already existed.
pub async fn record_if_new(
    event: NewGatewayEvent,
    conn: &mut SqliteConnection,
) -> Result<(GatewayEvent, bool), sqlx::Error> {
    let record: GatewayEvent = sqlx::query_as(
        r#"
            INSERT INTO gateway_events (event_id, event_type, payload) VALUES ($1, $2, $3)
            ON CONFLICT(event_id) DO UPDATE SET retry_count = retry_count + 1
            RETURNING *;
        "#,
    )
    .bind(event.event_id)
    .bind(event.event_type)
    .bind(event.payload)
    .fetch_one(conn)
    .await?;
    let existed = record.retry_count > 0;
    trace!("📬️ Event {} recorded. Redelivery: {existed}", record.event_id);
    Ok((record, existed))
}

/// Claims the event so that its side effects can be run.
///
/// At most one caller gets the row back. An event can be claimed if nobody has claimed it yet, if its last run ended
/// with an error, or if the previous claim is older than `lease_secs` and never finished. Reclaiming an errored event
/// clears its processed flag, so concurrent redeliveries of it cannot both win. An event that was processed cleanly
/// is never handed out again.
pub async fn claim_event(
    event_id: &str,
    lease_secs: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<GatewayEvent>, sqlx::Error> {
    let claimed: Option<GatewayEvent> = sqlx::query_as(
        r#"
            UPDATE gateway_events SET claimed_at = CURRENT_TIMESTAMP, processed = FALSE
            WHERE event_id = $1
              AND NOT (processed = TRUE AND error IS NULL)
              AND (claimed_at IS NULL OR processed = TRUE OR claimed_at < datetime('now', $2))
            RETURNING *;
        "#,
    )
    .bind(event_id)
    .bind(format!("-{lease_secs} seconds"))
    .fetch_optional(conn)
    .await?;
    trace!("📬️ Claim on event {event_id}: {}", if claimed.is_some() { "granted" } else { "refused" });
    Ok(claimed)
}

/// Sets the processed flag and the outcome of the event's side effects. Returns the number of rows affected.
pub async fn mark_processed(
    event_id: &str,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE gateway_events SET processed = TRUE, processed_at = CURRENT_TIMESTAMP, error = $1 WHERE event_id = $2",
    )
    .bind(error)
    .bind(event_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn fetch_event(event_id: &str, conn: &mut SqliteConnection) -> Result<Option<GatewayEvent>, sqlx::Error> {
    let event = sqlx::query_as("SELECT * FROM gateway_events WHERE event_id = $1")
        .bind(event_id)
        .fetch_optional(conn)
        .await?;
    Ok(event)
}

pub async fn count_events(conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM gateway_events").fetch_one(conn).await?;
    Ok(count.0)
}
