use chrono::Duration;

use crate::{
    db_types::{GatewayEvent, NewGatewayEvent},
    traits::SettlementDbError,
};

/// The append-only ledger of inbound gateway events.
#[allow(async_fn_in_trait)]
pub trait EventLedger {
    /// Inserts the event if its `event_id` has never been seen, atomically. If it has, the existing record is returned
    /// (with its redelivery counter bumped) and the second value is `true`.
    ///
    /// A duplicate is not an error. Whether side effects must be run again depends on the returned record's
    /// `processed`/`error` fields.
    async fn record_if_new(&self, event: NewGatewayEvent) -> Result<(GatewayEvent, bool), SettlementDbError>;

    /// Takes the exclusive right to run the event's side effects. Returns `None` if the event was already processed
    /// cleanly, or if another delivery holds a claim younger than `lease`.
    async fn claim_event(&self, event_id: &str, lease: Duration) -> Result<Option<GatewayEvent>, SettlementDbError>;

    /// Marks the event as processed, with the error that stopped its side effects, if any. Always succeeds and may be
    /// called any number of times; the last call wins.
    async fn mark_processed(&self, event_id: &str, error: Option<&str>) -> Result<(), SettlementDbError>;

    async fn fetch_event(&self, event_id: &str) -> Result<Option<GatewayEvent>, SettlementDbError>;

    /// Total number of recorded events. Diagnostics only.
    async fn count_events(&self) -> Result<i64, SettlementDbError>;
}
