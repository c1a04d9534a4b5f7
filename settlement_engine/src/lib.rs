//! Settlement Engine
//!
//! The settlement engine reconciles an order's payment state against an external payment gateway. Its inputs are
//! untrusted: browsers may lie about payments, and webhooks may arrive twice, late, or before the browser does. The
//! engine keeps the order store correct regardless.
//!
//! The library is divided into these sections:
//! 1. Storage contracts ([`mod@traits`]) and the SQLite backend that implements them ([`SqliteDatabase`]). The data
//!    types stored in the database are defined in [`mod@db_types`].
//! 2. The settlement API ([`SettlementApi`]), which drives every payment state transition: gateway order creation,
//!    client confirmation, webhooks and refunds.
//! 3. Signature checks and webhook parsing ([`mod@helpers`]).
//!
//! The engine also publishes events when an order is paid, a payment fails, a refund lands, or something looks wrong.
//! A simple actor framework ([`mod@events`]) lets you hook into these events and perform custom actions, such as
//! sending emails, without holding up the settlement itself.
pub mod db_types;
pub mod events;
pub mod helpers;
mod settlement_api;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use settlement_api::{
    errors::{ErrorKind, SettlementError},
    settlement_flow_api::SettlementApi,
    settlement_objects,
};
#[cfg(feature = "sqlite")]
pub use sqlite::{db::SQLITE_DB_URL, SqliteDatabase};
pub use traits::{CartManagement, EventLedger, PaymentGateway, SettlementDatabase, SettlementDbError};
