//! # Storage and collaborator contracts
//!
//! The settlement engine is written against these traits rather than a concrete database or HTTP client, so that
//! backends (and test doubles) can be swapped without touching the state machine.
//!
//! * [`SettlementDatabase`] is the order store: lookups by the various identifiers the gateway hands us, plus the
//!   single conditional update primitive every state transition goes through.
//! * [`EventLedger`] is the append-only record of inbound gateway events and the basis of webhook idempotency.
//! * [`CartManagement`] is the small slice of the cart service the settlement flow touches.
//! * [`PaymentGateway`] is the outbound gateway client.
mod cart_management;
mod event_ledger;
mod payment_gateway;
mod settlement_database;

pub use cart_management::CartManagement;
pub use event_ledger::EventLedger;
pub use payment_gateway::PaymentGateway;
pub use settlement_database::{SettlementDatabase, SettlementDbError};
