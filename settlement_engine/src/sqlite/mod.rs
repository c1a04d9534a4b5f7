//! SQLite backend for the settlement engine.
//!
//! [`SqliteDatabase`] implements the order store, the gateway event ledger and the cart operations on top of a single
//! connection pool. The low-level queries live in [`db`].
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
