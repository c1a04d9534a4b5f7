//! # Settlement API
//!
//! [`SettlementApi`](settlement_flow_api::SettlementApi) is the programmatic API of the settlement engine. It is
//! created by supplying a database backend implementing [`SettlementDatabase`](crate::traits::SettlementDatabase), a
//! gateway client implementing [`PaymentGateway`](crate::traits::PaymentGateway), the settlement options, and the
//! event producers that side effects are published on.
//!
//! ```rust,ignore
//! use settlement_engine::{SettlementApi, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let gateway = GatewayApi::new(config)?;
//! let api = SettlementApi::new(db, gateway, options, handlers.producers());
//! let checkout = api.create_gateway_order(order_id, &principal).await?;
//! ```
pub mod errors;
pub mod settlement_flow_api;
pub mod settlement_objects;
