//! # Storefront payment server
//! The HTTP face of the settlement engine. It is responsible for:
//! * Opening gateway orders for checkout, with the amount taken from the order store.
//! * Accepting the customer's payment confirmation (advisory only).
//! * Receiving the gateway's signed webhooks, which are the only thing that settles an order.
//! * Issuing refunds on behalf of admins.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `GET /health`: A health check route that returns a 200 OK response.
//! * `POST /payments/gateway/create-order`: Opens a gateway order for one of the caller's orders.
//! * `POST /payments/gateway/verify`: The customer's payment confirmation.
//! * `POST /payments/gateway/webhook`: The gateway's webhook.
//! * `POST /orders/{id}/refund`: Refunds an order. Admins only.
//! * `GET /orders/{id}/payment`: The payment summary of an order.
pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod hooks;
pub mod middleware;
pub mod notifier;
pub mod reconcile_worker;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
