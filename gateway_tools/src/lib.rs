//! Thin client for the payment gateway's REST API.
//!
//! Every amount that crosses this boundary is an integer in minor currency units ([`MinorUnits`]). Gateway failures,
//! whatever their native shape, come back as a [`GatewayApiError`] with a human-readable description and a hint as to
//! whether retrying could help.
//!
//! [`MinorUnits`]: storefront_common::MinorUnits
mod api;
mod config;
mod error;

mod data_objects;

pub use api::GatewayApi;
pub use config::{GatewayConfig, DEFAULT_GATEWAY_BASE_URL, DEFAULT_GATEWAY_TIMEOUT};
pub use data_objects::{
    GatewayOrder,
    GatewayPayment,
    GatewayRefund,
    NewGatewayOrder,
    NewRefund,
    RemotePaymentStatus,
    RemoteRefundStatus,
};
pub use error::GatewayApiError;
