use std::fmt::Display;

use gateway_tools::GatewayApiError;
use serde::Serialize;
use thiserror::Error;

use crate::{
    db_types::{MinorUnitsConversionError, PaymentStatus},
    traits::SettlementDbError,
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Invalid request. {0}")]
    Validation(String),
    #[error("The payment signature is invalid")]
    InvalidSignature,
    #[error("Cannot {action} order {order_id} while its payment status is {current}")]
    Conflict { order_id: i64, current: PaymentStatus, action: String },
    #[error("Order {0} does not belong to the caller")]
    NotOwner(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("The gateway's payment record does not match order {order_id}. {reason}")]
    FraudSuspect { order_id: i64, reason: String },
    #[error("The payment gateway is unavailable. Try again later. {0}")]
    GatewayUnavailable(String),
    #[error("The payment gateway rejected the request. {0}")]
    GatewayRejected(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// The error taxonomy of the settlement flows. Callers decide how to surface an error by its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Conflict,
    Ownership,
    FraudSuspect,
    GatewayUnavailable,
    GatewayRejected,
    NotFound,
    Internal,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Ownership => "ownership",
            ErrorKind::FraudSuspect => "fraud_suspect",
            ErrorKind::GatewayUnavailable => "gateway_unavailable",
            ErrorKind::GatewayRejected => "gateway_rejected",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_) | SettlementError::InvalidSignature => ErrorKind::Validation,
            SettlementError::Conflict { .. } => ErrorKind::Conflict,
            SettlementError::NotOwner(_) => ErrorKind::Ownership,
            SettlementError::OrderNotFound(_) => ErrorKind::NotFound,
            SettlementError::FraudSuspect { .. } => ErrorKind::FraudSuspect,
            SettlementError::GatewayUnavailable(_) => ErrorKind::GatewayUnavailable,
            SettlementError::GatewayRejected(_) => ErrorKind::GatewayRejected,
            SettlementError::DatabaseError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::GatewayUnavailable(_))
    }

    pub(crate) fn conflict(order_id: i64, current: PaymentStatus, action: &str) -> Self {
        SettlementError::Conflict { order_id, current, action: action.to_string() }
    }
}

impl From<SettlementDbError> for SettlementError {
    fn from(e: SettlementDbError) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}

impl From<GatewayApiError> for SettlementError {
    fn from(e: GatewayApiError) -> Self {
        match e {
            e if e.is_retryable() => SettlementError::GatewayUnavailable(e.to_string()),
            GatewayApiError::InvalidIdentifier(id) => {
                SettlementError::Validation(format!("{id} is not a valid gateway identifier"))
            },
            e => SettlementError::GatewayRejected(e.description()),
        }
    }
}

impl From<MinorUnitsConversionError> for SettlementError {
    fn from(e: MinorUnitsConversionError) -> Self {
        SettlementError::Validation(e.to_string())
    }
}
