use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const DEFAULT_CURRENCY_CODE: &str = "INR";

//--------------------------------------     MinorUnits       ---------------------------------------------------------
/// An integer amount in the smallest denomination of a currency (paise, cents, ...).
///
/// All settlement arithmetic is done in this type. It never holds a fractional value, and the only way to get one
/// from a decimal is the explicit (and lossy) [`MinorUnits::from_legacy_total`].
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct MinorUnits(i64);

op!(binary MinorUnits, Add, add);
op!(binary MinorUnits, Sub, sub);
op!(inplace MinorUnits, AddAssign, add_assign);
op!(inplace MinorUnits, SubAssign, sub_assign);
op!(unary MinorUnits, Neg, neg);

impl Sum for MinorUnits {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in minor currency units: {0}")]
pub struct MinorUnitsConversionError(String);

impl From<i64> for MinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl TryFrom<u64> for MinorUnits {
    type Error = MinorUnitsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MinorUnitsConversionError(format!("{value} is too large to convert to MinorUnits")))
    }
}

impl Display for MinorUnits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl MinorUnits {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Converts a legacy decimal total (major units) into minor units by multiplying by 100 and rounding half away
    /// from zero. Rows written before the integer amount column existed rely on this. It can drift by a paisa
    /// from what the customer saw if the stored decimal was itself the result of float arithmetic.
    pub fn from_legacy_total(total: f64) -> Result<Self, MinorUnitsConversionError> {
        if !total.is_finite() {
            return Err(MinorUnitsConversionError(format!("{total} is not a finite amount")));
        }
        let scaled = (total * 100.0).round();
        if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
            return Err(MinorUnitsConversionError(format!("{total} is out of range")));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(scaled as i64))
    }

    /// The amount as a decimal in major units. Only for display and the legacy `total` column.
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}
