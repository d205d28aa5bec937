//! Rupiah amounts.
//!
//! Every gateway this marketplace talks to settles IDR in whole rupiah, so
//! amounts are stored as `i64` rupiah with no minor unit. Gateways still
//! render amounts as decimal strings (`"150000.00"`) in their payloads and
//! signatures; [`Rupiah::parse_gateway_amount`] and
//! [`Rupiah::as_gateway_string`] convert at that boundary.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing or computing an amount.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// The string is not a decimal number.
    #[error("invalid amount: {0}")]
    Invalid(String),
    /// The amount has a non-zero fractional part.
    #[error("amount must be a whole number of rupiah: {0}")]
    Fractional(String),
    /// The amount is negative or does not fit in 64 bits.
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

/// A whole-rupiah amount.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Rupiah(i64);

impl Rupiah {
    /// Zero rupiah.
    pub const ZERO: Self = Self(0);

    /// Create an amount from whole rupiah.
    #[must_use]
    pub const fn new(amount: i64) -> Self {
        Self(amount)
    }

    /// The amount in whole rupiah.
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }

    /// Whether the amount is strictly positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Parse a gateway amount string such as `"150000.00"` or `"150000"`.
    ///
    /// # Errors
    ///
    /// Returns an error for non-numeric input, a non-zero fractional part, or
    /// a negative amount.
    pub fn parse_gateway_amount(s: &str) -> Result<Self, AmountError> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_| AmountError::Invalid(s.to_owned()))?;
        if value.fract() != Decimal::ZERO {
            return Err(AmountError::Fractional(s.to_owned()));
        }
        if value.is_sign_negative() && value != Decimal::ZERO {
            return Err(AmountError::OutOfRange(s.to_owned()));
        }
        value
            .to_i64()
            .map(Self)
            .ok_or_else(|| AmountError::OutOfRange(s.to_owned()))
    }

    /// Render the amount the way Midtrans echoes `gross_amount` (`"150000.00"`).
    #[must_use]
    pub fn as_gateway_string(self) -> String {
        format!("{}.00", self.0)
    }

    /// `percent`% of this amount, rounded down to whole rupiah.
    ///
    /// Negative or zero percentages yield zero.
    #[must_use]
    pub fn percent(self, percent: Decimal) -> Self {
        if percent <= Decimal::ZERO {
            return Self::ZERO;
        }
        let fee = (Decimal::from(self.0) * percent / Decimal::ONE_HUNDRED).floor();
        Self(fee.to_i64().unwrap_or(0).clamp(0, self.0.max(0)))
    }

    /// Subtract, returning `None` on overflow.
    #[must_use]
    pub const fn checked_sub(self, other: Self) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Add, returning `None` on overflow.
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl fmt::Display for Rupiah {
    /// Indonesian formatting: `Rp150.000`, `-Rp2.500`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.0.unsigned_abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        if self.0 < 0 {
            write!(f, "-Rp{grouped}")
        } else {
            write!(f, "Rp{grouped}")
        }
    }
}

impl From<i64> for Rupiah {
    fn from(amount: i64) -> Self {
        Self(amount)
    }
}

impl From<Rupiah> for i64 {
    fn from(amount: Rupiah) -> Self {
        amount.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Rupiah {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <i64 as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Rupiah {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        Ok(Self(<i64 as sqlx::Decode<sqlx::Postgres>>::decode(value)?))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Rupiah {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <i64 as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}
