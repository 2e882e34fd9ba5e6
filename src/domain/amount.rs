//! Amount type
//!
//! Domain primitives for monetary values held in integer minor units.
//! Major-unit decimals only appear at the HTTP boundary, through
//! [`Amount::from_major`] and [`Balance::to_major`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor units per major unit (two decimal places)
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Decimal places of the major unit
const MAJOR_SCALE: u32 = 2;

/// Maximum single amount (10 billion major units)
const MAX_AMOUNT: i64 = 10_000_000_000 * MINOR_UNITS_PER_MAJOR;

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Value never exceeds `MAX_AMOUNT` minor units
///
/// # Example
/// ```
/// use loyalty_ledger::domain::Amount;
///
/// let amount = Amount::new(500).unwrap();
/// assert_eq!(amount.minor(), 500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(i64),

    #[error("Amount has too many decimal places (max {MAJOR_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount from minor units.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::Overflow` if value exceeds the maximum
    pub fn new(minor: i64) -> Result<Self, AmountError> {
        if minor <= 0 {
            return Err(AmountError::NotPositive(minor));
        }
        if minor > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }
        Ok(Self(minor))
    }

    /// Convert a major-unit decimal (e.g. `751.25`) into minor units.
    pub fn from_major(value: Decimal) -> Result<Self, AmountError> {
        let value = value.normalize();
        if value.scale() > MAJOR_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }
        let minor = value
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .ok_or(AmountError::Overflow)?;
        let minor = minor.to_i64().ok_or(AmountError::Overflow)?;
        Self::new(minor)
    }

    /// Value in minor units
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Value in major units
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, MAJOR_SCALE)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl TryFrom<i64> for Amount {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for i64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

/// Balance represents a zero-or-positive total in minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Balance(i64);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(minor: i64) -> Result<Self, AmountError> {
        if minor < 0 {
            return Err(AmountError::NotPositive(minor));
        }
        Ok(Self(minor))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(0)
    }

    /// Value in minor units
    pub fn minor(&self) -> i64 {
        self.0
    }

    /// Value in major units, for API serialization
    pub fn to_major(&self) -> Decimal {
        Decimal::new(self.0, MAJOR_SCALE)
    }

    /// Check if balance is sufficient for a debit
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.minor()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        let value = self.0.checked_add(amount.minor()).ok_or(AmountError::Overflow)?;
        Balance::new(value)
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.minor())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_major())
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}
