//! Orders and accounts
//!
//! Row-level domain types shared by the ledger, the store adapters and the
//! reconciliation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Amount, Balance, DomainError};

/// Longest order number accepted
const MAX_ORDER_NUMBER_LEN: usize = 32;

/// Externally supplied order identifier: a non-empty string of ASCII digits.
///
/// Format is validated here; the checksum is validated separately by
/// [`super::ChecksumPolicy`] because it is a deployment-level decision.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.len() > MAX_ORDER_NUMBER_LEN
            || !trimmed.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(DomainError::InvalidOrderNumber(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderNumber {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<OrderNumber> for String {
    fn from(number: OrderNumber) -> Self {
        number.0
    }
}

/// Order settlement state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    New,
    Processing,
    Processed,
    Invalid,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::New => "NEW",
            OrderState::Processing => "PROCESSING",
            OrderState::Processed => "PROCESSED",
            OrderState::Invalid => "INVALID",
        }
    }

    /// `PROCESSED` and `INVALID` never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderState::Processed | OrderState::Invalid)
    }

    /// Forward-only transition graph: NEW → PROCESSING → {PROCESSED, INVALID},
    /// where a NEW order may skip straight to a terminal state.
    pub fn can_transition_to(&self, next: OrderState) -> bool {
        match (self, next) {
            (OrderState::New, OrderState::Processing) => true,
            (OrderState::New | OrderState::Processing, to) => to.is_terminal(),
            _ => false,
        }
    }

    /// Validate a transition, returning the domain error on violation
    pub fn transition_to(&self, next: OrderState) -> Result<OrderState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::IllegalTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderState::New),
            "PROCESSING" => Ok(OrderState::Processing),
            "PROCESSED" => Ok(OrderState::Processed),
            "INVALID" => Ok(OrderState::Invalid),
            other => Err(DomainError::UnknownOrderState(other.to_string())),
        }
    }
}

/// Order row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub number: OrderNumber,
    pub owner: String,
    pub state: OrderState,
    /// Minor units credited at settlement, 0 until then
    pub accrual: i64,
    /// Minor units debited, 0 for purchase orders
    pub withdrawal: i64,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// New purchase order awaiting settlement
    pub fn purchase(
        number: OrderNumber,
        owner: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            number,
            owner: owner.into(),
            state: OrderState::New,
            accrual: 0,
            withdrawal: 0,
            created_at,
        }
    }

    /// Withdrawal orders need no settlement and start terminal
    pub fn withdrawal(
        number: OrderNumber,
        owner: impl Into<String>,
        amount: Amount,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            number,
            owner: owner.into(),
            state: OrderState::Processed,
            accrual: 0,
            withdrawal: amount.minor(),
            created_at,
        }
    }

    pub fn is_withdrawal(&self) -> bool {
        self.withdrawal > 0
    }
}

/// Account row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub login: String,
    pub credited_total: i64,
    pub debited_total: i64,
}

impl Account {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            credited_total: 0,
            debited_total: 0,
        }
    }

    /// `credited_total - debited_total`; the store never commits a negative value
    pub fn available(&self) -> Balance {
        Balance::new(self.credited_total - self.debited_total).unwrap_or_default()
    }

    pub fn withdrawn(&self) -> Balance {
        Balance::new(self.debited_total).unwrap_or_default()
    }
}
