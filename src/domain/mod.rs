//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod checksum;
pub mod error;
pub mod order;

pub use amount::{Amount, AmountError, Balance, MINOR_UNITS_PER_MAJOR};
pub use checksum::{luhn_valid, ChecksumPolicy};
pub use error::DomainError;
pub use order::{Account, Order, OrderNumber, OrderState};
