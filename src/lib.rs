//! loyalty_ledger Library
//!
//! Loyalty order reconciliation and points ledger. Re-exports modules for
//! the binary, integration testing and external use.

pub mod accrual;
pub mod api;
pub mod domain;
pub mod handlers;
pub mod jobs;
pub mod ledger;
pub mod store;

pub mod config;
pub mod db;
mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{
    Account, Amount, AmountError, Balance, DomainError, Order, OrderNumber, OrderState,
};
