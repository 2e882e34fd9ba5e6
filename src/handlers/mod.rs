//! Command Handlers module
//!
//! Command handlers that orchestrate the write paths reachable from the API:
//! registration, purchase-order submission and withdrawal.

mod commands;
mod order_handler;
mod user_handler;
mod withdraw_handler;


pub use commands::*;
pub use order_handler::SubmitOrderHandler;
pub use user_handler::RegisterHandler;
pub use withdraw_handler::WithdrawHandler;
