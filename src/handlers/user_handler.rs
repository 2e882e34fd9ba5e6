//! Registration Handler
//!
//! Opens an empty ledger account for a new login. Credentials are handled
//! upstream; this only claims the login.

use std::sync::Arc;

use crate::domain::DomainError;
use crate::error::AppError;
use crate::store::Store;

use super::RegisterCommand;

/// Longest login accepted
const MAX_LOGIN_LEN: usize = 64;

/// Handler for account registration
pub struct RegisterHandler<S: Store> {
    store: Arc<S>,
}

impl<S: Store> RegisterHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Execute the register command, returning the normalized login
    pub async fn execute(&self, command: RegisterCommand) -> Result<String, AppError> {
        let login = command.login.trim();
        if login.is_empty() {
            return Err(AppError::InvalidRequest("login must not be blank".to_string()));
        }
        if login.chars().count() > MAX_LOGIN_LEN || login.chars().any(char::is_control) {
            return Err(AppError::InvalidRequest(format!(
                "login must be at most {} printable characters",
                MAX_LOGIN_LEN
            )));
        }

        if !self.store.create_account(login).await? {
            return Err(DomainError::AccountExists(login.to_string()).into());
        }

        tracing::info!(login = %login, "Account registered");
        Ok(login.to_string())
    }
}
