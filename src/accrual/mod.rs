//! Settlement service client
//!
//! Asks the external accrual service how a purchase order settled.
//! [`AccrualSource`] is the seam the reconciler depends on; [`AccrualClient`]
//! is the HTTP implementation.

mod backoff;
mod client;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::domain::{OrderNumber, OrderState};

pub use backoff::BackoffPolicy;
pub use client::{AccrualClient, AccrualClientConfig};

/// Order status as reported by the settlement service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Registered,
    Invalid,
    Processing,
    Processed,
}

/// `GET /api/orders/{number}` response body
#[derive(Debug, Clone, Deserialize)]
pub struct AccrualResponse {
    pub order: String,
    pub status: SettlementStatus,
    #[serde(default)]
    pub accrual: Option<serde_json::Number>,
}

impl AccrualResponse {
    /// Interpret the body for `number`
    pub fn into_result(self, number: &OrderNumber) -> Result<AccrualResult, AccrualError> {
        if self.order != number.as_str() {
            return Err(AccrualError::MalformedResponse(format!(
                "asked for order {}, got {}",
                number, self.order
            )));
        }

        match self.status {
            SettlementStatus::Registered | SettlementStatus::Processing => {
                Ok(AccrualResult::Pending(self.status))
            }
            SettlementStatus::Invalid => Ok(AccrualResult::Resolved {
                state: OrderState::Invalid,
                accrual: 0,
            }),
            SettlementStatus::Processed => Ok(AccrualResult::Resolved {
                state: OrderState::Processed,
                accrual: self.accrual.as_ref().map(parse_accrual).transpose()?.unwrap_or(0),
            }),
        }
    }
}

/// Accrual arrives in minor units and must be a non-negative integer
fn parse_accrual(raw: &serde_json::Number) -> Result<i64, AccrualError> {
    let text = raw.to_string();
    let value = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| AccrualError::MalformedResponse(format!("accrual {}", text)))?;

    if value.is_sign_negative() || !value.fract().is_zero() {
        return Err(AccrualError::MalformedResponse(format!(
            "accrual must be a non-negative integer, got {}",
            text
        )));
    }

    value
        .to_i64()
        .ok_or_else(|| AccrualError::MalformedResponse(format!("accrual {} out of range", text)))
}

/// Outcome of one settlement query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccrualResult {
    /// Service has not heard of the order yet (204)
    Unregistered,
    /// Known but not settled
    Pending(SettlementStatus),
    /// Settled; `state` is terminal
    Resolved { state: OrderState, accrual: i64 },
}

impl AccrualResult {
    pub fn is_resolved(&self) -> bool {
        matches!(self, AccrualResult::Resolved { .. })
    }
}

/// Settlement query errors
#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    /// 429 until the rate-limit budget ran out
    #[error("Rate limited by settlement service after {attempts} attempts")]
    RateLimited { attempts: u32 },

    /// 5xx until the retry budget ran out
    #[error("Settlement service unavailable (status {status}) after {attempts} attempts")]
    Unavailable { status: u16, attempts: u32 },

    #[error("Settlement service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed settlement response: {0}")]
    MalformedResponse(String),

    #[error("Unexpected settlement status code: {0}")]
    UnexpectedStatus(u16),
}

impl AccrualError {
    /// Worth asking again on a later cycle
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AccrualError::RateLimited { .. }
                | AccrualError::Unavailable { .. }
                | AccrualError::Transport(_)
        )
    }
}

/// Anything that can report an order's settlement status
#[async_trait]
pub trait AccrualSource: Send + Sync + 'static {
    async fn fetch_status(&self, number: &OrderNumber) -> Result<AccrualResult, AccrualError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number() -> OrderNumber {
        OrderNumber::parse("79927398713").unwrap()
    }

    fn response(body: &str) -> AccrualResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_processed_with_accrual() {
        let result = response(r#"{"order":"79927398713","status":"PROCESSED","accrual":500}"#)
            .into_result(&number())
            .unwrap();
        assert_eq!(
            result,
            AccrualResult::Resolved {
                state: OrderState::Processed,
                accrual: 500
            }
        );
    }

    #[test]
    fn test_processed_without_accrual_is_zero() {
        let result = response(r#"{"order":"79927398713","status":"PROCESSED"}"#)
            .into_result(&number())
            .unwrap();
        assert_eq!(
            result,
            AccrualResult::Resolved {
                state: OrderState::Processed,
                accrual: 0
            }
        );
    }

    #[test]
    fn test_invalid_ignores_accrual() {
        let result = response(r#"{"order":"79927398713","status":"INVALID","accrual":70}"#)
            .into_result(&number())
            .unwrap();
        assert_eq!(
            result,
            AccrualResult::Resolved {
                state: OrderState::Invalid,
                accrual: 0
            }
        );
    }

    #[test]
    fn test_pending_statuses() {
        for status in ["REGISTERED", "PROCESSING"] {
            let body = format!(r#"{{"order":"79927398713","status":"{}"}}"#, status);
            let result = response(&body).into_result(&number()).unwrap();
            assert!(!result.is_resolved());
        }
    }

    #[test]
    fn test_integral_float_accepted() {
        let result = response(r#"{"order":"79927398713","status":"PROCESSED","accrual":500.0}"#)
            .into_result(&number())
            .unwrap();
        assert!(matches!(result, AccrualResult::Resolved { accrual: 500, .. }));
    }

    #[test]
    fn test_fractional_or_negative_accrual_rejected() {
        for accrual in ["729.98", "-5"] {
            let body = format!(
                r#"{{"order":"79927398713","status":"PROCESSED","accrual":{}}}"#,
                accrual
            );
            assert!(matches!(
                response(&body).into_result(&number()),
                Err(AccrualError::MalformedResponse(_))
            ));
        }
    }

    #[test]
    fn test_mismatched_order_rejected() {
        assert!(matches!(
            response(r#"{"order":"1","status":"PROCESSED"}"#).into_result(&number()),
            Err(AccrualError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_transient_classification() {
        assert!(AccrualError::RateLimited { attempts: 5 }.is_transient());
        assert!(AccrualError::Unavailable {
            status: 503,
            attempts: 3
        }
        .is_transient());
        assert!(!AccrualError::UnexpectedStatus(404).is_transient());
        assert!(!AccrualError::MalformedResponse("x".to_string()).is_transient());
    }
}
