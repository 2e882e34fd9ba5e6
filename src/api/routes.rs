//! API Routes
//!
//! HTTP endpoint definitions. Money crosses this boundary in major units;
//! everything behind it works in minor units.

use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::{Balance, ChecksumPolicy, DomainError, Order, OrderState};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    RegisterCommand, RegisterHandler, SubmitOrderCommand, SubmitOrderHandler, SubmitOutcome,
    WithdrawCommand, WithdrawHandler,
};
use crate::store::Store;

use super::middleware::{auth_middleware, RequestUser};

/// Shared state for every route
pub struct AppState<S: Store> {
    pub store: Arc<S>,
    pub checksum: ChecksumPolicy,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, checksum: ChecksumPolicy) -> Self {
        Self { store, checksum }
    }
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            checksum: self.checksum,
        }
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub login: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub login: String,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let accrual = if order.state == OrderState::Processed {
            Some(minor_to_major(order.accrual))
        } else {
            None
        };
        Self {
            number: order.number.into(),
            status: order.state,
            accrual,
            uploaded_at: order.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    pub sum: Decimal,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl From<Order> for WithdrawalResponse {
    fn from(order: Order) -> Self {
        Self {
            sum: minor_to_major(order.withdrawal),
            order: order.number.into(),
            processed_at: order.created_at,
        }
    }
}

fn minor_to_major(minor: i64) -> Decimal {
    Balance::new(minor).unwrap_or_default().to_major()
}

/// 200 with a JSON list, or 204 when there is nothing to show
fn list_response<T: Serialize>(items: Vec<T>) -> Response {
    if items.is_empty() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        Json(items).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::InvalidRequest(e.body_text()))
}

// =========================================================================
// API Router
// =========================================================================

/// Create the `/api/user` router; everything except `register` requires an
/// identified caller
pub fn create_router<S: Store>(state: AppState<S>) -> Router<AppState<S>> {
    let protected = Router::new()
        .route("/orders", post(submit_order::<S>).get(list_orders::<S>))
        .route("/balance", get(get_balance::<S>))
        .route("/balance/withdraw", post(withdraw::<S>))
        .route("/withdrawals", get(list_withdrawals::<S>))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware::<S>));

    Router::new()
        .route("/register", post(register::<S>))
        .merge(protected)
}

// =========================================================================
// POST /api/user/register
// =========================================================================

async fn register<S: Store>(
    State(state): State<AppState<S>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> AppResult<Json<RegisterResponse>> {
    let request = json_body(payload)?;
    let login = RegisterHandler::new(state.store)
        .execute(RegisterCommand::new(request.login))
        .await?;

    Ok(Json(RegisterResponse { login }))
}

// =========================================================================
// POST /api/user/orders
// =========================================================================

/// Body is the order number as plain text
async fn submit_order<S: Store>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<RequestUser>,
    body: String,
) -> AppResult<StatusCode> {
    let outcome = SubmitOrderHandler::new(state.store, state.checksum)
        .execute(SubmitOrderCommand::new(user.login, body))
        .await?;

    Ok(match outcome {
        SubmitOutcome::Accepted => StatusCode::ACCEPTED,
        SubmitOutcome::AlreadyAccepted => StatusCode::OK,
    })
}

// =========================================================================
// GET /api/user/orders
// =========================================================================

async fn list_orders<S: Store>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<RequestUser>,
) -> AppResult<Response> {
    let orders = state.store.list_orders(&user.login).await?;
    Ok(list_response(
        orders.into_iter().map(OrderResponse::from).collect(),
    ))
}

// =========================================================================
// GET /api/user/balance
// =========================================================================

async fn get_balance<S: Store>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<RequestUser>,
) -> AppResult<Json<BalanceResponse>> {
    let account = state
        .store
        .load_account(&user.login)
        .await?
        .ok_or_else(|| DomainError::AccountNotFound(user.login.clone()))?;

    Ok(Json(BalanceResponse {
        current: account.available().to_major(),
        withdrawn: account.withdrawn().to_major(),
    }))
}

// =========================================================================
// POST /api/user/balance/withdraw
// =========================================================================

async fn withdraw<S: Store>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<RequestUser>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> AppResult<StatusCode> {
    let request = json_body(payload)?;
    WithdrawHandler::new(state.store, state.checksum)
        .execute(WithdrawCommand::new(user.login, request.order, request.sum))
        .await?;

    Ok(StatusCode::OK)
}

// =========================================================================
// GET /api/user/withdrawals
// =========================================================================

async fn list_withdrawals<S: Store>(
    State(state): State<AppState<S>>,
    Extension(user): Extension<RequestUser>,
) -> AppResult<Response> {
    let withdrawals = state.store.list_withdrawals(&user.login).await?;
    Ok(list_response(
        withdrawals
            .into_iter()
            .map(WithdrawalResponse::from)
            .collect(),
    ))
}

// =========================================================================
// GET /health
// =========================================================================

/// Health check endpoint
pub async fn health_check<S: Store>(State(state): State<AppState<S>>) -> Response {
    match state.store.ping().await {
        Ok(()) => "OK".into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OrderNumber;
    use rust_decimal_macros::dec;

    fn order(state: OrderState, accrual: i64) -> Order {
        Order {
            number: OrderNumber::parse("79927398713").unwrap(),
            owner: "alice".to_string(),
            state,
            accrual,
            withdrawal: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_order_response_shows_accrual_only_when_processed() {
        let processed = OrderResponse::from(order(OrderState::Processed, 72_998));
        assert_eq!(processed.accrual, Some(dec!(729.98)));

        let pending = OrderResponse::from(order(OrderState::Processing, 0));
        assert_eq!(pending.accrual, None);
        let json = serde_json::to_value(&pending).unwrap();
        assert!(json.get("accrual").is_none());
        assert_eq!(json["status"], "PROCESSING");
    }

    #[test]
    fn test_withdrawal_response_in_major_units() {
        let mut withdrawal = order(OrderState::Processed, 0);
        withdrawal.withdrawal = 50_000;
        let response = WithdrawalResponse::from(withdrawal);
        assert_eq!(response.sum, dec!(500));
        assert_eq!(response.order, "79927398713");
    }
}
