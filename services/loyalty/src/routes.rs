//! HTTP surface of the loyalty service
//!
//! Handlers are thin translations between the wire and the core
//! services; status codes come from the `ApiError` conversion in
//! `error.rs` or from the explicit matches below.

use axum::{
    Extension, Json, Router,
    extract::{Query, State, rejection::JsonRejection},
    http::{StatusCode, header},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::SecondsFormat;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    decompression::RequestDecompressionLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::{
    error::{ApiError, ServiceError},
    middleware::{AUTH_COOKIE, AuthUser, auth_middleware},
    models::{Order, OrderStatus, Withdrawal},
    password,
    repositories::AddOrderOutcome,
    state::AppState,
    validation,
};

/// Request body for registration and login
#[derive(Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

/// Request body for a withdrawal
#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub order: String,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub sum: Decimal,
}

/// Order list item
#[derive(Serialize)]
pub struct OrderItem {
    pub number: String,
    pub status: OrderStatus,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub accrual: Option<Decimal>,
    pub uploaded_at: String,
}

impl From<Order> for OrderItem {
    fn from(order: Order) -> Self {
        Self {
            number: order.number,
            status: order.status,
            accrual: order.accrual,
            uploaded_at: order
                .uploaded_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Withdrawal list item
#[derive(Serialize)]
pub struct WithdrawalItem {
    pub order: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub sum: Decimal,
    pub processed_at: String,
}

impl From<Withdrawal> for WithdrawalItem {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.order_number,
            sum: withdrawal.amount,
            processed_at: withdrawal
                .processed_at
                .to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Balance response
#[derive(Serialize)]
pub struct BalanceResponse {
    #[serde(with = "rust_decimal::serde::float")]
    pub current: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub withdrawn: Decimal,
}

/// Pagination query parameters
#[derive(Deserialize, Default)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Create the router for the loyalty service
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/api/user/orders", post(upload_order).get(list_orders))
        .route("/api/user/balance", get(get_balance))
        .route("/api/user/balance/withdraw", post(withdraw))
        .route("/api/user/withdrawals", get(list_withdrawals))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/api/user/register", post(register))
        .route("/api/user/login", post(login))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(RequestDecompressionLayer::new())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Build the `Set-Cookie` value carrying the auth token.
fn auth_cookie(token: &str) -> String {
    format!("{AUTH_COOKIE}={token}; Path=/; HttpOnly")
}

/// Register a new user and set the auth cookie
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(creds) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;

    validation::validate_login(&creds.login)?;
    validation::validate_password(&creds.password)?;

    let hash = password::hash_password(&creds.password).map_err(|e| {
        error!("Failed to hash password: {}", e);
        ApiError::Internal
    })?;

    let user_id = state.users.create(&creds.login, &hash).await?;
    info!("Registered user: {}", creds.login);

    let token = state.jwt.issue(user_id, &creds.login).map_err(|e| {
        error!("Failed to issue token: {}", e);
        ApiError::Internal
    })?;

    Ok((
        [(header::SET_COOKIE, auth_cookie(&token))],
        StatusCode::OK,
    ))
}

/// Authenticate a user and set the auth cookie
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(creds) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;

    let user = match state.users.get_by_login(&creds.login).await {
        Ok(user) => user,
        Err(ServiceError::NotFound) => return Err(ApiError::Unauthorized),
        Err(e) => return Err(e.into()),
    };

    let verified = password::verify_password(&user.password_hash, &creds.password).map_err(|e| {
        error!("Failed to verify password: {}", e);
        ApiError::Internal
    })?;
    if !verified {
        return Err(ApiError::Unauthorized);
    }

    let token = state.jwt.issue(user.id, &user.login).map_err(|e| {
        error!("Failed to issue token: {}", e);
        ApiError::Internal
    })?;

    Ok((
        [(header::SET_COOKIE, auth_cookie(&token))],
        StatusCode::OK,
    ))
}

/// Upload an order number (raw digit string body)
pub async fn upload_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: String,
) -> Result<StatusCode, ApiError> {
    match state.order_ingress.add(user.id, &body).await? {
        AddOrderOutcome::Accepted => Ok(StatusCode::ACCEPTED),
        AddOrderOutcome::ConflictSelf => Ok(StatusCode::OK),
        AddOrderOutcome::ConflictOther => Ok(StatusCode::CONFLICT),
    }
}

/// List the user's orders, newest first
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let orders = state
        .orders
        .list_by_user(user.id, page.limit, page.offset)
        .await?;

    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let items: Vec<OrderItem> = orders.into_iter().map(OrderItem::from).collect();
    Ok(Json(items).into_response())
}

/// Current balance of the authenticated user
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let balance = state.balance.get_balance(user.id).await?;
    Ok(Json(BalanceResponse {
        current: balance.current,
        withdrawn: balance.withdrawn,
    }))
}

/// Withdraw points against an order identifier
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<WithdrawRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(req) =
        payload.map_err(|_| ApiError::BadRequest("invalid request body".to_string()))?;

    state.withdraw.withdraw(user.id, &req.order, req.sum).await?;
    Ok(StatusCode::OK)
}

/// List the user's withdrawals, newest first
pub async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(page): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let withdrawals = state
        .withdrawals
        .list_by_user(user.id, page.limit, page.offset)
        .await?;

    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let items: Vec<WithdrawalItem> = withdrawals.into_iter().map(WithdrawalItem::from).collect();
    Ok(Json(items).into_response())
}

/// Liveness check
pub async fn health_live() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: the database must answer within one second
pub async fn health_ready(State(state): State<AppState>) -> StatusCode {
    match tokio::time::timeout(Duration::from_secs(1), state.pinger.ping()).await {
        Ok(Ok(())) => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_item_serialization() {
        let item = OrderItem::from(Order {
            number: "79927398713".to_string(),
            user_id: 1,
            status: OrderStatus::Processed,
            accrual: Some(dec!(729.5)),
            uploaded_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        });

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["number"], "79927398713");
        assert_eq!(json["status"], "PROCESSED");
        assert_eq!(json["accrual"].as_f64(), Some(729.5));
        assert_eq!(json["uploaded_at"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_order_item_omits_absent_accrual() {
        let item = OrderItem::from(Order {
            number: "79927398713".to_string(),
            user_id: 1,
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        });

        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("accrual").is_none());
    }

    #[test]
    fn test_withdraw_request_keeps_decimal_exact() {
        let req: WithdrawRequest =
            serde_json::from_str(r#"{"order":"12345678903","sum":600.10}"#).unwrap();
        assert_eq!(req.sum, dec!(600.10));
    }

    #[test]
    fn test_balance_response_shape() {
        let json = serde_json::to_value(BalanceResponse {
            current: dec!(400),
            withdrawn: dec!(600),
        })
        .unwrap();
        assert_eq!(json["current"].as_f64(), Some(400.0));
        assert_eq!(json["withdrawn"].as_f64(), Some(600.0));
    }
}
