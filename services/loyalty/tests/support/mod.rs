//! Shared fixtures for the end-to-end tests: an in-memory persistence
//! gateway, a scripted accrual server and an application spawner.

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use loyalty::accrual::{AccrualApi, AccrualClient};
use loyalty::balance::{BalanceService, Invalidator};
use loyalty::error::{ServiceError, ServiceResult};
use loyalty::jwt::JwtService;
use loyalty::models::{Order, OrderStatus, User, Withdrawal};
use loyalty::order::OrderService;
use loyalty::repositories::{
    AddOrderOutcome, OrderRepo, Pinger, UserRepo, WithdrawalRepo, clamp_page,
};
use loyalty::routes;
use loyalty::state::AppState;
use loyalty::updater::{OrderUpdater, UpdaterConfig};
use loyalty::withdraw::WithdrawService;

/// In-memory stand-in for the Postgres gateway.
#[derive(Default)]
pub struct MemStore {
    users: Mutex<Vec<User>>,
    orders: Mutex<Vec<Order>>,
    withdrawals: Mutex<Vec<Withdrawal>>,
    next_user_id: AtomicI64,
}

impl MemStore {
    pub fn order_status(&self, number: &str) -> Option<OrderStatus> {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|o| o.number == number)
            .map(|o| o.status)
    }
}

#[async_trait]
impl UserRepo for MemStore {
    async fn create(&self, login: &str, password_hash: &str) -> ServiceResult<i64> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.login == login) {
            return Err(ServiceError::ConflictSelf);
        }
        let id = self.next_user_id.fetch_add(1, Ordering::SeqCst) + 1;
        users.push(User {
            id,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        });
        Ok(id)
    }

    async fn get_by_login(&self, login: &str) -> ServiceResult<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.login == login)
            .cloned()
            .ok_or(ServiceError::NotFound)
    }
}

#[async_trait]
impl OrderRepo for MemStore {
    async fn add(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
    ) -> ServiceResult<AddOrderOutcome> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(existing) = orders.iter().find(|o| o.number == number) {
            return Ok(if existing.user_id == user_id {
                AddOrderOutcome::ConflictSelf
            } else {
                AddOrderOutcome::ConflictOther
            });
        }
        orders.push(Order {
            number: number.to_string(),
            user_id,
            status,
            accrual: None,
            uploaded_at: Utc::now(),
        });
        Ok(AddOrderOutcome::Accepted)
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Order>> {
        let (limit, offset) = clamp_page(limit, offset);
        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(orders
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn get_unprocessed(&self, limit: i64) -> ServiceResult<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| !o.status.is_terminal())
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.uploaded_at);
        orders.truncate(limit as usize);
        Ok(orders)
    }

    async fn update_status(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> ServiceResult<()> {
        let mut orders = self.orders.lock().unwrap();
        if let Some(order) = orders.iter_mut().find(|o| o.number == number) {
            if !order.status.is_terminal() {
                order.status = status;
                order.accrual = if status == OrderStatus::Processed {
                    Some(accrual.unwrap_or(Decimal::ZERO))
                } else {
                    None
                };
            }
        }
        Ok(())
    }

    async fn sum_processed_accrual_by_user(&self, user_id: i64) -> ServiceResult<Decimal> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Processed)
            .filter_map(|o| o.accrual)
            .sum())
    }
}

#[async_trait]
impl WithdrawalRepo for MemStore {
    async fn create(
        &self,
        order_number: &str,
        user_id: i64,
        amount: Decimal,
    ) -> ServiceResult<()> {
        self.withdrawals.lock().unwrap().push(Withdrawal {
            order_number: order_number.to_string(),
            user_id,
            amount,
            processed_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Withdrawal>> {
        let (limit, offset) = clamp_page(limit, offset);
        let mut withdrawals: Vec<Withdrawal> = self
            .withdrawals
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        withdrawals.sort_by(|a, b| b.processed_at.cmp(&a.processed_at));
        Ok(withdrawals
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn sum_by_user(&self, user_id: i64) -> ServiceResult<Decimal> {
        Ok(self
            .withdrawals
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.user_id == user_id)
            .map(|w| w.amount)
            .sum())
    }
}

#[async_trait]
impl Pinger for MemStore {
    async fn ping(&self) -> ServiceResult<()> {
        Ok(())
    }
}

/// One scripted reply of the accrual mock.
#[derive(Debug, Clone)]
pub enum MockReply {
    Ready {
        status: &'static str,
        accrual: Option<f64>,
    },
    NoContent,
    Throttle(u64),
}

/// Scripted accrual server state. Unprimed or exhausted numbers answer
/// 204 No Content.
#[derive(Default)]
pub struct MockAccrual {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
}

impl MockAccrual {
    pub fn prime(&self, number: &str, replies: Vec<MockReply>) {
        self.replies
            .lock()
            .unwrap()
            .insert(number.to_string(), replies.into());
    }
}

async fn accrual_handler(
    State(mock): State<Arc<MockAccrual>>,
    Path(number): Path<String>,
) -> Response {
    let next = mock
        .replies
        .lock()
        .unwrap()
        .get_mut(&number)
        .and_then(VecDeque::pop_front);

    match next {
        Some(MockReply::Ready { status, accrual }) => {
            let mut body = serde_json::json!({
                "order": number,
                "status": status,
            });
            if let Some(accrual) = accrual {
                body["accrual"] = serde_json::json!(accrual);
            }
            Json(body).into_response()
        }
        Some(MockReply::Throttle(secs)) => (
            StatusCode::TOO_MANY_REQUESTS,
            [(header::RETRY_AFTER, secs.to_string())],
        )
            .into_response(),
        Some(MockReply::NoContent) | None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// Spawn the accrual mock on an ephemeral port and return its base URL.
pub async fn spawn_accrual_mock(mock: Arc<MockAccrual>) -> String {
    let app = Router::new()
        .route("/api/orders/{number}", get(accrual_handler))
        .with_state(mock);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

/// A running application instance under test.
pub struct TestApp {
    pub base_url: String,
    pub store: Arc<MemStore>,
    pub cancel: CancellationToken,
}

/// Spawn the full application (router + updater) against the in-memory
/// store and the given accrual base URL.
pub async fn spawn_app(accrual_base: &str) -> TestApp {
    let store = Arc::new(MemStore::default());

    let users: Arc<dyn UserRepo> = store.clone();
    let orders: Arc<dyn OrderRepo> = store.clone();
    let withdrawals: Arc<dyn WithdrawalRepo> = store.clone();
    let pinger: Arc<dyn Pinger> = store.clone();

    let balance = Arc::new(BalanceService::new(orders.clone(), withdrawals.clone()));
    let invalidator: Arc<dyn Invalidator> = balance.clone();
    let withdraw = Arc::new(WithdrawService::new(
        orders.clone(),
        withdrawals.clone(),
        invalidator.clone(),
    ));
    let order_ingress = OrderService::new(orders.clone());
    let jwt = JwtService::new("test-secret");

    let cancel = CancellationToken::new();
    let accrual: Arc<dyn AccrualApi> =
        Arc::new(AccrualClient::new(accrual_base, cancel.clone()).unwrap());
    let updater = OrderUpdater::new(
        orders.clone(),
        accrual,
        invalidator,
        UpdaterConfig {
            parallel: 2,
            batch: 5,
            interval: Duration::from_millis(100),
        },
    );
    tokio::spawn(updater.run(cancel.clone()));

    let state = AppState {
        users,
        orders,
        withdrawals,
        balance,
        withdraw,
        order_ingress,
        jwt,
        pinger,
    };

    let app = routes::create_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        base_url: format!("http://{addr}"),
        store,
        cancel,
    }
}
