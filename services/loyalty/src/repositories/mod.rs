//! Persistence gateway
//!
//! Repository traits with PostgreSQL implementations. Every operation
//! runs inside its own transaction and is bounded by a per-operation
//! timeout.

pub mod order;
pub mod user;
pub mod withdrawal;

pub use order::PgOrderRepo;
pub use user::PgUserRepo;
pub use withdrawal::PgWithdrawalRepo;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use std::future::Future;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{Order, OrderStatus, User, Withdrawal};

/// Time budget for a single persistence operation.
pub(crate) const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default page size for history listings.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
/// Maximum page size for history listings.
pub const MAX_PAGE_LIMIT: i64 = 100;

/// Outcome of an order insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOrderOutcome {
    /// The order was stored for this user
    Accepted,
    /// The same user already uploaded this number
    ConflictSelf,
    /// A different user already uploaded this number
    ConflictOther,
}

/// User storage.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Store a new user and return its id. Returns `ConflictSelf` when
    /// the login is already taken.
    async fn create(&self, login: &str, password_hash: &str) -> ServiceResult<i64>;

    /// Look a user up by login. Returns `NotFound` if absent.
    async fn get_by_login(&self, login: &str) -> ServiceResult<User>;
}

/// Order storage.
#[async_trait]
pub trait OrderRepo: Send + Sync {
    /// Store a new order for the user, classifying duplicates by owner.
    async fn add(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
    ) -> ServiceResult<AddOrderOutcome>;

    /// Orders uploaded by the user, newest first. `limit` is clamped to
    /// [1, 100] (default 50), negative offsets to 0.
    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Order>>;

    /// Orders still awaiting a terminal status, oldest first.
    async fn get_unprocessed(&self, limit: i64) -> ServiceResult<Vec<Order>>;

    /// Apply a remote-reported status. Terminal rows are left untouched,
    /// so re-applying a terminal state is a no-op. `accrual` is persisted
    /// only for `Processed`.
    async fn update_status(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> ServiceResult<()>;

    /// Total accrual over the user's processed orders.
    async fn sum_processed_accrual_by_user(&self, user_id: i64) -> ServiceResult<Decimal>;
}

/// Withdrawal storage (append-only).
#[async_trait]
pub trait WithdrawalRepo: Send + Sync {
    /// Append a withdrawal row.
    async fn create(&self, order_number: &str, user_id: i64, amount: Decimal)
    -> ServiceResult<()>;

    /// Withdrawals by the user, newest first, same pagination policy as
    /// order listings.
    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Withdrawal>>;

    /// Total amount withdrawn by the user.
    async fn sum_by_user(&self, user_id: i64) -> ServiceResult<Decimal>;
}

/// Minimal database reachability probe for readiness checks.
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self) -> ServiceResult<()>;
}

/// Pinger backed by the connection pool.
#[derive(Clone)]
pub struct PgPinger {
    pool: PgPool,
}

impl PgPinger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Pinger for PgPinger {
    async fn ping(&self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Clamp a requested page to the gateway's pagination policy.
pub fn clamp_page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}

/// Run a persistence future under the per-operation time budget.
pub(crate) async fn bounded<T>(
    fut: impl Future<Output = ServiceResult<T>>,
) -> ServiceResult<T> {
    match tokio::time::timeout(OP_TIMEOUT, fut).await {
        Ok(res) => res,
        Err(_) => Err(ServiceError::Timeout),
    }
}

/// Whether the error is a Postgres unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}
