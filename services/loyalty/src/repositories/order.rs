//! Order repository backed by PostgreSQL

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::{AddOrderOutcome, OrderRepo, bounded, clamp_page};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Order, OrderStatus};

/// Order repository
#[derive(Clone)]
pub struct PgOrderRepo {
    pool: PgPool,
}

impl PgOrderRepo {
    /// Create a new order repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: &PgRow) -> ServiceResult<Order> {
    let status: String = row.get("status");
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| ServiceError::Database(sqlx::Error::Decode(e.into())))?;

    Ok(Order {
        number: row.get("number"),
        user_id: row.get("user_id"),
        status,
        accrual: row.get("accrual"),
        uploaded_at: row.get("uploaded_at"),
    })
}

#[async_trait]
impl OrderRepo for PgOrderRepo {
    async fn add(
        &self,
        number: &str,
        user_id: i64,
        status: OrderStatus,
    ) -> ServiceResult<AddOrderOutcome> {
        bounded(async {
            // Default isolation: the conflict probe must see a row committed
            // by a concurrent uploader after this transaction's snapshot.
            let mut tx = self.pool.begin().await?;

            let inserted = sqlx::query(
                r#"
                INSERT INTO orders (number, user_id, status)
                VALUES ($1, $2, $3)
                ON CONFLICT (number) DO NOTHING
                RETURNING number
                "#,
            )
            .bind(number)
            .bind(user_id)
            .bind(status.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let outcome = match inserted {
                Some(_) => AddOrderOutcome::Accepted,
                None => {
                    let row = sqlx::query("SELECT user_id FROM orders WHERE number = $1")
                        .bind(number)
                        .fetch_one(&mut *tx)
                        .await?;
                    let owner: i64 = row.get("user_id");
                    if owner == user_id {
                        AddOrderOutcome::ConflictSelf
                    } else {
                        AddOrderOutcome::ConflictOther
                    }
                }
            };

            tx.commit().await?;
            Ok(outcome)
        })
        .await
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Order>> {
        let (limit, offset) = clamp_page(limit, offset);

        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let rows = sqlx::query(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE user_id = $1
                ORDER BY uploaded_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await?;

            let orders = rows
                .iter()
                .map(order_from_row)
                .collect::<ServiceResult<Vec<_>>>()?;

            tx.commit().await?;
            Ok(orders)
        })
        .await
    }

    async fn get_unprocessed(&self, limit: i64) -> ServiceResult<Vec<Order>> {
        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let rows = sqlx::query(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE status IN ('NEW', 'PROCESSING')
                ORDER BY uploaded_at
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

            let orders = rows
                .iter()
                .map(order_from_row)
                .collect::<ServiceResult<Vec<_>>>()?;

            tx.commit().await?;
            Ok(orders)
        })
        .await
    }

    async fn update_status(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> ServiceResult<()> {
        // Accrual is defined exactly for PROCESSED rows.
        let accrual = if status == OrderStatus::Processed {
            Some(accrual.unwrap_or(Decimal::ZERO))
        } else {
            None
        };

        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            // Terminal rows never change; a racing re-apply matches no row.
            sqlx::query(
                r#"
                UPDATE orders
                SET status = $2, accrual = $3
                WHERE number = $1 AND status IN ('NEW', 'PROCESSING')
                "#,
            )
            .bind(number)
            .bind(status.as_str())
            .bind(accrual)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn sum_processed_accrual_by_user(&self, user_id: i64) -> ServiceResult<Decimal> {
        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(
                r#"
                SELECT COALESCE(SUM(accrual), 0::NUMERIC) AS total
                FROM orders
                WHERE status = 'PROCESSED' AND user_id = $1
                "#,
            )
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

            let total: Decimal = row.get("total");
            tx.commit().await?;
            Ok(total)
        })
        .await
    }
}
