//! Withdrawal repository backed by PostgreSQL

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};

use super::{WithdrawalRepo, bounded, clamp_page};
use crate::error::ServiceResult;
use crate::models::Withdrawal;

/// Withdrawal repository
#[derive(Clone)]
pub struct PgWithdrawalRepo {
    pool: PgPool,
}

impl PgWithdrawalRepo {
    /// Create a new withdrawal repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WithdrawalRepo for PgWithdrawalRepo {
    async fn create(
        &self,
        order_number: &str,
        user_id: i64,
        amount: Decimal,
    ) -> ServiceResult<()> {
        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO withdrawals (order_number, user_id, amount)
                VALUES ($1, $2, $3)
                "#,
            )
            .bind(order_number)
            .bind(user_id)
            .bind(amount)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn list_by_user(
        &self,
        user_id: i64,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> ServiceResult<Vec<Withdrawal>> {
        let (limit, offset) = clamp_page(limit, offset);

        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let rows = sqlx::query(
                r#"
                SELECT order_number, user_id, amount, processed_at
                FROM withdrawals
                WHERE user_id = $1
                ORDER BY processed_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(user_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await?;

            let withdrawals = rows
                .iter()
                .map(|row| Withdrawal {
                    order_number: row.get("order_number"),
                    user_id: row.get("user_id"),
                    amount: row.get("amount"),
                    processed_at: row.get("processed_at"),
                })
                .collect();

            tx.commit().await?;
            Ok(withdrawals)
        })
        .await
    }

    async fn sum_by_user(&self, user_id: i64) -> ServiceResult<Decimal> {
        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(
                r#"
                SELECT COALESCE(SUM(amount), 0::NUMERIC) AS total
                FROM withdrawals
                WHERE user_id = $1
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
