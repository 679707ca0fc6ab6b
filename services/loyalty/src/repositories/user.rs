//! User repository backed by PostgreSQL

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{UserRepo, bounded, is_unique_violation};
use crate::error::{ServiceError, ServiceResult};
use crate::models::User;

/// User repository
#[derive(Clone)]
pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create(&self, login: &str, password_hash: &str) -> ServiceResult<i64> {
        debug!("Creating user: {}", login);

        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(
                r#"
                INSERT INTO users (login, password_hash)
                VALUES ($1, $2)
                RETURNING id
                "#,
            )
            .bind(login)
            .bind(password_hash)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::ConflictSelf
                } else {
                    ServiceError::Database(e)
                }
            })?;

            tx.commit().await?;
            Ok(row.get("id"))
        })
        .await
    }

    async fn get_by_login(&self, login: &str) -> ServiceResult<User> {
        bounded(async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;

            let row = sqlx::query(
                r#"
                SELECT id, login, password_hash
                FROM users
                WHERE login = $1
                "#,
            )
            .bind(login)
            .fetch_optional(&mut *tx)
            .await?;

            let user = match row {
                Some(row) => User {
                    id: row.get("id"),
                    login: row.get("login"),
                    password_hash: row.get("password_hash"),
                },
                None => return Err(ServiceError::NotFound),
            };

            tx.commit().await?;
            Ok(user)
        })
        .await
    }
}
