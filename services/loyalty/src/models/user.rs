//! User model

use serde::{Deserialize, Serialize};

/// Service user. Created at registration and immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub login: String,
    pub password_hash: String,
}
