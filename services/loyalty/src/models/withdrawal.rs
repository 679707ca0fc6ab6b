//! Withdrawal model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Loyalty points withdrawal by a user. Append-only: rows are never
/// updated or deleted. The order number is a client-supplied identifier
/// and does not have to exist as an uploaded order.
#[derive(Debug, Clone)]
pub struct Withdrawal {
    pub order_number: String,
    pub user_id: i64,
    pub amount: Decimal,
    pub processed_at: DateTime<Utc>,
}
