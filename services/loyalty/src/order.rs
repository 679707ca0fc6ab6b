//! Order ingress service

use std::sync::Arc;

use crate::error::{ServiceError, ServiceResult};
use crate::luhn;
use crate::models::OrderStatus;
use crate::repositories::{AddOrderOutcome, OrderRepo};

/// Order ingress service
#[derive(Clone)]
pub struct OrderService {
    orders: Arc<dyn OrderRepo>,
}

impl OrderService {
    /// Create a new order service
    pub fn new(orders: Arc<dyn OrderRepo>) -> Self {
        Self { orders }
    }

    /// Register an order number for the user with initial status NEW.
    /// The raw body is trimmed of surrounding ASCII whitespace before the
    /// Luhn check.
    pub async fn add(&self, user_id: i64, number: &str) -> ServiceResult<AddOrderOutcome> {
        let number = number.trim_matches(|c: char| c.is_ascii_whitespace());
        if !luhn::is_valid(number) {
            return Err(ServiceError::InvalidOrderNumber);
        }

        self.orders.add(number, user_id, OrderStatus::New).await
    }
}
