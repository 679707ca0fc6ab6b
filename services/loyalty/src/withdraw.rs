//! Withdrawal service

use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::balance::Invalidator;
use crate::error::{ServiceError, ServiceResult};
use crate::luhn;
use crate::repositories::{OrderRepo, WithdrawalRepo};

/// Withdrawal service
pub struct WithdrawService {
    orders: Arc<dyn OrderRepo>,
    withdrawals: Arc<dyn WithdrawalRepo>,
    invalidator: Arc<dyn Invalidator>,
}

impl WithdrawService {
    /// Create a new withdrawal service
    pub fn new(
        orders: Arc<dyn OrderRepo>,
        withdrawals: Arc<dyn WithdrawalRepo>,
        invalidator: Arc<dyn Invalidator>,
    ) -> Self {
        Self {
            orders,
            withdrawals,
            invalidator,
        }
    }

    /// Debit `amount` against the user's current balance.
    ///
    /// The check and the debit are separate transactions; racing
    /// withdrawals of the same user can both pass the check. The cache is
    /// invalidated after the debit commits and before this returns, so a
    /// follow-up balance read sees the withdrawal.
    pub async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        amount: Decimal,
    ) -> ServiceResult<()> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::Validation(
                "withdrawal amount must be positive".to_string(),
            ));
        }
        if !luhn::is_valid(order_number) {
            return Err(ServiceError::InvalidOrderNumber);
        }

        let accrued = self.orders.sum_processed_accrual_by_user(user_id).await?;
        let withdrawn = self.withdrawals.sum_by_user(user_id).await?;
        let current = accrued - withdrawn;
        if current < amount {
            return Err(ServiceError::InsufficientFunds);
        }

        self.withdrawals
            .create(order_number, user_id, amount)
            .await?;
        self.invalidator.invalidate(user_id);

        info!("Withdrew {} points for user {}", amount, user_id);
        Ok(())
    }
}
