//! Derived user balance

use rust_decimal::Decimal;

/// Point balance derived from processed accruals minus withdrawals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balance {
    pub current: Decimal,
    pub withdrawn: Decimal,
}
