//! Domain models for the loyalty service

pub mod balance;
pub mod order;
pub mod user;
pub mod withdrawal;

// Re-export for convenience
pub use balance::Balance;
pub use order::{Order, OrderStatus};
pub use user::User;
pub use withdrawal::Withdrawal;
