//! Application state shared across handlers

use std::sync::Arc;

use crate::balance::BalanceService;
use crate::jwt::JwtService;
use crate::order::OrderService;
use crate::repositories::{OrderRepo, Pinger, WithdrawalRepo, UserRepo};
use crate::withdraw::WithdrawService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<dyn UserRepo>,
    pub orders: Arc<dyn OrderRepo>,
    pub withdrawals: Arc<dyn WithdrawalRepo>,
    pub balance: Arc<BalanceService>,
    pub withdraw: Arc<WithdrawService>,
    pub order_ingress: OrderService,
    pub jwt: JwtService,
    pub pinger: Arc<dyn Pinger>,
}
