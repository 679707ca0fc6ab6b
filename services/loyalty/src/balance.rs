//! Balance derivation with short-TTL memoization
//!
//! The balance is derived from the persisted aggregates and memoized in
//! a bounded LRU keyed by user. The cache mutex guards only lookups and
//! inserts; it is never held across a database call.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::ServiceResult;
use crate::models::Balance;
use crate::repositories::{OrderRepo, WithdrawalRepo};

/// Capability to drop a user's cached balance. Held by the withdrawal
/// service and the order updater; both call sites are mandatory, missing
/// ones surface as stale balance reads.
pub trait Invalidator: Send + Sync {
    fn invalidate(&self, user_id: i64);
}

const CACHE_CAPACITY: usize = 1024;
const CACHE_TTL: Duration = Duration::from_secs(30);

struct CacheEntry {
    balance: Balance,
    expires_at: Instant,
}

/// Balance service
pub struct BalanceService {
    orders: Arc<dyn OrderRepo>,
    withdrawals: Arc<dyn WithdrawalRepo>,
    cache: Mutex<LruCache<i64, CacheEntry>>,
    ttl: Duration,
}

impl BalanceService {
    /// Create a new balance service
    pub fn new(orders: Arc<dyn OrderRepo>, withdrawals: Arc<dyn WithdrawalRepo>) -> Self {
        let capacity = NonZeroUsize::new(CACHE_CAPACITY).expect("capacity must be non-zero");
        Self {
            orders,
            withdrawals,
            cache: Mutex::new(LruCache::new(capacity)),
            ttl: CACHE_TTL,
        }
    }

    /// Current and withdrawn totals for the user.
    pub async fn get_balance(&self, user_id: i64) -> ServiceResult<Balance> {
        {
            let mut cache = self.cache.lock().expect("balance cache poisoned");
            if let Some(entry) = cache.get(&user_id) {
                if Instant::now() < entry.expires_at {
                    return Ok(entry.balance);
                }
                cache.pop(&user_id);
            }
        }

        let accrued = self.orders.sum_processed_accrual_by_user(user_id).await?;
        let withdrawn = self.withdrawals.sum_by_user(user_id).await?;
        let balance = Balance {
            current: accrued - withdrawn,
            withdrawn,
        };

        let mut cache = self.cache.lock().expect("balance cache poisoned");
        cache.put(
            user_id,
            CacheEntry {
                balance,
                expires_at: Instant::now() + self.ttl,
            },
        );

        Ok(balance)
    }
}

impl Invalidator for BalanceService {
    fn invalidate(&self, user_id: i64) {
        let mut cache = self.cache.lock().expect("balance cache poisoned");
        cache.pop(&user_id);
    }
}
