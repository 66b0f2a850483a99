use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::AppError;

/// Per-account mutual exclusion. Locks are created on first use and held
/// through an owned guard, so every exit path of an operation releases them.
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

pub type AccountGuard = OwnedMutexGuard<()>;

impl AccountLocks {
    pub fn new(timeout: Duration) -> Self {
        AccountLocks {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub async fn acquire(&self, account: &str) -> Result<AccountGuard, AppError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|e| AppError::Others(e.to_string()))?;
            locks
                .entry(account.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| AppError::LockTimeout(account.to_string()))
    }

    /// Drops lock entries nobody holds or waits on.
    pub fn prune_idle(&self) -> usize {
        let Ok(mut locks) = self.locks.lock() else {
            return 0;
        };
        let before = locks.len();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_account_times_out_while_held() {
        let locks = AccountLocks::new(Duration::from_millis(50));
        let _guard = locks.acquire("a").await.unwrap();
        let err = locks.acquire("a").await.unwrap_err();
        assert!(matches!(err, AppError::LockTimeout(id) if id == "a"));
    }

    #[tokio::test]
    async fn test_distinct_accounts_do_not_contend() {
        let locks = AccountLocks::new(Duration::from_millis(50));
        let _a = locks.acquire("a").await.unwrap();
        let _b = locks.acquire("b").await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let locks = AccountLocks::new(Duration::from_millis(50));
        {
            let _guard = locks.acquire("a").await.unwrap();
        }
        assert!(locks.acquire("a").await.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = AccountLocks::new(Duration::from_millis(50));
        let held = locks.acquire("held").await.unwrap();
        drop(locks.acquire("idle").await.unwrap());

        assert_eq!(locks.prune_idle(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune_idle(), 1);
        assert!(locks.is_empty());
    }
}
