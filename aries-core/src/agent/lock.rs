use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use derive_more::Display;

use rst_common::with_tokio::tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// `ExchangeKey` identifies one protocol exchange, `protocol:thread_id:connection_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub struct ExchangeKey(String);

impl ExchangeKey {
    pub fn new(protocol: &str, thread_id: &str, connection_id: Option<&str>) -> Self {
        Self(format!(
            "{}:{}:{}",
            protocol,
            thread_id,
            connection_id.unwrap_or("-")
        ))
    }
}

/// `ExchangeLocks` serializes the check-then-set sequence of concurrent messages touching the
/// same exchange
///
/// Distinct keys never block each other. Idle entries are pruned on every acquisition.
#[derive(Clone, Default)]
pub struct ExchangeLocks {
    entries: Arc<Mutex<HashMap<ExchangeKey, Arc<AsyncMutex<()>>>>>,
}

impl ExchangeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: ExchangeKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, entry| Arc::strong_count(entry) > 1);
            entries.entry(key).or_default().clone()
        };

        lock.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use rst_common::with_tokio::tokio;

    #[tokio::test]
    async fn test_same_key_serialized() {
        let locks = ExchangeLocks::new();
        let key = ExchangeKey::new("issue-credential", "thread-1", Some("conn-1"));

        let guard = locks.acquire(key.clone()).await;
        let waiting = tokio::time::timeout(Duration::from_millis(50), locks.acquire(key.clone())).await;
        assert!(waiting.is_err());

        drop(guard);
        let acquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(key)).await;
        assert!(acquired.is_ok())
    }

    #[tokio::test]
    async fn test_distinct_keys_independent() {
        let locks = ExchangeLocks::new();
        let _first = locks
            .acquire(ExchangeKey::new("issue-credential", "thread-1", None))
            .await;

        let second = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(ExchangeKey::new("issue-credential", "thread-2", None)),
        )
        .await;
        assert!(second.is_ok())
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = ExchangeLocks::new();
        {
            let _guard = locks
                .acquire(ExchangeKey::new("present-proof", "thread-1", None))
                .await;
        }

        let _guard = locks
            .acquire(ExchangeKey::new("present-proof", "thread-2", None))
            .await;
        assert_eq!(locks.len(), 1)
    }

    #[test]
    fn test_exchange_key_display() {
        let key = ExchangeKey::new("connections", "thread-1", None);
        assert_eq!(key.to_string(), "connections:thread-1:-")
    }
}
