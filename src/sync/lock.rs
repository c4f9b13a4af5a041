//! Cooperative lock around push and pull.
//!
//! The lock is a single record in a shared [`KeyValueStore`]. Records older
//! than `stale_after` are ignored, so a context that died while holding the
//! lock cannot block everyone forever. Writers confirm ownership by reading
//! the slot back after a short delay; the store is last-write-wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use super::kv::{KeyValueStore, KvError};

const LOCK_KEY: &str = "marksync.syncLock";

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another sync is in progress ({operation})")]
    Busy { operation: String },
    #[error("Lock storage error: {0}")]
    Storage(#[from] KvError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// What is stored in the lock slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub holder: String,
    /// Epoch milliseconds
    pub acquired_at: i64,
    pub operation: String,
}

#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    pub stale_after: Duration,
    pub confirm_delay: Duration,
    /// Base sleep between attempts; each sleep is jittered by ±50%
    pub retry_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(30),
            confirm_delay: Duration::from_millis(100),
            retry_backoff: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_for_ms: Option<u64>,
}

pub struct SyncLock {
    store: Arc<dyn KeyValueStore>,
    config: LockConfig,
}

fn new_token() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}-{}", host, Uuid::new_v4())
}

impl SyncLock {
    pub fn new(store: Arc<dyn KeyValueStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    async fn read_record(&self) -> Result<Option<LockRecord>, LockError> {
        let Some(value) = self.store.get(LOCK_KEY).await? else {
            return Ok(None);
        };
        match serde_json::from_value(value) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                log::warn!("Sync lock: ignoring unreadable lock record: {}", e);
                Ok(None)
            }
        }
    }

    fn age_ms(record: &LockRecord) -> i64 {
        Utc::now().timestamp_millis() - record.acquired_at
    }

    fn is_fresh(&self, record: &LockRecord) -> bool {
        Self::age_ms(record) < self.config.stale_after.as_millis() as i64
    }

    fn jittered_backoff(&self) -> Duration {
        let factor = rand::thread_rng().gen_range(0.5..1.5);
        self.config.retry_backoff.mul_f64(factor)
    }

    /// Try to take the lock until `timeout` elapses. Returns the holder token,
    /// or `None` if someone else kept it for the whole time.
    pub async fn acquire(&self, operation: &str, timeout: Duration) -> Result<Option<String>, LockError> {
        let deadline = Instant::now() + timeout;
        let token = new_token();

        loop {
            let current = self.read_record().await?;
            let free = match &current {
                None => true,
                Some(record) => !self.is_fresh(record),
            };

            if free {
                if let Some(stale) = &current {
                    log::warn!(
                        "Sync lock: taking over stale lock from {} ({}, {} ms old)",
                        stale.holder,
                        stale.operation,
                        Self::age_ms(stale)
                    );
                }
                let record = LockRecord {
                    holder: token.clone(),
                    acquired_at: Utc::now().timestamp_millis(),
                    operation: operation.to_string(),
                };
                self.store.set(LOCK_KEY, serde_json::to_value(&record)?).await?;
                sleep(self.config.confirm_delay).await;

                match self.read_record().await? {
                    Some(landed) if landed.holder == token => {
                        log::info!("Sync lock: acquired for {}", operation);
                        return Ok(Some(token));
                    }
                    _ => log::debug!("Sync lock: lost the race for {}", operation),
                }
            }

            let now = Instant::now();
            if now >= deadline {
                log::info!("Sync lock: gave up waiting for {}", operation);
                return Ok(None);
            }
            sleep(self.jittered_backoff().min(deadline - now)).await;
        }
    }

    /// Release the lock if `token` still holds it. Returns whether anything
    /// was released.
    pub async fn release(&self, token: &str) -> Result<bool, LockError> {
        match self.read_record().await? {
            Some(record) if record.holder == token => {
                self.store.remove(LOCK_KEY).await?;
                log::info!("Sync lock: released ({})", record.operation);
                Ok(true)
            }
            _ => {
                log::debug!("Sync lock: release by a stale token ignored");
                Ok(false)
            }
        }
    }

    /// Clear the slot whoever holds it.
    pub async fn force_release(&self) -> Result<(), LockError> {
        if let Some(record) = self.read_record().await? {
            log::warn!("Sync lock: force-releasing lock held by {} ({})", record.holder, record.operation);
        }
        self.store.remove(LOCK_KEY).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<LockStatus, LockError> {
        let status = match self.read_record().await? {
            Some(record) if self.is_fresh(&record) => LockStatus {
                locked: true,
                held_for_ms: Some(Self::age_ms(&record).max(0) as u64),
                holder: Some(record.holder),
                operation: Some(record.operation),
            },
            _ => LockStatus {
                locked: false,
                holder: None,
                operation: None,
                held_for_ms: None,
            },
        };
        Ok(status)
    }

    pub async fn is_locked(&self) -> Result<bool, LockError> {
        Ok(self.status().await?.locked)
    }

    /// Run `f` while holding the lock. The lock is released whatever `f`
    /// returns; failing to get it yields [`LockError::Busy`].
    pub async fn with_lock<T, E, F, Fut>(&self, operation: &str, timeout: Duration, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let Some(token) = self.acquire(operation, timeout).await? else {
            let holder = self.status().await?.operation.unwrap_or_else(|| "unknown".to_string());
            return Err(LockError::Busy { operation: holder }.into());
        };

        let result = f().await;
        if let Err(e) = self.release(&token).await {
            log::warn!("Sync lock: failed to release after {}: {}", operation, e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::kv::MemoryKeyValueStore;

    fn fast_config() -> LockConfig {
        LockConfig {
            stale_after: Duration::from_secs(30),
            confirm_delay: Duration::from_millis(5),
            retry_backoff: Duration::from_millis(10),
        }
    }

    fn lock_on(store: &MemoryKeyValueStore) -> SyncLock {
        SyncLock::new(Arc::new(store.clone()), fast_config())
    }

    #[derive(Debug)]
    enum TestError {
        Lock(LockError),
        Failed,
    }

    impl From<LockError> for TestError {
        fn from(e: LockError) -> Self {
            TestError::Lock(e)
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let store = MemoryKeyValueStore::new();
        let lock = lock_on(&store);

        let token = lock.acquire("push", Duration::ZERO).await.unwrap().unwrap();
        let status = lock.status().await.unwrap();
        assert!(status.locked);
        assert_eq!(status.operation.as_deref(), Some("push"));

        assert!(lock.acquire("pull", Duration::from_millis(30)).await.unwrap().is_none());

        assert!(lock.release(&token).await.unwrap());
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_with_foreign_token_is_noop() {
        let store = MemoryKeyValueStore::new();
        let lock = lock_on(&store);
        lock.acquire("push", Duration::ZERO).await.unwrap().unwrap();

        assert!(!lock.release("someone-else").await.unwrap());
        assert!(lock.is_locked().await.unwrap());

        lock.force_release().await.unwrap();
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_lock_can_be_taken_over() {
        let store = MemoryKeyValueStore::new();
        let stale = LockRecord {
            holder: "crashed-context".to_string(),
            acquired_at: Utc::now().timestamp_millis() - 31_000,
            operation: "pull".to_string(),
        };
        store.set(LOCK_KEY, serde_json::to_value(&stale).unwrap()).await.unwrap();

        let lock = lock_on(&store);
        assert!(!lock.is_locked().await.unwrap());
        assert!(lock.acquire("push", Duration::ZERO).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_single_winner() {
        let store = MemoryKeyValueStore::new();
        let a = lock_on(&store);
        let b = lock_on(&store);

        let (first, second) = tokio::join!(
            a.acquire("push", Duration::ZERO),
            b.acquire("pull", Duration::ZERO)
        );
        let winners = [first.unwrap(), second.unwrap()].iter().filter(|t| t.is_some()).count();
        assert_eq!(winners, 1);
    }

    /// Yields on every access so two contenders interleave between reading
    /// the empty slot and writing their record.
    struct YieldingStore {
        inner: MemoryKeyValueStore,
        writes: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl KeyValueStore for YieldingStore {
        async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, KvError> {
            tokio::task::yield_now().await;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), KvError> {
            tokio::task::yield_now().await;
            self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), KvError> {
            tokio::task::yield_now().await;
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_both_write_empty_slot_one_confirms() {
        let store = Arc::new(YieldingStore {
            inner: MemoryKeyValueStore::new(),
            writes: std::sync::atomic::AtomicUsize::new(0),
        });
        let a = SyncLock::new(store.clone(), fast_config());
        let b = SyncLock::new(store.clone(), fast_config());

        let (first, second) = tokio::join!(
            a.acquire("push", Duration::ZERO),
            b.acquire("pull", Duration::ZERO)
        );
        let tokens: Vec<String> = [first.unwrap(), second.unwrap()].into_iter().flatten().collect();

        assert_eq!(store.writes.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(tokens.len(), 1);
        let status = a.status().await.unwrap();
        assert_eq!(status.holder.as_deref(), Some(tokens[0].as_str()));
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let store = MemoryKeyValueStore::new();
        let lock = lock_on(&store);

        let result: Result<(), TestError> = lock
            .with_lock("push", Duration::ZERO, || async { Err(TestError::Failed) })
            .await;
        assert!(matches!(result, Err(TestError::Failed)));
        assert!(!lock.is_locked().await.unwrap());
    }

    #[tokio::test]
    async fn test_with_lock_reports_busy() {
        let store = MemoryKeyValueStore::new();
        let holder = lock_on(&store);
        holder.acquire("pull", Duration::ZERO).await.unwrap().unwrap();

        let contender = lock_on(&store);
        let result: Result<u32, TestError> = contender
            .with_lock("push", Duration::from_millis(20), || async { Ok(1) })
            .await;
        match result {
            Err(TestError::Lock(LockError::Busy { operation })) => assert_eq!(operation, "pull"),
            other => panic!("expected busy, got {:?}", other),
        }
    }
}
