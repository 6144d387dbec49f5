use super::Store;
use crate::error::{Result, TimberlineError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

#[derive(Debug)]
enum Entry {
    Bytes(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(BTreeSet<String>),
}

/// A [`Store`] that keeps everything in process memory.
///
/// Behaves like the Redis commands the queue engine relies on: lists and
/// sets disappear once they become empty, and touching a key with an
/// operation for another type fails with [`TimberlineError::WrongType`].
///
/// # Examples
///
/// ```
/// use timberline::store::{MemoryStore, Store};
///
/// # tokio_test::block_on(async {
/// let store = MemoryStore::new();
/// assert_eq!(store.append("jobs", b"first".to_vec()).await?, 1);
/// assert_eq!(store.pop("jobs").await?, Some(b"first".to_vec()));
/// # Ok::<(), timberline::TimberlineError>(())
/// # }).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    appended: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn try_pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut entries = self.lock();
        let (item, now_empty) = match entries.get_mut(key) {
            None => return Ok(None),
            Some(Entry::List(list)) => {
                let item = list.pop_front();
                (item, list.is_empty())
            }
            Some(_) => return Err(wrong_type(key)),
        };
        if now_empty {
            entries.remove(key);
        }
        Ok(item)
    }
}

fn wrong_type(key: &str) -> TimberlineError {
    TimberlineError::WrongType {
        key: key.to_string(),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append(&self, key: &str, value: Vec<u8>) -> Result<u64> {
        let length = {
            let mut entries = self.lock();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Entry::List(VecDeque::new()));
            match entry {
                Entry::List(list) => {
                    list.push_back(value);
                    list.len() as u64
                }
                _ => return Err(wrong_type(key)),
            }
        };
        self.appended.notify_waiters();
        Ok(length)
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.try_pop(key)
    }

    async fn pop_blocking(&self, key: &str, timeout: Duration) -> Result<Option<Vec<u8>>> {
        // Too far out to represent means no deadline at all.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            // Register for wake-ups before looking, so an append landing
            // between the check and the wait is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop(key)? {
                return Ok(Some(item));
            }
            match deadline {
                Some(deadline) => {
                    if timeout_at(deadline, notified).await.is_err() {
                        return Ok(None);
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn length(&self, key: &str) -> Result<u64> {
        match self.lock().get(key) {
            None => Ok(0),
            Some(Entry::List(list)) => Ok(list.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn is_member(&self, set_key: &str, member: &str) -> Result<bool> {
        match self.lock().get(set_key) {
            None => Ok(false),
            Some(Entry::Set(set)) => Ok(set.contains(member)),
            Some(_) => Err(wrong_type(set_key)),
        }
    }

    async fn add_member(&self, set_key: &str, member: &str) -> Result<()> {
        let mut entries = self.lock();
        let entry = entries
            .entry(set_key.to_string())
            .or_insert_with(|| Entry::Set(BTreeSet::new()));
        match entry {
            Entry::Set(set) => {
                set.insert(member.to_string());
                Ok(())
            }
            _ => Err(wrong_type(set_key)),
        }
    }

    async fn remove_member(&self, set_key: &str, member: &str) -> Result<()> {
        let mut entries = self.lock();
        let now_empty = match entries.get_mut(set_key) {
            None => return Ok(()),
            Some(Entry::Set(set)) => {
                set.remove(member);
                set.is_empty()
            }
            Some(_) => return Err(wrong_type(set_key)),
        };
        if now_empty {
            entries.remove(set_key);
        }
        Ok(())
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        match self.lock().get(set_key) {
            None => Ok(Vec::new()),
            Some(Entry::Set(set)) => Ok(set.iter().cloned().collect()),
            Some(_) => Err(wrong_type(set_key)),
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.lock().get(key) {
            None => Ok(None),
            Some(Entry::Bytes(bytes)) => Ok(Some(bytes.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        // SET overwrites whatever type was there before.
        self.lock().insert(key.to_string(), Entry::Bytes(value));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.lock().contains_key(key))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete_keys(&self, keys: &[String]) -> Result<()> {
        let mut entries = self.lock();
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn flush_all(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_append_returns_new_length() {
        let store = MemoryStore::new();
        assert_eq!(store.append("list", b"a".to_vec()).await.unwrap(), 1);
        assert_eq!(store.append("list", b"b".to_vec()).await.unwrap(), 2);
        assert_eq!(store.length("list").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_pop_is_fifo_and_removes_empty_list() {
        let store = MemoryStore::new();
        store.append("list", b"a".to_vec()).await.unwrap();
        store.append("list", b"b".to_vec()).await.unwrap();

        assert_eq!(store.pop("list").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.pop("list").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(store.pop("list").await.unwrap(), None);
        assert!(!store.exists("list").await.unwrap());
    }

    #[tokio::test]
    async fn test_length_of_missing_key_is_zero() {
        let store = MemoryStore::new();
        assert_eq!(store.length("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wrong_type_is_reported() {
        let store = MemoryStore::new();
        store.set("plain", b"value".to_vec()).await.unwrap();

        let result = store.append("plain", b"x".to_vec()).await;
        assert!(matches!(result, Err(TimberlineError::WrongType { .. })));
        assert!(store.is_member("plain", "x").await.is_err());
        assert!(store.length("plain").await.is_err());
    }

    #[tokio::test]
    async fn test_set_membership() {
        let store = MemoryStore::new();
        store.add_member("names", "alpha").await.unwrap();
        store.add_member("names", "alpha").await.unwrap();
        store.add_member("names", "beta").await.unwrap();

        assert!(store.is_member("names", "alpha").await.unwrap());
        assert_eq!(store.members("names").await.unwrap(), vec!["alpha", "beta"]);

        store.remove_member("names", "alpha").await.unwrap();
        assert!(!store.is_member("names", "alpha").await.unwrap());
        store.remove_member("names", "beta").await.unwrap();
        assert!(!store.exists("names").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_with_prefix_and_delete() {
        let store = MemoryStore::new();
        store.set("q:a:one", b"1".to_vec()).await.unwrap();
        store.set("q:a:two", b"2".to_vec()).await.unwrap();
        store.set("q:ab:one", b"3".to_vec()).await.unwrap();

        let keys = store.keys_with_prefix("q:a:").await.unwrap();
        assert_eq!(keys, vec!["q:a:one", "q:a:two"]);

        store.delete_keys(&keys).await.unwrap();
        assert_eq!(store.get("q:a:one").await.unwrap(), None);
        assert_eq!(store.get("q:ab:one").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_flush_all() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec()).await.unwrap();
        store.append("b", b"2".to_vec()).await.unwrap();
        store.flush_all().await.unwrap();
        assert!(store.keys_with_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pop_blocking_times_out() {
        let store = MemoryStore::new();
        let started = Instant::now();
        let result = store
            .pop_blocking("empty", Duration::from_millis(200))
            .await
            .unwrap();

        assert_eq!(result, None);
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_pop_blocking_returns_existing_item_immediately() {
        let store = MemoryStore::new();
        store.append("list", b"ready".to_vec()).await.unwrap();

        let started = Instant::now();
        let result = store
            .pop_blocking("list", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(result, Some(b"ready".to_vec()));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_pop_blocking_with_unbounded_timeout() {
        let store = Arc::new(MemoryStore::new());
        store.append("list", b"ready".to_vec()).await.unwrap();
        let result = store.pop_blocking("list", Duration::MAX).await.unwrap();
        assert_eq!(result, Some(b"ready".to_vec()));

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.pop_blocking("list", Duration::MAX).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append("list", b"late".to_vec()).await.unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn test_pop_blocking_wakes_on_append() {
        let store = Arc::new(MemoryStore::new());
        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.pop_blocking("list", Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.append("other", b"ignored".to_vec()).await.unwrap();
        store.append("list", b"late".to_vec()).await.unwrap();

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result, Some(b"late".to_vec()));
        assert_eq!(store.length("other").await.unwrap(), 1);
    }
}
