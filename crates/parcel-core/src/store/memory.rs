// # Memory Config Store
//
// In-memory implementation of ConfigStore.
//
// Entries are lost on restart. Useful for tests and for embedding the
// wizard in an application that persists entries itself.

use std::collections::BTreeMap;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::ConfigEntry;
use crate::traits::ConfigStore;
use crate::Error;

/// In-memory config store implementation
///
/// # Example
///
/// ```rust,no_run
/// use parcel_core::config::{ConfigEntry, Credentials, TrackerConfig};
/// use parcel_core::store::MemoryConfigStore;
/// use parcel_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryConfigStore::new();
///     let config = TrackerConfig::new(Credentials::new("key", None), vec!["123".into()], 30);
///     let entry = ConfigEntry::new(config);
///     let id = entry.unique_id.clone();
///
///     store.insert(entry).await?;
///     assert!(store.contains(&id).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<BTreeMap<String, ConfigEntry>>>,
}

impl MemoryConfigStore {
    /// Create a new empty memory config store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of entries in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn contains(&self, unique_id: &str) -> Result<bool, Error> {
        Ok(self.inner.read().await.contains_key(unique_id))
    }

    async fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>, Error> {
        Ok(self.inner.read().await.get(unique_id).cloned())
    }

    async fn insert(&self, entry: ConfigEntry) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        if guard.contains_key(&entry.unique_id) {
            return Err(Error::store(format!(
                "Entry already configured: {}",
                entry.unique_id
            )));
        }
        guard.insert(entry.unique_id.clone(), entry);
        Ok(())
    }

    async fn remove(&self, unique_id: &str) -> Result<(), Error> {
        self.inner.write().await.remove(unique_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConfigEntry>, Error> {
        Ok(self.inner.read().await.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
