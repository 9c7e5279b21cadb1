// # Config Store Trait
//
// Defines the interface for persisting configuration entries.
//
// ## Purpose
//
// The store keeps every entry created by the setup wizard, keyed by its
// unique identity (the sorted, joined tracking numbers). The wizard uses
// `contains()` to refuse configuring the same set of shipments twice.
//
// ## Implementations
//
// - In-memory: `MemoryConfigStore`
// - File-based: `FileConfigStore` (JSON, atomic writes, backup recovery)

use async_trait::async_trait;

use crate::config::ConfigEntry;

/// Trait for config store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Check whether an entry with this unique id exists
    async fn contains(&self, unique_id: &str) -> Result<bool, crate::Error>;

    /// Get an entry by unique id
    async fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>, crate::Error>;

    /// Insert a new entry
    ///
    /// Entries are immutable once stored: inserting an id that already
    /// exists fails with [`crate::Error::Store`].
    async fn insert(&self, entry: ConfigEntry) -> Result<(), crate::Error>;

    /// Remove an entry (no-op if absent)
    async fn remove(&self, unique_id: &str) -> Result<(), crate::Error>;

    /// List all entries, ordered by unique id
    async fn list(&self) -> Result<Vec<ConfigEntry>, crate::Error>;

    /// Flush pending writes
    async fn flush(&self) -> Result<(), crate::Error>;
}
