// # File Config Store
//
// File-based implementation of ConfigStore.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Automatic backup: Keeps .backup of the previous file
// - Recovery: Falls back to backup if the main file fails to parse
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "entries": {
//     "parcel_tracker_123_456": {
//       "unique_id": "parcel_tracker_123_456",
//       "title": "DHL (2 shipments)",
//       "data": {
//         "api_key": "...",
//         "api_secret": null,
//         "tracking_numbers": ["456", "123"],
//         "poll_interval_minutes": 30
//       },
//       "created_at": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::config::ConfigEntry;
use crate::traits::ConfigStore;
use crate::Error;

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

/// File-based config store with crash recovery
///
/// Every mutation is written to disk before the call returns.
///
/// # Example
///
/// ```rust,no_run
/// use parcel_core::store::FileConfigStore;
/// use parcel_core::traits::ConfigStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileConfigStore::new("/var/lib/parcel-tracker/entries.json").await?;
///     for entry in store.list().await? {
///         println!("{}: {}", entry.unique_id, entry.title);
///     }
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileConfigStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, ConfigEntry>>,
}

/// Serializable store file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StoreFileFormat {
    version: String,
    entries: BTreeMap<String, ConfigEntry>,
}

impl FileConfigStore {
    /// Create or load a file config store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing store file
    /// 3. If it fails to parse, try the backup
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let entries = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load entries from file with automatic recovery
    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, ConfigEntry>, Error> {
        let content = match Self::read(path).await? {
            Some(content) => content,
            None => {
                tracing::debug!("Store file does not exist: {}", path.display());
                return Ok(BTreeMap::new());
            }
        };

        match Self::parse(&content) {
            Ok(entries) => {
                tracing::debug!("Loaded {} config entries from {}", entries.len(), path.display());
                Ok(entries)
            }
            Err(e) => {
                tracing::warn!(
                    "Store file appears corrupted: {}. Attempting recovery from backup.",
                    e
                );

                let backup_path = Self::backup_path(path);
                let backup = match Self::read(&backup_path).await? {
                    Some(backup) => backup,
                    None => {
                        tracing::warn!("No backup file found. Starting with empty store.");
                        return Ok(BTreeMap::new());
                    }
                };

                match Self::parse(&backup) {
                    Ok(entries) => {
                        tracing::info!("Recovered {} config entries from backup", entries.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(entries)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also corrupted: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
        }
    }

    async fn read(path: &Path) -> Result<Option<String>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read store file {}: {}", path.display(), e))
        })?;
        Ok(Some(content))
    }

    fn parse(content: &str) -> Result<BTreeMap<String, ConfigEntry>, Error> {
        let file: StoreFileFormat = serde_json::from_str(content)?;

        if file.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                file.version
            );
        }

        Ok(file.entries)
    }

    /// Write entries to file atomically
    async fn write(&self, entries: &BTreeMap<String, ConfigEntry>) -> Result<(), Error> {
        let file = StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            entries: entries.clone(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| Error::store(format!("Failed to serialize store: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut out = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            out.flush().await.map_err(|e| {
                Error::store(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn contains(&self, unique_id: &str) -> Result<bool, Error> {
        Ok(self.entries.read().await.contains_key(unique_id))
    }

    async fn get(&self, unique_id: &str) -> Result<Option<ConfigEntry>, Error> {
        Ok(self.entries.read().await.get(unique_id).cloned())
    }

    async fn insert(&self, entry: ConfigEntry) -> Result<(), Error> {
        // Hold the write lock across the disk write so concurrent inserts
        // cannot interleave their files.
        let mut guard = self.entries.write().await;
        if guard.contains_key(&entry.unique_id) {
            return Err(Error::store(format!(
                "Entry already configured: {}",
                entry.unique_id
            )));
        }

        let mut updated = guard.clone();
        updated.insert(entry.unique_id.clone(), entry);
        self.write(&updated).await?;
        *guard = updated;
        Ok(())
    }

    async fn remove(&self, unique_id: &str) -> Result<(), Error> {
        let mut guard = self.entries.write().await;
        if !guard.contains_key(unique_id) {
            return Ok(());
        }

        let mut updated = guard.clone();
        updated.remove(unique_id);
        self.write(&updated).await?;
        *guard = updated;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ConfigEntry>, Error> {
        Ok(self.entries.read().await.values().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Mutations are written through; nothing is pending.
        Ok(())
    }
}
