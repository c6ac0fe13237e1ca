use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SfAuthError};
use crate::store::TokenStorage;

/// File-backed key/value storage
///
/// Keeps a session across process restarts. Entries honour their `max_age`;
/// expired entries read as missing and are dropped on the next write.
///
/// # Directory Structure
/// ```text
/// ~/.cache/securet-flow/session/
/// ├── lock                   # Advisory lock file
/// └── session.json           # Key/value entries
/// ```
#[derive(Debug)]
pub struct FileStorage {
    data_file: PathBuf,
    lock_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

impl FileStorage {
    /// Create a file storage rooted at `storage_dir`
    pub fn new(storage_dir: impl AsRef<Path>) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        fs::create_dir_all(&storage_dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&storage_dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self {
            data_file: storage_dir.join("session.json"),
            lock_file: storage_dir.join("lock"),
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "securet-flow").ok_or_else(|| {
            SfAuthError::Storage("Could not determine cache directory".to_string())
        })?;

        Ok(project_dirs.cache_dir().join("session"))
    }

    fn acquire_lock(&self) -> Result<fs::File> {
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)?;

        lock_file
            .lock_exclusive()
            .map_err(|e| SfAuthError::Storage(format!("Failed to lock session file: {}", e)))?;

        Ok(lock_file)
    }

    fn load_entries(&self) -> Result<HashMap<String, StoredValue>> {
        if !self.data_file.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.data_file)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| SfAuthError::Storage(format!("Invalid session file: {}", e)))
    }

    fn save_entries(&self, entries: &HashMap<String, StoredValue>) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.data_file.with_extension("tmp");
        {
            let mut file = fs::File::create(&temp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.data_file)?;

        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, StoredValue>)) -> Result<()> {
        let lock = self.acquire_lock()?;

        let mut entries = self.load_entries()?;
        entries.retain(|_, v| !v.is_expired());
        apply(&mut entries);
        let result = self.save_entries(&entries);

        let _ = FileExt::unlock(&lock);
        result
    }
}

impl TokenStorage for FileStorage {
    fn name(&self) -> &'static str {
        "file"
    }

    fn set(&self, key: &str, value: &str, max_age: Option<Duration>) -> Result<()> {
        let expires_at = max_age
            .map(|age| chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX))
            .and_then(|age| Utc::now().checked_add_signed(age));

        self.update(|entries| {
            entries.insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    expires_at,
                },
            );
        })
    }

    fn get(&self, key: &str) -> Option<String> {
        match self.load_entries() {
            Ok(entries) => entries
                .get(key)
                .filter(|v| !v.is_expired())
                .map(|v| v.value.clone()),
            Err(e) => {
                tracing::error!("Failed to read session file: {}", e);
                None
            }
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_storage() -> (FileStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_set_and_get() {
        let (storage, _temp) = create_test_storage();

        storage.set("auth_token", "T1", Some(Duration::from_secs(3600))).unwrap();

        assert_eq!(storage.get("auth_token").as_deref(), Some("T1"));
        assert!(storage.probe());
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        FileStorage::new(temp_dir.path())
            .unwrap()
            .set("auth_user", r#"{"id":"1"}"#, None)
            .unwrap();

        let reopened = FileStorage::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.get("auth_user").as_deref(), Some(r#"{"id":"1"}"#));
    }

    #[test]
    fn test_expired_entry_reads_as_missing() {
        let (storage, _temp) = create_test_storage();

        storage.set("auth_token", "T1", Some(Duration::ZERO)).unwrap();

        assert_eq!(storage.get("auth_token"), None);
    }

    #[test]
    fn test_remove() {
        let (storage, _temp) = create_test_storage();

        storage.set("refresh_token", "R1", None).unwrap();
        storage.remove("refresh_token").unwrap();
        storage.remove("refresh_token").unwrap();

        assert_eq!(storage.get("refresh_token"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let (storage, temp) = create_test_storage();

        storage.set("auth_token", "T1", None).unwrap();

        let mode = fs::metadata(temp.path().join("session.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
