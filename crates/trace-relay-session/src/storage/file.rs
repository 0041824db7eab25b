//! File-backed credential vault.
//!
//! Credentials are kept in a single JSON document keyed by resource
//! identifier. On Unix the file is created with owner-only permissions.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, io::AsyncWriteExt, sync::Mutex};
use trace_relay_core::{Credential, CredentialStore, StoreError};

const APP_DIR: &str = "trace-relay";
const FILE_NAME: &str = "credentials.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct VaultFile {
    #[serde(default)]
    entries: BTreeMap<String, Entry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    username: String,
    password: String,
}

/// JSON file credential store.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Store at an explicit path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store in the user's configuration directory.
    ///
    /// # Errors
    /// Returns error if the platform has no configuration directory.
    pub fn in_config_dir() -> Result<Self, StoreError> {
        let dir = dirs::config_dir()
            .ok_or_else(|| StoreError::Unavailable("no configuration directory".to_string()))?;
        Ok(Self::new(dir.join(APP_DIR).join(FILE_NAME)))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<VaultFile, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(VaultFile::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, vault: &VaultFile) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(vault)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = create_private(&tmp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

/// Create `path` fresh, readable by the owner only from the first byte on.
///
/// A leftover file is removed first so its permissions are not inherited.
async fn create_private(path: &Path) -> Result<File, StoreError> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
        _ => {}
    }
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    Ok(options.open(path).await?)
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn find(&self, resource_id: &str) -> Result<Option<Credential>, StoreError> {
        let vault = self.read().await?;
        Ok(vault
            .entries
            .get(resource_id)
            .map(|e| Credential::new(resource_id, &e.username, &e.password)))
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut vault = self.read().await?;
        vault.entries.insert(
            credential.resource_id.clone(),
            Entry {
                username: credential.username.clone(),
                password: credential.password.clone(),
            },
        );
        self.write(&vault).await?;
        tracing::debug!(resource_id = %credential.resource_id, path = ?self.path, "Saved credential");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("none.json"));
        assert!(store.find("https://localhost:443/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(FILE_NAME);
        let cred = Credential::new("https://localhost:443/", "admin", "pw");

        tokio_test::assert_ok!(FileCredentialStore::new(&path).save(&cred).await);
        tokio_test::assert_ok!(
            FileCredentialStore::new(&path)
                .save(&Credential::new("https://device:50443/", "u", "p"))
                .await
        );

        let reopened = FileCredentialStore::new(&path);
        assert_eq!(reopened.find("https://localhost:443/").await.unwrap(), Some(cred));
        assert_eq!(
            reopened
                .find("https://device:50443/")
                .await
                .unwrap()
                .unwrap()
                .username,
            "u"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join(FILE_NAME));
        store.save(&Credential::new("r", "u", "p")).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_temp_file_is_owner_only_before_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join("credentials.json.tmp");
        // A world-readable leftover from an interrupted write.
        std::fs::write(&tmp, b"stale").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        let file = create_private(&tmp).await.unwrap();

        let meta = file.metadata().await.unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
        assert_eq!(meta.len(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_save_replaces_stale_temp_file() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, b"stale").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileCredentialStore::new(&path);
        store.save(&Credential::new("r", "u", "p")).await.unwrap();

        assert!(!tmp.exists());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.find("r").await.unwrap().unwrap().password, "p");
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FILE_NAME);
        std::fs::write(&path, b"{ not json").unwrap();

        let store = FileCredentialStore::new(&path);
        assert!(matches!(store.find("r").await, Err(StoreError::Json(_))));
    }
}
