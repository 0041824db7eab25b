//! In-memory credential store.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use trace_relay_core::{Credential, CredentialStore, StoreError};

/// In-memory credential store.
///
/// Useful for tests and hosts without a secret vault.
/// Credentials are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a credential without going through the async API.
    pub fn insert(&self, credential: Credential) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(credential.resource_id.clone(), credential);
        }
    }

    /// Number of stored credentials.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().map_or(0, |e| e.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find(&self, resource_id: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .get(resource_id)
            .cloned())
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
            .insert(credential.resource_id.clone(), credential.clone());
        Ok(())
    }
}
