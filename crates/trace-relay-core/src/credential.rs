//! Credentials and the best-effort credential provider.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::traits::CredentialStore;

/// Username/password pair keyed by a resource identifier.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub resource_id: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    #[must_use]
    pub fn new(
        resource_id: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// A credential is usable only if every part is non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.resource_id.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("resource_id", &self.resource_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Wraps a [`CredentialStore`] and absorbs all of its failures.
///
/// A missing or broken store must never block a connection attempt, so
/// `load` degrades to `None` and `store` only logs.
#[derive(Clone)]
pub struct CredentialProvider {
    store: Arc<dyn CredentialStore>,
}

impl CredentialProvider {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Look up the cached credential for `resource_id`.
    pub async fn load(&self, resource_id: &str) -> Option<Credential> {
        match self.store.find(resource_id).await {
            Ok(Some(cred)) if cred.is_complete() => Some(cred),
            Ok(Some(_)) => {
                tracing::debug!(resource_id, "Ignoring incomplete cached credential");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::debug!(resource_id, "Credential lookup failed: {e}");
                None
            }
        }
    }

    /// Persist `credential`; failures are logged and otherwise ignored.
    pub async fn store(&self, credential: &Credential) {
        if let Err(e) = self.store.save(credential).await {
            tracing::debug!(
                resource_id = %credential.resource_id,
                "Credential store failed: {e}"
            );
        }
    }
}

impl std::fmt::Debug for CredentialProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialProvider").finish_non_exhaustive()
    }
}
