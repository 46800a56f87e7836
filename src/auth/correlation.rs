//! Single-use correlation entries
//!
//! Before a request leaves for the authorize endpoint its `code_verifier`
//! and scope are written under `{prefix}{state}`. The callback consumes the
//! entry exactly once; a replayed or unknown `state` finds nothing.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::error::{PassportError, Result};
use crate::platform::KeyValueStore;
use crate::util::short_state;

/// What a `state` resolves to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationEntry {
    /// PKCE verifier to present at the token endpoint
    #[serde(rename = "v")]
    pub code_verifier: String,

    /// Scope the request asked for
    #[serde(rename = "s")]
    pub scope: String,
}

/// Namespaced, consume-once view over a [`KeyValueStore`]
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use passport_spa::auth::correlation::CorrelationStore;
/// use passport_spa::platform::MemoryStore;
///
/// let store = CorrelationStore::new(Arc::new(MemoryStore::new()), "lpjs.");
/// store.put("abc", "verifier", "*").unwrap();
///
/// let entry = store.take("abc").unwrap();
/// assert_eq!(entry.code_verifier, "verifier");
/// assert!(store.take("abc").is_err());
/// ```
pub struct CorrelationStore {
    backend: Arc<dyn KeyValueStore>,
    prefix: String,
    // Serializes take() so a read and its delete cannot interleave with
    // another take of the same key.
    consume: Mutex<()>,
}

impl CorrelationStore {
    /// Wrap `backend`, storing keys as `{prefix}{state}`
    pub fn new(backend: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            consume: Mutex::new(()),
        }
    }

    /// Key prefix in use
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, state: &str) -> String {
        format!("{}{}", self.prefix, state)
    }

    /// Persist the entry for `state`
    ///
    /// # Errors
    ///
    /// Returns error if serialization or the backend write fails
    pub fn put(&self, state: &str, code_verifier: &str, scope: &str) -> Result<()> {
        let entry = CorrelationEntry {
            code_verifier: code_verifier.to_string(),
            scope: scope.to_string(),
        };
        let value = serde_json::to_string(&entry)?;
        self.backend.set(&self.key(state), &value)?;
        tracing::debug!("Stored correlation entry for state {}", short_state(state));
        Ok(())
    }

    /// Read and delete the entry for `state`
    ///
    /// # Errors
    ///
    /// Returns [`PassportError::InvalidState`] when no entry exists, it was
    /// already consumed, or its stored value cannot be decoded
    pub fn take(&self, state: &str) -> Result<CorrelationEntry> {
        let _guard = self.consume.lock().unwrap_or_else(|e| e.into_inner());
        let key = self.key(state);

        let Some(raw) = self.backend.get(&key)? else {
            tracing::debug!("No correlation entry for state {}", short_state(state));
            return Err(PassportError::InvalidState.into());
        };
        self.backend.remove(&key)?;

        serde_json::from_str(&raw).map_err(|e| {
            tracing::warn!(
                "Discarded undecodable correlation entry for state {}: {}",
                short_state(state),
                e
            );
            PassportError::InvalidState.into()
        })
    }

    /// Delete the entry for `state` without reading it
    ///
    /// # Errors
    ///
    /// Returns error if the backend delete fails
    pub fn remove(&self, state: &str) -> Result<()> {
        self.backend.remove(&self.key(state))
    }
}

impl std::fmt::Debug for CorrelationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
