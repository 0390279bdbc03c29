//! In-memory implementations of the platform stores.
//!
//! These are NOT secure for production use. They back unit and integration
//! tests and previews that run without a device keychain.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{
    error::{VaultError, VaultResult},
    traits::{AtomicBlobStore, SecureKeyStore},
};

/// Key store that keeps entries in a map and records every operation.
#[derive(Default)]
pub struct InMemorySecureKeyStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    operations: Mutex<Vec<String>>,
}

impl InMemorySecureKeyStore {
    /// Creates an empty key store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations performed so far, as `"<op> <id>"`.
    #[must_use]
    pub fn operations(&self) -> Vec<String> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    /// Number of `set` calls performed so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.operations()
            .iter()
            .filter(|op| op.starts_with("set "))
            .count()
    }

    fn record(&self, op: &str, id: &str) -> VaultResult<()> {
        self.operations
            .lock()
            .map_err(|_| VaultError::KeyStore("mutex poisoned".to_string()))?
            .push(format!("{op} {id}"));
        Ok(())
    }
}

impl SecureKeyStore for InMemorySecureKeyStore {
    fn get(&self, id: String) -> VaultResult<Option<Vec<u8>>> {
        self.record("get", &id)?;
        let entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::KeyStore("mutex poisoned".to_string()))?;
        Ok(entries.get(&id).cloned())
    }

    fn set(&self, id: String, bytes: Vec<u8>) -> VaultResult<()> {
        self.record("set", &id)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| VaultError::KeyStore("mutex poisoned".to_string()))?;
        // Mirrors errSecDuplicateItem.
        if entries.contains_key(&id) {
            return Err(VaultError::KeyStore(format!("duplicate item: {id}")));
        }
        entries.insert(id, bytes);
        Ok(())
    }

    fn delete(&self, id: String) -> VaultResult<()> {
        self.record("delete", &id)?;
        self.entries
            .lock()
            .map_err(|_| VaultError::KeyStore("mutex poisoned".to_string()))?
            .remove(&id);
        Ok(())
    }
}

/// Blob store that keeps blobs in a map.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    /// Creates an empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AtomicBlobStore for InMemoryBlobStore {
    fn read(&self, path: String) -> VaultResult<Option<Vec<u8>>> {
        let guard = self
            .blobs
            .lock()
            .map_err(|_| VaultError::BlobStore("mutex poisoned".to_string()))?;
        Ok(guard.get(&path).cloned())
    }

    fn write_atomic(&self, path: String, bytes: Vec<u8>) -> VaultResult<()> {
        self.blobs
            .lock()
            .map_err(|_| VaultError::BlobStore("mutex poisoned".to_string()))?
            .insert(path, bytes);
        Ok(())
    }

    fn delete(&self, path: String) -> VaultResult<()> {
        self.blobs
            .lock()
            .map_err(|_| VaultError::BlobStore("mutex poisoned".to_string()))?
            .remove(&path);
        Ok(())
    }
}
