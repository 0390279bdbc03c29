//! Encrypted map of remembered accounts.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::vault::{AtomicBlobStore, CredentialVault, VaultError, VaultResult};
use crate::Environment;

use super::record::{AccountKey, AccountRecord, AccountUpdate};
use super::ACCOUNTS_BLOB_ID;

type AccountMap = BTreeMap<AccountKey, AccountRecord>;

/// Remembered accounts persisted as one encrypted blob.
///
/// Every mutation loads the whole map, changes it and writes the whole map
/// back. A blob that cannot be read or decrypted is treated as an empty map.
pub struct AccountStore {
    vault: Arc<CredentialVault>,
    blob_store: Arc<dyn AtomicBlobStore>,
    write_lock: Mutex<()>,
}

impl AccountStore {
    /// Creates a store persisting through `blob_store`, sealed by `vault`.
    #[must_use]
    pub fn new(vault: Arc<CredentialVault>, blob_store: Arc<dyn AtomicBlobStore>) -> Self {
        Self {
            vault,
            blob_store,
            write_lock: Mutex::new(()),
        }
    }

    /// Merges `update` into the stored record (creating it if needed) and
    /// returns the merged record.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated map cannot be encrypted or written.
    pub fn upsert(&self, update: AccountUpdate) -> VaultResult<AccountRecord> {
        let _guard = self.lock()?;
        let mut accounts = self.load();
        let key = update.account_key.clone();
        let record = AccountRecord::merged(accounts.remove(&key), update);
        accounts.insert(key, record.clone());
        self.persist(&accounts)?;
        Ok(record)
    }

    /// Returns the stored record for `account_key`.
    #[must_use]
    pub fn find(&self, account_key: &AccountKey) -> Option<AccountRecord> {
        self.load().remove(account_key)
    }

    /// Records sorted by last login, most recent first, optionally limited to
    /// one environment.
    #[must_use]
    pub fn list_recent(&self, environment: Option<Environment>) -> Vec<AccountRecord> {
        let mut records: Vec<AccountRecord> = self
            .load()
            .into_iter()
            .filter(|(key, _)| environment.is_none_or(|env| key.belongs_to(env)))
            .map(|(_, record)| record)
            .collect();
        records.sort_by(|a, b| b.last_login_at.cmp(&a.last_login_at));
        records
    }

    /// Removes `account_key`. Removing an unknown account is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the updated map cannot be encrypted or written.
    pub fn delete(&self, account_key: &AccountKey) -> VaultResult<()> {
        let _guard = self.lock()?;
        let mut accounts = self.load();
        if accounts.remove(account_key).is_none() {
            return Ok(());
        }
        self.persist(&accounts)
    }

    fn lock(&self) -> VaultResult<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| VaultError::BlobStore("account store mutex poisoned".to_string()))
    }

    fn load(&self) -> AccountMap {
        match self.try_load() {
            Ok(accounts) => accounts,
            Err(err) => {
                log::warn!("discarding unreadable account store: {err}");
                AccountMap::new()
            }
        }
    }

    fn try_load(&self) -> VaultResult<AccountMap> {
        match self.blob_store.read(ACCOUNTS_BLOB_ID.to_string())? {
            Some(bytes) => self.vault.decrypt(&bytes),
            None => Ok(AccountMap::new()),
        }
    }

    fn persist(&self, accounts: &AccountMap) -> VaultResult<()> {
        let bytes = self.vault.encrypt(accounts)?;
        self.blob_store
            .write_atomic(ACCOUNTS_BLOB_ID.to_string(), bytes)?;
        log::debug!("persisted {} remembered accounts", accounts.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_token;
    use crate::vault::memory::{InMemoryBlobStore, InMemorySecureKeyStore};

    fn store() -> (Arc<InMemoryBlobStore>, AccountStore) {
        let vault = Arc::new(CredentialVault::new(Arc::new(InMemorySecureKeyStore::new())));
        let blobs = Arc::new(InMemoryBlobStore::new());
        (blobs.clone(), AccountStore::new(vault, blobs))
    }

    fn key(raw: &str) -> AccountKey {
        AccountKey::parse(raw).unwrap()
    }

    #[test]
    fn test_upsert_merges_field_by_field() {
        let (_, store) = store();
        store
            .upsert(
                AccountUpdate::new(key("alice__prod"))
                    .last_login_at(100)
                    .biometric_enabled(true),
            )
            .unwrap();
        let merged = store
            .upsert(
                AccountUpdate::new(key("alice__prod"))
                    .last_login_at(200)
                    .password("new"),
            )
            .unwrap();

        assert_eq!(merged.password, "new");
        assert_eq!(merged.last_login_at, 200);
        assert!(merged.biometric_enabled);
        assert_eq!(store.list_recent(None), vec![merged]);
    }

    #[test]
    fn test_identical_upsert_is_idempotent() {
        let (_, store) = store();
        let update = AccountUpdate::new(key("bob__staging"))
            .password("p")
            .last_login_at(5);
        let first = store.upsert(update.clone()).unwrap();
        let second = store.upsert(update).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list_recent(None).len(), 1);
    }

    #[test]
    fn test_delete_missing_key_is_noop() {
        let (blobs, store) = store();
        store.delete(&key("ghost__prod")).unwrap();
        assert!(blobs.read(ACCOUNTS_BLOB_ID.to_string()).unwrap().is_none());

        store.upsert(AccountUpdate::new(key("alice__prod"))).unwrap();
        store.delete(&key("alice__prod")).unwrap();
        store.delete(&key("alice__prod")).unwrap();
        assert!(store.find(&key("alice__prod")).is_none());
    }

    #[test]
    fn test_list_recent_sorts_and_filters() {
        let (_, store) = store();
        for (raw, at) in [("a__prod", 10), ("b__prod", 30), ("c__staging", 20)] {
            store
                .upsert(AccountUpdate::new(key(raw)).last_login_at(at))
                .unwrap();
        }

        let all: Vec<String> = store
            .list_recent(None)
            .into_iter()
            .map(|r| r.account_key)
            .collect();
        assert_eq!(all, vec!["b__prod", "c__staging", "a__prod"]);

        let prod: Vec<String> = store
            .list_recent(Some(Environment::Production))
            .into_iter()
            .map(|r| r.account_key)
            .collect();
        assert_eq!(prod, vec!["b__prod", "a__prod"]);
    }

    #[test]
    fn test_persisted_blob_is_encrypted() {
        let (blobs, store) = store();
        store
            .upsert(
                AccountUpdate::new(key("alice__prod"))
                    .password("correct horse battery staple")
                    .token(test_token("access-token-value", 60, 0)),
            )
            .unwrap();
        let blob = blobs.read(ACCOUNTS_BLOB_ID.to_string()).unwrap().unwrap();
        let haystack = String::from_utf8_lossy(&blob);
        assert!(!haystack.contains("correct horse"));
        assert!(!haystack.contains("access-token-value"));
    }

    #[test]
    fn test_corrupt_blob_is_treated_as_empty() {
        let (blobs, store) = store();
        store
            .upsert(AccountUpdate::new(key("alice__prod")).last_login_at(1))
            .unwrap();
        blobs
            .write_atomic(ACCOUNTS_BLOB_ID.to_string(), vec![0xAB; 80])
            .unwrap();

        assert!(store.list_recent(None).is_empty());
        assert!(store.find(&key("alice__prod")).is_none());

        let record = store
            .upsert(AccountUpdate::new(key("bob__prod")).last_login_at(2))
            .unwrap();
        assert_eq!(store.list_recent(None), vec![record]);
    }
}
