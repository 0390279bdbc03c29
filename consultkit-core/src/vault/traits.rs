//! Platform interfaces behind the vault.

use super::error::VaultResult;

/// OS-backed secure storage for small secrets (the vault key).
///
/// Platform implementations:
/// - iOS: Keychain generic passwords with `kSecAttrAccessibleAfterFirstUnlockThisDeviceOnly`
/// - Android: `EncryptedSharedPreferences` backed by the Android Keystore
#[uniffi::export(with_foreign)]
pub trait SecureKeyStore: Send + Sync {
    /// Returns the bytes stored under `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store cannot be read.
    fn get(&self, id: String) -> VaultResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store rejects the write (including
    /// duplicate-item errors when an entry already exists).
    fn set(&self, id: String, bytes: Vec<u8>) -> VaultResult<()>;

    /// Removes the entry under `id`. Removing a missing entry succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform store cannot be written.
    fn delete(&self, id: String) -> VaultResult<()>;
}

/// Atomic blob store for the encrypted account map.
#[uniffi::export(with_foreign)]
pub trait AtomicBlobStore: Send + Sync {
    /// Reads the blob at `path`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, path: String) -> VaultResult<Option<Vec<u8>>>;

    /// Writes bytes atomically to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, path: String, bytes: Vec<u8>) -> VaultResult<()>;

    /// Deletes the blob at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, path: String) -> VaultResult<()>;
}
