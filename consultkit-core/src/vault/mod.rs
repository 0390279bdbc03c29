//! Encryption at rest for on-device credentials.
//!
//! The [`CredentialVault`] seals arbitrary serializable records with a 256-bit
//! key that only ever lives in the platform [`SecureKeyStore`] (iOS Keychain,
//! Android Keystore-wrapped preferences) and in the vault's memory. Sealed
//! blobs are persisted through an [`AtomicBlobStore`].

mod credential_vault;
mod error;
pub mod memory;
mod traits;

pub use credential_vault::CredentialVault;
pub use error::{VaultError, VaultResult};
pub use traits::{AtomicBlobStore, SecureKeyStore};

/// Secure key store entry holding the vault key.
pub const VAULT_KEY_ID: &str = "consultkit.vault-key";

pub(crate) const VAULT_RECORD_AD: &[u8] = b"consultkit:vault-record";
