//! XChaCha20-Poly1305 sealing of serializable records.
//!
//! # Blob format
//!
//! ```text
//! [nonce (24 bytes)][CBOR plaintext encrypted + tag (16 bytes)]
//! ```

use std::sync::{Arc, Mutex};

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use rand::{rngs::OsRng, RngCore};
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroizing;

use super::{
    error::{VaultError, VaultResult},
    traits::SecureKeyStore,
    VAULT_KEY_ID, VAULT_RECORD_AD,
};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

type VaultKey = Zeroizing<[u8; KEY_SIZE]>;

/// Encrypts and decrypts records with the install-wide vault key.
///
/// The key is read from the [`SecureKeyStore`] on first use and cached for the
/// lifetime of the vault. It is generated only when the first record is
/// encrypted and none exists yet; the key never leaves this type.
pub struct CredentialVault {
    key_store: Arc<dyn SecureKeyStore>,
    key: Mutex<Option<VaultKey>>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Creates a vault over the platform key store. No key-store access happens
    /// until the first encrypt or decrypt.
    #[must_use]
    pub fn new(key_store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            key_store,
            key: Mutex::new(None),
        }
    }

    /// Serializes and seals `record`, creating the vault key if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the key store fails, the stored key is malformed or
    /// the record cannot be serialized.
    pub fn encrypt<T: Serialize + ?Sized>(&self, record: &T) -> VaultResult<Vec<u8>> {
        let mut plaintext = Zeroizing::new(Vec::new());
        ciborium::ser::into_writer(record, &mut *plaintext)
            .map_err(|err| VaultError::Serialization(err.to_string()))?;
        self.with_key(true, |key| seal(key, VAULT_RECORD_AD, &plaintext))
    }

    /// Opens and deserializes a blob produced by [`CredentialVault::encrypt`].
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingKey`] if no key was ever created, a crypto
    /// error if the blob was tampered with or sealed under another key, or a
    /// serialization error if the plaintext does not match `T`.
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext: &[u8]) -> VaultResult<T> {
        let plaintext = self.with_key(false, |key| open(key, VAULT_RECORD_AD, ciphertext))?;
        ciborium::de::from_reader(plaintext.as_slice())
            .map_err(|err| VaultError::Serialization(err.to_string()))
    }

    fn with_key<R>(
        &self,
        create_if_missing: bool,
        f: impl FnOnce(&[u8; KEY_SIZE]) -> VaultResult<R>,
    ) -> VaultResult<R> {
        // Held across the key-store round trip so concurrent first uses cannot
        // each generate a key.
        let mut cached = self
            .key
            .lock()
            .map_err(|_| VaultError::KeyStore("vault key mutex poisoned".to_string()))?;
        if cached.is_none() {
            *cached = self.load_key(create_if_missing)?;
        }
        match cached.as_ref() {
            Some(key) => f(key),
            None => Err(VaultError::MissingKey),
        }
    }

    fn load_key(&self, create_if_missing: bool) -> VaultResult<Option<VaultKey>> {
        match self.key_store.get(VAULT_KEY_ID.to_string())? {
            Some(bytes) => parse_key(&bytes).map(Some),
            None if create_if_missing => self.create_key().map(Some),
            None => Ok(None),
        }
    }

    fn create_key(&self) -> VaultResult<VaultKey> {
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        OsRng.fill_bytes(&mut *key);

        // Keychain-style stores reject inserting over a stale entry.
        self.key_store.delete(VAULT_KEY_ID.to_string())?;
        self.key_store
            .set(VAULT_KEY_ID.to_string(), key.to_vec())?;
        log::info!("generated new vault key");
        Ok(key)
    }
}

fn parse_key(bytes: &[u8]) -> VaultResult<VaultKey> {
    if bytes.len() != KEY_SIZE {
        return Err(VaultError::InvalidKey(format!(
            "length mismatch: expected {KEY_SIZE}, got {}",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(bytes);
    Ok(key)
}

fn seal(key: &[u8; KEY_SIZE], associated_data: &[u8], plaintext: &[u8]) -> VaultResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce_bytes),
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|err| VaultError::Crypto(err.to_string()))?;
    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(
    key: &[u8; KEY_SIZE],
    associated_data: &[u8],
    ciphertext: &[u8],
) -> VaultResult<Zeroizing<Vec<u8>>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(VaultError::Crypto(format!(
            "ciphertext too short: {} bytes (minimum {})",
            ciphertext.len(),
            NONCE_SIZE + TAG_SIZE
        )));
    }
    let (nonce_bytes, payload) = ciphertext.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            XNonce::from_slice(nonce_bytes),
            Payload {
                msg: payload,
                aad: associated_data,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| VaultError::Crypto("authentication failed".to_string()))
}
