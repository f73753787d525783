//! AES session key derivation and RSA key exchange

use super::super::crypto::{AppleRsaPublicKey, CryptoError, lengths};
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD as BASE64};
use zeroize::Zeroize;

/// AES key size (128 bits)
pub const AES_KEY_SIZE: usize = lengths::AES_128_KEY;
/// AES IV size (128 bits)
pub const AES_IV_SIZE: usize = lengths::AES_IV;

/// Session keys for RAOP audio encryption
#[derive(Clone)]
pub struct RaopSessionKeys {
    /// AES encryption key
    pub(crate) aes_key: [u8; AES_KEY_SIZE],
    /// AES initialization vector
    pub(crate) aes_iv: [u8; AES_IV_SIZE],
    /// RSA-encrypted AES key (for SDP)
    pub(crate) encrypted_key: Vec<u8>,
}

impl RaopSessionKeys {
    /// Derive a fresh key and IV, wrapped for the well-known receiver key
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the receiver key cannot be loaded or the
    /// key wrap fails.
    pub fn derive() -> Result<Self, CryptoError> {
        let public_key = AppleRsaPublicKey::load()?;
        Self::derive_for(&public_key)
    }

    /// Derive a fresh key and IV, wrapped for `public_key`
    ///
    /// # Errors
    ///
    /// Returns `CryptoError` if the key wrap fails.
    pub fn derive_for(public_key: &AppleRsaPublicKey) -> Result<Self, CryptoError> {
        use rand::RngCore;

        let mut aes_key = [0u8; AES_KEY_SIZE];
        let mut aes_iv = [0u8; AES_IV_SIZE];

        let mut rng = rand::thread_rng();
        rng.try_fill_bytes(&mut aes_key)
            .map_err(|_| CryptoError::RngError)?;
        rng.try_fill_bytes(&mut aes_iv)
            .map_err(|_| CryptoError::RngError)?;

        let encrypted_key = public_key.encrypt_oaep(&aes_key)?;

        Ok(Self {
            aes_key,
            aes_iv,
            encrypted_key,
        })
    }

    /// Get the AES key
    #[must_use]
    pub fn aes_key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.aes_key
    }

    /// Get the AES IV
    #[must_use]
    pub fn aes_iv(&self) -> &[u8; AES_IV_SIZE] {
        &self.aes_iv
    }

    /// RSA-wrapped key bytes
    #[must_use]
    pub fn encrypted_key(&self) -> &[u8] {
        &self.encrypted_key
    }

    /// RSA-encrypted AES key as unpadded Base64 for the `rsaaeskey` SDP attribute
    #[must_use]
    pub fn rsaaeskey(&self) -> String {
        BASE64.encode(&self.encrypted_key)
    }

    /// AES IV as unpadded Base64 for the `aesiv` SDP attribute
    #[must_use]
    pub fn aesiv(&self) -> String {
        BASE64.encode(self.aes_iv)
    }
}

impl Drop for RaopSessionKeys {
    fn drop(&mut self) {
        self.aes_key.zeroize();
        self.aes_iv.zeroize();
    }
}

/// RSA-OAEP(SHA-1) wrap of `key` under the well-known receiver key
///
/// # Errors
///
/// Returns `CryptoError` if the receiver key cannot be loaded or encryption fails.
pub fn wrap_key_for_exchange(key: &[u8; AES_KEY_SIZE]) -> Result<Vec<u8>, CryptoError> {
    AppleRsaPublicKey::load()?.encrypt_oaep(key)
}
