//! RAOP audio encryption using AES-128-CBC

use crate::protocol::crypto::{Aes128CbcDec, Aes128CbcEnc, BLOCK_SIZE, CryptoError};
use crate::protocol::raop::key_exchange::{AES_IV_SIZE, AES_KEY_SIZE, RaopSessionKeys};
use zeroize::Zeroize;

/// Where each packet's CBC chain starts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IvPolicy {
    /// The vector carries over from the previous packet's last block
    #[default]
    ChainAcrossPackets,
    /// Every packet restarts from the session IV
    ResetPerPacket,
}

/// Treatment of a trailing block shorter than 16 bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartialBlockPolicy {
    /// Leave the tail in plaintext
    #[default]
    Plaintext,
    /// Zero-pad the tail to a whole block and encrypt it (the payload grows)
    ZeroPadEncrypt,
}

/// RAOP audio encryptor
///
/// Holds the session key, the initial vector and a CBC chain whose vector
/// after every call reflects the last fully encrypted block.
pub struct RaopEncryptor {
    cipher: Aes128CbcEnc,
    key: [u8; AES_KEY_SIZE],
    iv: [u8; AES_IV_SIZE],
    iv_policy: IvPolicy,
    tail_policy: PartialBlockPolicy,
}

impl RaopEncryptor {
    /// Create a new encryptor with given key and IV
    ///
    /// # Errors
    /// Returns `CryptoError` if the key is rejected by the cipher
    pub fn new(key: [u8; AES_KEY_SIZE], iv: [u8; AES_IV_SIZE]) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: Aes128CbcEnc::new(&key, &iv)?,
            key,
            iv,
            iv_policy: IvPolicy::default(),
            tail_policy: PartialBlockPolicy::default(),
        })
    }

    /// Create an encryptor from derived session keys
    ///
    /// # Errors
    /// Returns `CryptoError` if the key is rejected by the cipher
    pub fn from_session_keys(keys: &RaopSessionKeys) -> Result<Self, CryptoError> {
        Self::new(*keys.aes_key(), *keys.aes_iv())
    }

    /// Set the chaining policy
    #[must_use]
    pub fn with_iv_policy(mut self, policy: IvPolicy) -> Self {
        self.iv_policy = policy;
        self
    }

    /// Set the partial-block policy
    #[must_use]
    pub fn with_partial_block_policy(mut self, policy: PartialBlockPolicy) -> Self {
        self.tail_policy = policy;
        self
    }

    /// Encrypt the whole blocks of `buffer` in place
    ///
    /// A trailing partial block is left in plaintext. Returns the number of
    /// bytes encrypted.
    pub fn encrypt_in_place(&mut self, buffer: &mut [u8]) -> usize {
        if self.iv_policy == IvPolicy::ResetPerPacket {
            self.cipher = Aes128CbcEnc::from_parts(&self.key, &self.iv);
        }
        self.cipher.encrypt_blocks(buffer)
    }

    /// Encrypt a packet payload, applying the partial-block policy
    ///
    /// Returns the number of bytes encrypted.
    pub fn seal(&mut self, payload: &mut Vec<u8>) -> usize {
        let tail = payload.len() % BLOCK_SIZE;
        if tail != 0 && self.tail_policy == PartialBlockPolicy::ZeroPadEncrypt {
            payload.resize(payload.len() + BLOCK_SIZE - tail, 0);
        }
        self.encrypt_in_place(payload)
    }

    /// Current rolling vector
    #[must_use]
    pub fn vector(&self) -> [u8; AES_IV_SIZE] {
        self.cipher.vector()
    }

    /// Get a reference to the key
    #[must_use]
    pub fn key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.key
    }

    /// Get a reference to the IV
    #[must_use]
    pub fn iv(&self) -> &[u8; AES_IV_SIZE] {
        &self.iv
    }
}

impl Drop for RaopEncryptor {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

/// RAOP audio decryptor (receiver side, used by the mock receiver)
pub struct RaopDecryptor {
    cipher: Aes128CbcDec,
    key: [u8; AES_KEY_SIZE],
    iv: [u8; AES_IV_SIZE],
    iv_policy: IvPolicy,
}

impl RaopDecryptor {
    /// Create a new decryptor with given key and IV
    ///
    /// # Errors
    /// Returns `CryptoError` if the key is rejected by the cipher
    pub fn new(key: [u8; AES_KEY_SIZE], iv: [u8; AES_IV_SIZE]) -> Result<Self, CryptoError> {
        Ok(Self {
            cipher: Aes128CbcDec::new(&key, &iv)?,
            key,
            iv,
            iv_policy: IvPolicy::default(),
        })
    }

    /// Set the chaining policy; must match the sender's
    #[must_use]
    pub fn with_iv_policy(mut self, policy: IvPolicy) -> Self {
        self.iv_policy = policy;
        self
    }

    /// Decrypt the whole blocks of `buffer` in place
    pub fn decrypt_in_place(&mut self, buffer: &mut [u8]) -> usize {
        if self.iv_policy == IvPolicy::ResetPerPacket {
            self.cipher = Aes128CbcDec::from_parts(&self.key, &self.iv);
        }
        self.cipher.decrypt_blocks(buffer)
    }
}

impl Drop for RaopDecryptor {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}
