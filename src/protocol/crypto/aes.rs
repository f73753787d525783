use super::{CryptoError, lengths};
use aes::Aes128;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, IvState, KeyIvInit, generic_array::GenericArray};

type Aes128CbcEncImpl = cbc::Encryptor<Aes128>;
type Aes128CbcDecImpl = cbc::Decryptor<Aes128>;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

fn check_lengths(key: &[u8], iv: &[u8]) -> Result<(), CryptoError> {
    if key.len() != lengths::AES_128_KEY {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::AES_128_KEY,
            actual: key.len(),
        });
    }
    if iv.len() != lengths::AES_IV {
        return Err(CryptoError::InvalidKeyLength {
            expected: lengths::AES_IV,
            actual: iv.len(),
        });
    }
    Ok(())
}

fn whole_blocks(data: &mut [u8]) -> &mut [u8] {
    let whole = data.len() - data.len() % BLOCK_SIZE;
    &mut data[..whole]
}

/// AES-128-CBC encryptor whose chain persists between calls
///
/// Only whole blocks are processed; a trailing partial block is left as-is.
pub struct Aes128CbcEnc {
    cipher: Aes128CbcEncImpl,
}

impl Aes128CbcEnc {
    /// Create cipher with 16-byte key and 16-byte IV
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        check_lengths(key, iv)?;
        let cipher =
            Aes128CbcEncImpl::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }

    /// Create cipher from fixed-size key and IV
    #[must_use]
    pub fn from_parts(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128CbcEncImpl::new(&(*key).into(), &(*iv).into()),
        }
    }

    /// Encrypt every whole block of `data` in place; returns bytes encrypted
    pub fn encrypt_blocks(&mut self, data: &mut [u8]) -> usize {
        let blocks = whole_blocks(data);
        for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        blocks.len()
    }

    /// Vector the next block chains from
    #[must_use]
    pub fn vector(&self) -> [u8; BLOCK_SIZE] {
        let mut vector = [0u8; BLOCK_SIZE];
        vector.copy_from_slice(&self.cipher.iv_state());
        vector
    }
}

/// AES-128-CBC decryptor whose chain persists between calls
pub struct Aes128CbcDec {
    cipher: Aes128CbcDecImpl,
}

impl Aes128CbcDec {
    /// Create cipher with 16-byte key and 16-byte IV
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CryptoError> {
        check_lengths(key, iv)?;
        let cipher =
            Aes128CbcDecImpl::new_from_slices(key, iv).map_err(|_| CryptoError::InvalidKeyLength {
                expected: lengths::AES_128_KEY,
                actual: key.len(),
            })?;
        Ok(Self { cipher })
    }

    /// Create cipher from fixed-size key and IV
    #[must_use]
    pub fn from_parts(key: &[u8; 16], iv: &[u8; 16]) -> Self {
        Self {
            cipher: Aes128CbcDecImpl::new(&(*key).into(), &(*iv).into()),
        }
    }

    /// Decrypt every whole block of `data` in place; returns bytes decrypted
    pub fn decrypt_blocks(&mut self, data: &mut [u8]) -> usize {
        let blocks = whole_blocks(data);
        for block in blocks.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        blocks.len()
    }
}
