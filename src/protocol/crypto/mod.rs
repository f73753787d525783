//! Cryptographic primitives for RAOP stream encryption

#![allow(missing_docs)]

mod aes;
mod error;
mod rsa;

pub use self::aes::{Aes128CbcDec, Aes128CbcEnc, BLOCK_SIZE};
pub use self::error::CryptoError;
pub use self::rsa::{AppleRsaPublicKey, RaopRsaPrivateKey, sizes as rsa_sizes};

/// Length of various cryptographic values
pub mod lengths {
    /// AES-128 key length
    pub const AES_128_KEY: usize = 16;
    /// AES-CBC initialization vector length
    pub const AES_IV: usize = 16;
}
