//! RSA-OAEP key wrapping for the RAOP session key

use super::CryptoError;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// RSA key sizes used in RAOP
pub mod sizes {
    /// Receiver modulus size (2048 bits)
    pub const MODULUS_BITS: usize = 2048;
    /// Receiver modulus size in bytes
    pub const MODULUS_BYTES: usize = 256;
    /// Maximum plaintext size for OAEP with SHA-1
    pub const OAEP_MAX_PLAINTEXT: usize = MODULUS_BYTES - 2 * 20 - 2;
}

/// Public key the receiver holds the private half of
///
/// Defaults to the well-known key shipped with every RAOP receiver
/// (2048-bit modulus, exponent 65537).
pub struct AppleRsaPublicKey {
    inner: rsa::RsaPublicKey,
}

impl AppleRsaPublicKey {
    /// Base64 modulus of the receiver key
    const MODULUS_B64: &'static str = concat!(
        "59dE8qLieItsH1WgjrcFRKj6eUWqi+bGLOX1HL3U3GhC/j0Qg90u3sG/1CUtwC5vOYvfDmFI6oSF",
        "Xi5ELabWJmT2dKHzBJKa3k9ok+8t9ucRqMd6DZHJ2YCCLlDRKSKv6kDqnw4UwPdpOMXziC/AMj3Z",
        "/lUVX1G7WSHCAWKf1zNS1eLvqr+boEjXuBOitnZ/bDzPHrTOZz0Dew0uowxf/+sG+NCK3eQJVxqc",
        "aJ/vEHKIVd2M+5qL71yJQ+87X6oV3eaYvt3zWZYD6z5vYTcrtij2VZ9Zmni/UAaHqn9JdsBWLUEp",
        "VviYnhimNVvYFZeCXg/IdTQ+x4IRdiXNv5hEew=="
    );

    /// Base64 public exponent
    const EXPONENT_B64: &'static str = "AQAB";

    /// Load the receiver public key
    pub fn load() -> Result<Self, CryptoError> {
        use rsa::BigUint;

        let modulus = BASE64
            .decode(Self::MODULUS_B64)
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let exponent = BASE64
            .decode(Self::EXPONENT_B64)
            .map_err(|_| CryptoError::InvalidPublicKey)?;

        let n = BigUint::from_bytes_be(&modulus);
        let e = BigUint::from_bytes_be(&exponent);

        let inner = rsa::RsaPublicKey::new(n, e).map_err(|_| CryptoError::InvalidPublicKey)?;

        Ok(Self { inner })
    }

    /// Wrap an arbitrary public key, e.g. one paired with a test private key
    #[must_use]
    pub fn from_key(inner: rsa::RsaPublicKey) -> Self {
        Self { inner }
    }

    /// Modulus size in bytes
    #[must_use]
    pub fn size(&self) -> usize {
        use rsa::traits::PublicKeyParts;

        self.inner.size()
    }

    /// Encrypt data using RSA-OAEP with SHA-1
    pub fn encrypt_oaep(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        use rand::rngs::OsRng;
        use rsa::Oaep;
        use sha1::Sha1;

        let limit = self.size().saturating_sub(2 * 20 + 2);
        if plaintext.len() > limit {
            return Err(CryptoError::EncryptionFailed(format!(
                "plaintext too long: {} > {limit}",
                plaintext.len(),
            )));
        }

        let padding = Oaep::new::<Sha1>();
        self.inner
            .encrypt(&mut OsRng, padding, plaintext)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }
}

/// RSA private key standing in for a receiver (testing)
pub struct RaopRsaPrivateKey {
    inner: rsa::RsaPrivateKey,
}

impl RaopRsaPrivateKey {
    /// Generate a new key pair of the given size
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        use rand::rngs::OsRng;

        let inner = rsa::RsaPrivateKey::new(&mut OsRng, bits).map_err(|_| CryptoError::RngError)?;

        Ok(Self { inner })
    }

    /// Decrypt RSA-OAEP encrypted data
    pub fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        use rsa::Oaep;
        use sha1::Sha1;

        let padding = Oaep::new::<Sha1>();
        self.inner
            .decrypt(padding, ciphertext)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }

    /// Public half, ready to wrap session keys
    #[must_use]
    pub fn public_key(&self) -> AppleRsaPublicKey {
        AppleRsaPublicKey::from_key(self.inner.to_public_key())
    }
}
