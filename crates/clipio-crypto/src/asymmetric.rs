//! Asymmetric encryption for the clipboard hand-off.
//!
//! The key holder publishes its public key as PEM over the (authenticated but
//! public) channel; the peer encrypts the clipboard text in blocks no larger
//! than [`AsymmetricCodec::max_block_size`]. Splitting into blocks is the
//! caller's job, see [`crate::chunker`].

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha512};

use crate::error::CryptoError;

/// Default RSA modulus size in bits.
pub const DEFAULT_RSA_BITS: usize = 2048;

/// Key-pair based encryption capability.
///
/// Callers must keep every plaintext passed to [`encrypt`](Self::encrypt)
/// within [`max_block_size`](Self::max_block_size); oversized input is
/// rejected, never truncated.
pub trait AsymmetricCodec: Send + Sync {
    type PublicKey: Clone + Send + Sync;
    type PrivateKey: Send + Sync;

    fn generate_key_pair(&self) -> Result<(Self::PublicKey, Self::PrivateKey), CryptoError>;

    fn export_public(&self, key: &Self::PublicKey) -> Result<String, CryptoError>;

    fn import_public(&self, exported: &str) -> Result<Self::PublicKey, CryptoError>;

    /// Largest plaintext accepted by a single `encrypt` call for `key`.
    fn max_block_size(&self, key: &Self::PublicKey) -> usize;

    fn encrypt(&self, key: &Self::PublicKey, block: &[u8]) -> Result<Vec<u8>, CryptoError>;

    fn decrypt(&self, key: &Self::PrivateKey, chunk: &[u8]) -> Result<Vec<u8>, CryptoError>;
}

/// RSA with OAEP/SHA-512 padding, public keys exchanged as SPKI PEM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RsaOaepCodec {
    bits: usize,
}

impl Default for RsaOaepCodec {
    fn default() -> Self {
        Self::new(DEFAULT_RSA_BITS)
    }
}

impl RsaOaepCodec {
    pub const fn new(bits: usize) -> Self {
        Self { bits }
    }

    pub const fn bits(&self) -> usize {
        self.bits
    }

    fn padding() -> Oaep {
        Oaep::new::<Sha512>()
    }
}

impl AsymmetricCodec for RsaOaepCodec {
    type PublicKey = RsaPublicKey;
    type PrivateKey = RsaPrivateKey;

    fn generate_key_pair(&self) -> Result<(RsaPublicKey, RsaPrivateKey), CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, self.bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok((public, private))
    }

    fn export_public(&self, key: &RsaPublicKey) -> Result<String, CryptoError> {
        key.to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::Serialization(e.to_string()))
    }

    fn import_public(&self, exported: &str) -> Result<RsaPublicKey, CryptoError> {
        RsaPublicKey::from_public_key_pem(exported.trim())
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// OAEP overhead is two digest lengths plus two bytes.
    fn max_block_size(&self, key: &RsaPublicKey) -> usize {
        key.size()
            .saturating_sub(2 * <Sha512 as Digest>::output_size() + 2)
    }

    fn encrypt(&self, key: &RsaPublicKey, block: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let max = self.max_block_size(key);
        if block.len() > max {
            return Err(CryptoError::BlockTooLarge {
                max,
                actual: block.len(),
            });
        }
        key.encrypt(&mut OsRng, Self::padding(), block)
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
    }

    fn decrypt(&self, key: &RsaPrivateKey, chunk: &[u8]) -> Result<Vec<u8>, CryptoError> {
        key.decrypt(Self::padding(), chunk)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}

/// Shared 2048-bit key pair for tests; generating one per test is slow.
#[cfg(any(test, feature = "test-utils"))]
pub fn test_key_pair() -> &'static (RsaPublicKey, RsaPrivateKey) {
    static PAIR: std::sync::OnceLock<(RsaPublicKey, RsaPrivateKey)> = std::sync::OnceLock::new();
    PAIR.get_or_init(|| {
        let private = RsaPrivateKey::new(&mut OsRng, DEFAULT_RSA_BITS)
            .unwrap_or_else(|e| panic!("test key generation failed: {e}"));
        (RsaPublicKey::from(&private), private)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn max_block_size_for_2048_bit_key_is_126() {
        let (public, _) = test_key_pair();
        assert_eq!(RsaOaepCodec::default().max_block_size(public), 126);
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let codec = RsaOaepCodec::default();
        let (public, private) = test_key_pair();

        let chunk = codec.encrypt(public, b"hello").unwrap();
        assert_eq!(chunk.len(), 256);
        assert_eq!(codec.decrypt(private, &chunk).unwrap(), b"hello");
    }

    #[test]
    fn encrypt_is_randomized() {
        let codec = RsaOaepCodec::default();
        let (public, _) = test_key_pair();
        let a = codec.encrypt(public, b"same").unwrap();
        let b = codec.encrypt(public, b"same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn oversized_block_is_rejected_not_truncated() {
        let codec = RsaOaepCodec::default();
        let (public, _) = test_key_pair();
        let block = vec![0u8; 127];
        assert!(matches!(
            codec.encrypt(public, &block),
            Err(CryptoError::BlockTooLarge { max: 126, actual: 127 })
        ));
    }

    #[test]
    fn exported_pem_imports_to_same_key() {
        let codec = RsaOaepCodec::default();
        let (public, private) = test_key_pair();

        let pem = codec.export_public(public).unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        let imported = codec.import_public(&pem).unwrap();
        assert_eq!(&imported, public);

        let chunk = codec.encrypt(&imported, b"via imported key").unwrap();
        assert_eq!(codec.decrypt(private, &chunk).unwrap(), b"via imported key");
    }

    #[test]
    fn import_rejects_garbage() {
        let result = RsaOaepCodec::default().import_public("not a pem");
        assert!(matches!(result, Err(CryptoError::InvalidPublicKey(_))));
    }

    #[test]
    fn decrypt_with_tampered_chunk_fails() {
        let codec = RsaOaepCodec::default();
        let (public, private) = test_key_pair();
        let mut chunk = codec.encrypt(public, b"secret").unwrap();
        chunk[10] ^= 0xFF;
        assert!(matches!(
            codec.decrypt(private, &chunk),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }
}
