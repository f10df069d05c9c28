//! Keyed digests for envelope authentication.
//!
//! The relay is public, so every envelope carries a digest of its canonical
//! bytes keyed with the pairing salt. The salt never travels over the relay;
//! only peers that scanned the pairing code can produce a matching digest.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Default PBKDF2 round count for envelope signatures.
///
/// Every envelope from the peer is verified with this many rounds on the
/// session's task, a few tens of milliseconds each in release builds. Echoes
/// of our own publications are discarded before verification.
pub const DEFAULT_ITERATIONS: u32 = 64_000;

/// Length in bytes of the derived digest (hex doubles it on the wire).
pub const DIGEST_LEN: usize = 32;

/// Keyed-hash capability used by the channel session.
///
/// Implementations are stateless: the same `(message, salt)` always yields
/// the same signature.
pub trait Signer: Send + Sync {
    /// Digest `message` keyed with `salt`.
    fn sign(&self, message: &[u8], salt: &[u8]) -> String;

    /// Length of every signature [`sign`](Self::sign) returns.
    fn signature_len(&self) -> usize;

    /// Recompute the digest and compare it with `signature` in constant time.
    fn verify(&self, message: &[u8], salt: &[u8], signature: &str) -> bool {
        constant_time_str_eq(&self.sign(message, salt), signature)
    }
}

/// PBKDF2-HMAC-SHA512 signer producing a hex-encoded 32-byte digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassphraseSigner {
    iterations: u32,
}

impl Default for PassphraseSigner {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

impl PassphraseSigner {
    /// Create a signer with an explicit round count. Both peers must agree
    /// on it or every signature will mismatch.
    pub const fn new(iterations: u32) -> Self {
        Self { iterations }
    }

    pub const fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Signer for PassphraseSigner {
    fn sign(&self, message: &[u8], salt: &[u8]) -> String {
        let mut digest = [0u8; DIGEST_LEN];
        pbkdf2_hmac::<Sha512>(message, salt, self.iterations, &mut digest);
        let encoded = hex::encode(digest);
        digest.zeroize();
        encoded
    }

    fn signature_len(&self) -> usize {
        DIGEST_LEN * 2
    }
}

/// Compare two strings without short-circuiting on the first differing byte.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    const MESSAGE: &[u8] = br#"{"header":{"token":"t","sender":"client","counter":0,"attempt":0},"data":{"ready":true}}"#;

    fn signer() -> PassphraseSigner {
        PassphraseSigner::new(8)
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let a = signer().sign(MESSAGE, b"salt");
        let b = signer().sign(MESSAGE, b"salt");
        assert_eq!(a, b);
        assert_eq!(a.len(), signer().signature_len());
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_accepts_own_signature() {
        let sig = signer().sign(MESSAGE, b"salt");
        assert!(signer().verify(MESSAGE, b"salt", &sig));
    }

    #[test]
    fn verify_rejects_wrong_salt() {
        let sig = signer().sign(MESSAGE, b"salt");
        assert!(!signer().verify(MESSAGE, b"other", &sig));
    }

    #[test]
    fn verify_rejects_any_flipped_byte() {
        let sig = signer().sign(MESSAGE, b"salt");
        for i in 0..MESSAGE.len() {
            let mut tampered = MESSAGE.to_vec();
            tampered[i] ^= 0x01;
            assert!(
                !signer().verify(&tampered, b"salt", &sig),
                "flip at byte {i} still verified"
            );
        }
    }

    #[test]
    fn round_count_changes_digest() {
        let a = PassphraseSigner::new(8).sign(MESSAGE, b"salt");
        let b = PassphraseSigner::new(9).sign(MESSAGE, b"salt");
        assert_ne!(a, b);
    }

    #[test]
    fn constant_time_eq_handles_length_mismatch() {
        assert!(constant_time_str_eq("abc", "abc"));
        assert!(!constant_time_str_eq("abc", "abd"));
        assert!(!constant_time_str_eq("abc", "abcd"));
        assert!(!constant_time_str_eq("", "a"));
    }
}
