//! clipio Crypto Library
//!
//! Capabilities consumed by the channel session and the clipboard hand-off.
//! All of them are stateless and injectable so tests can swap them out.
//!
//! ## Crypto primitives
//!
//! - **Signer**: PBKDF2-HMAC-SHA512 keyed with the pairing salt, hex digest
//! - **Asymmetric codec**: RSA-2048 OAEP/SHA-512, SPKI PEM public keys
//! - **Chunker**: randomised split into codec-sized blocks and ordered rejoin

pub mod asymmetric;
pub mod chunker;
pub mod error;
pub mod random;
pub mod signer;

#[cfg(any(test, feature = "test-utils"))]
pub use asymmetric::test_key_pair;
pub use asymmetric::{AsymmetricCodec, RsaOaepCodec};
pub use chunker::{join, open_chunks, random_chunk_size, seal_chunks, split};
pub use error::CryptoError;
pub use random::random_string;
pub use signer::{PassphraseSigner, Signer, constant_time_str_eq};
