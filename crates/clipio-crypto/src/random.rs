//! Random secrets for channel pairing.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroize;

/// Random bytes behind a channel identifier.
pub const CHANNEL_ID_BYTES: usize = 8;
/// Random bytes behind a channel token.
pub const TOKEN_BYTES: usize = 8;
/// Random bytes behind a signing salt.
pub const SALT_BYTES: usize = 24;

/// `len` bytes from the OS RNG, encoded base64url without padding so the
/// result can be embedded in a URL unescaped.
pub fn random_string(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    let encoded = URL_SAFE_NO_PAD.encode(&bytes);
    bytes.zeroize();
    encoded
}
