//! Splitting payloads to fit the asymmetric block ceiling.
//!
//! Chunk order is carried by position only: all chunks of one payload travel
//! in a single envelope, so no per-chunk sequence numbers are needed.

use std::num::NonZeroUsize;
use std::ops::Range;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;

use crate::asymmetric::AsymmetricCodec;
use crate::error::CryptoError;

/// Default band the per-message chunk size is drawn from.
pub const DEFAULT_CHUNK_BAND: Range<usize> = 50..100;

/// Split `data` into consecutive, non-overlapping slices of `chunk_size`
/// bytes; the last slice may be shorter. Empty input yields no chunks.
pub fn split(data: &[u8], chunk_size: NonZeroUsize) -> Vec<&[u8]> {
    data.chunks(chunk_size.get()).collect()
}

/// Concatenate chunks in order. Exact left inverse of [`split`].
pub fn join<C: AsRef<[u8]>>(chunks: &[C]) -> Vec<u8> {
    let len = chunks.iter().map(|c| c.as_ref().len()).sum();
    let mut out = Vec::with_capacity(len);
    for chunk in chunks {
        out.extend_from_slice(chunk.as_ref());
    }
    out
}

/// Draw a chunk size uniformly from `band`, clamped to `ceiling`.
///
/// Randomising per message keeps the ciphertext chunk count from revealing
/// the payload length class.
pub fn random_chunk_size(band: Range<usize>, ceiling: usize) -> NonZeroUsize {
    let drawn = if band.is_empty() {
        band.start
    } else {
        rand::thread_rng().gen_range(band)
    };
    NonZeroUsize::new(drawn.min(ceiling)).unwrap_or(NonZeroUsize::MIN)
}

/// Encrypt `plaintext` as independently encrypted, base64-encoded chunks.
pub fn seal_chunks<C: AsymmetricCodec>(
    codec: &C,
    key: &C::PublicKey,
    plaintext: &[u8],
    band: Range<usize>,
) -> Result<Vec<String>, CryptoError> {
    let chunk_size = random_chunk_size(band, codec.max_block_size(key));
    split(plaintext, chunk_size)
        .into_iter()
        .map(|block| codec.encrypt(key, block).map(|ct| STANDARD.encode(ct)))
        .collect()
}

/// Decrypt chunks produced by [`seal_chunks`] and rejoin them in order.
pub fn open_chunks<C: AsymmetricCodec, S: AsRef<str>>(
    codec: &C,
    key: &C::PrivateKey,
    chunks: &[S],
) -> Result<Vec<u8>, CryptoError> {
    let blocks = chunks
        .iter()
        .map(|chunk| {
            let ct = STANDARD
                .decode(chunk.as_ref())
                .map_err(|e| CryptoError::InvalidEncoding(e.to_string()))?;
            codec.decrypt(key, &ct)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(join(&blocks))
}
