//! Channel secrets and the out-of-band pairing URL.
//!
//! The Initiator mints a fresh [`ChannelIdentity`] per pairing and embeds it
//! in the URL rendered as a scannable code. The Responder reads it back. The
//! identity never crosses the relay; its secrecy rests entirely on the
//! out-of-band channel.

use clipio_crypto::random::{CHANNEL_ID_BYTES, SALT_BYTES, TOKEN_BYTES};
use clipio_crypto::random_string;
use reqwest::Url;
use zeroize::Zeroize;

use crate::error::TransportError;

const CHANNEL_ID_PARAM: &str = "channel_id";
const TOKEN_PARAM: &str = "token";
const SALT_PARAM: &str = "salt";

/// Channel identifier plus the two shared secrets of one pairing.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    channel_id: String,
    token: String,
    salt: String,
}

impl std::fmt::Debug for ChannelIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelIdentity")
            .field("channel_id", &self.channel_id)
            .field("token", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .finish()
    }
}

impl Drop for ChannelIdentity {
    fn drop(&mut self) {
        self.token.zeroize();
        self.salt.zeroize();
    }
}

impl ChannelIdentity {
    /// Build an identity from values received out of band.
    pub fn new(
        channel_id: impl Into<String>,
        token: impl Into<String>,
        salt: impl Into<String>,
    ) -> Result<Self, TransportError> {
        let identity = Self {
            channel_id: channel_id.into(),
            token: token.into(),
            salt: salt.into(),
        };
        for (name, value) in [
            (CHANNEL_ID_PARAM, &identity.channel_id),
            (TOKEN_PARAM, &identity.token),
            (SALT_PARAM, &identity.salt),
        ] {
            if value.is_empty() {
                return Err(TransportError::Pairing(format!("{name} is empty")));
            }
        }
        if identity.channel_id.contains('/') {
            return Err(TransportError::Pairing(
                "channel_id must not contain '/'".into(),
            ));
        }
        Ok(identity)
    }

    /// Mint fresh random secrets for a new pairing.
    pub fn generate() -> Self {
        Self {
            channel_id: random_string(CHANNEL_ID_BYTES),
            token: random_string(TOKEN_BYTES),
            salt: random_string(SALT_BYTES),
        }
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Embed the identity in the query string of `page_url`.
    ///
    /// Any query already present on the page URL is replaced.
    pub fn pairing_url(&self, page_url: &str) -> Result<Url, TransportError> {
        let mut url = Url::parse(page_url)
            .map_err(|e| TransportError::Pairing(format!("invalid page URL: {e}")))?;
        url.query_pairs_mut()
            .clear()
            .append_pair(CHANNEL_ID_PARAM, &self.channel_id)
            .append_pair(TOKEN_PARAM, &self.token)
            .append_pair(SALT_PARAM, &self.salt);
        Ok(url)
    }

    /// Read an identity back from a scanned pairing URL.
    pub fn from_pairing_url(pairing_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(pairing_url)
            .map_err(|e| TransportError::Pairing(format!("invalid pairing URL: {e}")))?;

        let mut channel_id = None;
        let mut token = None;
        let mut salt = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                CHANNEL_ID_PARAM => channel_id = Some(value.into_owned()),
                TOKEN_PARAM => token = Some(value.into_owned()),
                SALT_PARAM => salt = Some(value.into_owned()),
                _ => {}
            }
        }

        let missing = |name: &str| TransportError::Pairing(format!("pairing URL lacks {name}"));
        Self::new(
            channel_id.ok_or_else(|| missing(CHANNEL_ID_PARAM))?,
            token.ok_or_else(|| missing(TOKEN_PARAM))?,
            salt.ok_or_else(|| missing(SALT_PARAM))?,
        )
    }
}
