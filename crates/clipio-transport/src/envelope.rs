//! Wire format of messages exchanged over the relay.
//!
//! Every relay publication is one JSON envelope:
//!
//! ```json
//! {"header":{"token":"..","sender":"server","counter":3,"attempt":0},
//!  "data":{"ready":true},
//!  "signature":"<hex>"}
//! ```
//!
//! The signature covers the canonical serialization of `{header, data}`:
//! compact JSON with keys in declaration order. The envelope itself is not
//! encrypted; confidential payloads are encrypted before they get here.

use clipio_crypto::Signer;
use serde::{Deserialize, Serialize};

/// Which end of the pairing a session plays.
///
/// The Initiator minted the channel secrets and shows the pairing code; the
/// Responder joined by reading them. The relay echoes publications back to
/// their sender, and this field is how a session recognises its own echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerRole {
    #[serde(rename = "server")]
    Initiator,
    #[serde(rename = "client")]
    Responder,
}

impl PeerRole {
    pub const fn peer(self) -> Self {
        match self {
            Self::Initiator => Self::Responder,
            Self::Responder => Self::Initiator,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initiator => "server",
            Self::Responder => "client",
        }
    }
}

impl std::fmt::Display for PeerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope header. Field order is part of the signed byte layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub token: String,
    pub sender: PeerRole,
    pub counter: u64,
    pub attempt: u32,
}

/// Application payload carried by an envelope.
///
/// The session only interprets [`Payload::Ack`]; the other variants belong to
/// the clipboard hand-off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Ack {
        ack: u8,
    },
    Ready {
        ready: bool,
    },
    Pem {
        pem: String,
    },
    EncryptedChunks {
        #[serde(rename = "encryptedChunks")]
        encrypted_chunks: Vec<String>,
    },
}

impl Payload {
    pub const fn ack() -> Self {
        Self::Ack { ack: 1 }
    }

    pub const fn ready() -> Self {
        Self::Ready { ready: true }
    }

    /// A zero `ack` field does not acknowledge anything.
    pub const fn is_ack(&self) -> bool {
        matches!(self, Self::Ack { ack } if *ack != 0)
    }

    /// Short name for logs; never includes payload contents.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ack { .. } => "ack",
            Self::Ready { .. } => "ready",
            Self::Pem { .. } => "pem",
            Self::EncryptedChunks { .. } => "encrypted_chunks",
        }
    }
}

/// The signed unit published on the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub header: Header,
    pub data: Payload,
    pub signature: String,
}

/// The part of an envelope covered by its signature.
#[derive(Serialize)]
struct Signed<'a> {
    header: &'a Header,
    data: &'a Payload,
}

/// Canonical bytes of `{header, data}`.
pub fn canonical_bytes(header: &Header, data: &Payload) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Signed { header, data })
}

impl Envelope {
    /// Build an envelope and sign it with `salt`.
    pub fn seal<S: Signer + ?Sized>(
        header: Header,
        data: Payload,
        signer: &S,
        salt: &[u8],
    ) -> Result<Self, serde_json::Error> {
        let signature = signer.sign(&canonical_bytes(&header, &data)?, salt);
        Ok(Self {
            header,
            data,
            signature,
        })
    }

    /// Recompute the signature over `{header, data}` and compare.
    pub fn verify<S: Signer + ?Sized>(&self, signer: &S, salt: &[u8]) -> bool {
        canonical_bytes(&self.header, &self.data)
            .is_ok_and(|bytes| signer.verify(&bytes, salt, &self.signature))
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use clipio_crypto::PassphraseSigner;

    use super::*;

    const SALT: &[u8] = b"pairing-salt";

    fn signer() -> PassphraseSigner {
        PassphraseSigner::new(4)
    }

    fn header() -> Header {
        Header {
            token: "tok".into(),
            sender: PeerRole::Responder,
            counter: 2,
            attempt: 1,
        }
    }

    #[test]
    fn canonical_form_matches_wire_layout() {
        let bytes = canonical_bytes(&header(), &Payload::ready()).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"header":{"token":"tok","sender":"client","counter":2,"attempt":1},"data":{"ready":true}}"#
        );
    }

    #[test]
    fn payload_variants_serialize_to_original_shapes() {
        let cases = [
            (Payload::ack(), r#"{"ack":1}"#),
            (Payload::ready(), r#"{"ready":true}"#),
            (Payload::Pem { pem: "P".into() }, r#"{"pem":"P"}"#),
            (
                Payload::EncryptedChunks {
                    encrypted_chunks: vec!["a".into(), "b".into()],
                },
                r#"{"encryptedChunks":["a","b"]}"#,
            ),
        ];
        for (payload, json) in cases {
            assert_eq!(serde_json::to_string(&payload).unwrap(), json);
            assert_eq!(serde_json::from_str::<Payload>(json).unwrap(), payload);
        }
    }

    #[test]
    fn only_nonzero_ack_acknowledges() {
        let ack: Payload = serde_json::from_str(r#"{"ack":1}"#).unwrap();
        let zero: Payload = serde_json::from_str(r#"{"ack":0}"#).unwrap();
        assert!(ack.is_ack());
        assert!(!zero.is_ack());
        assert!(!Payload::ready().is_ack());
    }

    #[test]
    fn sealed_envelope_verifies_after_wire_trip() {
        let env = Envelope::seal(header(), Payload::ready(), &signer(), SALT).unwrap();
        let parsed = Envelope::parse(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed, env);
        assert!(parsed.verify(&signer(), SALT));
    }

    #[test]
    fn verify_fails_with_wrong_salt() {
        let env = Envelope::seal(header(), Payload::ready(), &signer(), SALT).unwrap();
        assert!(!env.verify(&signer(), b"another-salt"));
    }

    #[test]
    fn mutating_header_or_data_breaks_signature() {
        let env = Envelope::seal(
            header(),
            Payload::Pem { pem: "key".into() },
            &signer(),
            SALT,
        )
        .unwrap();

        let mut tampered = env.clone();
        tampered.header.counter += 1;
        assert!(!tampered.verify(&signer(), SALT));

        let mut tampered = env.clone();
        tampered.header.attempt += 1;
        assert!(!tampered.verify(&signer(), SALT));

        let mut tampered = env.clone();
        tampered.header.token.push('x');
        assert!(!tampered.verify(&signer(), SALT));

        let mut tampered = env.clone();
        tampered.header.sender = PeerRole::Initiator;
        assert!(!tampered.verify(&signer(), SALT));

        let mut tampered = env;
        tampered.data = Payload::Pem { pem: "kez".into() };
        assert!(!tampered.verify(&signer(), SALT));
    }

    #[test]
    fn raw_byte_flip_in_wire_json_is_rejected_or_unparsable() {
        let env = Envelope::seal(header(), Payload::ready(), &signer(), SALT).unwrap();
        let wire = env.to_json().unwrap();
        let sig_start = wire.find("\"signature\"").unwrap();
        for i in 0..sig_start {
            let mut bytes = wire.clone().into_bytes();
            bytes[i] ^= 0x01;
            let Ok(text) = String::from_utf8(bytes) else {
                continue;
            };
            if let Ok(parsed) = Envelope::parse(&text) {
                if parsed.header == env.header && parsed.data == env.data {
                    continue;
                }
                assert!(!parsed.verify(&signer(), SALT), "flip at {i} verified");
            }
        }
    }

    #[test]
    fn missing_fields_fail_to_parse() {
        assert!(Envelope::parse(r#"{"header":{"token":"t"},"data":{"ready":true}}"#).is_err());
        assert!(Envelope::parse(r#"{"data":{"ready":true},"signature":"00"}"#).is_err());
        assert!(Envelope::parse("not json").is_err());
    }

    #[test]
    fn roles_map_to_wire_names() {
        assert_eq!(
            serde_json::to_string(&PeerRole::Initiator).unwrap(),
            r#""server""#
        );
        assert_eq!(PeerRole::Responder.as_str(), "client");
        assert_eq!(PeerRole::Initiator.peer(), PeerRole::Responder);
    }
}
