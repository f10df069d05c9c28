//! Transport error types.

use clipio_crypto::CryptoError;

/// Errors surfaced to users of the transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Pairing error: {0}")]
    Pairing(String),

    #[error("Session task has stopped")]
    Closed,
}

/// Errors returned by the channel session state machine.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is closed")]
    Closed,

    #[error("Acknowledgements are generated by the session and cannot be sent directly")]
    ReservedPayload,

    #[error("Envelope of up to {size} bytes exceeds the relay limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Envelope serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from a relay adapter.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid relay endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Message of {size} bytes exceeds the relay limit of {limit} bytes")]
    MessageTooLarge { size: usize, limit: usize },

    #[error("Subscription closed by relay")]
    Closed,
}

/// Why an inbound relay message was dropped.
///
/// Rejections are logged locally and never reported to the peer or the
/// application, so a forger cannot tell a bad signature from silence.
#[derive(Debug, thiserror::Error)]
pub enum Rejection {
    #[error("malformed envelope: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    AuthenticationFailure,

    #[error("own message echoed by relay")]
    SelfEcho,

    #[error("token mismatch")]
    TokenMismatch,

    #[error("ack for counter {counter} does not match an outstanding send")]
    StaleAck { counter: u64 },

    #[error("duplicate of counter {counter} attempt {attempt} already acknowledged")]
    Duplicate { counter: u64, attempt: u32 },

    #[error("counter {counter} arrived while our own send is unacknowledged")]
    AwaitingAck { counter: u64 },

    #[error("counter {got} out of order, expected {expected}")]
    OutOfOrder { expected: u64, got: u64 },

    #[error("failed to seal acknowledgement: {0}")]
    Reply(#[from] SessionError),
}
