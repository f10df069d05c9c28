//! clipio Transport Library
//!
//! A reliable, authenticated, ordered channel between two peers that can only
//! reach each other through an untrusted public relay.
//!
//! - [`session`]: sans-IO stop-and-wait state machine (sign, dedupe, ack, retransmit)
//! - [`driver`]: tokio actor running a session against a [`relay::RelayAdapter`]
//! - [`relay`]: ntfy client and an in-memory relay with fault injection
//! - [`pairing`]: channel secrets and the out-of-band pairing URL
//! - [`handoff`]: the clipboard exchange layered on top

pub mod config;
pub mod driver;
pub mod envelope;
pub mod error;
pub mod handoff;
pub mod pairing;
pub mod relay;
pub mod session;
mod timers;

pub use config::{RelayEndpoints, SessionTiming};
pub use driver::{SessionEvent, SessionHandle, spawn_session};
pub use envelope::{Envelope, Header, Payload, PeerRole};
pub use error::{RelayError, SessionError, TransportError};
pub use handoff::{ClipReceiver, ClipSender, receive_clipboard, send_clipboard};
pub use pairing::ChannelIdentity;
pub use relay::{MemoryRelay, NtfyRelay, RelayAdapter};
pub use session::{ChannelSession, ConnectionState, Effect, TimerKind};
