//! Relay adapters.
//!
//! A relay is an untrusted public pub/sub service keyed by channel name. Every
//! subscriber of a channel receives every publication, including its own.
//! Delivery may drop, duplicate or delay messages; the session above copes
//! with all of that.

mod memory;
mod ntfy;

use std::future::Future;

use futures_util::stream::BoxStream;

pub use memory::MemoryRelay;
pub use ntfy::NtfyRelay;

use crate::error::RelayError;

/// Stream of raw message bodies from one subscription. The stream ends or
/// yields an error when the subscription is lost.
pub type Subscription = BoxStream<'static, Result<String, RelayError>>;

/// Publish/subscribe access to a relay.
pub trait RelayAdapter: Send + Sync + 'static {
    /// Open a subscription to `channel_id`.
    fn subscribe(
        &self,
        channel_id: &str,
    ) -> impl Future<Output = Result<Subscription, RelayError>> + Send;

    /// Publish `body` on `channel_id`. Success only means the relay accepted
    /// the message, not that anyone received it. Bodies longer than
    /// [`max_message_bytes`](Self::max_message_bytes) are refused.
    fn publish(
        &self,
        channel_id: &str,
        body: String,
    ) -> impl Future<Output = Result<(), RelayError>> + Send;

    /// Largest body the relay delivers intact, if it has a limit.
    fn max_message_bytes(&self) -> Option<usize> {
        None
    }
}
