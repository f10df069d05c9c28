//! In-process relay for tests and local loopback.
//!
//! Behaves like the public relay: every subscriber of a channel, including
//! the publisher, sees every publication. Faults are injected on demand:
//! dropping selected messages, duplicating every message, severing all
//! subscriptions, refusing service. A message size limit can be set.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tracing::trace;

use super::{RelayAdapter, Subscription};
use crate::error::RelayError;

const CHANNEL_CAPACITY: usize = 256;

type DropFilter = Box<dyn FnMut(&str) -> bool + Send>;

#[derive(Default)]
struct Inner {
    channels: HashMap<String, broadcast::Sender<String>>,
    published: HashMap<String, Vec<String>>,
    drop_filter: Option<DropFilter>,
    duplicate: bool,
    offline: bool,
}

/// Shared in-memory relay. Clones refer to the same relay.
#[derive(Clone, Default)]
pub struct MemoryRelay {
    inner: Arc<Mutex<Inner>>,
    max_message_bytes: Option<usize>,
}

impl std::fmt::Debug for MemoryRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRelay").finish_non_exhaustive()
    }
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse publications longer than `limit` bytes.
    #[must_use]
    pub fn with_max_message_bytes(mut self, limit: usize) -> Self {
        self.max_message_bytes = Some(limit);
        self
    }

    /// Silently drop every publication for which `filter` returns `true`.
    /// Dropped messages still appear in [`published`](Self::published).
    pub async fn set_drop_filter(&self, filter: impl FnMut(&str) -> bool + Send + 'static) {
        self.inner.lock().await.drop_filter = Some(Box::new(filter));
    }

    pub async fn clear_drop_filter(&self) {
        self.inner.lock().await.drop_filter = None;
    }

    /// Deliver every publication twice.
    pub async fn set_duplicate(&self, duplicate: bool) {
        self.inner.lock().await.duplicate = duplicate;
    }

    /// While offline, subscribing and publishing fail with a connection error.
    pub async fn set_offline(&self, offline: bool) {
        self.inner.lock().await.offline = offline;
    }

    /// End every open subscription.
    pub async fn disconnect_all(&self) {
        self.inner.lock().await.channels.clear();
    }

    /// Every body accepted for `channel_id`, in publication order.
    pub async fn published(&self, channel_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .published
            .get(channel_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl RelayAdapter for MemoryRelay {
    async fn subscribe(&self, channel_id: &str) -> Result<Subscription, RelayError> {
        let mut inner = self.inner.lock().await;
        if inner.offline {
            return Err(RelayError::Connection("relay offline".into()));
        }
        let rx = inner
            .channels
            .entry(channel_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();

        // A lagging subscriber loses messages, as on a real relay.
        let stream = BroadcastStream::new(rx)
            .filter_map(|item| async move { item.ok().map(Ok::<_, RelayError>) });
        Ok(stream.boxed())
    }

    async fn publish(&self, channel_id: &str, body: String) -> Result<(), RelayError> {
        if let Some(limit) = self.max_message_bytes.filter(|&limit| body.len() > limit) {
            return Err(RelayError::MessageTooLarge {
                size: body.len(),
                limit,
            });
        }
        let mut inner = self.inner.lock().await;
        if inner.offline {
            return Err(RelayError::Connection("relay offline".into()));
        }
        inner
            .published
            .entry(channel_id.to_string())
            .or_default()
            .push(body.clone());

        if inner.drop_filter.as_mut().is_some_and(|filter| filter(&body)) {
            trace!(channel_id, "Relay dropped publication");
            return Ok(());
        }

        let copies = if inner.duplicate { 2 } else { 1 };
        if let Some(tx) = inner.channels.get(channel_id) {
            for _ in 0..copies {
                // No receivers is fine: nobody was listening.
                let _ = tx.send(body.clone());
            }
        }
        Ok(())
    }

    fn max_message_bytes(&self) -> Option<usize> {
        self.max_message_bytes
    }
}
