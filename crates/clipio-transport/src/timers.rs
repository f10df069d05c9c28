//! Cancellable one-shot timers for the session driver.
//!
//! Each armed timer is a spawned sleep task that reports back on a channel.
//! Re-arming or cancelling a kind aborts its task; a generation number guards
//! against a firing that raced with the abort.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::session::TimerKind;

/// A timer expiry: the kind plus the generation it was armed with.
pub type Firing = (TimerKind, u64);

pub struct Timers {
    tx: mpsc::UnboundedSender<Firing>,
    armed: HashMap<TimerKind, (u64, JoinHandle<()>)>,
    generation: u64,
}

impl Timers {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Firing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                armed: HashMap::new(),
                generation: 0,
            },
            rx,
        )
    }

    /// Schedule `kind` after `after`, replacing any pending timer of that kind.
    pub fn arm(&mut self, kind: TimerKind, after: Duration) {
        self.cancel(kind);
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let _ = tx.send((kind, generation));
        });
        trace!(?kind, ?after, "Timer armed");
        self.armed.insert(kind, (generation, handle));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some((_, handle)) = self.armed.remove(&kind) {
            handle.abort();
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.armed.drain() {
            handle.abort();
        }
    }

    /// Consume a firing. Returns `false` for firings of timers that were
    /// since re-armed or cancelled.
    pub fn take(&mut self, (kind, generation): Firing) -> bool {
        match self.armed.get(&kind) {
            Some((current, _)) if *current == generation => {
                self.armed.remove(&kind);
                true
            }
            _ => false,
        }
    }

    #[cfg(test)]
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn armed_timer_fires_once() {
        let (mut timers, mut rx) = Timers::new();
        timers.arm(TimerKind::Retransmit, Duration::from_secs(10));
        assert!(timers.is_armed(TimerKind::Retransmit));

        let firing = rx.recv().await.unwrap();
        assert_eq!(firing.0, TimerKind::Retransmit);
        assert!(timers.take(firing));
        assert!(!timers.is_armed(TimerKind::Retransmit));
        assert!(!timers.take(firing));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_supersedes_previous() {
        let (mut timers, mut rx) = Timers::new();
        timers.arm(TimerKind::SendLater, Duration::from_secs(1));
        timers.arm(TimerKind::SendLater, Duration::from_secs(5));

        let start = tokio::time::Instant::now();
        let firing = rx.recv().await.unwrap();
        assert!(timers.take(firing));
        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_reports() {
        let (mut timers, mut rx) = Timers::new();
        timers.arm(TimerKind::Reconnect, Duration::from_secs(1));
        timers.cancel(TimerKind::Reconnect);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_ignored() {
        let (mut timers, _rx) = Timers::new();
        timers.arm(TimerKind::Retransmit, Duration::from_secs(1));
        timers.arm(TimerKind::Retransmit, Duration::from_secs(1));
        assert!(!timers.take((TimerKind::Retransmit, 1)));
        assert!(timers.take((TimerKind::Retransmit, 2)));
    }
}
