//! Tokio driver for a [`ChannelSession`].
//!
//! One actor task owns the session and serializes every event that reaches
//! it: application commands, timer expiries, subscription attempts and relay
//! messages. A second task publishes outbound envelopes in order so a slow
//! relay never stalls inbound processing. Opening a subscription runs in its
//! own task too; timers and commands are served while it is in flight.

use std::sync::Arc;

use clipio_crypto::Signer;
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, info, info_span, warn};

use crate::envelope::Payload;
use crate::error::{RelayError, SessionError, TransportError};
use crate::relay::{RelayAdapter, Subscription};
use crate::session::{ChannelSession, Effect};
use crate::timers::{Firing, Timers};

/// Notifications from a running session to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The relay subscription opened, initially or after a reconnect.
    Connected,
    /// A fresh payload from the peer, delivered exactly once.
    Data(Payload),
    /// The peer acknowledged our send with this counter.
    Acknowledged { counter: u64 },
}

type SubscribeOutcome = Result<Result<Subscription, RelayError>, JoinError>;

enum Command {
    Send(Payload, oneshot::Sender<Result<(), SessionError>>),
    Close,
}

/// Application side of a spawned session.
///
/// Dropping the handle closes the session.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Queue `payload` for reliable delivery.
    ///
    /// Returns once the session has accepted the payload, not when the peer
    /// acknowledges it; watch for [`SessionEvent::Acknowledged`] for that.
    pub async fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Send(payload, tx))
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)??;
        Ok(())
    }

    /// Close the session and wait until queued publications are flushed.
    pub async fn close(self) {
        let _ = self.commands.send(Command::Close);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Session task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `session` on the current tokio runtime against `relay`.
///
/// The session connects immediately. Events arrive on the returned receiver
/// until the session closes. Sends larger than the relay's message limit are
/// refused by [`SessionHandle::send`].
pub fn spawn_session<S, R>(
    mut session: ChannelSession<S>,
    relay: Arc<R>,
) -> (SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)
where
    S: Signer + 'static,
    R: RelayAdapter,
{
    session.set_message_limit(relay.max_message_bytes());

    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (publish_tx, publish_rx) = mpsc::unbounded_channel();
    let (timers, firings) = Timers::new();

    let channel_id = session.identity().channel_id().to_string();
    let span = info_span!("session", channel = %channel_id, role = %session.role());

    let publisher = tokio::spawn(
        publish_loop(Arc::clone(&relay), channel_id.clone(), publish_rx).instrument(span.clone()),
    );

    let driver = Driver {
        session,
        relay,
        channel_id,
        timers,
        connecting: None,
        subscription: None,
        events: events_tx,
        publish: publish_tx,
    };
    let task = tokio::spawn(driver.run(commands_rx, firings, publisher).instrument(span));

    (
        SessionHandle {
            commands: commands_tx,
            task,
        },
        events_rx,
    )
}

struct Driver<S, R> {
    session: ChannelSession<S>,
    relay: Arc<R>,
    channel_id: String,
    timers: Timers,
    connecting: Option<JoinHandle<Result<Subscription, RelayError>>>,
    subscription: Option<Subscription>,
    events: mpsc::UnboundedSender<SessionEvent>,
    publish: mpsc::UnboundedSender<String>,
}

impl<S: Signer, R: RelayAdapter> Driver<S, R> {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut firings: mpsc::UnboundedReceiver<Firing>,
        publisher: JoinHandle<()>,
    ) {
        let effects = self.session.connect();
        self.apply(effects);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Send(payload, reply)) => {
                        let result = match self.session.send(payload) {
                            Ok(effects) => {
                                self.apply(effects);
                                Ok(())
                            }
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    }
                    Some(Command::Close) | None => {
                        let effects = self.session.close();
                        self.apply(effects);
                        break;
                    }
                },
                Some(firing) = firings.recv() => {
                    if self.timers.take(firing) {
                        let effects = self.session.on_timer_fired(firing.0);
                        self.apply(effects);
                    }
                }
                attempt = connection_attempt(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_subscribe_result(attempt);
                }
                message = next_message(&mut self.subscription) => {
                    let effects = match message {
                        Some(Ok(raw)) => self.session.on_relay_message(&raw),
                        Some(Err(e)) => {
                            warn!(error = %e, "Relay subscription failed");
                            self.subscription = None;
                            self.session.on_disconnected()
                        }
                        None => {
                            self.subscription = None;
                            self.session.on_disconnected()
                        }
                    };
                    self.apply(effects);
                }
            }
        }

        self.abort_connecting();
        self.timers.cancel_all();
        drop(self.publish);
        if let Err(e) = publisher.await {
            warn!(error = %e, "Publisher task ended abnormally");
        }
        info!("Session stopped");
    }

    /// Carry out effects. Only the subscription attempt is asynchronous, and
    /// it reports back through [`connection_attempt`].
    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Subscribe => self.start_subscribe(),
                Effect::Unsubscribe => {
                    self.abort_connecting();
                    self.subscription = None;
                }
                Effect::Publish(body) => {
                    let _ = self.publish.send(body);
                }
                Effect::ArmTimer { kind, after } => self.timers.arm(kind, after),
                Effect::CancelTimer(kind) => self.timers.cancel(kind),
                Effect::Connected => self.emit(SessionEvent::Connected),
                Effect::Deliver(payload) => self.emit(SessionEvent::Data(payload)),
                Effect::Acknowledged { counter } => {
                    self.emit(SessionEvent::Acknowledged { counter });
                }
            }
        }
    }

    fn start_subscribe(&mut self) {
        self.abort_connecting();
        let relay = Arc::clone(&self.relay);
        let channel_id = self.channel_id.clone();
        self.connecting = Some(tokio::spawn(
            async move { relay.subscribe(&channel_id).await }.in_current_span(),
        ));
    }

    fn abort_connecting(&mut self) {
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
    }

    fn on_subscribe_result(&mut self, attempt: SubscribeOutcome) {
        let effects = match attempt {
            Ok(Ok(subscription)) => {
                self.subscription = Some(subscription);
                self.session.on_connected()
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Failed to subscribe to relay");
                self.session.on_disconnected()
            }
            Err(e) if e.is_cancelled() => return,
            Err(e) => {
                warn!(error = %e, "Subscribe task ended abnormally");
                self.session.on_disconnected()
            }
        };
        self.apply(effects);
    }

    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }
}

async fn next_message(subscription: &mut Option<Subscription>) -> Option<Result<String, RelayError>> {
    match subscription {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

async fn connection_attempt(
    connecting: &mut Option<JoinHandle<Result<Subscription, RelayError>>>,
) -> SubscribeOutcome {
    match connecting {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

async fn publish_loop<R: RelayAdapter>(
    relay: Arc<R>,
    channel_id: String,
    mut bodies: mpsc::UnboundedReceiver<String>,
) {
    while let Some(body) = bodies.recv().await {
        if let Err(e) = relay.publish(&channel_id, body).await {
            warn!(error = %e, "Publish failed");
        }
    }
}
