//! Channel session: stop-and-wait reliability over an unreliable relay.
//!
//! The session is a sans-IO state machine. Callers feed it events
//! ([`connect`](ChannelSession::connect), [`on_connected`](ChannelSession::on_connected),
//! [`on_relay_message`](ChannelSession::on_relay_message),
//! [`on_timer_fired`](ChannelSession::on_timer_fired), [`send`](ChannelSession::send),
//! [`close`](ChannelSession::close)) and carry out the returned [`Effect`]s.
//! All mutable protocol state lives in one instance, so any scheduler that
//! serializes calls (the tokio actor in [`crate::driver`], a test, a
//! single-threaded reactor) can drive it.
//!
//! # Counter discipline
//!
//! Both peers share one monotonic counter that advances by exactly one per
//! acknowledged exchange, whichever side sent it. At most one non-ack message
//! is outstanding per session. Inbound envelopes are handled as follows,
//! after filtering (self-echo, signature, token):
//!
//! | inbound                                     | action                                   |
//! |---------------------------------------------|------------------------------------------|
//! | ack, counter == expected, send outstanding  | advance counter, stop retransmitting     |
//! | ack, anything else                          | drop                                     |
//! | counter == expected − 1, attempt unseen     | re-ack, do not redeliver                 |
//! | own send outstanding                        | drop                                     |
//! | counter != expected                         | drop                                     |
//! | otherwise                                   | ack, advance counter, deliver            |

use std::collections::VecDeque;
use std::time::Duration;

use clipio_crypto::{Signer, constant_time_str_eq};
use tracing::{debug, error, info, trace, warn};

use crate::config::SessionTiming;
use crate::envelope::{Envelope, Header, Payload, PeerRole, canonical_bytes};
use crate::error::{Rejection, SessionError};
use crate::pairing::ChannelIdentity;

/// Relay subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Torn down; no further effects are produced.
    Closed,
}

/// Timers a session asks its driver to schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Resend the outstanding message with the next attempt number.
    Retransmit,
    /// Retry a send deferred behind the outstanding message.
    SendLater,
    /// Reopen the relay subscription.
    Reconnect,
}

impl TimerKind {
    pub const ALL: [Self; 3] = [Self::Retransmit, Self::SendLater, Self::Reconnect];
}

/// Side effects requested by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open the relay subscription for the session's channel.
    Subscribe,
    /// Drop the relay subscription.
    Unsubscribe,
    /// Publish a serialized envelope on the channel; fire and forget.
    Publish(String),
    /// Schedule `kind` after `after`, replacing any pending timer of that kind.
    ArmTimer { kind: TimerKind, after: Duration },
    CancelTimer(TimerKind),
    /// Tell the application the subscription is (re)established.
    Connected,
    /// Hand a fresh, authenticated, in-order payload to the application.
    Deliver(Payload),
    /// The outstanding send with this counter was acknowledged by the peer.
    Acknowledged { counter: u64 },
}

#[derive(Debug)]
struct Outstanding {
    counter: u64,
    attempt: u32,
    payload: Payload,
}

/// Protocol engine for one pairing.
pub struct ChannelSession<S> {
    identity: ChannelIdentity,
    role: PeerRole,
    signer: S,
    timing: SessionTiming,
    state: ConnectionState,
    /// Counter the next fresh inbound message or our next send must carry.
    counter: u64,
    /// Highest attempt of the last delivered peer message that we acked.
    last_acked_attempt: Option<u32>,
    outstanding: Option<Outstanding>,
    deferred: VecDeque<Payload>,
    /// Longest envelope the relay delivers intact.
    message_limit: Option<usize>,
}

impl<S> std::fmt::Debug for ChannelSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("identity", &self.identity)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("counter", &self.counter)
            .field("outstanding", &self.outstanding.as_ref().map(|o| o.counter))
            .field("deferred", &self.deferred.len())
            .finish_non_exhaustive()
    }
}

impl<S: Signer> ChannelSession<S> {
    pub fn new(identity: ChannelIdentity, role: PeerRole, signer: S, timing: SessionTiming) -> Self {
        Self {
            identity,
            role,
            signer,
            timing,
            state: ConnectionState::Disconnected,
            counter: 0,
            last_acked_attempt: None,
            outstanding: None,
            deferred: VecDeque::new(),
            message_limit: None,
        }
    }

    /// Start a pairing: mint fresh channel secrets and play the Initiator.
    pub fn initiator(signer: S, timing: SessionTiming) -> Self {
        Self::new(ChannelIdentity::generate(), PeerRole::Initiator, signer, timing)
    }

    /// Join a pairing whose secrets were read from the pairing code.
    pub fn responder(identity: ChannelIdentity, signer: S, timing: SessionTiming) -> Self {
        Self::new(identity, PeerRole::Responder, signer, timing)
    }

    pub const fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub const fn role(&self) -> PeerRole {
        self.role
    }

    pub const fn connection_state(&self) -> ConnectionState {
        self.state
    }

    pub const fn counter(&self) -> u64 {
        self.counter
    }

    pub const fn is_awaiting_ack(&self) -> bool {
        self.outstanding.is_some()
    }

    /// Attempt number of the outstanding send, if any.
    pub fn outstanding_attempt(&self) -> Option<u32> {
        self.outstanding.as_ref().map(|o| o.attempt)
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Refuse sends whose envelope could exceed `limit` bytes.
    pub const fn set_message_limit(&mut self, limit: Option<usize>) {
        self.message_limit = limit;
    }

    /// Open the relay subscription.
    pub fn connect(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Disconnected {
            return Vec::new();
        }
        info!(channel = %self.identity.channel_id(), role = %self.role, "Connecting to relay");
        self.state = ConnectionState::Connecting;
        vec![Effect::Subscribe]
    }

    /// The relay subscription is open.
    pub fn on_connected(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        info!(channel = %self.identity.channel_id(), "Relay subscription open");
        self.state = ConnectionState::Connected;
        vec![Effect::Connected]
    }

    /// The relay subscription failed or closed. Reconnect after a fixed delay.
    pub fn on_disconnected(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        warn!(
            channel = %self.identity.channel_id(),
            delay_ms = self.timing.reconnect_delay.as_millis(),
            "Relay subscription lost, reconnecting"
        );
        self.state = ConnectionState::Disconnected;
        vec![Effect::ArmTimer {
            kind: TimerKind::Reconnect,
            after: self.timing.reconnect_delay,
        }]
    }

    pub fn on_timer_fired(&mut self, kind: TimerKind) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        match kind {
            TimerKind::Reconnect => self.connect(),
            TimerKind::Retransmit => self.retransmit(),
            TimerKind::SendLater => self.flush_deferred(),
        }
    }

    /// Reliably send `payload` to the peer.
    ///
    /// While an earlier send is unacknowledged the payload is queued and
    /// retried after the send-later interval; sends never interleave. A
    /// payload too large for the relay is refused before anything is queued.
    pub fn send(&mut self, payload: Payload) -> Result<Vec<Effect>, SessionError> {
        if self.state == ConnectionState::Closed {
            return Err(SessionError::Closed);
        }
        if matches!(payload, Payload::Ack { .. }) {
            return Err(SessionError::ReservedPayload);
        }
        if let Some(limit) = self.message_limit {
            let size = self.sealed_len_bound(&payload)?;
            if size > limit {
                return Err(SessionError::MessageTooLarge { size, limit });
            }
        }
        if self.outstanding.is_some() {
            let mut effects = Vec::new();
            if self.deferred.is_empty() {
                effects.push(self.send_later_timer());
            }
            self.deferred.push_back(payload);
            debug!(queued = self.deferred.len(), "Deferring send behind outstanding message");
            return Ok(effects);
        }
        self.transmit(payload)
    }

    /// Handle one raw message from the relay subscription.
    ///
    /// Rejected messages are logged and produce no effects.
    pub fn on_relay_message(&mut self, raw: &str) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        match self.accept(raw) {
            Ok(effects) => effects,
            Err(rejection) => {
                match &rejection {
                    Rejection::Malformed(_) | Rejection::Reply(_) => {
                        warn!(reason = %rejection, "Dropped inbound message");
                    }
                    Rejection::SelfEcho => trace!("Dropped own echoed message"),
                    _ => debug!(reason = %rejection, "Dropped inbound envelope"),
                }
                Vec::new()
            }
        }
    }

    /// Tear the session down. Pending timers are cancelled and nothing is
    /// sent or delivered afterwards.
    pub fn close(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        info!(channel = %self.identity.channel_id(), "Closing channel session");
        self.state = ConnectionState::Closed;
        self.outstanding = None;
        self.deferred.clear();
        let mut effects: Vec<Effect> = TimerKind::ALL.into_iter().map(Effect::CancelTimer).collect();
        effects.push(Effect::Unsubscribe);
        effects
    }

    fn accept(&mut self, raw: &str) -> Result<Vec<Effect>, Rejection> {
        let envelope = Envelope::parse(raw).map_err(|e| Rejection::Malformed(e.to_string()))?;

        // The sender field is unverified here; forging it can only get a message dropped.
        if envelope.header.sender == self.role {
            return Err(Rejection::SelfEcho);
        }
        if !envelope.verify(&self.signer, self.identity.salt().as_bytes()) {
            return Err(Rejection::AuthenticationFailure);
        }
        if !constant_time_str_eq(&envelope.header.token, self.identity.token()) {
            return Err(Rejection::TokenMismatch);
        }

        let counter = envelope.header.counter;
        let attempt = envelope.header.attempt;

        if envelope.data.is_ack() {
            return self.accept_ack(counter);
        }

        if self.counter.checked_sub(1) == Some(counter) {
            if self.last_acked_attempt.is_some_and(|last| attempt <= last) {
                return Err(Rejection::Duplicate { counter, attempt });
            }
            debug!(counter, attempt, "Peer resent a delivered message, acknowledging again");
            self.last_acked_attempt = Some(attempt);
            return Ok(vec![Effect::Publish(self.seal(Payload::ack(), counter, attempt)?)]);
        }

        if self.outstanding.is_some() {
            return Err(Rejection::AwaitingAck { counter });
        }
        if counter != self.counter {
            return Err(Rejection::OutOfOrder {
                expected: self.counter,
                got: counter,
            });
        }

        let ack = self.seal(Payload::ack(), counter, attempt)?;
        self.counter += 1;
        self.last_acked_attempt = Some(attempt);
        debug!(counter, attempt, kind = envelope.data.kind(), "Delivering message");
        Ok(vec![Effect::Publish(ack), Effect::Deliver(envelope.data)])
    }

    fn accept_ack(&mut self, counter: u64) -> Result<Vec<Effect>, Rejection> {
        let acks_outstanding = self
            .outstanding
            .as_ref()
            .is_some_and(|out| out.counter == counter && counter == self.counter);
        if !acks_outstanding {
            return Err(Rejection::StaleAck { counter });
        }

        let attempt = self.outstanding.take().map(|out| out.attempt);
        debug!(counter, ?attempt, "Send acknowledged");
        self.counter += 1;
        self.last_acked_attempt = None;
        Ok(vec![
            Effect::CancelTimer(TimerKind::Retransmit),
            Effect::Acknowledged { counter },
        ])
    }

    fn transmit(&mut self, payload: Payload) -> Result<Vec<Effect>, SessionError> {
        let counter = self.counter;
        let body = self.seal(payload.clone(), counter, 0)?;
        debug!(counter, kind = payload.kind(), "Sending message");
        self.outstanding = Some(Outstanding {
            counter,
            attempt: 0,
            payload,
        });
        Ok(vec![Effect::Publish(body), self.retransmit_timer()])
    }

    fn retransmit(&mut self) -> Vec<Effect> {
        let Some(out) = self.outstanding.as_mut() else {
            return Vec::new();
        };
        out.attempt = out.attempt.saturating_add(1);
        let (counter, attempt, payload) = (out.counter, out.attempt, out.payload.clone());

        info!(counter, attempt, "Retransmitting unacknowledged message");
        match self.seal(payload, counter, attempt) {
            Ok(body) => vec![Effect::Publish(body), self.retransmit_timer()],
            Err(e) => {
                error!(error = %e, counter, "Failed to seal retransmission");
                vec![self.retransmit_timer()]
            }
        }
    }

    fn flush_deferred(&mut self) -> Vec<Effect> {
        if self.deferred.is_empty() {
            return Vec::new();
        }
        if self.outstanding.is_some() {
            return vec![self.send_later_timer()];
        }
        let Some(payload) = self.deferred.pop_front() else {
            return Vec::new();
        };
        let mut effects = match self.transmit(payload) {
            Ok(effects) => effects,
            Err(e) => {
                error!(error = %e, "Failed to send deferred message");
                Vec::new()
            }
        };
        if !self.deferred.is_empty() {
            effects.push(self.send_later_timer());
        }
        effects
    }

    fn seal(&self, data: Payload, counter: u64, attempt: u32) -> Result<String, SessionError> {
        let header = Header {
            token: self.identity.token().to_string(),
            sender: self.role,
            counter,
            attempt,
        };
        let envelope = Envelope::seal(header, data, &self.signer, self.identity.salt().as_bytes())?;
        Ok(envelope.to_json()?)
    }

    /// Wire length of `data` sealed at the largest counter and attempt.
    fn sealed_len_bound(&self, data: &Payload) -> Result<usize, serde_json::Error> {
        let header = Header {
            token: self.identity.token().to_string(),
            sender: self.role,
            counter: u64::MAX,
            attempt: u32::MAX,
        };
        // `{"header":..,"data":..}` grows by `,"signature":"<hex>"`.
        let signed = canonical_bytes(&header, data)?.len();
        Ok(signed + r#","signature":"""#.len() + self.signer.signature_len())
    }

    const fn retransmit_timer(&self) -> Effect {
        Effect::ArmTimer {
            kind: TimerKind::Retransmit,
            after: self.timing.retransmit_interval,
        }
    }

    const fn send_later_timer(&self) -> Effect {
        Effect::ArmTimer {
            kind: TimerKind::SendLater,
            after: self.timing.send_later_interval,
        }
    }
}
