//! Clipboard hand-off over a channel session.
//!
//! The Initiator receives: it owns the key pair, answers the Responder's
//! `ready` with its public key and decrypts the chunks that come back. The
//! Responder sends: it announces itself once connected, waits for the key,
//! and encrypts the clipboard text. Both sides are plain state machines fed
//! with [`SessionEvent`]s; [`receive_clipboard`] and [`send_clipboard`] drive
//! them over a spawned session.

use std::ops::Range;

use clipio_crypto::{AsymmetricCodec, open_chunks, seal_chunks};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::driver::{SessionEvent, SessionHandle};
use crate::envelope::Payload;
use crate::error::TransportError;

/// What the receiving side wants done after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverStep {
    Idle,
    Reply(Payload),
    Received(String),
}

/// Key-holding side of the hand-off.
pub struct ClipReceiver<C: AsymmetricCodec> {
    codec: C,
    private_key: C::PrivateKey,
    public_pem: String,
}

impl<C: AsymmetricCodec> ClipReceiver<C> {
    /// Generate a fresh key pair for this hand-off.
    pub fn new(codec: C) -> Result<Self, TransportError> {
        let (public, private_key) = codec.generate_key_pair()?;
        let public_pem = codec.export_public(&public)?;
        Ok(Self {
            codec,
            private_key,
            public_pem,
        })
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn on_event(&mut self, event: SessionEvent) -> Result<ReceiverStep, TransportError> {
        match event {
            SessionEvent::Data(Payload::Ready { .. }) => {
                info!("Peer ready, sending public key");
                Ok(ReceiverStep::Reply(Payload::Pem {
                    pem: self.public_pem.clone(),
                }))
            }
            SessionEvent::Data(Payload::EncryptedChunks { encrypted_chunks }) => {
                let plaintext = open_chunks(&self.codec, &self.private_key, &encrypted_chunks)?;
                info!(
                    chunks = encrypted_chunks.len(),
                    bytes = plaintext.len(),
                    "Clipboard received"
                );
                Ok(ReceiverStep::Received(
                    String::from_utf8_lossy(&plaintext).into_owned(),
                ))
            }
            other => {
                debug!(?other, "Receiver ignoring event");
                Ok(ReceiverStep::Idle)
            }
        }
    }
}

/// Progress of the sending side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderStage {
    AwaitingConnection,
    AwaitingKey,
    Sending,
    Delivered,
}

/// What the sending side wants done after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderStep {
    Idle,
    Reply(Payload),
    Delivered,
}

/// Text-holding side of the hand-off.
pub struct ClipSender<C: AsymmetricCodec> {
    codec: C,
    text: String,
    chunk_band: Range<usize>,
    stage: SenderStage,
}

impl<C: AsymmetricCodec> ClipSender<C> {
    pub fn new(codec: C, text: impl Into<String>, chunk_band: Range<usize>) -> Self {
        Self {
            codec,
            text: text.into(),
            chunk_band,
            stage: SenderStage::AwaitingConnection,
        }
    }

    pub const fn stage(&self) -> SenderStage {
        self.stage
    }

    pub fn on_event(&mut self, event: SessionEvent) -> Result<SenderStep, TransportError> {
        match (self.stage, event) {
            // Announce once; a reconnect must not restart the exchange.
            (SenderStage::AwaitingConnection, SessionEvent::Connected) => {
                info!("Connected, announcing readiness");
                self.stage = SenderStage::AwaitingKey;
                Ok(SenderStep::Reply(Payload::ready()))
            }
            (SenderStage::AwaitingKey, SessionEvent::Data(Payload::Pem { pem })) => {
                let key = self.codec.import_public(&pem)?;
                let encrypted_chunks = seal_chunks(
                    &self.codec,
                    &key,
                    self.text.as_bytes(),
                    self.chunk_band.clone(),
                )?;
                info!(
                    chunks = encrypted_chunks.len(),
                    bytes = self.text.len(),
                    "Sending encrypted clipboard"
                );
                self.stage = SenderStage::Sending;
                Ok(SenderStep::Reply(Payload::EncryptedChunks { encrypted_chunks }))
            }
            (SenderStage::Sending, SessionEvent::Acknowledged { counter }) => {
                info!(counter, "Clipboard delivered");
                self.stage = SenderStage::Delivered;
                Ok(SenderStep::Delivered)
            }
            (stage, event) => {
                debug!(?stage, ?event, "Sender ignoring event");
                Ok(SenderStep::Idle)
            }
        }
    }
}

/// Serve the key and wait for the clipboard text.
pub async fn receive_clipboard<C: AsymmetricCodec>(
    handle: &SessionHandle,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    receiver: &mut ClipReceiver<C>,
) -> Result<String, TransportError> {
    while let Some(event) = events.recv().await {
        match receiver.on_event(event)? {
            ReceiverStep::Idle => {}
            ReceiverStep::Reply(payload) => handle.send(payload).await?,
            ReceiverStep::Received(text) => return Ok(text),
        }
    }
    Err(TransportError::Closed)
}

/// Hand the sender's text to the peer and wait for its acknowledgement.
pub async fn send_clipboard<C: AsymmetricCodec>(
    handle: &SessionHandle,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    sender: &mut ClipSender<C>,
) -> Result<(), TransportError> {
    while let Some(event) = events.recv().await {
        match sender.on_event(event)? {
            SenderStep::Idle => {}
            SenderStep::Reply(payload) => handle.send(payload).await?,
            SenderStep::Delivered => return Ok(()),
        }
    }
    Err(TransportError::Closed)
}
