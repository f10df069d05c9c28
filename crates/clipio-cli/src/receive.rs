//! `clipio receive`: the Initiator side of a hand-off.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clipio_core::Config;
use clipio_crypto::{PassphraseSigner, RsaOaepCodec};
use clipio_transport::{
    ChannelSession, ClipReceiver, SessionTiming, receive_clipboard, spawn_session,
};
use tracing::info;

use crate::{ntfy_relay, with_timeout};

pub async fn run(config: &Config, limit: Option<Duration>) -> anyhow::Result<()> {
    let timing = SessionTiming::from(&config.session);
    let relay = Arc::new(ntfy_relay(&config.relay)?);
    let session = ChannelSession::initiator(
        PassphraseSigner::new(config.crypto.pbkdf2_iterations),
        timing,
    );
    let pairing_url = session.identity().pairing_url(&config.pairing.page_url)?;

    let codec = RsaOaepCodec::new(config.crypto.rsa_bits);
    let mut receiver = tokio::task::spawn_blocking(move || ClipReceiver::new(codec)).await??;

    writeln!(std::io::stdout().lock(), "{pairing_url}")?;

    let (handle, mut events) = spawn_session(session, relay);
    let text = with_timeout(limit, receive_clipboard(&handle, &mut events, &mut receiver)).await;
    let text = match text {
        Ok(text) => text,
        Err(e) => {
            handle.close().await;
            return Err(e);
        }
    };

    writeln!(std::io::stdout().lock(), "{text}")?;

    // The sender keeps retransmitting if our final ack is lost; stay around
    // long enough to acknowledge a couple of retries.
    let linger = timing.retransmit_interval * 2;
    info!(linger_secs = linger.as_secs(), "Clipboard received, lingering for late retries");
    tokio::time::sleep(linger).await;
    handle.close().await;
    Ok(())
}
