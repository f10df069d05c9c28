//! `clipio send`: the Responder side of a hand-off.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use clipio_core::Config;
use clipio_crypto::{PassphraseSigner, RsaOaepCodec};
use clipio_transport::{
    ChannelIdentity, ChannelSession, ClipSender, SessionTiming, send_clipboard, spawn_session,
};
use tracing::info;

use crate::{ntfy_relay, with_timeout};

pub async fn run(
    config: &Config,
    pairing_url: &str,
    text: Option<String>,
    limit: Option<Duration>,
) -> anyhow::Result<()> {
    let identity = ChannelIdentity::from_pairing_url(pairing_url)?;
    let text = match text {
        Some(text) => text,
        None => read_stdin().await?,
    };

    let relay = Arc::new(ntfy_relay(&config.relay)?);
    let session = ChannelSession::responder(
        identity,
        PassphraseSigner::new(config.crypto.pbkdf2_iterations),
        SessionTiming::from(&config.session),
    );
    let mut sender = ClipSender::new(
        RsaOaepCodec::new(config.crypto.rsa_bits),
        text,
        config.crypto.min_chunk_size..config.crypto.max_chunk_size,
    );

    let (handle, mut events) = spawn_session(session, relay);
    let result = with_timeout(limit, send_clipboard(&handle, &mut events, &mut sender)).await;
    handle.close().await;
    result?;

    info!("Clipboard delivered");
    Ok(())
}

async fn read_stdin() -> anyhow::Result<String> {
    let text = tokio::task::spawn_blocking(|| {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).map(|_| buf)
    })
    .await??;
    Ok(text)
}
