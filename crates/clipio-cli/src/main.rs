//! clipio CLI
//!
//! `clipio receive` prints a pairing URL and waits for clipboard text from
//! whoever opens it. `clipio send` joins a pairing URL and hands over text.
//! Stdout carries only the pairing URL and the received text; logs go to
//! stderr.

mod receive;
mod send;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use clipio_core::config::{RelayConfig, load_config};
use clipio_core::tracing_init::{default_filter, init_tracing};
use clipio_transport::{NtfyRelay, RelayEndpoints, TransportError};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "clipio")]
#[command(version, about = "Hand clipboard text between devices over a public relay")]
struct Cli {
    /// Settings file (JSON); overrides the global settings file.
    #[arg(long, global = true, env = "CLIPIO_CONFIG")]
    config: Option<PathBuf>,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, global = true, env = "CLIPIO_LOG_JSON")]
    json_logs: bool,

    /// Give up after this many seconds instead of waiting indefinitely.
    #[arg(long, global = true)]
    timeout_secs: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show a pairing URL and wait for clipboard text.
    Receive,
    /// Send text to the device that showed `pairing_url`.
    Send {
        /// Pairing URL printed by `clipio receive`.
        pairing_url: String,
        /// Text to send; read from stdin when omitted.
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    init_tracing(&default_filter(&config.log_level), cli.json_logs);
    info!(version = env!("CARGO_PKG_VERSION"), relay = %config.relay.http_url, "Starting clipio");

    let limit = cli.timeout_secs.map(Duration::from_secs);
    match cli.command {
        Command::Receive => receive::run(&config, limit).await,
        Command::Send { pairing_url, text } => send::run(&config, &pairing_url, text, limit).await,
    }
}

fn ntfy_relay(config: &RelayConfig) -> anyhow::Result<NtfyRelay> {
    let relay = NtfyRelay::new(RelayEndpoints::from(config))?;
    Ok(relay.with_max_message_bytes(config.max_message_bytes))
}

/// Await `fut`, bounded by `limit` when one is given.
async fn with_timeout<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, TransportError>>,
) -> anyhow::Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| anyhow::anyhow!("timed out after {}s", limit.as_secs()))?
            .map_err(Into::into),
        None => Ok(fut.await?),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn parses_receive_with_global_flags() {
        let cli = Cli::try_parse_from(["clipio", "receive", "--json-logs", "--timeout-secs", "30"])
            .unwrap();
        assert!(matches!(cli.command, Command::Receive));
        assert!(cli.json_logs);
        assert_eq!(cli.timeout_secs, Some(30));
    }

    #[test]
    fn parses_send_with_optional_text() {
        let cli = Cli::try_parse_from(["clipio", "send", "https://p.example/?channel_id=c"]).unwrap();
        match cli.command {
            Command::Send { pairing_url, text } => {
                assert_eq!(pairing_url, "https://p.example/?channel_id=c");
                assert!(text.is_none());
            }
            Command::Receive => panic!("expected send"),
        }

        let cli = Cli::try_parse_from(["clipio", "send", "url", "hello"]).unwrap();
        assert!(matches!(cli.command, Command::Send { text: Some(t), .. } if t == "hello"));
    }

    #[test]
    fn send_requires_pairing_url() {
        assert!(Cli::try_parse_from(["clipio", "send"]).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_reported() {
        let result = with_timeout(
            Some(Duration::from_secs(5)),
            std::future::pending::<Result<(), TransportError>>(),
        )
        .await;
        assert!(result.unwrap_err().to_string().contains("timed out after 5s"));
    }
}
