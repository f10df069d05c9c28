//! Configuration resolution for clipio.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/clipio/settings.json)
//! 3. Explicit config file (`--config`)
//! 4. Environment variables
//! 5. CLI arguments (highest priority, applied by the binary)

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Complete clipio configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Public relay endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RelayConfig {
    /// Base URL messages are published to (`POST {http_url}/{channel}`).
    pub http_url: String,
    /// Base URL subscriptions are opened on (`{ws_url}/{channel}/ws`).
    pub ws_url: String,
    /// Largest message body the relay delivers inline.
    pub max_message_bytes: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_url: "https://ntfy.sh".to_string(),
            ws_url: "wss://ntfy.sh".to_string(),
            max_message_bytes: 4096,
        }
    }
}

/// Reliability timers of the channel session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Delay before an unacknowledged message is sent again.
    pub retransmit_interval_ms: u64,
    /// Delay before a send deferred behind an outstanding message is retried.
    pub send_later_interval_ms: u64,
    /// Fixed delay before a dropped relay subscription is reopened.
    pub reconnect_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retransmit_interval_ms: 10_000,
            send_later_interval_ms: 10_000,
            reconnect_delay_ms: 5_000,
        }
    }
}

impl SessionConfig {
    pub const fn retransmit_interval(&self) -> Duration {
        Duration::from_millis(self.retransmit_interval_ms)
    }

    pub const fn send_later_interval(&self) -> Duration {
        Duration::from_millis(self.send_later_interval_ms)
    }

    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

/// Parameters of the signing and encryption primitives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2 rounds used for envelope signatures. Both peers must agree.
    pub pbkdf2_iterations: u32,
    /// RSA modulus size for the hand-off key pair.
    pub rsa_bits: usize,
    /// Lower bound (inclusive) of the per-message plaintext chunk size.
    pub min_chunk_size: usize,
    /// Upper bound (exclusive) of the per-message plaintext chunk size.
    pub max_chunk_size: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            pbkdf2_iterations: 64_000,
            rsa_bits: 2048,
            min_chunk_size: 50,
            max_chunk_size: 100,
        }
    }
}

/// Out-of-band pairing settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PairingConfig {
    /// Page the pairing URL points at; the channel secrets go in its query.
    pub page_url: String,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            page_url: "https://clipboard-io.example/send.html".to_string(),
        }
    }
}

/// Load configuration with hierarchical resolution.
///
/// `explicit` is a file named on the command line; unlike the global file it
/// must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let mut config = match global_config_path() {
        Some(path) if path.exists() => load_config_file(&path)?,
        _ => Config::default(),
    };

    if let Some(path) = explicit {
        config = load_config_file(path)?;
    }

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("clipio").join("settings.json"))
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| Error::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `CLIPIO_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(val) = lookup("CLIPIO_RELAY_HTTP_URL") {
        config.relay.http_url = val;
    }
    if let Some(val) = lookup("CLIPIO_RELAY_WS_URL") {
        config.relay.ws_url = val;
    }
    if let Some(val) = lookup("CLIPIO_RELAY_MAX_MESSAGE_BYTES") {
        if let Ok(n) = val.parse() {
            config.relay.max_message_bytes = n;
        }
    }
    if let Some(val) = lookup("CLIPIO_LOG_LEVEL") {
        config.log_level = val;
    }
    if let Some(val) = lookup("CLIPIO_PBKDF2_ITERATIONS") {
        if let Ok(n) = val.parse() {
            config.crypto.pbkdf2_iterations = n;
        }
    }
    if let Some(val) = lookup("CLIPIO_PAGE_URL") {
        config.pairing.page_url = val;
    }
}

/// Reject settings the protocol cannot work with.
pub fn validate(config: &Config) -> Result<()> {
    if config.crypto.pbkdf2_iterations == 0 {
        return Err(Error::Config("pbkdf2_iterations must be positive".into()));
    }
    if config.crypto.min_chunk_size == 0
        || config.crypto.min_chunk_size >= config.crypto.max_chunk_size
    {
        return Err(Error::Config(format!(
            "invalid chunk size band [{}, {})",
            config.crypto.min_chunk_size, config.crypto.max_chunk_size
        )));
    }
    if config.relay.max_message_bytes == 0 {
        return Err(Error::Config("max_message_bytes must be positive".into()));
    }
    if config.session.retransmit_interval_ms == 0 || config.session.reconnect_delay_ms == 0 {
        return Err(Error::Config("session intervals must be positive".into()));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_match_protocol_timers() {
        let config = Config::default();
        assert_eq!(config.session.retransmit_interval(), Duration::from_secs(10));
        assert_eq!(config.session.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.crypto.pbkdf2_iterations, 64_000);
        assert_eq!(config.relay.http_url, "https://ntfy.sh");
        assert_eq!(config.relay.max_message_bytes, 4096);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"relay": {{"http_url": "http://localhost:8080"}}}}"#).unwrap();

        let config = load_config_file(file.path()).unwrap();
        assert_eq!(config.relay.http_url, "http://localhost:8080");
        assert_eq!(config.relay.ws_url, "wss://ntfy.sh");
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let result = load_config(Some(&path));
        assert!(matches!(result, Err(Error::ReadConfig { path: p, .. }) if p == path));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            load_config_file(file.path()),
            Err(Error::ParseConfig { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("CLIPIO_RELAY_WS_URL", "ws://127.0.0.1:9000"),
            ("CLIPIO_PBKDF2_ITERATIONS", "1000"),
            ("CLIPIO_LOG_LEVEL", "debug"),
            ("CLIPIO_RELAY_MAX_MESSAGE_BYTES", "8192"),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(ToString::to_string));

        assert_eq!(config.relay.ws_url, "ws://127.0.0.1:9000");
        assert_eq!(config.crypto.pbkdf2_iterations, 1000);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.relay.max_message_bytes, 8192);
        assert_eq!(config.relay.http_url, "https://ntfy.sh");
    }

    #[test]
    fn unparsable_iteration_override_is_ignored() {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| {
            (k == "CLIPIO_PBKDF2_ITERATIONS").then(|| "many".to_string())
        });
        assert_eq!(config.crypto.pbkdf2_iterations, 64_000);
    }

    #[test]
    fn validate_rejects_inverted_chunk_band() {
        let mut config = Config::default();
        config.crypto.min_chunk_size = 100;
        config.crypto.max_chunk_size = 50;
        assert!(matches!(validate(&config), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_message_limit() {
        let mut config = Config::default();
        config.relay.max_message_bytes = 0;
        assert!(matches!(validate(&config), Err(Error::Config(_))));
    }
}
