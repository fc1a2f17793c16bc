//! Oracle relay configuration.
//!
//! The signer identity and relay endpoint are injected per pipeline instead of
//! being compiled in. Values come from the environment (`ORACLE_*`) or a TOML
//! document, and `validate()` lists every problem at once.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::observation::decode_hex;
use super::verify::parse_signer_key;
use crate::error::Result;

/// Default relay port used by the price oracle network.
pub const DEFAULT_RELAY_PORT: u16 = 7083;

/// A misconfigured field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub field: String,
    pub description: String,
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.field, self.description)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Compressed secp256k1 public key of the price signer (hex).
    pub signer_key: String,
    /// Relay hostname.
    pub relay_host: String,
    /// Relay port.
    pub relay_port: u16,
    /// Per-request timeout.
    pub request_timeout_ms: u64,
    /// Search past maturity by this much; matches the oracle's publish cadence.
    pub window_padding_secs: i64,
    /// Number of messages requested around maturity.
    pub window_size: usize,
    /// Reject bracketing pairs whose price sequences are not consecutive.
    pub require_consecutive_sequence: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            signer_key: String::new(),
            relay_host: String::new(),
            relay_port: DEFAULT_RELAY_PORT,
            request_timeout_ms: 10_000,
            window_padding_secs: 60,
            window_size: 5,
            require_consecutive_sequence: false,
        }
    }
}

impl OracleConfig {
    pub fn new(signer_key: impl Into<String>, relay_host: impl Into<String>, relay_port: u16) -> Self {
        Self {
            signer_key: signer_key.into(),
            relay_host: relay_host.into(),
            relay_port,
            ..Self::default()
        }
    }

    /// Load from `ORACLE_*` environment variables on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("ORACLE_SIGNER_KEY") {
            config.signer_key = v;
        }
        if let Ok(v) = std::env::var("ORACLE_RELAY_HOST") {
            config.relay_host = v;
        }
        if let Ok(v) = std::env::var("ORACLE_RELAY_PORT") {
            if let Ok(port) = v.parse() {
                config.relay_port = port;
            }
        }
        if let Ok(v) = std::env::var("ORACLE_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = v.parse() {
                config.request_timeout_ms = ms;
            }
        }
        if let Ok(v) = std::env::var("ORACLE_WINDOW_PADDING_SECS") {
            if let Ok(secs) = v.parse() {
                config.window_padding_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("ORACLE_WINDOW_SIZE") {
            if let Ok(n) = v.parse() {
                config.window_size = n;
            }
        }
        if let Ok(v) = std::env::var("ORACLE_REQUIRE_CONSECUTIVE_SEQUENCE") {
            config.require_consecutive_sequence =
                matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON");
        }

        config
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Decoded signer key bytes.
    pub fn signer_key_bytes(&self) -> Result<Vec<u8>> {
        let bytes = decode_hex("signer_key", &self.signer_key)?;
        parse_signer_key(&bytes)?;
        Ok(bytes)
    }

    pub fn validate(&self) -> Vec<ConfigViolation> {
        let mut violations = Vec::new();
        let mut push = |field: &str, description: String| {
            violations.push(ConfigViolation {
                field: field.to_string(),
                description,
            })
        };

        if self.signer_key.is_empty() {
            push("signer_key", "signer key is empty".to_string());
        } else if let Err(e) = self.signer_key_bytes() {
            push("signer_key", e.to_string());
        }
        if self.relay_host.is_empty() {
            push("relay_host", "relay host is empty".to_string());
        }
        if self.relay_port == 0 {
            push("relay_port", "relay port must be non-zero".to_string());
        }
        if self.window_size < 2 {
            push(
                "window_size",
                format!("need at least 2 messages to bracket maturity, got {}", self.window_size),
            );
        }
        if self.window_padding_secs < 0 {
            push(
                "window_padding_secs",
                format!("padding must not be negative, got {}", self.window_padding_secs),
            );
        }

        violations
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}
