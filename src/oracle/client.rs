//! Oracle Relay Client
//!
//! Thin shim over the price relay. The relay is asked for a bounded search
//! (`publicKey`, `minDataSequence`, `maxMessageTimestamp`, `count`) and answers
//! with signed messages, most recent first. Transport and retry policy live
//! behind [`PriceFeedTransport`]; this module only shapes the request and
//! enforces the signer and size bounds on what comes back.

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::config::OracleConfig;
use super::observation::{PriceObservation, RawObservation};
use super::verify::MessageVerifier;
use crate::error::{Result, SettlementError};

/// Bounds for a single retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConstraints {
    pub signer_key: Vec<u8>,
    pub min_sequence: i64,
    /// `None` searches up to the newest message.
    pub max_timestamp: Option<i64>,
    pub limit: usize,
}

impl SearchConstraints {
    /// Window of `limit` messages ending `padding_secs` after `maturity`.
    ///
    /// The bound saturates instead of wrapping for maturities near `i64::MAX`.
    pub fn around_maturity(signer_key: Vec<u8>, maturity: i64, padding_secs: i64, limit: usize) -> Self {
        Self {
            signer_key,
            min_sequence: 1,
            max_timestamp: Some(maturity.saturating_add(padding_secs)),
            limit,
        }
    }

    pub fn latest(signer_key: Vec<u8>) -> Self {
        Self {
            signer_key,
            min_sequence: 1,
            max_timestamp: None,
            limit: 1,
        }
    }

    pub fn to_request(&self) -> SearchRequest {
        SearchRequest {
            public_key: hex::encode(&self.signer_key),
            min_data_sequence: self.min_sequence,
            max_message_timestamp: self.max_timestamp,
            count: self.limit,
        }
    }
}

/// Search request as sent to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub public_key: String,
    pub min_data_sequence: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_timestamp: Option<i64>,
    pub count: usize,
}

/// Relay answer: either a list of signed messages or a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedResponse {
    Observations(Vec<RawObservation>),
    Unavailable { reason: String },
}

#[async_trait::async_trait]
pub trait PriceFeedTransport: Send + Sync {
    async fn request(&self, search: &SearchRequest) -> FeedResponse;
}

/// HTTP transport to an oracle relay.
pub struct RelayHttpTransport {
    client: Client,
    url: String,
}

impl RelayHttpTransport {
    pub fn new(relay_host: &str, relay_port: u16, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            url: format!("http://{}:{}/api/v1/oracleMessages", relay_host, relay_port),
        })
    }

    pub fn from_config(config: &OracleConfig) -> anyhow::Result<Self> {
        Self::new(&config.relay_host, config.relay_port, config.request_timeout())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, search: &SearchRequest) -> anyhow::Result<Vec<RawObservation>> {
        let response = self
            .client
            .post(&self.url)
            .json(search)
            .send()
            .await
            .context("relay request failed")?
            .error_for_status()
            .context("relay returned error status")?;

        response
            .json::<Vec<RawObservation>>()
            .await
            .context("failed to parse relay response")
    }
}

#[async_trait::async_trait]
impl PriceFeedTransport for RelayHttpTransport {
    async fn request(&self, search: &SearchRequest) -> FeedResponse {
        match self.post(search).await {
            Ok(observations) => FeedResponse::Observations(observations),
            Err(e) => FeedResponse::Unavailable {
                reason: format!("{:#}", e),
            },
        }
    }
}

/// Client over any [`PriceFeedTransport`].
pub struct OracleClient<T> {
    transport: T,
    verifier: MessageVerifier,
}

impl<T: PriceFeedTransport> OracleClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            verifier: MessageVerifier::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch raw messages for `constraints`.
    ///
    /// Messages claiming a different signer are dropped and the result is
    /// capped at `limit`. Payloads are not decoded here: ordering and bounds
    /// are re-checked only after verification.
    pub async fn fetch(&self, constraints: &SearchConstraints) -> Result<Vec<RawObservation>> {
        let request = constraints.to_request();
        debug!(
            signer = %request.public_key,
            min_sequence = request.min_data_sequence,
            max_timestamp = ?request.max_message_timestamp,
            count = request.count,
            "Requesting oracle messages"
        );

        let observations = match self.transport.request(&request).await {
            FeedResponse::Observations(observations) => observations,
            FeedResponse::Unavailable { reason } => {
                warn!(signer = %request.public_key, %reason, "Oracle relay unavailable");
                return Err(SettlementError::FeedUnavailable { reason });
            }
        };

        let received = observations.len();
        let mut kept: Vec<RawObservation> = observations
            .into_iter()
            .filter(|obs| {
                let matches = obs.signer_key == constraints.signer_key;
                if !matches {
                    debug!(claimed = %obs.signer_hex(), "Dropping message from foreign signer");
                }
                matches
            })
            .collect();
        kept.truncate(constraints.limit);

        debug!(received, kept = kept.len(), "Oracle messages fetched");
        Ok(kept)
    }

    /// Latest verified observation for `signer_key`.
    pub async fn latest_observation(&self, signer_key: &[u8]) -> Result<PriceObservation> {
        let constraints = SearchConstraints::latest(signer_key.to_vec());
        let raw = self
            .fetch(&constraints)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| SettlementError::FeedUnavailable {
                reason: "relay returned no messages".to_string(),
            })?;

        // The relay handed us a message we cannot authenticate: not retryable.
        PriceObservation::verify(&self.verifier, &raw)
    }
}
