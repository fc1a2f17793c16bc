//! Oracle price messages: wire format, signature checks and relay access.
//!
//! Every message the relay returns is a signed 16-byte payload. Nothing in
//! this module trusts a payload before [`MessageVerifier`] has accepted its
//! signature; [`PriceObservation`] is only ever built on top of that check.

pub mod client;
pub mod config;
pub mod message;
pub mod observation;
pub mod verify;

#[cfg(test)]
pub(crate) mod fixtures;

pub use client::{
    FeedResponse, OracleClient, PriceFeedTransport, RelayHttpTransport, SearchConstraints,
    SearchRequest,
};
pub use config::{ConfigViolation, OracleConfig, DEFAULT_RELAY_PORT};
pub use message::{PriceMessage, PRICE_MESSAGE_SIZE};
pub use observation::{PriceObservation, RawObservation};
pub use verify::{MessageVerifier, SIGNATURE_SIZE, SIGNER_KEY_SIZE};
