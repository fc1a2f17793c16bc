//! Raw and verified oracle observations.
//!
//! `RawObservation` is the wire artifact exactly as the relay returned it.
//! `PriceObservation` can only be produced by [`PriceObservation::verify`],
//! so holding one means its originating raw message passed signature checks.

use serde::{Deserialize, Serialize};

use super::message::PriceMessage;
use super::verify::MessageVerifier;
use crate::error::{Result, SettlementError};

/// Signed oracle message as received from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawObservation {
    #[serde(rename = "message", with = "hex_bytes")]
    pub payload: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    #[serde(rename = "publicKey", with = "hex_bytes")]
    pub signer_key: Vec<u8>,
}

impl RawObservation {
    pub fn new(payload: Vec<u8>, signature: Vec<u8>, signer_key: Vec<u8>) -> Self {
        Self {
            payload,
            signature,
            signer_key,
        }
    }

    /// Parse the hex triple the relay and callers exchange.
    pub fn from_hex(payload: &str, signature: &str, signer_key: &str) -> Result<Self> {
        Ok(Self {
            payload: decode_hex("payload", payload)?,
            signature: decode_hex("signature", signature)?,
            signer_key: decode_hex("signer_key", signer_key)?,
        })
    }

    pub fn signer_hex(&self) -> String {
        hex::encode(&self.signer_key)
    }
}

pub(crate) fn decode_hex(field: &'static str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| SettlementError::invalid_encoding(field, e.to_string()))
}

/// Decoded price observation, paired with the raw message it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceObservation {
    pub timestamp: i64,
    pub message_sequence: i64,
    pub price_sequence: i64,
    pub price_value: i64,
    #[serde(with = "hex_bytes")]
    pub signer_key: Vec<u8>,
    #[serde(skip)]
    raw: RawObservation,
}

impl PriceObservation {
    /// Verify `raw` against its own claimed key, then decode it.
    ///
    /// A merely wrong signature yields `InvalidSignature`; shape problems
    /// yield `InvalidEncoding` or `MalformedMessage`.
    pub fn verify(verifier: &MessageVerifier, raw: &RawObservation) -> Result<Self> {
        if !verifier.verify(&raw.payload, &raw.signature, &raw.signer_key)? {
            return Err(SettlementError::InvalidSignature {
                what: format!("price message {}", hex::encode(&raw.payload)),
            });
        }

        let msg = PriceMessage::decode(&raw.payload)?;
        Ok(Self {
            timestamp: i64::from(msg.message_timestamp),
            message_sequence: i64::from(msg.message_sequence),
            price_sequence: i64::from(msg.price_sequence),
            price_value: i64::from(msg.price_value),
            signer_key: raw.signer_key.clone(),
            raw: raw.clone(),
        })
    }

    /// The signed message this observation was decoded from.
    pub fn raw(&self) -> &RawObservation {
        &self.raw
    }

    pub fn is_price_message(&self) -> bool {
        self.price_sequence > 0
    }

    pub fn signer_hex(&self) -> String {
        hex::encode(&self.signer_key)
    }
}

pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
