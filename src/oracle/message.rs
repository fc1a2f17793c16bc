//! Oracle Price Message Wire Format
//!
//! Fixed 16-byte binary layout signed by the price oracle.
//! Prices are integers in the oracle's quote unit (e.g. US cents per BCH).

use serde::{Deserialize, Serialize};

use crate::error::{Result, SettlementError};

/// Total message size in bytes
/// 4+4+4+4 = 16 bytes
pub const PRICE_MESSAGE_SIZE: usize = 16;

/// Decoded oracle message
///
/// Layout (all fields little-endian):
/// ```text
/// Offset  Size  Field
/// 0       4     message_timestamp (unix seconds)
/// 4       4     message_sequence
/// 8       4     price_sequence (<= 0 for metadata messages)
/// 12      4     price_value
/// Total: 16 bytes
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceMessage {
    pub message_timestamp: u32,
    pub message_sequence: u32,
    pub price_sequence: i32,
    pub price_value: i32,
}

impl PriceMessage {
    pub fn new(
        message_timestamp: u32,
        message_sequence: u32,
        price_sequence: i32,
        price_value: i32,
    ) -> Self {
        Self {
            message_timestamp,
            message_sequence,
            price_sequence,
            price_value,
        }
    }

    /// Decode from bytes. Only the length is validated here; callers are
    /// expected to have checked the signature first.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let buf: &[u8; PRICE_MESSAGE_SIZE] = buf
            .try_into()
            .map_err(|_| SettlementError::MalformedMessage { len: buf.len() })?;

        Ok(Self {
            message_timestamp: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            message_sequence: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            price_sequence: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            price_value: i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        })
    }

    /// Serialize to bytes
    pub fn encode(&self) -> [u8; PRICE_MESSAGE_SIZE] {
        let mut buf = [0u8; PRICE_MESSAGE_SIZE];
        buf[0..4].copy_from_slice(&self.message_timestamp.to_le_bytes());
        buf[4..8].copy_from_slice(&self.message_sequence.to_le_bytes());
        buf[8..12].copy_from_slice(&self.price_sequence.to_le_bytes());
        buf[12..16].copy_from_slice(&self.price_value.to_le_bytes());
        buf
    }

    /// Metadata messages share the layout but carry a non-positive price sequence.
    #[inline]
    pub fn is_price_message(&self) -> bool {
        self.price_sequence > 0
    }
}
