//! Error taxonomy for price-message verification and settlement resolution.

use serde::Serialize;

/// Why a bracketing pair could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum WindowFailure {
    /// No candidate observations at all.
    Empty,
    /// Nothing at or after maturity: the feed has not caught up yet.
    TooEarly { maturity: i64, newest: i64 },
    /// Nothing before maturity: the window does not reach back far enough.
    TooLate { maturity: i64, oldest: i64 },
    /// The pair straddles maturity but is not consecutive.
    Gap {
        previous_sequence: i64,
        settlement_sequence: i64,
    },
    /// The supplied pair is not in chronological order.
    NotChronological { previous: i64, settlement: i64 },
}

impl std::fmt::Display for WindowFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "no verified price observations"),
            Self::TooEarly { maturity, newest } => write!(
                f,
                "too early: newest observation {} is before maturity {}",
                newest, maturity
            ),
            Self::TooLate { maturity, oldest } => write!(
                f,
                "too late: oldest observation {} is not before maturity {}",
                oldest, maturity
            ),
            Self::Gap {
                previous_sequence,
                settlement_sequence,
            } => write!(
                f,
                "gap between price sequences {} and {}",
                previous_sequence, settlement_sequence
            ),
            Self::NotChronological {
                previous,
                settlement,
            } => write!(
                f,
                "previous timestamp {} is not before settlement timestamp {}",
                previous, settlement
            ),
        }
    }
}

/// Errors raised while fetching, verifying and resolving oracle price messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    /// Transport-level failure talking to the price relay.
    FeedUnavailable { reason: String },
    /// Input bytes are not of the expected shape (length or curve point).
    InvalidEncoding { field: &'static str, detail: String },
    /// Price message payload does not match the fixed layout.
    MalformedMessage { len: usize },
    /// Signature did not verify against the claimed signer.
    InvalidSignature { what: String },
    /// No usable bracketing pair in the retrieved set.
    SettlementWindowNotFound(WindowFailure),
    /// Observation signer differs from the contract's registered signer.
    SignerMismatch { expected: String, actual: String },
    /// Opaque failure from the external payout engine.
    PayoutConstructionError(String),
}

impl SettlementError {
    pub fn invalid_encoding(field: &'static str, detail: impl Into<String>) -> Self {
        Self::InvalidEncoding {
            field,
            detail: detail.into(),
        }
    }

    /// Whether a fresh attempt (possibly with a wider window) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FeedUnavailable { .. } | Self::SettlementWindowNotFound(_)
        )
    }

    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FeedUnavailable { .. } => "feed_unavailable",
            Self::InvalidEncoding { .. } => "invalid_encoding",
            Self::MalformedMessage { .. } => "malformed_message",
            Self::InvalidSignature { .. } => "invalid_signature",
            Self::SettlementWindowNotFound(_) => "settlement_window_not_found",
            Self::SignerMismatch { .. } => "signer_mismatch",
            Self::PayoutConstructionError(_) => "payout_construction_error",
        }
    }
}

impl std::fmt::Display for SettlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeedUnavailable { reason } => write!(f, "price feed unavailable: {}", reason),
            Self::InvalidEncoding { field, detail } => {
                write!(f, "invalid encoding for {}: {}", field, detail)
            }
            Self::MalformedMessage { len } => write!(
                f,
                "malformed price message: {} bytes (expected {})",
                len,
                crate::oracle::message::PRICE_MESSAGE_SIZE
            ),
            Self::InvalidSignature { what } => write!(f, "invalid signature on {}", what),
            Self::SettlementWindowNotFound(reason) => {
                write!(f, "unable to find settlement price: {}", reason)
            }
            Self::SignerMismatch { expected, actual } => write!(
                f,
                "signer mismatch: contract registers {} but observation is signed by {}",
                expected, actual
            ),
            Self::PayoutConstructionError(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for SettlementError {}

impl From<WindowFailure> for SettlementError {
    fn from(reason: WindowFailure) -> Self {
        Self::SettlementWindowNotFound(reason)
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
