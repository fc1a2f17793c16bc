//! Oracle Settlement Library
//!
//! Verifies signed oracle price messages and resolves the price pair that
//! settles a contract at maturity.

pub mod error;
pub mod oracle;
pub mod settlement;

pub use error::{Result, SettlementError, WindowFailure};
pub use oracle::{MessageVerifier, OracleClient, OracleConfig, PriceObservation, RawObservation};
pub use settlement::{
    BracketingPair, ContractSettlementContext, SettlementPipeline, SettlementRequest,
    SettlementRequestBuilder, SettlementWindowResolver,
};
