//! Contract Settlement
//!
//! Turns verified oracle observations into a settlement request:
//!
//! ```text
//!   relay ──▶ OracleClient::fetch ──▶ PriceObservation::verify
//!                                          │ (bad signatures excluded)
//!                                          ▼
//!                              SettlementWindowResolver::resolve
//!                                          │ BracketingPair
//!                                          ▼
//!                              SettlementRequestBuilder::build
//!                                          │ SettlementRequest
//!                                          ▼
//!                                    PayoutEngine
//! ```

pub mod pipeline;
pub mod request;
pub mod window;


pub use pipeline::{
    PayoutArtifact, PayoutEngine, PayoutError, ResolutionStage, ResolutionTracker,
    SettlementPipeline, SettlementResponse,
};
pub use request::{
    ContractSettlementContext, FundingReference, SettlementKind, SettlementRequest,
    SettlementRequestBuilder,
};
pub use window::{sort_most_recent_first, AdjacencyPolicy, BracketingPair, SettlementWindowResolver};
