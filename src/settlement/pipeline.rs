//! Settlement Resolution Pipeline
//!
//! One call drives one resolution through
//! `Pending → Fetching → Verifying → WindowResolved → RequestBuilt`,
//! or into `Failed` from any non-terminal stage. Nothing is shared between
//! calls, so a single pipeline can serve concurrent settlements.
//!
//! The payout engine that turns a request into a transaction is external and
//! sits behind [`PayoutEngine`]; its errors are surfaced verbatim.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::request::{ContractSettlementContext, SettlementRequest, SettlementRequestBuilder};
use super::window::{AdjacencyPolicy, BracketingPair, SettlementWindowResolver};
use crate::error::{Result, SettlementError};
use crate::oracle::{
    MessageVerifier, OracleClient, OracleConfig, PriceFeedTransport, PriceObservation,
    RawObservation, SearchConstraints,
};

// =============================================================================
// Resolution State Machine
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStage {
    Pending,
    Fetching,
    Verifying,
    WindowResolved,
    RequestBuilt,
    Failed,
}

impl ResolutionStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RequestBuilt | Self::Failed)
    }

    fn can_advance_to(&self, next: ResolutionStage) -> bool {
        use ResolutionStage::*;
        match (self, next) {
            (Pending, Fetching)
            | (Fetching, Verifying)
            | (Verifying, WindowResolved)
            | (WindowResolved, RequestBuilt) => true,
            // Liquidation skips retrieval and window search.
            (Pending, Verifying) | (Verifying, RequestBuilt) => true,
            (from, Failed) => !from.is_terminal(),
            _ => false,
        }
    }
}

/// Tracks a single resolution; stages are never revisited.
#[derive(Debug, Clone)]
pub struct ResolutionTracker {
    stage: ResolutionStage,
    history: Vec<ResolutionStage>,
}

impl Default for ResolutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionTracker {
    pub fn new() -> Self {
        Self {
            stage: ResolutionStage::Pending,
            history: vec![ResolutionStage::Pending],
        }
    }

    pub fn stage(&self) -> ResolutionStage {
        self.stage
    }

    pub fn history(&self) -> &[ResolutionStage] {
        &self.history
    }

    /// Move to `next`. Returns false (and stays put) on an illegal transition.
    pub fn advance(&mut self, next: ResolutionStage) -> bool {
        if !self.stage.can_advance_to(next) {
            warn!(from = ?self.stage, to = ?next, "Illegal resolution transition");
            return false;
        }
        debug!(from = ?self.stage, to = ?next, "Resolution stage");
        self.stage = next;
        self.history.push(next);
        true
    }

    /// Mark failed and hand the error back for propagation.
    pub fn fail(&mut self, err: SettlementError) -> SettlementError {
        self.advance(ResolutionStage::Failed);
        err
    }
}

// =============================================================================
// Payout Engine Seam
// =============================================================================

/// Whatever the payout engine produced (e.g. a built transaction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoutArtifact(pub serde_json::Value);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutError {
    pub message: String,
}

impl PayoutError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for PayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for PayoutError {}

impl From<PayoutError> for SettlementError {
    fn from(e: PayoutError) -> Self {
        SettlementError::PayoutConstructionError(e.message)
    }
}

#[async_trait::async_trait]
pub trait PayoutEngine: Send + Sync {
    async fn mature(&self, request: &SettlementRequest) -> std::result::Result<PayoutArtifact, PayoutError>;
    async fn liquidate(&self, request: &SettlementRequest) -> std::result::Result<PayoutArtifact, PayoutError>;
}

// =============================================================================
// Uniform Outcome
// =============================================================================

/// Outcome shape returned by every public pipeline operation.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementResponse<T> {
    pub success: bool,
    pub settlement_data: Option<T>,
    pub error: Option<String>,
    pub stage: ResolutionStage,
}

impl<T> SettlementResponse<T> {
    fn from_result(result: Result<T>, stage: ResolutionStage) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                settlement_data: Some(data),
                error: None,
                stage,
            },
            Err(e) => Self {
                success: false,
                settlement_data: None,
                error: Some(e.to_string()),
                stage,
            },
        }
    }

    pub fn into_result(self) -> std::result::Result<T, String> {
        match (self.success, self.settlement_data) {
            (true, Some(data)) => Ok(data),
            _ => Err(self.error.unwrap_or_else(|| "unknown settlement failure".to_string())),
        }
    }
}

// =============================================================================
// Pipeline
// =============================================================================

pub struct SettlementPipeline<T> {
    client: OracleClient<T>,
    verifier: MessageVerifier,
    resolver: SettlementWindowResolver,
    builder: SettlementRequestBuilder,
    window_padding_secs: i64,
    window_size: usize,
}

impl<T: PriceFeedTransport> SettlementPipeline<T> {
    pub fn new(transport: T, config: &OracleConfig) -> Self {
        Self {
            client: OracleClient::new(transport),
            verifier: MessageVerifier::new(),
            resolver: SettlementWindowResolver::new(AdjacencyPolicy::from_flag(
                config.require_consecutive_sequence,
            )),
            builder: SettlementRequestBuilder::new(),
            window_padding_secs: config.window_padding_secs,
            window_size: config.window_size,
        }
    }

    pub fn client(&self) -> &OracleClient<T> {
        &self.client
    }

    /// Verify and decode fetched messages, silently excluding bad ones.
    ///
    /// Messages with invalid signatures, malformed payloads, metadata
    /// payloads, or values outside `constraints` never reach the resolver.
    pub fn verify_observations(
        &self,
        raw: &[RawObservation],
        constraints: &SearchConstraints,
    ) -> Vec<PriceObservation> {
        raw.iter()
            .filter_map(|obs| match PriceObservation::verify(&self.verifier, obs) {
                Ok(verified) => Some(verified),
                Err(e) => {
                    warn!(
                        kind = e.kind(),
                        error = %e,
                        payload = %hex::encode(&obs.payload),
                        "Excluding oracle message"
                    );
                    None
                }
            })
            .filter(|obs| {
                let in_bounds = obs.is_price_message()
                    && obs.price_sequence >= constraints.min_sequence
                    && constraints.max_timestamp.map_or(true, |max| obs.timestamp <= max);
                if !in_bounds {
                    debug!(
                        timestamp = obs.timestamp,
                        message_sequence = obs.message_sequence,
                        price_sequence = obs.price_sequence,
                        "Ignoring message outside search bounds"
                    );
                }
                in_bounds
            })
            .collect()
    }

    /// Fetch, verify and resolve the bracketing pair for `maturity`.
    pub async fn resolve_window(&self, signer_key: &[u8], maturity: i64) -> Result<BracketingPair> {
        let mut tracker = ResolutionTracker::new();
        self.resolve_window_tracked(&mut tracker, signer_key, maturity)
            .await
    }

    async fn resolve_window_tracked(
        &self,
        tracker: &mut ResolutionTracker,
        signer_key: &[u8],
        maturity: i64,
    ) -> Result<BracketingPair> {
        let constraints = SearchConstraints::around_maturity(
            signer_key.to_vec(),
            maturity,
            self.window_padding_secs,
            self.window_size,
        );

        tracker.advance(ResolutionStage::Fetching);
        let raw = self
            .client
            .fetch(&constraints)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(ResolutionStage::Verifying);
        let verified = self.verify_observations(&raw, &constraints);
        debug!(
            fetched = raw.len(),
            verified = verified.len(),
            maturity,
            "Oracle messages verified"
        );

        let pair = self
            .resolver
            .resolve(&verified, maturity)
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(ResolutionStage::WindowResolved);
        Ok(pair)
    }

    /// Resolve and build the maturity request for `context`.
    pub async fn resolve_maturity(&self, context: &ContractSettlementContext) -> Result<SettlementRequest> {
        let mut tracker = ResolutionTracker::new();
        self.resolve_maturity_tracked(&mut tracker, context).await
    }

    async fn resolve_maturity_tracked(
        &self,
        tracker: &mut ResolutionTracker,
        context: &ContractSettlementContext,
    ) -> Result<SettlementRequest> {
        let pair = self
            .resolve_window_tracked(tracker, &context.registered_signer_key, context.maturity_timestamp)
            .await?;

        let request = self
            .builder
            .build_from_pair(context, &pair)
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(ResolutionStage::RequestBuilt);
        Ok(request)
    }

    /// Resolve the maturity price and hand the request to the payout engine.
    pub async fn settle_maturity(
        &self,
        context: &ContractSettlementContext,
        engine: &dyn PayoutEngine,
    ) -> SettlementResponse<PayoutArtifact> {
        let mut tracker = ResolutionTracker::new();
        info!(
            signer = %context.signer_hex(),
            maturity = context.maturity_timestamp,
            "Settling contract at maturity"
        );

        let result = match self.resolve_maturity_tracked(&mut tracker, context).await {
            Ok(request) => engine.mature(&request).await.map_err(SettlementError::from),
            Err(e) => Err(e),
        };
        log_outcome("maturity", &result, tracker.stage());
        SettlementResponse::from_result(result, tracker.stage())
    }

    /// Liquidate with two caller-supplied price messages.
    pub async fn liquidate(
        &self,
        context: &ContractSettlementContext,
        previous: &RawObservation,
        settlement: &RawObservation,
        engine: &dyn PayoutEngine,
    ) -> SettlementResponse<PayoutArtifact> {
        let mut tracker = ResolutionTracker::new();
        info!(signer = %context.signer_hex(), "Liquidating contract");

        tracker.advance(ResolutionStage::Verifying);
        let result = match self.builder.build_liquidation(context, previous, settlement) {
            Ok(request) => {
                tracker.advance(ResolutionStage::RequestBuilt);
                engine.liquidate(&request).await.map_err(SettlementError::from)
            }
            Err(e) => Err(tracker.fail(e)),
        };
        log_outcome("liquidation", &result, tracker.stage());
        SettlementResponse::from_result(result, tracker.stage())
    }
}

fn log_outcome<T>(what: &str, result: &Result<T>, stage: ResolutionStage) {
    match result {
        Ok(_) => info!(what, ?stage, "Payout constructed"),
        Err(e) => warn!(
            what,
            ?stage,
            kind = e.kind(),
            retryable = e.is_retryable(),
            error = %e,
            "Settlement failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_success_path() {
        let mut tracker = ResolutionTracker::new();
        for stage in [
            ResolutionStage::Fetching,
            ResolutionStage::Verifying,
            ResolutionStage::WindowResolved,
            ResolutionStage::RequestBuilt,
        ] {
            assert!(tracker.advance(stage));
        }
        assert!(tracker.stage().is_terminal());
        assert_eq!(tracker.history().len(), 5);
    }

    #[test]
    fn test_tracker_never_revisits() {
        let mut tracker = ResolutionTracker::new();
        assert!(tracker.advance(ResolutionStage::Fetching));
        assert!(!tracker.advance(ResolutionStage::Fetching));
        assert!(!tracker.advance(ResolutionStage::Pending));
        assert!(tracker.advance(ResolutionStage::Failed));
        assert!(!tracker.advance(ResolutionStage::Failed));
        assert!(!tracker.advance(ResolutionStage::Verifying));
        assert_eq!(tracker.stage(), ResolutionStage::Failed);
    }

    #[test]
    fn test_request_built_is_terminal() {
        let mut tracker = ResolutionTracker::new();
        tracker.advance(ResolutionStage::Verifying);
        tracker.advance(ResolutionStage::RequestBuilt);
        assert!(!tracker.advance(ResolutionStage::Failed));
    }

    #[test]
    fn test_response_shape() {
        let ok = SettlementResponse::from_result(Ok(1u32), ResolutionStage::RequestBuilt);
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["settlement_data"], 1);
        assert!(json["error"].is_null());
        assert_eq!(json["stage"], "REQUEST_BUILT");

        let err: SettlementResponse<u32> = SettlementResponse::from_result(
            Err(SettlementError::PayoutConstructionError("insufficient funds".into())),
            ResolutionStage::RequestBuilt,
        );
        assert_eq!(err.clone().into_result().unwrap_err(), "insufficient funds");
        assert!(!err.success);
    }
}
