//! Settlement request assembly.
//!
//! A [`SettlementRequest`] is the only artifact handed to the payout engine.
//! Both observations are re-verified against the contract's registered
//! signer here, independently of any earlier verification pass.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use super::window::BracketingPair;
use crate::error::{Result, SettlementError, WindowFailure};
use crate::oracle::observation::hex_bytes;
use crate::oracle::{MessageVerifier, PriceObservation, RawObservation};

/// Funding output the payout will spend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingReference {
    pub funding_transaction_hash: String,
    pub funding_output_index: u32,
    pub funding_satoshis: u64,
}

/// Read-only view of the contract being settled.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSettlementContext {
    pub maturity_timestamp: i64,
    #[serde(with = "hex_bytes")]
    pub registered_signer_key: Vec<u8>,
    pub funding_reference: Option<Arc<FundingReference>>,
    pub metadata: Arc<serde_json::Value>,
    pub parameters: Arc<serde_json::Value>,
}

impl ContractSettlementContext {
    pub fn new(maturity_timestamp: i64, registered_signer_key: Vec<u8>) -> Self {
        Self {
            maturity_timestamp,
            registered_signer_key,
            funding_reference: None,
            metadata: Arc::new(serde_json::Value::Null),
            parameters: Arc::new(serde_json::Value::Null),
        }
    }

    pub fn with_funding(mut self, funding: FundingReference) -> Self {
        self.funding_reference = Some(Arc::new(funding));
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Arc::new(metadata);
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = Arc::new(parameters);
        self
    }

    pub fn signer_hex(&self) -> String {
        hex::encode(&self.registered_signer_key)
    }
}

/// Which payout path the request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Maturity,
    Liquidation,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    pub kind: SettlementKind,
    #[serde(with = "hex_bytes")]
    pub signer_key: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub settlement_payload: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub settlement_signature: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub previous_payload: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub previous_signature: Vec<u8>,
    pub funding_reference: Option<Arc<FundingReference>>,
    pub metadata: Arc<serde_json::Value>,
    pub parameters: Arc<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementRequestBuilder {
    verifier: MessageVerifier,
}

impl SettlementRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a maturity request from a resolved pair.
    pub fn build(
        &self,
        context: &ContractSettlementContext,
        previous: &PriceObservation,
        settlement: &PriceObservation,
    ) -> Result<SettlementRequest> {
        self.assemble(SettlementKind::Maturity, context, previous, settlement)
    }

    pub fn build_from_pair(
        &self,
        context: &ContractSettlementContext,
        pair: &BracketingPair,
    ) -> Result<SettlementRequest> {
        self.build(context, &pair.previous, &pair.settlement)
    }

    /// Build a liquidation request from two caller-supplied raw messages.
    ///
    /// No maturity bracket applies; both messages must verify against the
    /// registered signer and be in chronological order.
    pub fn build_liquidation(
        &self,
        context: &ContractSettlementContext,
        previous: &RawObservation,
        settlement: &RawObservation,
    ) -> Result<SettlementRequest> {
        let previous = self.verify_registered(context, previous, "previous")?;
        let settlement = self.verify_registered(context, settlement, "settlement")?;
        self.assemble(SettlementKind::Liquidation, context, &previous, &settlement)
    }

    fn verify_registered(
        &self,
        context: &ContractSettlementContext,
        raw: &RawObservation,
        role: &str,
    ) -> Result<PriceObservation> {
        check_signer(context, &raw.signer_key)?;
        PriceObservation::verify(&self.verifier, raw).map_err(|e| match e {
            SettlementError::InvalidSignature { .. } => SettlementError::InvalidSignature {
                what: format!("{} price message", role),
            },
            other => other,
        })
    }

    fn assemble(
        &self,
        kind: SettlementKind,
        context: &ContractSettlementContext,
        previous: &PriceObservation,
        settlement: &PriceObservation,
    ) -> Result<SettlementRequest> {
        check_signer(context, &previous.signer_key)?;
        check_signer(context, &settlement.signer_key)?;

        for (role, obs) in [("previous", previous), ("settlement", settlement)] {
            let raw = obs.raw();
            let valid = self.verifier.verify(
                &raw.payload,
                &raw.signature,
                &context.registered_signer_key,
            )?;
            if !valid {
                warn!(role, signer = %context.signer_hex(), "Re-verification failed");
                return Err(SettlementError::InvalidSignature {
                    what: format!("{} price message", role),
                });
            }
        }

        if previous.timestamp >= settlement.timestamp {
            return Err(WindowFailure::NotChronological {
                previous: previous.timestamp,
                settlement: settlement.timestamp,
            }
            .into());
        }

        info!(
            ?kind,
            signer = %context.signer_hex(),
            previous_ts = previous.timestamp,
            settlement_ts = settlement.timestamp,
            settlement_price = settlement.price_value,
            "Settlement request built"
        );

        Ok(SettlementRequest {
            kind,
            signer_key: context.registered_signer_key.clone(),
            settlement_payload: settlement.raw().payload.clone(),
            settlement_signature: settlement.raw().signature.clone(),
            previous_payload: previous.raw().payload.clone(),
            previous_signature: previous.raw().signature.clone(),
            funding_reference: context.funding_reference.clone(),
            metadata: Arc::clone(&context.metadata),
            parameters: Arc::clone(&context.parameters),
        })
    }
}

fn check_signer(context: &ContractSettlementContext, signer_key: &[u8]) -> Result<()> {
    if signer_key != context.registered_signer_key.as_slice() {
        warn!(
            expected = %context.signer_hex(),
            actual = %hex::encode(signer_key),
            "Signer mismatch"
        );
        return Err(SettlementError::SignerMismatch {
            expected: context.signer_hex(),
            actual: hex::encode(signer_key),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::fixtures::TestOracle;
    use serde_json::json;

    fn context_for(oracle: &TestOracle) -> ContractSettlementContext {
        ContractSettlementContext::new(200, oracle.public_key())
            .with_funding(FundingReference {
                funding_transaction_hash: "ab".repeat(32),
                funding_output_index: 0,
                funding_satoshis: 100_000,
            })
            .with_metadata(json!({ "oraclePublicKey": hex::encode(oracle.public_key()) }))
            .with_parameters(json!({ "maturityTimestamp": 200 }))
    }

    #[test]
    fn test_build_copies_context() {
        let oracle = TestOracle::new(4);
        let context = context_for(&oracle);
        let previous = oracle.observation(160, 2);
        let settlement = oracle.observation(220, 3);

        let request = SettlementRequestBuilder::new()
            .build(&context, &previous, &settlement)
            .unwrap();

        assert_eq!(request.kind, SettlementKind::Maturity);
        assert_eq!(request.signer_key, context.registered_signer_key);
        assert_eq!(request.settlement_payload, settlement.raw().payload);
        assert_eq!(request.previous_signature, previous.raw().signature);
        assert!(Arc::ptr_eq(&request.metadata, &context.metadata));
        assert!(Arc::ptr_eq(&request.parameters, &context.parameters));
        assert_eq!(
            request.funding_reference.as_deref().map(|f| f.funding_satoshis),
            Some(100_000)
        );
    }

    #[test]
    fn test_signer_mismatch_produces_no_request() {
        let registered = TestOracle::new(4);
        let other = TestOracle::new(5);
        let context = context_for(&registered);

        let result = SettlementRequestBuilder::new().build(
            &context,
            &other.observation(160, 2),
            &other.observation(220, 3),
        );
        assert!(matches!(result, Err(SettlementError::SignerMismatch { .. })));

        // One side is enough to reject
        let result = SettlementRequestBuilder::new().build(
            &context,
            &registered.observation(160, 2),
            &other.observation(220, 3),
        );
        assert!(matches!(result, Err(SettlementError::SignerMismatch { .. })));
    }

    #[test]
    fn test_inverted_pair_rejected() {
        let oracle = TestOracle::new(4);
        let result = SettlementRequestBuilder::new().build(
            &context_for(&oracle),
            &oracle.observation(220, 3),
            &oracle.observation(160, 2),
        );
        assert!(matches!(
            result,
            Err(SettlementError::SettlementWindowNotFound(
                WindowFailure::NotChronological { .. }
            ))
        ));
    }

    #[test]
    fn test_liquidation_from_raw_messages() {
        let oracle = TestOracle::new(4);
        let request = SettlementRequestBuilder::new()
            .build_liquidation(
                &context_for(&oracle),
                &oracle.price_at(120, 1),
                &oracle.price_at(180, 2),
            )
            .unwrap();
        assert_eq!(request.kind, SettlementKind::Liquidation);
    }

    #[test]
    fn test_liquidation_rejects_tampered_message() {
        let oracle = TestOracle::new(4);
        let mut tampered = oracle.price_at(180, 2);
        tampered.payload[13] ^= 0x01;

        let err = SettlementRequestBuilder::new()
            .build_liquidation(&context_for(&oracle), &oracle.price_at(120, 1), &tampered)
            .unwrap_err();
        assert_eq!(
            err,
            SettlementError::InvalidSignature {
                what: "settlement price message".into()
            }
        );
    }

    #[test]
    fn test_request_json_is_hex() {
        let oracle = TestOracle::new(4);
        let context = context_for(&oracle);
        let request = SettlementRequestBuilder::new()
            .build(&context, &oracle.observation(160, 2), &oracle.observation(220, 3))
            .unwrap();

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["kind"], "maturity");
        assert_eq!(json["signerKey"], context.signer_hex());
        assert_eq!(json["settlementPayload"].as_str().unwrap().len(), 32);
        assert_eq!(json["fundingReference"]["fundingSatoshis"], 100_000);
        assert_eq!(json["parameters"]["maturityTimestamp"], 200);
    }
}
