//! Price message signature verification.
//!
//! Oracle messages carry a 64-byte Schnorr signature over secp256k1 in the
//! Bitcoin Cash variant (`r || s`, both 32-byte big-endian). For a 33-byte
//! compressed signer key `P` and payload `m`:
//!
//! ```text
//! e = SHA256(r || P || SHA256(m))  mod n
//! R = s·G − e·P
//! valid  ⇔  R ≠ ∞,  x(R) = r,  y(R) is a quadratic residue
//! ```

use k256::elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint, PrimeField};
use k256::{AffinePoint, FieldBytes, FieldElement, ProjectivePoint, PublicKey, Scalar, U256};
use sha2::{Digest, Sha256};

use super::message::PRICE_MESSAGE_SIZE;
use crate::error::{Result, SettlementError};

/// Compressed secp256k1 public key length
pub const SIGNER_KEY_SIZE: usize = 33;

/// Schnorr signature length (`r || s`)
pub const SIGNATURE_SIZE: usize = 64;

/// Stateless verifier for oracle price messages.
///
/// Holds no counters or caches, so a single value can be shared freely
/// across concurrent resolutions.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageVerifier;

impl MessageVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Check `signature` over `payload` against `signer_key`.
    ///
    /// Returns `Ok(false)` for a merely wrong signature. Errors only when an
    /// input is not a byte string of the expected shape.
    pub fn verify(&self, payload: &[u8], signature: &[u8], signer_key: &[u8]) -> Result<bool> {
        let key = parse_signer_key(signer_key)?;

        if payload.len() != PRICE_MESSAGE_SIZE {
            return Err(SettlementError::invalid_encoding(
                "payload",
                format!("{} bytes (expected {})", payload.len(), PRICE_MESSAGE_SIZE),
            ));
        }
        if signature.len() != SIGNATURE_SIZE {
            return Err(SettlementError::invalid_encoding(
                "signature",
                format!("{} bytes (expected {})", signature.len(), SIGNATURE_SIZE),
            ));
        }

        let (r, s) = signature.split_at(32);

        // s >= n is a bad signature, not bad encoding. An r >= p can never
        // match x(R) below.
        let s = match Option::<Scalar>::from(Scalar::from_repr(FieldBytes::clone_from_slice(s))) {
            Some(s) => s,
            None => return Ok(false),
        };

        let e = challenge(r, signer_key, payload);
        let nonce = (ProjectivePoint::GENERATOR * s - key.to_projective() * e).to_affine();
        Ok(nonce_matches(&nonce, r))
    }
}

/// Challenge scalar `e = SHA256(r || P || SHA256(m)) mod n`.
pub(crate) fn challenge(r: &[u8], signer_key: &[u8], payload: &[u8]) -> Scalar {
    let digest = Sha256::new()
        .chain_update(r)
        .chain_update(signer_key)
        .chain_update(Sha256::digest(payload))
        .finalize();
    <Scalar as Reduce<U256>>::reduce_bytes(&digest)
}

/// Whether the point's y coordinate is a quadratic residue mod p.
/// False for the point at infinity.
pub(crate) fn has_square_y(point: &AffinePoint) -> bool {
    let encoded = point.to_encoded_point(false);
    encoded
        .y()
        .and_then(|y| Option::<FieldElement>::from(FieldElement::from_bytes(y)))
        .map_or(false, |y| bool::from(y.sqrt().is_some()))
}

fn nonce_matches(nonce: &AffinePoint, r: &[u8]) -> bool {
    let encoded = nonce.to_encoded_point(false);
    match encoded.x() {
        Some(x) => x.as_slice() == r && has_square_y(nonce),
        None => false,
    }
}

/// Parse a compressed signer key, rejecting other lengths and off-curve points.
pub fn parse_signer_key(signer_key: &[u8]) -> Result<PublicKey> {
    if signer_key.len() != SIGNER_KEY_SIZE {
        return Err(SettlementError::invalid_encoding(
            "signer_key",
            format!("{} bytes (expected {})", signer_key.len(), SIGNER_KEY_SIZE),
        ));
    }
    PublicKey::from_sec1_bytes(signer_key)
        .map_err(|_| SettlementError::invalid_encoding("signer_key", "not a secp256k1 point"))
}
