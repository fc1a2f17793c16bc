//! Deterministic signing oracle for tests.

use k256::elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint, PrimeField};
use k256::{FieldBytes, ProjectivePoint, Scalar, U256};
use sha2::{Digest, Sha256};

use super::message::PriceMessage;
use super::observation::{PriceObservation, RawObservation};
use super::verify::{challenge, has_square_y, MessageVerifier};

// Signed price message captured from the production relay.
pub const RELAY_SAMPLE_MESSAGE: &str = "5003d6623f100200ee0f0200c32e0000";
pub const RELAY_SAMPLE_SIGNATURE: &str = "405e46f66e9d77582849e3c68bfdd05af42324b32dda1f537cc9b205c4bad73a6d7a45cf720e79efd1e899e92face2c9867cc08984a7e1705eeddf7fe0fd98b1";
pub const RELAY_SAMPLE_KEY: &str = "02d3c1de9d4bc77d6c3608cbe44d10138c7488e592dc2b1e10a6cf0e92c2ecb047";

pub struct TestOracle {
    secret: Scalar,
    public_key: Vec<u8>,
}

impl TestOracle {
    /// Key derived from a one-byte seed so fixtures are reproducible.
    pub fn new(seed: u8) -> Self {
        let mut bytes = [0x11u8; 32];
        bytes[31] = seed.max(1);
        let secret = Scalar::from_repr(FieldBytes::from(bytes)).unwrap();
        let public_key = (ProjectivePoint::GENERATOR * secret)
            .to_affine()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec();
        Self { secret, public_key }
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.public_key.clone()
    }

    /// Schnorr-sign `msg`; the nonce is derived from the secret and payload.
    pub fn sign(&self, msg: PriceMessage) -> RawObservation {
        let payload = msg.encode().to_vec();

        let seed = Sha256::new()
            .chain_update(self.secret.to_bytes())
            .chain_update(&payload)
            .finalize();
        let mut k = <Scalar as Reduce<U256>>::reduce_bytes(&seed);
        let mut nonce = (ProjectivePoint::GENERATOR * k).to_affine();
        if !has_square_y(&nonce) {
            k = -k;
            nonce = (ProjectivePoint::GENERATOR * k).to_affine();
        }

        let r = nonce.to_encoded_point(false).x().unwrap().to_vec();
        let e = challenge(&r, &self.public_key, &payload);
        let s = k + e * self.secret;

        let mut signature = r;
        signature.extend_from_slice(&s.to_bytes());
        RawObservation::new(payload, signature, self.public_key())
    }

    /// Price message at `timestamp` whose sequences are derived from `seq`.
    pub fn price_at(&self, timestamp: u32, seq: u32) -> RawObservation {
        self.sign(PriceMessage::new(timestamp, seq, seq as i32, 20_000 + seq as i32))
    }

    pub fn observation(&self, timestamp: u32, seq: u32) -> PriceObservation {
        PriceObservation::verify(&MessageVerifier::new(), &self.price_at(timestamp, seq))
            .expect("fixture verifies")
    }
}
