//! Settlement window resolution.
//!
//! Finds the two time-adjacent verified observations that straddle a
//! contract's maturity instant:
//!
//! ```text
//!   newest ─────────────────────────────────────────▶ oldest
//!   [340]      [280]      [220]   │   [160]      [100]
//!                        settlement  previous
//!                                 ▲
//!                          maturity = 200
//! ```
//!
//! `previous.timestamp < maturity <= settlement.timestamp`
//!
//! Input order is untrusted. Observations are sorted once by timestamp
//! descending, ties by message sequence descending, and the boundary pair is
//! found with a single pass over adjacent entries.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::error::{Result, WindowFailure};
use crate::oracle::PriceObservation;

/// How strictly the bracketing pair must be consecutive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AdjacencyPolicy {
    /// No retrieved observation may lie strictly between the pair in time.
    #[default]
    TimeOnly,
    /// Additionally, the oracle's price sequence must have no holes between
    /// the pair (every intervening price message was retrieved).
    ConsecutiveSequence,
}

impl AdjacencyPolicy {
    pub fn from_flag(require_consecutive_sequence: bool) -> Self {
        if require_consecutive_sequence {
            Self::ConsecutiveSequence
        } else {
            Self::TimeOnly
        }
    }
}

/// The resolved pair of observations around maturity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BracketingPair {
    pub previous: PriceObservation,
    pub settlement: PriceObservation,
}

/// Newer first; on equal timestamps the higher message sequence is newer.
fn recency_order(a: &PriceObservation, b: &PriceObservation) -> Ordering {
    b.timestamp
        .cmp(&a.timestamp)
        .then_with(|| b.message_sequence.cmp(&a.message_sequence))
}

/// Stable sort, most recent first.
pub fn sort_most_recent_first(observations: &[PriceObservation]) -> Vec<&PriceObservation> {
    let mut sorted: Vec<&PriceObservation> = observations.iter().collect();
    sorted.sort_by(|a, b| recency_order(a, b));
    sorted
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SettlementWindowResolver {
    policy: AdjacencyPolicy,
}

impl SettlementWindowResolver {
    pub fn new(policy: AdjacencyPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> AdjacencyPolicy {
        self.policy
    }

    pub fn resolve(&self, observations: &[PriceObservation], maturity: i64) -> Result<BracketingPair> {
        let mut sorted = sort_most_recent_first(observations);
        // Relays may repeat a message; a copy would count as an extra sequence step.
        sorted.dedup_by(|a, b| {
            a.timestamp == b.timestamp && a.message_sequence == b.message_sequence
        });

        let (newest, oldest) = match (sorted.first(), sorted.last()) {
            (Some(newest), Some(oldest)) => (newest.timestamp, oldest.timestamp),
            _ => return Err(WindowFailure::Empty.into()),
        };
        if newest < maturity {
            return Err(WindowFailure::TooEarly { maturity, newest }.into());
        }
        if oldest >= maturity {
            return Err(WindowFailure::TooLate { maturity, oldest }.into());
        }

        // Both sides are non-empty, so exactly one adjacent pair crosses.
        let boundary = sorted
            .windows(2)
            .position(|pair| pair[1].timestamp < maturity && maturity <= pair[0].timestamp)
            .ok_or(WindowFailure::Empty)?;

        // Among equal settlement timestamps the highest sequence sits first.
        let settlement_ts = sorted[boundary].timestamp;
        let mut first = boundary;
        while first > 0 && sorted[first - 1].timestamp == settlement_ts {
            first -= 1;
        }
        let settlement = sorted[first];
        let previous = sorted[boundary + 1];

        debug_assert!(
            !sorted
                .iter()
                .any(|o| o.timestamp > previous.timestamp && o.timestamp < settlement.timestamp),
            "sorted order leaves nothing strictly inside the bracketing pair"
        );

        if self.policy == AdjacencyPolicy::ConsecutiveSequence {
            let steps = (boundary + 1 - first) as i64;
            if settlement.price_sequence - previous.price_sequence != steps {
                return Err(WindowFailure::Gap {
                    previous_sequence: previous.price_sequence,
                    settlement_sequence: settlement.price_sequence,
                }
                .into());
            }
        }

        debug!(
            maturity,
            previous_ts = previous.timestamp,
            settlement_ts = settlement.timestamp,
            previous_price = previous.price_value,
            settlement_price = settlement.price_value,
            "Settlement window resolved"
        );

        Ok(BracketingPair {
            previous: previous.clone(),
            settlement: settlement.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SettlementError;
    use crate::oracle::fixtures::TestOracle;

    /// Observations at `timestamps` with price sequences counting up in time.
    fn series(oracle: &TestOracle, timestamps: &[u32]) -> Vec<PriceObservation> {
        let mut sorted = timestamps.to_vec();
        sorted.sort_unstable();
        timestamps
            .iter()
            .map(|ts| {
                let seq = sorted.iter().position(|t| t == ts).unwrap() as u32 + 1;
                oracle.observation(*ts, seq)
            })
            .collect()
    }

    fn window_failure(result: Result<BracketingPair>) -> WindowFailure {
        match result.unwrap_err() {
            SettlementError::SettlementWindowNotFound(reason) => reason,
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_maturity_between_observations() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[340, 280, 220, 160, 100]);

        let pair = SettlementWindowResolver::default().resolve(&obs, 200).unwrap();
        assert_eq!(pair.previous.timestamp, 160);
        assert_eq!(pair.settlement.timestamp, 220);
    }

    #[test]
    fn test_maturity_on_newest_observation() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[340, 280, 220, 160, 100]);

        let pair = SettlementWindowResolver::default().resolve(&obs, 340).unwrap();
        assert_eq!(pair.previous.timestamp, 280);
        assert_eq!(pair.settlement.timestamp, 340);
    }

    #[test]
    fn test_maturity_on_interior_observation() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[340, 280, 220, 160, 100]);

        let pair = SettlementWindowResolver::default().resolve(&obs, 220).unwrap();
        assert_eq!(pair.previous.timestamp, 160);
        assert_eq!(pair.settlement.timestamp, 220);
    }

    #[test]
    fn test_unordered_input() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[160, 340, 100, 220, 280]);

        let pair = SettlementWindowResolver::default().resolve(&obs, 200).unwrap();
        assert_eq!(pair.previous.timestamp, 160);
        assert_eq!(pair.settlement.timestamp, 220);
    }

    #[test]
    fn test_empty_input() {
        let result = SettlementWindowResolver::default().resolve(&[], 200);
        assert_eq!(window_failure(result), WindowFailure::Empty);
    }

    #[test]
    fn test_all_before_maturity_is_too_early() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[190, 130, 70]);

        let result = SettlementWindowResolver::default().resolve(&obs, 200);
        assert_eq!(
            window_failure(result),
            WindowFailure::TooEarly {
                maturity: 200,
                newest: 190
            }
        );
    }

    #[test]
    fn test_all_at_or_after_maturity_is_too_late() {
        let oracle = TestOracle::new(1);
        let obs = series(&oracle, &[320, 260, 200]);

        let result = SettlementWindowResolver::default().resolve(&obs, 200);
        assert_eq!(
            window_failure(result),
            WindowFailure::TooLate {
                maturity: 200,
                oldest: 200
            }
        );
    }

    #[test]
    fn test_single_observation_fails() {
        let oracle = TestOracle::new(1);
        let obs = vec![oracle.observation(250, 1)];
        assert!(SettlementWindowResolver::default().resolve(&obs, 200).is_err());
    }

    #[test]
    fn test_equal_timestamps_prefer_higher_sequence() {
        let oracle = TestOracle::new(1);
        let obs = vec![
            oracle.observation(280, 6),
            oracle.observation(220, 4),
            oracle.observation(220, 5),
            oracle.observation(160, 2),
            oracle.observation(160, 3),
            oracle.observation(100, 1),
        ];

        let pair = SettlementWindowResolver::default().resolve(&obs, 200).unwrap();
        assert_eq!(pair.settlement.timestamp, 220);
        assert_eq!(pair.settlement.message_sequence, 5);
        assert_eq!(pair.previous.timestamp, 160);
        assert_eq!(pair.previous.message_sequence, 3);
    }

    #[test]
    fn test_sort_is_stable_and_descending() {
        let oracle = TestOracle::new(1);
        let obs = vec![
            oracle.observation(100, 1),
            oracle.observation(300, 3),
            oracle.observation(300, 4),
            oracle.observation(200, 2),
        ];
        let sorted: Vec<(i64, i64)> = sort_most_recent_first(&obs)
            .iter()
            .map(|o| (o.timestamp, o.message_sequence))
            .collect();
        assert_eq!(sorted, vec![(300, 4), (300, 3), (200, 2), (100, 1)]);
    }

    #[test]
    fn test_sequence_gap_rejected_under_strict_policy() {
        let oracle = TestOracle::new(1);
        // Price sequence 3 (timestamp 190) was never retrieved.
        let obs = vec![
            oracle.observation(280, 5),
            oracle.observation(220, 4),
            oracle.observation(160, 2),
            oracle.observation(100, 1),
        ];

        let lenient = SettlementWindowResolver::default().resolve(&obs, 200).unwrap();
        assert_eq!(lenient.previous.timestamp, 160);

        let strict = SettlementWindowResolver::new(AdjacencyPolicy::ConsecutiveSequence);
        assert_eq!(
            window_failure(strict.resolve(&obs, 200)),
            WindowFailure::Gap {
                previous_sequence: 2,
                settlement_sequence: 4
            }
        );
    }

    #[test]
    fn test_strict_policy_accepts_consecutive_ties() {
        let oracle = TestOracle::new(1);
        let obs = vec![
            oracle.observation(220, 3),
            oracle.observation(220, 4),
            oracle.observation(160, 2),
        ];
        let strict = SettlementWindowResolver::new(AdjacencyPolicy::ConsecutiveSequence);
        let pair = strict.resolve(&obs, 200).unwrap();
        assert_eq!(pair.settlement.price_sequence, 4);
        assert_eq!(pair.previous.price_sequence, 2);
    }

    #[test]
    fn test_strict_policy_ignores_repeated_messages() {
        let oracle = TestOracle::new(1);
        let obs = vec![
            oracle.observation(220, 4),
            oracle.observation(220, 4),
            oracle.observation(160, 3),
            oracle.observation(160, 3),
        ];
        let strict = SettlementWindowResolver::new(AdjacencyPolicy::ConsecutiveSequence);
        let pair = strict.resolve(&obs, 200).unwrap();
        assert_eq!(pair.settlement.price_sequence, 4);
        assert_eq!(pair.previous.price_sequence, 3);
    }

    #[test]
    fn test_no_observation_strictly_between_pair() {
        let oracle = TestOracle::new(1);
        let timestamps = [400u32, 351, 340, 280, 221, 220, 160, 159, 100];
        let obs = series(&oracle, &timestamps);
        let resolver = SettlementWindowResolver::default();

        for maturity in 101..=400i64 {
            let pair = resolver.resolve(&obs, maturity).unwrap();
            assert!(pair.previous.timestamp < maturity);
            assert!(maturity <= pair.settlement.timestamp);
            assert!(!obs.iter().any(|o| {
                o.timestamp > pair.previous.timestamp && o.timestamp < pair.settlement.timestamp
            }));
        }
    }
}
