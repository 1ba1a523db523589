//! Vote aggregation and the quadratic-voting transform
//!
//! Pure functions over scanned `VoteCast` events: per-option vote counts
//! and credit sums, and the integer square root applied to credit sums
//! before they become tally-circuit inputs.

use serde_json::json;
use tracing::warn;

use crate::domain::VoteCastEvent;

/// Per-option aggregation of a full election's vote events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteAggregate {
    /// Number of votes per option
    pub vote_counts: Vec<u64>,
    /// Sum of voice credits per option
    pub credit_sums: Vec<u64>,
}

impl VoteAggregate {
    /// Quadratic weights: integer square root of each credit sum.
    pub fn credit_sqrts(&self) -> Vec<u64> {
        self.credit_sums.iter().map(|&sum| isqrt(sum)).collect()
    }
}

/// Floor integer square root.
pub fn isqrt(n: u64) -> u64 {
    if n < 2 {
        return n;
    }

    // Newton's method; converges in a handful of iterations for u64
    let mut x = n;
    let mut y = (x + 1) / 2;
    while y < x {
        x = y;
        y = (x + n / x) / 2;
    }
    x
}

/// Aggregate vote events into per-option counts and credit sums.
///
/// Events referencing an option index outside `num_options` are skipped
/// with a warning; the chain contract should make them impossible.
pub fn aggregate_votes(events: &[VoteCastEvent], num_options: usize) -> VoteAggregate {
    let mut vote_counts = vec![0u64; num_options];
    let mut credit_sums = vec![0u64; num_options];

    for event in events {
        let option = event.option as usize;
        if option >= num_options {
            warn!(
                election_id = event.election_id,
                option = event.option,
                block = event.block_number,
                "vote for out-of-range option skipped"
            );
            continue;
        }
        vote_counts[option] += 1;
        credit_sums[option] = credit_sums[option].saturating_add(event.credits);
    }

    VoteAggregate {
        vote_counts,
        credit_sums,
    }
}

/// Build the tally circuit's input document from an aggregate.
pub fn build_tally_inputs(election_id: u64, aggregate: &VoteAggregate) -> serde_json::Value {
    json!({
        "election_id": election_id,
        "vote_counts": aggregate.vote_counts,
        "credit_sqrts": aggregate.credit_sqrts(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vote(option: u32, credits: u64) -> VoteCastEvent {
        VoteCastEvent {
            election_id: 0,
            option,
            credits,
            block_number: 100,
        }
    }

    #[test]
    fn isqrt_exact_squares() {
        for n in 0u64..=100 {
            assert_eq!(isqrt(n * n), n);
        }
    }

    #[test]
    fn isqrt_floors_between_squares() {
        assert_eq!(isqrt(2), 1);
        assert_eq!(isqrt(3), 1);
        assert_eq!(isqrt(8), 2);
        assert_eq!(isqrt(99), 9);
        assert_eq!(isqrt(u64::MAX), 4294967295);
    }

    #[test]
    fn aggregates_per_option() {
        let events = vec![vote(0, 4), vote(1, 9), vote(0, 16), vote(1, 1)];
        let agg = aggregate_votes(&events, 2);

        assert_eq!(agg.vote_counts, vec![2, 2]);
        assert_eq!(agg.credit_sums, vec![20, 10]);
        assert_eq!(agg.credit_sqrts(), vec![4, 3]);
    }

    #[test]
    fn out_of_range_options_are_skipped() {
        let events = vec![vote(0, 4), vote(7, 100)];
        let agg = aggregate_votes(&events, 2);

        assert_eq!(agg.vote_counts, vec![1, 0]);
        assert_eq!(agg.credit_sums, vec![4, 0]);
    }

    #[test]
    fn tally_inputs_shape() {
        let agg = aggregate_votes(&[vote(0, 25), vote(1, 49)], 2);
        let inputs = build_tally_inputs(3, &agg);

        assert_eq!(inputs["election_id"], 3);
        assert_eq!(inputs["vote_counts"][0], 1);
        assert_eq!(inputs["credit_sqrts"][0], 5);
        assert_eq!(inputs["credit_sqrts"][1], 7);
    }
}
