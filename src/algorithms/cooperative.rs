//! Decentralized peer-gradient position refinement
//!
//! Each device nudges its own estimate so that the distance between its
//! estimate and every neighbor's estimate moves toward the distance actually
//! measured to that neighbor. No anchors are required; anchors simply act as
//! peers whose estimate is exact.

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::{
    DeviceContext, NeighborSnapshot, Position, COOPERATIVE_MIN_SEPARATION, COOPERATIVE_STEP_SIZE,
};

/// What a device knows about one neighbor this round
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerObservation {
    /// Neighbor's estimate as it broadcast it
    pub estimate: Position,
    /// Neighbor ground truth, when the environment provides it
    pub true_position: Option<Position>,
    pub is_anchor: bool,
    /// Directly sensed distance to the neighbor
    pub sensed_distance: Option<f64>,
}

impl PeerObservation {
    /// Position the neighbor vouches for: truth for anchors, estimate otherwise
    pub fn reported_position(&self) -> Position {
        match (self.is_anchor, self.true_position) {
            (true, Some(truth)) => truth,
            _ => self.estimate,
        }
    }

    /// Sensed distance, else ground-truth distance when both truths are known
    pub fn real_distance(&self, own_truth: Option<Position>) -> Option<f64> {
        match (self.sensed_distance, own_truth, self.true_position) {
            (Some(d), _, _) if d.is_finite() && d >= 0.0 => Some(d),
            (_, Some(own), Some(other)) => Some(own.distance_to(&other)),
            _ => None,
        }
    }
}

/// Gradient refinement parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    /// Fixed step α applied to each distance error
    pub step_size: f64,
    /// Peers closer than this to the own estimate are skipped
    pub min_separation: f64,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            step_size: COOPERATIVE_STEP_SIZE,
            min_separation: COOPERATIVE_MIN_SEPARATION,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CooperativeRefinementEngine {
    config: RefinementConfig,
}

impl CooperativeRefinementEngine {
    pub fn new(config: RefinementConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RefinementConfig {
        &self.config
    }

    /// One refinement pass over this round's peers, starting from `previous`.
    ///
    /// Peers are visited in id order; each correction sees the estimate
    /// already moved by the earlier ones.
    pub fn cooperative_refine(
        &self,
        ctx: &DeviceContext,
        previous: Position,
        peers: &NeighborSnapshot<PeerObservation>,
    ) -> Position {
        if let Some(truth) = ctx.anchor_position() {
            return truth;
        }

        let mut estimate = previous.to_vector();
        let mut used = 0usize;
        for (peer_id, entry) in peers.iter() {
            let peer = &entry.value;
            let Some(real_distance) = peer.real_distance(ctx.true_position) else {
                trace!("device {}: no distance to peer {}", ctx.id, peer_id);
                continue;
            };

            let diff = estimate - peer.reported_position().to_vector();
            let supposed_distance = diff.norm();
            if supposed_distance <= self.config.min_separation {
                continue;
            }
            let error = real_distance - supposed_distance;
            estimate += diff * (self.config.step_size * error / supposed_distance);
            used += 1;
        }

        trace!("device {}: refined against {} of {} peers", ctx.id, used, peers.len());
        Position::from_vector(&estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeviceId;
    use crate::validation::AccuracyTracker;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn peer(estimate: Position, sensed: f64) -> PeerObservation {
        PeerObservation {
            estimate,
            true_position: None,
            is_anchor: false,
            sensed_distance: Some(sensed),
        }
    }

    #[test]
    fn test_anchor_never_moves() {
        let engine = CooperativeRefinementEngine::default();
        let truth = Position::new(3.0, 3.0);
        let ctx = DeviceContext::anchor(1, truth);
        let peers = NeighborSnapshot::new().with(2, peer(Position::new(0.0, 0.0), 100.0), 0.0);
        assert_eq!(engine.cooperative_refine(&ctx, Position::new(9.0, 9.0), &peers), truth);
    }

    #[test]
    fn test_moves_away_when_too_close() {
        let engine = CooperativeRefinementEngine::default();
        let ctx = DeviceContext::device(1);
        let peers = NeighborSnapshot::new().with(2, peer(Position::new(0.0, 0.0), 10.0), 0.0);
        let refined = engine.cooperative_refine(&ctx, Position::new(4.0, 0.0), &peers);
        // 4 + 0.1 * (10 - 4)
        assert_abs_diff_eq!(refined.x, 4.6, epsilon = 1e-12);
        assert_abs_diff_eq!(refined.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_moves_closer_when_too_far() {
        let engine = CooperativeRefinementEngine::default();
        let ctx = DeviceContext::device(1);
        let peers = NeighborSnapshot::new().with(2, peer(Position::new(0.0, 0.0), 5.0), 0.0);
        let refined = engine.cooperative_refine(&ctx, Position::new(0.0, 15.0), &peers);
        assert_abs_diff_eq!(refined.y, 14.0, epsilon = 1e-12);
    }

    #[test]
    fn test_coincident_and_unmeasured_peers_skipped() {
        let engine = CooperativeRefinementEngine::default();
        let ctx = DeviceContext::device(1);
        let start = Position::new(2.0, 2.0);
        let unmeasured = PeerObservation {
            sensed_distance: None,
            ..peer(Position::new(0.0, 0.0), 0.0)
        };
        let peers = NeighborSnapshot::new()
            .with(2, peer(start, 5.0), 0.0)
            .with(3, unmeasured, 0.0);
        assert_eq!(engine.cooperative_refine(&ctx, start, &peers), start);
    }

    #[test]
    fn test_ground_truth_distance_and_anchor_truth() {
        let engine = CooperativeRefinementEngine::default();
        let ctx = DeviceContext::device_at(1, Position::new(0.0, 10.0));
        let anchor = PeerObservation {
            // Broadcast estimate is ignored in favor of the anchor's truth
            estimate: Position::new(50.0, 50.0),
            true_position: Some(Position::new(0.0, 0.0)),
            is_anchor: true,
            sensed_distance: None,
        };
        let peers = NeighborSnapshot::new().with(2, anchor, 0.0);
        let refined = engine.cooperative_refine(&ctx, Position::new(0.0, 20.0), &peers);
        assert_abs_diff_eq!(refined.y, 19.0, epsilon = 1e-12);
    }

    /// Non-anchor estimates of a static, noise-free topology, one entry per round
    fn run_topology(seed: u64, rounds: usize) -> Vec<Vec<(DeviceId, Position, Position)>> {
        const SIDE: f64 = 100.0;
        const RADIUS: f64 = 40.0;
        let mut rng = StdRng::seed_from_u64(seed);
        let truths: Vec<Position> = (0..30)
            .map(|_| Position::new(rng.gen_range(0.0..SIDE), rng.gen_range(0.0..SIDE)))
            .collect();
        let anchors = 8usize;
        let contexts: Vec<DeviceContext> = truths
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                if i < anchors {
                    DeviceContext::anchor(i as DeviceId, p)
                } else {
                    DeviceContext::device(i as DeviceId)
                }
            })
            .collect();
        // Gradient refinement is local; non-anchors start within 8 m of the truth
        let mut estimates: Vec<Position> = truths
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if i < anchors {
                    *p
                } else {
                    Position::new(p.x + rng.gen_range(-8.0..8.0), p.y + rng.gen_range(-8.0..8.0))
                }
            })
            .collect();

        let engine = CooperativeRefinementEngine::default();
        let snapshot = |estimates: &[Position]| {
            (anchors..truths.len())
                .map(|i| (i as DeviceId, truths[i], estimates[i]))
                .collect::<Vec<_>>()
        };

        let mut history = vec![snapshot(&estimates)];
        for _ in 0..rounds {
            let mut next = estimates.clone();
            for (i, ctx) in contexts.iter().enumerate() {
                let peers: NeighborSnapshot<PeerObservation> = truths
                    .iter()
                    .enumerate()
                    .filter(|&(j, q)| j != i && q.distance_to(&truths[i]) <= RADIUS)
                    .map(|(j, q)| {
                        let observation = PeerObservation {
                            estimate: estimates[j],
                            true_position: None,
                            is_anchor: j < anchors,
                            sensed_distance: Some(q.distance_to(&truths[i])),
                        };
                        (j as DeviceId, observation)
                    })
                    .collect();
                next[i] = engine.cooperative_refine(ctx, estimates[i], &peers);
            }
            estimates = next;
            history.push(snapshot(&estimates));
        }
        history
    }

    #[test]
    fn test_mean_error_non_increasing_on_average() {
        let trials = 20;
        let rounds = 15;
        let runs: Vec<_> = (0..trials).map(|seed| run_topology(seed, rounds)).collect();

        // Every trial has the same number of non-anchors, so the pooled
        // per-round mean is the mean over trials
        let mut tracker = AccuracyTracker::default();
        for round in 0..=rounds {
            for run in &runs {
                for &(id, truth, estimate) in &run[round] {
                    tracker.record(id, truth, estimate);
                }
            }
            tracker.finish_round();
        }

        let means: Vec<f64> = tracker.rounds().map(|s| s.mean_error).collect();
        assert_eq!(means.len(), rounds + 1);
        assert!(tracker.is_mean_error_non_increasing(1e-6), "error increased: {:?}", means);
        assert!(means[rounds] < 0.5 * means[0]);
    }
}
