// ==============================================================================
// leader.rs - RACE LEADER SELECTION
// ------------------------------------------------------------------------------
// Reference axis = mean velocity direction of the whole field. Each racer gets
//
//   score = forward progress                      (position · forward)
//         + α * (velocity alignment * speed)      (cos(v, forward) * |v|)
//         - λ * lateral deviation                 (distance from the forward axis)
//         + pack bonus / penalty                  (ahead of / behind the centroid)
//
// Highest score leads. Ties keep arena order (lowest id first).
// No temporal smoothing here: the camera rig filters the result.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use serde::Deserialize;
use tracing::warn;

use crate::control::FollowSelection;
use crate::racer::RacerSample;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LeaderWeights {
    pub velocity_weight: f32, // α
    pub lateral_weight: f32,  // λ
    pub pack_bonus: f32,      // ahead of centroid
    pub pack_penalty: f32,    // behind (or level with) centroid, usually negative
}

impl Default for LeaderWeights {
    fn default() -> Self {
        Self {
            velocity_weight: 0.2,
            lateral_weight: 0.1,
            pack_bonus: 0.2,
            pack_penalty: -0.1,
        }
    }
}

/// Orthonormal frame built from the field's mean heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBasis {
    pub forward: Vector3<f32>,
    pub right: Vector3<f32>,
    pub normal: Vector3<f32>,
}

impl ProgressBasis {
    pub fn from_forward(forward: Vector3<f32>) -> Self {
        let forward = forward.normalize();
        let up = Vector3::y();

        let mut right = up.cross(&forward);
        if right.norm_squared() < 1e-8 {
            // heading straight up/down: any horizontal axis will do
            right = Vector3::x() - forward * forward.x;
        }
        let right = right.normalize();
        let normal = forward.cross(&right).normalize();

        Self { forward, right, normal }
    }

    #[inline]
    pub fn progress(&self, p: &Point3<f32>) -> f32 {
        p.coords.dot(&self.forward)
    }

    /// Distance from the line through the origin along `forward`.
    #[inline]
    pub fn lateral(&self, p: &Point3<f32>) -> f32 {
        let r = p.coords.dot(&self.right);
        let n = p.coords.dot(&self.normal);
        (r * r + n * n).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredRacer {
    pub id: usize,
    pub score: f32,
    pub forward_progress: f32,
    pub lateral_deviation: f32,
}

pub struct LeaderSelector {
    weights: LeaderWeights,
    last_forward: Vector3<f32>, // used while the field is at rest
}

impl LeaderSelector {
    pub fn new(weights: LeaderWeights) -> Self {
        Self {
            weights,
            last_forward: Vector3::z(),
        }
    }

    pub fn basis(&mut self, racers: &[RacerSample]) -> ProgressBasis {
        let sum: Vector3<f32> = racers.iter().map(|r| r.velocity).sum();
        if sum.norm_squared() > 1e-12 {
            self.last_forward = sum.normalize();
        }
        ProgressBasis::from_forward(self.last_forward)
    }

    /// All racers, best first.
    pub fn rank(&mut self, racers: &[RacerSample]) -> Vec<ScoredRacer> {
        if racers.is_empty() {
            return Vec::new();
        }

        let basis = self.basis(racers);
        let w = self.weights;

        let centroid_progress =
            racers.iter().map(|r| basis.progress(&r.position)).sum::<f32>() / racers.len() as f32;

        let mut scored: Vec<ScoredRacer> = racers
            .iter()
            .map(|r| {
                let forward_progress = basis.progress(&r.position);

                let speed = r.velocity.norm();
                let alignment = if speed > 0.0 {
                    r.velocity.dot(&basis.forward) / speed
                } else {
                    0.0
                };

                let lateral_deviation = basis.lateral(&r.position);
                let pack = if forward_progress > centroid_progress {
                    w.pack_bonus
                } else {
                    w.pack_penalty
                };

                let score = forward_progress + alignment * speed * w.velocity_weight
                    - lateral_deviation * w.lateral_weight
                    + pack;

                ScoredRacer {
                    id: r.id,
                    score,
                    forward_progress,
                    lateral_deviation,
                }
            })
            .collect();

        // stable: equal scores keep arena order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored
    }

    /// Leader id, or the pinned racer when auto-follow is off.
    pub fn select(&mut self, racers: &[RacerSample], selection: FollowSelection) -> Option<usize> {
        if !selection.auto_follow {
            if racers.iter().any(|r| r.id == selection.selected) {
                return Some(selection.selected);
            }
            warn!(
                "Pinned racer {} is not available this tick, falling back to scoring",
                selection.selected
            );
        }

        self.rank(racers).first().map(|s| s.id)
    }
}
