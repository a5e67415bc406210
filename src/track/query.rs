// ==============================================================================
// query.rs - NEAREST POINT + LOOKAHEAD ON THE SAMPLED TRACK
// ------------------------------------------------------------------------------
// The curve is resampled once into k+1 arc-length-uniform points. A query is a
// brute-force scan over those samples: O(k), robust on self-approaching tracks
// where projection onto the analytic curve would snap to the wrong lap.
//
// closest(pos, heading):
// - closest sample by squared distance (ties -> lowest index)
// - tangent at that sample, direction sign from dot(tangent, heading)
// - lookahead sample = closest + sign * ceil(lookahead / length * k)
//     closed: wraps modulo k+1
//     open:   clamps to [0, k]
// ==============================================================================

use nalgebra::{Point3, Vector3};

use super::curve::TrackCurve;

/// Result of a single query. Recomputed every tick, never stored long-term.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackQuery {
    pub closest_point: Point3<f32>,
    pub lookahead_point: Point3<f32>,
    pub tangent: Vector3<f32>, // unit, authored curve direction
    pub t0: f32,               // arc parameter of closest_point
    pub t1: f32,               // arc parameter of lookahead_point
    pub closest_index: usize,
    pub lookahead_index: usize,
    pub direction: f32, // +1 travelling with the curve, -1 against it
}

impl TrackQuery {
    /// Identity answer used when no curve is loaded.
    pub fn fallback(position: Point3<f32>) -> Self {
        Self {
            closest_point: position,
            lookahead_point: position,
            tangent: Vector3::z(),
            t0: 0.0,
            t1: 0.0,
            closest_index: 0,
            lookahead_index: 0,
            direction: 1.0,
        }
    }
}

/// A curve plus its precomputed uniform sample set.
#[derive(Debug, Clone)]
pub struct TrackSampler {
    curve: TrackCurve,
    samples: Vec<Point3<f32>>,
    divisions: usize,
    lookahead: f32, // world units
}

impl TrackSampler {
    pub fn new(curve: TrackCurve, divisions: usize, lookahead: f32) -> Self {
        let divisions = divisions.max(1);
        let samples = curve.sample_uniform(divisions);
        Self {
            curve,
            samples,
            divisions,
            lookahead: lookahead.max(0.0),
        }
    }

    pub fn curve(&self) -> &TrackCurve {
        &self.curve
    }

    pub fn samples(&self) -> &[Point3<f32>] {
        &self.samples
    }

    pub fn divisions(&self) -> usize {
        self.divisions
    }

    /// How many samples the lookahead distance spans, at most one full pass.
    pub fn lookahead_step(&self) -> usize {
        let length = self.curve.length();
        if length <= 0.0 {
            return 0;
        }
        let divisions = self.divisions as f32;
        (self.lookahead / length * divisions).ceil().min(divisions) as usize
    }

    pub fn closest(&self, position: &Point3<f32>, heading: Option<&Vector3<f32>>) -> TrackQuery {
        let mut closest_index = 0;
        let mut min_dist2 = f32::INFINITY;
        for (i, sample) in self.samples.iter().enumerate() {
            let d2 = (sample - position).norm_squared();
            if d2 < min_dist2 {
                min_dist2 = d2;
                closest_index = i;
            }
        }

        let t0 = closest_index as f32 / self.divisions as f32;
        let tangent = self.curve.tangent_at_arc(t0);

        let direction = match heading {
            Some(h) if tangent.dot(h) < 0.0 => -1.0,
            _ => 1.0,
        };

        let step = self.lookahead_step() as isize;
        let raw = closest_index as isize + direction as isize * step;
        let lookahead_index = if self.curve.is_closed() {
            raw.rem_euclid(self.samples.len() as isize) as usize
        } else {
            raw.clamp(0, self.divisions as isize) as usize
        };

        TrackQuery {
            closest_point: self.samples[closest_index],
            lookahead_point: self.samples[lookahead_index],
            tangent,
            t0,
            t1: lookahead_index as f32 / self.divisions as f32,
            closest_index,
            lookahead_index,
            direction,
        }
    }
}

/// Query that degrades to the identity answer when there is no curve.
pub fn query_track(
    sampler: Option<&TrackSampler>,
    position: &Point3<f32>,
    heading: Option<&Vector3<f32>>,
) -> TrackQuery {
    match sampler {
        Some(s) => s.closest(position, heading),
        None => TrackQuery::fallback(*position),
    }
}
