// ==============================================================================
// curve.rs - GUIDE POINTS -> CENTRIPETAL CATMULL-ROM SPACE CURVE
// ------------------------------------------------------------------------------
// The guide object's vertices are the control points. The curve passes through
// every control point and is C1 continuous between them.
//
// Parameterization:
// - point_at(t) / tangent_at(t): raw parameter, each segment spans an equal
//   slice of [0,1] regardless of its length.
// - point_at_arc(u) / tangent_at_arc(u): arc-length parameter, u * length() is
//   the distance travelled from the start. Mapped through a cumulative length
//   table built once at construction.
//
// Closed curves wrap t outside [0,1) back into range, open curves clamp.
// ==============================================================================

use nalgebra::{Point3, Vector3};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Shortest total length a curve may have before it is treated as degenerate.
const MIN_CURVE_LENGTH: f32 = 1e-5;

#[derive(Debug, Clone, PartialEq)]
pub enum CurveError {
    InvalidGeometry(String),
}

impl Display for CurveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidGeometry(reason) => write!(f, "invalid guide geometry: {reason}"),
        }
    }
}

impl Error for CurveError {}

/// One cubic piece c0 + c1*w + c2*w² + c3*w³, w in [0,1].
#[derive(Debug, Clone, Copy)]
struct CubicSegment {
    c0: Vector3<f32>,
    c1: Vector3<f32>,
    c2: Vector3<f32>,
    c3: Vector3<f32>,
}

impl CubicSegment {
    /// Non-uniform Catmull-Rom through x1..x2 with knot spacings dt0, dt1, dt2.
    fn catmull_rom(
        x0: Vector3<f32>,
        x1: Vector3<f32>,
        x2: Vector3<f32>,
        x3: Vector3<f32>,
        dt0: f32,
        dt1: f32,
        dt2: f32,
    ) -> Self {
        // tangents at x1 and x2, rescaled to the [0,1] segment
        let t1 = ((x1 - x0) / dt0 - (x2 - x0) / (dt0 + dt1) + (x2 - x1) / dt1) * dt1;
        let t2 = ((x2 - x1) / dt1 - (x3 - x1) / (dt1 + dt2) + (x3 - x2) / dt2) * dt1;

        Self {
            c0: x1,
            c1: t1,
            c2: x1 * -3.0 + x2 * 3.0 - t1 * 2.0 - t2,
            c3: x1 * 2.0 - x2 * 2.0 + t1 + t2,
        }
    }

    #[inline]
    fn position(&self, w: f32) -> Vector3<f32> {
        self.c0 + self.c1 * w + self.c2 * (w * w) + self.c3 * (w * w * w)
    }

    #[inline]
    fn derivative(&self, w: f32) -> Vector3<f32> {
        self.c1 + self.c2 * (2.0 * w) + self.c3 * (3.0 * w * w)
    }
}

/// Immutable parametric curve through the guide points.
#[derive(Debug, Clone)]
pub struct TrackCurve {
    points: Vec<Point3<f32>>,
    closed: bool,
    arc_lengths: Vec<f32>, // cumulative, arc_lengths[i] = length up to t = i / divisions
}

impl TrackCurve {
    /// Build a curve through `points`. `divisions` controls the resolution of the
    /// arc-length table (200 is plenty for a few dozen control points).
    pub fn new(
        points: Vec<Point3<f32>>,
        closed: bool,
        divisions: usize,
    ) -> Result<Self, CurveError> {
        if points.len() < 2 {
            return Err(CurveError::InvalidGeometry(format!(
                "need at least 2 control points, got {}",
                points.len()
            )));
        }

        if let Some(i) = points.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(CurveError::InvalidGeometry(format!("control point {i} is not finite")));
        }

        let mut curve = Self {
            points,
            closed,
            arc_lengths: Vec::new(),
        };
        curve.arc_lengths = curve.build_arc_lengths(divisions.max(1));

        if curve.length() < MIN_CURVE_LENGTH {
            return Err(CurveError::InvalidGeometry(
                "all control points coincide (zero-length curve)".to_string(),
            ));
        }

        Ok(curve)
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn control_points(&self) -> &[Point3<f32>] {
        &self.points
    }

    /// Approximate arc length (polyline over the arc-length table).
    pub fn length(&self) -> f32 {
        self.arc_lengths.last().copied().unwrap_or(0.0)
    }

    /// Position at raw parameter t.
    pub fn point_at(&self, t: f32) -> Point3<f32> {
        let (segment, w) = self.segment_at(t);
        Point3::from(segment.position(w))
    }

    /// Unit derivative at raw parameter t.
    pub fn tangent_at(&self, t: f32) -> Vector3<f32> {
        let (segment, w) = self.segment_at(t);
        let d = segment.derivative(w);
        if d.norm_squared() > 1e-12 {
            return d.normalize();
        }

        // Stationary point (coincident neighbours): fall back to a central difference.
        let h = 1e-4;
        let (a, b) = if self.closed {
            (t - h, t + h)
        } else {
            ((t - h).max(0.0), (t + h).min(1.0))
        };
        let diff = self.point_at(b) - self.point_at(a);
        if diff.norm_squared() > 1e-12 {
            diff.normalize()
        } else {
            Vector3::z()
        }
    }

    /// Position at arc-length parameter u.
    pub fn point_at_arc(&self, u: f32) -> Point3<f32> {
        self.point_at(self.arc_to_t(u))
    }

    /// Unit tangent at arc-length parameter u.
    pub fn tangent_at_arc(&self, u: f32) -> Vector3<f32> {
        self.tangent_at(self.arc_to_t(u))
    }

    /// k + 1 points spaced evenly by arc length, first at u = 0 and last at u = 1.
    pub fn sample_uniform(&self, k: usize) -> Vec<Point3<f32>> {
        let k = k.max(1);
        (0..=k).map(|i| self.point_at_arc(i as f32 / k as f32)).collect()
    }

    /// Map arc-length parameter u in [0,1] to the raw parameter t.
    pub fn arc_to_t(&self, u: f32) -> f32 {
        let divisions = self.arc_lengths.len() - 1;
        let target = u.clamp(0.0, 1.0) * self.length();

        // last table entry not beyond the target
        let i = self
            .arc_lengths
            .partition_point(|&l| l <= target)
            .saturating_sub(1);

        if i >= divisions {
            return 1.0;
        }

        let before = self.arc_lengths[i];
        let segment_length = self.arc_lengths[i + 1] - before;
        if segment_length <= 0.0 {
            return i as f32 / divisions as f32;
        }

        let fraction = (target - before) / segment_length;
        (i as f32 + fraction) / divisions as f32
    }

    // --------------------------------------------------------------
    // internals
    // --------------------------------------------------------------

    fn build_arc_lengths(&self, divisions: usize) -> Vec<f32> {
        let mut lengths = Vec::with_capacity(divisions + 1);
        let mut sum = 0.0;
        let mut last = self.point_at(0.0);
        lengths.push(0.0);

        for p in 1..=divisions {
            let current = self.point_at(p as f32 / divisions as f32);
            sum += (current - last).norm();
            lengths.push(sum);
            last = current;
        }

        lengths
    }

    /// Resolve t to (segment, local weight).
    fn segment_at(&self, t: f32) -> (CubicSegment, f32) {
        let l = self.points.len();
        let span = if self.closed { l } else { l - 1 };

        let p = span as f32 * t;
        let mut index = p.floor() as isize;
        let mut weight = p - index as f32;

        if self.closed {
            index = index.rem_euclid(l as isize);
        } else if index >= (l - 1) as isize {
            index = l as isize - 2;
            weight = 1.0;
        } else if index < 0 {
            index = 0;
            weight = 0.0;
        }

        let at = |i: isize| self.points[i.rem_euclid(l as isize) as usize].coords;

        let x1 = at(index);
        let x2 = at(index + 1);

        // open ends get a mirrored phantom point
        let x0 = if self.closed || index > 0 {
            at(index - 1)
        } else {
            x1 * 2.0 - x2
        };
        let x3 = if self.closed || (index + 2) < l as isize {
            at(index + 2)
        } else {
            x2 * 2.0 - x1
        };

        // centripetal knot spacing: |Δ|^0.5
        let mut dt0 = (x1 - x0).norm_squared().powf(0.25);
        let mut dt1 = (x2 - x1).norm_squared().powf(0.25);
        let mut dt2 = (x3 - x2).norm_squared().powf(0.25);

        if dt1 < 1e-4 {
            dt1 = 1.0;
        }
        if dt0 < 1e-4 {
            dt0 = dt1;
        }
        if dt2 < 1e-4 {
            dt2 = dt1;
        }

        (CubicSegment::catmull_rom(x0, x1, x2, x3, dt0, dt1, dt2), weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize, radius: f32) -> Vec<Point3<f32>> {
        (0..n)
            .map(|i| {
                let a = i as f32 / n as f32 * std::f32::consts::TAU;
                Point3::new(radius * a.cos(), 0.0, radius * a.sin())
            })
            .collect()
    }

    #[test]
    fn rejects_fewer_than_two_points() {
        let err = TrackCurve::new(vec![Point3::origin()], false, 200).unwrap_err();
        assert!(matches!(err, CurveError::InvalidGeometry(_)));

        let err = TrackCurve::new(Vec::new(), true, 200).unwrap_err();
        assert!(matches!(err, CurveError::InvalidGeometry(_)));
    }

    #[test]
    fn rejects_coincident_points() {
        let p = Point3::new(1.0, 2.0, 3.0);
        let err = TrackCurve::new(vec![p, p, p], false, 200).unwrap_err();
        assert!(matches!(err, CurveError::InvalidGeometry(_)));
    }

    #[test]
    fn passes_through_control_points() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.5, 2.0),
            Point3::new(3.0, 0.0, 2.5),
            Point3::new(4.0, -1.0, 5.0),
        ];
        let curve = TrackCurve::new(points.clone(), false, 200).unwrap();

        for (i, p) in points.iter().enumerate() {
            let t = i as f32 / (points.len() - 1) as f32;
            assert!((curve.point_at(t) - p).norm() < 1e-4, "control point {i}");
        }
    }

    #[test]
    fn closed_curve_meets_itself() {
        let curve = TrackCurve::new(ring(8, 5.0), true, 200).unwrap();
        let start = curve.point_at(0.0);
        let end = curve.point_at(1.0);
        assert!((start - end).norm() < 1e-4);

        // wraps past the end
        assert!((curve.point_at(1.25) - curve.point_at(0.25)).norm() < 1e-4);
    }

    #[test]
    fn curve_is_continuous() {
        let curve = TrackCurve::new(ring(7, 3.0), true, 200).unwrap();
        let eps = 1e-4;
        for i in 0..100 {
            let t = i as f32 / 100.0;
            let jump = (curve.point_at(t + eps) - curve.point_at(t)).norm();
            assert!(jump < 0.01, "jump {jump} at t = {t}");
        }
    }

    #[test]
    fn straight_line_length_and_tangent() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 5.0),
            Point3::new(0.0, 0.0, 10.0),
        ];
        let curve = TrackCurve::new(points, false, 200).unwrap();
        assert!((curve.length() - 10.0).abs() < 1e-3);

        let tangent = curve.tangent_at(0.3);
        assert!((tangent - Vector3::z()).norm() < 1e-4);
        assert!((tangent.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn uniform_samples_are_evenly_spaced() {
        // uneven control spacing so raw-parameter sampling would not be uniform
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.5),
            Point3::new(6.0, 0.0, 2.0),
            Point3::new(8.0, -1.0, 6.0),
            Point3::new(7.0, -2.0, 12.0),
        ];
        let curve = TrackCurve::new(points, false, 400).unwrap();
        let k = 50;
        let samples = curve.sample_uniform(k);
        assert_eq!(samples.len(), k + 1);

        let spacing: Vec<f32> = samples.windows(2).map(|w| (w[1] - w[0]).norm()).collect();
        let mean = spacing.iter().sum::<f32>() / spacing.len() as f32;
        for (i, s) in spacing.iter().enumerate() {
            assert!(((s - mean) / mean).abs() < 0.1, "gap {i}: {s} vs mean {mean}");
        }
    }

    #[test]
    fn arc_mapping_hits_endpoints() {
        let curve = TrackCurve::new(ring(6, 2.0), false, 200).unwrap();
        assert!(curve.arc_to_t(0.0).abs() < 1e-6);
        assert!((curve.arc_to_t(1.0) - 1.0).abs() < 1e-6);
        assert!(curve.arc_to_t(0.5) > 0.0 && curve.arc_to_t(0.5) < 1.0);
    }
}
