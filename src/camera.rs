// ==============================================================================
// camera.rs - RACE CAMERA RIG (SPLINE FOLLOW / PARKED ABOVE STALL)
// ------------------------------------------------------------------------------
// SplineFollow (default):
//   leader -> nearest track sample + lookahead
//   position -> closest + up * vertical_offset          (exponential blend)
//   look-at  -> lookahead + heading * heading_offset + up * look height
//
// ParkedAboveStall (a racer came to rest below stall_altitude):
//   rise:  sine ease-out from the entry pose to hover above the anchor,
//          progress += rise_increment per tick, clamped to 1
//   hold:  stay over the anchor until hold_secs of wall time since entry
//   exit:  re-scan; still stalled -> re-arm over that racer,
//          clear -> SplineFollow, blending on from the current pose
//
// The mode is replaced only inside `update`, once per tick.
// ==============================================================================

use std::f32::consts::FRAC_PI_2;
use std::time::Duration;

use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::racer::RacerSample;
use crate::track::TrackSampler;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub blend: f32,                // exponential filter factor per tick
    pub vertical_offset: f32,      // camera height over the race line
    pub heading_offset: f32,       // look-at pushed this far along the heading
    pub look_vertical_offset: f32, // look-at height relative to the camera height
    pub stall_altitude: f32,       // below this a resting racer parks the camera
    pub stall_speed_sq: f32,
    pub recheck_altitude: f32,     // looser thresholds once the hold is over
    pub recheck_speed_sq: f32,
    pub hover_height: f32,         // parked camera height over the anchor
    pub rise_increment: f32,       // animation progress per tick
    pub hold_secs: f32,            // wall-clock, measured from entry
    pub fallback_position: [f32; 3],
    pub fallback_target: [f32; 3],
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            blend: 0.02,
            vertical_offset: 0.5,
            heading_offset: 1.0,
            look_vertical_offset: -0.5,
            stall_altitude: -15.0,
            stall_speed_sq: 1e-6,
            recheck_altitude: -3.0,
            recheck_speed_sq: 1e-4,
            hover_height: 5.0,
            rise_increment: 0.006,
            hold_secs: 60.0,
            fallback_position: [1.0, 7.0, -25.0],
            fallback_target: [7.0, 7.0, -25.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParkedStall {
    pub anchor: Point3<f32>, // where the stalled racer came to rest
    pub start: Point3<f32>,  // camera position on entry
    pub hover: Point3<f32>,  // anchor + up * hover_height
    pub progress: f32,       // 0..=1
    pub entered_at: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraMode {
    SplineFollow,
    ParkedAboveStall(ParkedStall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraModeKind {
    SplineFollow,
    ParkedAboveStall,
}

impl CameraMode {
    pub fn kind(&self) -> CameraModeKind {
        match self {
            CameraMode::SplineFollow => CameraModeKind::SplineFollow,
            CameraMode::ParkedAboveStall(_) => CameraModeKind::ParkedAboveStall,
        }
    }
}

/// First racer resting below `altitude`.
pub fn find_stall(racers: &[RacerSample], altitude: f32, speed_sq: f32) -> Option<Point3<f32>> {
    racers
        .iter()
        .find(|r| r.position.y < altitude && r.speed_squared() < speed_sq)
        .map(|r| r.position)
}

// Farther than this in one tick is a respawn, not motion.
const MAX_LEADER_STEP: f32 = 2.0;

#[inline]
fn ease_out_sine(progress: f32) -> f32 {
    (progress * FRAC_PI_2).sin()
}

#[inline]
fn lerp(a: &Point3<f32>, b: &Point3<f32>, t: f32) -> Point3<f32> {
    Point3::from(a.coords.lerp(&b.coords, t))
}

pub struct CameraRig {
    settings: CameraSettings,
    hold: Duration,
    mode: CameraMode,
    pose: CameraPose,
    heading: Vector3<f32>,
    last_leader: Option<(usize, Point3<f32>)>,
}

impl CameraRig {
    pub fn new(settings: CameraSettings) -> Self {
        let pose = CameraPose {
            position: Point3::from(settings.fallback_position),
            target: Point3::from(settings.fallback_target),
        };
        // anything beyond Duration's range just never expires
        let hold = Duration::try_from_secs_f32(settings.hold_secs.max(0.0))
            .unwrap_or(Duration::MAX);
        Self {
            settings,
            hold,
            mode: CameraMode::SplineFollow,
            pose,
            heading: Vector3::z(),
            last_leader: None,
        }
    }

    pub fn pose(&self) -> CameraPose {
        self.pose
    }

    pub fn mode(&self) -> &CameraMode {
        &self.mode
    }

    pub fn heading(&self) -> Vector3<f32> {
        self.heading
    }

    /// Advance one tick. Without a track the rig holds its pose.
    pub fn update(
        &mut self,
        track: Option<&TrackSampler>,
        racers: &[RacerSample],
        leader: Option<usize>,
        now: Duration,
    ) {
        let Some(track) = track else { return };
        if racers.is_empty() {
            return;
        }

        self.mode = match self.mode {
            CameraMode::SplineFollow => {
                let s = &self.settings;
                match find_stall(racers, s.stall_altitude, s.stall_speed_sq) {
                    Some(anchor) => {
                        debug!("Racer stalled at {:?}, parking camera", anchor);
                        let parked = self.park(anchor, now);
                        self.advance_parked(parked, track, racers, leader, now)
                    }
                    None => {
                        self.follow(track, racers, leader);
                        CameraMode::SplineFollow
                    }
                }
            }
            CameraMode::ParkedAboveStall(parked) => {
                self.advance_parked(parked, track, racers, leader, now)
            }
        };
    }

    /// Forgets the leader track so the heading restarts from velocity on resume.
    fn park(&mut self, anchor: Point3<f32>, now: Duration) -> ParkedStall {
        self.last_leader = None;
        ParkedStall {
            anchor,
            start: self.pose.position,
            hover: anchor + Vector3::y() * self.settings.hover_height,
            progress: 0.0,
            entered_at: now,
        }
    }

    fn advance_parked(
        &mut self,
        mut parked: ParkedStall,
        track: &TrackSampler,
        racers: &[RacerSample],
        leader: Option<usize>,
        now: Duration,
    ) -> CameraMode {
        // rise
        if parked.progress < 1.0 {
            parked.progress = (parked.progress + self.settings.rise_increment).min(1.0);
            let eased = ease_out_sine(parked.progress);
            self.pose.position = lerp(&parked.start, &parked.hover, eased);
            self.pose.target = parked.anchor;
            return CameraMode::ParkedAboveStall(parked);
        }

        // hold
        let held = now.saturating_sub(parked.entered_at);
        if held < self.hold {
            self.pose.position = parked.hover;
            self.pose.target = parked.anchor;
            return CameraMode::ParkedAboveStall(parked);
        }

        // hold elapsed: is anything still stuck?
        let s = &self.settings;
        if let Some(anchor) = find_stall(racers, s.recheck_altitude, s.recheck_speed_sq) {
            debug!("Racer still stalled at {:?}, holding", anchor);
            let parked = self.park(anchor, now);
            return self.advance_parked(parked, track, racers, leader, now);
        }

        debug!("Stall cleared, resuming spline follow");
        self.follow(track, racers, leader);
        CameraMode::SplineFollow
    }

    fn follow(&mut self, track: &TrackSampler, racers: &[RacerSample], leader: Option<usize>) {
        let Some(racer) = leader.and_then(|id| racers.iter().find(|r| r.id == id)) else {
            return;
        };

        self.update_heading(racer);

        let q = track.closest(&racer.position, Some(&self.heading));
        let up = Vector3::y();
        let s = &self.settings;

        let desired_position = q.closest_point + up * s.vertical_offset;
        let desired_target = q.lookahead_point
            + self.heading * s.heading_offset
            + up * (s.vertical_offset + s.look_vertical_offset);

        self.pose.position = lerp(&self.pose.position, &desired_position, s.blend);
        self.pose.target = lerp(&self.pose.target, &desired_target, s.blend);
    }

    /// Frame-to-frame movement of the same leader. On a leader change, or a
    /// jump longer than `MAX_LEADER_STEP`, use its velocity instead so the
    /// heading doesn't point across the field.
    fn update_heading(&mut self, racer: &RacerSample) {
        let moved = match self.last_leader {
            Some((id, prev))
                if id == racer.id && (racer.position - prev).norm() <= MAX_LEADER_STEP =>
            {
                racer.position - prev
            }
            _ => racer.velocity,
        };
        if moved.norm_squared() > 1e-12 {
            self.heading = moved.normalize();
        }
        self.last_leader = Some((racer.id, racer.position));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::TrackCurve;

    fn line_track() -> TrackSampler {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(0.0, 0.0, 20.0),
        ];
        TrackSampler::new(TrackCurve::new(points, false, 200).unwrap(), 200, 0.5)
    }

    fn racer(id: usize, position: Point3<f32>, velocity: Vector3<f32>) -> RacerSample {
        RacerSample { id, position, velocity }
    }

    fn secs(s: f32) -> Duration {
        Duration::from_secs_f32(s)
    }

    #[test]
    fn holds_fallback_pose_without_track() {
        let mut rig = CameraRig::new(CameraSettings::default());
        let before = rig.pose();
        let racers = [racer(0, Point3::new(0.0, 0.0, 5.0), Vector3::z())];

        rig.update(None, &racers, Some(0), secs(0.0));
        assert_eq!(rig.pose(), before);
        assert_eq!(rig.pose().position, Point3::new(1.0, 7.0, -25.0));
    }

    #[test]
    fn empty_field_holds_pose() {
        let track = line_track();
        let mut rig = CameraRig::new(CameraSettings::default());
        let before = rig.pose();
        rig.update(Some(&track), &[], None, secs(0.0));
        assert_eq!(rig.pose(), before);
    }

    #[test]
    fn follow_converges_above_the_leader() {
        let track = line_track();
        let mut rig = CameraRig::new(CameraSettings::default());
        let mut pos = Point3::new(0.0, 0.0, 5.0);

        let first = rig.pose().position;
        rig.update(Some(&track), &[racer(0, pos, Vector3::z())], Some(0), secs(0.0));
        let moved = (rig.pose().position - first).norm();
        assert!(moved > 0.0);

        for i in 0..2_000 {
            pos.z = 5.0 + i as f32 * 1e-3;
            rig.update(Some(&track), &[racer(0, pos, Vector3::z())], Some(0), secs(0.0));
        }

        let pose = rig.pose();
        assert!((pose.position.x).abs() < 0.05);
        assert!((pose.position.y - 0.5).abs() < 0.05);
        assert!((pose.position.z - pos.z).abs() < 0.2);
        // looking down the track
        assert!(pose.target.z > pose.position.z);
        assert_eq!(rig.mode().kind(), CameraModeKind::SplineFollow);
    }

    #[test]
    fn blend_never_jumps() {
        let track = line_track();
        let settings = CameraSettings::default();
        let mut rig = CameraRig::new(settings);
        let racers = [racer(0, Point3::new(0.0, 0.0, 10.0), Vector3::z())];

        let before = rig.pose().position;
        let desired = Point3::new(0.0, 0.5, 10.0);
        rig.update(Some(&track), &racers, Some(0), secs(0.0));
        let step = (rig.pose().position - before).norm();
        assert!(step <= settings.blend * (desired - before).norm() + 0.05);
    }

    #[test]
    fn stall_parks_then_returns_to_follow() {
        let track = line_track();
        let settings = CameraSettings::default();
        let mut rig = CameraRig::new(settings);

        let runner = racer(0, Point3::new(0.0, 0.0, 8.0), Vector3::z());
        let stalled_at = Point3::new(2.0, -20.0, 6.0);
        let stalled = racer(1, stalled_at, Vector3::new(1e-4, 0.0, 0.0)); // |v|² = 1e-8

        // two consecutive ticks with the stalled racer
        rig.update(Some(&track), &[runner, stalled], Some(0), secs(0.0));
        rig.update(Some(&track), &[runner, stalled], Some(0), secs(1.0 / 60.0));
        let CameraMode::ParkedAboveStall(parked) = *rig.mode() else {
            panic!("camera should be parked");
        };
        assert_eq!(parked.anchor, stalled_at);
        assert_eq!(rig.pose().target, stalled_at);

        // rise finishes after 1 / 0.006 ticks and never overshoots
        let mut t = 2.0 / 60.0;
        let mut last_progress = parked.progress;
        for _ in 0..200 {
            rig.update(Some(&track), &[runner, stalled], Some(0), secs(t));
            t += 1.0 / 60.0;
            if let CameraMode::ParkedAboveStall(p) = *rig.mode() {
                assert!(p.progress >= last_progress && p.progress <= 1.0);
                last_progress = p.progress;
            }
        }
        assert_eq!(last_progress, 1.0);
        let hover = stalled_at + Vector3::y() * settings.hover_height;
        assert!((rig.pose().position - hover).norm() < 1e-5);

        // still parked within the hold window
        rig.update(Some(&track), &[runner, stalled], Some(0), secs(30.0));
        assert_eq!(rig.mode().kind(), CameraModeKind::ParkedAboveStall);

        // hold over, the stalled racer got moving again
        let freed = racer(1, Point3::new(2.0, 1.0, 6.0), Vector3::new(0.0, 0.0, 2.0));
        let before = rig.pose();
        rig.update(Some(&track), &[runner, freed], Some(0), secs(61.0));
        assert_eq!(rig.mode().kind(), CameraModeKind::SplineFollow);

        // resumed from the parked pose: one blend step, no snap
        let desired = Point3::new(0.0, 0.5, 8.0);
        let step = (rig.pose().position - before.position).norm();
        assert!(step <= settings.blend * (desired - before.position).norm() + 1e-3);
    }

    #[test]
    fn stall_that_persists_rearms_the_hold() {
        let track = line_track();
        let settings = CameraSettings::default();
        let mut rig = CameraRig::new(settings);

        let runner = racer(0, Point3::new(0.0, 0.0, 8.0), Vector3::z());
        let stalled = racer(1, Point3::new(2.0, -20.0, 6.0), Vector3::zeros());

        rig.update(Some(&track), &[runner, stalled], Some(0), secs(0.0));
        for i in 0..200 {
            rig.update(Some(&track), &[runner, stalled], Some(0), secs(i as f32 / 60.0));
        }
        rig.update(Some(&track), &[runner, stalled], Some(0), secs(61.0));

        let CameraMode::ParkedAboveStall(parked) = *rig.mode() else {
            panic!("camera should stay parked");
        };
        assert_eq!(parked.entered_at, secs(61.0));
    }

    #[test]
    fn unreachable_hold_keeps_the_camera_parked() {
        let track = line_track();
        let settings = CameraSettings {
            hold_secs: 1e20,
            ..CameraSettings::default()
        };
        let mut rig = CameraRig::new(settings);

        let runner = racer(0, Point3::new(0.0, 0.0, 8.0), Vector3::z());
        let stalled = racer(1, Point3::new(2.0, -20.0, 6.0), Vector3::zeros());
        for i in 0..200 {
            rig.update(Some(&track), &[runner, stalled], Some(0), secs(i as f32 * 3600.0));
        }

        let CameraMode::ParkedAboveStall(parked) = *rig.mode() else {
            panic!("camera should stay parked");
        };
        assert_eq!(parked.progress, 1.0);
        assert_eq!(parked.entered_at, Duration::ZERO);
    }

    #[test]
    fn heading_restarts_from_velocity_after_a_stall() {
        let track = line_track();
        let settings = CameraSettings {
            rise_increment: 1.0,
            hold_secs: 0.0,
            ..CameraSettings::default()
        };
        let mut rig = CameraRig::new(settings);

        let leader = racer(0, Point3::new(0.0, 0.0, 5.0), Vector3::z());
        rig.update(Some(&track), &[leader], Some(0), secs(0.0));

        let stalled = racer(1, Point3::new(0.0, -20.0, 0.0), Vector3::zeros());
        rig.update(Some(&track), &[leader, stalled], Some(0), secs(0.1));
        assert_eq!(rig.mode().kind(), CameraModeKind::ParkedAboveStall);

        // the leader slid back a little while the camera was parked
        let leader = racer(0, Point3::new(0.0, 0.0, 4.0), Vector3::z());
        let freed = racer(1, Point3::new(0.0, 1.0, 0.0), Vector3::z());
        rig.update(Some(&track), &[leader, freed], Some(0), secs(0.2));

        assert_eq!(rig.mode().kind(), CameraModeKind::SplineFollow);
        assert!((rig.heading() - Vector3::z()).norm() < 1e-6);
    }

    #[test]
    fn respawn_jump_does_not_flip_the_heading() {
        let track = line_track();
        let mut rig = CameraRig::new(CameraSettings::default());

        let at = |z: f32| [racer(0, Point3::new(0.0, 0.0, z), Vector3::z())];

        rig.update(Some(&track), &at(15.0), Some(0), secs(0.0));
        rig.update(Some(&track), &at(3.0), Some(0), secs(0.1));
        assert!((rig.heading() - Vector3::z()).norm() < 1e-6);

        // ordinary motion still drives the heading
        rig.update(Some(&track), &at(2.5), Some(0), secs(0.2));
        assert!((rig.heading() + Vector3::z()).norm() < 1e-6);
    }

    #[test]
    fn fast_racer_below_threshold_is_not_a_stall() {
        let racers = [racer(0, Point3::new(0.0, -20.0, 0.0), Vector3::new(0.0, -3.0, 0.0))];
        assert!(find_stall(&racers, -15.0, 1e-6).is_none());
    }
}
