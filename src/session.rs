// ==============================================================================
// session.rs - ONE RACE: WORLD, RACERS, OBSTACLES, LEADER, CAMERA
// ------------------------------------------------------------------------------
// Per tick, in order:
//   1. read the follow selection (once)
//   2. animate obstacle visuals from elapsed time
//   3. running only: boosts -> obstacle sync -> physics step -> recovery/visuals
//                    -> leader selection -> camera update
//      stopped:      obstacle sync only
//
// Without a usable guide curve the session still simulates; the camera just
// holds its pose.
// ==============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::assets::TrackAssets;
use crate::camera::CameraRig;
use crate::config::RaceConfig;
use crate::control::{FollowControl, FollowSelection};
use crate::driver::{ForceDriver, NeutralZone};
use crate::leader::LeaderSelector;
use crate::obstacles::ObstacleSet;
use crate::physics::{q4, v3, PhysicsWorld};
use crate::racer::{Racer, RacerSample, VisualRegistry};
use crate::state::{CameraSnapshot, ObstacleSnapshot, RaceSnapshot, RacerSnapshot};
use crate::track::{query_track, TrackCurve, TrackSampler};

pub struct RaceSession {
    physics: PhysicsWorld,
    visuals: VisualRegistry,
    racers: Vec<Racer>,
    obstacles: ObstacleSet,
    driver: ForceDriver,
    selector: LeaderSelector,
    camera: CameraRig,
    track: Option<TrackSampler>,
    control: Arc<FollowControl>,
    selection: FollowSelection,
    leader: Option<usize>,
    standings: Vec<usize>,
    running: bool,
    tick: u64,
    elapsed: f32,
}

impl RaceSession {
    pub fn new(config: &RaceConfig, assets: &TrackAssets, control: Arc<FollowControl>) -> Self {
        let curve_settings = &config.curve;
        let curve = TrackCurve::new(
            assets.guide_points(),
            curve_settings.closed,
            curve_settings.divisions,
        );
        let track = match curve {
            Ok(curve) => {
                let sampler =
                    TrackSampler::new(curve, curve_settings.samples, curve_settings.lookahead);
                info!(
                    "Track curve built: {} control points, length {:.2}, {} samples ({} divisions)",
                    sampler.curve().control_points().len(),
                    sampler.curve().length(),
                    sampler.samples().len(),
                    sampler.divisions()
                );
                Some(sampler)
            }
            Err(err) => {
                warn!("No usable track curve ({err}), camera will hold its pose");
                None
            }
        };

        let mut physics = PhysicsWorld::new();
        let mut visuals = VisualRegistry::default();

        for mesh in &assets.colliders {
            physics.insert_static_trimesh(mesh);
        }

        let settings = &config.racers;
        let racers: Vec<Racer> = (0..settings.count)
            .map(|id| {
                let position = settings.grid_position(id);
                Racer {
                    id,
                    body: physics.spawn_marble(position, settings),
                    visual: visuals.add_racer(position),
                    start_rank: settings.start_rank(id),
                    position,
                    velocity: nalgebra::Vector3::zeros(),
                }
            })
            .collect();
        info!("Spawned {} racers", racers.len());

        let mut obstacles = ObstacleSet::new(config.obstacles);
        for door in &assets.doors {
            obstacles.add_door(door, &mut physics, &mut visuals);
        }
        for rotor in &assets.rotors {
            obstacles.add_rotor(rotor, &mut physics, &mut visuals);
        }

        let zones = assets.neutral_zones.iter().map(NeutralZone::from).collect();
        let driver = ForceDriver::new(config.boost, config.recovery, zones, settings.visual_radius);

        Self {
            physics,
            visuals,
            racers,
            obstacles,
            driver,
            selector: LeaderSelector::new(config.leader),
            camera: CameraRig::new(config.camera),
            track,
            selection: control.load(),
            control,
            leader: None,
            standings: Vec::new(),
            running: false,
            tick: 0,
            elapsed: 0.0,
        }
    }

    pub fn start(&mut self) {
        if !self.running {
            info!("Race started at tick {}", self.tick);
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        if self.running {
            info!("Race stopped at tick {}", self.tick);
        }
        self.running = false;
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[cfg(test)]
    pub fn has_track(&self) -> bool {
        self.track.is_some()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    pub fn leader(&self) -> Option<usize> {
        self.leader
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    #[cfg(test)]
    pub fn racers(&self) -> &[Racer] {
        &self.racers
    }

    #[cfg(test)]
    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    pub fn samples(&self) -> Vec<RacerSample> {
        self.racers.iter().map(Racer::sample).collect()
    }

    /// Racer ids by score as of the last running tick, best first.
    pub fn standings(&self) -> &[usize] {
        &self.standings
    }

    /// `now` is wall time since the race began; it only drives the camera hold.
    pub fn tick(&mut self, dt: f32, now: Duration) {
        self.selection = self.control.load();
        self.elapsed += dt;

        self.obstacles.animate(&mut self.visuals, self.elapsed);

        if self.running {
            self.driver.apply_boosts(&self.racers, &mut self.physics);
            self.obstacles.sync(&self.visuals, &mut self.physics);
            self.physics.step(dt);
            self.driver
                .after_step(&mut self.racers, &mut self.physics, &mut self.visuals, dt);

            let samples = self.samples();
            self.leader = self.selector.select(&samples, self.selection);
            self.standings = self.selector.rank(&samples).iter().map(|s| s.id).collect();
            self.camera
                .update(self.track.as_ref(), &samples, self.leader, now);
        } else {
            self.obstacles.sync(&self.visuals, &mut self.physics);
        }

        self.tick += 1;
    }

    /// Arc parameter (0..=1) of the leader's nearest track sample; 0 without a track.
    pub fn leader_progress(&self) -> f32 {
        let Some(racer) = self.leader.and_then(|id| self.racers.iter().find(|r| r.id == id)) else {
            return 0.0;
        };
        let heading = self.camera.heading();
        query_track(self.track.as_ref(), &racer.position, Some(&heading)).t0
    }

    pub fn snapshot(&self) -> RaceSnapshot {
        let pose = self.camera.pose();

        let racers = self
            .racers
            .iter()
            .map(|r| {
                let rotation = self
                    .visuals
                    .racers
                    .get(r.visual)
                    .map(|v| q4(&v.rotation))
                    .unwrap_or([0.0, 0.0, 0.0, 1.0]);
                RacerSnapshot {
                    id: r.id,
                    position: v3(&r.position.coords),
                    velocity: v3(&r.velocity),
                    rotation,
                }
            })
            .collect();

        let doors = self
            .obstacles
            .gates
            .iter()
            .filter_map(|g| {
                let pose = self.visuals.doors.get(g.visual)?;
                Some(ObstacleSnapshot {
                    name: g.name.clone(),
                    translation: v3(&pose.translation.vector),
                    rotation: q4(&pose.rotation),
                })
            })
            .collect();

        let rotors = self
            .obstacles
            .rotors
            .iter()
            .filter_map(|r| {
                let pose = self.visuals.rotors.get(r.visual)?;
                Some(ObstacleSnapshot {
                    name: r.name.clone(),
                    translation: v3(&pose.translation.vector),
                    rotation: q4(&pose.rotation),
                })
            })
            .collect();

        RaceSnapshot {
            tick: self.tick,
            elapsed: self.elapsed,
            running: self.running,
            leader: self.leader,
            standings: self.standings.clone(),
            leader_progress: self.leader_progress(),
            auto_follow: self.selection.auto_follow,
            camera: CameraSnapshot {
                mode: self.camera.mode().kind(),
                position: v3(&pose.position.coords),
                target: v3(&pose.target.coords),
            },
            racers,
            doors,
            rotors,
        }
    }
}
