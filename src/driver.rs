// ==============================================================================
// driver.rs - PER-TICK FORCES, FALL RECOVERY AND ROLLING VISUALS
// ------------------------------------------------------------------------------
// Before the physics step (apply_boosts):
//   outside neutral zones: F = dir(horizontal v) * (base + rank_weight * behind)
//                          behind = max(0, target_rank - start_rank)
//   inside a neutral zone: F = nudge, only while some |v component| > residual
//   forces are reset first, so a boost lasts exactly one tick
//
// After the physics step (after_step):
//   y < floor -> teleport to restart + up * offset (velocity left as is)
//   racer state <- body translation / linvel
//   visual position <- body, visual rotation <- rolling about up x v
// ==============================================================================

use nalgebra::{Point3, Unit, UnitQuaternion, Vector3};
use rapier3d::parry::bounding_volume::Aabb;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::assets::ZoneBox;
use crate::physics::{v3, PhysicsWorld};
use crate::racer::{Racer, VisualRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BoostSettings {
    pub base_force: f32,
    pub rank_weight: f32,
    pub target_rank: u32,
    pub neutral_nudge: [f32; 3],
    pub residual_speed: f32, // per component
}

impl Default for BoostSettings {
    fn default() -> Self {
        Self {
            base_force: 5e-4,
            rank_weight: 2e-4,
            target_rank: 10,
            neutral_nudge: [0.01, 0.0, 0.0],
            residual_speed: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RecoverySettings {
    pub floor: f32,
    pub restart_point: [f32; 3],
    pub restart_offset: f32,
}

impl Default for RecoverySettings {
    fn default() -> Self {
        Self {
            floor: -30.0,
            restart_point: [2.9577, -0.2257, -24.5574],
            restart_offset: 5.0,
        }
    }
}

impl RecoverySettings {
    pub fn restart(&self) -> Vector3<f32> {
        Vector3::from(self.restart_point) + Vector3::y() * self.restart_offset
    }
}

#[derive(Debug, Clone)]
pub struct NeutralZone {
    pub name: String,
    pub bounds: Aabb,
}

impl From<&ZoneBox> for NeutralZone {
    fn from(zone: &ZoneBox) -> Self {
        Self {
            name: zone.name.clone(),
            bounds: zone.aabb(),
        }
    }
}

impl NeutralZone {
    pub fn contains(&self, p: &Point3<f32>) -> bool {
        self.bounds.contains_local_point(p)
    }
}

/// Force for one racer this tick, `None` when nothing should be applied.
pub fn boost_force(
    velocity: &Vector3<f32>,
    start_rank: u32,
    settings: &BoostSettings,
    in_neutral: bool,
) -> Option<Vector3<f32>> {
    if in_neutral {
        let moving = velocity.iter().any(|c| c.abs() > settings.residual_speed);
        return moving.then(|| Vector3::from(settings.neutral_nudge));
    }

    let horizontal = Vector3::new(velocity.x, 0.0, velocity.z);
    let dir = horizontal.try_normalize(1e-6)?;

    let behind = settings.target_rank.saturating_sub(start_rank) as f32;
    Some(dir * (settings.base_force + settings.rank_weight * behind))
}

/// Cosmetic roll: angle = horizontal distance / radius about up x v.
pub fn rolling_rotation(
    velocity: &Vector3<f32>,
    dt: f32,
    radius: f32,
) -> Option<UnitQuaternion<f32>> {
    let horizontal = Vector3::new(velocity.x, 0.0, velocity.z);
    let speed = horizontal.norm();
    if speed < 1e-6 || radius <= 0.0 {
        return None;
    }

    let axis = Unit::try_new(Vector3::y().cross(&horizontal), 1e-9)?;
    Some(UnitQuaternion::from_axis_angle(&axis, speed * dt / radius))
}

pub struct ForceDriver {
    pub boost: BoostSettings,
    pub recovery: RecoverySettings,
    pub zones: Vec<NeutralZone>,
    pub visual_radius: f32,
}

impl ForceDriver {
    pub fn new(
        boost: BoostSettings,
        recovery: RecoverySettings,
        zones: Vec<NeutralZone>,
        visual_radius: f32,
    ) -> Self {
        Self {
            boost,
            recovery,
            zones,
            visual_radius,
        }
    }

    pub fn neutral_zone(&self, p: &Point3<f32>) -> Option<&NeutralZone> {
        self.zones.iter().find(|z| z.contains(p))
    }

    pub fn apply_boosts(&self, racers: &[Racer], physics: &mut PhysicsWorld) {
        for racer in racers {
            let Some(body) = physics.body_mut(racer.body) else {
                warn!("Racer {} has no physics body, skipping boost", racer.id);
                continue;
            };

            body.reset_forces(false);

            let position = Point3::from(*body.translation());
            let zone = self.neutral_zone(&position);

            let boost = boost_force(body.linvel(), racer.start_rank, &self.boost, zone.is_some());
            if let Some(force) = boost {
                if let Some(zone) = zone {
                    debug!("Racer {} nudged in neutral zone {}", racer.id, zone.name);
                }
                body.add_force(force, true);
            }
        }
    }

    pub fn after_step(
        &self,
        racers: &mut [Racer],
        physics: &mut PhysicsWorld,
        visuals: &mut VisualRegistry,
        dt: f32,
    ) {
        for racer in racers.iter_mut() {
            let Some(body) = physics.body_mut(racer.body) else {
                warn!("Racer {} has no physics body, skipping sync", racer.id);
                continue;
            };

            if body.translation().y < self.recovery.floor {
                let restart = self.recovery.restart();
                body.set_translation(restart, true);
                info!(
                    "Racer {} fell below {}, restarting at {:?}",
                    racer.id,
                    self.recovery.floor,
                    v3(&restart)
                );
            }

            racer.position = Point3::from(*body.translation());
            racer.velocity = *body.linvel();

            let Some(visual) = visuals.racers.get_mut(racer.visual) else {
                continue;
            };
            visual.position = racer.position;
            if let Some(roll) = rolling_rotation(&racer.velocity, dt, self.visual_radius) {
                visual.rotation = roll * visual.rotation;
            }
        }
    }
}
