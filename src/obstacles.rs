// ==============================================================================
// obstacles.rs - AUTHORED MOVING OBSTACLES (DOORS, ROTORS)
// ------------------------------------------------------------------------------
// Motion is a closed-form function of elapsed time written to the visual
// transform, then copied one way into the kinematic body:
//
//   door:  y = rest_y + amplitude * -|sin(t)|        (0 -> -A -> 0, period π)
//          body y = door y + body_offset, body x/z untouched
//   rotor: rotation = rest * RotZ(rate * t)           (local Z axis)
//          body pose = visual pose
//
// The physics body never writes back into the visual transform.
// ==============================================================================

use nalgebra::{Isometry3, UnitQuaternion, Vector3};
use rapier3d::prelude::RigidBodyHandle;
use serde::Deserialize;
use tracing::warn;

use crate::assets::{DoorAsset, RotorAsset};
use crate::physics::PhysicsWorld;
use crate::racer::VisualRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ObstacleSettings {
    pub door_amplitude: f32,   // m
    pub door_body_offset: f32, // body y above the visual origin
    pub rotor_rate: f32,       // rad/s about local Z
}

impl Default for ObstacleSettings {
    fn default() -> Self {
        Self {
            door_amplitude: 1.0,
            door_body_offset: 2.75,
            rotor_rate: std::f32::consts::PI / 16.0 * 60.0,
        }
    }
}

#[inline]
pub fn door_offset(amplitude: f32, elapsed: f32) -> f32 {
    amplitude * -elapsed.sin().abs()
}

#[inline]
pub fn rotor_rotation(rest: &UnitQuaternion<f32>, rate: f32, elapsed: f32) -> UnitQuaternion<f32> {
    rest * UnitQuaternion::from_axis_angle(&Vector3::z_axis(), rate * elapsed)
}

#[derive(Debug, Clone)]
pub struct GateSync {
    pub name: String,
    pub visual: usize, // VisualRegistry::doors
    pub body: RigidBodyHandle,
    pub rest: Isometry3<f32>,
}

#[derive(Debug, Clone)]
pub struct RotorSync {
    pub name: String,
    pub visual: usize, // VisualRegistry::rotors
    pub body: RigidBodyHandle,
    pub rest: Isometry3<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct ObstacleSet {
    pub settings: ObstacleSettings,
    pub gates: Vec<GateSync>,
    pub rotors: Vec<RotorSync>,
}

impl ObstacleSet {
    pub fn new(settings: ObstacleSettings) -> Self {
        Self {
            settings,
            gates: Vec::new(),
            rotors: Vec::new(),
        }
    }

    pub fn add_door(
        &mut self,
        door: &DoorAsset,
        physics: &mut PhysicsWorld,
        visuals: &mut VisualRegistry,
    ) {
        let [x, y, z] = door.translation;
        let rest = Isometry3::translation(x, y, z);

        let mut body_pose = rest;
        body_pose.translation.y += self.settings.door_body_offset;
        let body = physics.insert_kinematic_box(body_pose, door.half_extents);

        visuals.doors.push(rest);
        self.gates.push(GateSync {
            name: door.name.clone(),
            visual: visuals.doors.len() - 1,
            body,
            rest,
        });
    }

    pub fn add_rotor(
        &mut self,
        rotor: &RotorAsset,
        physics: &mut PhysicsWorld,
        visuals: &mut VisualRegistry,
    ) {
        let rest = rotor.pose();
        let body = physics.insert_kinematic_box(rest, rotor.half_extents);

        visuals.rotors.push(rest);
        self.rotors.push(RotorSync {
            name: rotor.name.clone(),
            visual: visuals.rotors.len() - 1,
            body,
            rest,
        });
    }

    /// Write this instant's closed-form pose into every visual transform.
    pub fn animate(&self, visuals: &mut VisualRegistry, elapsed: f32) {
        for gate in &self.gates {
            if let Some(visual) = visuals.doors.get_mut(gate.visual) {
                let mut pose = gate.rest;
                pose.translation.y += door_offset(self.settings.door_amplitude, elapsed);
                *visual = pose;
            }
        }

        for rotor in &self.rotors {
            if let Some(visual) = visuals.rotors.get_mut(rotor.visual) {
                *visual = Isometry3::from_parts(
                    rotor.rest.translation,
                    rotor_rotation(&rotor.rest.rotation, self.settings.rotor_rate, elapsed),
                );
            }
        }
    }

    /// Mirror visual transforms into their kinematic bodies (visual -> physics only).
    pub fn sync(&self, visuals: &VisualRegistry, physics: &mut PhysicsWorld) {
        for gate in &self.gates {
            let Some(visual) = visuals.doors.get(gate.visual) else { continue };
            let Some(body) = physics.body_mut(gate.body) else {
                warn!("Door '{}' has no physics body, skipping sync", gate.name);
                continue;
            };

            let mut t = *body.translation();
            t.y = visual.translation.y + self.settings.door_body_offset;
            body.set_translation(t, true);
        }

        for rotor in &self.rotors {
            let Some(visual) = visuals.rotors.get(rotor.visual) else { continue };
            let Some(body) = physics.body_mut(rotor.body) else {
                warn!("Rotor '{}' has no physics body, skipping sync", rotor.name);
                continue;
            };

            body.set_translation(visual.translation.vector, true);
            body.set_rotation(visual.rotation, true);
        }
    }
}
