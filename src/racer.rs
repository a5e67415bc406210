// src/racer.rs

use nalgebra::{Point3, UnitQuaternion, Vector3};
use rapier3d::prelude::RigidBodyHandle;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RacerSettings {
    pub count: usize,
    pub radius: f32,        // collider radius (m)
    pub visual_radius: f32, // rolling radius used for the cosmetic spin
    pub density: f32,
    pub friction: f32,
    pub restitution: f32,
    pub start_point: [f32; 3],
    pub row_spacing: f32,    // z gap between racers in a column
    pub column_spacing: f32, // x gap between columns
    pub per_column: usize,
    pub start_ranks: Vec<u32>, // per racer, used by the catch-up boost
}

impl Default for RacerSettings {
    fn default() -> Self {
        Self {
            count: 10,
            radius: 0.1275,
            visual_radius: 0.125,
            density: 15.0,
            friction: 0.05,
            restitution: 0.0,
            start_point: [3.0, 6.92, -24.55],
            row_spacing: 0.35,
            column_spacing: 0.3,
            per_column: 5,
            start_ranks: vec![10, 10, 1, 10, 10, 10, 10, 10, 10, 10],
        }
    }
}

impl RacerSettings {
    /// Grid slot for racer `index`: columns of `per_column`, offset from the start point.
    pub fn grid_position(&self, index: usize) -> Point3<f32> {
        let per_column = self.per_column.max(1);
        let column = (index / per_column) as f32;
        let row = (index % per_column) as f32;
        let [sx, sy, sz] = self.start_point;

        Point3::new(
            sx - 0.5 + column * self.column_spacing,
            sy - 0.15,
            sz - 0.75 + row * self.row_spacing,
        )
    }

    pub fn start_rank(&self, index: usize) -> u32 {
        self.start_ranks.get(index).copied().unwrap_or(0)
    }
}

/// Render-side transform of one marble. Never read by physics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RacerVisual {
    pub position: Point3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

/// One racer in the arena. Handles index into separately owned registries.
#[derive(Debug, Clone)]
pub struct Racer {
    pub id: usize,
    pub body: RigidBodyHandle,
    pub visual: usize, // index into VisualRegistry::racers
    pub start_rank: u32,
    pub position: Point3<f32>,
    pub velocity: Vector3<f32>,
}

impl Racer {
    pub fn sample(&self) -> RacerSample {
        RacerSample {
            id: self.id,
            position: self.position,
            velocity: self.velocity,
        }
    }
}

/// Position + velocity of one racer for the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RacerSample {
    pub id: usize,
    pub position: Point3<f32>,
    pub velocity: Vector3<f32>,
}

impl RacerSample {
    #[inline]
    pub fn speed_squared(&self) -> f32 {
        self.velocity.norm_squared()
    }
}

/// Owned render transforms: marbles, doors, rotors.
#[derive(Debug, Clone, Default)]
pub struct VisualRegistry {
    pub racers: Vec<RacerVisual>,
    pub doors: Vec<nalgebra::Isometry3<f32>>,
    pub rotors: Vec<nalgebra::Isometry3<f32>>,
}

impl VisualRegistry {
    pub fn add_racer(&mut self, position: Point3<f32>) -> usize {
        self.racers.push(RacerVisual {
            position,
            rotation: UnitQuaternion::identity(),
        });
        self.racers.len() - 1
    }
}
