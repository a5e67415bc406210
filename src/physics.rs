// src/physics.rs

use rapier3d::na::{Isometry3, UnitQuaternion};
use rapier3d::prelude::*;
use tracing::{info, warn};

use crate::assets::MeshCollider;
use crate::racer::RacerSettings;

const GROUP_TRACK: Group = Group::from_bits_truncate(0b0001);
const GROUP_MARBLE: Group = Group::from_bits_truncate(0b0010);

/// Anything further than this from the origin has escaped the simulation.
const ESCAPE_LIMIT: Real = 1_000.0;

#[inline]
pub fn v3(v: &Vector<Real>) -> [f32; 3] {
    [v.x, v.y, v.z]
}

#[inline]
pub fn q4(q: &UnitQuaternion<Real>) -> [f32; 4] {
    [q.i, q.j, q.k, q.w]
}

pub struct PhysicsWorld {
    pub gravity: Vector<Real>,              // gravity vector
    pub pipeline: PhysicsPipeline,          // physics pipeline
    pub island_manager: IslandManager,      // manages islands of bodies
    pub broad_phase: DefaultBroadPhase,     // broad-phase collision detection
    pub narrow_phase: NarrowPhase,          // collision detection
    pub bodies: RigidBodySet,               // for rigid bodies
    pub colliders: ColliderSet,             // for collision shapes
    pub joints: ImpulseJointSet,            // for constraints
    pub multibody_joints: MultibodyJointSet, // for articulated bodies
    pub ccd: CCDSolver,                     // continuous collision detection
    pub query_pipeline: QueryPipeline,      // for raycasting
}

impl PhysicsWorld {
    pub fn new() -> Self {
        Self {
            gravity: vector![0.0, -9.81, 0.0],
            pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
        }
    }

    /// Fixed body carrying one world-space triangle mesh of the track.
    pub fn insert_static_trimesh(&mut self, mesh: &MeshCollider) -> RigidBodyHandle {
        let vertices: Vec<Point<Real>> = mesh
            .vertices
            .iter()
            .map(|v| point![v[0], v[1], v[2]])
            .collect();

        let handle = self.bodies.insert(RigidBodyBuilder::fixed().build());

        let collider = ColliderBuilder::trimesh(vertices, mesh.indices.clone())
            .collision_groups(InteractionGroups::new(GROUP_TRACK, GROUP_MARBLE))
            .friction(0.05)
            .restitution(0.0)
            .build();

        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        info!(
            "Track mesh '{}' inserted ({} triangles)",
            mesh.name,
            mesh.indices.len()
        );
        handle
    }

    /// Kinematic box for an authored obstacle (door, rotor). Driven by position
    /// overrides only, never by forces.
    pub fn insert_kinematic_box(
        &mut self,
        pose: Isometry3<Real>,
        half_extents: [f32; 3],
    ) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::kinematic_position_based()
            .position(pose)
            .build();
        let handle = self.bodies.insert(rb);

        let [hx, hy, hz] = half_extents;
        let collider = ColliderBuilder::cuboid(hx, hy, hz)
            .collision_groups(InteractionGroups::new(GROUP_TRACK, GROUP_MARBLE))
            .friction(0.05)
            .restitution(0.0)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);

        handle
    }

    /// Dynamic sphere with CCD so fast marbles don't tunnel through thin track walls.
    pub fn spawn_marble(
        &mut self,
        position: Point<Real>,
        settings: &RacerSettings,
    ) -> RigidBodyHandle {
        let rb = RigidBodyBuilder::dynamic()
            .translation(position.coords)
            .ccd_enabled(true)
            .build();

        let collider = ColliderBuilder::ball(settings.radius)
            .collision_groups(InteractionGroups::new(
                GROUP_MARBLE,
                GROUP_TRACK | GROUP_MARBLE,
            ))
            .density(settings.density)
            .friction(settings.friction)
            .restitution(settings.restitution)
            .build();

        let handle = self.bodies.insert(rb);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    #[cfg(test)]
    pub fn translation(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|b| *b.translation())
    }

    #[cfg(test)]
    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|b| *b.linvel())
    }

    pub fn body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.bodies.get_mut(handle)
    }

    pub fn step(&mut self, dt: Real) {
        let hooks = ();
        let events = ();

        self.pipeline.step(
            &self.gravity,
            &IntegrationParameters {
                dt,
                ..IntegrationParameters::default()
            },
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &hooks,
            &events,
        );

        // Safety: prevent bodies from exploding to insane coordinates
        for (handle, body) in self.bodies.iter_mut() {
            if !body.is_dynamic() {
                continue;
            }

            let pos = *body.translation();
            let bad = !pos.iter().all(|c| c.is_finite())
                || pos.iter().any(|c| c.abs() > ESCAPE_LIMIT);

            if bad {
                let safe = vector![0.0, 1.0, 0.0];
                body.set_translation(safe, true);
                body.set_linvel(vector![0.0, 0.0, 0.0], true);
                body.set_angvel(vector![0.0, 0.0, 0.0], true);

                warn!("Reset exploding body {:?} back to {:?}", handle, v3(&safe));
            }
        }
    }
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}
