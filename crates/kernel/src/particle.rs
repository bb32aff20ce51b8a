//! Particle storage: struct-of-arrays buffers plus the shared-buffer records.
//!
//! The SoA layout keeps every per-particle quantity in its own dense array so
//! each pipeline stage can be dispatched as one pass over one output buffer.
//! Array lengths are established at construction and never change: the
//! particle population is fixed for the lifetime of a run.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Wire-format particle record shared with the host and the renderer.
///
/// `#[repr(C)]`, field order fixed: `position` then `velocity`, no padding.
/// Both sides of a shared buffer must agree on this layout byte-for-byte.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Particle {
    /// World-space position.
    pub position: [f32; 2],
    /// World-space velocity.
    pub velocity: [f32; 2],
}

/// Density pair sampled at a particle's predicted position.
///
/// Both components are non-negative by construction (the kernels are
/// non-negative). A density of zero is a meaningful state, not an error,
/// and every divide by a density is guarded at the call site.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct DensitySample {
    /// Primary density from the quadratic spike kernel.
    pub density: f32,
    /// Near-density from the cubic spike kernel.
    pub near_density: f32,
}

/// Struct-of-arrays particle buffers.
///
/// All arrays are parallel: index `i` across every array refers to the same
/// particle. `positions` and `velocities` are the authoritative state;
/// `predicted`, `densities`, and `colors` are derived quantities recomputed
/// every frame.
#[derive(Debug, Clone)]
pub struct ParticleBuffers {
    /// World-space positions.
    pub positions: Vec<Vec2>,
    /// World-space velocities.
    pub velocities: Vec<Vec2>,
    /// One-step-ahead position estimates used by the density and force passes.
    pub predicted: Vec<Vec2>,
    /// Density / near-density pairs at predicted positions.
    pub densities: Vec<DensitySample>,
    /// Display colors (RGBA) derived from kinetic energy each frame.
    pub colors: Vec<[f32; 4]>,
}

impl ParticleBuffers {
    /// Build buffers from wire-format records.
    ///
    /// Predicted positions start equal to the positions so the first frame
    /// has a valid state to index before any prediction has run.
    pub fn from_particles(particles: &[Particle]) -> Self {
        let positions: Vec<Vec2> = particles.iter().map(|p| Vec2::from(p.position)).collect();
        let velocities: Vec<Vec2> = particles.iter().map(|p| Vec2::from(p.velocity)).collect();
        let n = particles.len();
        Self {
            predicted: positions.clone(),
            positions,
            velocities,
            densities: vec![DensitySample::default(); n],
            colors: vec![[0.0, 0.0, 1.0, 1.0]; n],
        }
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// `true` if there are no particles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Pack the authoritative state back into wire-format records for the
    /// shared-buffer handoff.
    pub fn to_particles(&self) -> Vec<Particle> {
        self.positions
            .iter()
            .zip(&self.velocities)
            .map(|(position, velocity)| Particle {
                position: position.to_array(),
                velocity: velocity.to_array(),
            })
            .collect()
    }
}
