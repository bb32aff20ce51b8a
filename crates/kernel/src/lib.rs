//! 2D SPH Fluid Simulation Kernel
//!
//! This crate provides the core simulation kernel for a 2D Smoothed Particle
//! Hydrodynamics (SPH) fluid. It is designed to be separable and
//! compute-focused: the host supplies particle state and a parameter
//! snapshot each frame, the kernel advances one frame, and the renderer
//! reads back positions and colors.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage and shared-buffer records.
//! - [`params`] -- The per-frame parameter snapshot.
//! - [`smoothing`] -- Spike and viscosity smoothing kernels.
//! - [`dispatch`] -- Thread-pool dispatch primitives mirroring GPU kernel launches.
//! - [`spatial`] -- Sorted-lookup spatial hash with a bitonic sorting network.
//! - [`solver`] -- Density, pressure, and viscosity passes.
//! - [`integrate`] -- Prediction, integration, boundary reflection, display color.

#![warn(missing_docs)]

pub mod dispatch;
pub mod integrate;
pub mod params;
pub mod particle;
pub mod smoothing;
pub mod solver;
pub mod spatial;

use glam::Vec2;

pub use params::{InvalidParams, SimParams};
pub use particle::{DensitySample, Particle, ParticleBuffers};
pub use spatial::{CellEntry, SpatialHash, NO_OFFSET};

// ---------------------------------------------------------------------------
// SimulationKernel trait
// ---------------------------------------------------------------------------

/// Trait that simulation back-ends implement.
///
/// A kernel owns particle data and advances it one frame at a time through a
/// fixed sequence of data-parallel stages:
///
/// 1. Gravity + position prediction
/// 2. Density / near-density at predicted positions (previous frame's index)
/// 3. Spatial index rebuild (bin, bitonic sort, offsets)
/// 4. Pressure + viscosity forces
/// 5. Integration, boundary reflection, display color
///
/// Between frames the finished buffers are stable, so a renderer may read
/// them concurrently with the host preparing the next frame's parameters; it
/// must never read while [`SimulationKernel::step`] is running.
pub trait SimulationKernel {
    /// Advance the simulation by one frame under the given parameter
    /// snapshot.
    ///
    /// The snapshot is immutable for the duration of the frame; host-side
    /// parameter edits take effect at the next call. A panic in any stage
    /// abandons the whole frame: there is no partial-frame recovery.
    fn step(&mut self, params: &SimParams);

    /// Read back current particle state.
    fn particles(&self) -> &ParticleBuffers;

    /// Number of particles in the simulation.
    fn particle_count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// CpuKernel -- thread-pool implementation of SimulationKernel
// ---------------------------------------------------------------------------

/// Thread-pool implementation of the simulation kernel.
///
/// Each stage is dispatched across the particle range on the rayon pool with
/// a join (the stage barrier) before the next stage starts, reproducing the
/// one-invocation-per-particle, globally barriered execution model of a GPU
/// compute pipeline on the CPU.
pub struct CpuKernel {
    /// Particle state and per-frame derived buffers.
    particles: ParticleBuffers,
    /// Spatial hash index; holds the previous frame's binning until the
    /// rebuild stage runs.
    spatial: SpatialHash,
    /// Per-particle acceleration scratch, filled by the force pass and
    /// consumed by the resolve stage.
    accelerations: Vec<Vec2>,
}

impl CpuKernel {
    /// Create a kernel from initial particle state.
    ///
    /// `params.particle_count` must match the buffer length; the population
    /// is fixed for the lifetime of the kernel. The spatial index is seeded
    /// from the initial positions so the first frame's density pass has a
    /// valid "previous" index to query.
    pub fn new(particles: ParticleBuffers, params: &SimParams) -> Self {
        assert_eq!(
            particles.len(),
            params.particle_count as usize,
            "particle_count must match the supplied buffers"
        );
        let params = params.sanitized();
        let n = particles.len();
        let mut kernel = Self {
            spatial: SpatialHash::new(n),
            accelerations: vec![Vec2::ZERO; n],
            particles,
        };
        kernel.spatial.rebuild(
            &kernel.particles.predicted,
            params.smoothing_radius,
            params.bounds_max_vec(),
        );
        tracing::info!(particles = n, "initialized CPU fluid kernel");
        kernel
    }
}

impl SimulationKernel for CpuKernel {
    fn step(&mut self, params: &SimParams) {
        assert_eq!(
            params.particle_count as usize,
            self.particles.len(),
            "particle_count is fixed for the lifetime of a run"
        );
        let params = params.sanitized();

        // --- 1. Gravity + position prediction ---
        integrate::predict(&mut self.particles, &params);

        // --- 2. Density at predicted positions, previous frame's index ---
        solver::compute_densities(&mut self.particles, &self.spatial, &params);

        // --- 3. Rebuild the spatial index: bin, sort passes, offsets ---
        self.spatial.rebuild(
            &self.particles.predicted,
            params.smoothing_radius,
            params.bounds_max_vec(),
        );

        // --- 4. Pressure + viscosity forces against the fresh index ---
        solver::compute_accelerations(
            &mut self.accelerations,
            &self.particles,
            &self.spatial,
            &params,
        );

        // --- 5. Integrate, reflect at bounds, recolor ---
        integrate::resolve(&mut self.particles, &self.accelerations, &params);
    }

    fn particles(&self) -> &ParticleBuffers {
        &self.particles
    }

    fn particle_count(&self) -> usize {
        self.particles.len()
    }
}
