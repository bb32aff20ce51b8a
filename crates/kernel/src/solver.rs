//! Density and force computation over spatial-hash candidates.
//!
//! Both passes run at *predicted* positions, which makes the pressure solve
//! behave implicitly enough for stability without an actual implicit solver.
//! The density pass includes the particle's own contribution while the force
//! pass excludes it; the asymmetry is deliberate -- the self term keeps an
//! isolated particle's density strictly positive, so the division in the
//! acceleration assembly never sees a zero for a live particle. Do not
//! "clean up" one side to match the other.

use glam::Vec2;

use crate::dispatch;
use crate::params::SimParams;
use crate::particle::{DensitySample, ParticleBuffers};
use crate::smoothing;
use crate::spatial::SpatialHash;

/// Distance below which a pair's force direction is degenerate and falls
/// back to `+y` instead of normalizing a near-zero vector.
const MIN_DIRECTION_DISTANCE: f32 = 1.0e-8;

/// Pressure from the density error. Signed: an under-dense region produces
/// negative pressure, i.e. suction.
pub fn pressure_from_density(density: f32, params: &SimParams) -> f32 {
    (density - params.target_density) * params.pressure_multiplier
}

/// Near-pressure from near-density. Always non-negative, so the derived
/// short-range force only ever pushes particles apart.
pub fn near_pressure_from_density(near_density: f32, params: &SimParams) -> f32 {
    near_density * params.near_density_multiplier
}

/// Density pass: one task per particle, sampling density and near-density at
/// the particle's predicted position.
///
/// Queries whatever state `spatial` was last built from; the pipeline calls
/// this before the rebuild, so candidates come from the previous frame's
/// index while distances use this frame's predicted positions.
pub fn compute_densities(particles: &mut ParticleBuffers, spatial: &SpatialHash, params: &SimParams) {
    let radius = params.smoothing_radius;
    let sqr_radius = radius * radius;
    let shift = params.bounds_max_vec();
    let (predicted, densities) = (&particles.predicted, &mut particles.densities);

    dispatch::par_fill(densities, |i| {
        let origin = predicted[i];
        let mut sample = DensitySample::default();
        spatial.for_each_candidate(origin, radius, shift, |j| {
            let sqr_dist = predicted[j].distance_squared(origin);
            if sqr_dist > sqr_radius {
                return;
            }
            let dist = sqr_dist.sqrt();
            sample.density += smoothing::density_kernel(dist, radius);
            sample.near_density += smoothing::near_density_kernel(dist, radius);
        });
        sample
    });
}

/// Force pass: one task per particle, assembling the acceleration applied by
/// the resolve stage.
///
/// ```text
/// a_i = F_pressure(i) / rho_i + F_viscosity(i) * viscosity_strength
/// ```
///
/// The pressure force sums, over in-range neighbors `j != i`,
/// `dir * 0.5 * (P_i + P_j) * W'(d) / rho_j` for the density term and the
/// same shape with near-pressures and the near kernel for the near term.
/// The symmetric pressure averaging keeps pair forces equal and opposite up
/// to floating-point error. Neighbors with a zero density (or zero
/// near-density, per term) are skipped rather than divided by.
pub fn compute_accelerations(
    accelerations: &mut [Vec2],
    particles: &ParticleBuffers,
    spatial: &SpatialHash,
    params: &SimParams,
) {
    let radius = params.smoothing_radius;
    let sqr_radius = radius * radius;
    let shift = params.bounds_max_vec();

    dispatch::par_fill(accelerations, |i| {
        let origin = particles.predicted[i];
        let velocity = particles.velocities[i];
        let sample = particles.densities[i];
        let pressure = pressure_from_density(sample.density, params);
        let near_pressure = near_pressure_from_density(sample.near_density, params);

        let mut pressure_force = Vec2::ZERO;
        let mut viscosity_force = Vec2::ZERO;

        spatial.for_each_candidate(origin, radius, shift, |j| {
            if j == i {
                return;
            }
            let delta = particles.predicted[j] - origin;
            let sqr_dist = delta.length_squared();
            if sqr_dist > sqr_radius {
                return;
            }
            let dist = sqr_dist.sqrt();
            let direction = if dist < MIN_DIRECTION_DISTANCE {
                Vec2::Y
            } else {
                delta / dist
            };

            let neighbor = particles.densities[j];
            if neighbor.density > 0.0 {
                let shared_pressure =
                    0.5 * (pressure + pressure_from_density(neighbor.density, params));
                pressure_force += direction
                    * (smoothing::density_kernel_derivative(dist, radius) * shared_pressure
                        / neighbor.density);
            }
            if neighbor.near_density > 0.0 {
                let shared_near = 0.5
                    * (near_pressure + near_pressure_from_density(neighbor.near_density, params));
                pressure_force += direction
                    * (smoothing::near_density_kernel_derivative(dist, radius) * shared_near
                        / neighbor.near_density);
            }

            viscosity_force +=
                (particles.velocities[j] - velocity) * smoothing::viscosity_kernel(dist, radius);
        });

        let pressure_accel = if sample.density > 0.0 {
            pressure_force / sample.density
        } else {
            Vec2::ZERO
        };
        pressure_accel + viscosity_force * params.viscosity_strength
    });
}
