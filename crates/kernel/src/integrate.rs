//! Time integration: gravity, position prediction, velocity/position
//! advance, boundary reflection, and the display color.
//!
//! Two fixed stages per frame, each a data-parallel pass over the particle
//! buffers. There is no branching between states: predict always runs, then
//! resolve always runs, with the density/index/force dispatches in between.

use glam::Vec2;
use rayon::prelude::*;

use crate::params::SimParams;
use crate::particle::ParticleBuffers;

/// Predict stage: apply gravity to velocities and extrapolate predicted
/// positions over the fixed sub-step.
///
/// ```text
/// v_i += (0, -gravity) * dt
/// predicted_i = position_i + v_i * fixed_delta_time
/// ```
///
/// Each task writes only its own velocity and predicted-position slots.
pub fn predict(particles: &mut ParticleBuffers, params: &SimParams) {
    let gravity_step = params.gravity_vec() * params.delta_time;
    let fixed_dt = params.fixed_delta_time;
    let positions = &particles.positions;

    particles
        .velocities
        .par_iter_mut()
        .zip(particles.predicted.par_iter_mut())
        .enumerate()
        .for_each(|(i, (velocity, predicted))| {
            *velocity += gravity_step;
            *predicted = positions[i] + *velocity * fixed_dt;
        });
}

/// Resolve stage: integrate accelerations into velocities, advance
/// positions, reflect at the boundary rectangle, and recompute the display
/// color.
///
/// Reflection only flips and damps the offending velocity component; the
/// position is *not* clamped back inside the rectangle, so a fast particle
/// can overshoot the boundary for a frame before the flipped velocity
/// carries it back. That one-frame overshoot is accepted behavior, not a
/// missing clamp.
pub fn resolve(particles: &mut ParticleBuffers, accelerations: &[Vec2], params: &SimParams) {
    debug_assert_eq!(accelerations.len(), particles.len());
    let dt = params.delta_time;
    let damping = params.damping_factor;
    let min = params.bounds_min_vec();
    let max = params.bounds_max_vec();
    let max_energy = params.max_energy;

    particles
        .positions
        .par_iter_mut()
        .zip(particles.velocities.par_iter_mut())
        .zip(particles.colors.par_iter_mut())
        .enumerate()
        .for_each(|(i, ((position, velocity), color))| {
            *velocity += accelerations[i] * dt;
            *position += *velocity * dt;

            if position.x < min.x || position.x > max.x {
                velocity.x *= -damping;
            }
            if position.y < min.y || position.y > max.y {
                velocity.y *= -damping;
            }

            *color = energy_color(*velocity, max_energy);
        });
}

/// Display color from kinetic energy.
///
/// Normalized energy `t = clamp(0.5 * |v|^2 / max_energy, 0, 1)` runs
/// through a blue -> green -> red ramp, linear on each side of the break at
/// `t = 0.5`. A non-positive `max_energy` pins the ramp to blue instead of
/// dividing by zero.
pub fn energy_color(velocity: Vec2, max_energy: f32) -> [f32; 4] {
    let energy = 0.5 * velocity.length_squared();
    let t = if max_energy > 0.0 {
        (energy / max_energy).clamp(0.0, 1.0)
    } else {
        0.0
    };
    if t < 0.5 {
        let s = t * 2.0;
        [0.0, s, 1.0 - s, 1.0]
    } else {
        let s = (t - 0.5) * 2.0;
        [s, 1.0 - s, 0.0, 1.0]
    }
}
