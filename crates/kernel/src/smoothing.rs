//! Smoothing kernel functions for the 2D SPH solver.
//!
//! Three kernels drive the solver: a quadratic spike for density, a cubic
//! spike for near-density (the short-range anti-clustering term), and a
//! smooth sixth-order bump for viscosity. Every function is a pure scalar
//! map of `(dist, radius)` and evaluates to exactly `0.0` at and beyond the
//! smoothing radius, so out-of-range pairs contribute nothing rather than a
//! small negative value or NaN.
//!
//! Distances are produced from vector lengths and are non-negative by
//! construction; the radius is clamped to a positive floor once per frame
//! (see [`crate::params::SimParams::sanitized`]), not inside each kernel.
//! A non-positive radius therefore also falls into the `dist >= radius`
//! early-out and yields zero.

use std::f32::consts::PI;

/// Density smoothing kernel.
///
/// ```text
/// W(d, r) = (10 / (pi r^5)) * (r - d)^2   for d < r
/// W(d, r) = 0                             for d >= r
/// ```
pub fn density_kernel(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let norm = 10.0 / (PI * radius.powi(5));
    let v = radius - dist;
    norm * v * v
}

/// Derivative of [`density_kernel`] with respect to distance:
/// `-2 * (10 / (pi r^5)) * (r - d)`.
pub fn density_kernel_derivative(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let norm = 10.0 / (PI * radius.powi(5));
    -2.0 * norm * (radius - dist)
}

/// Near-density smoothing kernel.
///
/// ```text
/// W(d, r) = (15 / (pi r^6)) * (r - d)^3   for d < r
/// W(d, r) = 0                             for d >= r
/// ```
///
/// The cubic falloff is steeper than the density kernel near `d = 0`, which
/// is what makes the derived near-pressure force strictly repulsive at short
/// range and prevents particle clumping.
pub fn near_density_kernel(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let norm = 15.0 / (PI * radius.powi(6));
    let v = radius - dist;
    norm * v * v * v
}

/// Derivative of [`near_density_kernel`] with respect to distance:
/// `-3 * (15 / (pi r^6)) * (r - d)^2`.
pub fn near_density_kernel_derivative(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let norm = 15.0 / (PI * radius.powi(6));
    let v = radius - dist;
    -3.0 * norm * v * v
}

/// Viscosity smoothing kernel.
///
/// ```text
/// W(d, r) = (4 / (pi r^8)) * (r^2 - d^2)^3   for d < r
/// W(d, r) = 0                                for d >= r
/// ```
///
/// Flat near `d = 0` (zero slope), so velocity diffusion between nearly
/// coincident particles stays bounded.
pub fn viscosity_kernel(dist: f32, radius: f32) -> f32 {
    if dist >= radius {
        return 0.0;
    }
    let norm = 4.0 / (PI * radius.powi(8));
    let v = radius * radius - dist * dist;
    norm * v * v * v
}

#[cfg(test)]
mod tests {
    use super::*;

    const RADIUS: f32 = 1.5;

    #[test]
    fn zero_at_radius_and_beyond() {
        for dist in [RADIUS, RADIUS + 1.0e-4, 2.0 * RADIUS, 100.0] {
            assert_eq!(density_kernel(dist, RADIUS), 0.0, "density at d={dist}");
            assert_eq!(
                density_kernel_derivative(dist, RADIUS),
                0.0,
                "density derivative at d={dist}"
            );
            assert_eq!(
                near_density_kernel(dist, RADIUS),
                0.0,
                "near-density at d={dist}"
            );
            assert_eq!(
                near_density_kernel_derivative(dist, RADIUS),
                0.0,
                "near-density derivative at d={dist}"
            );
            assert_eq!(viscosity_kernel(dist, RADIUS), 0.0, "viscosity at d={dist}");
        }
    }

    #[test]
    fn positive_inside_support() {
        for i in 0..20 {
            let dist = (i as f32) * RADIUS / 20.0;
            assert!(density_kernel(dist, RADIUS) > 0.0, "density at d={dist}");
            assert!(
                near_density_kernel(dist, RADIUS) > 0.0,
                "near-density at d={dist}"
            );
            assert!(viscosity_kernel(dist, RADIUS) > 0.0, "viscosity at d={dist}");
        }
    }

    #[test]
    fn derivatives_negative_inside_support() {
        // Both spike kernels decay monotonically from d=0 to d=r.
        for i in 0..20 {
            let dist = (i as f32) * RADIUS / 20.0;
            assert!(density_kernel_derivative(dist, RADIUS) < 0.0);
            assert!(near_density_kernel_derivative(dist, RADIUS) < 0.0);
        }
    }

    #[test]
    fn values_at_zero_distance() {
        let r5 = RADIUS.powi(5);
        let expected = 10.0 / (PI * r5) * RADIUS * RADIUS;
        let got = density_kernel(0.0, RADIUS);
        assert!(
            (got - expected).abs() < 1.0e-6,
            "density at d=0: got {got}, expected {expected}"
        );

        let r6 = RADIUS.powi(6);
        let expected = 15.0 / (PI * r6) * RADIUS * RADIUS * RADIUS;
        let got = near_density_kernel(0.0, RADIUS);
        assert!(
            (got - expected).abs() < 1.0e-6,
            "near-density at d=0: got {got}, expected {expected}"
        );
    }

    #[test]
    fn derivative_matches_finite_difference() {
        let dist = 0.6_f32;
        let eps = 1.0e-3_f32;
        let numeric =
            (density_kernel(dist + eps, RADIUS) - density_kernel(dist - eps, RADIUS)) / (2.0 * eps);
        let analytic = density_kernel_derivative(dist, RADIUS);
        assert!(
            (numeric - analytic).abs() < 1.0e-2 * analytic.abs(),
            "numeric={numeric}, analytic={analytic}"
        );

        let numeric = (near_density_kernel(dist + eps, RADIUS)
            - near_density_kernel(dist - eps, RADIUS))
            / (2.0 * eps);
        let analytic = near_density_kernel_derivative(dist, RADIUS);
        assert!(
            (numeric - analytic).abs() < 1.0e-2 * analytic.abs(),
            "numeric={numeric}, analytic={analytic}"
        );
    }

    #[test]
    fn degenerate_radius_yields_zero() {
        // A zero or negative radius means "no interaction"; distances are
        // non-negative so the support check already covers it.
        assert_eq!(density_kernel(0.0, 0.0), 0.0);
        assert_eq!(near_density_kernel(0.0, -1.0), 0.0);
        assert_eq!(viscosity_kernel(0.5, 0.0), 0.0);
        assert_eq!(density_kernel_derivative(0.0, 0.0), 0.0);
        assert_eq!(near_density_kernel_derivative(0.0, 0.0), 0.0);
    }
}
