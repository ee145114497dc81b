//! Numerical integrators that walk streamlines through the tensor field.

use bevy::math::DVec2;

use crate::tensor::{Direction, TensorField};

/// Produces one integration delta along a principal direction of the
/// field. A zero-length delta signals a degenerate sample; callers must
/// treat it as an abort condition.
pub trait FieldIntegrator {
    fn integrate(&self, pos: DVec2, dir: Direction, dl: f64) -> DVec2;
}

/// Quasi-RK4 integrator. The blend `k1 + 4*k2 + k4/6` is not the
/// textbook weighting; it is kept as-is because the street curvature it
/// produces is part of the generator's tuning.
pub struct Rk4Integrator {
    field: TensorField,
}

impl Rk4Integrator {
    pub fn new(field: TensorField) -> Self {
        Self { field }
    }

    pub fn field(&self) -> &TensorField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut TensorField {
        &mut self.field
    }
}

impl FieldIntegrator for Rk4Integrator {
    fn integrate(&self, pos: DVec2, dir: Direction, dl: f64) -> DVec2 {
        let dx = DVec2::splat(dl);

        let k1 = self.field.sample(pos).eigenvector(dir);
        let k2 = self.field.sample(pos + dx / 2.0).eigenvector(dir);
        let k4 = self.field.sample(pos + dx).eigenvector(dir);

        k1 + k2 * 4.0 + k4 / 6.0
    }
}

/// Same blend as [`Rk4Integrator`] but sampling through
/// [`TensorField::noisy_sample`], so streets wobble organically. With a
/// zero `noise_size` it degrades to the plain integrator.
pub struct NoisyRk4Integrator {
    field: TensorField,
    pub noise_size: f64,
    pub noise_angle: f64,
}

impl NoisyRk4Integrator {
    pub fn new(field: TensorField, noise_size: f64, noise_angle: f64) -> Self {
        Self {
            field,
            noise_size,
            noise_angle,
        }
    }

    pub fn field(&self) -> &TensorField {
        &self.field
    }

    pub fn field_mut(&mut self) -> &mut TensorField {
        &mut self.field
    }

    fn vector(&self, pos: DVec2, dir: Direction) -> DVec2 {
        if self.noise_size > 0.0 {
            self.field
                .noisy_sample(pos, self.noise_size, self.noise_angle)
                .eigenvector(dir)
        } else {
            self.field.sample(pos).eigenvector(dir)
        }
    }
}

impl FieldIntegrator for NoisyRk4Integrator {
    fn integrate(&self, pos: DVec2, dir: Direction, dl: f64) -> DVec2 {
        let dx = DVec2::splat(dl);

        let k1 = self.vector(pos, dir);
        let k2 = self.vector(pos + dx / 2.0, dir);
        let k4 = self.vector(pos + dx, dir);

        k1 + k2 * 4.0 + k4 / 6.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::BasisField;

    fn uniform_grid_field(theta: f64) -> TensorField {
        let mut field = TensorField::default();
        field.add_basis_field(BasisField::grid(theta, DVec2::ZERO, 0.0, 0.0));
        field
    }

    #[test]
    fn uniform_field_integrates_along_the_major_axis() {
        let integrator = Rk4Integrator::new(uniform_grid_field(0.0));
        let delta = integrator.integrate(DVec2::new(50.0, 50.0), Direction::Major, 1.0);
        // all three samples agree, so the blend collapses to (1 + 4 + 1/6) * e
        assert!((delta.x - 31.0 / 6.0).abs() < 1e-12);
        assert!(delta.y.abs() < 1e-12);
    }

    #[test]
    fn minor_direction_is_perpendicular() {
        let integrator = Rk4Integrator::new(uniform_grid_field(0.0));
        let major = integrator.integrate(DVec2::ZERO, Direction::Major, 1.0);
        let minor = integrator.integrate(DVec2::ZERO, Direction::Minor, 1.0);
        assert!(major.dot(minor).abs() < 1e-9);
        assert!(minor.x.abs() < 1e-12);
    }

    #[test]
    fn empty_field_yields_zero_delta() {
        let integrator = Rk4Integrator::new(TensorField::default());
        let delta = integrator.integrate(DVec2::new(3.0, 4.0), Direction::Major, 1.0);
        assert_eq!(delta, DVec2::ZERO);
    }

    #[test]
    fn noisy_integrator_with_zero_noise_matches_plain() {
        let plain = Rk4Integrator::new(uniform_grid_field(0.3));
        let noisy = NoisyRk4Integrator::new(uniform_grid_field(0.3), 0.0, 0.0);
        let p = DVec2::new(17.0, -4.0);
        let a = plain.integrate(p, Direction::Major, 1.0);
        let b = noisy.integrate(p, Direction::Major, 1.0);
        assert!((a - b).length() < 1e-12);
    }
}
