//! Tensor field implementation for road network generation.
//!
//! Reference: Chen et al. 2008 - "Interactive Procedural Street Modeling"
//! https://www.sci.utah.edu/~chengu/street_sig08/street_sig08.pdf

use std::f64::consts::TAU;
use std::ops::{Add, Mul};

use bevy::math::DVec2;
use bevy::prelude::Resource;
use noise::{NoiseFn, OpenSimplex};

/// Which principal eigenvector of the field a streamline follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Major,
    Minor,
}

impl Direction {
    pub fn flip(self) -> Self {
        match self {
            Direction::Major => Direction::Minor,
            Direction::Minor => Direction::Major,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Direction::Major => 0b10,
            Direction::Minor => 0b01,
        }
    }
}

/// Set of directions packed into two bits. The spatial index uses these
/// masks to prune whole subtrees during queries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DirectionMask(u8);

impl DirectionMask {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b11);

    pub fn contains(self, dir: Direction) -> bool {
        self.0 & dir.bit() != 0
    }

    pub fn intersects(self, other: DirectionMask) -> bool {
        self.0 & other.0 != 0
    }
}

impl From<Direction> for DirectionMask {
    fn from(dir: Direction) -> Self {
        Self(dir.bit())
    }
}

impl std::ops::BitOr for DirectionMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for DirectionMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A 2x2 symmetric traceless matrix
/// `R * [[cos 2t, sin 2t], [sin 2t, -cos 2t]]`, stored as the coupled
/// scalars `(a, b, r, theta)` with `a = r cos 2t`, `b = r sin 2t`.
///
/// `(r, theta)` are re-derived after every mutation of `(a, b)`;
/// eigenvector formulas read `theta` directly and must never see a
/// stale polar form.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tensor {
    a: f64,
    b: f64,
    r: f64,
    theta: f64,
}

impl Tensor {
    pub const ZERO: Self = Self {
        a: 0.0,
        b: 0.0,
        r: 0.0,
        theta: 0.0,
    };

    pub fn from_a_b(a: f64, b: f64) -> Self {
        let mut out = Self { a, b, r: 0.0, theta: 0.0 };
        out.set_r_theta();
        out
    }

    pub fn from_r_theta(r: f64, theta: f64) -> Self {
        Self {
            a: r * (2.0 * theta).cos(),
            b: r * (2.0 * theta).sin(),
            r,
            theta,
        }
    }

    /// Tensor whose major direction is perpendicular to `xy`.
    pub fn from_xy(xy: DVec2) -> Self {
        Self::from_a_b(xy.y * xy.y - xy.x * xy.x, -2.0 * xy.x * xy.y)
    }

    fn set_r_theta(&mut self) {
        self.r = self.a.hypot(self.b);
        self.theta = if self.is_degenerate() {
            0.0
        } else {
            self.b.atan2(self.a) / 2.0
        };
    }

    pub fn r(&self) -> f64 {
        self.r
    }

    pub fn theta(&self) -> f64 {
        self.theta
    }

    /// A degenerate tensor has no well-defined principal direction.
    pub fn is_degenerate(&self) -> bool {
        self.r.abs() <= f64::EPSILON
    }

    pub fn major_eigenvector(&self) -> DVec2 {
        if self.is_degenerate() {
            return DVec2::ZERO;
        }
        DVec2::new(self.theta.cos(), self.theta.sin())
    }

    pub fn minor_eigenvector(&self) -> DVec2 {
        if self.is_degenerate() {
            return DVec2::ZERO;
        }
        DVec2::new(self.theta.sin(), -self.theta.cos())
    }

    pub fn eigenvector(&self, dir: Direction) -> DVec2 {
        match dir {
            Direction::Major => self.major_eigenvector(),
            Direction::Minor => self.minor_eigenvector(),
        }
    }

    pub fn rotate(&self, angle: f64) -> Self {
        Self::from_r_theta(self.r, (self.theta + angle).rem_euclid(TAU))
    }
}

impl Add for Tensor {
    type Output = Tensor;
    fn add(self, other: Tensor) -> Tensor {
        Tensor::from_a_b(self.a + other.a, self.b + other.b)
    }
}

impl Mul<f64> for Tensor {
    type Output = Tensor;
    fn mul(self, scalar: f64) -> Tensor {
        Tensor::from_a_b(scalar * self.a, scalar * self.b)
    }
}

impl Mul<Tensor> for f64 {
    type Output = Tensor;
    fn mul(self, tensor: Tensor) -> Tensor {
        tensor * self
    }
}

/// The shape of a basis field's tensor contribution.
#[derive(Clone, Copy, Debug)]
pub enum BasisKind {
    /// Uniform orientation, the same tensor everywhere.
    Grid { theta: f64 },
    /// Tensors orbiting the centre point.
    Radial,
}

/// A scalar-weighted contribution to the tensor field with a centre, a
/// radius of influence and a decay exponent.
#[derive(Clone, Copy, Debug)]
pub struct BasisField {
    pub centre: DVec2,
    pub size: f64,
    pub decay: f64,
    pub kind: BasisKind,
}

impl BasisField {
    pub fn grid(theta: f64, centre: DVec2, size: f64, decay: f64) -> Self {
        Self {
            centre,
            size,
            decay,
            kind: BasisKind::Grid { theta },
        }
    }

    pub fn radial(centre: DVec2, size: f64, decay: f64) -> Self {
        Self {
            centre,
            size,
            decay,
            kind: BasisKind::Radial,
        }
    }

    pub fn tensor_at(&self, pos: DVec2) -> Tensor {
        match self.kind {
            BasisKind::Grid { theta } => Tensor::from_r_theta(1.0, theta),
            BasisKind::Radial => Tensor::from_xy(pos - self.centre),
        }
    }

    /// Influence of this basis at `pos`. `size == 0` means global reach;
    /// `decay == 0` turns the radius into a hard disc.
    pub fn weight(&self, pos: DVec2) -> f64 {
        if self.size == 0.0 {
            return 1.0;
        }

        let norm_dist = pos.distance(self.centre) / self.size;
        if self.decay == 0.0 && norm_dist >= 1.0 {
            return 0.0;
        }

        let out = (1.0 - norm_dist).max(0.0).powf(self.decay);
        if out.abs() < f64::EPSILON {
            return 0.0;
        }
        out
    }

    pub fn weighted_tensor(&self, pos: DVec2) -> Tensor {
        self.tensor_at(pos) * self.weight(pos)
    }
}

/// The composite field: an ordered sequence of basis fields. Order has
/// no semantic effect (addition commutes) but is kept stable so repeated
/// samples are reproducible bit for bit.
#[derive(Resource, Clone)]
pub struct TensorField {
    basis_fields: Vec<BasisField>,
    noise: OpenSimplex,
}

impl Default for TensorField {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TensorField {
    pub fn new(noise_seed: u32) -> Self {
        Self {
            basis_fields: Vec::new(),
            noise: OpenSimplex::new(noise_seed),
        }
    }

    pub fn clear(&mut self) {
        self.basis_fields.clear();
    }

    pub fn add_basis_field(&mut self, basis: BasisField) {
        self.basis_fields.push(basis);
    }

    /// Accumulated tensor at `pos` with `(r, theta)` re-derived.
    pub fn sample(&self, pos: DVec2) -> Tensor {
        let mut out = Tensor::ZERO;
        for basis in &self.basis_fields {
            out = out + basis.weighted_tensor(pos);
        }
        out
    }

    /// Sample rotated by `strength * noise(pos / size) * pi`, giving
    /// streets a hand-drawn wobble without touching the basis fields.
    pub fn noisy_sample(&self, pos: DVec2, size: f64, strength: f64) -> Tensor {
        let scaled = pos / size;
        let angle = strength * self.noise.get([scaled.x, scaled.y]) * std::f64::consts::PI;
        self.sample(pos).rotate(angle)
    }

    /// Basis centres, exposed for HUD and debug rendering only.
    pub fn basis_centres(&self) -> Vec<DVec2> {
        self.basis_fields.iter().map(|b| b.centre).collect()
    }
}
