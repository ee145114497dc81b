//! Geometry primitives shared across the generation pipeline.

use bevy::math::DVec2;

/// Quadrant indices used by [`Bounds::quadrant`] and the spatial index:
/// 0 = top-left, 1 = top-right, 2 = bottom-left, 3 = bottom-right.
pub const QUADRANTS: usize = 4;

/// Closed-open axis-aligned rectangle: a point is inside when
/// `min <= p < max` on both axes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: DVec2,
    pub max: DVec2,
}

impl Bounds {
    pub fn new(min: DVec2, max: DVec2) -> Self {
        Self { min, max }
    }

    /// A box with non-positive extent on either axis contains nothing.
    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y
    }

    pub fn contains(&self, p: DVec2) -> bool {
        self.min.x <= p.x && p.x < self.max.x && self.min.y <= p.y && p.y < self.max.y
    }

    /// True when `other` lies entirely within this box.
    pub fn contains_box(&self, other: &Bounds) -> bool {
        self.min.x <= other.min.x
            && self.min.y <= other.min.y
            && other.max.x <= self.max.x
            && other.max.y <= self.max.y
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn centre(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// May produce an empty box when the operands are disjoint.
    pub fn intersect(&self, other: &Bounds) -> Bounds {
        Bounds {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// One of the four midpoint-split quadrants, in `QUADRANTS` order.
    pub fn quadrant(&self, q: usize) -> Bounds {
        let mid = self.centre();
        match q {
            0 => Bounds::new(self.min, mid),
            1 => Bounds::new(DVec2::new(mid.x, self.min.y), DVec2::new(self.max.x, mid.y)),
            2 => Bounds::new(DVec2::new(self.min.x, mid.y), DVec2::new(mid.x, self.max.y)),
            3 => Bounds::new(mid, self.max),
            _ => unreachable!("quadrant index out of range"),
        }
    }
}

/// Signed angle from `a` to `b` in radians, in (-pi, pi].
pub fn vector_angle(a: DVec2, b: DVec2) -> f64 {
    let dot = a.dot(b);
    let det = a.x * b.y - a.y * b.x;
    det.atan2(dot)
}

/// Distance from `p` to the infinite line through `x0` and `x1`.
/// Falls back to point distance when the chord is degenerate.
pub fn perpendicular_distance(p: DVec2, x0: DVec2, x1: DVec2) -> f64 {
    let chord = x1 - x0;
    let len2 = chord.length_squared();
    if len2 <= f64::EPSILON {
        return p.distance(x0);
    }
    let offset = p - x0;
    (chord.x * offset.y - chord.y * offset.x).abs() / len2.sqrt()
}
