//! Vector arithmetic used by every relay policy.
//!
//! Positions and displacements share one type. All distances are in the
//! same (unspecified) unit as the coordinates, typically metres.
//!
//! Trigonometry goes through `libm` so the crate stays `no_std`. Angles are
//! returned in degrees and are NaN when either vector has zero length; every
//! caller decides how to resolve that case.

use core::fmt;
use core::ops::{Add, Mul, Neg, Sub};

/// A point or displacement in 3-D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Node positions are plain vectors.
pub type Position = Vector3;

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);

    #[inline]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn dot(self, other: Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    #[inline]
    pub fn length(self) -> f64 {
        libm::sqrt(self.dot(self))
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    #[inline]
    fn add(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    #[inline]
    fn sub(self, rhs: Vector3) -> Vector3 {
        Vector3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    #[inline]
    fn mul(self, rhs: f64) -> Vector3 {
        Vector3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for Vector3 {
    type Output = Vector3;

    #[inline]
    fn neg(self) -> Vector3 {
        Vector3::new(-self.x, -self.y, -self.z)
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: Position, b: Position) -> f64 {
    (b - a).length()
}

/// Signed length of the projection of `a -> c` onto the direction `a -> b`.
///
/// Positive when `c` lies ahead of `a` in the direction of `b`. NaN when
/// `a == b`.
pub fn projection_length(a: Position, b: Position, c: Position) -> f64 {
    let axis = b - a;
    let len = axis.length();
    if len == 0.0 {
        return f64::NAN;
    }
    (c - a).dot(axis) / len
}

/// Angle between two vectors in degrees, in `[0, 180]`.
///
/// The cosine is clamped to `[-1, 1]` before `acos` so that rounding never
/// produces NaN for parallel vectors. Degenerate (zero-length or non-finite)
/// input yields NaN.
pub fn angle_between(v1: Vector3, v2: Vector3) -> f64 {
    let denom = v1.length() * v2.length();
    if denom == 0.0 || !denom.is_finite() {
        return f64::NAN;
    }
    let cos = (v1.dot(v2) / denom).clamp(-1.0, 1.0);
    libm::acos(cos).to_degrees()
}
