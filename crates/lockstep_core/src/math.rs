//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation-path math uses fixed-point arithmetic so that every
//! peer computes bit-identical results. Floating-point operations can
//! produce different results on different CPUs and must never feed a
//! value that contributes to the state hash.
//!
//! Range checks compare squared magnitudes ([`Vec2Fixed::fast_magnitude`],
//! [`Vec2Fixed::fast_distance`]) against squared thresholds so that no
//! square root is needed on the hot path.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// One unit is `2^32` in raw representation.
pub type Fixed = I32F32;

/// Number of fractional bits in [`Fixed`].
pub const FRACTIONAL_BITS: u32 = 32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Fixed-point 3D vector (ground plane plus height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate (ground plane).
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Height above the ground plane.
    #[serde(with = "fixed_serde")]
    pub z: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> Fixed {
    Fixed::from_num(n)
}

/// Create a fixed-point number from a ratio of integers (`num / den`).
///
/// Used for data constants such as "half a unit" without touching floats.
#[must_use]
pub fn fixed_ratio(num: i32, den: i32) -> Fixed {
    Fixed::from_num(num) / Fixed::from_num(den)
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Returns zero for zero or negative input.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = low + (high - low) / 2;
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl Vec2Fixed {
    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector along +X. Default facing for new agents.
    pub const RIGHT: Self = Self {
        x: Fixed::ONE,
        y: Fixed::ZERO,
    };

    /// Unit vector along +Y.
    pub const UP: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ONE,
    };

    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_int(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Squared length. Cheap path for range comparisons.
    ///
    /// Saturates at `Fixed::MAX` once the length passes about 46341 units,
    /// so very distant points still compare as out of range.
    #[must_use]
    pub fn fast_magnitude(self) -> Fixed {
        self.x
            .saturating_mul(self.x)
            .saturating_add(self.y.saturating_mul(self.y))
    }

    /// Squared distance to another point.
    #[must_use]
    pub fn fast_distance(self, other: Self) -> Fixed {
        (self - other).fast_magnitude()
    }

    /// Length of the vector.
    #[must_use]
    pub fn magnitude(self) -> Fixed {
        fixed_sqrt(self.fast_magnitude())
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component of the 3D cross product).
    ///
    /// Positive when `other` lies counter-clockwise from `self`.
    #[must_use]
    pub fn cross(self, other: Self) -> Fixed {
        self.x * other.y - self.y * other.x
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Normalize, returning the unit vector and the original magnitude.
    ///
    /// The zero vector normalizes to `(ZERO, 0)`.
    #[must_use]
    pub fn normalize_with_magnitude(self) -> (Self, Fixed) {
        let len = self.magnitude();
        if len == Fixed::ZERO {
            return (Self::ZERO, Fixed::ZERO);
        }
        (Self::new(self.x / len, self.y / len), len)
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        self.normalize_with_magnitude().0
    }

    /// Perpendicular vector (rotated 90 degrees counter-clockwise).
    #[must_use]
    pub fn perpendicular(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Rotate a unit `self` towards unit `target` by at most `max_step`.
    ///
    /// `max_step` is measured along the perpendicular, so it approximates the
    /// sine of the turn angle. When the remaining sideways offset is within
    /// `max_step` and the target is in front, the result snaps to `target`.
    #[must_use]
    pub fn rotate_towards(self, target: Self, max_step: Fixed) -> Self {
        let side = self.cross(target);
        if side.abs() <= max_step && self.dot(target) > Fixed::ZERO {
            return target;
        }
        let step = if side >= Fixed::ZERO { max_step } else { -max_step };
        let turned = self + self.perpendicular().scale(step);
        let normalized = turned.normalize();
        if normalized == Self::ZERO {
            self
        } else {
            normalized
        }
    }

    /// Deterministic hash of the raw bits.
    #[must_use]
    pub fn state_hash(self) -> i64 {
        let x = self.x.to_bits();
        let y = self.y.to_bits();
        x.wrapping_mul(31).wrapping_add(y.rotate_left(17)) ^ (y >> 7)
    }
}

impl Vec3Fixed {
    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Create a new fixed-point 3D vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Lift a ground-plane vector to the given height.
    #[must_use]
    pub const fn from_2d(v: Vec2Fixed, z: Fixed) -> Self {
        Self { x: v.x, y: v.y, z }
    }

    /// Drop the height component.
    #[must_use]
    pub const fn to_2d(self) -> Vec2Fixed {
        Vec2Fixed { x: self.x, y: self.y }
    }

    /// Squared length.
    #[must_use]
    pub fn fast_magnitude(self) -> Fixed {
        self.x * self.x + self.y * self.y + self.z * self.z
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::Neg for Vec2Fixed {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
            z: self.z - rhs.z,
        }
    }
}
