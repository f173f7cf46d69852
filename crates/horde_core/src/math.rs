//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation uses fixed-point arithmetic to ensure
//! deterministic behavior across platforms. Floating-point
//! operations can produce different results on different CPUs.
//!
//! World positions are [`Vec3Fixed`] with `z` pointing up. The spatial
//! grid and rectangle selection only look at the ground plane, which is
//! what [`Vec3Fixed::ground`] projects onto.

use fixed::consts;
use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Fixed-point 3D vector for world positions and velocities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec3Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
    /// Z coordinate (height).
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

/// Serde support for fixed-point numbers written as plain decimals.
///
/// Used by hand-edited configuration files (RON), where `500.0` reads
/// better than a raw bit pattern.
pub mod fixed_decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] for points too far apart to represent.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Dot product of two vectors, saturating.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Componentwise absolute value, saturating.
    #[must_use]
    pub fn abs(self) -> Self {
        Self::new(self.x.saturating_abs(), self.y.saturating_abs())
    }

    /// Midpoint between two vectors.
    ///
    /// Halves before adding, so it holds for any pair of representable
    /// points.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new(self.x / 2 + other.x / 2, self.y / 2 + other.y / 2)
    }
}

impl Vec3Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed, z: Fixed) -> Self {
        Self { x, y, z }
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
        z: Fixed::ZERO,
    };

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32, z: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y), Fixed::from_num(z))
    }

    /// Project onto the ground plane.
    #[must_use]
    pub const fn ground(self) -> Vec2Fixed {
        Vec2Fixed::new(self.x, self.y)
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] for points too far apart to represent.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x.saturating_sub(other.x);
        let dy = self.y.saturating_sub(other.y);
        let dz = self.z.saturating_sub(other.z);
        dx.saturating_mul(dx)
            .saturating_add(dy.saturating_mul(dy))
            .saturating_add(dz.saturating_mul(dz))
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.distance_squared(Self::ZERO)
    }

    /// Multiply every component by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(
            self.x.saturating_mul(factor),
            self.y.saturating_mul(factor),
            self.z.saturating_mul(factor),
        )
    }

    /// Normalize vector using fixed-point math.
    ///
    /// Returns zero for a zero-length input.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = fixed_sqrt(self.length_squared());
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len, self.z / len)
    }

    /// Closest point to `point` on the segment from `self` to `end`.
    #[must_use]
    pub fn closest_point_on_segment(self, end: Self, point: Self) -> Self {
        let seg = end - self;
        let len_sq = seg.length_squared();
        if len_sq == Fixed::ZERO {
            return self;
        }

        let rel = point - self;
        let dot = rel
            .x
            .saturating_mul(seg.x)
            .saturating_add(rel.y.saturating_mul(seg.y))
            .saturating_add(rel.z.saturating_mul(seg.z));
        let t = dot.saturating_div(len_sq).clamp(Fixed::ZERO, Fixed::ONE);
        self + seg.scale(t)
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Deterministic on every platform; returns zero for non-positive input.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..64 {
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

/// Sine and cosine of an angle given in degrees.
///
/// Reduces the angle to [-90, 90] and evaluates a Taylor polynomial, so
/// results are bit-identical on every platform.
#[must_use]
pub fn sin_cos_degrees(degrees: Fixed) -> (Fixed, Fixed) {
    (
        sin_degrees(degrees),
        sin_degrees(degrees.saturating_add(Fixed::from_num(90))),
    )
}

fn sin_degrees(degrees: Fixed) -> Fixed {
    let full = Fixed::from_num(360);
    let half = Fixed::from_num(180);
    let quarter = Fixed::from_num(90);

    let mut d = degrees.rem_euclid(full);
    if d > full - quarter {
        d -= full;
    } else if d > quarter {
        d = half - d;
    }

    let x = d * Fixed::from_num(consts::PI) / half;
    let x2 = x * x;

    // x - x^3/3! + x^5/5! - ... through x^11
    let mut term = x;
    let mut sum = x;
    for n in 1..=5i32 {
        term = -term * x2 / Fixed::from_num((2 * n) * (2 * n + 1));
        sum += term;
    }
    sum.clamp(-Fixed::ONE, Fixed::ONE)
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
        }
    }
}

impl std::ops::Add for Vec3Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_add(rhs.x),
            y: self.y.saturating_add(rhs.y),
            z: self.z.saturating_add(rhs.z),
        }
    }
}

impl std::ops::Sub for Vec3Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x.saturating_sub(rhs.x),
            y: self.y.saturating_sub(rhs.y),
            z: self.z.saturating_sub(rhs.z),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(10000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        let dist_sq = a.distance_squared(b);
        // 3² + 4² = 25
        assert_eq!(dist_sq, Fixed::from_num(25));
    }

    #[test]
    fn test_vec2_ops_saturate_at_extremes() {
        let far = Fixed::from_num(1_500_000_000);
        let a = Vec2Fixed::new(-far, Fixed::from_num(-10));
        let b = Vec2Fixed::new(far, Fixed::from_num(10));

        assert_eq!(a.midpoint(b), Vec2Fixed::ZERO);
        assert_eq!((b - a).x, Fixed::MAX);
        assert_eq!((a - b).abs().x, Fixed::MAX);
        assert_eq!((b + b).x, Fixed::MAX);
        assert_eq!(b.dot(b), Fixed::MAX);
    }

    #[test]
    fn test_vec3_distance_squared_saturates() {
        let a = Vec3Fixed::from_ints(-1_000_000, 0, 0);
        let b = Vec3Fixed::from_ints(1_000_000, 0, 0);
        assert_eq!(a.distance_squared(b), Fixed::MAX);
    }

    #[test]
    fn test_fixed_determinism() {
        // Same operations must produce identical results
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);

        let result1 = a * Fixed::from_num(7);
        let result2 = b * Fixed::from_num(7);
        assert_eq!(result1, result2);
    }

    #[test]
    fn test_fixed_sqrt_large_values() {
        let root = fixed_sqrt(Fixed::from_num(250_000_000));
        let expected = Fixed::from_num(15_811);
        assert!((root - expected).abs() < Fixed::ONE);

        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
    }

    #[test]
    fn test_vec3_normalize() {
        let v = Vec3Fixed::from_ints(3, 0, 4);
        let norm = v.normalize();
        assert!((norm.length_squared() - Fixed::ONE).abs() < epsilon());
        assert!((norm.x * Fixed::from_num(4) - norm.z * Fixed::from_num(3)).abs() < epsilon());
        assert_eq!(Vec3Fixed::ZERO.normalize(), Vec3Fixed::ZERO);
    }

    #[test]
    fn test_closest_point_on_segment() {
        let start = Vec3Fixed::from_ints(0, 0, 0);
        let end = Vec3Fixed::from_ints(100, 0, 0);

        let inside = start.closest_point_on_segment(end, Vec3Fixed::from_ints(40, 30, 0));
        assert_eq!(inside, Vec3Fixed::from_ints(40, 0, 0));

        let past_end = start.closest_point_on_segment(end, Vec3Fixed::from_ints(150, 10, 0));
        assert_eq!(past_end, end);
    }

    #[test]
    fn test_sin_cos_cardinal_angles() {
        let cases = [(0, 0, 1), (90, 1, 0), (180, 0, -1), (270, -1, 0), (-90, -1, 0)];
        for (deg, sin, cos) in cases {
            let (s, c) = sin_cos_degrees(Fixed::from_num(deg));
            assert!((s - Fixed::from_num(sin)).abs() < epsilon(), "sin({deg}) = {s}");
            assert!((c - Fixed::from_num(cos)).abs() < epsilon(), "cos({deg}) = {c}");
        }
    }

    #[test]
    fn test_sin_cos_identity() {
        for deg in (-720..720).step_by(17) {
            let (s, c) = sin_cos_degrees(Fixed::from_num(deg));
            let one = s * s + c * c;
            assert!((one - Fixed::ONE).abs() < epsilon(), "angle {deg}");
        }
    }
}
