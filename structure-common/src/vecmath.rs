use serde::{Deserialize, Serialize};

// Basic 3D vector type used for positions and bond vectors.
#[derive(Copy, Clone, Default, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    #[inline(always)]
    pub fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }
    #[inline(always)]
    pub fn zero() -> Self { Self::new(0.0, 0.0, 0.0) }
    #[inline(always)]
    pub fn splat(v: f64) -> Self { Self::new(v, v, v) }
    #[inline(always)]
    pub fn from_array(a: [f64; 3]) -> Self { Self::new(a[0], a[1], a[2]) }
    #[inline(always)]
    pub fn to_array(self) -> [f64; 3] { [self.x, self.y, self.z] }

    #[inline(always)]
    pub fn length_squared(self) -> f64 { self.x * self.x + self.y * self.y + self.z * self.z }
    #[inline(always)]
    pub fn length(self) -> f64 { self.length_squared().sqrt() }
    #[inline(always)]
    pub fn distance_squared(self, other: Self) -> f64 { self.sub(other).length_squared() }
    #[inline(always)]
    pub fn distance(self, other: Self) -> f64 { self.distance_squared(other).sqrt() }

    #[inline(always)]
    pub fn add(self, other: Self) -> Self { Self::new(self.x + other.x, self.y + other.y, self.z + other.z) }
    #[inline(always)]
    pub fn sub(self, other: Self) -> Self { Self::new(self.x - other.x, self.y - other.y, self.z - other.z) }
    #[inline(always)]
    pub fn scale(self, scalar: f64) -> Self { Self::new(self.x * scalar, self.y * scalar, self.z * scalar) }
    /// Componentwise product.
    #[inline(always)]
    pub fn mul(self, other: Self) -> Self { Self::new(self.x * other.x, self.y * other.y, self.z * other.z) }
    #[inline(always)]
    pub fn dot(self, other: Self) -> f64 { self.x * other.x + self.y * other.y + self.z * other.z }
    #[inline(always)]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    #[inline(always)]
    pub fn min_element(self) -> f64 { self.x.min(self.y).min(self.z) }

    /// Applies `f` to each component.
    #[inline(always)]
    pub fn map(self, mut f: impl FnMut(f64) -> f64) -> Self { Self::new(f(self.x), f(self.y), f(self.z)) }
    /// Applies `f` pairwise to the components of `self` and `other`.
    #[inline(always)]
    pub fn zip_map(self, other: Self, mut f: impl FnMut(f64, f64) -> f64) -> Self {
        Self::new(f(self.x, other.x), f(self.y, other.y), f(self.z, other.z))
    }
}
