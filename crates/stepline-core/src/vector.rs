//! Three-axis vector arithmetic
//!
//! Positions, velocities and accelerations of the arm are all expressed
//! as [`V3`], a fixed-size vector indexed by [`Axis`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Index, IndexMut, Mul, Neg, Sub};

/// Number of controlled axes
pub const AXES: usize = 3;

/// A machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// First horizontal axis
    X,
    /// Second horizontal axis
    Y,
    /// Vertical axis
    Z,
}

impl Axis {
    /// All axes in wire order
    pub const ALL: [Axis; AXES] = [Axis::X, Axis::Y, Axis::Z];

    /// Index of the axis in a [`V3`]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "X"),
            Axis::Y => write!(f, "Y"),
            Axis::Z => write!(f, "Z"),
        }
    }
}

/// A 3-axis vector of `f64`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct V3(pub [f64; AXES]);

impl V3 {
    /// The zero vector
    pub const ZERO: V3 = V3([0.0; AXES]);

    /// Create a vector from its components
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        V3([x, y, z])
    }

    /// Vector with all components set to `value`
    pub const fn splat(value: f64) -> Self {
        V3([value; AXES])
    }

    /// X component
    pub fn x(&self) -> f64 {
        self.0[0]
    }

    /// Y component
    pub fn y(&self) -> f64 {
        self.0[1]
    }

    /// Z component
    pub fn z(&self) -> f64 {
        self.0[2]
    }

    /// Apply `f` to every component
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        V3(self.0.map(f))
    }

    /// Combine two vectors component by component
    pub fn zip(self, other: V3, f: impl Fn(f64, f64) -> f64) -> Self {
        V3([
            f(self.0[0], other.0[0]),
            f(self.0[1], other.0[1]),
            f(self.0[2], other.0[2]),
        ])
    }

    /// Dot product
    pub fn dot(&self, other: &V3) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    /// Cross product
    pub fn cross(&self, other: &V3) -> V3 {
        let [ax, ay, az] = self.0;
        let [bx, by, bz] = other.0;
        V3([ay * bz - az * by, az * bx - ax * bz, ax * by - ay * bx])
    }

    /// Euclidean length
    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector
    pub fn normalize(&self) -> V3 {
        let n = self.norm();
        if n > 0.0 {
            *self / n
        } else {
            V3::ZERO
        }
    }

    /// Euclidean distance to `other`
    pub fn distance(&self, other: &V3) -> f64 {
        (*other - *self).norm()
    }

    /// Component-wise product
    pub fn hadamard(&self, other: &V3) -> V3 {
        self.zip(*other, |a, b| a * b)
    }

    /// Component-wise absolute value
    pub fn abs(&self) -> V3 {
        self.map(f64::abs)
    }

    /// Largest component
    pub fn max_element(&self) -> f64 {
        self.0.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Smallest component
    pub fn min_element(&self) -> f64 {
        self.0.iter().copied().fold(f64::INFINITY, f64::min)
    }

    /// True when every component is finite
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Iterate over `(axis, component)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL.into_iter().map(move |axis| (axis, self.0[axis.index()]))
    }
}

impl fmt::Display for V3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6}, {:.6})", self.0[0], self.0[1], self.0[2])
    }
}

impl From<[f64; AXES]> for V3 {
    fn from(v: [f64; AXES]) -> Self {
        V3(v)
    }
}

impl Index<usize> for V3 {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.0[index]
    }
}

impl IndexMut<usize> for V3 {
    fn index_mut(&mut self, index: usize) -> &mut f64 {
        &mut self.0[index]
    }
}

impl Index<Axis> for V3 {
    type Output = f64;

    fn index(&self, axis: Axis) -> &f64 {
        &self.0[axis.index()]
    }
}

impl Add for V3 {
    type Output = V3;

    fn add(self, rhs: V3) -> V3 {
        self.zip(rhs, |a, b| a + b)
    }
}

impl AddAssign for V3 {
    fn add_assign(&mut self, rhs: V3) {
        *self = *self + rhs;
    }
}

impl Sub for V3 {
    type Output = V3;

    fn sub(self, rhs: V3) -> V3 {
        self.zip(rhs, |a, b| a - b)
    }
}

impl Neg for V3 {
    type Output = V3;

    fn neg(self) -> V3 {
        self.map(|v| -v)
    }
}

impl Mul<f64> for V3 {
    type Output = V3;

    fn mul(self, rhs: f64) -> V3 {
        self.map(|v| v * rhs)
    }
}

impl Div<f64> for V3 {
    type Output = V3;

    fn div(self, rhs: f64) -> V3 {
        self.map(|v| v / rhs)
    }
}
