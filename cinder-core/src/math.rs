//! Angle newtypes. Keeping degrees and radians as distinct types makes
//! unit mix-ups a compile error instead of a visual glitch.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Radians(f32);

#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Degree(f32);

impl Radians {
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }

    pub fn clamp(self, min: Radians, max: Radians) -> Self {
        Self(self.0.clamp(min.0, max.0))
    }
}

impl Degree {
    pub const fn new(value: f32) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl From<f32> for Radians {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

impl From<f32> for Degree {
    fn from(value: f32) -> Self {
        Self(value)
    }
}

impl From<Degree> for Radians {
    fn from(deg: Degree) -> Self {
        Self(deg.0.to_radians())
    }
}

impl From<Radians> for Degree {
    fn from(rad: Radians) -> Self {
        Self(rad.0.to_degrees())
    }
}

impl From<Radians> for f32 {
    fn from(rad: Radians) -> Self {
        rad.0
    }
}

impl Add for Radians {
    type Output = Radians;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Radians {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Radians {
    type Output = Radians;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for Radians {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Mul<f32> for Radians {
    type Output = Radians;
    fn mul(self, rhs: f32) -> Self {
        Self(self.0 * rhs)
    }
}

impl Neg for Radians {
    type Output = Radians;
    fn neg(self) -> Self {
        Self(-self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_radian_round_trip() {
        let deg = Degree::new(180.0);
        let rad: Radians = deg.into();
        assert!((rad.value() - std::f32::consts::PI).abs() < 1e-6);

        let back: Degree = rad.into();
        assert!((back.value() - 180.0).abs() < 1e-4);
    }

    #[test]
    fn clamp_limits_pitch() {
        let max = Radians::new(1.0);
        assert_eq!(Radians::new(2.0).clamp(-max, max), max);
        assert_eq!(Radians::new(-2.0).clamp(-max, max), -max);
    }
}
