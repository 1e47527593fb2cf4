use super::scalar::Scalar;
use crate::backends::error::BackendsError;
use crate::curves::bls12381;
use crate::traits::Point;

use core::fmt;
use group::Curve as _;
use group::Group as _;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Sub;

#[derive(Debug, Clone, Copy)]
pub struct G1Point(pub(super) blstrs::G1Projective);

impl Default for G1Point {
    fn default() -> Self {
        Self::identity()
    }
}

impl G1Point {
    pub(in crate::backends) fn hash_to_curve(msg: &[u8], dst: &[u8]) -> Self {
        Self(blstrs::G1Projective::hash_to_curve(msg, dst, &[]))
    }
}

impl Point for G1Point {
    type Scalar = Scalar;
    type Serialized = [u8; bls12381::POINT_SIZE_G1];

    fn generator() -> Self {
        Self(blstrs::G1Projective::generator())
    }

    fn identity() -> Self {
        Self(blstrs::G1Projective::identity())
    }

    fn is_identity(&self) -> bool {
        self.0.is_identity().into()
    }

    fn serialize(&self) -> Result<Self::Serialized, BackendsError> {
        Ok(self.0.to_affine().to_compressed())
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, BackendsError> {
        let bytes: &[u8; bls12381::POINT_SIZE_G1] =
            bytes
                .try_into()
                .map_err(|_| BackendsError::PointInputLen {
                    expected: bls12381::POINT_SIZE_G1,
                    received: bytes.len(),
                })?;

        // from_compressed checks both curve and subgroup membership
        let point = blstrs::G1Affine::from_compressed(bytes)
            .into_option()
            .ok_or(BackendsError::PointDeserialize)?;

        Ok(Self(point.into()))
    }
}

impl Add<&G1Point> for G1Point {
    type Output = G1Point;

    #[inline]
    fn add(self, rhs: &G1Point) -> G1Point {
        Self(self.0 + rhs.0)
    }
}

impl Sub<&G1Point> for G1Point {
    type Output = G1Point;

    #[inline]
    fn sub(self, rhs: &G1Point) -> G1Point {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign<&G1Point> for G1Point {
    #[inline]
    fn add_assign(&mut self, rhs: &G1Point) {
        self.0 += rhs.0;
    }
}

impl Mul<&Scalar> for G1Point {
    type Output = G1Point;

    #[inline]
    fn mul(self, rhs: &Scalar) -> G1Point {
        Self(self.0 * rhs.0)
    }
}

impl MulAssign<&Scalar> for G1Point {
    #[inline]
    fn mul_assign(&mut self, rhs: &Scalar) {
        self.0 *= rhs.0;
    }
}

impl PartialEq for G1Point {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}

impl fmt::Display for G1Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0.to_affine().to_compressed()))
    }
}
