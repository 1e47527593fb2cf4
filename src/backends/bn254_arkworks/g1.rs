use super::super::error::BackendsError;
use super::scalar::Scalar;

use crate::curves::bn254;
use crate::traits::Point;

use ark_bn254 as ark_curve;
use ark_ec::AffineRepr;
use ark_ec::CurveGroup;
use ark_ec::PrimeGroup;
use ark_ff::PrimeField;
use ark_serialize::CanonicalDeserialize;
use ark_serialize::CanonicalSerialize;
use ark_std::Zero;
use sha3::Digest;
use sha3::Keccak256;

use std::fmt::Display;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Sub;

#[derive(Debug, Clone, Copy, Default)]
pub struct G1Point(pub(super) ark_curve::G1Projective);

impl G1Point {
    /// Try-and-increment: hash (dst, msg, counter) to an x coordinate until it lands on the curve.
    /// G1 of bn254 has cofactor one, so every curve point is in the prime order group.
    pub(in crate::backends) fn hash_to_curve(msg: &[u8], dst: &[u8]) -> Self {
        let mut counter: u32 = 0;
        loop {
            let digest = Keccak256::new()
                .chain_update(dst)
                .chain_update(msg)
                .chain_update(counter.to_be_bytes())
                .finalize();
            let x = <ark_curve::Fq as PrimeField>::from_be_bytes_mod_order(&digest);

            if let Some(point) =
                ark_curve::G1Affine::get_point_from_x_unchecked(x, digest[31] & 1 == 1)
            {
                return Self(point.into_group());
            }
            counter = counter.wrapping_add(1);
        }
    }
}

impl Point for G1Point {
    type Scalar = Scalar;
    type Serialized = [u8; bn254::POINT_SIZE_G1];

    fn generator() -> Self {
        Self(ark_curve::G1Projective::generator())
    }

    fn identity() -> Self {
        Self(ark_curve::G1Projective::zero())
    }

    fn is_identity(&self) -> bool {
        self.0.is_zero()
    }

    fn serialize(&self) -> Result<Self::Serialized, BackendsError> {
        let mut bytes: Self::Serialized = [0; bn254::POINT_SIZE_G1];

        self.0
            .into_affine()
            .serialize_uncompressed(&mut bytes.as_mut_slice())
            .map_err(|_| BackendsError::PointSerialize)?;

        bytes[..bn254::POINT_SIZE_G1 / 2].reverse();
        bytes[bn254::POINT_SIZE_G1 / 2..].reverse();

        Ok(bytes)
    }

    fn deserialize(bytes: &[u8]) -> Result<Self, BackendsError> {
        let mut bytes: [u8; bn254::POINT_SIZE_G1] =
            bytes
                .try_into()
                .map_err(|_| BackendsError::PointInputLen {
                    expected: bn254::POINT_SIZE_G1,
                    received: bytes.len(),
                })?;

        bytes[..bn254::POINT_SIZE_G1 / 2].reverse();
        bytes[bn254::POINT_SIZE_G1 / 2..].reverse();

        let point: ark_curve::G1Affine =
            CanonicalDeserialize::deserialize_uncompressed(bytes.as_slice())
                .map_err(|_| BackendsError::PointDeserialize)?;

        Ok(Self(point.into_group()))
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

impl Display for G1Point {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.serialize() {
            Ok(bytes) => f.write_str(&hex::encode(bytes)),
            Err(err) => write!(f, "Display: error serializing point: {}", err),
        }
    }
}
