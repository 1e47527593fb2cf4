use super::super::error::BackendsError;
use crate::curves::bls12381;
use crate::traits::ScalarField;

use std::fmt::Display;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Neg;
use std::ops::Sub;
use std::ops::SubAssign;

use core::fmt;
use group::ff::Field;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaChaRng;

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Scalar(pub(super) blstrs::Scalar);

impl ScalarField for Scalar {
    const SCALAR_SIZE: usize = bls12381::SCALAR_SIZE;
    type Serialized = [u8; bls12381::SCALAR_SIZE];

    fn one() -> Self {
        Self(blstrs::Scalar::ONE)
    }

    fn random() -> Self {
        let mut rng = ChaChaRng::from_entropy();
        Self(blstrs::Scalar::random(&mut rng))
    }

    fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        let mut sk = blst_lib::blst_scalar::default();
        let mut reduced = blst_lib::blst_fr::default();

        // blst reduces inputs of any length modulo r, so the conversion below is total.
        unsafe {
            let _ = blst_lib::blst_scalar_from_be_bytes(&mut sk, bytes.as_ptr(), bytes.len());
            blst_lib::blst_fr_from_scalar(&mut reduced, &sk);
        }

        Self(blstrs::Scalar::from(reduced))
    }

    fn to_bytes_be(self) -> Result<Self::Serialized, BackendsError> {
        Ok(self.0.to_bytes_be())
    }

    fn from_bytes_be(bytes: &[u8]) -> Result<Self, BackendsError> {
        let bytes: [u8; bls12381::SCALAR_SIZE] = bytes
            .try_into()
            .map_err(|_| BackendsError::ScalarInputLen)?;

        let scalar = blstrs::Scalar::from_bytes_be(&bytes)
            .into_option()
            .ok_or(BackendsError::ScalarDeserialize)?;

        Ok(Self(scalar))
    }

    fn from_u64(val: u64) -> Self {
        Self(blstrs::Scalar::from(val))
    }

    fn invert(&self) -> Result<Self, BackendsError> {
        let scalar = self
            .0
            .invert()
            .into_option()
            .ok_or(BackendsError::ScalarNonInvertable)?;

        Ok(Self(scalar))
    }

    fn negate(self) -> Self {
        Self(self.0.neg())
    }

    fn zero() -> Self {
        Self(blstrs::Scalar::ZERO)
    }
}

impl Mul<&Scalar> for Scalar {
    type Output = Scalar;

    #[inline]
    fn mul(self, rhs: &Scalar) -> Scalar {
        Self(self.0 * rhs.0)
    }
}

impl Add<&Scalar> for Scalar {
    type Output = Scalar;

    #[inline]
    fn add(self, rhs: &Scalar) -> Scalar {
        Self(self.0 + rhs.0)
    }
}

impl Sub<&Scalar> for Scalar {
    type Output = Scalar;

    #[inline]
    fn sub(self, rhs: &Scalar) -> Scalar {
        Self(self.0 - rhs.0)
    }
}

impl MulAssign<&Scalar> for Scalar {
    #[inline]
    fn mul_assign(&mut self, rhs: &Scalar) {
        self.0 *= rhs.0;
    }
}

impl AddAssign<&Scalar> for Scalar {
    #[inline]
    fn add_assign(&mut self, rhs: &Scalar) {
        self.0 += rhs.0;
    }
}

impl SubAssign<&Scalar> for Scalar {
    #[inline]
    fn sub_assign(&mut self, rhs: &Scalar) {
        self.0 -= rhs.0;
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", &hex::encode(self.0.to_bytes_be()))
    }
}
