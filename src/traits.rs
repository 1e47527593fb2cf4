use crate::backends::error::BackendsError;
use crate::curves::CurveId;

use std::fmt::Debug;
use std::fmt::Display;
use std::ops::Add;
use std::ops::AddAssign;
use std::ops::Mul;
use std::ops::MulAssign;
use std::ops::Sub;
use std::ops::SubAssign;

use crev_common::Blake2b256;
use sha2::digest::Digest;

pub trait ScalarField:
    Default
    + Sync
    + Send
    + Sized
    + Debug
    + PartialEq
    + Copy
    + Display
    + 'static
    + for<'a> Mul<&'a Self, Output = Self>
    + for<'a> MulAssign<&'a Self>
    + for<'a> Add<&'a Self, Output = Self>
    + for<'a> AddAssign<&'a Self>
    + for<'a> Sub<&'a Self, Output = Self>
    + for<'a> SubAssign<&'a Self>
{
    const SCALAR_SIZE: usize;
    /// Serialized scalar output.
    /// Configured for all implementors as array [0u8; <curve>::<scalar-size>]
    type Serialized: AsRef<[u8]> + Into<Vec<u8>>;

    fn zero() -> Self;
    fn one() -> Self;
    fn random() -> Self;
    fn invert(&self) -> Result<Self, BackendsError>;
    fn negate(self) -> Self;
    fn from_u64(val: u64) -> Self;
    fn to_bytes_be(self) -> Result<Self::Serialized, BackendsError>;
    fn from_bytes_be(bytes: &[u8]) -> Result<Self, BackendsError>;
    fn from_be_bytes_mod_order(bytes: &[u8]) -> Self;

    /// Maps the concatenation of `parts` to a scalar: sha512 reduced modulo the group order.
    fn hash_to_scalar(parts: &[&[u8]]) -> Self {
        let mut h = sha2::Sha512::new();
        for part in parts {
            h.update(part);
        }

        Self::from_be_bytes_mod_order(h.finalize().as_slice())
    }
}

/// Element of a prime order group, kept in projective form by the backends.
pub trait Point:
    Default
    + Clone
    + Sync
    + Send
    + Sized
    + PartialEq
    + Debug
    + Display
    + 'static
    + for<'a> Add<&'a Self, Output = Self>
    + for<'a> AddAssign<&'a Self>
    + for<'a> Sub<&'a Self, Output = Self>
    + for<'a> Mul<&'a Self::Scalar, Output = Self>
    + for<'a> MulAssign<&'a Self::Scalar>
{
    type Scalar: ScalarField;
    /// Serialized point output.
    /// Configured for all implementors as array [0u8; <curve>::<point-size>]
    type Serialized: AsRef<[u8]> + Into<Vec<u8>>;

    fn generator() -> Self;
    fn identity() -> Self;
    fn is_identity(&self) -> bool;
    fn serialize(&self) -> Result<Self::Serialized, BackendsError>;
    fn deserialize(bytes: &[u8]) -> Result<Self, BackendsError>;
    fn hash(&self) -> Result<[u8; 32], BackendsError> {
        let mut hasher = Blake2b256::new();
        hasher.update(self.serialize()?);

        Ok(hasher.finalize().into())
    }
}

/// Curve is the group a key generation session runs over.
pub trait Curve: Sized + Send + Sync + Debug + Clone + Copy + PartialEq + Eq + 'static {
    const ID: CurveId;
    const DST: &'static [u8];
    const POINT_SIZE: usize;

    type Scalar: ScalarField;
    type Point: Point<Scalar = Self::Scalar>;

    /// Hashes `msg` onto the curve. The discrete log of the result is unknown.
    fn hash_to_point(msg: &[u8]) -> Self::Point;

    fn sk_to_pk(sk: &Self::Scalar) -> Self::Point {
        Self::Point::generator() * sk
    }
}
