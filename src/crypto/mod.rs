pub mod dleq;
pub mod ecies;
pub mod erasure;
pub mod poly;

use crate::traits::Curve;
use crate::traits::Point;

use sha3::Digest;
use sha3::Keccak256;

const FELDMAN_BASE_MSG: &[u8] = b"ADKG_FELDMAN_BASE";

/// Generators of a session. `g` commits polynomials and coin keys, `h` is the base of
/// long-term node keys and of the final group key. Nobody knows log_h(g).
#[derive(Debug, Clone)]
pub struct Generators<C: Curve> {
    pub g: C::Point,
    pub h: C::Point,
}

impl<C: Curve> Generators<C> {
    pub fn new() -> Self {
        Self {
            g: C::hash_to_point(FELDMAN_BASE_MSG),
            h: C::Point::generator(),
        }
    }
}

impl<C: Curve> Default for Generators<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Keccak256 of an arbitrary payload, used to bind RBC shards to the dealt value.
pub fn payload_hash(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}
