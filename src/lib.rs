mod backends;
pub mod adkg;
pub mod config;
pub mod crypto;
pub mod curves;
pub mod ids;
pub mod logging;
pub mod node;
pub mod store;
pub mod traits;

pub use backends::error::BackendsError;
pub use node::Node;

/// BLS12-381 G1 backed by blstrs
#[cfg(feature = "bls12381_blstrs")]
pub type Bls12381 = curves::bls12381::G1;

/// BN254 G1 backed by arkworks
#[cfg(feature = "bn254_arkworks")]
pub type Bn254 = curves::bn254::G1;
