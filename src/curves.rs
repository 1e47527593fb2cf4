use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

pub mod bls12381 {
    pub const DST_G1: &[u8] = b"ADKG_BLS12381G1_XMD:SHA-256_SSWU_RO_";
    pub const POINT_SIZE_G1: usize = 48;
    pub const SCALAR_SIZE: usize = 32;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct G1;
}

pub mod bn254 {
    pub const DST_G1: &[u8] = b"ADKG_BN254G1_KECCAK-256_TAI_RO_";
    pub const POINT_SIZE_G1: usize = 64;
    pub const SCALAR_SIZE: usize = 32;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct G1;
}

/// Curve tag carried by session ids and envelopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CurveId {
    Bls12381,
    Bn254,
}

impl Display for CurveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurveId::Bls12381 => f.write_str("bls12381"),
            CurveId::Bn254 => f.write_str("bn254"),
        }
    }
}

impl FromStr for CurveId {
    type Err = UnknownCurve;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bls12381" => Ok(CurveId::Bls12381),
            "bn254" => Ok(CurveId::Bn254),
            other => Err(UnknownCurve(other.to_string())),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("unknown curve: {0}")]
pub struct UnknownCurve(pub String);
