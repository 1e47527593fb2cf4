#[cfg(not(any(feature = "bls12381_blstrs", feature = "bn254_arkworks")))]
compile_error!("At least one of the features 'bls12381_blstrs' or 'bn254_arkworks' must be enabled");

#[cfg(feature = "bls12381_blstrs")]
mod bls12381_blstrs {
    mod g1;
    mod scalar;

    use crate::curves::bls12381;
    super::impl_curve!(bls12381, Bls12381);
}

#[cfg(feature = "bn254_arkworks")]
mod bn254_arkworks {
    mod g1;
    mod scalar;

    use crate::curves::bn254;
    super::impl_curve!(bn254, Bn254);
}

macro_rules! impl_curve {
    ($curve:ident, $id:ident) => {
        use crate::curves::CurveId;
        use crate::traits::Curve;

        impl Curve for $curve::G1 {
            const ID: CurveId = CurveId::$id;
            const DST: &'static [u8] = $curve::DST_G1;
            const POINT_SIZE: usize = $curve::POINT_SIZE_G1;

            type Scalar = scalar::Scalar;
            type Point = g1::G1Point;

            fn hash_to_point(msg: &[u8]) -> Self::Point {
                g1::G1Point::hash_to_curve(msg, $curve::DST_G1)
            }
        }
    };
}

pub(in crate::backends) use impl_curve;
pub mod error;
