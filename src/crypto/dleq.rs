use crate::traits::Curve;
use crate::traits::Point;
use crate::traits::ScalarField;

// Chaum-Pedersen proof that log_g(G) == log_h(H) without revealing the exponent.
// ref: https://github.com/dedis/kyber/blob/master/proof/dleq/dleq.go

/// To simplify error nesting structures, the [`DleqError`] has prefixes on variants `Prove` and `Verify`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DleqError {
    #[error("prove: failed to serialize statement")]
    ProveSerialize,
    #[error("verify: failed to serialize statement")]
    VerifySerialize,
    #[error("invalid proof lenght: expected {expected}, received {received}")]
    InvalidLenght { expected: usize, received: usize },
    #[error("failed to deserialize commitment")]
    DeserializeCommitment,
    #[error("failed to deserialize response")]
    DeserializeResponse,
    #[error("proof serialization failed")]
    Serialize,
    #[error("proof is invalid")]
    InvalidProof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DleqProof<C: Curve> {
    /// g^r
    pub a: C::Point,
    /// h^r
    pub b: C::Point,
    /// r - c*x
    pub s: C::Scalar,
}

fn challenge<C: Curve>(points: [&C::Point; 6]) -> Option<C::Scalar> {
    let mut bytes: Vec<Vec<u8>> = Vec::with_capacity(points.len());
    for p in points {
        bytes.push(p.serialize().ok()?.into());
    }
    let parts: Vec<&[u8]> = bytes.iter().map(Vec::as_slice).collect();

    Some(C::Scalar::hash_to_scalar(&parts))
}

impl<C: Curve> DleqProof<C> {
    /// Proves knowledge of `x` such that `big_g = g^x` and `big_h = h^x`.
    pub fn prove(
        g: &C::Point,
        h: &C::Point,
        x: &C::Scalar,
    ) -> Result<(Self, C::Point, C::Point), DleqError> {
        let big_g = g.clone() * x;
        let big_h = h.clone() * x;

        let r = C::Scalar::random();
        let a = g.clone() * &r;
        let b = h.clone() * &r;

        let c = challenge::<C>([g, &big_g, h, &big_h, &a, &b]).ok_or(DleqError::ProveSerialize)?;
        let s = r - &(c * x);

        Ok((Self { a, b, s }, big_g, big_h))
    }

    pub fn verify(
        &self,
        g: &C::Point,
        big_g: &C::Point,
        h: &C::Point,
        big_h: &C::Point,
    ) -> Result<(), DleqError> {
        let c = challenge::<C>([g, big_g, h, big_h, &self.a, &self.b])
            .ok_or(DleqError::VerifySerialize)?;

        // a == g^s * G^c
        let a = g.clone() * &self.s + &(big_g.clone() * &c);
        // b == h^s * H^c
        let b = h.clone() * &self.s + &(big_h.clone() * &c);

        if a != self.a || b != self.b {
            return Err(DleqError::InvalidProof);
        }

        Ok(())
    }

    /// Encoding: a || b || s
    pub fn to_bytes(&self) -> Result<Vec<u8>, DleqError> {
        let mut out: Vec<u8> = self.a.serialize().map_err(|_| DleqError::Serialize)?.into();
        out.extend_from_slice(self.b.serialize().map_err(|_| DleqError::Serialize)?.as_ref());
        out.extend_from_slice(self.s.to_bytes_be().map_err(|_| DleqError::Serialize)?.as_ref());

        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DleqError> {
        let expected = 2 * C::POINT_SIZE + C::Scalar::SCALAR_SIZE;
        if bytes.len() != expected {
            return Err(DleqError::InvalidLenght {
                expected,
                received: bytes.len(),
            });
        }
        let (a, rest) = bytes.split_at(C::POINT_SIZE);
        let (b, s) = rest.split_at(C::POINT_SIZE);

        Ok(Self {
            a: C::Point::deserialize(a).map_err(|_| DleqError::DeserializeCommitment)?,
            b: C::Point::deserialize(b).map_err(|_| DleqError::DeserializeCommitment)?,
            s: C::Scalar::from_bytes_be(s).map_err(|_| DleqError::DeserializeResponse)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Generators;
    use crate::Bls12381;
    use crate::Bn254;

    fn prove_and_verify<C: Curve>() {
        let gens = Generators::<C>::new();
        let x = C::Scalar::random();
        let (proof, gx, hx) = DleqProof::<C>::prove(&gens.g, &gens.h, &x).unwrap();
        assert!(proof.verify(&gens.g, &gx, &gens.h, &hx).is_ok());

        let bytes = proof.to_bytes().unwrap();
        assert_eq!(bytes.len(), 2 * C::POINT_SIZE + C::Scalar::SCALAR_SIZE);
        let decoded = DleqProof::<C>::from_bytes(&bytes).unwrap();
        assert!(decoded.verify(&gens.g, &gx, &gens.h, &hx).is_ok());
    }

    #[test]
    fn valid_proofs() {
        prove_and_verify::<Bls12381>();
        prove_and_verify::<Bn254>();
    }

    #[test]
    fn unequal_logs_are_rejected() {
        let gens = Generators::<Bn254>::new();
        let x = <Bn254 as Curve>::Scalar::random();
        let (proof, gx, _) = DleqProof::<Bn254>::prove(&gens.g, &gens.h, &x).unwrap();

        let other = gens.h.clone() * &<Bn254 as Curve>::Scalar::random();
        assert_eq!(
            proof.verify(&gens.g, &gx, &gens.h, &other),
            Err(DleqError::InvalidProof)
        );
        // statement bound to the bases
        assert_eq!(
            proof.verify(&gens.h, &gx, &gens.g, &other),
            Err(DleqError::InvalidProof)
        );
        assert!(matches!(
            DleqProof::<Bn254>::from_bytes(&[0u8; 10]),
            Err(DleqError::InvalidLenght { .. })
        ));
    }
}
