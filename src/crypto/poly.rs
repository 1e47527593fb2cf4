use crate::backends::error::BackendsError;
use crate::traits::Curve;
use crate::traits::Point;
use crate::traits::ScalarField;

use std::collections::BTreeSet;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PolyError {
    #[error("threshold must be at least 1 and at most n, threshold: {threshold}, n: {n}")]
    InvalidThreshold { threshold: usize, n: usize },
    #[error("share index 0 is reserved for the secret")]
    ZeroIndex,
    #[error("duplicated share index: {0}")]
    DuplicateIndex(u32),
    #[error("not enough shares to recover: expected {expected}, received {received}")]
    NotEnoughShares { expected: usize, received: usize },
    #[error("commitments lenght {received} is not a multiple of point size {point_size}")]
    CommitmentsLenght { received: usize, point_size: usize },
    #[error("expected {expected} commitments, received {received}")]
    CommitmentsCount { expected: usize, received: usize },
    #[error("failed to serialize commitments: {0}")]
    Serialize(BackendsError),
    #[error("failed to deserialize commitment: {0}")]
    Deserialize(BackendsError),
    #[error("lagrange basis is not invertable")]
    NonInvertable,
}

/// Evaluation of a private polynomial at x = i. The index is never 0.
#[derive(Debug, Clone, PartialEq)]
pub struct PriShare<S: ScalarField> {
    pub i: u32,
    pub v: S,
}

impl<S: ScalarField> PriShare<S> {
    pub fn value(&self) -> &S {
        &self.v
    }
}

#[derive(Debug)]
pub struct PriPoly<C: Curve> {
    coeffs: Vec<C::Scalar>,
}

impl<C: Curve> PriPoly<C> {
    /// Random polynomial of degree `threshold - 1` hiding `secret` as constant term.
    pub fn with_secret(secret: C::Scalar, threshold: usize) -> Self {
        let mut coeffs = Vec::with_capacity(threshold);
        coeffs.push(secret);
        for _ in 1..threshold {
            coeffs.push(ScalarField::random())
        }

        Self { coeffs }
    }

    pub fn eval(&self, i: u32) -> PriShare<C::Scalar> {
        let xi = C::Scalar::from_u64(i.into());
        let mut v = C::Scalar::zero();
        for coeff in self.coeffs.iter().rev() {
            v *= &xi;
            v += coeff;
        }

        PriShare { i, v }
    }

    pub fn commit(&self, base: &C::Point) -> PubPoly<C> {
        let commits = self.coeffs.iter().map(|c| base.clone() * c).collect();

        PubPoly { commits }
    }

    pub fn secret(&self) -> &C::Scalar {
        &self.coeffs[0]
    }

    pub fn threshold(&self) -> usize {
        self.coeffs.len()
    }
}

/// Feldman commitments to the coefficients of a private polynomial.
#[derive(Debug, Clone, PartialEq)]
pub struct PubPoly<C: Curve> {
    pub commits: Vec<C::Point>,
}

impl<C: Curve> PubPoly<C> {
    pub fn eval(&self, i: u32) -> C::Point {
        let xi = C::Scalar::from_u64(i.into());
        let mut v = C::Point::identity();
        for commit in self.commits.iter().rev() {
            v *= &xi;
            v += commit;
        }

        v
    }

    /// Checks `base^share == sum(commits[j] * i^j)`.
    pub fn verify_share(&self, base: &C::Point, share: &PriShare<C::Scalar>) -> bool {
        share.i != 0 && base.clone() * share.value() == self.eval(share.i)
    }

    pub fn public_key(&self) -> Option<&C::Point> {
        self.commits.first()
    }

    pub fn threshold(&self) -> usize {
        self.commits.len()
    }

    /// Fixed width encoding: commitments concatenated in order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, PolyError> {
        let mut out = Vec::with_capacity(self.commits.len() * C::POINT_SIZE);
        for c in &self.commits {
            out.extend_from_slice(c.serialize().map_err(PolyError::Serialize)?.as_ref());
        }

        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8], threshold: usize) -> Result<Self, PolyError> {
        if bytes.len() % C::POINT_SIZE != 0 {
            return Err(PolyError::CommitmentsLenght {
                received: bytes.len(),
                point_size: C::POINT_SIZE,
            });
        }
        let count = bytes.len() / C::POINT_SIZE;
        if count != threshold {
            return Err(PolyError::CommitmentsCount {
                expected: threshold,
                received: count,
            });
        }

        let commits = bytes
            .chunks_exact(C::POINT_SIZE)
            .map(|chunk| C::Point::deserialize(chunk).map_err(PolyError::Deserialize))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { commits })
    }
}

/// Shamir split of `secret` into `n` shares at x = 1..=n, any `threshold` of which recover it.
pub fn split<C: Curve>(
    secret: C::Scalar,
    threshold: usize,
    n: usize,
    base: &C::Point,
) -> Result<(PubPoly<C>, Vec<PriShare<C::Scalar>>), PolyError> {
    if threshold == 0 || threshold > n {
        return Err(PolyError::InvalidThreshold { threshold, n });
    }
    let poly = PriPoly::<C>::with_secret(secret, threshold);
    let shares = (1..=n as u32).map(|i| poly.eval(i)).collect();

    Ok((poly.commit(base), shares))
}

/// Sums the evaluations at `i` of every polynomial in `polys`.
pub fn eval_sum<'a, C: Curve>(
    polys: impl IntoIterator<Item = &'a PubPoly<C>>,
    i: u32,
) -> C::Point {
    let mut acc = C::Point::identity();
    for poly in polys {
        acc += &poly.eval(i);
    }

    acc
}

/// Point-wise sum of commitments: the commitments of the sum of the polynomials.
pub fn sum_commitments<C: Curve>(polys: &[PubPoly<C>], threshold: usize) -> PubPoly<C> {
    let mut commits = vec![C::Point::identity(); threshold];
    for poly in polys {
        for (acc, c) in commits.iter_mut().zip(poly.commits.iter()) {
            *acc += c;
        }
    }

    PubPoly { commits }
}

/// Lagrange basis at x = 0 for the given indices, in the same order.
pub fn lagrange_basis<S: ScalarField>(indices: &[u32]) -> Result<Vec<S>, PolyError> {
    let mut seen = BTreeSet::new();
    for i in indices {
        if *i == 0 {
            return Err(PolyError::ZeroIndex);
        }
        if !seen.insert(*i) {
            return Err(PolyError::DuplicateIndex(*i));
        }
    }

    let mut basis = Vec::with_capacity(indices.len());
    for i in indices {
        let xi = S::from_u64((*i).into());
        let mut num = S::one();
        let mut den = S::one();

        for j in indices.iter().filter(|j| *j != i) {
            let xj = S::from_u64((*j).into());
            num *= &xj;
            den *= &(xj - &xi);
        }
        let den = den.invert().map_err(|_| PolyError::NonInvertable)?;
        basis.push(num * &den);
    }

    Ok(basis)
}

/// Interpolates the constant term from the first `threshold` shares.
pub fn recover_secret<S: ScalarField>(
    shares: &[PriShare<S>],
    threshold: usize,
) -> Result<S, PolyError> {
    if shares.len() < threshold {
        return Err(PolyError::NotEnoughShares {
            expected: threshold,
            received: shares.len(),
        });
    }
    let shares = &shares[..threshold];
    let indices: Vec<u32> = shares.iter().map(|s| s.i).collect();
    let basis = lagrange_basis::<S>(&indices)?;

    let mut acc = S::zero();
    for (share, l) in shares.iter().zip(basis.iter()) {
        acc += &(share.v * l);
    }

    Ok(acc)
}

/// Interpolates `base^secret` from the first `threshold` public shares `(i, base^share_i)`.
pub fn recover_public<C: Curve>(
    shares: &[(u32, C::Point)],
    threshold: usize,
) -> Result<C::Point, PolyError> {
    if shares.len() < threshold {
        return Err(PolyError::NotEnoughShares {
            expected: threshold,
            received: shares.len(),
        });
    }
    let shares = &shares[..threshold];
    let indices: Vec<u32> = shares.iter().map(|(i, _)| *i).collect();
    let basis = lagrange_basis::<C::Scalar>(&indices)?;

    let mut acc = C::Point::identity();
    for ((_, p), l) in shares.iter().zip(basis.iter()) {
        acc += &(p.clone() * l);
    }

    Ok(acc)
}
