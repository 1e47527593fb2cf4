use super::messages::AbaMessage;
use super::messages::Message;
use super::participant::DkgParticipant;
use super::AdkgError;
use crate::crypto::dleq::DleqProof;
use crate::crypto::poly::eval_sum;
use crate::crypto::poly::recover_public;
use crate::crypto::poly::PubPoly;
use crate::ids::RoundId;
use crate::traits::Curve;
use crate::traits::Point;

use sha2::Digest;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tracing::debug;
use tracing::info;

/// Common coin shares of one agreement, per sub-round.
pub struct CoinState<C: Curve> {
    shares: BTreeMap<u32, BTreeMap<u32, C::Point>>,
    released: BTreeSet<u32>,
    values: BTreeMap<u32, bool>,
}

impl<C: Curve> Default for CoinState<C> {
    fn default() -> Self {
        Self {
            shares: BTreeMap::new(),
            released: BTreeSet::new(),
            values: BTreeMap::new(),
        }
    }
}

impl<C: Curve> CoinState<C> {
    /// Stores a verified share. Once `k` shares are known the coin is combined, returned
    /// along with whether this node still has to release its own share.
    pub fn add(
        &mut self,
        r: u32,
        sender: u32,
        share: C::Point,
        k: usize,
    ) -> Result<Option<(bool, bool)>, AdkgError> {
        if self.values.contains_key(&r) {
            return Ok(None);
        }
        let shares = self.shares.entry(r).or_default();
        if shares.contains_key(&sender) {
            return Ok(None);
        }
        shares.insert(sender, share);
        if shares.len() < k {
            return Ok(None);
        }

        let points: Vec<(u32, C::Point)> = shares.iter().map(|(i, s)| (*i, s.clone())).collect();
        let coin = combine::<C>(&points, k)?;
        self.values.insert(r, coin);

        Ok(Some((coin, !self.released.contains(&r))))
    }

    pub fn value(&self, r: u32) -> Option<bool> {
        self.values.get(&r).copied()
    }
}

/// Base of the coin of sub-round `r`, unknown discrete log to everyone.
pub fn coin_base<C: Curve>(round: &RoundId, r: u32) -> C::Point {
    C::hash_to_point(round.coin_id(r).as_bytes())
}

/// Interpolates `base^x` from `k` shares and takes the low bit of its SHA-256.
pub fn combine<C: Curve>(shares: &[(u32, C::Point)], k: usize) -> Result<bool, AdkgError> {
    let point = recover_public::<C>(shares, k)?;
    let digest = Sha256::digest(point.serialize()?.as_ref());

    Ok(digest[31] & 1 == 1)
}

/// Polls the session until the keyset of the agreement's dealer and every member dealing
/// are known. `None` if the session completed meanwhile.
async fn wait_for_keys<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    r: u32,
) -> Result<Option<(C::Scalar, Vec<PubPoly<C>>)>, AdkgError> {
    let sessions = &p.state().sessions;
    let poll = async {
        loop {
            if sessions.is_complete(&round.session) {
                return None;
            }
            let keys = sessions
                .with_existing(&round.session, |s| s.coin_keys(round.dealer))
                .await
                .flatten();
            if keys.is_some() {
                return keys;
            }
            tokio::time::sleep(p.settings().coin_poll()).await;
        }
    };

    tokio::time::timeout(p.settings().coin_timeout(), poll)
        .await
        .map_err(|_| AdkgError::CoinTimeout { round: *round, r })
}

/// Broadcasts this node's coin share for sub-round `r`, at most once.
pub(super) async fn release<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    r: u32,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let fresh = p
        .state()
        .coins
        .with(round, CoinState::default, |c| c.released.insert(r))
        .await
        .unwrap_or(false);
    if !fresh {
        return Ok(());
    }

    let Some((x, _)) = wait_for_keys(p, round, r).await? else {
        return Ok(());
    };
    let base = coin_base::<C>(round, r);
    let (proof, _, share) = DleqProof::<C>::prove(&p.generators().g, &base, &x)?;
    debug!(parent: p.log(), %round, r, "releasing coin share");

    let msg = AbaMessage::Coin {
        r,
        share: share.serialize()?.into(),
        proof: proof.to_bytes()?,
    };
    super::broadcast(p, round, &Message::Aba(msg))
}

pub(super) async fn on_share<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    r: u32,
    share: &[u8],
    proof: &[u8],
) -> Result<(), AdkgError> {
    let share = C::Point::deserialize(share)?;
    let proof = DleqProof::<C>::from_bytes(proof)?;
    let known = p
        .state()
        .coins
        .with_existing(round, |c| c.value(r).is_some())
        .await;
    if known == Some(true) {
        return Ok(());
    }

    let Some((_, polys)) = wait_for_keys(p, round, r).await? else {
        return Ok(());
    };
    let g = &p.generators().g;
    let partial = eval_sum(&polys, sender);
    proof
        .verify(g, &partial, &coin_base::<C>(round, r), &share)
        .map_err(|err| AdkgError::InvalidCoinShare { sender, err })?;

    let k = p.params().k;
    let combined = p
        .state()
        .coins
        .with(round, CoinState::default, |c| c.add(r, sender, share, k))
        .await
        .transpose()?
        .flatten();
    let Some((coin, release)) = combined else {
        return Ok(());
    };
    info!(parent: p.log(), %round, r, coin, "common coin combined");

    if release {
        super::local(p, round, &Message::Aba(AbaMessage::CoinInit { r }))?;
    }
    super::aba::on_coin(p, round, r, coin).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poly::PriPoly;
    use crate::crypto::Generators;
    use crate::curves::CurveId;
    use crate::ids::SessionId;
    use crate::traits::ScalarField;
    use crate::Bls12381;
    use crate::Bn254;

    /// Per node: coin share with proof, and the partial key derived from the commitments.
    fn coin_shares<C: Curve>(
        round: &RoundId,
        n: u32,
        k: usize,
    ) -> Vec<(u32, C::Point, DleqProof<C>, C::Point)> {
        let g = Generators::<C>::new().g;
        let dealings: Vec<PriPoly<C>> = (0..3)
            .map(|_| PriPoly::with_secret(C::Scalar::random(), k))
            .collect();
        let commits: Vec<PubPoly<C>> = dealings.iter().map(|d| d.commit(&g)).collect();
        let base = coin_base::<C>(round, 0);

        (1..=n)
            .map(|j| {
                let mut x = C::Scalar::zero();
                for d in &dealings {
                    x += d.eval(j).value();
                }
                let (proof, _, share) = DleqProof::<C>::prove(&g, &base, &x).unwrap();
                (j, share, proof, eval_sum(&commits, j))
            })
            .collect()
    }

    fn agreement<C: Curve>(curve: CurveId) {
        let round = RoundId::keyset(SessionId::new(5, curve), 2);
        let g = Generators::<C>::new().g;
        let base = coin_base::<C>(&round, 0);
        let shares = coin_shares::<C>(&round, 4, 2);

        for (_, share, proof, partial) in &shares {
            assert!(proof.verify(&g, partial, &base, share).is_ok());
        }
        let points: Vec<(u32, C::Point)> = shares.iter().map(|s| (s.0, s.1.clone())).collect();
        let first = combine::<C>(&points[..2], 2).unwrap();
        assert_eq!(combine::<C>(&points[2..], 2).unwrap(), first);
        assert_eq!(
            combine::<C>(&[points[3].clone(), points[0].clone()], 2).unwrap(),
            first
        );

        // a share for another node's partial key does not verify
        let (_, share, proof, _) = &shares[0];
        assert!(proof.verify(&g, &shares[1].3, &base, share).is_err());
    }

    #[test]
    fn combined_coin_is_common() {
        agreement::<Bls12381>(CurveId::Bls12381);
        agreement::<Bn254>(CurveId::Bn254);
    }

    #[test]
    fn state_combines_once() {
        let round = RoundId::keyset(SessionId::new(1, CurveId::Bls12381), 1);
        let shares = coin_shares::<Bls12381>(&round, 4, 2);
        let mut state = CoinState::<Bls12381>::default();

        assert_eq!(state.add(0, 1, shares[0].1.clone(), 2).unwrap(), None);
        assert_eq!(state.add(0, 1, shares[0].1.clone(), 2).unwrap(), None);
        let (coin, release) = state.add(0, 3, shares[2].1.clone(), 2).unwrap().unwrap();
        assert!(release);
        assert_eq!(state.value(0), Some(coin));
        assert_eq!(state.add(0, 4, shares[3].1.clone(), 2).unwrap(), None);
    }
}
