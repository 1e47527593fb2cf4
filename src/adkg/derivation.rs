use super::messages::DerivationMessage;
use super::messages::Message;
use super::participant::DkgParticipant;
use super::AdkgError;
use crate::crypto::dleq::DleqProof;
use crate::crypto::poly::eval_sum;
use crate::crypto::poly::recover_public;
use crate::crypto::poly::sum_commitments;
use crate::crypto::poly::PubPoly;
use crate::ids::RoundId;
use crate::ids::SessionId;
use crate::traits::Curve;
use crate::traits::Point;

use tracing::info;

/// Starts key derivation once every agreement decided and the dealings of the final set are
/// known locally. Safe to call after any state change, it starts at most once.
pub(super) async fn try_start<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    session: SessionId,
) -> Result<(), AdkgError> {
    let n = p.params().n;
    let started = p
        .state()
        .sessions
        .with_existing(&session, |s| {
            let set = s.derivation_set(n)?;
            s.keyder_started = true;
            s.final_set = set;
            Some(set)
        })
        .await
        .flatten();

    if let Some(set) = started {
        info!(parent: p.log(), %session, qualified = %set, "starting key derivation");
        let round = RoundId::key_derivation(session, p.id());
        super::local(p, &round, &Message::Derivation(DerivationMessage::Init))?;
    }

    Ok(())
}

pub(super) async fn handle<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    msg: DerivationMessage,
) -> Result<(), AdkgError> {
    match msg {
        DerivationMessage::Init => init(p, sender, round).await,
        DerivationMessage::Share { commitment, proof } => {
            share(p, sender, round, &commitment, &proof).await
        }
    }
}

/// Computes z_i over the final set and broadcasts h^{z_i} with a proof that it shares its
/// exponent with the publicly derivable g^{z_i}.
async fn init<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let session = round.session;
    let k = p.params().k;

    let prepared = p
        .state()
        .sessions
        .with_existing(&session, |s| -> Result<_, AdkgError> {
            if s.share.is_some() {
                return Ok(None);
            }
            let set = s.final_set;
            let (z, polys) = s.members(&set).ok_or_else(|| {
                let missing = set.iter().find(|d| !s.s.contains_key(d) || !s.c.contains_key(d));
                AdkgError::BUG_MissingMember(missing.unwrap_or_default())
            })?;
            s.share = Some(z);
            s.commitments = Some(sum_commitments(&polys, k));
            let buffered = std::mem::take(&mut s.unverified);
            Ok(Some((z, polys, buffered)))
        })
        .await
        .transpose()?
        .flatten();
    let Some((z, polys, buffered)) = prepared else {
        return Ok(());
    };

    let g = &p.generators().g;
    let h = &p.generators().h;
    let (proof, _, commitment) = DleqProof::<C>::prove(g, h, &z)?;
    let msg = DerivationMessage::Share {
        commitment: commitment.serialize()?.into(),
        proof: proof.to_bytes()?,
    };
    let own = RoundId::key_derivation(session, p.id());
    super::broadcast(p, &own, &Message::Derivation(msg))?;

    for (sender, (commitment, proof)) in buffered {
        if let Err(err) = accept(p, session, sender, commitment, &proof, &polys).await {
            info!(parent: p.log(), %session, sender, "dropping buffered derivation share: {err}");
        }
    }

    Ok(())
}

async fn share<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    commitment: &[u8],
    proof: &[u8],
) -> Result<(), AdkgError> {
    if round.dealer != sender {
        return Err(AdkgError::NotDealer {
            dealer: round.dealer,
            sender,
        });
    }
    let session = round.session;
    let commitment = C::Point::deserialize(commitment)?;
    let proof = DleqProof::<C>::from_bytes(proof)?;

    let polys = p
        .state()
        .sessions
        .with(&session, Default::default, |s| {
            if s.share.is_none() {
                s.unverified.insert(sender, (commitment.clone(), proof.clone()));
                return None;
            }
            let set = s.final_set;
            s.members(&set).map(|(_, polys)| polys)
        })
        .await
        .flatten();
    let Some(polys) = polys else {
        return Ok(());
    };

    accept(p, session, sender, commitment, &proof, &polys).await
}

/// Verifies a derivation share, and recovers the group key at `k` accepted shares.
async fn accept<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    session: SessionId,
    sender: u32,
    commitment: C::Point,
    proof: &DleqProof<C>,
    polys: &[PubPoly<C>],
) -> Result<(), AdkgError> {
    let g = &p.generators().g;
    let h = &p.generators().h;
    let partial = eval_sum(polys, sender);
    proof
        .verify(g, &partial, h, &commitment)
        .map_err(|err| AdkgError::InvalidDerivationShare { sender, err })?;

    let k = p.params().k;
    let outcome = p
        .state()
        .sessions
        .with_existing(&session, |s| -> Result<_, AdkgError> {
            if s.over || s.pub_key_shares.contains_key(&sender) {
                return Ok(None);
            }
            s.pub_key_shares.insert(sender, commitment);
            if s.pub_key_shares.len() < k {
                return Ok(None);
            }
            let shares: Vec<(u32, C::Point)> = s
                .pub_key_shares
                .iter()
                .map(|(i, pk)| (*i, pk.clone()))
                .collect();
            let group_key = recover_public::<C>(&shares, k)?;
            s.group_key = Some(group_key.clone());
            s.over = true;
            let completed = if s.bft_decided { s.completed(session) } else { None };
            Ok(Some((group_key, completed)))
        })
        .await
        .transpose()?
        .flatten();
    let Some((group_key, completed)) = outcome else {
        return Ok(());
    };

    info!(parent: p.log(), %session, group_key = %group_key, "group key recovered");
    p.publish_group_key(session, group_key);
    if let Some(key) = completed {
        finish(p, key);
    }

    Ok(())
}

/// Signals that the ordering service committed the group key of `session`.
pub async fn bft_decided<C: Curve, P: DkgParticipant<C>>(p: &P, session: SessionId) {
    let completed = p
        .state()
        .sessions
        .with(&session, Default::default, |s| {
            if s.over {
                s.completed(session)
            } else {
                s.bft_decided = true;
                None
            }
        })
        .await
        .flatten();

    if let Some(key) = completed {
        finish(p, key);
    }
}

fn finish<C: Curve, P: DkgParticipant<C>>(p: &P, key: super::CompletedKey<C>) {
    let session = key.session;
    info!(parent: p.log(), %session, qualified = %key.qualified, "key generation complete");
    p.store_completed(key);
    p.cleanup(session);
}
