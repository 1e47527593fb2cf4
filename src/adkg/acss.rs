use super::messages::AcssMessage;
use super::messages::AcssPayload;
use super::messages::KeysetMessage;
use super::messages::Message;
use super::participant::DkgParticipant;
use super::rbc;
use super::rbc::RbcAction;
use super::rbc::RbcState;
use super::AdkgError;
use crate::config::NodeDetails;
use crate::crypto::ecies;
use crate::crypto::poly::PriPoly;
use crate::crypto::poly::PriShare;
use crate::crypto::poly::PubPoly;
use crate::ids::QualifiedSet;
use crate::ids::RoundId;
use crate::traits::Curve;
use crate::traits::ScalarField;

use tracing::debug;
use tracing::info;

pub(super) async fn handle<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    msg: AcssMessage,
) -> Result<(), AdkgError> {
    match msg {
        AcssMessage::Share => share(p, sender, round).await,
        AcssMessage::Propose { data } => propose(p, sender, round, &data).await,
        AcssMessage::Echo {
            hash,
            digests,
            shard,
        } => {
            let actions = rbc::on_echo(p, sender, round, hash, digests, shard).await?;
            apply(p, round, actions)
        }
        AcssMessage::Ready {
            hash,
            digests,
            shard,
        } => {
            let actions = rbc::on_ready(p, sender, round, hash, digests, shard).await?;
            apply(p, round, actions)
        }
        AcssMessage::Output { data } => output(p, sender, round, &data).await,
    }
}

/// Builds a dealing of a fresh random secret: commitments over `g` and one encrypted
/// share per node, evaluated at the node index.
pub fn deal<C: Curve>(
    round: &RoundId,
    nodes: &[NodeDetails<C>],
    k: usize,
    g: &C::Point,
) -> Result<Vec<u8>, AdkgError> {
    let poly = PriPoly::<C>::with_secret(C::Scalar::random(), k);
    let info = round.to_string();

    let mut payload = AcssPayload {
        commitments: poly.commit(g).to_bytes()?,
        shares: Default::default(),
    };
    for node in nodes {
        let share = poly.eval(node.index);
        let cipher = ecies::encrypt_share::<C>(&node.public, share.value(), info.as_bytes())?;
        payload.shares.insert(node.index, cipher);
    }

    payload.to_bytes()
}

/// Decrypts this node's share of a dealing and checks it against the commitments.
pub fn predicate<C: Curve>(
    round: &RoundId,
    index: u32,
    private: &C::Scalar,
    k: usize,
    g: &C::Point,
    data: &[u8],
) -> Result<(C::Scalar, PubPoly<C>), AdkgError> {
    let payload = AcssPayload::from_bytes(data)?;
    let commits = PubPoly::<C>::from_bytes(&payload.commitments, k)?;
    let cipher = payload
        .shares
        .get(&index)
        .ok_or(AdkgError::MissingShare(index))?;

    let info = round.to_string();
    let v = ecies::decrypt_share::<C>(private, cipher, info.as_bytes())?;
    if !commits.verify_share(g, &PriShare { i: index, v }) {
        return Err(AdkgError::InvalidShare(round.dealer));
    }

    Ok((v, commits))
}

async fn share<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    if round.dealer != p.id() {
        return Err(AdkgError::NotDealer {
            dealer: round.dealer,
            sender,
        });
    }
    let first = p
        .state()
        .rbc
        .with(round, RbcState::default, |s| !std::mem::replace(&mut s.started, true))
        .await
        .unwrap_or(false);
    if !first {
        return Ok(());
    }

    let data = deal::<C>(round, p.nodes(), p.params().k, &p.generators().g)?;
    info!(parent: p.log(), %round, bytes = data.len(), "dealing");

    super::broadcast(p, round, &Message::Acss(AcssMessage::Propose { data }))
}

async fn propose<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    data: &[u8],
) -> Result<(), AdkgError> {
    if sender != round.dealer {
        return Err(AdkgError::NotDealer {
            dealer: round.dealer,
            sender,
        });
    }
    let (k, g) = (p.params().k, &p.generators().g);
    predicate::<C>(round, p.id(), p.private_key(), k, g, data)?;

    let first = p
        .state()
        .rbc
        .with(round, RbcState::default, |s| !std::mem::replace(&mut s.echo_sent, true))
        .await
        .unwrap_or(false);
    if !first {
        return Ok(());
    }
    debug!(parent: p.log(), %round, "dealing verified, echoing");

    rbc::send_echoes(p, round, data, |hash, digests, shard| {
        Message::Acss(AcssMessage::Echo {
            hash,
            digests,
            shard,
        })
    })
}

fn apply<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    actions: Vec<RbcAction>,
) -> Result<(), AdkgError> {
    for action in actions {
        match action {
            RbcAction::Ready {
                hash,
                digests,
                shard,
            } => {
                super::broadcast(p, round, &Message::Acss(AcssMessage::Ready {
                    hash,
                    digests,
                    shard,
                }))?
            }
            RbcAction::Deliver { data, .. } => {
                super::local(p, round, &Message::Acss(AcssMessage::Output { data }))?
            }
        }
    }

    Ok(())
}

/// Records a delivered dealing. Reaching `k` verified dealers starts this node's keyset
/// proposal; buffered proposals that now pass the keyset predicate are echoed.
async fn output<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    data: &[u8],
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let (k, g) = (p.params().k, &p.generators().g);
    let (share, commits) = predicate::<C>(round, p.id(), p.private_key(), k, g, data)?;
    let dealer = round.dealer;

    let (ready, propose) = p
        .state()
        .sessions
        .with(&round.session, Default::default, |s| {
            s.s.insert(dealer, share);
            s.c.insert(dealer, commits);
            s.t_prime.insert(dealer);

            let t_prime = s.t_prime;
            let ready: Vec<(u32, QualifiedSet)> = s
                .t_proposals
                .iter()
                .filter(|(_, set)| super::keyset::accepts(set, &t_prime, k))
                .map(|(d, set)| (*d, *set))
                .collect();
            for (d, _) in &ready {
                s.t_proposals.remove(d);
            }

            let propose = !s.keyset_proposed && s.t_prime.len() >= k;
            s.keyset_proposed |= propose;
            (ready, propose)
        })
        .await
        .unwrap_or_default();
    info!(parent: p.log(), %round, "dealing delivered");

    for (proposer, set) in ready {
        let keyset = RoundId::keyset(round.session, proposer);
        super::keyset::echo_proposal(p, &keyset, set).await?;
    }
    if propose {
        let keyset = RoundId::keyset(round.session, p.id());
        super::local(p, &keyset, &Message::Keyset(KeysetMessage::Init))?;
    }

    super::derivation::try_start(p, round.session).await
}
