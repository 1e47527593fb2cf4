use super::messages::AbaMessage;
use super::messages::KeysetMessage;
use super::messages::Message;
use super::participant::DkgParticipant;
use super::rbc;
use super::rbc::RbcAction;
use super::rbc::RbcState;
use super::AdkgError;
use crate::ids::QualifiedSet;
use crate::ids::RoundId;
use crate::traits::Curve;

use tracing::debug;
use tracing::info;

/// A proposal is acceptable once this node verified every proposed dealer itself.
pub fn accepts(proposal: &QualifiedSet, t_prime: &QualifiedSet, k: usize) -> bool {
    proposal.len() >= k && proposal.is_subset_of(t_prime)
}

pub(super) async fn handle<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    msg: KeysetMessage,
) -> Result<(), AdkgError> {
    match msg {
        KeysetMessage::Init => init(p, sender, round).await,
        KeysetMessage::Propose { set } => propose(p, sender, round, set).await,
        KeysetMessage::Echo {
            hash,
            digests,
            shard,
        } => {
            let actions = rbc::on_echo(p, sender, round, hash, digests, shard).await?;
            apply(p, round, actions)
        }
        KeysetMessage::Ready {
            hash,
            digests,
            shard,
        } => {
            let actions = rbc::on_ready(p, sender, round, hash, digests, shard).await?;
            apply(p, round, actions)
        }
        KeysetMessage::Output { set } => output(p, sender, round, set).await,
    }
}

async fn init<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let first = p
        .state()
        .rbc
        .with(round, RbcState::default, |s| !std::mem::replace(&mut s.started, true))
        .await
        .unwrap_or(false);
    if !first {
        return Ok(());
    }
    let Some(set) = p
        .state()
        .sessions
        .with_existing(&round.session, |s| s.t_prime)
        .await
    else {
        return Ok(());
    };
    info!(parent: p.log(), %round, proposal = %set, "proposing keyset");

    super::broadcast(p, round, &Message::Keyset(KeysetMessage::Propose { set }))
}

async fn propose<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    set: QualifiedSet,
) -> Result<(), AdkgError> {
    if sender != round.dealer {
        return Err(AdkgError::NotDealer {
            dealer: round.dealer,
            sender,
        });
    }
    let k = p.params().k;
    let accepted = p
        .state()
        .sessions
        .with(&round.session, Default::default, |s| {
            if accepts(&set, &s.t_prime, k) {
                return true;
            }
            s.t_proposals.insert(round.dealer, set);
            false
        })
        .await
        .unwrap_or(false);

    if !accepted {
        debug!(parent: p.log(), %round, proposal = %set, "keyset proposal buffered");
        return Ok(());
    }

    echo_proposal(p, round, set).await
}

/// Disseminates an accepted proposal through the reliable broadcast, once per dealer.
pub(super) async fn echo_proposal<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    set: QualifiedSet,
) -> Result<(), AdkgError> {
    let first = p
        .state()
        .rbc
        .with(round, RbcState::default, |s| !std::mem::replace(&mut s.echo_sent, true))
        .await
        .unwrap_or(false);
    if !first {
        return Ok(());
    }

    rbc::send_echoes(p, round, &set.to_bytes(), |hash, digests, shard| {
        Message::Keyset(KeysetMessage::Echo {
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
            } => super::broadcast(
                p,
                round,
                &Message::Keyset(KeysetMessage::Ready {
                    hash,
                    digests,
                    shard,
                }),
            )?,
            RbcAction::Deliver { data, .. } => {
                let set = QualifiedSet::from_bytes(&data)
                    .map_err(|_| AdkgError::BUG_KeysetPayload(data.len()))?;
                super::local(p, round, &Message::Keyset(KeysetMessage::Output { set }))?
            }
        }
    }

    Ok(())
}

/// Records the dealer's agreed keyset and casts this node's vote on it.
async fn output<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    set: QualifiedSet,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let dealer = round.dealer;

    let vote = p
        .state()
        .sessions
        .with(&round.session, Default::default, |s| {
            s.t.insert(dealer, set);
            if !s.aba_started.insert(dealer) {
                return None;
            }
            Some(u8::from(set.is_subset_of(&s.t_prime) && !s.aba_complete))
        })
        .await
        .flatten();
    info!(parent: p.log(), %round, keyset = %set, vote = ?vote, "keyset delivered");

    if let Some(v) = vote {
        super::local(p, round, &Message::Aba(AbaMessage::Init { v, r: 0 }))?;
    }

    super::derivation::try_start(p, round.session).await
}
