//! Asynchronous distributed key generation: per-dealer ACSS and keyset broadcasts, one binary
//! agreement per dealer and a final key derivation over the agreed qualified set.
mod aba;
pub mod acss;
mod coin;
mod derivation;
mod error;
pub mod keyset;
pub mod messages;
mod participant;
mod rbc;
mod state;

pub use aba::AbaState;
pub use coin::CoinState;
pub use derivation::bft_decided;
pub use error::AdkgError;
pub use error::ErrorKind;
pub use messages::Envelope;
pub use messages::Message;
pub use participant::CompletedKey;
pub use participant::DkgParticipant;
pub use rbc::RbcState;
pub use state::NodeState;
pub use state::SessionState;

use crate::ids::RoundId;
use crate::traits::Curve;

use tracing::debug;
use tracing::error;
use tracing::warn;

fn broadcast<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    msg: &Message,
) -> Result<(), AdkgError> {
    p.broadcast(Envelope::seal(*round, C::ID, msg)?);
    Ok(())
}

fn send<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    to: u32,
    round: &RoundId,
    msg: &Message,
) -> Result<(), AdkgError> {
    p.send(to, Envelope::seal(*round, C::ID, msg)?);
    Ok(())
}

fn local<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    msg: &Message,
) -> Result<(), AdkgError> {
    p.deliver_local(Envelope::seal(*round, C::ID, msg)?);
    Ok(())
}

fn ensure_local<C: Curve, P: DkgParticipant<C>>(p: &P, sender: u32) -> Result<(), AdkgError> {
    if sender != p.id() {
        return Err(AdkgError::NotLocal(sender));
    }
    Ok(())
}

/// Routes one envelope from `sender` to its handler.
pub async fn handle<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    env: &Envelope,
) -> Result<(), AdkgError> {
    if p.public_key(sender).is_none() {
        return Err(AdkgError::UnknownSender(sender));
    }
    let msg = env.open(C::ID)?;
    let round = &env.round;
    if p.state().sessions.is_complete(&round.session) {
        return Ok(());
    }

    match msg {
        Message::Acss(msg) => acss::handle(p, sender, round, msg).await,
        Message::Keyset(msg) => keyset::handle(p, sender, round, msg).await,
        Message::Aba(msg) => aba::handle(p, sender, round, msg).await,
        Message::Derivation(msg) => derivation::handle(p, sender, round, msg).await,
    }
}

/// Handles an envelope and reports a failure according to its [`ErrorKind`].
/// Dropped messages never stop the participant.
pub async fn dispatch<C: Curve, P: DkgParticipant<C>>(p: &P, sender: u32, env: &Envelope) {
    let Err(err) = handle(p, sender, env).await else {
        return;
    };
    let (round, kind) = (&env.round, &env.kind);

    match err.kind() {
        ErrorKind::Violation => {
            warn!(parent: p.log(), %round, sender, kind, "dropping message: {err}")
        }
        ErrorKind::Serialization => {
            debug!(parent: p.log(), %round, sender, kind, "undecodable message: {err}")
        }
        ErrorKind::Timeout => warn!(parent: p.log(), %round, sender, kind, "{err}"),
        ErrorKind::Config | ErrorKind::Internal => {
            error!(parent: p.log(), %round, sender, kind, "{err}")
        }
    }
}
