use crate::backends::error::BackendsError;
use crate::crypto::dleq::DleqError;
use crate::crypto::ecies::EciesError;
use crate::crypto::erasure::ErasureError;
use crate::crypto::poly::PolyError;
use crate::curves::CurveId;
use crate::ids::IdError;
use crate::ids::RoundId;

/// Coarse classes of [`AdkgError`], they decide how the dispatcher reports a dropped message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Byzantine or malformed input from a peer.
    Violation,
    Timeout,
    Serialization,
    Config,
    Internal,
}

#[allow(non_camel_case_types)]
#[derive(thiserror::Error, Debug)]
pub enum AdkgError {
    #[error("can't run with empty node list")]
    NodesEmpty,
    #[error("found duplicate in nodes list: {0}")]
    NodesDuplicated(u32),
    #[error("node index must be in 1..=63, received {0}")]
    InvalidIndex(u32),
    #[error("threshold must be faulty + 1 with faulty >= 1, threshold: {threshold}, faulty: {faulty}")]
    InvalidThreshold { threshold: usize, faulty: usize },
    #[error("{n} nodes can't tolerate {faulty} faulty")]
    TooFewNodes { n: usize, faulty: usize },
    #[error("public key not found in nodes list, index: {0}")]
    KeyNotFound(u32),
    #[error("long-term key does not match the listed public key, index: {0}")]
    KeyMismatch(u32),

    #[error("message from unknown node {0}")]
    UnknownSender(u32),
    #[error("message for dealer {dealer} sent by {sender}")]
    NotDealer { dealer: u32, sender: u32 },
    #[error("local-only message received from {0}")]
    NotLocal(u32),
    #[error("echo carries shard {received}, expected {expected}")]
    WrongShard { expected: u32, received: u32 },
    #[error("shard {number} from {sender} does not match its digest")]
    UnboundShard { sender: u32, number: u32 },
    #[error("envelope kind {declared} does not match payload {decoded}")]
    KindMismatch {
        declared: String,
        decoded: &'static str,
    },
    #[error("message kind {kind} can't travel in round {round}")]
    RoundMismatch { kind: &'static str, round: RoundId },
    #[error("curve mismatch: expected {expected}, received {received}")]
    CurveMismatch { expected: CurveId, received: CurveId },
    #[error("share for node {0} is missing from the dealing")]
    MissingShare(u32),
    #[error("share from dealer {0} does not match its commitments")]
    InvalidShare(u32),
    #[error("vote value {0} is out of range")]
    InvalidVote(u8),
    #[error("coin share from {sender} is invalid: {err}")]
    InvalidCoinShare { sender: u32, err: DleqError },
    #[error("derivation share from {sender} is invalid: {err}")]
    InvalidDerivationShare { sender: u32, err: DleqError },
    #[error("share decryption failed: {0}")]
    Ecies(#[from] EciesError),

    #[error("coin key material for {round} sub-round {r} did not arrive in time")]
    CoinTimeout { round: RoundId, r: u32 },

    #[error("bincode: {0}")]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    Id(#[from] IdError),
    #[error(transparent)]
    Poly(#[from] PolyError),
    #[error(transparent)]
    Erasure(#[from] ErasureError),
    #[error(transparent)]
    Dleq(#[from] DleqError),
    #[error(transparent)]
    Backend(#[from] BackendsError),

    #[error("BUG: keyset payload of {0} bytes decoded")]
    BUG_KeysetPayload(usize),
    #[error("BUG: own shard number not found for index {0}")]
    BUG_OwnShard(u32),
    #[error("BUG: qualified member {0} has no share or commitments")]
    BUG_MissingMember(u32),
}

impl AdkgError {
    pub fn kind(&self) -> ErrorKind {
        use AdkgError::*;

        match self {
            NodesEmpty
            | NodesDuplicated(_)
            | InvalidIndex(_)
            | InvalidThreshold { .. }
            | TooFewNodes { .. }
            | KeyNotFound(_)
            | KeyMismatch(_) => ErrorKind::Config,
            UnknownSender(_)
            | NotDealer { .. }
            | NotLocal(_)
            | WrongShard { .. }
            | UnboundShard { .. }
            | KindMismatch { .. }
            | RoundMismatch { .. }
            | CurveMismatch { .. }
            | MissingShare(_)
            | InvalidShare(_)
            | InvalidVote(_)
            | InvalidCoinShare { .. }
            | InvalidDerivationShare { .. }
            | Ecies(_) => ErrorKind::Violation,
            CoinTimeout { .. } => ErrorKind::Timeout,
            Bincode(_) | Id(_) | Poly(_) | Erasure(_) | Dleq(_) | Backend(_) => {
                ErrorKind::Serialization
            }
            BUG_KeysetPayload(_) | BUG_OwnShard(_) | BUG_MissingMember(_) => ErrorKind::Internal,
        }
    }
}
