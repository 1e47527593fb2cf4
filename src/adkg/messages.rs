use super::AdkgError;
use crate::crypto::erasure::Shard;
use crate::curves::CurveId;
use crate::ids::QualifiedSet;
use crate::ids::RoundId;
use crate::ids::RoundKind;

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Display;

pub type Hash = [u8; 32];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AcssMessage {
    /// Local trigger for the dealer.
    Share,
    Propose { data: Vec<u8> },
    Echo {
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
    },
    Ready {
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
    },
    /// Local delivery of the decoded dealing.
    Output { data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeysetMessage {
    Init,
    Propose { set: QualifiedSet },
    Echo {
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
    },
    Ready {
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
    },
    Output { set: QualifiedSet },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbaMessage {
    Init { v: u8, r: u32 },
    Est1 { v: u8, r: u32 },
    Aux1 { v: u8, r: u32 },
    AuxSet { v: u8, r: u32 },
    Est2 { v: u8, r: u32 },
    Aux2 { v: u8, r: u32 },
    /// Local trigger to release this node's coin share for sub-round `r`.
    CoinInit { r: u32 },
    Coin { r: u32, share: Vec<u8>, proof: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerivationMessage {
    Init,
    Share { commitment: Vec<u8>, proof: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Acss(AcssMessage),
    Keyset(KeysetMessage),
    Aba(AbaMessage),
    Derivation(DerivationMessage),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Acss(m) => match m {
                AcssMessage::Share => "acss/share",
                AcssMessage::Propose { .. } => "acss/propose",
                AcssMessage::Echo { .. } => "acss/echo",
                AcssMessage::Ready { .. } => "acss/ready",
                AcssMessage::Output { .. } => "acss/output",
            },
            Message::Keyset(m) => match m {
                KeysetMessage::Init => "keyset/init",
                KeysetMessage::Propose { .. } => "keyset/propose",
                KeysetMessage::Echo { .. } => "keyset/echo",
                KeysetMessage::Ready { .. } => "keyset/ready",
                KeysetMessage::Output { .. } => "keyset/output",
            },
            Message::Aba(m) => match m {
                AbaMessage::Init { .. } => "aba/init",
                AbaMessage::Est1 { .. } => "aba/est1",
                AbaMessage::Aux1 { .. } => "aba/aux1",
                AbaMessage::AuxSet { .. } => "aba/auxset",
                AbaMessage::Est2 { .. } => "aba/est2",
                AbaMessage::Aux2 { .. } => "aba/aux2",
                AbaMessage::CoinInit { .. } => "aba/coininit",
                AbaMessage::Coin { .. } => "aba/coin",
            },
            Message::Derivation(m) => match m {
                DerivationMessage::Init => "keyder/init",
                DerivationMessage::Share { .. } => "keyder/share",
            },
        }
    }

    /// Round kind the message is allowed to travel in.
    fn round_kind(&self) -> RoundKind {
        match self {
            Message::Acss(_) => RoundKind::Acss,
            Message::Keyset(_) | Message::Aba(_) => RoundKind::Keyset,
            Message::Derivation(_) => RoundKind::KeyDerivation,
        }
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.kind())
    }
}

/// Unit handed to the transport. The payload is opaque to everything but [`Envelope::open`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub round: RoundId,
    pub kind: String,
    pub curve: CurveId,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn seal(round: RoundId, curve: CurveId, msg: &Message) -> Result<Self, AdkgError> {
        Ok(Self {
            round,
            kind: msg.kind().to_string(),
            curve,
            payload: bincode::serialize(msg)?,
        })
    }

    /// Decodes the payload, checking it against the header and the expected curve.
    pub fn open(&self, curve: CurveId) -> Result<Message, AdkgError> {
        for received in [self.curve, self.round.session.curve] {
            if received != curve {
                return Err(AdkgError::CurveMismatch {
                    expected: curve,
                    received,
                });
            }
        }
        let msg: Message = bincode::deserialize(&self.payload)?;
        if msg.kind() != self.kind {
            return Err(AdkgError::KindMismatch {
                declared: self.kind.clone(),
                decoded: msg.kind(),
            });
        }
        if msg.round_kind() != self.round.kind {
            return Err(AdkgError::RoundMismatch {
                kind: msg.kind(),
                round: self.round,
            });
        }

        Ok(msg)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AdkgError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdkgError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/// Dealing broadcast by an ACSS dealer: Feldman commitments and one ciphertext per node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcssPayload {
    pub commitments: Vec<u8>,
    pub shares: BTreeMap<u32, Vec<u8>>,
}

impl AcssPayload {
    pub fn to_bytes(&self) -> Result<Vec<u8>, AdkgError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, AdkgError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
