use crate::curves::CurveId;
use crate::curves::UnknownCurve;

use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;

/// Highest node index that fits a [`QualifiedSet`].
pub const MAX_INDEX: u32 = 63;

const SESSION_PREFIX: &str = "ADKG";

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum IdError {
    #[error("malformed session id: {0}")]
    MalformedSession(String),
    #[error("malformed round id: {0}")]
    MalformedRound(String),
    #[error("unknown round kind: {0}")]
    UnknownKind(String),
    #[error(transparent)]
    Curve(#[from] UnknownCurve),
    #[error("qualified set must be 8 bytes, received {0}")]
    QualifiedSetLenght(usize),
}

/// One key generation instance: target key index and curve.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId {
    pub key_index: u64,
    pub curve: CurveId,
}

impl SessionId {
    pub fn new(key_index: u64, curve: CurveId) -> Self {
        Self { key_index, curve }
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{SESSION_PREFIX}-{}-{:x}", self.curve, self.key_index)
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdError::MalformedSession(s.to_string());
        let mut parts = s.split('-');

        if parts.next() != Some(SESSION_PREFIX) {
            return Err(malformed());
        }
        let curve = parts.next().ok_or_else(malformed)?.parse()?;
        let key_index = parts
            .next()
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
            .ok_or_else(malformed)?;
        if parts.next().is_some() {
            return Err(malformed());
        }

        Ok(Self { key_index, curve })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundKind {
    Acss,
    /// Keyset RBC and the binary agreement deciding on the same dealer.
    Keyset,
    KeyDerivation,
}

impl Display for RoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoundKind::Acss => f.write_str("acss"),
            RoundKind::Keyset => f.write_str("keyset"),
            RoundKind::KeyDerivation => f.write_str("keyder"),
        }
    }
}

impl FromStr for RoundKind {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acss" => Ok(RoundKind::Acss),
            "keyset" => Ok(RoundKind::Keyset),
            "keyder" => Ok(RoundKind::KeyDerivation),
            other => Err(IdError::UnknownKind(other.to_string())),
        }
    }
}

/// Identifies a per-dealer sub-protocol instance of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoundId {
    pub session: SessionId,
    pub dealer: u32,
    pub kind: RoundKind,
}

impl RoundId {
    pub fn acss(session: SessionId, dealer: u32) -> Self {
        Self {
            session,
            dealer,
            kind: RoundKind::Acss,
        }
    }

    pub fn keyset(session: SessionId, dealer: u32) -> Self {
        Self {
            session,
            dealer,
            kind: RoundKind::Keyset,
        }
    }

    pub fn key_derivation(session: SessionId, dealer: u32) -> Self {
        Self {
            session,
            dealer,
            kind: RoundKind::KeyDerivation,
        }
    }

    /// Domain of the common coin tossed in sub-round `r` of this agreement.
    pub fn coin_id(&self, r: u32) -> String {
        format!("{self}|coin|{r}")
    }
}

impl Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.session, self.kind, self.dealer)
    }
}

impl FromStr for RoundId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || IdError::MalformedRound(s.to_string());
        let parts: Vec<&str> = s.split('|').collect();
        let [session, kind, dealer] = parts.as_slice() else {
            return Err(malformed());
        };

        Ok(Self {
            session: session.parse()?,
            kind: kind.parse()?,
            dealer: dealer.parse().map_err(|_| malformed())?,
        })
    }
}

/// Bitmask of dealers, bit i stands for node index i.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedSet(u64);

impl QualifiedSet {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Returns `false` if the index does not fit the mask or is already present.
    pub fn insert(&mut self, index: u32) -> bool {
        if index == 0 || index > MAX_INDEX || self.contains(index) {
            return false;
        }
        self.0 |= 1 << index;

        true
    }

    pub fn contains(&self, index: u32) -> bool {
        index != 0 && index <= MAX_INDEX && self.0 & (1 << index) != 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.0 & !other.0 == 0
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        (1..=MAX_INDEX).filter(|i| self.contains(*i))
    }

    pub fn to_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| IdError::QualifiedSetLenght(bytes.len()))?;

        Ok(Self(u64::from_be_bytes(raw) & !1))
    }
}

impl FromIterator<u32> for QualifiedSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = Self::new();
        for i in iter {
            set.insert(i);
        }

        set
    }
}

impl Display for QualifiedSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members: Vec<String> = self.iter().map(|i| i.to_string()).collect();
        write!(f, "{{{}}}", members.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_decomposable() {
        let session = SessionId::new(0x2a, CurveId::Bn254);
        assert_eq!(session.to_string(), "ADKG-bn254-2a");
        assert_eq!("ADKG-bn254-2a".parse::<SessionId>().unwrap(), session);

        let round = RoundId::keyset(session, 3);
        assert_eq!(round.to_string(), "ADKG-bn254-2a|keyset|3");
        assert_eq!(round.to_string().parse::<RoundId>().unwrap(), round);
        assert_eq!(round.coin_id(2), "ADKG-bn254-2a|keyset|3|coin|2");

        assert!("ADKG-ed25519-1".parse::<SessionId>().is_err());
        assert!("ADKG-bn254-2a|acss".parse::<RoundId>().is_err());
        assert_eq!(
            "ADKG-bn254-2a|vss|1".parse::<RoundId>(),
            Err(IdError::UnknownKind("vss".into()))
        );
    }

    #[test]
    fn qualified_set_ops() {
        let mut set = QualifiedSet::new();
        assert!(set.insert(1));
        assert!(set.insert(4));
        assert!(!set.insert(4));
        assert!(!set.insert(0));
        assert!(!set.insert(64));
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(set.to_string(), "{1,4}");

        let superset: QualifiedSet = [1, 2, 4].into_iter().collect();
        assert!(set.is_subset_of(&superset));
        assert!(!superset.is_subset_of(&set));

        let bytes = set.to_bytes();
        assert_eq!(bytes, [0, 0, 0, 0, 0, 0, 0, 0b0001_0010]);
        assert_eq!(QualifiedSet::from_bytes(&bytes).unwrap(), set);
        assert_eq!(
            QualifiedSet::from_bytes(&bytes[1..]),
            Err(IdError::QualifiedSetLenght(7))
        );
    }
}
