use super::aba::AbaState;
use super::coin::CoinState;
use super::participant::CompletedKey;
use super::rbc::RbcState;
use crate::crypto::dleq::DleqProof;
use crate::crypto::poly::PubPoly;
use crate::ids::QualifiedSet;
use crate::ids::RoundId;
use crate::ids::SessionId;
use crate::store::RoundStore;
use crate::traits::Curve;
use crate::traits::ScalarField;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::time::Duration;

/// Every store a participant keeps, keyed by round or session.
pub struct NodeState<C: Curve> {
    pub rbc: RoundStore<RoundId, RbcState>,
    pub aba: RoundStore<RoundId, AbaState>,
    pub coins: RoundStore<RoundId, CoinState<C>>,
    pub sessions: RoundStore<SessionId, SessionState<C>>,
}

impl<C: Curve> Default for NodeState<C> {
    fn default() -> Self {
        Self {
            rbc: RoundStore::new(),
            aba: RoundStore::new(),
            coins: RoundStore::new(),
            sessions: RoundStore::new(),
        }
    }
}

impl<C: Curve> NodeState<C> {
    pub fn complete_session(&self, session: SessionId) {
        self.rbc.complete_where(|round| round.session == session);
        self.aba.complete_where(|round| round.session == session);
        self.coins.complete_where(|round| round.session == session);
        self.sessions.complete(&session);
    }

    pub fn delete_session(&self, session: SessionId) {
        self.rbc.delete_where(|round| round.session == session);
        self.aba.delete_where(|round| round.session == session);
        self.coins.delete_where(|round| round.session == session);
        self.sessions.delete(&session);
    }

    /// Drops live entries of every store older than `ttl`.
    pub fn evict(&self, ttl: Duration) -> usize {
        self.rbc.evict(ttl)
            + self.aba.evict(ttl)
            + self.coins.evict(ttl)
            + self.sessions.evict(ttl)
    }
}

/// Session-wide view shared by the sub-protocols of every dealer.
pub struct SessionState<C: Curve> {
    /// Agreement outcome per dealer, set once.
    pub decisions: BTreeMap<u32, bool>,
    /// Qualified set proposed by each dealer, as delivered by the keyset broadcast.
    pub t: BTreeMap<u32, QualifiedSet>,
    /// Dealers whose dealing this node verified.
    pub t_prime: QualifiedSet,
    pub s: BTreeMap<u32, C::Scalar>,
    pub c: BTreeMap<u32, PubPoly<C>>,
    /// Keyset proposals that failed the predicate, re-checked on every new dealing.
    pub t_proposals: BTreeMap<u32, QualifiedSet>,
    pub keyset_proposed: bool,
    pub aba_started: BTreeSet<u32>,
    pub aba_complete: bool,

    pub keyder_started: bool,
    pub final_set: QualifiedSet,
    pub share: Option<C::Scalar>,
    pub commitments: Option<PubPoly<C>>,
    pub pub_key_shares: BTreeMap<u32, C::Point>,
    /// Derivation shares received before this node started deriving.
    pub unverified: BTreeMap<u32, (C::Point, DleqProof<C>)>,
    pub group_key: Option<C::Point>,
    /// Group key recovered locally.
    pub over: bool,
    /// Group key confirmed by the ordering service.
    pub bft_decided: bool,
}

impl<C: Curve> Default for SessionState<C> {
    fn default() -> Self {
        Self {
            decisions: BTreeMap::new(),
            t: BTreeMap::new(),
            t_prime: QualifiedSet::new(),
            s: BTreeMap::new(),
            c: BTreeMap::new(),
            t_proposals: BTreeMap::new(),
            keyset_proposed: false,
            aba_started: BTreeSet::new(),
            aba_complete: false,
            keyder_started: false,
            final_set: QualifiedSet::new(),
            share: None,
            commitments: None,
            pub_key_shares: BTreeMap::new(),
            unverified: BTreeMap::new(),
            group_key: None,
            over: false,
            bft_decided: false,
        }
    }
}

impl<C: Curve> SessionState<C> {
    /// Sum of this node's shares over `set` and the matching commitments.
    /// `None` until every member's dealing is known.
    pub fn members(&self, set: &QualifiedSet) -> Option<(C::Scalar, Vec<PubPoly<C>>)> {
        let mut sum = C::Scalar::zero();
        let mut polys = Vec::with_capacity(set.len());
        for dealer in set.iter() {
            sum += self.s.get(&dealer)?;
            polys.push(self.c.get(&dealer)?.clone());
        }

        Some((sum, polys))
    }

    /// Key material for the coin of `dealer`'s agreement: its keyset output restricted sum.
    pub fn coin_keys(&self, dealer: u32) -> Option<(C::Scalar, Vec<PubPoly<C>>)> {
        let set = self.t.get(&dealer)?;
        if set.is_empty() {
            return None;
        }

        self.members(set)
    }

    /// Union of the keysets of dealers decided 1, once derivation can run.
    pub fn derivation_set(&self, n: usize) -> Option<QualifiedSet> {
        if self.keyder_started || self.decisions.len() < n {
            return None;
        }
        let mut union = QualifiedSet::new();
        for (dealer, _) in self.decisions.iter().filter(|(_, accepted)| **accepted) {
            union = union.union(self.t.get(dealer)?);
        }
        if union.is_empty() {
            return None;
        }
        let known = union
            .iter()
            .all(|d| self.s.contains_key(&d) && self.c.contains_key(&d));

        known.then_some(union)
    }

    pub fn completed(&self, session: SessionId) -> Option<CompletedKey<C>> {
        Some(CompletedKey {
            session,
            share: self.share?,
            group_key: self.group_key.clone()?,
            qualified: self.final_set,
            commitments: self.commitments.clone()?,
        })
    }
}
