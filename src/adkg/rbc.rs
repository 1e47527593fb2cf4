use super::messages::Hash;
use super::participant::DkgParticipant;
use super::AdkgError;
use crate::config::Params;
use crate::crypto::erasure;
use crate::crypto::erasure::Shard;
use crate::crypto::payload_hash;
use crate::ids::RoundId;
use crate::traits::Curve;

use crev_common::Blake2b256;
use sha2::digest::Digest;
use std::collections::BTreeSet;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Initial,
    /// Terminal, the payload was delivered.
    Ended,
}

#[derive(Debug, Clone)]
struct EchoTally {
    hash: Hash,
    digests: Vec<Hash>,
    shard: Shard,
    count: usize,
}

#[derive(Debug, Clone, Default)]
struct ReadyTally {
    hash: Hash,
    shards: Vec<Shard>,
}

/// What the caller has to do after feeding an echo or a ready.
#[derive(Debug, Clone, PartialEq)]
pub enum RbcAction {
    /// Broadcast Ready with this node's own shard.
    Ready {
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
    },
    /// Decoded payload matching `hash`, produced once per instance.
    Deliver { hash: Hash, data: Vec<u8> },
}

/// Reliable broadcast instance of one dealer, shared by ACSS dealings and keyset proposals.
///
/// Every Echo and Ready carries the digests of all n shards of the encoding it belongs to.
/// A shard that does not match its own digest is rejected on arrival, so the tallies only
/// ever hold shards bound to one `root`.
#[derive(Debug, Default)]
pub struct RbcState {
    pub phase: Phase,
    /// Dealer side: the instance was started locally.
    pub started: bool,
    /// Receiver side: echoes for the dealer's proposal went out.
    pub echo_sent: bool,
    pub ready_sent: bool,
    received_echo: BTreeSet<u32>,
    received_ready: BTreeSet<u32>,
    /// Keyed by [`root`].
    echoes: HashMap<Hash, EchoTally>,
    readies: HashMap<Hash, ReadyTally>,
}

pub fn shard_digest(shard: &Shard) -> Hash {
    let mut h = Blake2b256::new();
    h.update(shard.number.to_be_bytes());
    h.update(&shard.data);

    h.finalize().into()
}

/// Binds the dealt payload hash to the digests of its n shards.
pub fn root(hash: &Hash, digests: &[Hash]) -> Hash {
    let mut h = Blake2b256::new();
    h.update(hash);
    for digest in digests {
        h.update(digest);
    }

    h.finalize().into()
}

/// The shard belongs to the encoding described by `digests`.
pub fn bound(digests: &[Hash], shard: &Shard, n: usize) -> bool {
    digests.len() == n
        && digests
            .get(shard.number as usize)
            .is_some_and(|d| *d == shard_digest(shard))
}

impl RbcState {
    pub fn on_echo(
        &mut self,
        sender: u32,
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
        t: &Params,
    ) -> Result<Vec<RbcAction>, AdkgError> {
        if !bound(&digests, &shard, t.n) {
            return Err(AdkgError::UnboundShard {
                sender,
                number: shard.number,
            });
        }
        if self.phase == Phase::Ended || !self.received_echo.insert(sender) {
            return Ok(vec![]);
        }
        let tally = self
            .echoes
            .entry(root(&hash, &digests))
            .or_insert(EchoTally {
                hash,
                digests,
                shard,
                count: 0,
            });
        tally.count += 1;

        Ok(self.check_ready(t).into_iter().collect())
    }

    pub fn on_ready(
        &mut self,
        sender: u32,
        hash: Hash,
        digests: Vec<Hash>,
        shard: Shard,
        t: &Params,
    ) -> Result<Vec<RbcAction>, AdkgError> {
        if !bound(&digests, &shard, t.n) {
            return Err(AdkgError::UnboundShard {
                sender,
                number: shard.number,
            });
        }
        if self.phase == Phase::Ended || !self.received_ready.insert(sender) {
            return Ok(vec![]);
        }
        let key = root(&hash, &digests);
        let tally = self.readies.entry(key).or_default();
        tally.hash = hash;
        tally.shards.push(shard);

        let mut actions: Vec<RbcAction> = self.check_ready(t).into_iter().collect();
        if let Some(deliver) = self.try_deliver(&key, t) {
            actions.push(deliver);
        }

        Ok(actions)
    }

    pub fn readies(&self, root: &Hash) -> usize {
        self.readies.get(root).map_or(0, |r| r.shards.len())
    }

    /// Ready goes out once: on 2f+1 matching echoes, or on f+1 readies for an encoding
    /// backed by f+1 echoes of this node's shard.
    fn check_ready(&mut self, t: &Params) -> Option<RbcAction> {
        if self.ready_sent {
            return None;
        }
        let tally = self
            .echoes
            .iter()
            .find(|(_, e)| e.count >= t.echo_threshold())
            .or_else(|| {
                self.echoes.iter().find(|(key, e)| {
                    e.count >= t.ready_threshold() && self.readies(key) >= t.ready_threshold()
                })
            })
            .map(|(_, e)| e)?;
        let action = RbcAction::Ready {
            hash: tally.hash,
            digests: tally.digests.clone(),
            shard: tally.shard.clone(),
        };
        self.ready_sent = true;

        Some(action)
    }

    /// Decoding is attempted at every ready count 2f+1+i, i = 0..=f. All shards under one
    /// root passed their digest check, so any k of them decode the same payload.
    fn try_deliver(&mut self, key: &Hash, t: &Params) -> Option<RbcAction> {
        let tally = self.readies.get(key)?;
        let count = tally.shards.len();
        if count < t.output_threshold() || count > t.output_threshold() + t.f {
            return None;
        }

        match erasure::decode(&tally.shards[..t.k], t.k, t.n) {
            Ok(data) if payload_hash(&data) == tally.hash => {
                let hash = tally.hash;
                self.phase = Phase::Ended;
                Some(RbcAction::Deliver { hash, data })
            }
            Ok(_) => {
                debug!("rbc: decoded payload does not match announced hash");
                None
            }
            Err(err) => {
                debug!("rbc: decode failed: {err}");
                None
            }
        }
    }
}

/// Erasure codes `data` and sends shard j, with the digests of all shards, to the node at
/// position j.
pub(super) fn send_echoes<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    data: &[u8],
    echo: impl Fn(Hash, Vec<Hash>, Shard) -> super::Message,
) -> Result<(), AdkgError> {
    let params = p.params();
    let hash = payload_hash(data);
    let shards = erasure::encode(data, params.k, params.n)?;
    let digests: Vec<Hash> = shards.iter().map(shard_digest).collect();

    for (node, shard) in p.nodes().iter().zip(shards) {
        super::send(p, node.index, round, &echo(hash, digests.clone(), shard))?;
    }

    Ok(())
}

pub(super) async fn on_echo<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    hash: Hash,
    digests: Vec<Hash>,
    shard: Shard,
) -> Result<Vec<RbcAction>, AdkgError> {
    let own = p.shard_of(p.id()).ok_or(AdkgError::BUG_OwnShard(p.id()))?;
    if shard.number != own {
        return Err(AdkgError::WrongShard {
            expected: own,
            received: shard.number,
        });
    }
    let params = *p.params();

    Ok(p.state()
        .rbc
        .with(round, RbcState::default, |s| {
            s.on_echo(sender, hash, digests, shard, &params)
        })
        .await
        .transpose()?
        .unwrap_or_default())
}

pub(super) async fn on_ready<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    hash: Hash,
    digests: Vec<Hash>,
    shard: Shard,
) -> Result<Vec<RbcAction>, AdkgError> {
    let expected = p.shard_of(sender).ok_or(AdkgError::UnknownSender(sender))?;
    if shard.number != expected {
        return Err(AdkgError::WrongShard {
            expected,
            received: shard.number,
        });
    }
    let params = *p.params();

    Ok(p.state()
        .rbc
        .with(round, RbcState::default, |s| {
            s.on_ready(sender, hash, digests, shard, &params)
        })
        .await
        .transpose()?
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: Params = Params { n: 4, f: 1, k: 2 };

    fn dealt(payload: &[u8], t: &Params) -> (Hash, Vec<Hash>, Vec<Shard>) {
        let shards = erasure::encode(payload, t.k, t.n).unwrap();
        let digests = shards.iter().map(shard_digest).collect();
        (payload_hash(payload), digests, shards)
    }

    #[test]
    fn ready_after_echo_quorum() {
        let (hash, digests, shards) = dealt(b"qualified dealers", &PARAMS);
        let mut s = RbcState::default();
        let echo = |s: &mut RbcState, sender| {
            s.on_echo(sender, hash, digests.clone(), shards[0].clone(), &PARAMS)
                .unwrap()
        };

        assert!(echo(&mut s, 1).is_empty());
        assert!(echo(&mut s, 2).is_empty());
        // duplicate sender
        assert!(echo(&mut s, 2).is_empty());
        assert_eq!(
            echo(&mut s, 3),
            vec![RbcAction::Ready {
                hash,
                digests: digests.clone(),
                shard: shards[0].clone()
            }]
        );
        assert!(s.ready_sent);
        assert!(echo(&mut s, 4).is_empty());
    }

    #[test]
    fn forged_shard_is_rejected() {
        let (hash, digests, shards) = dealt(b"payload", &PARAMS);
        let mut s = RbcState::default();

        let mut forged = shards[0].clone();
        forged.data[0] ^= 1;
        assert!(matches!(
            s.on_echo(3, hash, digests.clone(), forged, &PARAMS),
            Err(AdkgError::UnboundShard { sender: 3, number: 0 })
        ));
        assert!(matches!(
            s.on_ready(1, hash, digests[..3].to_vec(), shards[0].clone(), &PARAMS),
            Err(AdkgError::UnboundShard { .. })
        ));
        // the rejected sender may still send its real shard
        assert!(s
            .on_echo(3, hash, digests, shards[0].clone(), &PARAMS)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn echoes_for_different_encodings_do_not_add_up() {
        let (hash, digests, shards) = dealt(b"payload", &PARAMS);
        let mut s = RbcState::default();

        // a re-digested forgery lands in its own tally
        let mut forged = shards[0].clone();
        forged.data[0] ^= 1;
        let mut other = digests.clone();
        other[0] = shard_digest(&forged);

        s.on_echo(1, hash, digests.clone(), shards[0].clone(), &PARAMS)
            .unwrap();
        s.on_echo(2, hash, digests, shards[0].clone(), &PARAMS)
            .unwrap();
        assert!(s
            .on_echo(3, hash, other, forged, &PARAMS)
            .unwrap()
            .is_empty());
        assert!(!s.ready_sent);
    }

    #[test]
    fn ready_amplification_needs_echo_support() {
        let (hash, digests, shards) = dealt(b"payload", &PARAMS);
        let mut s = RbcState::default();

        for sender in [2, 3] {
            let shard = shards[sender as usize - 1].clone();
            assert!(s
                .on_ready(sender, hash, digests.clone(), shard, &PARAMS)
                .unwrap()
                .is_empty());
        }
        assert!(!s.ready_sent);

        s.on_echo(2, hash, digests.clone(), shards[0].clone(), &PARAMS)
            .unwrap();
        assert_eq!(
            s.on_echo(3, hash, digests.clone(), shards[0].clone(), &PARAMS)
                .unwrap(),
            vec![RbcAction::Ready {
                hash,
                digests,
                shard: shards[0].clone()
            }]
        );
    }

    #[test]
    fn delivers_once_at_output_threshold() {
        let payload = b"a dealing".to_vec();
        let (hash, digests, shards) = dealt(&payload, &PARAMS);
        let mut s = RbcState::default();
        let ready = |s: &mut RbcState, sender: u32| {
            let shard = shards[sender as usize - 1].clone();
            s.on_ready(sender, hash, digests.clone(), shard, &PARAMS)
                .unwrap()
        };

        ready(&mut s, 1);
        ready(&mut s, 2);
        let actions = ready(&mut s, 3);
        assert!(actions.contains(&RbcAction::Deliver {
            hash,
            data: payload.clone()
        }));
        assert_eq!(s.phase, Phase::Ended);
        assert!(ready(&mut s, 4).is_empty());
    }

    #[test]
    fn delivers_despite_two_corrupted_readies() {
        let t = Params { n: 7, f: 2, k: 3 };
        let payload: Vec<u8> = (0..=200).collect();
        let (hash, digests, shards) = dealt(&payload, &t);
        let mut s = RbcState::default();
        let mut delivered = vec![];

        for (i, shard) in shards.into_iter().enumerate() {
            let sender = i as u32 + 1;
            if i == 3 || i == 6 {
                // one keeps the honest digests, the other re-digests its bad shard
                let mut bad = shard;
                bad.data[0] ^= 0xff;
                if i == 3 {
                    assert!(s
                        .on_ready(sender, hash, digests.clone(), bad, &t)
                        .is_err());
                } else {
                    let mut other = digests.clone();
                    other[i] = shard_digest(&bad);
                    delivered.extend(s.on_ready(sender, hash, other, bad, &t).unwrap());
                }
                continue;
            }
            delivered.extend(s.on_ready(sender, hash, digests.clone(), shard, &t).unwrap());
        }

        assert!(delivered.contains(&RbcAction::Deliver {
            hash,
            data: payload
        }));
        assert_eq!(s.phase, Phase::Ended);
    }
}
