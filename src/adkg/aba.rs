use super::messages::AbaMessage;
use super::messages::Message;
use super::participant::DkgParticipant;
use super::AdkgError;
use crate::config::Params;
use crate::ids::RoundId;
use crate::traits::Curve;

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::info;
use tracing::warn;

/// Vote value standing for "both 0 and 1 are possible".
pub const AMBIGUOUS: u8 = 2;

/// Candidate sets of the last step, in the order they are checked.
const CANDIDATES: [&[u8]; 5] = [&[1], &[0], &[AMBIGUOUS], &[0, AMBIGUOUS], &[1, AMBIGUOUS]];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    Est1,
    Aux1,
    AuxSet,
    Est2,
    Aux2,
}

impl Tag {
    fn message(self, v: u8, r: u32) -> AbaMessage {
        match self {
            Tag::Est1 => AbaMessage::Est1 { v, r },
            Tag::Aux1 => AbaMessage::Aux1 { v, r },
            Tag::AuxSet => AbaMessage::AuxSet { v, r },
            Tag::Est2 => AbaMessage::Est2 { v, r },
            Tag::Aux2 => AbaMessage::Aux2 { v, r },
        }
    }

    fn max_value(self) -> u8 {
        match self {
            Tag::Est1 | Tag::Aux1 => 1,
            Tag::AuxSet | Tag::Est2 | Tag::Aux2 => AMBIGUOUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Decided(u8),
    Next(u8),
    AwaitCoin,
    Coin(bool),
}

/// Side effects requested by [`AbaState`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbaAction {
    Broadcast { tag: Tag, v: u8, r: u32 },
    Decide(u8),
    /// Release this node's coin share for sub-round `r`.
    ReleaseCoin(u32),
    /// Sub-round `r` would exceed the configured bound and was not started.
    RoundLimit(u32),
}

/// Binary agreement of one dealer. Pure state machine, sub-rounds are driven by an
/// explicit loop so an outcome of round r starts round r+1 within the same call.
#[derive(Debug, Default)]
pub struct AbaState {
    started: BTreeSet<u32>,
    votes: HashMap<(Tag, u32), BTreeMap<u8, BTreeSet<u32>>>,
    bin: HashMap<u32, Vec<u8>>,
    bin2: HashMap<u32, Vec<u8>>,
    /// At most one send per (tag, r, value).
    sent: HashSet<(Tag, u32, u8)>,
    finished: BTreeMap<u32, Outcome>,
    coins: BTreeMap<u32, bool>,
    decided: Option<u8>,
}

impl AbaState {
    pub fn decided(&self) -> Option<u8> {
        self.decided
    }

    pub fn bin(&self, r: u32) -> &[u8] {
        self.bin.get(&r).map_or(&[], Vec::as_slice)
    }

    pub fn bin2(&self, r: u32) -> &[u8] {
        self.bin2.get(&r).map_or(&[], Vec::as_slice)
    }

    pub fn is_started(&self, r: u32) -> bool {
        self.started.contains(&r)
    }

    /// Starts sub-round `r` with estimate `v`. Starting a round twice is a no-op.
    pub fn start(
        &mut self,
        v: u8,
        r: u32,
        t: &Params,
        max_rounds: u32,
    ) -> Result<Vec<AbaAction>, AdkgError> {
        if v > 1 {
            return Err(AdkgError::InvalidVote(v));
        }

        Ok(self.drive(Some((v, r)), vec![], t, max_rounds))
    }

    pub fn on_vote(
        &mut self,
        tag: Tag,
        sender: u32,
        v: u8,
        r: u32,
        t: &Params,
        max_rounds: u32,
    ) -> Result<Vec<AbaAction>, AdkgError> {
        if v > tag.max_value() {
            return Err(AdkgError::InvalidVote(v));
        }
        let fresh = self
            .votes
            .entry((tag, r))
            .or_default()
            .entry(v)
            .or_default()
            .insert(sender);
        if !fresh {
            return Ok(vec![]);
        }

        let mut out = vec![];
        let next = self.evaluate(r, t, &mut out);

        Ok(self.drive(next, out, t, max_rounds))
    }

    pub fn on_coin(&mut self, r: u32, coin: bool, t: &Params, max_rounds: u32) -> Vec<AbaAction> {
        if self.coins.insert(r, coin).is_some() {
            return vec![];
        }
        if self.finished.get(&r) != Some(&Outcome::AwaitCoin) {
            return vec![];
        }
        self.finished.insert(r, Outcome::Coin(coin));

        self.drive(Some((coin as u8, r + 1)), vec![], t, max_rounds)
    }

    fn drive(
        &mut self,
        mut next: Option<(u8, u32)>,
        mut out: Vec<AbaAction>,
        t: &Params,
        max_rounds: u32,
    ) -> Vec<AbaAction> {
        while let Some((v, r)) = next.take() {
            if r >= max_rounds {
                out.push(AbaAction::RoundLimit(r));
                break;
            }
            if !self.started.insert(r) {
                break;
            }
            self.send_once(Tag::Est1, r, v, &mut out);
            next = self.evaluate(r, t, &mut out);
        }

        out
    }

    fn send_once(&mut self, tag: Tag, r: u32, v: u8, out: &mut Vec<AbaAction>) {
        if self.sent.insert((tag, r, v)) {
            out.push(AbaAction::Broadcast { tag, v, r });
        }
    }

    fn count(&self, tag: Tag, r: u32, v: u8) -> usize {
        self.votes
            .get(&(tag, r))
            .and_then(|votes| votes.get(&v))
            .map_or(0, BTreeSet::len)
    }

    /// Distinct senders that voted any of `values`.
    fn senders(&self, tag: Tag, r: u32, values: &[u8]) -> usize {
        let Some(votes) = self.votes.get(&(tag, r)) else {
            return 0;
        };
        values
            .iter()
            .filter_map(|v| votes.get(v))
            .flatten()
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Amplifies a value at f+1 votes, admits it to the bin at 2f+1.
    fn bv_broadcast(&mut self, tag: Tag, r: u32, t: &Params, out: &mut Vec<AbaAction>) {
        for v in 0..=tag.max_value() {
            let count = self.count(tag, r, v);
            if count >= t.f + 1 {
                self.send_once(tag, r, v, out);
            }
            if count >= 2 * t.f + 1 {
                let bins = if tag == Tag::Est1 {
                    &mut self.bin
                } else {
                    &mut self.bin2
                };
                let bin = bins.entry(r).or_default();
                if !bin.contains(&v) {
                    bin.push(v);
                }
            }
        }
    }

    /// 1 or 0 if a quorum voted it, ambiguous if both are binned and a quorum voted binned values.
    fn aux_view(&self, tag: Tag, r: u32, t: &Params) -> Option<u8> {
        let bin = self.bin(r);
        for v in [1, 0] {
            if bin.contains(&v) && self.count(tag, r, v) >= t.quorum() {
                return Some(v);
            }
        }
        if bin.contains(&0)
            && bin.contains(&1)
            && self.senders(tag, r, &[0, 1, AMBIGUOUS]) >= t.quorum()
        {
            return Some(AMBIGUOUS);
        }

        None
    }

    fn final_view(&self, r: u32, t: &Params) -> Option<&'static [u8]> {
        let bin2 = self.bin2(r);
        CANDIDATES.into_iter().find(|candidate| {
            candidate.iter().all(|v| bin2.contains(v))
                && self.senders(Tag::Aux2, r, candidate) >= t.quorum()
        })
    }

    /// Re-checks every threshold of sub-round `r`. Returns the round to start next, if any.
    fn evaluate(&mut self, r: u32, t: &Params, out: &mut Vec<AbaAction>) -> Option<(u8, u32)> {
        self.bv_broadcast(Tag::Est1, r, t, out);
        self.bv_broadcast(Tag::Est2, r, t, out);
        if !self.started.contains(&r) || self.finished.contains_key(&r) {
            return None;
        }

        if let Some(&b) = self.bin(r).first() {
            self.send_once(Tag::Aux1, r, b, out);
        }
        if let Some(v) = self.aux_view(Tag::Aux1, r, t) {
            self.send_once(Tag::AuxSet, r, v, out);
        }
        if let Some(v) = self.aux_view(Tag::AuxSet, r, t) {
            self.send_once(Tag::Est2, r, v, out);
        }
        if let Some(&b) = self.bin2(r).first() {
            self.send_once(Tag::Aux2, r, b, out);
        }

        match *self.final_view(r, t)? {
            [w] if w <= 1 => {
                self.finished.insert(r, Outcome::Decided(w));
                if self.decided.is_some() {
                    return None;
                }
                self.decided = Some(w);
                out.push(AbaAction::Decide(w));
                Some((w, r + 1))
            }
            [v, _] => {
                self.finished.insert(r, Outcome::Next(v));
                out.push(AbaAction::ReleaseCoin(r));
                Some((v, r + 1))
            }
            _ => {
                out.push(AbaAction::ReleaseCoin(r));
                match self.coins.get(&r) {
                    Some(&coin) => {
                        self.finished.insert(r, Outcome::Coin(coin));
                        Some((coin as u8, r + 1))
                    }
                    None => {
                        self.finished.insert(r, Outcome::AwaitCoin);
                        None
                    }
                }
            }
        }
    }
}

pub(super) async fn handle<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    msg: AbaMessage,
) -> Result<(), AdkgError> {
    let (tag, v, r) = match msg {
        AbaMessage::Init { v, r } => return init(p, sender, round, v, r).await,
        AbaMessage::CoinInit { r } => return super::coin::release(p, sender, round, r).await,
        AbaMessage::Coin { r, share, proof } => {
            return super::coin::on_share(p, sender, round, r, &share, &proof).await
        }
        AbaMessage::Est1 { v, r } => (Tag::Est1, v, r),
        AbaMessage::Aux1 { v, r } => (Tag::Aux1, v, r),
        AbaMessage::AuxSet { v, r } => (Tag::AuxSet, v, r),
        AbaMessage::Est2 { v, r } => (Tag::Est2, v, r),
        AbaMessage::Aux2 { v, r } => (Tag::Aux2, v, r),
    };

    let params = *p.params();
    let max_rounds = p.settings().max_aba_rounds;
    let actions = p
        .state()
        .aba
        .with(round, AbaState::default, |s| {
            s.on_vote(tag, sender, v, r, &params, max_rounds)
        })
        .await
        .transpose()?
        .unwrap_or_default();

    apply(p, round, actions).await
}

async fn init<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    sender: u32,
    round: &RoundId,
    v: u8,
    r: u32,
) -> Result<(), AdkgError> {
    super::ensure_local(p, sender)?;
    let params = *p.params();
    let max_rounds = p.settings().max_aba_rounds;
    info!(parent: p.log(), %round, v, r, "starting agreement");

    let actions = p
        .state()
        .aba
        .with(round, AbaState::default, |s| s.start(v, r, &params, max_rounds))
        .await
        .transpose()?
        .unwrap_or_default();

    apply(p, round, actions).await
}

/// Feeds a combined coin into the agreement of `round`.
pub(super) async fn on_coin<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    r: u32,
    coin: bool,
) -> Result<(), AdkgError> {
    let params = *p.params();
    let max_rounds = p.settings().max_aba_rounds;
    let actions = p
        .state()
        .aba
        .with(round, AbaState::default, |s| {
            s.on_coin(r, coin, &params, max_rounds)
        })
        .await
        .unwrap_or_default();

    apply(p, round, actions).await
}

async fn apply<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    actions: Vec<AbaAction>,
) -> Result<(), AdkgError> {
    for action in actions {
        match action {
            AbaAction::Broadcast { tag, v, r } => {
                super::broadcast(p, round, &Message::Aba(tag.message(v, r)))?
            }
            AbaAction::Decide(v) => on_decide(p, round, v).await?,
            AbaAction::ReleaseCoin(r) => {
                super::local(p, round, &Message::Aba(AbaMessage::CoinInit { r }))?
            }
            AbaAction::RoundLimit(r) => {
                warn!(parent: p.log(), %round, r, "agreement reached the sub-round limit")
            }
        }
    }

    Ok(())
}

/// Records the first decision for the dealer. A decision of 1 closes the agreement phase:
/// every dealer whose agreement has not started yet gets a default vote of 0.
async fn on_decide<C: Curve, P: DkgParticipant<C>>(
    p: &P,
    round: &RoundId,
    v: u8,
) -> Result<(), AdkgError> {
    info!(parent: p.log(), %round, v, "agreement decided");
    let dealers: Vec<u32> = p.nodes().iter().map(|node| node.index).collect();

    let defaults = p
        .state()
        .sessions
        .with(&round.session, Default::default, |s| {
            if s.decisions.contains_key(&round.dealer) {
                return vec![];
            }
            s.decisions.insert(round.dealer, v == 1);
            if v != 1 || s.aba_complete {
                return vec![];
            }
            s.aba_complete = true;
            let pending: Vec<u32> = dealers
                .iter()
                .copied()
                .filter(|d| !s.aba_started.contains(d))
                .collect();
            s.aba_started.extend(pending.iter().copied());
            pending
        })
        .await
        .unwrap_or_default();

    for dealer in defaults {
        let target = RoundId::keyset(round.session, dealer);
        super::local(p, &target, &Message::Aba(AbaMessage::Init { v: 0, r: 0 }))?;
    }

    super::derivation::try_start(p, round.session).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const MAX: u32 = 64;
    /// Sub-rounds a Byzantine sender spams.
    const SPAMMED: u32 = 8;
    const TAGS: [Tag; 5] = [Tag::Est1, Tag::Aux1, Tag::AuxSet, Tag::Est2, Tag::Aux2];

    enum Event {
        Vote {
            to: usize,
            from: u32,
            tag: Tag,
            v: u8,
            r: u32,
        },
        Coin {
            to: usize,
            r: u32,
        },
    }

    struct Net {
        honest: usize,
        f: usize,
        byzantine: usize,
        queue: Vec<Event>,
        released: BTreeMap<u32, BTreeSet<usize>>,
        coins_sent: BTreeSet<u32>,
    }

    impl Net {
        fn push(&mut self, from: usize, actions: Vec<AbaAction>) {
            for action in actions {
                match action {
                    AbaAction::Broadcast { tag, v, r } => {
                        for to in 0..self.honest {
                            self.queue.push(Event::Vote {
                                to,
                                from: from as u32 + 1,
                                tag,
                                v,
                                r,
                            });
                        }
                    }
                    AbaAction::ReleaseCoin(r) => {
                        // Byzantine nodes hand out their coin shares right away
                        let released = self.released.entry(r).or_default();
                        released.insert(from);
                        if released.len() + self.byzantine > self.f && self.coins_sent.insert(r) {
                            for to in 0..self.honest {
                                self.queue.push(Event::Coin { to, r });
                            }
                        }
                    }
                    AbaAction::Decide(_) | AbaAction::RoundLimit(_) => {}
                }
            }
        }

        /// Every Byzantine sender votes random values, chosen per recipient, for each tag of
        /// the first sub-rounds. Some recipients get both values.
        fn spam(&mut self, rng: &mut ChaCha8Rng) {
            let n = self.honest + self.byzantine;
            for from in self.honest as u32 + 1..=n as u32 {
                for r in 0..SPAMMED {
                    for tag in TAGS {
                        for to in 0..self.honest {
                            let count = if rng.gen_bool(0.3) { 2 } else { 1 };
                            for _ in 0..count {
                                let v = rng.gen_range(0..=tag.max_value());
                                self.queue.push(Event::Vote { to, from, tag, v, r });
                            }
                        }
                    }
                }
            }
        }
    }

    /// Runs one instance per honest input next to `byzantine` adversarial senders, under a
    /// random delivery order. Returns the honest decisions and whether any coin was needed.
    fn simulate(inputs: &[u8], f: usize, byzantine: usize, seed: u64) -> (Vec<Option<u8>>, bool) {
        let honest = inputs.len();
        let t = Params {
            n: honest + byzantine,
            f,
            k: f + 1,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let coins: Vec<bool> = (0..MAX).map(|_| rng.gen()).collect();

        let mut nodes: Vec<AbaState> = (0..honest).map(|_| AbaState::default()).collect();
        let mut net = Net {
            honest,
            f,
            byzantine,
            queue: vec![],
            released: BTreeMap::new(),
            coins_sent: BTreeSet::new(),
        };
        net.spam(&mut rng);
        for (i, v) in inputs.iter().enumerate() {
            let actions = nodes[i].start(*v, 0, &t, MAX).unwrap();
            net.push(i, actions);
        }

        while !net.queue.is_empty() {
            let at = rng.gen_range(0..net.queue.len());
            let (to, actions) = match net.queue.swap_remove(at) {
                Event::Vote {
                    to,
                    from,
                    tag,
                    v,
                    r,
                } => (to, nodes[to].on_vote(tag, from, v, r, &t, MAX).unwrap()),
                Event::Coin { to, r } => (to, nodes[to].on_coin(r, coins[r as usize], &t, MAX)),
            };
            net.push(to, actions);
        }

        (
            nodes.iter().map(AbaState::decided).collect(),
            !net.coins_sent.is_empty(),
        )
    }

    #[test]
    fn unanimous_input_decides_without_coin() {
        for v in [0, 1] {
            for seed in 0..5 {
                let (decisions, coin) = simulate(&[v; 4], 1, 0, seed);
                assert!(decisions.iter().all(|d| *d == Some(v)));
                assert!(!coin);
            }
        }
    }

    #[test]
    fn honest_nodes_agree() {
        for seed in 0..20 {
            for inputs in [vec![1, 0, 1, 0], vec![0, 0, 1, 1, 1, 0, 1]] {
                let f = (inputs.len() - 1) / 3;
                let (decisions, _) = simulate(&inputs, f, 0, seed);
                let first = decisions[0];
                assert!(first.is_some(), "seed {seed}: no decision");
                assert!(decisions.iter().all(|d| *d == first), "seed {seed}: {decisions:?}");
            }
        }
    }

    #[test]
    fn agreement_with_byzantine_senders() {
        for seed in 0..300 {
            for inputs in [vec![1, 0, 1], vec![0, 1, 1, 0, 1]] {
                let f = (inputs.len() - 1) / 2;
                let (decisions, _) = simulate(&inputs, f, f, seed);
                let first = decisions[0];
                assert!(first.is_some(), "seed {seed}: no decision");
                assert!(decisions.iter().all(|d| *d == first), "seed {seed}: {decisions:?}");
            }
        }
    }

    #[test]
    fn byzantine_senders_cannot_flip_unanimous_input() {
        for v in [0, 1] {
            for seed in 0..50 {
                let (decisions, _) = simulate(&[v; 5], 2, 2, seed);
                assert!(decisions.iter().all(|d| *d == Some(v)), "seed {seed}: {decisions:?}");
            }
        }
    }

    #[test]
    fn redelivery_is_idempotent() {
        let t = Params { n: 4, f: 1, k: 2 };
        let mut s = AbaState::default();
        s.start(1, 0, &t, MAX).unwrap();

        assert_eq!(s.on_vote(Tag::Est1, 2, 0, 0, &t, MAX).unwrap(), vec![]);
        assert_eq!(
            s.on_vote(Tag::Est1, 3, 0, 0, &t, MAX).unwrap(),
            vec![AbaAction::Broadcast {
                tag: Tag::Est1,
                v: 0,
                r: 0
            }]
        );
        assert_eq!(s.on_vote(Tag::Est1, 3, 0, 0, &t, MAX).unwrap(), vec![]);
        assert!(s.bin(0).is_empty());
    }

    #[test]
    fn votes_before_start_are_kept() {
        let t = Params { n: 4, f: 1, k: 2 };
        let mut s = AbaState::default();
        for sender in 1..=3 {
            s.on_vote(Tag::Est1, sender, 1, 0, &t, MAX).unwrap();
        }
        assert_eq!(s.bin(0), &[1]);
        assert!(!s.is_started(0));

        // Est1(1) was amplified already, so starting only adds Aux1
        assert_eq!(
            s.start(1, 0, &t, MAX).unwrap(),
            vec![AbaAction::Broadcast {
                tag: Tag::Aux1,
                v: 1,
                r: 0
            }]
        );
    }

    #[test]
    fn out_of_range_votes() {
        let t = Params { n: 4, f: 1, k: 2 };
        let mut s = AbaState::default();
        assert!(matches!(
            s.on_vote(Tag::Est1, 1, AMBIGUOUS, 0, &t, MAX),
            Err(AdkgError::InvalidVote(2))
        ));
        assert!(s.on_vote(Tag::Aux2, 1, AMBIGUOUS, 0, &t, MAX).is_ok());
        assert!(matches!(s.start(3, 0, &t, MAX), Err(AdkgError::InvalidVote(3))));
    }
}
