use crate::adkg::AdkgError;
use crate::ids::MAX_INDEX;
use crate::traits::Curve;

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::warn;

/// Participant of a session: the index doubles as the share x-coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDetails<C: Curve> {
    pub index: u32,
    pub public: C::Point,
}

impl<C: Curve> NodeDetails<C> {
    pub fn new(index: u32, public: C::Point) -> Self {
        Self { index, public }
    }
}

/// Tunables of a running node. Every field has a default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Interval between checks for the coin key material.
    pub coin_poll_ms: u64,
    /// Time a coin share waits for its key material before the attempt is abandoned.
    pub coin_timeout_ms: u64,
    pub janitor_interval_secs: u64,
    /// Sessions older than this are evicted by the janitor.
    pub session_ttl_secs: u64,
    pub max_aba_rounds: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            coin_poll_ms: 200,
            coin_timeout_ms: 20_000,
            janitor_interval_secs: 600,
            session_ttl_secs: 300,
            max_aba_rounds: 64,
        }
    }
}

impl Settings {
    pub fn coin_poll(&self) -> Duration {
        Duration::from_millis(self.coin_poll_ms)
    }

    pub fn coin_timeout(&self) -> Duration {
        Duration::from_millis(self.coin_timeout_ms)
    }

    pub fn janitor_interval(&self) -> Duration {
        Duration::from_secs(self.janitor_interval_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// Fault model of a session: `n` nodes, up to `f` faulty, reconstruction threshold `k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub n: usize,
    pub f: usize,
    pub k: usize,
}

impl Params {
    /// Echoes needed before a node sends Ready.
    pub fn echo_threshold(&self) -> usize {
        2 * self.f + 1
    }

    /// Readies needed before a node joins with its own Ready.
    pub fn ready_threshold(&self) -> usize {
        self.f + 1
    }

    /// First ready count at which decoding is attempted.
    pub fn output_threshold(&self) -> usize {
        2 * self.f + 1
    }

    pub fn quorum(&self) -> usize {
        self.n - self.f
    }
}

/// Config holds all required information to run the key generation as one participant.
pub struct Config<C: Curve> {
    /// Index of this node in `nodes`.
    pub index: u32,

    /// Longterm secret key, its public key is listed in `nodes`.
    pub long_term: C::Scalar,

    /// Participants of every session run with this config.
    pub nodes: Vec<NodeDetails<C>>,

    /// Number of shares needed to reconstruct, always `faulty + 1`.
    pub threshold: usize,

    /// Number of tolerated byzantine nodes.
    pub faulty: usize,

    pub settings: Settings,
    pub log: tracing::Span,
}

impl<C: Curve> Config<C> {
    /// Checks the topology and sorts `nodes` by index.
    pub fn validate(&mut self) -> Result<Params, AdkgError> {
        if self.nodes.is_empty() {
            return Err(AdkgError::NodesEmpty);
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if node.index == 0 || node.index > MAX_INDEX {
                return Err(AdkgError::InvalidIndex(node.index));
            }
            if !seen.insert(node.index) {
                return Err(AdkgError::NodesDuplicated(node.index));
            }
        }
        self.nodes.sort_by_key(|node| node.index);

        let n = self.nodes.len();
        let f = self.faulty;
        if f == 0 || self.threshold != f + 1 {
            return Err(AdkgError::InvalidThreshold {
                threshold: self.threshold,
                faulty: f,
            });
        }
        if n < 2 * f + 1 {
            return Err(AdkgError::TooFewNodes { n, faulty: f });
        }
        if n < 3 * f + 1 {
            warn!(parent: &self.log, n, f, "topology tolerates fewer faults than configured");
        }

        let me = self
            .nodes
            .iter()
            .find(|node| node.index == self.index)
            .ok_or(AdkgError::KeyNotFound(self.index))?;
        if C::sk_to_pk(&self.long_term) != me.public {
            return Err(AdkgError::KeyMismatch(self.index));
        }

        Ok(Params {
            n,
            f,
            k: self.threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ScalarField;
    use crate::Bls12381;

    type S = <Bls12381 as Curve>::Scalar;

    fn config(n: u32, f: usize) -> Config<Bls12381> {
        let keys: Vec<S> = (0..n).map(|_| S::random()).collect();
        Config {
            index: 1,
            long_term: keys[0],
            nodes: (1..=n)
                .rev()
                .map(|i| NodeDetails::new(i, Bls12381::sk_to_pk(&keys[i as usize - 1])))
                .collect(),
            threshold: f + 1,
            faulty: f,
            settings: Settings::default(),
            log: tracing::Span::none(),
        }
    }

    #[test]
    fn topology_validation() {
        let mut c = config(7, 2);
        assert_eq!(c.validate().unwrap(), Params { n: 7, f: 2, k: 3 });
        assert_eq!(c.nodes[0].index, 1);

        // n < 3f+1 is accepted
        assert!(config(7, 3).validate().is_ok());
        assert!(matches!(
            config(6, 3).validate(),
            Err(AdkgError::TooFewNodes { n: 6, faulty: 3 })
        ));

        let mut c = config(4, 1);
        c.threshold = 3;
        assert!(matches!(c.validate(), Err(AdkgError::InvalidThreshold { .. })));

        let mut c = config(4, 1);
        c.nodes[1].index = c.nodes[0].index;
        assert!(matches!(c.validate(), Err(AdkgError::NodesDuplicated(_))));

        let mut c = config(4, 1);
        c.long_term = S::random();
        assert!(matches!(c.validate(), Err(AdkgError::KeyMismatch(1))));
    }

    #[test]
    fn settings_defaults() {
        let s: Settings = serde_json::from_str(r#"{"max_aba_rounds": 8}"#).unwrap();
        assert_eq!(s.max_aba_rounds, 8);
        assert_eq!(s.coin_poll(), Duration::from_millis(200));
        assert_eq!(s.coin_timeout(), Duration::from_secs(20));
        assert_eq!(s.janitor_interval(), Duration::from_secs(600));
        assert_eq!(s.session_ttl(), Duration::from_secs(300));
    }
}
