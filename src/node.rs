use crate::adkg;
use crate::adkg::messages::AcssMessage;
use crate::adkg::AdkgError;
use crate::adkg::CompletedKey;
use crate::adkg::DkgParticipant;
use crate::adkg::Envelope;
use crate::adkg::Message;
use crate::adkg::NodeState;
use crate::config::Config;
use crate::config::NodeDetails;
use crate::config::Params;
use crate::config::Settings;
use crate::crypto::Generators;
use crate::ids::RoundId;
use crate::ids::SessionId;
use crate::store::SessionTracker;
use crate::traits::Curve;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use tracing::*;

pub type ExternalError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver of everything a [`Node`] wants to get out, drained by [`Node::run`].
pub type OutboundReceiver<C> = mpsc::UnboundedReceiver<Outbound<C>>;

#[derive(Debug)]
pub enum Outbound<C: Curve> {
    Send { to: u32, env: Envelope },
    Broadcast(Envelope),
    Local(Envelope),
    Publish { session: SessionId, key: C::Point },
    Store(CompletedKey<C>),
}

/// Best-effort point-to-point delivery. The receiving side authenticates the sender.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, to: u32, env: Envelope) -> Result<(), ExternalError>;
}

/// Total-order publication of a recovered group key. Confirmation is reported back
/// through [`Node::bft_decided`].
#[async_trait]
pub trait KeyPublisher<C: Curve>: Send + Sync + 'static {
    async fn publish(&self, session: SessionId, key: C::Point) -> Result<(), ExternalError>;
}

#[async_trait]
pub trait ShareStorage<C: Curve>: Send + Sync + 'static {
    async fn store(&self, key: CompletedKey<C>) -> Result<(), ExternalError>;
}

/// Participant running every key generation session of one configuration.
pub struct Node<C: Curve> {
    id: u32,
    params: Params,
    nodes: Vec<NodeDetails<C>>,
    private_key: C::Scalar,
    generators: Generators<C>,
    state: NodeState<C>,
    settings: Settings,
    log: Span,
    tracker: SessionTracker<SessionId>,
    outbox: mpsc::UnboundedSender<Outbound<C>>,
    shutdown: Notify,
}

impl<C: Curve> Node<C> {
    /// Validates the configuration. Returns the node and the receiver to pass to [`Self::run`].
    pub fn new(mut config: Config<C>) -> Result<(Arc<Self>, OutboundReceiver<C>), AdkgError> {
        let params = config.validate()?;
        let (outbox, rx) = mpsc::unbounded_channel();
        info!(parent: &config.log, n = params.n, f = params.f, k = params.k, "node configured");

        let node = Self {
            id: config.index,
            params,
            nodes: config.nodes,
            private_key: config.long_term,
            generators: Generators::new(),
            state: NodeState::default(),
            settings: config.settings,
            log: config.log,
            tracker: SessionTracker::new(),
            outbox,
            shutdown: Notify::new(),
        };

        Ok((Arc::new(node), rx))
    }

    /// Drains the outbox into the external collaborators and runs the janitor,
    /// until [`Self::shutdown`] is called.
    pub async fn run<T, K, S>(
        self: Arc<Self>,
        mut rx: OutboundReceiver<C>,
        transport: Arc<T>,
        publisher: Arc<K>,
        storage: Arc<S>,
    ) where
        T: Transport,
        K: KeyPublisher<C>,
        S: ShareStorage<C>,
    {
        let mut janitor = tokio::time::interval(self.settings.janitor_interval());
        // First tick completes immediately
        janitor.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = janitor.tick() => self.sweep(),
                out = rx.recv() => match out {
                    Some(out) => self.forward(out, &transport, &publisher, &storage),
                    None => break,
                },
            }
        }
        info!(parent: &self.log, "node stopped");
    }

    fn forward<T, K, S>(
        self: &Arc<Self>,
        out: Outbound<C>,
        transport: &Arc<T>,
        publisher: &Arc<K>,
        storage: &Arc<S>,
    ) where
        T: Transport,
        K: KeyPublisher<C>,
        S: ShareStorage<C>,
    {
        match out {
            Outbound::Send { to, env } => self.transmit(to, env, transport),
            Outbound::Broadcast(env) => {
                for node in &self.nodes {
                    self.transmit(node.index, env.clone(), transport);
                }
            }
            Outbound::Local(env) => self.receive(self.id, env),
            Outbound::Publish { session, key } => {
                let (publisher, log) = (Arc::clone(publisher), self.log.clone());
                tokio::spawn(async move {
                    if let Err(err) = publisher.publish(session, key).await {
                        error!(parent: &log, %session, "failed to publish group key: {err}");
                    }
                });
            }
            Outbound::Store(key) => {
                let (storage, log) = (Arc::clone(storage), self.log.clone());
                tokio::spawn(async move {
                    let session = key.session;
                    if let Err(err) = storage.store(key).await {
                        error!(parent: &log, %session, "failed to store key share: {err}");
                    }
                });
            }
        }
    }

    fn transmit<T: Transport>(self: &Arc<Self>, to: u32, env: Envelope, transport: &Arc<T>) {
        if to == self.id {
            return self.receive(self.id, env);
        }
        let (transport, log) = (Arc::clone(transport), self.log.clone());
        tokio::spawn(async move {
            let round = env.round;
            if let Err(err) = transport.send(to, env).await {
                debug!(parent: &log, %round, to, "send failed: {err}");
            }
        });
    }

    /// Handles an envelope from `sender` on its own task. Only [`Node::start_keygen`]
    /// registers sessions with the janitor.
    /// State created by peers expires through eviction.
    pub fn receive(self: &Arc<Self>, sender: u32, env: Envelope) {
        let node = Arc::clone(self);
        tokio::spawn(async move { adkg::dispatch(&*node, sender, &env).await });
    }

    /// Starts this node's dealing for `session`. Starting twice is a no-op.
    pub fn start_keygen(&self, session: SessionId) -> Result<(), AdkgError> {
        if session.curve != C::ID {
            return Err(AdkgError::CurveMismatch {
                expected: C::ID,
                received: session.curve,
            });
        }
        self.tracker.add(session);
        info!(parent: &self.log, %session, "starting key generation");

        let round = RoundId::acss(session, self.id);
        let env = Envelope::seal(round, C::ID, &Message::Acss(AcssMessage::Share))?;
        self.deliver_local(env);

        Ok(())
    }

    /// Resumes completion of `session` once the ordering service committed its group key.
    pub async fn bft_decided(&self, session: SessionId) {
        adkg::bft_decided(self, session).await
    }

    /// Deletes every entry of `session`, tombstones included.
    pub fn remove(&self, session: SessionId) {
        self.state.delete_session(session);
        self.tracker.forget(&session);
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    fn sweep(&self) {
        let ttl = self.settings.session_ttl();
        let expired = self.tracker.expired(ttl);
        for session in &expired {
            self.remove(*session);
        }
        let evicted = self.state.evict(ttl);
        if !expired.is_empty() || evicted > 0 {
            info!(parent: &self.log, sessions = expired.len(), evicted, "janitor swept");
        }
    }

    fn push(&self, out: Outbound<C>) {
        if self.outbox.send(out).is_err() {
            warn!(parent: &self.log, "outbox closed, dropping");
        }
    }
}

impl<C: Curve> DkgParticipant<C> for Node<C> {
    fn id(&self) -> u32 {
        self.id
    }

    fn params(&self) -> &Params {
        &self.params
    }

    fn nodes(&self) -> &[NodeDetails<C>] {
        &self.nodes
    }

    fn private_key(&self) -> &C::Scalar {
        &self.private_key
    }

    fn generators(&self) -> &Generators<C> {
        &self.generators
    }

    fn state(&self) -> &NodeState<C> {
        &self.state
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn log(&self) -> &Span {
        &self.log
    }

    fn send(&self, to: u32, env: Envelope) {
        self.push(Outbound::Send { to, env })
    }

    fn broadcast(&self, env: Envelope) {
        self.push(Outbound::Broadcast(env))
    }

    fn deliver_local(&self, env: Envelope) {
        self.push(Outbound::Local(env))
    }

    fn publish_group_key(&self, session: SessionId, key: C::Point) {
        self.push(Outbound::Publish { session, key })
    }

    fn store_completed(&self, key: CompletedKey<C>) {
        self.push(Outbound::Store(key))
    }

    fn cleanup(&self, session: SessionId) {
        self.state.complete_session(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::poly::recover_secret;
    use crate::crypto::poly::PriShare;
    use crate::curves::CurveId;
    use crate::traits::Point;
    use crate::traits::ScalarField;
    use crate::Bls12381;
    use crate::Bn254;

    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    type Peers<C> = Arc<Mutex<BTreeMap<u32, Arc<Node<C>>>>>;

    struct MemoryTransport<C: Curve> {
        from: u32,
        peers: Peers<C>,
    }

    #[async_trait]
    impl<C: Curve> Transport for MemoryTransport<C> {
        async fn send(&self, to: u32, env: Envelope) -> Result<(), ExternalError> {
            let peer = self.peers.lock().unwrap().get(&to).cloned();
            peer.ok_or("unknown peer")?.receive(self.from, env);
            Ok(())
        }
    }

    struct Publisher<C: Curve> {
        index: u32,
        tx: mpsc::UnboundedSender<(u32, SessionId, C::Point)>,
    }

    #[async_trait]
    impl<C: Curve> KeyPublisher<C> for Publisher<C> {
        async fn publish(&self, session: SessionId, key: C::Point) -> Result<(), ExternalError> {
            self.tx.send((self.index, session, key))?;
            Ok(())
        }
    }

    struct Storage<C: Curve> {
        index: u32,
        tx: mpsc::UnboundedSender<(u32, CompletedKey<C>)>,
    }

    #[async_trait]
    impl<C: Curve> ShareStorage<C> for Storage<C> {
        async fn store(&self, key: CompletedKey<C>) -> Result<(), ExternalError> {
            self.tx.send((self.index, key))?;
            Ok(())
        }
    }

    fn configs<C: Curve>(n: u32, f: usize) -> Vec<Config<C>> {
        let keys: Vec<C::Scalar> = (0..n).map(|_| C::Scalar::random()).collect();
        let nodes: Vec<NodeDetails<C>> = keys
            .iter()
            .zip(1..)
            .map(|(sk, index)| NodeDetails::new(index, C::sk_to_pk(sk)))
            .collect();
        let settings = Settings {
            coin_poll_ms: 10,
            ..Default::default()
        };

        keys.iter()
            .zip(1..)
            .map(|(sk, index)| Config {
                index,
                long_term: *sk,
                nodes: nodes.clone(),
                threshold: f + 1,
                faulty: f,
                settings: settings.clone(),
                log: info_span!("node", index),
            })
            .collect()
    }

    async fn keygen<C: Curve>(curve: CurveId) {
        let (n, f) = (4, 1);
        let session = SessionId::new(7, curve);
        let peers: Peers<C> = Default::default();
        let (pub_tx, mut published) = mpsc::unbounded_channel();
        let (store_tx, mut stored) = mpsc::unbounded_channel();

        let mut nodes = vec![];
        for config in configs::<C>(n, f) {
            let index = config.index;
            let (node, rx) = Node::new(config).unwrap();
            peers.lock().unwrap().insert(index, Arc::clone(&node));
            let transport = MemoryTransport {
                from: index,
                peers: Arc::clone(&peers),
            };
            let publisher = Publisher {
                index,
                tx: pub_tx.clone(),
            };
            let storage = Storage {
                index,
                tx: store_tx.clone(),
            };
            let runner = Arc::clone(&node).run(
                rx,
                Arc::new(transport),
                Arc::new(publisher),
                Arc::new(storage),
            );
            tokio::spawn(runner);
            nodes.push(node);
        }
        for node in &nodes {
            node.start_keygen(session).unwrap();
        }

        let wait = Duration::from_secs(60);
        let mut group_keys = BTreeMap::new();
        while group_keys.len() < n as usize {
            let (index, s, key) = tokio::time::timeout(wait, published.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(s, session);
            group_keys.insert(index, key);
        }
        for node in &nodes {
            node.bft_decided(session).await;
        }

        let mut completed = BTreeMap::new();
        while completed.len() < n as usize {
            let (index, key) = tokio::time::timeout(wait, stored.recv())
                .await
                .unwrap()
                .unwrap();
            completed.insert(index, key);
        }

        let group_key = group_keys[&1].clone();
        let first: &CompletedKey<C> = &completed[&1];
        assert!(group_keys.values().all(|key| *key == group_key));
        assert!(completed.values().all(|key| key.group_key == group_key));
        assert!(completed.values().all(|key| key.qualified == first.qualified));
        assert!(first.qualified.len() >= f + 1);

        let shares: Vec<PriShare<C::Scalar>> = completed
            .iter()
            .map(|(i, key)| PriShare { i: *i, v: key.share })
            .collect();
        let secret = recover_secret(&shares[2..], f + 1).unwrap();
        assert_eq!(C::Point::generator() * &secret, group_key);
        let g = &nodes[0].generators().g;
        assert_eq!(first.commitments.public_key(), Some(&(g.clone() * &secret)));

        for node in &nodes {
            assert!(node.state().sessions.is_complete(&session));
            node.shutdown();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn four_nodes_agree_on_group_key() {
        keygen::<Bls12381>(CurveId::Bls12381).await;
        keygen::<Bn254>(CurveId::Bn254).await;
    }

    #[tokio::test]
    async fn start_keygen_rejects_foreign_curve() {
        let config = configs::<Bls12381>(4, 1).remove(0);
        let (node, _rx) = Node::new(config).unwrap();
        let err = node
            .start_keygen(SessionId::new(1, CurveId::Bn254))
            .unwrap_err();
        assert!(matches!(err, AdkgError::CurveMismatch { .. }));
    }

    #[tokio::test]
    async fn janitor_removes_expired_sessions() {
        let mut config = configs::<Bls12381>(4, 1).remove(0);
        config.settings.session_ttl_secs = 0;
        let (node, mut rx) = Node::new(config).unwrap();
        let session = SessionId::new(3, CurveId::Bls12381);

        node.start_keygen(session).unwrap();
        assert!(matches!(rx.recv().await, Some(Outbound::Local(_))));
        node.cleanup(session);
        assert!(node.state().sessions.is_complete(&session));

        node.sweep();
        assert!(!node.state().sessions.is_complete(&session));
        assert!(node.state().sessions.is_empty());
    }

    #[tokio::test]
    async fn received_envelopes_do_not_register_sessions() {
        let config = configs::<Bls12381>(4, 1).remove(0);
        let (node, _rx) = Node::new(config).unwrap();
        let session = SessionId::new(11, CurveId::Bls12381);
        let propose = Message::Acss(AcssMessage::Propose { data: vec![1, 2, 3] });
        let env = Envelope::seal(RoundId::acss(session, 2), CurveId::Bls12381, &propose).unwrap();

        node.receive(9, env.clone());
        node.receive(2, env);
        assert!(node.tracker.expired(Duration::ZERO).is_empty());

        node.start_keygen(session).unwrap();
        assert_eq!(node.tracker.expired(Duration::ZERO), vec![session]);
    }
}
