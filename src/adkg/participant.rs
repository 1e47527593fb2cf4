use super::messages::Envelope;
use super::state::NodeState;
use crate::config::NodeDetails;
use crate::config::Params;
use crate::config::Settings;
use crate::crypto::poly::PubPoly;
use crate::crypto::Generators;
use crate::ids::QualifiedSet;
use crate::ids::SessionId;
use crate::traits::Curve;

/// Final output of a session for one node, handed to durable storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedKey<C: Curve> {
    pub session: SessionId,
    /// Private share of the group key, evaluated at this node's index.
    pub share: C::Scalar,
    pub group_key: C::Point,
    /// Dealers whose secrets make up the group key.
    pub qualified: QualifiedSet,
    /// Sum of the qualified dealers' Feldman commitments over `g`.
    pub commitments: PubPoly<C>,
}

/// Capabilities the protocol handlers need from a participant.
///
/// Outbound methods are fire-and-forget, a participant queues and delivers them asynchronously.
/// `broadcast` reaches every node including this one.
pub trait DkgParticipant<C: Curve>: Send + Sync {
    fn id(&self) -> u32;
    fn params(&self) -> &Params;
    /// Participants sorted by index.
    fn nodes(&self) -> &[NodeDetails<C>];
    fn private_key(&self) -> &C::Scalar;
    fn generators(&self) -> &Generators<C>;
    fn state(&self) -> &NodeState<C>;
    fn settings(&self) -> &Settings;
    fn log(&self) -> &tracing::Span;

    fn send(&self, to: u32, env: Envelope);
    fn broadcast(&self, env: Envelope);
    /// Queues a message from this node to itself.
    fn deliver_local(&self, env: Envelope);
    fn publish_group_key(&self, session: SessionId, key: C::Point);
    fn store_completed(&self, key: CompletedKey<C>);
    /// Marks every entry of the session complete.
    fn cleanup(&self, session: SessionId);

    fn public_key(&self, index: u32) -> Option<&C::Point> {
        self.nodes()
            .iter()
            .find(|node| node.index == index)
            .map(|node| &node.public)
    }

    /// 0-based erasure shard position of the node with `index`.
    fn shard_of(&self, index: u32) -> Option<u32> {
        self.nodes()
            .iter()
            .position(|node| node.index == index)
            .map(|pos| pos as u32)
    }
}
