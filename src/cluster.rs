//! Multi-node responsibility oracle.
//!
//! In a cluster every node receives broadcast tasks; the oracle decides which
//! node actually handles a given build. A single-node deployment uses
//! [`SingleNode`], which is responsible for everything.

use serde::{Deserialize, Serialize};

use crate::types::{Build, NodeId};

/// A node known to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: NodeId,
    pub online: bool,
    pub main: bool,
}

/// Tells which node is responsible for what.
pub trait NodeResponsibility: Send + Sync {
    fn current_node(&self) -> NodeId;

    fn is_main_node(&self) -> bool;

    /// Whether this node handles the given build's lifecycle.
    fn is_responsible_for_build(&self, build: &Build) -> bool;

    /// Whether this node may manage builds at all. Used for tasks whose build
    /// can no longer be resolved.
    fn can_manage_builds(&self) -> bool;

    fn nodes(&self) -> Vec<ClusterNode>;

    fn is_node_online(&self, node: &NodeId) -> bool {
        self.nodes().iter().any(|n| &n.id == node && n.online)
    }
}

/// Decides whether this node publishes the removal of a promotion created by
/// `creator`.
///
/// The creator publishes while it is online. Once it goes offline the main
/// node takes over; every other node stays silent.
pub fn owns_queue_removal(cluster: &dyn NodeResponsibility, creator: &NodeId) -> bool {
    if &cluster.current_node() == creator {
        return true;
    }
    cluster.is_main_node() && !cluster.is_node_online(creator)
}

/// The only node of a single-node deployment.
#[derive(Debug, Clone)]
pub struct SingleNode {
    id: NodeId,
}

impl SingleNode {
    pub fn new(id: NodeId) -> Self {
        SingleNode { id }
    }
}

impl NodeResponsibility for SingleNode {
    fn current_node(&self) -> NodeId {
        self.id.clone()
    }

    fn is_main_node(&self) -> bool {
        true
    }

    fn is_responsible_for_build(&self, _build: &Build) -> bool {
        true
    }

    fn can_manage_builds(&self) -> bool {
        true
    }

    fn nodes(&self) -> Vec<ClusterNode> {
        vec![ClusterNode {
            id: self.id.clone(),
            online: true,
            main: true,
        }]
    }
}
