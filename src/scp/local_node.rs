//! The identity, validator flag and quorum set of the node this engine
//! instance runs as. Grounded on the teacher's `LocalNode`/`LocalNodeBuilder`
//! pair; kept as plain owned data since the engine itself is single-threaded.

use std::collections::HashSet;

use super::federated_voting::{is_quorum_slice, is_v_blocking};
use super::node_id::NodeId;
use super::quorum_set::{is_quorum_set_sane, QuorumSet, SanityError};

#[derive(Clone, Debug)]
pub struct LocalNode {
    pub node_id: NodeId,
    pub is_validator: bool,
    pub quorum_set: QuorumSet,
}

impl LocalNode {
    pub fn new(node_id: NodeId, is_validator: bool, quorum_set: QuorumSet) -> Result<Self, SanityError> {
        is_quorum_set_sane(&quorum_set, false)?;
        Ok(LocalNode { node_id, is_validator, quorum_set })
    }

    pub fn is_v_blocking(&self, nodes: &HashSet<NodeId>) -> bool {
        is_v_blocking(&self.quorum_set, nodes)
    }

    pub fn is_quorum_slice(&self, nodes: &HashSet<NodeId>) -> bool {
        is_quorum_slice(&self.quorum_set, nodes)
    }
}

pub struct LocalNodeBuilder {
    node_id: Option<NodeId>,
    is_validator: Option<bool>,
    quorum_set: Option<QuorumSet>,
}

impl Default for LocalNodeBuilder {
    fn default() -> Self {
        Self { node_id: None, is_validator: None, quorum_set: None }
    }
}

impl LocalNodeBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn is_validator(mut self, is_validator: bool) -> Self {
        self.is_validator = Some(is_validator);
        self
    }

    pub fn quorum_set(mut self, quorum_set: QuorumSet) -> Self {
        self.quorum_set = Some(quorum_set);
        self
    }

    pub fn build(self) -> Result<LocalNode, &'static str> {
        let node_id = self.node_id.ok_or("missing node id")?;
        let is_validator = self.is_validator.ok_or("missing is_validator")?;
        let quorum_set = self.quorum_set.ok_or("missing quorum set")?;

        LocalNode::new(node_id, is_validator, quorum_set).map_err(|_| "quorum set failed sanity check")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_requires_all_fields() {
        assert!(LocalNodeBuilder::new().build().is_err());
        let built = LocalNodeBuilder::new()
            .node_id(NodeId::new(1))
            .is_validator(true)
            .quorum_set(QuorumSet::new(1, vec![NodeId::new(1)], vec![]))
            .build();
        assert!(built.is_ok());
    }

    #[test]
    fn builder_rejects_insane_quorum_set() {
        let built = LocalNodeBuilder::new()
            .node_id(NodeId::new(1))
            .is_validator(true)
            .quorum_set(QuorumSet::new(5, vec![NodeId::new(1)], vec![]))
            .build();
        assert!(built.is_err());
    }
}
