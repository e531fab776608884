//! Builds a `LocalNode` and a peer quorum-set map from a TOML description.
//! This is the ambient counterpart to the teacher's `application::config`
//! and `AppConfig::from_config_file`, which the teacher left as a `todo!()`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ScpError, ScpResult};
use crate::scp::local_node::LocalNode;
use crate::scp::node_id::NodeId;
use crate::scp::quorum_set::QuorumSet;

#[derive(Debug, Deserialize)]
struct RawQuorumSet {
    threshold: u32,
    #[serde(default)]
    validators: Vec<u64>,
    #[serde(default)]
    inner_sets: Vec<RawQuorumSet>,
}

impl From<RawQuorumSet> for QuorumSet {
    fn from(raw: RawQuorumSet) -> Self {
        QuorumSet::new(
            raw.threshold,
            raw.validators.into_iter().map(NodeId::new).collect(),
            raw.inner_sets.into_iter().map(QuorumSet::from).collect(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct RawNodeConfig {
    node_id: u64,
    #[serde(default)]
    is_validator: bool,
    quorum_set: RawQuorumSet,
}

#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    local_node: RawNodeConfig,
    #[serde(default)]
    peers: Vec<RawNodeConfig>,
}

/// The local node plus every peer quorum set mentioned in the file, ready
/// to hand to an `ScpEngine` and to `network_enjoys_quorum_intersection`.
pub struct NetworkConfig {
    pub local_node: LocalNode,
    pub peer_quorum_sets: HashMap<NodeId, Option<QuorumSet>>,
}

pub fn load_from_str(contents: &str) -> ScpResult<NetworkConfig> {
    let raw: RawNetworkConfig = toml::from_str(contents).map_err(|e| ScpError::InsaneQuorumSet(format!("config parse error: {e}")))?;

    let local_quorum_set: QuorumSet = raw.local_node.quorum_set.into();
    let local_node = LocalNode::new(NodeId::new(raw.local_node.node_id), raw.local_node.is_validator, local_quorum_set)
        .map_err(|e| ScpError::InsaneQuorumSet(e.0))?;

    let mut peer_quorum_sets = HashMap::new();
    peer_quorum_sets.insert(local_node.node_id, Some(local_node.quorum_set.clone()));
    for peer in raw.peers {
        let quorum_set: QuorumSet = peer.quorum_set.into();
        peer_quorum_sets.insert(NodeId::new(peer.node_id), Some(quorum_set));
    }

    Ok(NetworkConfig { local_node, peer_quorum_sets })
}

pub fn load_from_file(path: impl AsRef<Path>) -> ScpResult<NetworkConfig> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ScpError::InsaneQuorumSet(format!("cannot read config file {}: {e}", path.display())))?;
    load_from_str(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [local_node]
        node_id = 1
        is_validator = true

        [local_node.quorum_set]
        threshold = 2
        validators = [1, 2, 3]

        [[peers]]
        node_id = 2
        is_validator = true

        [peers.quorum_set]
        threshold = 2
        validators = [1, 2, 3]
    "#;

    #[test]
    fn parses_local_node_and_peers() {
        let config = load_from_str(SAMPLE).unwrap();
        assert_eq!(config.local_node.node_id, NodeId::new(1));
        assert!(config.local_node.is_validator);
        assert_eq!(config.peer_quorum_sets.len(), 2);
    }

    #[test]
    fn rejects_insane_quorum_set() {
        let bad = r#"
            [local_node]
            node_id = 1

            [local_node.quorum_set]
            threshold = 5
            validators = [1]
        "#;
        assert!(load_from_str(bad).is_err());
    }
}
