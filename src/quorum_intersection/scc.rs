//! Tarjan's strongly-connected-components algorithm over the successor
//! graph built in `graph.rs`. The reference `TarjanSCCCalculator` recurses
//! natively; this version uses an explicit work stack so a deep quorum
//! graph cannot exhaust the call stack.

use super::graph::QGraph;

pub fn strongly_connected_components(graph: &QGraph) -> Vec<Vec<usize>> {
    let n = graph.node_count;
    let mut index_counter = 0usize;
    let mut indices: Vec<Option<usize>> = vec![None; n];
    let mut lowlink: Vec<usize> = vec![0; n];
    let mut on_stack: Vec<bool> = vec![false; n];
    let mut tarjan_stack: Vec<usize> = Vec::new();
    let mut result: Vec<Vec<usize>> = Vec::new();

    for start in 0..n {
        if indices[start].is_some() {
            continue;
        }

        // (node, index into its successor list already visited)
        let mut work: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(&(node, child_pos)) = work.last() {
            if child_pos == 0 {
                indices[node] = Some(index_counter);
                lowlink[node] = index_counter;
                index_counter += 1;
                tarjan_stack.push(node);
                on_stack[node] = true;
            }

            let successors: Vec<usize> = graph.successors(node).iter().collect();
            if child_pos < successors.len() {
                let child = successors[child_pos];
                work.last_mut().unwrap().1 += 1;

                if indices[child].is_none() {
                    work.push((child, 0));
                } else if on_stack[child] {
                    lowlink[node] = lowlink[node].min(indices[child].unwrap());
                }
            } else {
                work.pop();
                if let Some(&(parent, _)) = work.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[node]);
                }
                if lowlink[node] == indices[node].unwrap() {
                    let mut component = Vec::new();
                    loop {
                        let w = tarjan_stack.pop().expect("tarjan stack non-empty while closing a component");
                        on_stack[w] = false;
                        component.push(w);
                        if w == node {
                            break;
                        }
                    }
                    result.push(component);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum_intersection::graph::QGraph;
    use crate::scp::node_id::NodeId;
    use crate::scp::quorum_set::QuorumSet;
    use std::collections::HashMap;

    fn n(id: u64) -> NodeId {
        NodeId::new(id)
    }

    #[test]
    fn two_disconnected_cliques_are_separate_components() {
        let mut map = HashMap::new();
        map.insert(n(1), Some(QuorumSet::new(2, vec![n(1), n(2)], vec![])));
        map.insert(n(2), Some(QuorumSet::new(2, vec![n(1), n(2)], vec![])));
        map.insert(n(3), Some(QuorumSet::new(2, vec![n(3), n(4)], vec![])));
        map.insert(n(4), Some(QuorumSet::new(2, vec![n(3), n(4)], vec![])));

        let graph = QGraph::build(&map);
        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 2);
        assert!(sccs.iter().all(|scc| scc.len() == 2));
    }

    #[test]
    fn fully_mutual_graph_is_one_component() {
        let mut map = HashMap::new();
        for i in 1..=4u64 {
            map.insert(n(i), Some(QuorumSet::new(3, vec![n(1), n(2), n(3), n(4)], vec![])));
        }
        let graph = QGraph::build(&map);
        let sccs = strongly_connected_components(&graph);
        assert_eq!(sccs.len(), 1);
        assert_eq!(sccs[0].len(), 4);
    }
}
