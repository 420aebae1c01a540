//! Pipeline regions: connected groups of nodes that can be played together

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use crate::document::Document;
use crate::types::{NodeId, NodeKind};

/// A weakly connected group of at least two nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRegion {
    pub node_ids: Vec<NodeId>,
    /// Nodes with no inbound connection; playing the region starts here
    pub starting_nodes: Vec<NodeId>,
}

impl<N: NodeKind> Document<N> {
    /// Connected components over complete connections, singletons excluded
    pub fn find_pipeline_regions(&self) -> Vec<PipelineRegion> {
        let state = self.state.read();

        let mut neighbours: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        let mut has_inbound: BTreeSet<&str> = BTreeSet::new();
        for connection in &state.connections {
            let bindings = state.bindings_of(connection);
            let (Some(start), Some(end)) = (bindings.start, bindings.end) else {
                continue;
            };
            let (Some((from, _)), Some((to, _))) = (
                state.nodes.get_key_value(&start.node),
                state.nodes.get_key_value(&end.node),
            ) else {
                continue;
            };
            neighbours.entry(from).or_default().insert(to);
            neighbours.entry(to).or_default().insert(from);
            has_inbound.insert(to);
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut regions = Vec::new();
        for id in state.nodes.keys() {
            if seen.contains(id.as_str()) {
                continue;
            }
            let mut members = BTreeSet::new();
            let mut queue = VecDeque::from([id.as_str()]);
            while let Some(current) = queue.pop_front() {
                if !members.insert(current) {
                    continue;
                }
                if let Some(next) = neighbours.get(current) {
                    queue.extend(next.iter().filter(|n| !members.contains(*n)));
                }
            }
            seen.extend(members.iter().copied());
            if members.len() < 2 {
                continue;
            }
            regions.push(PipelineRegion {
                starting_nodes: members
                    .iter()
                    .filter(|n| !has_inbound.contains(*n))
                    .map(|n| n.to_string())
                    .collect(),
                node_ids: members.into_iter().map(str::to_string).collect(),
            });
        }
        regions
    }
}
