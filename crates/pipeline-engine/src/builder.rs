//! Graph discovery for a run
//!
//! Walks forward from the starting nodes along output connections and
//! records, for every node reached, its complete inbound and outbound
//! connections. Producers outside the walk are not discovered; the
//! scheduler reads their last output snapshot instead.

use std::collections::{HashMap, VecDeque};

use crate::document::NodeRepository;
use crate::types::{ConnectionId, Node, NodeId, NodeKind, PortId, Terminal};

/// One complete connection seen from a discovered node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConnection {
    pub connection_id: ConnectionId,
    /// Terminal pinned to this node
    pub terminal: Terminal,
    pub own_port_id: PortId,
    pub connected_node_id: NodeId,
    pub connected_port_id: PortId,
    /// Order of the connection's end binding
    pub order: u32,
}

/// A node reached by discovery, with a snapshot taken at build time
#[derive(Debug, Clone)]
pub struct DiscoveredNode<N> {
    pub node: Node<N>,
    pub connections: Vec<PortConnection>,
}

impl<N> DiscoveredNode<N> {
    /// Connections feeding this node, in discovery order
    pub fn inbound(&self) -> impl Iterator<Item = &PortConnection> {
        self.connections
            .iter()
            .filter(|c| c.terminal == Terminal::End)
    }

    /// Connections fed by this node, in discovery order
    pub fn outbound(&self) -> impl Iterator<Item = &PortConnection> {
        self.connections
            .iter()
            .filter(|c| c.terminal == Terminal::Start)
    }
}

pub type DiscoveredGraph<N> = HashMap<NodeId, DiscoveredNode<N>>;

/// Complete connections of one node, skipping dangling ones
pub fn node_connections<N: NodeKind>(
    repository: &dyn NodeRepository<N>,
    node_id: &str,
) -> Vec<PortConnection> {
    repository
        .bindings_to_node(node_id)
        .into_iter()
        .filter_map(|binding| {
            let bindings = repository.connection_bindings(&binding.connection);
            let other = bindings.get(binding.terminal.opposite())?;
            let order = bindings.end.as_ref()?.order;
            Some(PortConnection {
                connection_id: binding.connection.clone(),
                terminal: binding.terminal,
                own_port_id: binding.port_id.clone(),
                connected_node_id: other.node.clone(),
                connected_port_id: other.port_id.clone(),
                order,
            })
        })
        .collect()
}

/// Discover every node reachable downstream of `starting_node_ids`
///
/// Unknown starting ids are skipped silently. Each node is recorded once.
pub fn build_graph<N: NodeKind>(
    repository: &dyn NodeRepository<N>,
    starting_node_ids: &[NodeId],
) -> DiscoveredGraph<N> {
    let mut graph = DiscoveredGraph::new();
    let mut pending: VecDeque<NodeId> = starting_node_ids.iter().cloned().collect();

    while let Some(node_id) = pending.pop_front() {
        if graph.contains_key(&node_id) {
            continue;
        }
        let Some(node) = repository.get_node(&node_id) else {
            log::warn!("Skipping unknown node {} during discovery", node_id);
            continue;
        };
        let connections = node_connections(repository, &node_id);
        pending.extend(
            connections
                .iter()
                .filter(|c| c.terminal == Terminal::Start)
                .map(|c| c.connected_node_id.clone()),
        );
        graph.insert(node_id, DiscoveredNode { node, connections });
    }

    log::debug!(
        "Discovered {} nodes from {} starting nodes",
        graph.len(),
        starting_node_ids.len()
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authoring::connect;
    use crate::document::BindingProps;
    use crate::testing::{test_document, TestNode};

    #[test]
    fn test_diamond_discovers_each_node_once() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("a")).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        doc.add_node("c", TestNode::pass()).unwrap();
        doc.add_node("d", TestNode::Collect).unwrap();
        connect(&doc, "a", "out", "b", "in").unwrap();
        connect(&doc, "a", "out", "c", "in").unwrap();
        connect(&doc, "b", "out", "d", "in").unwrap();
        connect(&doc, "c", "out", "d", "in").unwrap();

        let graph = build_graph(&*doc, &["a".to_string()]);
        assert_eq!(graph.len(), 4);
        assert_eq!(graph["d"].inbound().count(), 2);
        assert_eq!(graph["a"].outbound().count(), 2);
        let orders: Vec<u32> = graph["d"].inbound().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[test]
    fn test_discovery_is_forward_only() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("a")).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        doc.add_node("c", TestNode::Sink).unwrap();
        connect(&doc, "a", "out", "b", "in").unwrap();
        connect(&doc, "b", "out", "c", "in").unwrap();

        let graph = build_graph(&*doc, &["b".to_string(), "missing".to_string()]);
        let mut ids: Vec<_> = graph.keys().cloned().collect();
        ids.sort();
        assert_eq!(ids, vec!["b", "c"]);

        // The inbound connection from `a` is still recorded on `b`.
        let inbound: Vec<_> = graph["b"].inbound().collect();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].connected_node_id, "a");
    }

    #[test]
    fn test_incomplete_connections_are_ignored() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("a")).unwrap();
        let conn = doc.add_connection();
        doc.create_or_update_binding(&conn, "a", BindingProps::new("out", Terminal::Start))
            .unwrap();

        let graph = build_graph(&*doc, &["a".to_string()]);
        assert_eq!(graph.len(), 1);
        assert!(graph["a"].connections.is_empty());
    }
}
