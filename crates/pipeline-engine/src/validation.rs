//! Type compatibility, cycle checks and document validation
//!
//! The authoring checks here are advisory: they run before a binding is
//! committed. The scheduler never re-checks them and stays safe on a
//! malformed graph because node records only move forward.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::document::{Document, NodeRepository};
use crate::types::{NodeId, NodeKind, PortDataType, PortDefinition, PortMap, Terminal};

/// Whether a value of type `a` may flow into a port of type `b`
pub fn are_compatible(a: PortDataType, b: PortDataType) -> bool {
    a.is_compatible_with(&b)
}

/// Pick a port of `terminal` for a value of `data_type`
///
/// Preference: exact type match, then a compatible (wildcard) match, then
/// the first port of that terminal. Candidates are taken in port id order.
pub fn find_first_compatible_port(
    ports: &PortMap,
    terminal: Terminal,
    data_type: PortDataType,
) -> Option<&PortDefinition> {
    let candidates: Vec<&PortDefinition> =
        ports.values().filter(|p| p.terminal == terminal).collect();
    candidates
        .iter()
        .find(|p| p.data_type == data_type)
        .or_else(|| {
            candidates
                .iter()
                .find(|p| are_compatible(p.data_type, data_type))
        })
        .or_else(|| candidates.first())
        .copied()
}

/// Nodes reachable from `start` by following bindings on `terminal`
///
/// Following `End` walks upstream (a node's inputs to their producers),
/// `Start` walks downstream. The result includes `start`.
pub fn connected_nodes<N: NodeKind>(
    repository: &dyn NodeRepository<N>,
    start: &str,
    terminal: Terminal,
) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut queue = VecDeque::from([start.to_string()]);
    while let Some(node_id) = queue.pop_front() {
        if !seen.insert(node_id.clone()) {
            continue;
        }
        for binding in repository.bindings_to_node(&node_id) {
            if binding.terminal != terminal {
                continue;
            }
            let bindings = repository.connection_bindings(&binding.connection);
            if let Some(other) = bindings.get(terminal.opposite()) {
                if !seen.contains(&other.node) {
                    queue.push_back(other.node.clone());
                }
            }
        }
    }
    seen
}

/// Whether dropping the dragged terminal on `target` would close a cycle
///
/// `fixed_node` is the node holding the connection's other terminal.
pub fn would_create_cycle<N: NodeKind>(
    repository: &dyn NodeRepository<N>,
    fixed_node: &str,
    dragged_terminal: Terminal,
    target: &str,
) -> bool {
    connected_nodes(repository, fixed_node, dragged_terminal).contains(target)
}

/// Structural problem found in a document
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A connection with a missing start or end binding
    IncompleteConnection { connection_id: String },
    /// A node whose type tag is not in the registry
    UnknownNodeType { node_id: String, node_type: String },
    /// A binding to a port the node does not expose
    UnknownPort {
        connection_id: String,
        node_id: String,
        port_id: String,
    },
    /// A connection between incompatible port types
    IncompatiblePortTypes {
        connection_id: String,
        source_type: PortDataType,
        target_type: PortDataType,
    },
    /// More than one connection on a single-valued input port
    PortOccupied { node_id: String, port_id: String },
    /// The connections form a directed cycle
    CycleDetected,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IncompleteConnection { connection_id } => {
                write!(f, "Connection '{}' is not bound at both ends", connection_id)
            }
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "Unknown node type '{}' for node '{}'", node_type, node_id)
            }
            Self::UnknownPort {
                connection_id,
                node_id,
                port_id,
            } => write!(
                f,
                "Connection '{}' references unknown port '{}' on node '{}'",
                connection_id, port_id, node_id
            ),
            Self::IncompatiblePortTypes {
                connection_id,
                source_type,
                target_type,
            } => write!(
                f,
                "Connection '{}' connects incompatible types: {:?} -> {:?}",
                connection_id, source_type, target_type
            ),
            Self::PortOccupied { node_id, port_id } => write!(
                f,
                "Input '{}' on node '{}' has more than one connection",
                port_id, node_id
            ),
            Self::CycleDetected => write!(f, "Cycle detected in pipeline"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a whole document
///
/// Returns every problem found, not just the first.
pub fn validate_document<N: NodeKind>(document: &Document<N>) -> Vec<ValidationError> {
    let state = document.state.read();
    let mut errors = Vec::new();

    let mut ports: HashMap<&str, PortMap> = HashMap::new();
    for node in state.nodes.values() {
        match document.registry.ports(node) {
            Ok(map) => {
                ports.insert(&node.id, map);
            }
            Err(_) => errors.push(ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.type_tag().to_string(),
            }),
        }
    }

    let mut edges: Vec<(String, String)> = Vec::new();
    let mut occupancy: HashMap<(String, String), usize> = HashMap::new();
    for connection in &state.connections {
        let bindings = state.bindings_of(connection);
        let (Some(start), Some(end)) = (bindings.start, bindings.end) else {
            errors.push(ValidationError::IncompleteConnection {
                connection_id: connection.clone(),
            });
            continue;
        };

        let lookup = |node: &str, port: &str| -> Option<PortDefinition> {
            ports.get(node).and_then(|map| map.get(port)).cloned()
        };
        let source = lookup(&start.node, &start.port_id);
        let target = lookup(&end.node, &end.port_id);
        for (binding, found) in [(&start, &source), (&end, &target)] {
            if found.is_none() && ports.contains_key(binding.node.as_str()) {
                errors.push(ValidationError::UnknownPort {
                    connection_id: connection.clone(),
                    node_id: binding.node.clone(),
                    port_id: binding.port_id.clone(),
                });
            }
        }
        if let (Some(source), Some(target)) = (&source, &target) {
            if !are_compatible(source.data_type, target.data_type) {
                errors.push(ValidationError::IncompatiblePortTypes {
                    connection_id: connection.clone(),
                    source_type: source.data_type,
                    target_type: target.data_type,
                });
            }
            if !target.multi {
                *occupancy
                    .entry((end.node.clone(), end.port_id.clone()))
                    .or_insert(0) += 1;
            }
        }

        if state.nodes.contains_key(&start.node) && state.nodes.contains_key(&end.node) {
            edges.push((start.node, end.node));
        }
    }

    let mut occupied: Vec<_> = occupancy
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((node_id, port_id), _)| ValidationError::PortOccupied { node_id, port_id })
        .collect();
    occupied.sort_by_key(|e| e.to_string());
    errors.extend(occupied);

    if has_cycle(state.nodes.keys(), &edges) {
        errors.push(ValidationError::CycleDetected);
    }

    errors
}

/// Detect cycles using Kahn's algorithm (topological sort)
fn has_cycle<'a>(
    nodes: impl Iterator<Item = &'a NodeId>,
    edges: &'a [(NodeId, NodeId)],
) -> bool {
    let mut in_degree: HashMap<&str, usize> = nodes.map(|id| (id.as_str(), 0)).collect();
    for (_, to) in edges {
        *in_degree.entry(to.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut visited = 0;
    while let Some(node_id) = queue.pop_front() {
        visited += 1;
        for (from, to) in edges {
            if from == node_id {
                if let Some(deg) = in_degree.get_mut(to.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(to);
                    }
                }
            }
        }
    }

    visited < in_degree.len()
}
