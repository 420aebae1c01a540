//! In-memory document of nodes, connections and bindings
//!
//! The document is the single mutable resource shared by user edits and
//! running pipelines. Locks are held only for short, synchronous sections
//! and never across an await point.
//!
//! A connection carries no data of its own; it is the pair of bindings
//! (`start` and `end`) that pin its terminals to node ports.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::registry::NodeRegistry;
use crate::types::{ConnectionId, InfoValues, Node, NodeId, NodeKind, PortId, PortMap, Terminal};

/// One terminal of a connection pinned to a node port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    pub id: String,
    pub connection: ConnectionId,
    pub node: NodeId,
    pub port_id: PortId,
    pub terminal: Terminal,
    /// Aggregation order on multi input ports
    pub order: u32,
}

/// Requested binding properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingProps {
    pub port_id: PortId,
    pub terminal: Terminal,
    pub order: Option<u32>,
}

impl BindingProps {
    pub fn new(port_id: impl Into<String>, terminal: Terminal) -> Self {
        Self {
            port_id: port_id.into(),
            terminal,
            order: None,
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }
}

/// The bindings of one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionBindings {
    pub start: Option<Binding>,
    pub end: Option<Binding>,
}

impl ConnectionBindings {
    pub fn get(&self, terminal: Terminal) -> Option<&Binding> {
        match terminal {
            Terminal::Start => self.start.as_ref(),
            Terminal::End => self.end.as_ref(),
        }
    }

    /// Both terminals are bound
    pub fn is_complete(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }
}

/// Read/write access to nodes and bindings, as consumed by the engine
///
/// The engine never creates or deletes nodes and never touches
/// connections through this trait.
pub trait NodeRepository<N: NodeKind>: Send + Sync {
    fn get_node(&self, id: &str) -> Option<Node<N>>;

    /// Patch a node's kind in place
    fn update_node(&self, id: &str, update: &mut dyn FnMut(&mut N)) -> Result<()>;

    /// All bindings (either terminal) pinned to a node
    fn bindings_to_node(&self, node_id: &str) -> Vec<Binding>;

    /// Start and end binding of a connection
    fn connection_bindings(&self, connection: &str) -> ConnectionBindings;

    /// Last known outputs of a node, used for nodes outside a run
    fn last_output_snapshot(&self, node_id: &str) -> Option<InfoValues>;

    /// Flag a node as being computed by `run_id`
    fn mark_stale(&self, node_id: &str, run_id: &str);

    /// Clear the flag, only if `run_id` still owns it
    fn clear_stale(&self, node_id: &str, run_id: &str);

    /// Bindings where the node consumes a value
    fn inbound_bindings(&self, node_id: &str) -> Vec<Binding> {
        self.bindings_to_node(node_id)
            .into_iter()
            .filter(|b| b.terminal == Terminal::End)
            .collect()
    }

    /// Bindings where the node produces a value
    fn outbound_bindings(&self, node_id: &str) -> Vec<Binding> {
        self.bindings_to_node(node_id)
            .into_iter()
            .filter(|b| b.terminal == Terminal::Start)
            .collect()
    }
}

pub(crate) struct DocumentState<N> {
    pub(crate) nodes: BTreeMap<NodeId, Node<N>>,
    pub(crate) connections: BTreeSet<ConnectionId>,
    /// Insertion order doubles as discovery order
    pub(crate) bindings: Vec<Binding>,
    next_id: u64,
}

impl<N> DocumentState<N> {
    pub(crate) fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    pub(crate) fn bindings_of(&self, connection: &str) -> ConnectionBindings {
        let mut result = ConnectionBindings::default();
        for binding in self.bindings.iter().filter(|b| b.connection == connection) {
            let slot = match binding.terminal {
                Terminal::Start => &mut result.start,
                Terminal::End => &mut result.end,
            };
            if slot.is_none() {
                *slot = Some(binding.clone());
            }
        }
        result
    }
}

/// The pipeline document
pub struct Document<N: NodeKind> {
    pub(crate) registry: Arc<NodeRegistry<N>>,
    pub(crate) state: RwLock<DocumentState<N>>,
    /// Memoized `get_bindings`; always locked after `state`
    pub(crate) binding_cache: Mutex<HashMap<ConnectionId, ConnectionBindings>>,
}

impl<N: NodeKind> Document<N> {
    /// Create an empty document using `registry` for ports and hooks
    pub fn new(registry: Arc<NodeRegistry<N>>) -> Self {
        Self {
            registry,
            state: RwLock::new(DocumentState {
                nodes: BTreeMap::new(),
                connections: BTreeSet::new(),
                bindings: Vec::new(),
                next_id: 0,
            }),
            binding_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry<N>> {
        &self.registry
    }

    /// Add a node with an explicit id
    pub fn add_node(&self, id: impl Into<String>, kind: N) -> Result<()> {
        let id = id.into();
        let mut state = self.state.write();
        if state.nodes.contains_key(&id) {
            return Err(PipelineError::DuplicateNode(id));
        }
        state.nodes.insert(id.clone(), Node::new(id, kind));
        Ok(())
    }

    /// Add a node with a generated id
    pub fn create_node(&self, kind: N) -> NodeId {
        let mut state = self.state.write();
        let mut id = state.next_id("node");
        while state.nodes.contains_key(&id) {
            id = state.next_id("node");
        }
        state.nodes.insert(id.clone(), Node::new(id.clone(), kind));
        id
    }

    pub fn get_node(&self, id: &str) -> Option<Node<N>> {
        self.state.read().nodes.get(id).cloned()
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.state.read().nodes.contains_key(id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.state.read().nodes.keys().cloned().collect()
    }

    /// Edit a node's parameters
    pub fn update_node(&self, id: &str, update: impl FnOnce(&mut N)) -> Result<()> {
        let mut state = self.state.write();
        let node = state
            .nodes
            .get_mut(id)
            .ok_or_else(|| PipelineError::NodeNotFound(id.to_string()))?;
        update(&mut node.kind);
        Ok(())
    }

    /// Delete a node and every connection bound to it
    pub fn delete_node(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.nodes.remove(id).is_none() {
            return Err(PipelineError::NodeNotFound(id.to_string()));
        }
        let attached: BTreeSet<ConnectionId> = state
            .bindings
            .iter()
            .filter(|b| b.node == id)
            .map(|b| b.connection.clone())
            .collect();
        for connection in attached {
            self.delete_connection_locked(&mut state, &connection);
        }
        log::debug!("Deleted node {}", id);
        Ok(())
    }

    /// Add an empty (unbound) connection
    pub fn add_connection(&self) -> ConnectionId {
        let mut state = self.state.write();
        let id = state.next_id("connection");
        state.connections.insert(id.clone());
        id
    }

    pub fn contains_connection(&self, id: &str) -> bool {
        self.state.read().connections.contains(id)
    }

    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.state.read().connections.iter().cloned().collect()
    }

    /// Delete a connection and its bindings
    pub fn delete_connection(&self, id: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.connections.contains(id) {
            return Err(PipelineError::ConnectionNotFound(id.to_string()));
        }
        self.delete_connection_locked(&mut state, id);
        Ok(())
    }

    /// Ports of a node
    pub fn ports(&self, node_id: &str) -> Result<PortMap> {
        let node = self
            .get_node(node_id)
            .ok_or_else(|| PipelineError::NodeNotFound(node_id.to_string()))?;
        self.registry.ports(&node)
    }

    /// All bindings pinned to a node, in creation order
    pub fn bindings_to_node(&self, node_id: &str) -> Vec<Binding> {
        self.state
            .read()
            .bindings
            .iter()
            .filter(|b| b.node == node_id)
            .cloned()
            .collect()
    }

    pub(crate) fn delete_connection_locked(&self, state: &mut DocumentState<N>, id: &str) {
        let (removed, kept): (Vec<Binding>, Vec<Binding>) = std::mem::take(&mut state.bindings)
            .into_iter()
            .partition(|b| b.connection == id);
        state.bindings = kept;
        state.connections.remove(id);
        for binding in &removed {
            self.notify_port(state, &binding.node, &binding.port_id, false);
        }
        self.binding_cache.lock().remove(id);
        log::debug!("Deleted connection {}", id);
    }

    /// Run the node operation's connect/disconnect hook
    pub(crate) fn notify_port(
        &self,
        state: &mut DocumentState<N>,
        node_id: &str,
        port_id: &str,
        connected: bool,
    ) {
        let Some(node) = state.nodes.get_mut(node_id) else {
            return;
        };
        let Ok(operation) = self.registry.operation_for(node) else {
            return;
        };
        if connected {
            operation.on_port_connect(node, port_id);
        } else {
            operation.on_port_disconnect(node, port_id);
        }
    }
}

impl<N: NodeKind> NodeRepository<N> for Document<N> {
    fn get_node(&self, id: &str) -> Option<Node<N>> {
        Document::get_node(self, id)
    }

    fn update_node(&self, id: &str, update: &mut dyn FnMut(&mut N)) -> Result<()> {
        Document::update_node(self, id, |kind| update(kind))
    }

    fn bindings_to_node(&self, node_id: &str) -> Vec<Binding> {
        Document::bindings_to_node(self, node_id)
    }

    fn connection_bindings(&self, connection: &str) -> ConnectionBindings {
        self.get_bindings(connection)
    }

    fn last_output_snapshot(&self, node_id: &str) -> Option<InfoValues> {
        self.output_port_info(node_id)
    }

    fn mark_stale(&self, node_id: &str, run_id: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(node_id) {
            node.stale_run = Some(run_id.to_string());
        }
    }

    fn clear_stale(&self, node_id: &str, run_id: &str) {
        if let Some(node) = self.state.write().nodes.get_mut(node_id) {
            if node.stale_run.as_deref() == Some(run_id) {
                node.stale_run = None;
            }
        }
    }
}
