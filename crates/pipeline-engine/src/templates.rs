//! Pipeline templates: reusable snapshots of a node selection
//!
//! A template keeps node kinds and the connections running between the
//! selected nodes, keyed by template-local ids so it can be stamped into
//! any document.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::document::{BindingProps, Document};
use crate::types::{NodeId, NodeKind, Terminal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineTemplate<N> {
    pub nodes: Vec<TemplateNode<N>>,
    pub connections: Vec<TemplateConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateNode<N> {
    pub local_id: String,
    pub kind: N,
}

/// A connection between two template nodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConnection {
    pub from_local_id: String,
    pub from_port_id: String,
    pub to_local_id: String,
    pub to_port_id: String,
    /// Aggregation order on the input side
    #[serde(default)]
    pub order: u32,
}

impl<N: NodeKind> Document<N> {
    /// Snapshot the nodes in `node_ids` and the connections among them
    ///
    /// Unknown and repeated ids are skipped. Connections leaving the
    /// selection are dropped. Returns `None` when fewer than two nodes
    /// remain.
    pub fn save_template<S: AsRef<str>>(&self, node_ids: &[S]) -> Option<PipelineTemplate<N>> {
        let mut local_ids: HashMap<&str, String> = HashMap::new();
        let mut selected = Vec::new();
        let mut nodes = Vec::new();
        for id in node_ids.iter().map(|id| id.as_ref()) {
            if local_ids.contains_key(id) {
                continue;
            }
            let Some(node) = self.get_node(id) else {
                continue;
            };
            let local_id = format!("n{}", nodes.len());
            local_ids.insert(id, local_id.clone());
            selected.push(id);
            nodes.push(TemplateNode {
                local_id,
                kind: node.kind,
            });
        }
        if nodes.len() < 2 {
            return None;
        }

        let mut connections = Vec::new();
        for id in selected {
            for start in self
                .bindings_to_node(id)
                .into_iter()
                .filter(|b| b.terminal == Terminal::Start)
            {
                let Some(end) = self.get_bindings(&start.connection).end else {
                    continue;
                };
                let Some(to_local_id) = local_ids.get(end.node.as_str()) else {
                    continue;
                };
                connections.push(TemplateConnection {
                    from_local_id: local_ids[id].clone(),
                    from_port_id: start.port_id,
                    to_local_id: to_local_id.clone(),
                    to_port_id: end.port_id,
                    order: end.order,
                });
            }
        }
        log::debug!(
            "Saved template with {} nodes and {} connections",
            nodes.len(),
            connections.len()
        );
        Some(PipelineTemplate { nodes, connections })
    }

    /// Create fresh copies of a template's nodes and connections
    ///
    /// Returns the new node ids in template order. A connection that no
    /// longer fits its nodes' ports is skipped with a warning.
    pub fn stamp_template(&self, template: &PipelineTemplate<N>) -> Vec<NodeId> {
        let mut stamped: HashMap<&str, NodeId> = HashMap::new();
        let mut created = Vec::with_capacity(template.nodes.len());
        for node in &template.nodes {
            let id = self.create_node(node.kind.clone());
            stamped.insert(&node.local_id, id.clone());
            created.push(id);
        }

        for link in &template.connections {
            let (Some(from), Some(to)) = (
                stamped.get(link.from_local_id.as_str()),
                stamped.get(link.to_local_id.as_str()),
            ) else {
                log::warn!(
                    "Template connection {} -> {} names an unknown node",
                    link.from_local_id,
                    link.to_local_id
                );
                continue;
            };
            let connection = self.add_connection();
            let bound = self
                .create_or_update_binding(
                    &connection,
                    from,
                    BindingProps::new(link.from_port_id.clone(), Terminal::Start),
                )
                .and_then(|_| {
                    self.create_or_update_binding(
                        &connection,
                        to,
                        BindingProps::new(link.to_port_id.clone(), Terminal::End)
                            .with_order(link.order),
                    )
                });
            if let Err(e) = bound {
                log::warn!(
                    "Skipping template connection {}.{} -> {}.{}: {}",
                    from,
                    link.from_port_id,
                    to,
                    link.to_port_id,
                    e
                );
                if let Err(e) = self.delete_connection(&connection) {
                    log::warn!("Failed to delete connection {}: {}", connection, e);
                }
            }
        }
        created
    }
}
