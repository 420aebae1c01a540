//! Port previews computed from parameters without running anything
//!
//! A node's input info aggregates the output info of its upstream
//! producers; its output info is whatever its operation derives from that.
//! Walks are memoized per call and cut at cycles.

use std::collections::{HashMap, HashSet};

use crate::document::Document;
use crate::types::{
    InfoPayload, InfoValue, InfoValues, Node, NodeId, NodeKind, OutputValue, Terminal,
};

impl<N: NodeKind> Document<N> {
    /// Preview of every connected input port of a node
    pub fn input_port_info(&self, node_id: &str) -> InfoValues {
        match self.get_node(node_id) {
            Some(node) => InfoResolver::new(self).inputs_for(&node),
            None => InfoValues::new(),
        }
    }

    /// Preview of a node's output ports, `None` for unknown nodes or types
    pub fn output_port_info(&self, node_id: &str) -> Option<InfoValues> {
        InfoResolver::new(self).outputs_for(node_id)
    }
}

struct InfoResolver<'a, N: NodeKind> {
    document: &'a Document<N>,
    memo: HashMap<NodeId, Option<InfoValues>>,
    visiting: HashSet<NodeId>,
}

impl<'a, N: NodeKind> InfoResolver<'a, N> {
    fn new(document: &'a Document<N>) -> Self {
        Self {
            document,
            memo: HashMap::new(),
            visiting: HashSet::new(),
        }
    }

    fn outputs_for(&mut self, node_id: &str) -> Option<InfoValues> {
        if let Some(cached) = self.memo.get(node_id) {
            return cached.clone();
        }
        if !self.visiting.insert(node_id.to_string()) {
            log::debug!("Cycle through {} while resolving port info", node_id);
            return None;
        }
        let outputs = self.document.get_node(node_id).and_then(|node| {
            let operation = self.document.registry.operation_for(&node).ok()?;
            let inputs = self.inputs_for(&node);
            Some(operation.output_info(&node, &inputs))
        });
        self.visiting.remove(node_id);
        self.memo.insert(node_id.to_string(), outputs.clone());
        outputs
    }

    fn inputs_for(&mut self, node: &Node<N>) -> InfoValues {
        let ports = self.document.registry.ports(node).unwrap_or_default();

        let mut inbound: Vec<_> = self
            .document
            .bindings_to_node(&node.id)
            .into_iter()
            .filter(|b| b.terminal == Terminal::End)
            .filter_map(|end| {
                let start = self.document.get_bindings(&end.connection).start?;
                Some((end, start))
            })
            .collect();
        inbound.sort_by_key(|(end, _)| end.order);

        let mut info = InfoValues::new();
        for (end, start) in inbound {
            let Some(upstream) = self
                .outputs_for(&start.node)
                .and_then(|mut outputs| outputs.remove(&start.port_id))
            else {
                continue;
            };
            let Some(port) = ports.get(&end.port_id) else {
                continue;
            };
            if !port.multi {
                info.insert(end.port_id, upstream);
                continue;
            }
            let first = upstream.first().cloned().unwrap_or_else(OutputValue::null);
            match info.get_mut(&end.port_id) {
                Some(InfoValue {
                    payload: InfoPayload::Multi(values),
                    is_out_of_date,
                    ..
                }) => {
                    values.push(first);
                    *is_out_of_date |= upstream.is_out_of_date;
                }
                _ => {
                    info.insert(
                        end.port_id,
                        InfoValue::multi(vec![first], upstream.is_out_of_date, port.data_type),
                    );
                }
            }
        }
        info
    }
}
