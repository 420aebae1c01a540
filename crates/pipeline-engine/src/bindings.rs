//! Binding model: creating, replacing and removing connection bindings
//!
//! Rules enforced here:
//!
//! - a connection has at most one binding per terminal
//! - an `end` binding without an explicit order gets one more than the
//!   highest order already on that port (starting from 0)
//! - a non-multi input port holds at most one `end` binding; binding a
//!   second connection to it deletes the connection that held it
//! - every change runs the affected nodes' connect/disconnect hooks

use crate::document::{Binding, BindingProps, ConnectionBindings, Document, DocumentState};
use crate::error::{PipelineError, Result};
use crate::types::{NodeKind, Terminal};

impl<N: NodeKind> Document<N> {
    /// Start and end binding of a connection, memoized per connection
    pub fn get_bindings(&self, connection: &str) -> ConnectionBindings {
        let state = self.state.read();
        let mut cache = self.binding_cache.lock();
        if let Some(cached) = cache.get(connection) {
            return cached.clone();
        }
        let bindings = state.bindings_of(connection);
        if state.connections.contains(connection) {
            cache.insert(connection.to_string(), bindings.clone());
        }
        bindings
    }

    /// Create or update the binding for `props.terminal` on a connection
    ///
    /// An existing binding keeps its order unless `props.order` is set,
    /// including when it moves to a different node or port.
    pub fn create_or_update_binding(
        &self,
        connection: &str,
        node_id: &str,
        props: BindingProps,
    ) -> Result<Binding> {
        let mut state = self.state.write();
        if !state.connections.contains(connection) {
            return Err(PipelineError::ConnectionNotFound(connection.to_string()));
        }
        let node = state
            .nodes
            .get(node_id)
            .ok_or_else(|| PipelineError::NodeNotFound(node_id.to_string()))?;
        let ports = self.registry.ports(node)?;
        let port = ports
            .get(&props.port_id)
            .ok_or_else(|| PipelineError::PortNotFound {
                node: node_id.to_string(),
                port: props.port_id.clone(),
            })?;
        if port.terminal != props.terminal {
            return Err(PipelineError::TerminalMismatch {
                node: node_id.to_string(),
                port: props.port_id.clone(),
                expected: props.terminal,
            });
        }
        let multi = port.multi;

        // Keep only the first binding of this terminal.
        let mut same_terminal = state
            .bindings
            .iter()
            .enumerate()
            .filter(|(_, b)| b.connection == connection && b.terminal == props.terminal)
            .map(|(i, _)| i);
        let existing = same_terminal.next();
        let extras: Vec<usize> = same_terminal.collect();
        for index in extras.into_iter().rev() {
            let removed = state.bindings.remove(index);
            log::warn!(
                "Removing duplicate {:?} binding {} on connection {}",
                removed.terminal,
                removed.id,
                connection
            );
            self.notify_port(&mut state, &removed.node, &removed.port_id, false);
        }

        let binding = match existing {
            Some(index) => {
                let previous = state.bindings[index].clone();
                let retargeted = previous.node != node_id || previous.port_id != props.port_id;
                let order = props.order.unwrap_or(previous.order);
                let updated = Binding {
                    node: node_id.to_string(),
                    port_id: props.port_id.clone(),
                    order,
                    ..previous.clone()
                };
                state.bindings[index] = updated.clone();
                if retargeted {
                    self.notify_port(&mut state, &previous.node, &previous.port_id, false);
                    self.notify_port(&mut state, node_id, &props.port_id, true);
                }
                updated
            }
            None => {
                let order = match (props.order, props.terminal) {
                    (Some(order), _) => order,
                    (None, Terminal::End) => next_order(&*state, node_id, &props.port_id, connection),
                    (None, Terminal::Start) => 0,
                };
                let binding = Binding {
                    id: state.next_id("binding"),
                    connection: connection.to_string(),
                    node: node_id.to_string(),
                    port_id: props.port_id.clone(),
                    terminal: props.terminal,
                    order,
                };
                state.bindings.push(binding.clone());
                self.notify_port(&mut state, node_id, &props.port_id, true);
                binding
            }
        };
        self.binding_cache.lock().remove(connection);

        if props.terminal == Terminal::End && !multi {
            let occupants: Vec<String> = state
                .bindings
                .iter()
                .filter(|b| {
                    b.terminal == Terminal::End
                        && b.node == node_id
                        && b.port_id == props.port_id
                        && b.connection != connection
                })
                .map(|b| b.connection.clone())
                .collect();
            for occupant in occupants {
                log::debug!(
                    "Connection {} replaces {} on {}.{}",
                    connection,
                    occupant,
                    node_id,
                    props.port_id
                );
                self.delete_connection_locked(&mut state, &occupant);
            }
        }

        Ok(binding)
    }

    /// Remove the binding for `terminal` on a connection, if present
    pub fn remove_binding(&self, connection: &str, terminal: Terminal) -> Result<()> {
        let mut state = self.state.write();
        if !state.connections.contains(connection) {
            return Err(PipelineError::ConnectionNotFound(connection.to_string()));
        }
        let (removed, kept): (Vec<Binding>, Vec<Binding>) = std::mem::take(&mut state.bindings)
            .into_iter()
            .partition(|b| b.connection == connection && b.terminal == terminal);
        state.bindings = kept;
        for binding in &removed {
            self.notify_port(&mut state, &binding.node, &binding.port_id, false);
        }
        self.binding_cache.lock().remove(connection);
        Ok(())
    }
}

/// One more than the highest `end` order on a port, ignoring `connection`
fn next_order<N>(state: &DocumentState<N>, node_id: &str, port_id: &str, connection: &str) -> u32 {
    state
        .bindings
        .iter()
        .filter(|b| {
            b.terminal == Terminal::End
                && b.node == node_id
                && b.port_id == port_id
                && b.connection != connection
        })
        .map(|b| b.order)
        .fold(0, u32::max)
        + 1
}
