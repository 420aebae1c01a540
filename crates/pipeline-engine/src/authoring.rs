//! Editor-facing connection flows built on the binding model
//!
//! `connect` is strict and reports why a connection is refused.
//! `drag_terminal` mirrors a pointer drag: anything that cannot attach
//! simply leaves the dragged end detached.

use crate::document::{BindingProps, Document};
use crate::error::{PipelineError, Result};
use crate::types::{ConnectionId, NodeId, NodeKind, PortDataType, PortDefinition, Terminal};
use crate::validation::{are_compatible, find_first_compatible_port, would_create_cycle};

/// Result of dropping a dragged connection end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    Attached,
    Detached,
}

/// Connect `from.from_port` (an output) to `to.to_port` (an input)
pub fn connect<N: NodeKind>(
    document: &Document<N>,
    from: &str,
    from_port: &str,
    to: &str,
    to_port: &str,
) -> Result<ConnectionId> {
    connect_inner(document, from, from_port, to, to_port, None)
}

/// Like [`connect`], with an explicit aggregation order on the input side
pub fn connect_with_order<N: NodeKind>(
    document: &Document<N>,
    from: &str,
    from_port: &str,
    to: &str,
    to_port: &str,
    order: u32,
) -> Result<ConnectionId> {
    connect_inner(document, from, from_port, to, to_port, Some(order))
}

fn connect_inner<N: NodeKind>(
    document: &Document<N>,
    from: &str,
    from_port: &str,
    to: &str,
    to_port: &str,
    order: Option<u32>,
) -> Result<ConnectionId> {
    let source = port_with_terminal(document, from, from_port, Terminal::Start)?;
    let target = port_with_terminal(document, to, to_port, Terminal::End)?;
    if !are_compatible(source.data_type, target.data_type) {
        return Err(PipelineError::IncompatiblePorts {
            source_type: source.data_type,
            target_type: target.data_type,
        });
    }
    if would_create_cycle(document, from, Terminal::End, to) {
        return Err(PipelineError::WouldCreateCycle {
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let connection = document.add_connection();
    document.create_or_update_binding(
        &connection,
        from,
        BindingProps::new(from_port, Terminal::Start),
    )?;
    let mut end = BindingProps::new(to_port, Terminal::End);
    end.order = order;
    if let Err(e) = document.create_or_update_binding(&connection, to, end) {
        document.delete_connection(&connection)?;
        return Err(e);
    }
    log::debug!("Connected {}.{} -> {}.{}", from, from_port, to, to_port);
    Ok(connection)
}

fn port_with_terminal<N: NodeKind>(
    document: &Document<N>,
    node_id: &str,
    port_id: &str,
    terminal: Terminal,
) -> Result<PortDefinition> {
    let port = document
        .ports(node_id)?
        .remove(port_id)
        .ok_or_else(|| PipelineError::PortNotFound {
            node: node_id.to_string(),
            port: port_id.to_string(),
        })?;
    if port.terminal != terminal {
        return Err(PipelineError::TerminalMismatch {
            node: node_id.to_string(),
            port: port_id.to_string(),
            expected: terminal,
        });
    }
    Ok(port)
}

/// Drop the `terminal` end of a connection on `target` (`(node, port)`)
///
/// With no target, a missing or wrongly-directed port, incompatible types
/// or a would-be cycle, the end is detached instead.
pub fn drag_terminal<N: NodeKind>(
    document: &Document<N>,
    connection: &str,
    terminal: Terminal,
    target: Option<(&str, &str)>,
) -> Result<DragOutcome> {
    if !document.contains_connection(connection) {
        return Err(PipelineError::ConnectionNotFound(connection.to_string()));
    }
    let fixed = document.get_bindings(connection).get(terminal.opposite()).cloned();

    let attachable = target.filter(|(node_id, port_id)| {
        let Ok(ports) = document.ports(node_id) else {
            return false;
        };
        let Some(port) = ports.get(*port_id).filter(|p| p.terminal == terminal) else {
            return false;
        };
        let Some(fixed) = &fixed else {
            return true;
        };
        let fixed_type = document
            .ports(&fixed.node)
            .ok()
            .and_then(|ports| ports.get(&fixed.port_id).map(|p| p.data_type));
        let compatible = fixed_type.is_some_and(|t| are_compatible(t, port.data_type));
        compatible && !would_create_cycle(document, &fixed.node, terminal, node_id)
    });

    match attachable {
        Some((node_id, port_id)) => {
            document.create_or_update_binding(
                connection,
                node_id,
                BindingProps::new(port_id, terminal),
            )?;
            Ok(DragOutcome::Attached)
        }
        None => {
            log::debug!("Detaching {:?} end of connection {}", terminal, connection);
            document.remove_binding(connection, terminal)?;
            Ok(DragOutcome::Detached)
        }
    }
}

/// Delete every connection missing a start or end binding
pub fn delete_incomplete_connections<N: NodeKind>(document: &Document<N>) -> Vec<ConnectionId> {
    let incomplete: Vec<ConnectionId> = document
        .connection_ids()
        .into_iter()
        .filter(|id| !document.get_bindings(id).is_complete())
        .collect();
    for id in &incomplete {
        if let Err(e) = document.delete_connection(id) {
            log::warn!("Failed to delete incomplete connection {}: {}", id, e);
        }
    }
    incomplete
}

/// Splice a new node of `kind` into an existing connection
///
/// Returns `None`, leaving the document unchanged, when the new node has
/// no port to take the connection's value or to feed its target.
pub fn insert_node_within_connection<N: NodeKind>(
    document: &Document<N>,
    connection: &str,
    kind: N,
) -> Result<Option<NodeId>> {
    let bindings = document.get_bindings(connection);
    let (Some(start), Some(end)) = (bindings.start, bindings.end) else {
        return Ok(None);
    };
    let port_type = |node: &str, port: &str| -> Result<_> {
        document
            .ports(node)?
            .get(port)
            .map(|p| p.data_type)
            .ok_or_else(|| PipelineError::PortNotFound {
                node: node.to_string(),
                port: port.to_string(),
            })
    };
    let source_type = port_type(&start.node, &start.port_id)?;
    let target_type = port_type(&end.node, &end.port_id)?;

    let node_id = document.create_node(kind);
    let ports = document.ports(&node_id)?;
    let input = find_first_compatible_port(&ports, Terminal::End, source_type);
    let output = find_first_compatible_port(&ports, Terminal::Start, target_type);
    let (Some(input), Some(output)) = (input, output) else {
        document.delete_node(&node_id)?;
        return Ok(None);
    };

    document.create_or_update_binding(
        connection,
        &node_id,
        BindingProps::new(input.id.clone(), Terminal::End),
    )?;
    let downstream = document.add_connection();
    document.create_or_update_binding(
        &downstream,
        &node_id,
        BindingProps::new(output.id.clone(), Terminal::Start),
    )?;
    document.create_or_update_binding(
        &downstream,
        &end.node,
        BindingProps::new(end.port_id.clone(), Terminal::End).with_order(end.order),
    )?;
    Ok(Some(node_id))
}

/// Create a node of `kind` and hang the dangling `terminal` end on it
///
/// The end goes to the new node's first port matching the type of the
/// connection's fixed end, or `Any` when that end is unbound as well. A
/// node without any port on `terminal` is kept and the connection stays
/// dangling for [`delete_incomplete_connections`].
pub fn attach_new_node_to_dangling_end<N: NodeKind>(
    document: &Document<N>,
    connection: &str,
    terminal: Terminal,
    kind: N,
) -> Result<(NodeId, DragOutcome)> {
    if !document.contains_connection(connection) {
        return Err(PipelineError::ConnectionNotFound(connection.to_string()));
    }
    let fixed_type = document
        .get_bindings(connection)
        .get(terminal.opposite())
        .and_then(|fixed| {
            document
                .ports(&fixed.node)
                .ok()?
                .get(&fixed.port_id)
                .map(|p| p.data_type)
        })
        .unwrap_or(PortDataType::Any);

    let node_id = document.create_node(kind);
    let ports = document.ports(&node_id)?;
    let Some(port) = find_first_compatible_port(&ports, terminal, fixed_type) else {
        log::debug!(
            "Node {} has no {:?} port for connection {}",
            node_id,
            terminal,
            connection
        );
        return Ok((node_id, DragOutcome::Detached));
    };
    document.create_or_update_binding(
        connection,
        &node_id,
        BindingProps::new(port.id.clone(), terminal),
    )?;
    Ok((node_id, DragOutcome::Attached))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_document, TestNode};
    use crate::validation::{validate_document, ValidationError};

    #[test]
    fn test_connect_rejects_bad_requests() {
        let doc = test_document();
        doc.add_node("a", TestNode::pass()).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        doc.add_node("img", TestNode::typed_source("x", PortDataType::Image))
            .unwrap();
        doc.add_node(
            "txt",
            TestNode::Pass {
                data_type: PortDataType::Text,
            },
        )
        .unwrap();

        assert!(matches!(
            connect(&doc, "a", "in", "b", "in"),
            Err(PipelineError::TerminalMismatch { .. })
        ));
        assert!(matches!(
            connect(&doc, "a", "nope", "b", "in"),
            Err(PipelineError::PortNotFound { .. })
        ));
        assert!(matches!(
            connect(&doc, "missing", "out", "b", "in"),
            Err(PipelineError::NodeNotFound(_))
        ));
        assert!(matches!(
            connect(&doc, "img", "out", "txt", "in"),
            Err(PipelineError::IncompatiblePorts { .. })
        ));

        connect(&doc, "a", "out", "b", "in").unwrap();
        assert!(matches!(
            connect(&doc, "b", "out", "a", "in"),
            Err(PipelineError::WouldCreateCycle { .. })
        ));
        assert!(matches!(
            connect(&doc, "a", "out", "a", "in"),
            Err(PipelineError::WouldCreateCycle { .. })
        ));
        assert_eq!(doc.connection_ids().len(), 1);
    }

    #[test]
    fn test_drag_attaches_and_detaches() {
        let doc = test_document();
        doc.add_node("a", TestNode::pass()).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        doc.add_node("c", TestNode::Sink).unwrap();
        let conn = connect(&doc, "a", "out", "b", "in").unwrap();

        let moved = drag_terminal(&doc, &conn, Terminal::End, Some(("c", "in"))).unwrap();
        assert_eq!(moved, DragOutcome::Attached);
        assert_eq!(doc.get_bindings(&conn).end.unwrap().node, "c");

        // Output port as an end target: wrong terminal.
        let wrong = drag_terminal(&doc, &conn, Terminal::End, Some(("b", "out"))).unwrap();
        assert_eq!(wrong, DragOutcome::Detached);
        assert!(doc.get_bindings(&conn).end.is_none());

        let released = drag_terminal(&doc, &conn, Terminal::End, None).unwrap();
        assert_eq!(released, DragOutcome::Detached);
    }

    #[test]
    fn test_drag_refuses_cycle() {
        let doc = test_document();
        doc.add_node("a", TestNode::pass()).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        connect(&doc, "a", "out", "b", "in").unwrap();

        let back = doc.add_connection();
        doc.create_or_update_binding(&back, "b", BindingProps::new("out", Terminal::Start))
            .unwrap();
        let outcome = drag_terminal(&doc, &back, Terminal::End, Some(("a", "in"))).unwrap();
        assert_eq!(outcome, DragOutcome::Detached);
        assert!(!doc.get_bindings(&back).is_complete());
    }

    #[test]
    fn test_delete_incomplete_connections() {
        let doc = test_document();
        doc.add_node("a", TestNode::pass()).unwrap();
        doc.add_node("b", TestNode::pass()).unwrap();
        let complete = connect(&doc, "a", "out", "b", "in").unwrap();
        let dangling = doc.add_connection();
        doc.create_or_update_binding(&dangling, "b", BindingProps::new("out", Terminal::Start))
            .unwrap();

        assert_eq!(delete_incomplete_connections(&doc), vec![dangling]);
        assert_eq!(doc.connection_ids(), vec![complete]);
    }

    #[test]
    fn test_insert_node_within_connection() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("x")).unwrap();
        doc.add_node("b", TestNode::Sink).unwrap();
        let conn = connect(&doc, "a", "out", "b", "in").unwrap();

        let inserted = insert_node_within_connection(&doc, &conn, TestNode::pass())
            .unwrap()
            .unwrap();

        assert_eq!(doc.get_bindings(&conn).end.unwrap().node, inserted);
        let downstream: Vec<_> = doc
            .bindings_to_node(&inserted)
            .into_iter()
            .filter(|b| b.terminal == Terminal::Start)
            .collect();
        assert_eq!(downstream.len(), 1);
        let target = doc.get_bindings(&downstream[0].connection).end.unwrap();
        assert_eq!((target.node.as_str(), target.port_id.as_str()), ("b", "in"));
    }

    #[test]
    fn test_insert_without_matching_ports_is_undone() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("x")).unwrap();
        doc.add_node("b", TestNode::Sink).unwrap();
        let conn = connect(&doc, "a", "out", "b", "in").unwrap();

        // A sink has no output to feed `b`.
        let inserted = insert_node_within_connection(&doc, &conn, TestNode::Sink).unwrap();
        assert!(inserted.is_none());
        assert_eq!(doc.node_ids().len(), 2);
        assert_eq!(doc.get_bindings(&conn).end.unwrap().node, "b");
    }

    #[test]
    fn test_attach_new_node_matches_fixed_end_type() {
        let doc = test_document();
        doc.add_node("img", TestNode::typed_source("a.png", PortDataType::Image))
            .unwrap();
        let conn = doc.add_connection();
        doc.create_or_update_binding(&conn, "img", BindingProps::new("out", Terminal::Start))
            .unwrap();

        let kind = TestNode::Pass {
            data_type: PortDataType::Image,
        };
        let (node_id, outcome) =
            attach_new_node_to_dangling_end(&doc, &conn, Terminal::End, kind).unwrap();

        assert_eq!(outcome, DragOutcome::Attached);
        let end = doc.get_bindings(&conn).end.unwrap();
        assert_eq!((end.node.as_str(), end.port_id.as_str()), (node_id.as_str(), "in"));
        assert!(validate_document(&doc).is_empty());
    }

    #[test]
    fn test_attach_new_node_without_fixed_end_uses_any() {
        let doc = test_document();
        let conn = doc.add_connection();

        let (source, outcome) =
            attach_new_node_to_dangling_end(&doc, &conn, Terminal::Start, TestNode::source("x"))
                .unwrap();
        assert_eq!(outcome, DragOutcome::Attached);
        assert_eq!(doc.get_bindings(&conn).start.unwrap().node, source);

        let (sink, outcome) =
            attach_new_node_to_dangling_end(&doc, &conn, Terminal::End, TestNode::Sink).unwrap();
        assert_eq!(outcome, DragOutcome::Attached);
        assert_eq!(doc.get_bindings(&conn).end.unwrap().node, sink);
        assert!(doc.get_bindings(&conn).is_complete());
    }

    #[test]
    fn test_attach_new_node_without_port_leaves_connection_dangling() {
        let doc = test_document();
        doc.add_node("a", TestNode::source("x")).unwrap();
        let conn = doc.add_connection();
        doc.create_or_update_binding(&conn, "a", BindingProps::new("out", Terminal::Start))
            .unwrap();

        // A source has no input to take the end.
        let (node_id, outcome) =
            attach_new_node_to_dangling_end(&doc, &conn, Terminal::End, TestNode::source("y"))
                .unwrap();

        assert_eq!(outcome, DragOutcome::Detached);
        assert!(doc.contains_node(&node_id));
        assert!(doc.get_bindings(&conn).end.is_none());
        assert_eq!(delete_incomplete_connections(&doc), vec![conn]);
        assert!(doc.connection_ids().is_empty());
    }

    #[test]
    fn test_attach_new_node_to_missing_connection() {
        let doc = test_document();
        let result = attach_new_node_to_dangling_end(&doc, "nope", Terminal::End, TestNode::Sink);
        assert!(matches!(result, Err(PipelineError::ConnectionNotFound(_))));
        assert!(doc.node_ids().is_empty());
    }

    fn assert_single_occupancy(doc: &Document<TestNode>) {
        for node_id in doc.node_ids() {
            let bindings = doc.bindings_to_node(&node_id);
            for port in doc.ports(&node_id).unwrap().values() {
                if port.terminal != Terminal::End || port.multi {
                    continue;
                }
                let occupants = bindings
                    .iter()
                    .filter(|b| b.terminal == Terminal::End && b.port_id == port.id)
                    .count();
                assert!(occupants <= 1, "{}.{} has {} inputs", node_id, port.id, occupants);
            }
        }
    }

    #[test]
    fn test_single_input_port_holds_one_connection() {
        let doc = test_document();
        for id in ["s1", "s2", "s3"] {
            doc.add_node(id, TestNode::source(id)).unwrap();
        }
        doc.add_node("p", TestNode::pass()).unwrap();
        doc.add_node("sink", TestNode::Sink).unwrap();
        doc.add_node("all", TestNode::Collect).unwrap();

        connect(&doc, "s1", "out", "sink", "in").unwrap();
        assert_single_occupancy(&doc);
        connect(&doc, "s2", "out", "sink", "in").unwrap();
        assert_single_occupancy(&doc);

        let dragged = connect(&doc, "s3", "out", "p", "in").unwrap();
        let outcome = drag_terminal(&doc, &dragged, Terminal::End, Some(("sink", "in"))).unwrap();
        assert_eq!(outcome, DragOutcome::Attached);
        assert_single_occupancy(&doc);

        let manual = doc.add_connection();
        doc.create_or_update_binding(&manual, "s1", BindingProps::new("out", Terminal::Start))
            .unwrap();
        doc.create_or_update_binding(&manual, "sink", BindingProps::new("in", Terminal::End))
            .unwrap();
        assert_single_occupancy(&doc);

        connect(&doc, "p", "out", "sink", "in").unwrap();
        assert_single_occupancy(&doc);

        let roaming = connect(&doc, "s2", "out", "all", "in").unwrap();
        drag_terminal(&doc, &roaming, Terminal::End, Some(("sink", "in"))).unwrap();
        assert_single_occupancy(&doc);
        drag_terminal(&doc, &roaming, Terminal::End, Some(("all", "in"))).unwrap();
        connect(&doc, "s3", "out", "all", "in").unwrap();
        assert_single_occupancy(&doc);

        // Multi inputs keep every connection.
        let collected = doc
            .bindings_to_node("all")
            .into_iter()
            .filter(|b| b.terminal == Terminal::End)
            .count();
        assert_eq!(collected, 2);
        assert!(!validate_document(&doc)
            .iter()
            .any(|e| matches!(e, ValidationError::PortOccupied { .. })));
    }
}
