// SPDX-License-Identifier: MIT OR Apache-2.0
//! The socket model: nodes, sockets and edges mirrored from a source.
//!
//! [`SocketModel`] owns the source and keeps the registry and edge table in
//! step with it. Source changes are queued by the source and applied by
//! [`SocketModel::process_notifications`], in the order they were issued.
//! Rows named by an early notification are read where later notifications
//! moved them to.

use crate::config::GraphConfig;
use crate::drag::DragSession;
use crate::edge::{EdgeId, EdgeTable, EndpointChange};
use crate::filter::SocketFilterView;
use crate::node::{GraphNode, NodeId, NodeRegistry};
use crate::replay::Later;
use crate::socket::{Socket, SocketDirection, SocketId};
use crate::source::{HierarchicalSource, RowIndex, RowKey, SourceNotification};
use crate::sync::ConnectionSynchronizer;
use crate::value::ValueType;
use std::collections::VecDeque;

/// Change reported to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphEvent {
    /// An edge became valid
    Connected {
        /// Edge ID
        edge: EdgeId,
        /// Source endpoint
        source: SocketId,
        /// Sink endpoint
        sink: SocketId,
    },
    /// A valid edge lost an endpoint
    Disconnected {
        /// Edge ID
        edge: EdgeId,
        /// Former source endpoint
        source: SocketId,
        /// Former sink endpoint
        sink: SocketId,
    },
    /// A node was created at this position
    NodeInserted(NodeId),
    /// The node at this position was removed
    NodeRemoved(NodeId),
    /// The sockets of a node changed
    SocketsChanged(NodeId),
}

/// Error when creating or editing a connection
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Socket not found
    #[error("Socket not found: {0:?}")]
    UnknownSocket(SocketId),

    /// Edge not found
    #[error("Edge not found: {0:?}")]
    UnknownEdge(EdgeId),

    /// Socket has the wrong direction for this endpoint
    #[error("Socket {socket:?} is not a {expected:?}")]
    WrongDirection {
        /// Offending socket
        socket: SocketId,
        /// Direction the endpoint needs
        expected: SocketDirection,
    },

    /// Both sockets belong to the same node
    #[error("Self-connection not allowed on node {0:?}")]
    SelfConnection(NodeId),

    /// Source values cannot be converted to the sink type
    #[error("Incompatible types: {source_type:?} -> {sink_type:?}")]
    IncompatibleTypes {
        /// Declared type of the source
        source_type: ValueType,
        /// Declared type of the sink
        sink_type: ValueType,
    },
}

/// Broken structural invariant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantError {
    /// Forward and backward socket arrays disagree
    #[error("Socket index of node {0:?} is inconsistent")]
    IndexMismatch(NodeId),

    /// A node references a socket missing from the arena
    #[error("Socket not in registry: {0:?}")]
    MissingSocket(SocketId),

    /// A socket's owner, row or direction disagrees with its node
    #[error("Socket {0:?} disagrees with its node")]
    SocketMismatch(SocketId),

    /// The arena holds sockets no node owns
    #[error("{stored} sockets stored but {owned} owned by nodes")]
    OrphanSockets {
        /// Sockets in the arena
        stored: usize,
        /// Sockets reachable from nodes
        owned: usize,
    },

    /// An edge endpoint is not a live socket
    #[error("Edge {edge:?} references missing socket {socket:?}")]
    DanglingEndpoint {
        /// Edge ID
        edge: EdgeId,
        /// Missing socket
        socket: SocketId,
    },

    /// A socket's back-reference disagrees with the edge table
    #[error("Back-reference of socket {0:?} disagrees with the edge table")]
    BackReference(SocketId),

    /// A socket is the endpoint of more than one edge
    #[error("Socket {0:?} is used by more than one edge")]
    SharedSocket(SocketId),

    /// Edge identities are not unique
    #[error("Duplicate edge identity")]
    DuplicateEdgeId,

    /// The reverse row map disagrees with the edge endpoints
    #[error("Reverse map entry for row {0:?} is stale")]
    DirectMap(RowKey),

    /// The registry holds a different number of nodes than the source has rows
    #[error("{mirrored} nodes mirrored but the source has {rows} rows")]
    NodeCount {
        /// Nodes in the registry
        mirrored: usize,
        /// Top-level rows in the source
        rows: usize,
    },

    /// A node accounts for a different number of children than its row has
    #[error("Node {node:?} accounts for {mirrored} child rows but the source has {rows}")]
    ChildCount {
        /// Node ID
        node: NodeId,
        /// Child rows accounted for by the node
        mirrored: usize,
        /// Child rows in the source
        rows: usize,
    },
}

/// A socket as seen from an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Owning node
    pub node: NodeId,
    /// Socket ID
    pub socket: SocketId,
    /// Child row backing the socket
    pub row: usize,
}

/// Snapshot of one edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeInfo {
    /// Edge ID
    pub id: EdgeId,
    /// Row in the edge table
    pub row: usize,
    /// Source endpoint
    pub source: Option<Endpoint>,
    /// Sink endpoint
    pub sink: Option<Endpoint>,
    /// Both endpoints are set
    pub valid: bool,
}

/// Node graph mirrored from a hierarchical source
pub struct SocketModel<S: HierarchicalSource> {
    pub(crate) source: S,
    pub(crate) config: GraphConfig,
    pub(crate) registry: NodeRegistry,
    pub(crate) edges: EdgeTable,
    pub(crate) sync: ConnectionSynchronizer,
    pub(crate) drag: DragSession,
    pub(crate) events: Vec<GraphEvent>,
    backlog: VecDeque<SourceNotification>,
}

impl<S: HierarchicalSource> SocketModel<S> {
    /// Mirror `source` with the default configuration
    pub fn new(source: S) -> Self {
        Self::with_config(source, GraphConfig::default())
    }

    /// Mirror `source` with an explicit configuration.
    ///
    /// Every existing row is indexed, so notifications already queued by the
    /// source are discarded.
    pub fn with_config(mut source: S, config: GraphConfig) -> Self {
        source.take_notifications();

        let mut registry = NodeRegistry::new(source.id());
        for row in 0..source.row_count(None) {
            registry.insert(&source, row);
        }
        tracing::info!(
            "Socket model mirrors {} nodes with {} sockets",
            registry.len(),
            registry.sockets().count()
        );

        Self {
            sync: ConnectionSynchronizer::from_config(&config),
            source,
            config,
            registry,
            edges: EdgeTable::new(),
            drag: DragSession::Idle,
            events: Vec::new(),
            backlog: VecDeque::new(),
        }
    }

    /// The mirrored source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Edit the source, then apply the notifications it queued
    pub fn update_source<R>(&mut self, f: impl FnOnce(&mut S) -> R) -> R {
        let result = f(&mut self.source);
        self.process_notifications();
        result
    }

    /// Active configuration
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// Node registry
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Edge table
    pub fn edge_table(&self) -> &EdgeTable {
        &self.edges
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.registry.len()
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.registry.node(id)
    }

    /// Get the node for a row, see [`NodeRegistry::lookup`]
    pub fn lookup(&self, row: RowIndex, recursive: bool) -> Option<&GraphNode> {
        self.registry.lookup(row, recursive)
    }

    /// Get a socket by ID
    pub fn socket(&self, id: SocketId) -> Option<&Socket> {
        self.registry.socket(id)
    }

    /// Number of source sockets of a node
    pub fn source_count(&self, node: NodeId) -> usize {
        self.registry.source_count(node)
    }

    /// Number of sink sockets of a node
    pub fn sink_count(&self, node: NodeId) -> usize {
        self.registry.sink_count(node)
    }

    /// Source socket backed by a child row
    pub fn source_socket_at(&self, row: RowIndex) -> Option<SocketId> {
        self.registry.source_socket_at(row)
    }

    /// Sink socket backed by a child row
    pub fn sink_socket_at(&self, row: RowIndex) -> Option<SocketId> {
        self.registry.sink_socket_at(row)
    }

    /// Dense view over one direction of a node's sockets
    pub fn socket_view(&self, node: NodeId, direction: SocketDirection) -> Option<SocketFilterView<'_, S>> {
        let node = self.registry.node(node)?;
        Some(SocketFilterView::new(
            &self.source,
            &self.registry,
            &self.edges,
            node,
            direction,
        ))
    }

    fn endpoint(&self, socket: Option<SocketId>) -> Option<Endpoint> {
        let socket = self.registry.socket(socket?)?;
        Some(Endpoint {
            node: socket.node,
            socket: socket.id,
            row: socket.row,
        })
    }

    /// Snapshot of an edge
    pub fn edge(&self, id: EdgeId) -> Option<EdgeInfo> {
        let row = self.edges.row_of(id)?;
        let edge = self.edges.edge(id)?;
        Some(EdgeInfo {
            id,
            row,
            source: self.endpoint(edge.source),
            sink: self.endpoint(edge.sink),
            valid: edge.is_valid(),
        })
    }

    /// Snapshots of every edge in table order
    pub fn edges(&self) -> impl Iterator<Item = EdgeInfo> + '_ {
        self.edges.iter().filter_map(|(_, edge)| self.edge(edge.id))
    }

    /// Drain the queued presentation events
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.events)
    }

    /// Apply notifications queued by the source.
    ///
    /// Writes made while propagating queue further notifications, which are
    /// drained in later rounds up to `max_propagation_rounds`. Whatever is
    /// left after that stays queued for the next call. Returns the number of
    /// notifications applied.
    pub fn process_notifications(&mut self) -> usize {
        let mut applied = 0;
        for _ in 0..self.config.max_propagation_rounds {
            self.backlog.extend(self.source.take_notifications());
            if self.backlog.is_empty() {
                return applied;
            }
            let batch: Vec<SourceNotification> = self.backlog.drain(..).collect();
            self.apply_batch(&batch);
            applied += batch.len();
        }

        self.backlog.extend(self.source.take_notifications());
        if !self.backlog.is_empty() {
            tracing::warn!(
                "Propagation did not settle after {} rounds, {} notifications deferred",
                self.config.max_propagation_rounds,
                self.backlog.len()
            );
        }
        applied
    }

    /// Number of notifications deferred by the round limit
    pub fn deferred_notifications(&self) -> usize {
        self.backlog.len()
    }

    // Structural notifications are applied in order. Value changes are
    // carried to where their rows ended up and synced once the registry
    // matches the source again.
    fn apply_batch(&mut self, batch: &[SourceNotification]) {
        let mut changed = Vec::new();
        for (i, notification) in batch.iter().enumerate() {
            let later = Later::new(&batch[i + 1..]);
            match *notification {
                SourceNotification::RowsInserted { parent: None, first, last } => {
                    self.nodes_inserted(first, last, later);
                }
                SourceNotification::RowsInserted {
                    parent: Some(parent),
                    first,
                    last,
                } => self.sockets_inserted(parent, first, last, later),
                SourceNotification::RowsRemoved { parent: None, first, last } => self.nodes_removed(first, last),
                SourceNotification::RowsRemoved {
                    parent: Some(parent),
                    first,
                    last,
                } => self.sockets_removed(parent, first, last),
                SourceNotification::ValueChanged { parent, first, last } => {
                    changed.extend(later.carry_range(parent, first, last));
                }
            }
        }

        for (parent, first, last) in changed {
            self.values_changed(parent, first, last);
        }
    }

    fn values_changed(&mut self, parent: Option<usize>, first: usize, last: usize) {
        match parent {
            None => {
                for row in first..=last.min(self.registry.len().saturating_sub(1)) {
                    self.registry.refresh_title(&self.source, NodeId(row));
                }
            }
            Some(parent) => {
                self.sync
                    .sync_rows(&mut self.source, &self.registry, &mut self.edges, parent, first, last);
            }
        }
    }

    fn nodes_inserted(&mut self, first: usize, last: usize, later: Later<'_>) {
        if last < first {
            return;
        }
        if first > self.registry.len() {
            tracing::warn!(
                "Node insert {}..={} past the {} mirrored nodes, ignored",
                first,
                last,
                self.registry.len()
            );
            return;
        }

        let origin = self.source.id();
        for row in first..=last {
            let current = later.carry((None, row)).map(|(_, row)| row);
            let children = later
                .children_before(row, |now| self.source.row_count(Some(now)))
                .unwrap_or(0);
            let id = self.registry.insert_located(
                &self.source,
                row,
                current.map(|now| RowIndex::top(origin, now)),
                children,
                |child| {
                    let (parent, child) = later.carry((Some(row), child))?;
                    Some(RowIndex::child(origin, parent?, child))
                },
            );
            self.events.push(GraphEvent::NodeInserted(id));
        }
    }

    fn sockets_inserted(&mut self, parent: usize, first: usize, last: usize, later: Later<'_>) {
        let Some(node) = self.registry.node(NodeId(parent)) else {
            tracing::warn!("Child insert under unknown node {}, ignored", parent);
            return;
        };
        if last < first {
            return;
        }
        if first > node.child_rows {
            tracing::warn!(
                "Child insert {}..={} under {} past its {} rows, ignored",
                first,
                last,
                parent,
                node.child_rows
            );
            return;
        }

        let origin = self.source.id();
        self.registry
            .insert_sockets_located(&self.source, NodeId(parent), first, last, |child| {
                let (parent, child) = later.carry((Some(parent), child))?;
                Some(RowIndex::child(origin, parent?, child))
            });
        self.events.push(GraphEvent::SocketsChanged(NodeId(parent)));
    }

    fn nodes_removed(&mut self, first: usize, last: usize) {
        if last < first || first >= self.registry.len() {
            return;
        }
        let last = last.min(self.registry.len() - 1);
        let doomed: Vec<SocketId> = (first..=last)
            .filter_map(|row| self.registry.node(NodeId(row)))
            .flat_map(GraphNode::sockets)
            .collect();
        self.detach_sockets(&doomed);

        self.registry.remove(first, last);
        self.events.extend((first..=last).map(|row| GraphEvent::NodeRemoved(NodeId(row))));
    }

    fn sockets_removed(&mut self, parent: usize, first: usize, last: usize) {
        let Some(node) = self.registry.node(NodeId(parent)) else {
            return;
        };
        if last < first || first >= node.child_rows {
            return;
        }
        let last = last.min(node.child_rows - 1);
        let doomed = self.registry.sockets_in_rows(NodeId(parent), first, last);
        self.detach_sockets(&doomed);

        self.registry.remove_sockets(NodeId(parent), first, last);
        self.events.push(GraphEvent::SocketsChanged(NodeId(parent)));
    }

    // Clears every edge touching `doomed` and abandons a drag anchored on one
    // of them, while the sockets are still in the registry.
    fn detach_sockets(&mut self, doomed: &[SocketId]) {
        let anchor_removed = self.drag.active().is_some_and(|d| doomed.contains(&d.anchor));
        if anchor_removed {
            tracing::debug!("Drag anchor removed, cancelling");
            self.cancel_drag();
        } else if let Some(drag) = self.drag.active_mut() {
            if drag.target.is_some_and(|t| doomed.contains(&t)) {
                drag.target = None;
            }
        }

        for &socket in doomed {
            if let Some(edge) = self.registry.socket(socket).and_then(|s| s.edge) {
                self.edges.clear(&mut self.registry, edge, &mut self.events);
            }
        }
    }

    // Assigns an endpoint and, when that completes the edge, propagates once
    // and reports the connection.
    pub(crate) fn assign(
        &mut self,
        edge: EdgeId,
        direction: SocketDirection,
        socket: Option<SocketId>,
    ) -> EndpointChange {
        let change = self
            .edges
            .set_endpoint(&mut self.registry, edge, direction, socket, &mut self.events);

        if change == (EndpointChange::Changed { valid: true }) {
            if let Some(e) = self.edges.edge_mut(edge) {
                self.sync.sync_edge(&mut self.source, &self.registry, e);
                if let (Some(source), Some(sink)) = (e.source, e.sink) {
                    tracing::debug!("Connected {:?} -> {:?} via {:?}", source, sink, edge);
                    self.events.push(GraphEvent::Connected { edge, source, sink });
                }
            }
        }
        change
    }

    /// Edge at an edge-table row, created if missing
    pub fn ensure_edge(&mut self, row: usize) -> EdgeId {
        self.edges.ensure_edge(row)
    }

    /// Connect a source socket to a sink socket.
    ///
    /// Either socket loses any edge it had. If the two are already connected
    /// to each other the existing edge is returned unchanged.
    pub fn connect(&mut self, source: SocketId, sink: SocketId) -> Result<EdgeId, ConnectionError> {
        let from = self.checked_socket(source, SocketDirection::Source)?;
        let to = self.checked_socket(sink, SocketDirection::Sink)?;

        if !self.config.allow_self_connections && from.node == to.node {
            return Err(ConnectionError::SelfConnection(from.node));
        }
        if let (Some(existing), Some(other)) = (from.edge, to.edge) {
            if existing == other {
                return Ok(existing);
            }
        }

        let types = (
            self.registry.socket_row(source).and_then(|r| self.source.value_type(r)),
            self.registry.socket_row(sink).and_then(|r| self.source.value_type(r)),
        );
        if let (Some(source_type), Some(sink_type)) = types {
            if !sink_type.accepts(&source_type) {
                return Err(ConnectionError::IncompatibleTypes { source_type, sink_type });
            }
        }

        let row = self.edges.placeholder_row();
        let edge = self.edges.ensure_edge(row);
        self.assign(edge, SocketDirection::Source, Some(source));
        self.assign(edge, SocketDirection::Sink, Some(sink));
        self.process_notifications();
        Ok(edge)
    }

    /// Clear both endpoints of an edge, keeping its identity
    pub fn disconnect(&mut self, edge: EdgeId) -> bool {
        let cleared = self.edges.clear(&mut self.registry, edge, &mut self.events);
        if cleared {
            tracing::debug!("Disconnected {:?}", edge);
        }
        cleared
    }

    /// Set or clear the source endpoint of an edge
    pub fn set_source_endpoint(&mut self, edge: EdgeId, socket: Option<SocketId>) -> Result<(), ConnectionError> {
        self.set_endpoint(edge, SocketDirection::Source, socket)
    }

    /// Set or clear the sink endpoint of an edge
    pub fn set_sink_endpoint(&mut self, edge: EdgeId, socket: Option<SocketId>) -> Result<(), ConnectionError> {
        self.set_endpoint(edge, SocketDirection::Sink, socket)
    }

    fn set_endpoint(
        &mut self,
        edge: EdgeId,
        direction: SocketDirection,
        socket: Option<SocketId>,
    ) -> Result<(), ConnectionError> {
        if self.edges.edge(edge).is_none() {
            return Err(ConnectionError::UnknownEdge(edge));
        }
        if let Some(id) = socket {
            self.checked_socket(id, direction)?;
        }
        self.assign(edge, direction, socket);
        self.process_notifications();
        Ok(())
    }

    fn check_mirror(&self) -> Result<(), InvariantError> {
        let rows = self.source.row_count(None);
        if self.registry.len() != rows {
            return Err(InvariantError::NodeCount {
                mirrored: self.registry.len(),
                rows,
            });
        }
        for node in self.registry.nodes() {
            let rows = self.source.row_count(Some(node.id.0));
            if node.child_rows != rows {
                return Err(InvariantError::ChildCount {
                    node: node.id,
                    mirrored: node.child_rows,
                    rows,
                });
            }
        }
        Ok(())
    }

    fn checked_socket(&self, id: SocketId, expected: SocketDirection) -> Result<&Socket, ConnectionError> {
        let socket = self.registry.socket(id).ok_or(ConnectionError::UnknownSocket(id))?;
        if socket.direction != expected {
            return Err(ConnectionError::WrongDirection { socket: id, expected });
        }
        Ok(socket)
    }

    /// Verify every structural invariant, including that the registry
    /// mirrors the source row for row
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let result = self
            .check_mirror()
            .and_then(|()| self.registry.check())
            .and_then(|()| self.edges.check(&self.registry));
        if let Err(err) = &result {
            tracing::error!("Socket model invariant violated: {}", err);
        }
        result
    }
}

impl<S: HierarchicalSource + std::fmt::Debug> std::fmt::Debug for SocketModel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketModel")
            .field("source", &self.source)
            .field("nodes", &self.registry.len())
            .field("edges", &self.edges.edge_count())
            .field("drag", &self.drag)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPort, MemorySource};
    use crate::value::{Role, Value};

    fn two_nodes() -> (SocketModel<MemorySource>, SocketId, SocketId) {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("out", Value::Int(5)));
        let b = source.add_node("B");
        source.add_port(b, MemoryPort::input("in", ValueType::Int));
        let model = SocketModel::new(source);
        let out = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();
        let input = model.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();
        (model, out, input)
    }

    #[test]
    fn test_existing_rows_are_indexed() {
        let (model, _, _) = two_nodes();
        assert_eq!(model.node_count(), 2);
        assert_eq!(model.source_count(NodeId(0)), 1);
        assert_eq!(model.sink_count(NodeId(1)), 1);
        assert_eq!(model.deferred_notifications(), 0);
    }

    #[test]
    fn test_connect_propagates_and_reports() {
        let (mut model, out, input) = two_nodes();
        let edge = model.connect(out, input).unwrap();
        assert_eq!(edge, EdgeId(1));
        assert_eq!(model.source().value(1, 0), Some(&Value::Int(5)));
        assert_eq!(
            model.take_events(),
            vec![GraphEvent::Connected { edge, source: out, sink: input }]
        );
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_connect_validates_sockets() {
        let (mut model, out, input) = two_nodes();
        assert_eq!(
            model.connect(input, out),
            Err(ConnectionError::WrongDirection {
                socket: input,
                expected: SocketDirection::Source
            })
        );
        assert_eq!(
            model.connect(SocketId(99), input),
            Err(ConnectionError::UnknownSocket(SocketId(99)))
        );
        assert!(model.edges().next().is_none());
    }

    #[test]
    fn test_connect_rejects_incompatible_types() {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("name", Value::String("x".into())));
        source.add_port(a, MemoryPort::input("count", ValueType::Int));
        let mut model = SocketModel::new(source);
        let out = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();
        let input = model.node(NodeId(0)).unwrap().sinks().socket_at(0).unwrap();

        assert!(matches!(
            model.connect(out, input),
            Err(ConnectionError::IncompatibleTypes { .. })
        ));
    }

    #[test]
    fn test_self_connection_follows_config() {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("out", Value::Int(1)));
        source.add_port(a, MemoryPort::input("in", ValueType::Int));
        let config = GraphConfig {
            allow_self_connections: false,
            ..GraphConfig::default()
        };
        let mut model = SocketModel::with_config(source, config);
        let out = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();
        let input = model.node(NodeId(0)).unwrap().sinks().socket_at(0).unwrap();

        assert_eq!(
            model.connect(out, input),
            Err(ConnectionError::SelfConnection(NodeId(0)))
        );
    }

    #[test]
    fn test_endpoints_can_be_set_individually() {
        let (mut model, out, input) = two_nodes();
        let edge = model.ensure_edge(0);
        model.set_sink_endpoint(edge, Some(input)).unwrap();
        assert!(!model.edge(edge).unwrap().valid);

        model.set_source_endpoint(edge, Some(out)).unwrap();
        let info = model.edge(edge).unwrap();
        assert!(info.valid);
        assert_eq!(info.source.map(|e| e.node), Some(NodeId(0)));
        assert_eq!(info.sink.map(|e| e.row), Some(0));

        assert_eq!(
            model.set_source_endpoint(EdgeId(42), Some(out)),
            Err(ConnectionError::UnknownEdge(EdgeId(42)))
        );
        model.set_source_endpoint(edge, None).unwrap();
        assert!(!model.edge(edge).unwrap().valid);
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_node_title_tracks_source() {
        let (mut model, _, _) = two_nodes();
        let row = RowIndex::top(model.source().id(), 0);
        model.update_source(|s| s.write(row, Value::String("Renamed".into()), Role::Display));
        assert_eq!(model.node(NodeId(0)).unwrap().title, "Renamed");
    }

    #[test]
    fn test_removing_a_connected_node_disconnects() {
        let (mut model, out, input) = two_nodes();
        let edge = model.connect(out, input).unwrap();
        model.take_events();

        model.update_source(|s| s.remove_node(0));
        assert_eq!(model.node_count(), 1);
        assert!(!model.edge(edge).unwrap().valid);
        assert!(model.socket(input).unwrap().edge.is_none());
        assert_eq!(
            model.take_events(),
            vec![
                GraphEvent::Disconnected { edge, source: out, sink: input },
                GraphEvent::NodeRemoved(NodeId(0)),
            ]
        );
        assert_eq!(model.socket(input).unwrap().node, NodeId(0));
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_node_added_with_ports_is_indexed_once() {
        let (mut model, _, _) = two_nodes();
        model.update_source(|s| {
            let c = s.add_node("C");
            s.add_port(c, MemoryPort::input("in", ValueType::Float));
            s.add_port(c, MemoryPort::output("out", Value::Float(1.0)));
        });
        let node = model.node(NodeId(2)).unwrap();
        assert_eq!(node.sinks().len(), 1);
        assert_eq!(node.sources().len(), 1);
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_batched_edits_are_replayed_in_order() {
        let (mut model, _, _) = two_nodes();
        model.update_source(|s| {
            let c = s.add_node("C");
            s.add_port(c, MemoryPort::output("c", Value::Int(3)));
            s.remove_node(0);
        });

        let titles: Vec<&str> = model.registry().nodes().map(|n| n.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C"]);
        assert_eq!(model.source_count(NodeId(1)), 1);
        assert_eq!(model.sink_count(NodeId(0)), 1);
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_port_added_before_node_shift_is_kept() {
        let (mut model, _, input) = two_nodes();
        model.update_source(|s| {
            s.add_port(1, MemoryPort::input("b1", ValueType::Int));
            s.insert_node(0, "Front");
        });

        let node = model.node(NodeId(2)).unwrap();
        assert_eq!(node.title, "B");
        assert_eq!(node.sinks().len(), 2);
        assert_eq!(model.socket(input).unwrap().node, NodeId(2));
        let added = node.sinks().socket_at(1).unwrap();
        let row = model.registry().socket_row(added).unwrap();
        assert_eq!(model.source().port(row.parent.unwrap(), row.row).unwrap().name, "b1");
        model.check_invariants().unwrap();
    }

    #[test]
    fn test_check_invariants_compares_with_source() {
        let (mut model, _, _) = two_nodes();
        model.source.add_node("Unseen");
        assert_eq!(
            model.check_invariants(),
            Err(InvariantError::NodeCount { mirrored: 2, rows: 3 })
        );

        model.process_notifications();
        model.check_invariants().unwrap();
    }
}
