// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) table and the reverse row-to-edge map.

use crate::model::{GraphEvent, InvariantError};
use crate::node::NodeRegistry;
use crate::socket::{SocketDirection, SocketId};
use crate::source::RowKey;
use crate::value::{Role, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Unique identifier for an edge, never reused within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// A connection between a source socket and a sink socket
#[derive(Debug, Clone)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Source endpoint
    pub source: Option<SocketId>,
    /// Sink endpoint
    pub sink: Option<SocketId>,
    /// Last value written to the sink, per role
    pub(crate) last_propagated: IndexMap<Role, Value>,
}

impl Edge {
    fn new(id: EdgeId) -> Self {
        Self {
            id,
            source: None,
            sink: None,
            last_propagated: IndexMap::new(),
        }
    }

    /// Both endpoints are set
    pub fn is_valid(&self) -> bool {
        self.source.is_some() && self.sink.is_some()
    }

    /// At least one endpoint is set
    pub fn is_used(&self) -> bool {
        self.source.is_some() || self.sink.is_some()
    }

    /// Endpoint for a direction
    pub fn endpoint(&self, direction: SocketDirection) -> Option<SocketId> {
        match direction {
            SocketDirection::Source => self.source,
            SocketDirection::Sink => self.sink,
        }
    }

    fn slot(&mut self, direction: SocketDirection) -> &mut Option<SocketId> {
        match direction {
            SocketDirection::Source => &mut self.source,
            SocketDirection::Sink => &mut self.sink,
        }
    }

    /// Check if this edge uses a specific socket
    pub fn involves_socket(&self, socket: SocketId) -> bool {
        self.source == Some(socket) || self.sink == Some(socket)
    }
}

/// Edges touching a row, by the role the row plays
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowEdges {
    /// Edge using the row as its source
    pub as_source: Option<EdgeId>,
    /// Edge using the row as its sink
    pub as_sink: Option<EdgeId>,
}

impl RowEdges {
    fn slot(&mut self, direction: SocketDirection) -> &mut Option<EdgeId> {
        match direction {
            SocketDirection::Source => &mut self.as_source,
            SocketDirection::Sink => &mut self.as_sink,
        }
    }

    /// Edges in source-then-sink order, without duplicates
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> {
        let sink = self.as_sink.filter(|e| Some(*e) != self.as_source);
        self.as_source.into_iter().chain(sink)
    }
}

/// Result of reassigning an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EndpointChange {
    /// The endpoint already held that socket
    Unchanged,
    /// The endpoint changed
    Changed {
        /// Whether the edge now has both endpoints
        valid: bool,
    },
}

/// Append-mostly table of edges
#[derive(Debug)]
pub struct EdgeTable {
    rows: Vec<Option<Edge>>,
    by_id: IndexMap<EdgeId, usize>,
    direct: IndexMap<RowKey, RowEdges>,
    next_id: u64,
    revision: u64,
}

impl EdgeTable {
    /// Create an empty table; the first edge gets identity 1
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            by_id: IndexMap::new(),
            direct: IndexMap::new(),
            next_id: 1,
            revision: 0,
        }
    }

    /// Number of table rows, including rows without an edge
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.by_id.len()
    }

    /// Counter bumped on every endpoint change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Edge at a table row, created with a fresh identity if missing
    pub fn ensure_edge(&mut self, row: usize) -> EdgeId {
        if self.rows.len() <= row {
            self.rows.resize(row + 1, None);
        }
        if let Some(edge) = &self.rows[row] {
            return edge.id;
        }

        let id = EdgeId(self.next_id);
        self.next_id += 1;
        self.rows[row] = Some(Edge::new(id));
        self.by_id.insert(id, row);
        tracing::trace!("Created edge {:?} at row {}", id, row);
        id
    }

    /// Row that receives the next new connection: the last row while it is
    /// still unused, otherwise one past the end.
    pub fn placeholder_row(&self) -> usize {
        match self.rows.last() {
            Some(Some(edge)) if !edge.is_used() => self.rows.len() - 1,
            Some(None) => self.rows.len() - 1,
            _ => self.rows.len(),
        }
    }

    /// Get an edge by ID
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        let row = *self.by_id.get(&id)?;
        self.rows.get(row)?.as_ref()
    }

    pub(crate) fn edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        let row = *self.by_id.get(&id)?;
        self.rows.get_mut(row)?.as_mut()
    }

    /// Get the edge at a table row
    pub fn edge_at(&self, row: usize) -> Option<&Edge> {
        self.rows.get(row)?.as_ref()
    }

    /// Table row of an edge
    pub fn row_of(&self, id: EdgeId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    /// Get all edges with their table rows
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Edge)> {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(row, edge)| edge.as_ref().map(|e| (row, e)))
    }

    /// Edges touching a row, by identity token
    pub fn direct_lookup(&self, key: RowKey) -> RowEdges {
        self.direct.get(&key).copied().unwrap_or_default()
    }

    // Installs `socket` as the `direction` endpoint of an edge. The previous
    // endpoint is detached (reporting `Disconnected` if the edge was valid)
    // and an edge the socket belonged to is cleared first. Completing the
    // edge is left to `SocketModel::assign`, which syncs and reports
    // `Connected`.
    pub(crate) fn set_endpoint(
        &mut self,
        registry: &mut NodeRegistry,
        id: EdgeId,
        direction: SocketDirection,
        socket: Option<SocketId>,
        events: &mut Vec<GraphEvent>,
    ) -> EndpointChange {
        let Some(edge) = self.edge(id) else {
            return EndpointChange::Unchanged;
        };
        let current = edge.endpoint(direction);
        if current == socket {
            return EndpointChange::Unchanged;
        }

        if let Some(new) = socket {
            match registry.socket(new) {
                Some(s) if s.direction == direction => {}
                _ => {
                    tracing::warn!("Refusing {:?} as {:?} endpoint of {:?}", new, direction, id);
                    return EndpointChange::Unchanged;
                }
            }
        }

        if let (Some(source), Some(sink)) = (edge.source, edge.sink) {
            events.push(GraphEvent::Disconnected { edge: id, source, sink });
        }
        if let Some(old) = current {
            self.detach(registry, id, direction, old);
        }

        if let Some(new) = socket {
            let previous = registry.socket(new).and_then(|s| s.edge);
            if let Some(previous) = previous.filter(|p| *p != id) {
                tracing::debug!("Socket {:?} moves from {:?} to {:?}", new, previous, id);
                self.clear(registry, previous, events);
            }

            let key = registry.socket(new).and_then(|s| s.key);
            if let Some(s) = registry.socket_mut(new) {
                s.edge = Some(id);
            }
            if let Some(key) = key {
                *self.direct.entry(key).or_default().slot(direction) = Some(id);
            }
        }

        let valid = match self.edge_mut(id) {
            Some(edge) => {
                *edge.slot(direction) = socket;
                edge.last_propagated.clear();
                edge.is_valid()
            }
            None => false,
        };
        self.revision += 1;
        EndpointChange::Changed { valid }
    }

    // Clears both endpoints of an edge, keeping its identity. Returns whether
    // anything was cleared.
    pub(crate) fn clear(&mut self, registry: &mut NodeRegistry, id: EdgeId, events: &mut Vec<GraphEvent>) -> bool {
        let Some(edge) = self.edge(id) else {
            return false;
        };
        let (source, sink) = (edge.source, edge.sink);
        if source.is_none() && sink.is_none() {
            return false;
        }
        if let (Some(source), Some(sink)) = (source, sink) {
            events.push(GraphEvent::Disconnected { edge: id, source, sink });
        }
        if let Some(source) = source {
            self.detach(registry, id, SocketDirection::Source, source);
        }
        if let Some(sink) = sink {
            self.detach(registry, id, SocketDirection::Sink, sink);
        }
        if let Some(edge) = self.edge_mut(id) {
            edge.source = None;
            edge.sink = None;
            edge.last_propagated.clear();
        }
        self.revision += 1;
        true
    }

    // Drops the reverse-map entry and back-reference of an endpoint leaving
    // edge `id`; the edge's own slot is written by the caller.
    fn detach(&mut self, registry: &mut NodeRegistry, id: EdgeId, direction: SocketDirection, socket: SocketId) {
        let Some(s) = registry.socket_mut(socket) else {
            return;
        };
        if s.edge == Some(id) {
            s.edge = None;
        } else {
            tracing::error!(
                "Socket {:?} back-reference {:?} disagrees with edge {:?}",
                socket,
                s.edge,
                id
            );
            debug_assert!(false, "socket back-reference disagrees with its edge");
        }

        let Some(key) = s.key else {
            return;
        };
        if let Some(entry) = self.direct.get_mut(&key) {
            let slot = entry.slot(direction);
            if *slot == Some(id) {
                *slot = None;
            }
            if entry.as_source.is_none() && entry.as_sink.is_none() {
                self.direct.shift_remove(&key);
            }
        }
    }

    /// Verify endpoints, back-references and the reverse map agree
    pub fn check(&self, registry: &NodeRegistry) -> Result<(), InvariantError> {
        let mut seen: IndexMap<SocketId, EdgeId> = IndexMap::new();

        for (_, edge) in self.iter() {
            for direction in [SocketDirection::Source, SocketDirection::Sink] {
                let Some(id) = edge.endpoint(direction) else {
                    continue;
                };
                let socket = registry.socket(id).ok_or(InvariantError::DanglingEndpoint {
                    edge: edge.id,
                    socket: id,
                })?;
                if socket.direction != direction || socket.edge != Some(edge.id) {
                    return Err(InvariantError::BackReference(id));
                }
                if seen.insert(id, edge.id).is_some() {
                    return Err(InvariantError::SharedSocket(id));
                }
                if let Some(key) = socket.key {
                    let mut entry = self.direct_lookup(key);
                    if *entry.slot(direction) != Some(edge.id) {
                        return Err(InvariantError::DirectMap(key));
                    }
                }
            }
        }

        for socket in registry.sockets() {
            if let Some(edge) = socket.edge {
                if seen.get(&socket.id) != Some(&edge) {
                    return Err(InvariantError::BackReference(socket.id));
                }
            }
        }

        if self.by_id.len() != self.iter().count() {
            return Err(InvariantError::DuplicateEdgeId);
        }
        Ok(())
    }
}

impl Default for EdgeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::HierarchicalSource;
    use crate::memory::{MemoryPort, MemorySource};
    use crate::node::NodeId;
    use crate::value::ValueType;

    struct Fixture {
        registry: NodeRegistry,
        table: EdgeTable,
        events: Vec<GraphEvent>,
        out_a: SocketId,
        out_b: SocketId,
        input: SocketId,
    }

    fn fixture() -> Fixture {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("a", Value::Int(1)));
        source.add_port(a, MemoryPort::output("b", Value::Int(2)));
        let b = source.add_node("B");
        source.add_port(b, MemoryPort::input("in", ValueType::Int));

        let mut registry = NodeRegistry::new(source.id());
        registry.insert(&source, 0);
        registry.insert(&source, 1);

        let node_a = registry.node(NodeId(0)).unwrap();
        let out_a = node_a.sources().socket_at(0).unwrap();
        let out_b = node_a.sources().socket_at(1).unwrap();
        let input = registry.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();

        Fixture {
            registry,
            table: EdgeTable::new(),
            events: Vec::new(),
            out_a,
            out_b,
            input,
        }
    }

    #[test]
    fn test_identities_start_at_one_and_never_repeat() {
        let mut table = EdgeTable::new();
        assert_eq!(table.ensure_edge(0), EdgeId(1));
        assert_eq!(table.ensure_edge(0), EdgeId(1));
        assert_eq!(table.ensure_edge(3), EdgeId(2));
        assert_eq!(table.ensure_edge(1), EdgeId(3));
        assert!(table.edge_at(2).is_none());
        assert_eq!(table.row_of(EdgeId(2)), Some(3));
    }

    #[test]
    fn test_placeholder_reuses_unused_last_row() {
        let mut f = fixture();
        assert_eq!(f.table.placeholder_row(), 0);
        let id = f.table.ensure_edge(0);
        assert_eq!(f.table.placeholder_row(), 0);

        f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_a), &mut f.events);
        assert_eq!(f.table.placeholder_row(), 1);
    }

    #[test]
    fn test_endpoint_assignment_updates_back_references() {
        let mut f = fixture();
        let id = f.table.ensure_edge(0);

        let change = f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_a), &mut f.events);
        assert_eq!(change, EndpointChange::Changed { valid: false });
        let change = f.table.set_endpoint(&mut f.registry, id, SocketDirection::Sink, Some(f.input), &mut f.events);
        assert_eq!(change, EndpointChange::Changed { valid: true });
        assert_eq!(f.registry.socket(f.input).unwrap().edge, Some(id));
        assert!(f.events.is_empty());

        // retarget the source: old socket loses its back-reference
        f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_b), &mut f.events);
        assert_eq!(f.registry.socket(f.out_a).unwrap().edge, None);
        assert_eq!(
            f.events,
            vec![GraphEvent::Disconnected {
                edge: id,
                source: f.out_a,
                sink: f.input
            }]
        );
        f.table.check(&f.registry).unwrap();
    }

    #[test]
    fn test_same_socket_is_a_no_op() {
        let mut f = fixture();
        let id = f.table.ensure_edge(0);
        f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_a), &mut f.events);
        let revision = f.table.revision();
        let change = f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_a), &mut f.events);
        assert_eq!(change, EndpointChange::Unchanged);
        assert_eq!(f.table.revision(), revision);
    }

    #[test]
    fn test_wrong_direction_is_refused() {
        let mut f = fixture();
        let id = f.table.ensure_edge(0);
        let change = f.table.set_endpoint(&mut f.registry, id, SocketDirection::Sink, Some(f.out_a), &mut f.events);
        assert_eq!(change, EndpointChange::Unchanged);
        assert!(f.table.edge(id).unwrap().sink.is_none());
    }

    #[test]
    fn test_moving_a_socket_clears_its_previous_edge() {
        let mut f = fixture();
        let first = f.table.ensure_edge(0);
        f.table.set_endpoint(&mut f.registry, first, SocketDirection::Source, Some(f.out_a), &mut f.events);
        f.table.set_endpoint(&mut f.registry, first, SocketDirection::Sink, Some(f.input), &mut f.events);

        let second = f.table.ensure_edge(1);
        f.table.set_endpoint(&mut f.registry, second, SocketDirection::Sink, Some(f.input), &mut f.events);

        let old = f.table.edge(first).unwrap();
        assert!(!old.is_used());
        assert_eq!(f.registry.socket(f.out_a).unwrap().edge, None);
        assert_eq!(f.registry.socket(f.input).unwrap().edge, Some(second));
        assert_eq!(f.events.len(), 1);
        f.table.check(&f.registry).unwrap();
    }

    #[test]
    fn test_direct_map_follows_endpoints() {
        let mut f = fixture();
        let id = f.table.ensure_edge(0);
        f.table.set_endpoint(&mut f.registry, id, SocketDirection::Source, Some(f.out_a), &mut f.events);
        let key = f.registry.socket(f.out_a).unwrap().key.unwrap();
        assert_eq!(f.table.direct_lookup(key).as_source, Some(id));

        f.table.clear(&mut f.registry, id, &mut f.events);
        assert_eq!(f.table.direct_lookup(key), RowEdges::default());
        assert_eq!(f.table.edge(id).unwrap().id, id);
    }
}
