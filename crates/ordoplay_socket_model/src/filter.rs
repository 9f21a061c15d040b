// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dense per-node view over one direction of sockets.
//!
//! The view is what a list or port column binds to: positions `0..len` map to
//! the node's sources (or sinks) in order, and each entry carries the edge and
//! peer columns synthesized from the edge table.

use crate::edge::{EdgeId, EdgeTable};
use crate::node::{GraphNode, NodeId, NodeRegistry};
use crate::socket::{SocketDirection, SocketId};
use crate::source::{HierarchicalSource, RowIndex};
use crate::value::{Role, Value};

/// Far end of a valid edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peer {
    /// Socket at the other end
    pub socket: SocketId,
    /// Node owning that socket
    pub node: NodeId,
    /// Child row backing that socket
    pub row: usize,
}

/// One synthesized row of a [`SocketFilterView`]
#[derive(Debug, Clone, PartialEq)]
pub struct SocketEntry {
    /// Position in the view
    pub local: usize,
    /// Socket at this position
    pub socket: SocketId,
    /// Child row backing the socket
    pub row: usize,
    /// Display value of the row
    pub label: Option<Value>,
    /// Edge using the socket, valid or not
    pub edge: Option<EdgeId>,
    /// Far end, only when the edge is valid
    pub peer: Option<Peer>,
}

#[derive(Debug, Clone, Copy)]
struct Link {
    edge: Option<EdgeId>,
    peer: Option<Peer>,
}

/// Lazily built edge columns of one view, stamped with the revisions they
/// were built from.
#[derive(Debug, Clone)]
pub(crate) struct ViewCache {
    stamp: (u64, u64),
    links: Vec<Link>,
}

fn slot(direction: SocketDirection) -> usize {
    match direction {
        SocketDirection::Source => 0,
        SocketDirection::Sink => 1,
    }
}

/// Borrowed view over the sources or sinks of a node
pub struct SocketFilterView<'a, S: HierarchicalSource> {
    source: &'a S,
    registry: &'a NodeRegistry,
    table: &'a EdgeTable,
    node: &'a GraphNode,
    direction: SocketDirection,
}

impl<'a, S: HierarchicalSource> SocketFilterView<'a, S> {
    pub(crate) fn new(
        source: &'a S,
        registry: &'a NodeRegistry,
        table: &'a EdgeTable,
        node: &'a GraphNode,
        direction: SocketDirection,
    ) -> Self {
        Self {
            source,
            registry,
            table,
            node,
            direction,
        }
    }

    /// Node this view belongs to
    pub fn node(&self) -> NodeId {
        self.node.id
    }

    /// Direction of the sockets in this view
    pub fn direction(&self) -> SocketDirection {
        self.direction
    }

    /// Number of sockets
    pub fn len(&self) -> usize {
        self.node.index(self.direction).len()
    }

    /// Whether the node has no socket of this direction
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Source row backing the socket at `local`
    pub fn map_to_source(&self, local: usize) -> Option<RowIndex> {
        let row = self.node.index(self.direction).row_for_local(local)?;
        Some(RowIndex::child(self.registry.source_id(), self.node.id.0, row))
    }

    /// View position of a source row, if the row is a socket of this view
    pub fn map_from_source(&self, row: RowIndex) -> Option<usize> {
        if row.source != self.registry.source_id() || row.parent != Some(self.node.id.0) {
            return None;
        }
        self.node.index(self.direction).local_for_row(row.row)
    }

    /// Socket at `local`
    pub fn socket(&self, local: usize) -> Option<SocketId> {
        self.node.index(self.direction).socket_at(local)
    }

    /// Synthesized row at `local`
    pub fn entry(&self, local: usize) -> Option<SocketEntry> {
        let index = self.node.index(self.direction);
        let socket = index.socket_at(local)?;
        let row = index.row_for_local(local)?;
        let link = self.link(local)?;
        let label = self
            .source
            .read(RowIndex::child(self.registry.source_id(), self.node.id.0, row), Role::Display);

        Some(SocketEntry {
            local,
            socket,
            row,
            label,
            edge: link.edge,
            peer: link.peer,
        })
    }

    /// All synthesized rows in order
    pub fn entries(&self) -> Vec<SocketEntry> {
        (0..self.len()).filter_map(|local| self.entry(local)).collect()
    }

    /// Whether the edge columns are built for the current revisions
    pub fn is_cached(&self) -> bool {
        let stamp = self.stamp();
        self.node.views[slot(self.direction)]
            .borrow()
            .as_ref()
            .is_some_and(|cache| cache.stamp == stamp)
    }

    fn stamp(&self) -> (u64, u64) {
        (self.registry.revision(), self.table.revision())
    }

    fn link(&self, local: usize) -> Option<Link> {
        let stamp = self.stamp();
        let mut cache = self.node.views[slot(self.direction)].borrow_mut();
        if cache.as_ref().map_or(true, |c| c.stamp != stamp) {
            *cache = Some(ViewCache {
                stamp,
                links: self.build_links(),
            });
        }
        cache.as_ref()?.links.get(local).copied()
    }

    fn build_links(&self) -> Vec<Link> {
        let opposite = self.direction.opposite();
        self.node
            .index(self.direction)
            .sockets()
            .iter()
            .map(|&socket| {
                let edge = self.registry.socket(socket).and_then(|s| s.edge);
                let peer = edge
                    .and_then(|id| self.table.edge(id))
                    .filter(|e| e.is_valid())
                    .and_then(|e| e.endpoint(opposite))
                    .and_then(|far| self.registry.socket(far))
                    .map(|far| Peer {
                        socket: far.id,
                        node: far.node,
                        row: far.row,
                    });
                Link { edge, peer }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::memory::{MemoryPort, MemorySource};
    use crate::model::SocketModel;
    use crate::node::NodeId;
    use crate::socket::SocketDirection;
    use crate::value::{Value, ValueType};

    fn model() -> SocketModel<MemorySource> {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::passive("name", Value::String("a".into())));
        source.add_port(a, MemoryPort::output("x", Value::Int(1)));
        source.add_port(a, MemoryPort::output("y", Value::Int(2)));
        let b = source.add_node("B");
        source.add_port(b, MemoryPort::input("in", ValueType::Int));
        SocketModel::new(source)
    }

    #[test]
    fn test_mapping_round_trip() {
        let model = model();
        let view = model.socket_view(NodeId(0), SocketDirection::Source).unwrap();
        assert_eq!(view.len(), 2);
        for local in 0..view.len() {
            let row = view.map_to_source(local).unwrap();
            assert_eq!(view.map_from_source(row), Some(local));
        }
        assert_eq!(view.map_to_source(0).map(|r| r.row), Some(1));
        let passive = view.map_to_source(0).unwrap().sibling(0);
        assert_eq!(view.map_from_source(passive), None);
    }

    #[test]
    fn test_entries_carry_label_and_peer() {
        let mut model = model();
        let y = model.node(NodeId(0)).unwrap().sources().socket_at(1).unwrap();
        let input = model.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();
        let edge = model.connect(y, input).unwrap();

        let view = model.socket_view(NodeId(0), SocketDirection::Source).unwrap();
        let entries = view.entries();
        assert_eq!(entries[0].edge, None);
        assert_eq!(entries[1].label, Some(Value::Int(2)));
        assert_eq!(entries[1].edge, Some(edge));
        let peer = entries[1].peer.unwrap();
        assert_eq!((peer.socket, peer.node, peer.row), (input, NodeId(1), 0));
    }

    #[test]
    fn test_cache_is_rebuilt_after_changes() {
        let mut model = model();
        let x = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();
        let input = model.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();

        {
            let view = model.socket_view(NodeId(1), SocketDirection::Sink).unwrap();
            assert!(!view.is_cached());
            assert_eq!(view.entry(0).unwrap().edge, None);
            assert!(view.is_cached());
        }

        model.connect(x, input).unwrap();
        let view = model.socket_view(NodeId(1), SocketDirection::Sink).unwrap();
        assert!(!view.is_cached());
        let peer = view.entry(0).unwrap().peer.unwrap();
        assert_eq!(peer.socket, x);
    }
}
