// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph nodes mirroring the top-level rows of the source.

use crate::filter::ViewCache;
use crate::model::InvariantError;
use crate::socket::{Socket, SocketDirection, SocketId, SocketIndex};
use crate::source::{HierarchicalSource, RowIndex, SourceId};
use crate::value::{Role, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Identifier of a node: the position of its top-level row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// A node in the graph
#[derive(Debug)]
pub struct GraphNode {
    /// Node ID (top-level row position)
    pub id: NodeId,
    /// Cached display title of the node row
    pub title: String,
    /// Number of child rows accounted for by the indexer
    pub(crate) child_rows: usize,
    sources: SocketIndex,
    sinks: SocketIndex,
    pub(crate) views: [RefCell<Option<ViewCache>>; 2],
}

impl GraphNode {
    fn new(id: NodeId, title: String) -> Self {
        Self {
            id,
            title,
            child_rows: 0,
            sources: SocketIndex::new(),
            sinks: SocketIndex::new(),
            views: [RefCell::new(None), RefCell::new(None)],
        }
    }

    /// Source sockets index
    pub fn sources(&self) -> &SocketIndex {
        &self.sources
    }

    /// Sink sockets index
    pub fn sinks(&self) -> &SocketIndex {
        &self.sinks
    }

    /// Index for a direction
    pub fn index(&self, direction: SocketDirection) -> &SocketIndex {
        match direction {
            SocketDirection::Source => &self.sources,
            SocketDirection::Sink => &self.sinks,
        }
    }

    fn index_mut(&mut self, direction: SocketDirection) -> &mut SocketIndex {
        match direction {
            SocketDirection::Source => &mut self.sources,
            SocketDirection::Sink => &mut self.sinks,
        }
    }

    /// All sockets of the node, sources first
    pub fn sockets(&self) -> impl Iterator<Item = SocketId> + '_ {
        self.sources
            .sockets()
            .iter()
            .chain(self.sinks.sockets())
            .copied()
    }
}

/// Ordered collection of nodes and owner of every socket
#[derive(Debug)]
pub struct NodeRegistry {
    source: SourceId,
    nodes: Vec<GraphNode>,
    sockets: IndexMap<SocketId, Socket>,
    next_socket: u64,
    revision: u64,
}

impl NodeRegistry {
    /// Create an empty registry for a source
    pub fn new(source: SourceId) -> Self {
        Self {
            source,
            nodes: Vec::new(),
            sockets: IndexMap::new(),
            next_socket: 1,
            revision: 0,
        }
    }

    /// Source mirrored by this registry
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    /// Counter bumped on every structural change
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Get the number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the registry has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get all nodes in row order
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Get a node by ID
    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.0)
    }

    /// Get the node for a row.
    ///
    /// With `recursive`, a child row resolves to its parent's node. Rows of
    /// another source resolve to nothing.
    pub fn lookup(&self, row: RowIndex, recursive: bool) -> Option<&GraphNode> {
        if row.source != self.source {
            return None;
        }
        match row.parent {
            None => self.nodes.get(row.row),
            Some(parent) if recursive => self.nodes.get(parent),
            Some(_) => None,
        }
    }

    /// Get a socket by ID
    pub fn socket(&self, id: SocketId) -> Option<&Socket> {
        self.sockets.get(&id)
    }

    pub(crate) fn socket_mut(&mut self, id: SocketId) -> Option<&mut Socket> {
        self.sockets.get_mut(&id)
    }

    /// Get all sockets
    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.sockets.values()
    }

    /// Socket of `direction` backed by a child row
    pub fn socket_at(&self, row: RowIndex, direction: SocketDirection) -> Option<SocketId> {
        if row.source != self.source {
            return None;
        }
        let node = self.nodes.get(row.parent?)?;
        node.index(direction).socket_for_row(row.row)
    }

    /// Source socket backed by a child row
    pub fn source_socket_at(&self, row: RowIndex) -> Option<SocketId> {
        self.socket_at(row, SocketDirection::Source)
    }

    /// Sink socket backed by a child row
    pub fn sink_socket_at(&self, row: RowIndex) -> Option<SocketId> {
        self.socket_at(row, SocketDirection::Sink)
    }

    /// Row backing a socket
    pub fn socket_row(&self, id: SocketId) -> Option<RowIndex> {
        let socket = self.sockets.get(&id)?;
        Some(RowIndex::child(self.source, socket.node.0, socket.row))
    }

    /// Number of source sockets of a node
    pub fn source_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.sources.len())
    }

    /// Number of sink sockets of a node
    pub fn sink_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.sinks.len())
    }

    /// Create a node for the top-level row at `position` and index its
    /// existing children.
    pub fn insert<S: HierarchicalSource>(&mut self, source: &S, position: usize) -> NodeId {
        let position = position.min(self.nodes.len());
        let origin = self.source;
        let children = source.row_count(Some(position));
        self.insert_located(
            source,
            position,
            Some(RowIndex::top(origin, position)),
            children,
            |row| Some(RowIndex::child(origin, position, row)),
        )
    }

    /// Create a node with `children` child rows, reading each row from where
    /// `locate` says it lives in the source. Rows without a location are
    /// counted but get no sockets.
    pub(crate) fn insert_located<S: HierarchicalSource>(
        &mut self,
        source: &S,
        position: usize,
        row: Option<RowIndex>,
        children: usize,
        locate: impl Fn(usize) -> Option<RowIndex>,
    ) -> NodeId {
        let position = position.min(self.nodes.len());
        let id = NodeId(position);
        let title = row.map(|row| read_title(source, row)).unwrap_or_default();

        self.nodes.insert(position, GraphNode::new(id, title));
        self.renumber(position + 1);
        self.revision += 1;

        if children > 0 {
            self.insert_sockets_located(source, id, 0, children - 1, locate);
        }

        tracing::debug!(
            "Inserted node {} with {} sources and {} sinks",
            position,
            self.source_count(id),
            self.sink_count(id)
        );
        id
    }

    /// Index child rows `first..=last` newly inserted under a node.
    ///
    /// Returns the number of sockets created.
    pub fn insert_sockets<S: HierarchicalSource>(
        &mut self,
        source: &S,
        node_id: NodeId,
        first: usize,
        last: usize,
    ) -> usize {
        let origin = self.source;
        self.insert_sockets_located(source, node_id, first, last, |row| {
            Some(RowIndex::child(origin, node_id.0, row))
        })
    }

    pub(crate) fn insert_sockets_located<S: HierarchicalSource>(
        &mut self,
        source: &S,
        node_id: NodeId,
        first: usize,
        last: usize,
        locate: impl Fn(usize) -> Option<RowIndex>,
    ) -> usize {
        if last < first || node_id.0 >= self.nodes.len() {
            return 0;
        }
        let count = last + 1 - first;

        {
            let node = &mut self.nodes[node_id.0];
            node.sources.shift_for_insert(first, count);
            node.sinks.shift_for_insert(first, count);
            node.child_rows += count;
        }
        self.sync_socket_rows(node_id);
        self.revision += 1;

        let mut created = 0;
        for row in first..=last {
            let Some(index) = locate(row) else {
                tracing::trace!("Child row {} of node {} is gone, no sockets", row, node_id.0);
                continue;
            };
            let class = source.flags(index).classify();
            let key = source.row_key(index);

            for direction in [SocketDirection::Source, SocketDirection::Sink] {
                let wanted = match direction {
                    SocketDirection::Source => class.has_source(),
                    SocketDirection::Sink => class.has_sink(),
                };
                if !wanted {
                    continue;
                }
                let id = SocketId(self.next_socket);
                self.next_socket += 1;
                self.sockets.insert(
                    id,
                    Socket {
                        id,
                        direction,
                        node: node_id,
                        row,
                        key,
                        edge: None,
                    },
                );
                self.nodes[node_id.0].index_mut(direction).push(row, id);
                created += 1;
            }
        }

        debug_assert!(self.nodes[node_id.0].sources.is_consistent());
        debug_assert!(self.nodes[node_id.0].sinks.is_consistent());
        created
    }

    /// Sockets of a node backed by child rows `first..=last`
    pub fn sockets_in_rows(&self, node_id: NodeId, first: usize, last: usize) -> Vec<SocketId> {
        let Some(node) = self.node(node_id) else {
            return Vec::new();
        };
        node.sockets()
            .filter(|id| {
                self.sockets
                    .get(id)
                    .is_some_and(|s| (first..=last).contains(&s.row))
            })
            .collect()
    }

    /// Drop the sockets backed by child rows `first..=last` of a node.
    ///
    /// Edges must already be detached from the removed sockets.
    pub fn remove_sockets(&mut self, node_id: NodeId, first: usize, last: usize) -> Vec<Socket> {
        if last < first || node_id.0 >= self.nodes.len() {
            return Vec::new();
        }
        let removed_ids = {
            let node = &mut self.nodes[node_id.0];
            node.child_rows = node.child_rows.saturating_sub(last + 1 - first);
            let mut ids = node.sources.remove_rows(first, last);
            ids.extend(node.sinks.remove_rows(first, last));
            ids
        };
        self.sync_socket_rows(node_id);
        self.revision += 1;

        removed_ids
            .into_iter()
            .filter_map(|id| self.sockets.shift_remove(&id))
            .collect()
    }

    /// Drop the nodes for top-level rows `first..=last` along with their sockets.
    ///
    /// Edges must already be detached from the removed sockets.
    pub fn remove(&mut self, first: usize, last: usize) -> Vec<GraphNode> {
        if last < first || first >= self.nodes.len() {
            return Vec::new();
        }
        let last = last.min(self.nodes.len() - 1);
        let removed: Vec<GraphNode> = self.nodes.drain(first..=last).collect();
        for node in &removed {
            for id in node.sockets() {
                self.sockets.shift_remove(&id);
            }
        }
        self.renumber(first);
        self.revision += 1;
        tracing::debug!("Removed nodes {}..={}", first, last);
        removed
    }

    /// Re-read the title of a node row
    pub fn refresh_title<S: HierarchicalSource>(&mut self, source: &S, node_id: NodeId) {
        let row = RowIndex::top(self.source, node_id.0);
        if let Some(node) = self.nodes.get_mut(node_id.0) {
            node.title = read_title(source, row);
        }
    }

    fn renumber(&mut self, from: usize) {
        for position in from..self.nodes.len() {
            let id = NodeId(position);
            self.nodes[position].id = id;
            let owned: Vec<SocketId> = self.nodes[position].sockets().collect();
            for socket in owned {
                if let Some(s) = self.sockets.get_mut(&socket) {
                    s.node = id;
                }
            }
        }
    }

    fn sync_socket_rows(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get(node_id.0) else {
            return;
        };
        for index in [&node.sources, &node.sinks] {
            for (&socket, &row) in index.sockets().iter().zip(index.rows()) {
                if let Some(s) = self.sockets.get_mut(&socket) {
                    s.row = row;
                }
            }
        }
    }

    /// Verify the per-node indexes and socket arena agree
    pub fn check(&self) -> Result<(), InvariantError> {
        let mut owned = 0;
        for node in &self.nodes {
            for direction in [SocketDirection::Source, SocketDirection::Sink] {
                let index = node.index(direction);
                if !index.is_consistent() {
                    return Err(InvariantError::IndexMismatch(node.id));
                }
                for (&id, &row) in index.sockets().iter().zip(index.rows()) {
                    let socket = self
                        .sockets
                        .get(&id)
                        .ok_or(InvariantError::MissingSocket(id))?;
                    if socket.node != node.id || socket.row != row || socket.direction != direction {
                        return Err(InvariantError::SocketMismatch(id));
                    }
                    owned += 1;
                }
            }
        }
        if owned != self.sockets.len() {
            return Err(InvariantError::OrphanSockets {
                stored: self.sockets.len(),
                owned,
            });
        }
        Ok(())
    }
}

fn read_title<S: HierarchicalSource>(source: &S, row: RowIndex) -> String {
    match source.read(row, Role::Display) {
        Some(Value::String(title)) => title,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}
