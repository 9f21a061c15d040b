// SPDX-License-Identifier: MIT OR Apache-2.0
//! Sockets and the per-node index between child rows and socket positions.

use crate::edge::EdgeId;
use crate::node::NodeId;
use crate::source::RowKey;
use serde::{Deserialize, Serialize};

/// Unique identifier for a socket, stable for the socket's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SocketId(pub u64);

/// Socket direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SocketDirection {
    /// Output port, the origin of a connection
    Source,
    /// Input port, the receiving end of a connection
    Sink,
}

impl SocketDirection {
    /// The other direction
    pub fn opposite(self) -> Self {
        match self {
            Self::Source => Self::Sink,
            Self::Sink => Self::Source,
        }
    }
}

/// A socket on a node
#[derive(Debug, Clone)]
pub struct Socket {
    /// Unique socket ID
    pub id: SocketId,
    /// Socket direction
    pub direction: SocketDirection,
    /// Owning node
    pub node: NodeId,
    /// Child row backing this socket
    pub row: usize,
    /// Identity token of the backing row
    pub key: Option<RowKey>,
    /// Edge currently using this socket as an endpoint (lookup only)
    pub edge: Option<EdgeId>,
}

impl Socket {
    /// Whether an edge uses this socket
    pub fn is_connected(&self) -> bool {
        self.edge.is_some()
    }
}

/// Index between a node's child rows and its local socket positions for one
/// direction.
///
/// `forward[row]` holds the local position plus one (zero for rows that are
/// not sockets of this direction), `backward[local]` holds the child row.
#[derive(Debug, Clone, Default)]
pub struct SocketIndex {
    forward: Vec<usize>,
    backward: Vec<usize>,
    sockets: Vec<SocketId>,
}

impl SocketIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sockets
    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    /// Whether there are no sockets
    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }

    /// Append a socket backed by `row`, returning its local position
    pub fn push(&mut self, row: usize, socket: SocketId) -> usize {
        if self.forward.len() <= row {
            self.forward.resize(row + 1, 0);
        }
        self.sockets.push(socket);
        self.backward.push(row);
        self.forward[row] = self.sockets.len();
        self.sockets.len() - 1
    }

    /// Local position of the socket backed by `row`
    pub fn local_for_row(&self, row: usize) -> Option<usize> {
        match self.forward.get(row) {
            Some(&slot) if slot > 0 => Some(slot - 1),
            _ => None,
        }
    }

    /// Child row backing the socket at `local`
    pub fn row_for_local(&self, local: usize) -> Option<usize> {
        self.backward.get(local).copied()
    }

    /// Socket at a local position
    pub fn socket_at(&self, local: usize) -> Option<SocketId> {
        self.sockets.get(local).copied()
    }

    /// Socket backed by `row`
    pub fn socket_for_row(&self, row: usize) -> Option<SocketId> {
        self.local_for_row(row).and_then(|local| self.socket_at(local))
    }

    /// Sockets in local order
    pub fn sockets(&self) -> &[SocketId] {
        &self.sockets
    }

    /// Child rows in local order
    pub fn rows(&self) -> &[usize] {
        &self.backward
    }

    /// Make room for `count` rows inserted at `first`
    pub fn shift_for_insert(&mut self, first: usize, count: usize) {
        if count == 0 {
            return;
        }
        for row in &mut self.backward {
            if *row >= first {
                *row += count;
            }
        }
        self.rebuild_forward();
    }

    /// Drop the sockets backed by rows `first..=last` and close the gap.
    ///
    /// Returns the removed sockets.
    pub fn remove_rows(&mut self, first: usize, last: usize) -> Vec<SocketId> {
        let count = last + 1 - first;
        let mut removed = Vec::new();
        let mut kept_rows = Vec::with_capacity(self.backward.len());
        let mut kept_sockets = Vec::with_capacity(self.sockets.len());

        for (&row, &socket) in self.backward.iter().zip(&self.sockets) {
            if (first..=last).contains(&row) {
                removed.push(socket);
            } else if row > last {
                kept_rows.push(row - count);
                kept_sockets.push(socket);
            } else {
                kept_rows.push(row);
                kept_sockets.push(socket);
            }
        }

        self.backward = kept_rows;
        self.sockets = kept_sockets;
        self.rebuild_forward();
        removed
    }

    fn rebuild_forward(&mut self) {
        let len = self.backward.iter().max().map_or(0, |max| max + 1);
        self.forward.clear();
        self.forward.resize(len, 0);
        for (local, &row) in self.backward.iter().enumerate() {
            self.forward[row] = local + 1;
        }
    }

    /// Check that both arrays describe the same mapping
    pub fn is_consistent(&self) -> bool {
        if self.backward.len() != self.sockets.len() {
            return false;
        }
        let round_trip = self
            .backward
            .iter()
            .enumerate()
            .all(|(local, &row)| self.local_for_row(row) == Some(local));
        let no_dangling = self
            .forward
            .iter()
            .all(|&slot| slot == 0 || slot <= self.sockets.len());
        round_trip && no_dangling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(rows: &[usize]) -> SocketIndex {
        let mut index = SocketIndex::new();
        for (i, &row) in rows.iter().enumerate() {
            index.push(row, SocketId(i as u64));
        }
        index
    }

    #[test]
    fn test_push_resizes_before_writing() {
        let index = index_with(&[4, 1]);
        assert_eq!(index.local_for_row(4), Some(0));
        assert_eq!(index.local_for_row(1), Some(1));
        assert_eq!(index.local_for_row(0), None);
        assert_eq!(index.local_for_row(99), None);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_insert_shifts_rows() {
        let mut index = index_with(&[0, 2]);
        index.shift_for_insert(1, 3);
        assert_eq!(index.rows(), &[0, 5]);
        assert_eq!(index.socket_for_row(5), Some(SocketId(1)));
        assert_eq!(index.socket_for_row(2), None);
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_rows_closes_gap() {
        let mut index = index_with(&[0, 1, 2, 3]);
        let removed = index.remove_rows(1, 2);
        assert_eq!(removed, vec![SocketId(1), SocketId(2)]);
        assert_eq!(index.rows(), &[0, 1]);
        assert_eq!(index.socket_for_row(1), Some(SocketId(3)));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_opposite_direction() {
        assert_eq!(SocketDirection::Source.opposite(), SocketDirection::Sink);
        assert_eq!(SocketDirection::Sink.opposite(), SocketDirection::Source);
    }
}
