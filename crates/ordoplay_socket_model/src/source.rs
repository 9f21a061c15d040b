// SPDX-License-Identifier: MIT OR Apache-2.0
//! Boundary with the hierarchical data source the socket model mirrors.
//!
//! The source is a two level tree: top-level rows become nodes and their
//! children are candidate sockets. The model never owns the data itself, it
//! only reads flags and values and writes propagated values back.

use crate::value::{Role, Value, ValueType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub Uuid);

impl SourceId {
    /// Create a new random source ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Stable identity token of a row.
///
/// Unlike a row position it does not change when siblings are inserted or
/// removed, which makes it usable as a reverse-lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey(pub u64);

/// Position of a row inside a specific source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowIndex {
    /// Source the row belongs to
    pub source: SourceId,
    /// Top-level row of the parent, `None` for node rows
    pub parent: Option<usize>,
    /// Row position under `parent`
    pub row: usize,
}

impl RowIndex {
    /// Index of a top-level (node) row
    pub fn top(source: SourceId, row: usize) -> Self {
        Self {
            source,
            parent: None,
            row,
        }
    }

    /// Index of a child (socket candidate) row
    pub fn child(source: SourceId, parent: usize, row: usize) -> Self {
        Self {
            source,
            parent: Some(parent),
            row,
        }
    }

    /// Whether this is a child row
    pub fn is_child(&self) -> bool {
        self.parent.is_some()
    }

    /// Sibling row under the same parent
    pub fn sibling(&self, row: usize) -> Self {
        Self { row, ..*self }
    }
}

/// Capability flags of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RowFlags {
    /// Row can be selected
    pub selectable: bool,
    /// Row can be the origin of a drag
    pub drag_enabled: bool,
    /// Row accepts drops
    pub drop_enabled: bool,
    /// Row value can be written
    pub editable: bool,
    /// Row is enabled
    pub enabled: bool,
}

impl RowFlags {
    /// Flags of a row that only produces values
    pub fn output() -> Self {
        Self {
            selectable: true,
            drag_enabled: true,
            drop_enabled: false,
            editable: false,
            enabled: true,
        }
    }

    /// Flags of a row that only receives values
    pub fn input() -> Self {
        Self {
            selectable: true,
            drag_enabled: false,
            drop_enabled: true,
            editable: true,
            enabled: true,
        }
    }

    /// Flags of a row that both produces and receives values
    pub fn bidirectional() -> Self {
        Self {
            selectable: true,
            drag_enabled: true,
            drop_enabled: true,
            editable: true,
            enabled: true,
        }
    }

    /// Flags of a plain row that is never a socket
    pub fn passive() -> Self {
        Self {
            selectable: true,
            enabled: true,
            ..Self::default()
        }
    }

    /// Whether the row qualifies as a source socket
    pub fn is_source_candidate(&self) -> bool {
        self.drag_enabled && self.selectable
    }

    /// Whether the row qualifies as a sink socket
    pub fn is_sink_candidate(&self) -> bool {
        self.drop_enabled && self.selectable && self.editable
    }

    /// Classify the row once into the socket kinds it provides
    pub fn classify(&self) -> SocketClass {
        match (self.is_source_candidate(), self.is_sink_candidate()) {
            (true, true) => SocketClass::Both,
            (true, false) => SocketClass::Source,
            (false, true) => SocketClass::Sink,
            (false, false) => SocketClass::Neither,
        }
    }
}

/// Socket kinds a child row provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketClass {
    /// Output only
    Source,
    /// Input only
    Sink,
    /// Both an output and an input
    Both,
    /// Not a socket
    Neither,
}

impl SocketClass {
    /// Whether a source socket is created for the row
    pub fn has_source(self) -> bool {
        matches!(self, Self::Source | Self::Both)
    }

    /// Whether a sink socket is created for the row
    pub fn has_sink(self) -> bool {
        matches!(self, Self::Sink | Self::Both)
    }
}

/// Change notification emitted by a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceNotification {
    /// Rows `first..=last` were inserted under `parent`
    RowsInserted {
        /// Parent top-level row, `None` for node rows
        parent: Option<usize>,
        /// First inserted row
        first: usize,
        /// Last inserted row
        last: usize,
    },
    /// Rows `first..=last` were removed from under `parent`
    RowsRemoved {
        /// Parent top-level row, `None` for node rows
        parent: Option<usize>,
        /// First removed row
        first: usize,
        /// Last removed row
        last: usize,
    },
    /// Values of rows `first..=last` (same parent) changed
    ValueChanged {
        /// Parent top-level row, `None` for node rows
        parent: Option<usize>,
        /// First changed row
        first: usize,
        /// Last changed row
        last: usize,
    },
}

/// Externally owned tree of rows mirrored by the socket model
pub trait HierarchicalSource {
    /// Identity of this source, carried by every [`RowIndex`] it hands out
    fn id(&self) -> SourceId;

    /// Number of rows under `parent` (`None` for top-level rows)
    fn row_count(&self, parent: Option<usize>) -> usize;

    /// Capability flags of a row
    fn flags(&self, row: RowIndex) -> RowFlags;

    /// Read the value of a row for a role
    fn read(&self, row: RowIndex, role: Role) -> Option<Value>;

    /// Write a value to a row, returning whether the write was accepted
    fn write(&mut self, row: RowIndex, value: Value, role: Role) -> bool;

    /// Declared type of the row's value
    fn value_type(&self, row: RowIndex) -> Option<ValueType> {
        self.read(row, Role::Edit).map(|v| v.value_type())
    }

    /// Stable identity token of a row, if the source provides one
    fn row_key(&self, _row: RowIndex) -> Option<RowKey> {
        None
    }

    /// Drain notifications queued since the last call
    fn take_notifications(&mut self) -> Vec<SourceNotification> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(RowFlags::output().classify(), SocketClass::Source);
        assert_eq!(RowFlags::input().classify(), SocketClass::Sink);
        assert_eq!(RowFlags::bidirectional().classify(), SocketClass::Both);
        assert_eq!(RowFlags::passive().classify(), SocketClass::Neither);
    }

    #[test]
    fn test_sink_requires_editable() {
        let flags = RowFlags {
            editable: false,
            ..RowFlags::input()
        };
        assert_eq!(flags.classify(), SocketClass::Neither);
    }

    #[test]
    fn test_unselectable_rows_are_never_sockets() {
        let flags = RowFlags {
            selectable: false,
            ..RowFlags::bidirectional()
        };
        assert_eq!(flags.classify(), SocketClass::Neither);
    }
}
