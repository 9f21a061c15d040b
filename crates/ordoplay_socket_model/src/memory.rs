// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory hierarchical source.
//!
//! Stores nodes and their ports directly and queues a notification for every
//! structural or value change, the same way an item model would signal its
//! views. Used by the demo binary and the tests.

use crate::source::{HierarchicalSource, RowFlags, RowIndex, RowKey, SourceId, SourceNotification};
use crate::value::{Role, Value, ValueType};

/// A port row
#[derive(Debug, Clone)]
pub struct MemoryPort {
    /// Port name
    pub name: String,
    /// Capability flags
    pub flags: RowFlags,
    /// Declared value type
    pub declared: ValueType,
    /// Current value, if any has been set
    pub value: Option<Value>,
    key: RowKey,
}

impl MemoryPort {
    /// Create a port with explicit flags
    pub fn new(name: impl Into<String>, flags: RowFlags, declared: ValueType, value: Option<Value>) -> Self {
        Self {
            name: name.into(),
            flags,
            declared,
            value,
            key: RowKey(0),
        }
    }

    /// Create an output port holding `value`
    pub fn output(name: impl Into<String>, value: Value) -> Self {
        let declared = value.value_type();
        Self::new(name, RowFlags::output(), declared, Some(value))
    }

    /// Create an empty input port of type `declared`
    pub fn input(name: impl Into<String>, declared: ValueType) -> Self {
        Self::new(name, RowFlags::input(), declared, None)
    }

    /// Create a port that is both an input and an output
    pub fn bidirectional(name: impl Into<String>, value: Value) -> Self {
        let declared = value.value_type();
        Self::new(name, RowFlags::bidirectional(), declared, Some(value))
    }

    /// Create a row that is not a socket
    pub fn passive(name: impl Into<String>, value: Value) -> Self {
        let declared = value.value_type();
        Self::new(name, RowFlags::passive(), declared, Some(value))
    }

    /// Mark the row as disabled
    pub fn disabled(mut self) -> Self {
        self.flags.enabled = false;
        self
    }
}

#[derive(Debug, Clone)]
struct MemoryNode {
    title: String,
    key: RowKey,
    ports: Vec<MemoryPort>,
}

/// Hierarchical source backed by plain vectors
#[derive(Debug)]
pub struct MemorySource {
    id: SourceId,
    nodes: Vec<MemoryNode>,
    next_key: u64,
    pending: Vec<SourceNotification>,
    writes: usize,
}

impl MemorySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self {
            id: SourceId::new(),
            nodes: Vec::new(),
            next_key: 1,
            pending: Vec::new(),
            writes: 0,
        }
    }

    fn allocate_key(&mut self) -> RowKey {
        let key = RowKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Append a node row, returning its position
    pub fn add_node(&mut self, title: impl Into<String>) -> usize {
        self.insert_node(self.nodes.len(), title)
    }

    /// Insert a node row at `position`
    pub fn insert_node(&mut self, position: usize, title: impl Into<String>) -> usize {
        let position = position.min(self.nodes.len());
        let key = self.allocate_key();
        self.nodes.insert(
            position,
            MemoryNode {
                title: title.into(),
                key,
                ports: Vec::new(),
            },
        );
        self.pending.push(SourceNotification::RowsInserted {
            parent: None,
            first: position,
            last: position,
        });
        position
    }

    /// Remove a node row and its ports
    pub fn remove_node(&mut self, position: usize) -> bool {
        if position >= self.nodes.len() {
            return false;
        }
        self.nodes.remove(position);
        self.pending.push(SourceNotification::RowsRemoved {
            parent: None,
            first: position,
            last: position,
        });
        true
    }

    /// Append a port to a node, returning its row
    pub fn add_port(&mut self, node: usize, port: MemoryPort) -> usize {
        let row = self.nodes.get(node).map_or(0, |n| n.ports.len());
        self.insert_port(node, row, port)
    }

    /// Insert a port at `row` under a node
    pub fn insert_port(&mut self, node: usize, row: usize, mut port: MemoryPort) -> usize {
        port.key = self.allocate_key();
        let Some(entry) = self.nodes.get_mut(node) else {
            return 0;
        };
        let row = row.min(entry.ports.len());
        entry.ports.insert(row, port);
        self.pending.push(SourceNotification::RowsInserted {
            parent: Some(node),
            first: row,
            last: row,
        });
        row
    }

    /// Remove ports `first..=last` from a node
    pub fn remove_ports(&mut self, node: usize, first: usize, last: usize) -> bool {
        let Some(entry) = self.nodes.get_mut(node) else {
            return false;
        };
        if last < first || last >= entry.ports.len() {
            return false;
        }
        entry.ports.drain(first..=last);
        self.pending.push(SourceNotification::RowsRemoved {
            parent: Some(node),
            first,
            last,
        });
        true
    }

    /// Set a port value as an editor would, queueing a change notification
    pub fn set_value(&mut self, node: usize, row: usize, value: Value) -> bool {
        let Some(port) = self.port_mut(node, row) else {
            return false;
        };
        if port.value.as_ref() == Some(&value) {
            return true;
        }
        port.value = Some(value);
        self.pending.push(SourceNotification::ValueChanged {
            parent: Some(node),
            first: row,
            last: row,
        });
        true
    }

    /// Queue a change notification for a range of ports without touching them
    pub fn touch(&mut self, node: usize, first: usize, last: usize) {
        self.pending.push(SourceNotification::ValueChanged {
            parent: Some(node),
            first,
            last,
        });
    }

    /// Current value of a port
    pub fn value(&self, node: usize, row: usize) -> Option<&Value> {
        self.port(node, row)?.value.as_ref()
    }

    /// Port at a row
    pub fn port(&self, node: usize, row: usize) -> Option<&MemoryPort> {
        self.nodes.get(node)?.ports.get(row)
    }

    fn port_mut(&mut self, node: usize, row: usize) -> Option<&mut MemoryPort> {
        self.nodes.get_mut(node)?.ports.get_mut(row)
    }

    /// Number of accepted writes made through [`HierarchicalSource::write`]
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Notifications queued and not yet drained
    pub fn pending(&self) -> &[SourceNotification] {
        &self.pending
    }

    fn resolve(&self, row: RowIndex) -> Option<Resolved<'_>> {
        if row.source != self.id {
            return None;
        }
        match row.parent {
            None => self.nodes.get(row.row).map(Resolved::Node),
            Some(parent) => self.port(parent, row.row).map(Resolved::Port),
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

enum Resolved<'a> {
    Node(&'a MemoryNode),
    Port(&'a MemoryPort),
}

impl HierarchicalSource for MemorySource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn row_count(&self, parent: Option<usize>) -> usize {
        match parent {
            None => self.nodes.len(),
            Some(node) => self.nodes.get(node).map_or(0, |n| n.ports.len()),
        }
    }

    fn flags(&self, row: RowIndex) -> RowFlags {
        match self.resolve(row) {
            Some(Resolved::Port(port)) => port.flags,
            Some(Resolved::Node(_)) => RowFlags::passive(),
            None => RowFlags::default(),
        }
    }

    fn read(&self, row: RowIndex, role: Role) -> Option<Value> {
        match (self.resolve(row)?, role) {
            (Resolved::Node(node), Role::Display | Role::Edit) => Some(Value::String(node.title.clone())),
            (Resolved::Port(port), Role::Display | Role::Edit | Role::Value) => port.value.clone(),
            _ => None,
        }
    }

    fn write(&mut self, row: RowIndex, value: Value, role: Role) -> bool {
        if row.source != self.id || matches!(role, Role::Custom(_)) {
            return false;
        }
        let Some(parent) = row.parent else {
            let Some(node) = self.nodes.get_mut(row.row) else {
                return false;
            };
            node.title = value.to_string();
            self.writes += 1;
            self.pending.push(SourceNotification::ValueChanged {
                parent: None,
                first: row.row,
                last: row.row,
            });
            return true;
        };

        let Some(port) = self.port_mut(parent, row.row) else {
            return false;
        };
        if !port.flags.editable {
            return false;
        }
        let Some(value) = value.convert_to(&port.declared) else {
            return false;
        };
        let changed = port.value.as_ref() != Some(&value);
        port.value = Some(value);
        self.writes += 1;
        if changed {
            self.pending.push(SourceNotification::ValueChanged {
                parent: Some(parent),
                first: row.row,
                last: row.row,
            });
        }
        true
    }

    fn value_type(&self, row: RowIndex) -> Option<ValueType> {
        match self.resolve(row)? {
            Resolved::Port(port) => Some(port.declared.clone()),
            Resolved::Node(_) => None,
        }
    }

    fn row_key(&self, row: RowIndex) -> Option<RowKey> {
        match self.resolve(row)? {
            Resolved::Port(port) => Some(port.key),
            Resolved::Node(node) => Some(node.key),
        }
    }

    fn take_notifications(&mut self) -> Vec<SourceNotification> {
        std::mem::take(&mut self.pending)
    }
}
