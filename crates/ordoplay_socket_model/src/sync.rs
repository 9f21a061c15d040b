// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value propagation along valid edges.

use crate::config::GraphConfig;
use crate::edge::{Edge, EdgeId, EdgeTable, RowEdges};
use crate::node::NodeRegistry;
use crate::socket::SocketDirection;
use crate::source::{HierarchicalSource, RowIndex};
use crate::value::{Role, Value};
use indexmap::IndexSet;

const FALLBACK_ROLES: [Role; 1] = [Role::Display];

/// Pushes source socket values into sink sockets
#[derive(Debug, Clone)]
pub struct ConnectionSynchronizer {
    roles: Vec<Role>,
    range_scan_threshold: usize,
}

impl ConnectionSynchronizer {
    /// Create a synchronizer; an empty role list propagates `Role::Display`
    pub fn new(roles: Vec<Role>, range_scan_threshold: usize) -> Self {
        Self {
            roles,
            range_scan_threshold,
        }
    }

    /// Create a synchronizer from configuration
    pub fn from_config(config: &GraphConfig) -> Self {
        Self::new(config.connected_roles.clone(), config.range_scan_threshold)
    }

    /// Roles propagated along edges
    pub fn roles(&self) -> &[Role] {
        if self.roles.is_empty() {
            &FALLBACK_ROLES
        } else {
            &self.roles
        }
    }

    /// Range size above which edges are scanned instead of rows
    pub fn range_scan_threshold(&self) -> usize {
        self.range_scan_threshold
    }

    /// Copy the source value of a valid edge into its sink for every role.
    ///
    /// A role is written only when the value read differs from the last value
    /// propagated along this edge. Returns the number of accepted writes.
    pub fn sync_edge<S: HierarchicalSource>(&self, source: &mut S, registry: &NodeRegistry, edge: &mut Edge) -> usize {
        let (Some(from), Some(to)) = (edge.source, edge.sink) else {
            return 0;
        };
        let (Some(from_row), Some(to_row)) = (registry.socket_row(from), registry.socket_row(to)) else {
            tracing::error!("Edge {:?} references a socket missing from the registry", edge.id);
            return 0;
        };

        let mut written = 0;
        for &role in self.roles() {
            let Some(value) = source.read(from_row, role) else {
                tracing::trace!("Edge {:?}: nothing to read for {:?}", edge.id, role);
                continue;
            };
            if edge.last_propagated.get(&role) == Some(&value) {
                continue;
            }
            if write_value(source, to_row, &value, role) {
                tracing::trace!("Edge {:?}: propagated {} for {:?}", edge.id, value, role);
                edge.last_propagated.insert(role, value);
                written += 1;
            } else {
                tracing::debug!("Edge {:?}: sink refused {} for {:?}", edge.id, value, role);
            }
        }
        written
    }

    /// Re-synchronize edges touching child rows `first..=last` of a node.
    ///
    /// Returns the number of accepted writes.
    pub fn sync_rows<S: HierarchicalSource>(
        &self,
        source: &mut S,
        registry: &NodeRegistry,
        table: &mut EdgeTable,
        parent: usize,
        first: usize,
        last: usize,
    ) -> usize {
        if last < first {
            return 0;
        }
        let count = last + 1 - first;
        let mut affected: IndexSet<EdgeId> = IndexSet::new();

        if count > self.range_scan_threshold && count > table.edge_count() {
            for (_, edge) in table.iter() {
                let touches = [edge.source, edge.sink].into_iter().flatten().any(|socket| {
                    registry
                        .socket_row(socket)
                        .is_some_and(|row| row.parent == Some(parent) && (first..=last).contains(&row.row))
                });
                if touches {
                    affected.insert(edge.id);
                }
            }
        } else {
            let source_id = registry.source_id();
            for row in first..=last {
                let index = RowIndex::child(source_id, parent, row);
                affected.extend(edges_for_row(&*source, registry, table, index).edges());
            }
        }

        let mut written = 0;
        for id in affected {
            if let Some(edge) = table.edge_mut(id) {
                written += self.sync_edge(source, registry, edge);
            }
        }
        written
    }
}

impl Default for ConnectionSynchronizer {
    fn default() -> Self {
        Self::from_config(&GraphConfig::default())
    }
}

/// Find the edges using a row as their source or sink.
///
/// Rows with an identity token go through the reverse map, other rows fall
/// back to scanning the edge table.
pub fn edges_for_row<S: HierarchicalSource>(
    source: &S,
    registry: &NodeRegistry,
    table: &EdgeTable,
    row: RowIndex,
) -> RowEdges {
    if let Some(key) = source.row_key(row) {
        return table.direct_lookup(key);
    }

    let mut found = RowEdges::default();
    for (_, edge) in table.iter() {
        for direction in [SocketDirection::Source, SocketDirection::Sink] {
            let Some(socket) = edge.endpoint(direction) else {
                continue;
            };
            if registry.socket_row(socket) == Some(row) {
                match direction {
                    SocketDirection::Source => found.as_source = Some(edge.id),
                    SocketDirection::Sink => found.as_sink = Some(edge.id),
                }
            }
        }
    }
    found
}

/// Write a value into a row the way a drop would: converted to the row's
/// declared type, and not written at all if the conversion fails.
pub fn write_value<S: HierarchicalSource>(source: &mut S, row: RowIndex, value: &Value, role: Role) -> bool {
    let converted = match source.value_type(row) {
        Some(declared) => match value.convert_to(&declared) {
            Some(converted) => converted,
            None => return false,
        },
        None => value.clone(),
    };
    source.write(row, converted, role)
}
