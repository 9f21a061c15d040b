// SPDX-License-Identifier: MIT OR Apache-2.0
//! Socket and connection model for `OrdoPlay` node graphs.
//!
//! This crate mirrors an externally owned two-level tree of rows into a node
//! graph:
//! - Top-level rows become nodes
//! - Child rows become source (output) and/or sink (input) sockets
//! - Edges connect one source to one sink and carry values between them
//!
//! ## Architecture
//!
//! [`SocketModel`] owns the [`HierarchicalSource`] and keeps three views of
//! the same data consistent: source rows, per-node socket positions and the
//! flat edge table. Value changes propagate along valid edges, and new edges
//! can be created interactively through the drag protocol.

pub mod config;
pub mod drag;
pub mod edge;
pub mod filter;
pub mod memory;
pub mod model;
pub mod node;
mod replay;
pub mod socket;
pub mod source;
pub mod sync;
pub mod value;

pub use config::{ConfigError, GraphConfig};
pub use drag::{DragError, DragMode, DragOutcome, DragSession};
pub use edge::{Edge, EdgeId, EdgeTable};
pub use filter::{SocketEntry, SocketFilterView};
pub use memory::{MemoryPort, MemorySource};
pub use model::{ConnectionError, EdgeInfo, Endpoint, GraphEvent, InvariantError, SocketModel};
pub use node::{GraphNode, NodeId, NodeRegistry};
pub use socket::{Socket, SocketDirection, SocketId};
pub use source::{HierarchicalSource, RowFlags, RowIndex, RowKey, SourceId, SourceNotification};
pub use sync::ConnectionSynchronizer;
pub use value::{Role, Value, ValueType};
