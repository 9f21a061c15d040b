// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drag-to-connect protocol.
//!
//! A drag starts on an anchor socket, fixes that end of an edge and looks for
//! a compatible socket of the opposite direction to complete it. Dropping on
//! anything else, or cancelling, clears the edge.

use crate::edge::EdgeId;
use crate::model::SocketModel;
use crate::socket::{SocketDirection, SocketId};
use crate::source::{HierarchicalSource, RowIndex};
use crate::value::ValueType;

/// Direction a drag is looking for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Anchored on a sink, looking for a source
    ToSource,
    /// Anchored on a source, looking for a sink
    ToSink,
}

impl DragMode {
    /// Mode for a drag anchored on a socket of `direction`
    pub fn from_anchor(direction: SocketDirection) -> Self {
        match direction {
            SocketDirection::Sink => Self::ToSource,
            SocketDirection::Source => Self::ToSink,
        }
    }

    /// Direction of the sockets that can complete the drag
    pub fn sought(self) -> SocketDirection {
        match self {
            Self::ToSource => SocketDirection::Source,
            Self::ToSink => SocketDirection::Sink,
        }
    }
}

/// Data carried by a drag
#[derive(Debug, Clone, PartialEq)]
pub struct DragPayload {
    /// Row of the anchor socket
    pub anchor_row: RowIndex,
    /// Declared type of the anchor
    pub type_id: ValueType,
}

/// State of an ongoing drag
#[derive(Debug, Clone)]
pub struct ActiveDrag {
    /// Socket the drag started from
    pub anchor: SocketId,
    /// Direction being sought
    pub mode: DragMode,
    /// Edge being edited
    pub edge: EdgeId,
    /// Anchor row and type
    pub payload: DragPayload,
    /// Compatible socket currently hovered
    pub target: Option<SocketId>,
}

/// Drag state machine
#[derive(Debug, Clone, Default)]
pub enum DragSession {
    /// No drag in progress
    #[default]
    Idle,
    /// Dragging from an anchor
    Dragging(ActiveDrag),
}

impl DragSession {
    /// Whether a drag is in progress
    pub fn is_dragging(&self) -> bool {
        matches!(self, Self::Dragging(_))
    }

    /// The ongoing drag
    pub fn active(&self) -> Option<&ActiveDrag> {
        match self {
            Self::Dragging(drag) => Some(drag),
            Self::Idle => None,
        }
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut ActiveDrag> {
        match self {
            Self::Dragging(drag) => Some(drag),
            Self::Idle => None,
        }
    }
}

/// How a drag ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// The edge was completed
    Connected(EdgeId),
    /// The edge was cleared
    Aborted,
}

/// Error driving the drag state machine
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DragError {
    /// A drag is already in progress
    #[error("A drag is already in progress")]
    AlreadyDragging,

    /// No drag is in progress
    #[error("No drag in progress")]
    NotDragging,

    /// Anchor socket not found
    #[error("Socket not found: {0:?}")]
    UnknownSocket(SocketId),

    /// Anchor has no declared value type
    #[error("Socket {0:?} has no value type")]
    UntypedAnchor(SocketId),
}

impl<S: HierarchicalSource> SocketModel<S> {
    /// Current drag state
    pub fn drag_session(&self) -> &DragSession {
        &self.drag
    }

    /// Start dragging from `anchor`.
    ///
    /// The anchor's edge is reused if it has one, otherwise a new edge is
    /// created at the placeholder row with the anchor as one endpoint.
    pub fn begin_drag(&mut self, anchor: SocketId) -> Result<DragMode, DragError> {
        if self.drag.is_dragging() {
            return Err(DragError::AlreadyDragging);
        }
        let socket = self.registry.socket(anchor).ok_or(DragError::UnknownSocket(anchor))?;
        let (direction, existing) = (socket.direction, socket.edge);
        let anchor_row = self
            .registry
            .socket_row(anchor)
            .ok_or(DragError::UnknownSocket(anchor))?;
        let type_id = self
            .source
            .value_type(anchor_row)
            .ok_or(DragError::UntypedAnchor(anchor))?;

        let edge = match existing {
            Some(edge) => edge,
            None => {
                let row = self.edges.placeholder_row();
                self.edges.ensure_edge(row)
            }
        };
        self.assign(edge, direction, Some(anchor));

        let mode = DragMode::from_anchor(direction);
        tracing::debug!("Dragging from {:?} on {:?}, {:?}", anchor, edge, mode);
        self.drag = DragSession::Dragging(ActiveDrag {
            anchor,
            mode,
            edge,
            payload: DragPayload { anchor_row, type_id },
            target: None,
        });
        Ok(mode)
    }

    /// Hover a candidate socket, returning whether a drop there would connect
    pub fn update_drag_target(&mut self, candidate: Option<SocketId>) -> bool {
        let accepted = match (self.drag.active(), candidate) {
            (Some(drag), Some(candidate)) => self.can_accept(drag, candidate),
            _ => false,
        };
        if let Some(drag) = self.drag.active_mut() {
            drag.target = candidate.filter(|_| accepted);
        }
        accepted
    }

    /// Drop on `candidate` (or on nothing) and return to idle
    pub fn end_drag(&mut self, candidate: Option<SocketId>) -> Result<DragOutcome, DragError> {
        let DragSession::Dragging(drag) = std::mem::take(&mut self.drag) else {
            return Err(DragError::NotDragging);
        };

        // the anchor left the edge mid-drag, so the drag no longer owns it
        let held = self.registry.socket(drag.anchor).and_then(|s| s.edge) == Some(drag.edge);
        if !held {
            tracing::debug!("Drag anchor {:?} left {:?}, cancelling", drag.anchor, drag.edge);
            self.edges.clear(&mut self.registry, drag.edge, &mut self.events);
            return Ok(DragOutcome::Aborted);
        }

        let accepted = candidate.filter(|&c| self.can_accept(&drag, c));
        let outcome = match accepted {
            Some(target) => {
                self.assign(drag.edge, drag.mode.sought(), Some(target));
                self.process_notifications();
                DragOutcome::Connected(drag.edge)
            }
            None => {
                self.edges.clear(&mut self.registry, drag.edge, &mut self.events);
                DragOutcome::Aborted
            }
        };
        tracing::debug!("Drag from {:?} ended: {:?}", drag.anchor, outcome);
        Ok(outcome)
    }

    /// Abandon the drag and clear its edge.
    ///
    /// Returns whether a drag was in progress.
    pub fn cancel_drag(&mut self) -> bool {
        let DragSession::Dragging(drag) = std::mem::take(&mut self.drag) else {
            return false;
        };
        self.edges.clear(&mut self.registry, drag.edge, &mut self.events);
        tracing::debug!("Drag from {:?} cancelled", drag.anchor);
        true
    }

    /// Whether a socket should be drawn as enabled.
    ///
    /// While dragging only the anchor and sockets that would accept the drop
    /// are enabled.
    pub fn is_socket_enabled(&self, id: SocketId) -> bool {
        let Some(row) = self.registry.socket_row(id) else {
            return false;
        };
        if !self.source.flags(row).enabled {
            return false;
        }
        match self.drag.active() {
            Some(drag) => drag.anchor == id || self.can_accept(drag, id),
            None => true,
        }
    }

    fn can_accept(&self, drag: &ActiveDrag, candidate: SocketId) -> bool {
        let Some(socket) = self.registry.socket(candidate) else {
            return false;
        };
        if socket.direction != drag.mode.sought() {
            return false;
        }
        let Some(row) = self.registry.socket_row(candidate) else {
            return false;
        };
        if !self.source.flags(row).enabled {
            return false;
        }
        let Some(candidate_type) = self.source.value_type(row) else {
            return false;
        };

        // values flow from source to sink whichever end was grabbed
        let compatible = match drag.mode {
            DragMode::ToSink => candidate_type.accepts(&drag.payload.type_id),
            DragMode::ToSource => drag.payload.type_id.accepts(&candidate_type),
        };
        if !compatible {
            return false;
        }

        if !self.config.allow_self_connections {
            let anchor_node = self.registry.socket(drag.anchor).map(|s| s.node);
            if anchor_node == Some(socket.node) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryPort, MemorySource};
    use crate::model::GraphEvent;
    use crate::node::NodeId;
    use crate::source::{RowFlags, SourceId};
    use crate::value::{Role, Value};

    struct Graph {
        model: SocketModel<MemorySource>,
        out: SocketId,
        text: SocketId,
        input: SocketId,
    }

    fn graph() -> Graph {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("out", Value::Int(5)));
        source.add_port(a, MemoryPort::output("text", Value::String("hi".into())));
        let b = source.add_node("B");
        source.add_port(b, MemoryPort::input("in", ValueType::Float));
        let model = SocketModel::new(source);

        let a = model.node(NodeId(0)).unwrap();
        let (out, text) = (a.sources().socket_at(0).unwrap(), a.sources().socket_at(1).unwrap());
        let input = model.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();
        Graph { model, out, text, input }
    }

    #[test]
    fn test_drag_from_source_to_sink() {
        let mut g = graph();
        assert_eq!(g.model.begin_drag(g.out), Ok(DragMode::ToSink));
        assert_eq!(g.model.begin_drag(g.out), Err(DragError::AlreadyDragging));

        assert!(g.model.update_drag_target(Some(g.input)));
        assert_eq!(g.model.drag_session().active().unwrap().target, Some(g.input));

        let outcome = g.model.end_drag(Some(g.input)).unwrap();
        let DragOutcome::Connected(edge) = outcome else {
            panic!("expected a connection, got {outcome:?}");
        };
        assert_eq!(g.model.source().value(1, 0), Some(&Value::Float(5.0)));
        assert!(!g.model.drag_session().is_dragging());
        assert_eq!(
            g.model.take_events(),
            vec![GraphEvent::Connected { edge, source: g.out, sink: g.input }]
        );
    }

    #[test]
    fn test_incompatible_target_is_refused() {
        let mut g = graph();
        g.model.begin_drag(g.text).unwrap();
        assert!(!g.model.is_socket_enabled(g.input));
        assert!(g.model.is_socket_enabled(g.text));
        assert!(!g.model.update_drag_target(Some(g.input)));

        assert_eq!(g.model.end_drag(Some(g.input)), Ok(DragOutcome::Aborted));
        assert!(g.model.edges().all(|e| e.source.is_none() && e.sink.is_none()));
        assert!(g.model.socket(g.text).unwrap().edge.is_none());
        g.model.check_invariants().unwrap();
    }

    #[test]
    fn test_same_direction_is_refused() {
        let mut g = graph();
        g.model.begin_drag(g.out).unwrap();
        assert!(!g.model.update_drag_target(Some(g.text)));
        assert!(!g.model.update_drag_target(None));
    }

    #[test]
    fn test_cancel_clears_edge() {
        let mut g = graph();
        assert!(!g.model.cancel_drag());
        g.model.begin_drag(g.input).unwrap();
        assert!(g.model.socket(g.input).unwrap().edge.is_some());

        assert!(g.model.cancel_drag());
        assert!(g.model.socket(g.input).unwrap().edge.is_none());
        assert_eq!(g.model.end_drag(None), Err(DragError::NotDragging));
    }

    #[test]
    fn test_disabled_sink_is_refused() {
        let mut source = MemorySource::new();
        let a = source.add_node("A");
        source.add_port(a, MemoryPort::output("out", Value::Int(5)));
        let b = source.add_node("B");
        source.add_port(b, MemoryPort::input("locked", ValueType::Int).disabled());
        let mut model = SocketModel::new(source);
        let out = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();
        let locked = model.node(NodeId(1)).unwrap().sinks().socket_at(0).unwrap();
        assert!(!model.is_socket_enabled(locked));

        model.begin_drag(out).unwrap();
        assert!(!model.is_socket_enabled(locked));
        assert!(!model.update_drag_target(Some(locked)));
        assert_eq!(model.end_drag(Some(locked)), Ok(DragOutcome::Aborted));
        assert!(model.socket(locked).unwrap().edge.is_none());
        assert_eq!(model.source().value(1, 0), None);
    }

    #[test]
    fn test_anchor_taken_mid_drag_keeps_the_new_edge() {
        let mut g = graph();
        g.model.begin_drag(g.out).unwrap();
        let dragged = g.model.drag_session().active().unwrap().edge;

        let kept = g.model.connect(g.out, g.input).unwrap();
        assert_ne!(kept, dragged);
        g.model.take_events();

        assert_eq!(g.model.end_drag(Some(g.input)), Ok(DragOutcome::Aborted));
        assert!(g.model.edge(kept).unwrap().valid);
        assert_eq!(g.model.socket(g.out).unwrap().edge, Some(kept));
        assert!(!g.model.edge(dragged).unwrap().valid);
        assert!(g.model.take_events().is_empty());
        g.model.check_invariants().unwrap();
    }

    /// Single node whose only port declares no type
    struct Untyped(SourceId);

    impl HierarchicalSource for Untyped {
        fn id(&self) -> SourceId {
            self.0
        }

        fn row_count(&self, _parent: Option<usize>) -> usize {
            1
        }

        fn flags(&self, row: RowIndex) -> RowFlags {
            if row.is_child() {
                RowFlags::output()
            } else {
                RowFlags::passive()
            }
        }

        fn read(&self, _row: RowIndex, _role: Role) -> Option<Value> {
            None
        }

        fn write(&mut self, _row: RowIndex, _value: Value, _role: Role) -> bool {
            false
        }
    }

    #[test]
    fn test_untyped_anchor_cannot_drag() {
        let mut model = SocketModel::new(Untyped(SourceId::new()));
        let out = model.node(NodeId(0)).unwrap().sources().socket_at(0).unwrap();

        assert_eq!(model.begin_drag(out), Err(DragError::UntypedAnchor(out)));
        assert_eq!(model.begin_drag(SocketId(77)), Err(DragError::UnknownSocket(SocketId(77))));
        assert!(model.edges().next().is_none());
    }
}
