// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` socket model demo.
//!
//! Builds a small in-memory graph, connects it once by dragging and once
//! programmatically, then edits a value and logs what reached each sink.
//!
//! Usage: `ordoplay_socket_demo [config.ron]`

use ordoplay_socket_model::{
    DragOutcome, GraphConfig, GraphEvent, MemoryPort, MemorySource, NodeId, SocketModel, Value, ValueType,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ordoplay_socket_model=debug"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!("Starting OrdoPlay socket demo v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => match GraphConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Failed to load config {path}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => GraphConfig::default(),
    };

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("Demo failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_source() -> MemorySource {
    let mut source = MemorySource::new();

    let constant = source.add_node("Constant");
    source.add_port(constant, MemoryPort::output("value", Value::Int(5)));

    let scale = source.add_node("Scale");
    source.add_port(scale, MemoryPort::input("input", ValueType::Float));
    source.add_port(scale, MemoryPort::passive("factor", Value::Float(2.0)));
    source.add_port(scale, MemoryPort::bidirectional("through", Value::Float(0.0)));

    let preview = source.add_node("Preview");
    source.add_port(preview, MemoryPort::input("shown", ValueType::String));

    source
}

fn run(config: GraphConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut model = SocketModel::with_config(build_source(), config);

    let socket = |model: &SocketModel<MemorySource>, node: usize, sink: bool, local: usize| {
        let node = model.node(NodeId(node))?;
        let index = if sink { node.sinks() } else { node.sources() };
        index.socket_at(local)
    };
    let constant_out = socket(&model, 0, false, 0).ok_or("Constant has no output")?;
    let scale_in = socket(&model, 1, true, 0).ok_or("Scale has no input")?;
    let scale_through_in = socket(&model, 1, true, 1).ok_or("Scale has no through input")?;
    let scale_through_out = socket(&model, 1, false, 0).ok_or("Scale has no through output")?;
    let preview_in = socket(&model, 2, true, 0).ok_or("Preview has no input")?;

    // drag Constant.value onto Scale.input
    model.begin_drag(constant_out)?;
    if !model.update_drag_target(Some(scale_in)) {
        tracing::warn!("Scale.input refused the drag");
    }
    match model.end_drag(Some(scale_in))? {
        DragOutcome::Connected(edge) => tracing::info!("Dragged a connection: {:?}", edge),
        DragOutcome::Aborted => tracing::warn!("Drag aborted"),
    }

    // Scale.through feeds Preview.shown as text
    model.connect(scale_through_out, preview_in)?;

    model.update_source(|source| source.set_value(1, 2, Value::Float(1.5)));
    model.update_source(|source| source.set_value(0, 0, Value::Int(9)));

    // moving the Constant edge onto the through port disconnects Scale.input
    model.connect(constant_out, scale_through_in)?;

    for event in model.take_events() {
        match event {
            GraphEvent::Connected { edge, source, sink } => {
                tracing::info!("{:?}: {:?} -> {:?}", edge, source, sink);
            }
            GraphEvent::Disconnected { edge, source, sink } => {
                tracing::info!("{:?}: {:?} -/-> {:?}", edge, source, sink);
            }
            other => tracing::debug!("{:?}", other),
        }
    }

    for edge in model.edges().filter(|e| e.valid) {
        tracing::info!("Edge {:?} (row {}) valid", edge.id, edge.row);
    }
    for (node, row, name) in [(1, 0, "Scale.input"), (1, 2, "Scale.through"), (2, 0, "Preview.shown")] {
        match model.source().value(node, row) {
            Some(value) => tracing::info!("{name} = {value}"),
            None => tracing::info!("{name} is empty"),
        }
    }

    model.check_invariants()?;
    Ok(())
}
