//! The execution-graph optimizer (spec.md §4.9): a node pass folded with
//! dead-node removal repeated to a fixed point, then compaction, dedup, a
//! second compaction, and a final constant-required-input validation.
//! Grounded on `original_source/source/execution_graph/execution_graph_optimizer.cpp`.

use super::pattern;
use super::{ConstantValue, ExecutionGraph, GlobalsRecord, NodeId, NodeKind};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::globals::InstrumentGlobals;
use crate::native::value::{AccessMode, NativeValue};
use crate::native::{ArgumentDirection, CompileTimeContext, Registry};

/// Runs the optimizer to completion in place.
pub fn optimize(graph: &mut ExecutionGraph, registry: &Registry, sink: &mut DiagnosticSink) {
    loop {
        let folded_or_spliced = node_pass(graph, registry, sink);
        let swept = dead_node_removal(graph);
        if !folded_or_spliced && !swept {
            break;
        }
    }
    graph.compact();
    let mut changed = dedup_constants(graph);
    changed |= dedup_calls(graph);
    if changed {
        graph.compact();
    }
    validate_constant_inputs(graph, registry, sink);
}

fn node_pass(graph: &mut ExecutionGraph, registry: &Registry, sink: &mut DiagnosticSink) -> bool {
    let mut changed = false;
    for id in graph.live_node_ids().collect::<Vec<_>>() {
        if graph.is_deleted(id) {
            continue;
        }
        match graph.node(id).kind {
            NodeKind::IntermediateValue => {
                splice_intermediate(graph, id);
                changed = true;
            }
            NodeKind::NativeModuleCall(uid) => {
                if registry.is_noop(uid) {
                    splice_call(graph, id);
                    changed = true;
                } else if try_fold(graph, id, registry, sink) {
                    changed = true;
                } else if try_apply_rule(graph, id, registry) {
                    changed = true;
                }
            }
            _ => {}
        }
    }
    changed
}

fn splice_intermediate(graph: &mut ExecutionGraph, id: NodeId) {
    if let Some(&source) = graph.node(id).incoming.first() {
        graph.redirect_consumers(id, source);
    }
    graph.node_mut(id).deleted = true;
}

/// Splices a unary `noop` call out of the graph: its single output slot's
/// consumers are redirected straight to the input slot's source.
fn splice_call(graph: &mut ExecutionGraph, call: NodeId) {
    let inputs = graph.ordered_input_slots(call);
    let outputs = graph.ordered_output_slots(call);
    if let (Some(&input_slot), Some(&output_slot)) = (inputs.first(), outputs.first()) {
        if let Some(&source) = graph.node(input_slot).incoming.first() {
            graph.redirect_consumers(output_slot, source);
        }
    }
    for slot in inputs.iter().chain(outputs.iter()) {
        graph.node_mut(*slot).deleted = true;
    }
    graph.node_mut(call).deleted = true;
}

fn to_instrument_globals(globals: GlobalsRecord) -> InstrumentGlobals {
    InstrumentGlobals {
        max_voices: globals.max_voices,
        sample_rates: vec![globals.sample_rate],
        chunk_size: globals.chunk_size,
        activate_fx_immediately: globals.activate_fx_immediately,
    }
}

fn constant_to_native(value: &ConstantValue, access_mode: AccessMode) -> NativeValue {
    match (value, access_mode) {
        (ConstantValue::Real(v), AccessMode::Value) => NativeValue::RealValue(*v),
        (ConstantValue::Real(v), AccessMode::Reference) => NativeValue::RealRef(*v),
        (ConstantValue::Bool(v), AccessMode::Value) => NativeValue::BoolValue(*v),
        (ConstantValue::Bool(v), AccessMode::Reference) => NativeValue::BoolRef(*v),
        (ConstantValue::String(v), AccessMode::Value) => NativeValue::StringValue(v.clone()),
        (ConstantValue::String(v), AccessMode::Reference) => NativeValue::StringRef(v.clone()),
        (ConstantValue::RealArray(v), AccessMode::Value) => NativeValue::RealValueArray(v.clone()),
        (ConstantValue::RealArray(v), AccessMode::Reference) => NativeValue::RealRefArray(v.clone()),
    }
}

fn native_to_constant(value: &NativeValue) -> ConstantValue {
    match value {
        NativeValue::RealValueArray(v) | NativeValue::RealRefArray(v) => ConstantValue::RealArray(v.clone()),
        _ => {
            if let Some(v) = value.as_real() {
                ConstantValue::Real(v)
            } else if let Some(v) = value.as_bool() {
                ConstantValue::Bool(v)
            } else if let Some(v) = value.as_string() {
                ConstantValue::String(v.to_string())
            } else {
                ConstantValue::Real(0.0)
            }
        }
    }
}

/// Folds an all-constant-input call with a compile-time implementation
/// (spec.md §4.9 step 1's third bullet). Returns whether folding happened.
fn try_fold(graph: &mut ExecutionGraph, call: NodeId, registry: &Registry, sink: &mut DiagnosticSink) -> bool {
    let NodeKind::NativeModuleCall(uid) = graph.node(call).kind else { return false };
    let Some(module) = registry.get(uid) else { return false };
    let Some(implementation) = module.compile_time_implementation else { return false };

    let sources = graph.ordered_input_sources(call);
    let mut constants = Vec::with_capacity(sources.len());
    for source in &sources {
        match &graph.node(*source).kind {
            NodeKind::Constant(value) => constants.push(value.clone()),
            _ => return false,
        }
    }

    let mut args = Vec::with_capacity(module.arguments.len());
    let mut in_values = constants.into_iter();
    for formal in &module.arguments {
        match formal.direction {
            ArgumentDirection::In => {
                let value = in_values.next().expect("argument/source count mismatch");
                args.push(constant_to_native(&value, formal.access_mode));
            }
            ArgumentDirection::Out => args.push(NativeValue::zeroed(formal.data_type, formal.access_mode)),
        }
    }

    let globals = to_instrument_globals(graph.globals);
    let mut ctx = CompileTimeContext { sink, globals: &globals };
    implementation(&mut ctx, &mut args);

    let output_slots = graph.ordered_output_slots(call);
    let out_values: Vec<ConstantValue> = module
        .arguments
        .iter()
        .zip(args.iter())
        .filter(|(formal, _)| formal.direction == ArgumentDirection::Out)
        .map(|(_, value)| native_to_constant(value))
        .collect();
    for (slot, value) in output_slots.iter().zip(out_values.iter()) {
        let constant_node = graph.add_node(NodeKind::Constant(value.clone()));
        graph.redirect_consumers(*slot, constant_node);
    }
    for slot in graph.ordered_input_slots(call).iter().chain(output_slots.iter()) {
        graph.node_mut(*slot).deleted = true;
    }
    graph.node_mut(call).deleted = true;
    true
}

/// Tries each registered optimization rule in order, applying the first
/// match (spec.md §4.9 step 1's fourth bullet).
fn try_apply_rule(graph: &mut ExecutionGraph, call: NodeId, registry: &Registry) -> bool {
    for rule in registry.optimization_rules().to_vec() {
        if let Some(table) = pattern::match_rule(graph, call, &rule, registry) {
            let new_root = pattern::emit_rule(graph, &rule.target, &table, registry);
            if let Some(&output_slot) = graph.ordered_output_slots(call).first() {
                graph.redirect_consumers(output_slot, new_root);
            }
            for slot in graph.ordered_input_slots(call).iter().chain(graph.ordered_output_slots(call).iter()) {
                graph.node_mut(*slot).deleted = true;
            }
            graph.node_mut(call).deleted = true;
            return true;
        }
    }
    false
}

/// Marks nodes reachable backward from graph outputs and deletes every
/// unmarked node that is not a slot; slots are then swept in a second pass
/// tied to their owning call's fate (spec.md §4.9 step 2).
fn dead_node_removal(graph: &mut ExecutionGraph) -> bool {
    let mut reachable = vec![false; graph.nodes.len()];
    let mut stack: Vec<NodeId> = graph.graph_outputs().into_iter().map(|(_, id)| id).collect();
    while let Some(id) = stack.pop() {
        if reachable[id.0 as usize] {
            continue;
        }
        reachable[id.0 as usize] = true;
        for &parent in graph.node(id).incoming.clone().iter() {
            if !reachable[parent.0 as usize] {
                stack.push(parent);
            }
        }
    }

    let mut changed = false;
    let ids: Vec<NodeId> = graph.live_node_ids().collect();
    for &id in &ids {
        let is_slot = matches!(graph.node(id).kind, NodeKind::InputSlot { .. } | NodeKind::OutputSlot { .. });
        if !reachable[id.0 as usize] && !is_slot {
            graph.node_mut(id).deleted = true;
            changed = true;
        }
    }
    for &id in &ids {
        if graph.is_deleted(id) {
            continue;
        }
        let owner = match graph.node(id).kind {
            NodeKind::InputSlot { owner, .. } | NodeKind::OutputSlot { owner, .. } => Some(owner),
            _ => None,
        };
        if let Some(owner) = owner {
            if graph.is_deleted(owner) {
                graph.node_mut(id).deleted = true;
                changed = true;
            }
        }
    }
    changed
}

fn dedup_constants(graph: &mut ExecutionGraph) -> bool {
    let ids: Vec<NodeId> = graph.live_node_ids().collect();
    let mut changed = false;
    for i in 0..ids.len() {
        let a = ids[i];
        if graph.is_deleted(a) {
            continue;
        }
        let Some(value_a) = (match &graph.node(a).kind {
            NodeKind::Constant(v) => Some(v.clone()),
            _ => None,
        }) else {
            continue;
        };
        for &b in &ids[i + 1..] {
            if graph.is_deleted(b) {
                continue;
            }
            let same = matches!(&graph.node(b).kind, NodeKind::Constant(v) if *v == value_a);
            if same {
                graph.redirect_consumers(b, a);
                graph.node_mut(b).deleted = true;
                changed = true;
            }
        }
    }
    changed
}

fn dedup_calls(graph: &mut ExecutionGraph) -> bool {
    let ids: Vec<NodeId> = graph
        .live_node_ids()
        .filter(|&id| matches!(graph.node(id).kind, NodeKind::NativeModuleCall(_)))
        .collect();
    let mut changed = false;
    for i in 0..ids.len() {
        let a = ids[i];
        if graph.is_deleted(a) {
            continue;
        }
        let NodeKind::NativeModuleCall(uid_a) = graph.node(a).kind else { continue };
        let sources_a = graph.ordered_input_sources(a);
        for &b in &ids[i + 1..] {
            if graph.is_deleted(b) {
                continue;
            }
            let NodeKind::NativeModuleCall(uid_b) = graph.node(b).kind else { continue };
            if uid_b != uid_a || graph.ordered_input_sources(b) != sources_a {
                continue;
            }
            let outs_a = graph.ordered_output_slots(a);
            let outs_b = graph.ordered_output_slots(b);
            for (&oa, &ob) in outs_a.iter().zip(outs_b.iter()) {
                graph.redirect_consumers(ob, oa);
                graph.node_mut(ob).deleted = true;
            }
            for slot in graph.ordered_input_slots(b) {
                graph.node_mut(slot).deleted = true;
            }
            graph.node_mut(b).deleted = true;
            changed = true;
        }
    }
    changed
}

/// Step 6: every remaining call's constant-mutability in-arguments must be
/// sourced from a constant node.
fn validate_constant_inputs(graph: &ExecutionGraph, registry: &Registry, sink: &mut DiagnosticSink) {
    for id in graph.live_node_ids() {
        let NodeKind::NativeModuleCall(uid) = graph.node(id).kind else { continue };
        let Some(module) = registry.get(uid) else { continue };
        let sources = graph.ordered_input_sources(id);
        let in_arguments: Vec<_> = module.arguments.iter().filter(|a| a.direction == ArgumentDirection::In).collect();
        for (formal, source) in in_arguments.iter().zip(sources.iter()) {
            if formal.data_type.mutability == crate::types::Mutability::Constant
                && !matches!(graph.node(*source).kind, NodeKind::Constant(_))
            {
                sink.error(
                    DiagnosticCode::TypeMismatch,
                    format!("argument '{}' of '{}' requires a constant value", formal.name, module.name),
                    None,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{library_core, NativeOperator};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        registry.set_optimizations_enabled(true);
        library_core::register(&mut registry).unwrap();
        for rule in super::pattern::add_zero_identities(&registry) {
            registry.register_optimization_rule(rule);
        }
        if let Some(rule) = super::pattern::neg_neg_identity(&registry) {
            registry.register_optimization_rule(rule);
        }
        registry.finalize().unwrap();
        registry
    }

    fn globals() -> GlobalsRecord {
        GlobalsRecord { max_voices: 1, sample_rate: 44100, chunk_size: 64, activate_fx_immediately: false }
    }

    #[test]
    fn folds_add_of_constants() {
        let registry = registry();
        let mut graph = ExecutionGraph::new(globals());
        let add_uid = registry.operator_module(NativeOperator::Add).unwrap().uid;
        let (_, inputs, outputs) = graph.add_native_module_call(add_uid, 2, 1);
        let one = graph.add_node(NodeKind::Constant(ConstantValue::Real(1.0)));
        let two = graph.add_node(NodeKind::Constant(ConstantValue::Real(2.0)));
        graph.add_edge(one, inputs[0]);
        graph.add_edge(two, inputs[1]);
        let output = graph.add_node(NodeKind::GraphOutput(0));
        graph.add_edge(outputs[0], output);

        let mut sink = DiagnosticSink::new();
        optimize(&mut graph, &registry, &mut sink);

        assert!(sink.is_ok());
        assert!(!graph.live_node_ids().any(|id| matches!(graph.node(id).kind, NodeKind::NativeModuleCall(_))));
        let (_, output_node) = graph.graph_outputs()[0];
        let source = graph.node(output_node).incoming[0];
        assert_eq!(&graph.node(source).kind, &NodeKind::Constant(ConstantValue::Real(3.0)));
    }

    #[test]
    fn add_zero_reduces_to_direct_edge() {
        let registry = registry();
        let mut graph = ExecutionGraph::new(globals());
        let add_uid = registry.operator_module(NativeOperator::Add).unwrap().uid;
        let (_, inputs, outputs) = graph.add_native_module_call(add_uid, 2, 1);
        let a = graph.add_node(NodeKind::IntermediateValue);
        let zero = graph.add_node(NodeKind::Constant(ConstantValue::Real(0.0)));
        graph.add_edge(a, inputs[0]);
        graph.add_edge(zero, inputs[1]);
        let output = graph.add_node(NodeKind::GraphOutput(0));
        graph.add_edge(outputs[0], output);

        let mut sink = DiagnosticSink::new();
        optimize(&mut graph, &registry, &mut sink);

        assert!(sink.is_ok());
        assert!(!graph.live_node_ids().any(|id| matches!(graph.node(id).kind, NodeKind::NativeModuleCall(_))));
        assert_eq!(graph.live_node_ids().count(), 2);
    }
}
