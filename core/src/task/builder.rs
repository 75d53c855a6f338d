//! Lowers an optimized execution graph into a task graph: task-function
//! selection, buffer assignment, and `max_buffer_concurrency` estimation
//! (spec.md §4.10). Grounded on
//! `original_source/source/execution_graph/task_graph.cpp`'s three-step
//! buffer-assignment algorithm.

use super::{ArgumentBinding, BufferIndex, TaskFunctionId, TaskGraph, TaskNode};
use crate::diagnostics::DiagnosticCode;
use crate::graph::{ExecutionGraph, NodeId, NodeKind};
use crate::native::Registry;
use std::collections::HashMap;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SlotKind {
    Constant,
    Buffer,
}

struct CallPlan {
    module_name: String,
    input_slots: Vec<NodeId>,
    sources: Vec<NodeId>,
    output_slots: Vec<NodeId>,
    slot_kinds: Vec<SlotKind>,
    /// Index, within `input_slots`/`slot_kinds`, of the non-constant,
    /// non-branching input chosen to share a buffer with the call's first
    /// output argument (spec.md §4.10's inout-reuse rule).
    inout_input_index: Option<usize>,
}

fn task_function_name(module_name: &str, slot_kinds: &[SlotKind], inout_index: Option<usize>) -> TaskFunctionId {
    let mut parts = Vec::with_capacity(slot_kinds.len());
    for (index, kind) in slot_kinds.iter().enumerate() {
        parts.push(match kind {
            SlotKind::Constant => "constant".to_string(),
            SlotKind::Buffer if Some(index) == inout_index => "bufferio".to_string(),
            SlotKind::Buffer => "buffer".to_string(),
        });
    }
    if parts.is_empty() {
        TaskFunctionId(module_name.to_string())
    } else {
        TaskFunctionId(format!("{}_{}", module_name, parts.join("_")))
    }
}

pub fn build_task_graph(graph: &ExecutionGraph, registry: &Registry) -> Result<TaskGraph, DiagnosticCode> {
    let mut plans = Vec::new();
    let mut identifications: Vec<(NodeId, NodeId)> = Vec::new();

    for call in graph.live_node_ids() {
        let NodeKind::NativeModuleCall(uid) = graph.node(call).kind else { continue };
        let module = registry.get(uid).ok_or(DiagnosticCode::InvalidNativeModuleImplementation)?;
        let input_slots = graph.ordered_input_slots(call);
        let sources = graph.ordered_input_sources(call);
        let output_slots = graph.ordered_output_slots(call);

        let mut slot_kinds = Vec::with_capacity(sources.len());
        let mut inout_input_index = None;
        for (index, &source) in sources.iter().enumerate() {
            if matches!(graph.node(source).kind, NodeKind::Constant(_)) {
                slot_kinds.push(SlotKind::Constant);
                continue;
            }
            slot_kinds.push(SlotKind::Buffer);
            let branching = graph.node(source).outgoing.len() > 1;
            if !branching && inout_input_index.is_none() && !output_slots.is_empty() {
                inout_input_index = Some(index);
            }
        }

        if !output_slots.is_empty() {
            if let Some(index) = inout_input_index {
                identifications.push((input_slots[index], output_slots[0]));
            }
        }

        plans.push(CallPlan {
            module_name: module.name.clone(),
            input_slots,
            sources,
            output_slots,
            slot_kinds,
            inout_input_index,
        });
    }

    let mut buffer_of: HashMap<NodeId, BufferIndex> = HashMap::new();
    let mut next_buffer = 0u32;
    for plan in &plans {
        for &slot in plan.input_slots.iter().chain(plan.output_slots.iter()) {
            if !buffer_of.contains_key(&slot) {
                let buffer = BufferIndex(next_buffer);
                next_buffer += 1;
                propagate_buffer(graph, slot, buffer, &identifications, &mut buffer_of);
            }
        }
    }

    let mut tasks = Vec::with_capacity(plans.len());
    for plan in &plans {
        let has_inout = plan.inout_input_index.is_some();
        let function = task_function_name(&plan.module_name, &plan.slot_kinds, plan.inout_input_index);

        let mut constant_inputs = Vec::new();
        let mut buffer_inputs = Vec::new();
        let mut buffer_outputs = Vec::new();
        let mut buffer_inout = Vec::new();
        let mut bindings = Vec::with_capacity(plan.slot_kinds.len() + plan.output_slots.len());

        for (index, kind) in plan.slot_kinds.iter().enumerate() {
            match kind {
                SlotKind::Constant => {
                    let value = match &graph.node(plan.sources[index]).kind {
                        NodeKind::Constant(v) => v.clone(),
                        _ => unreachable!("slot classified constant without a constant source"),
                    };
                    constant_inputs.push(value);
                    bindings.push(ArgumentBinding::Constant(constant_inputs.len() - 1));
                }
                SlotKind::Buffer if Some(index) == plan.inout_input_index => {
                    let buffer = buffer_of[&plan.input_slots[index]];
                    buffer_inout.push(buffer);
                    bindings.push(ArgumentBinding::InoutBuffer(buffer_inout.len() - 1));
                }
                SlotKind::Buffer => {
                    let buffer = buffer_of[&plan.input_slots[index]];
                    buffer_inputs.push(buffer);
                    bindings.push(ArgumentBinding::InputBuffer(buffer_inputs.len() - 1));
                }
            }
        }

        for (index, &slot) in plan.output_slots.iter().enumerate() {
            if index == 0 && has_inout {
                bindings.push(ArgumentBinding::InoutBuffer(0));
                continue;
            }
            let buffer = buffer_of[&slot];
            buffer_outputs.push(buffer);
            bindings.push(ArgumentBinding::OutputBuffer(buffer_outputs.len() - 1));
        }

        tasks.push(TaskNode { function, constant_inputs, buffer_inputs, buffer_outputs, buffer_inout, argument_bindings: bindings });
    }

    let buffer_count = next_buffer;
    let max_buffer_concurrency = compute_max_buffer_concurrency(&tasks, buffer_count);
    Ok(TaskGraph { tasks, buffer_count, max_buffer_concurrency })
}

/// Propagates one buffer index to every execution-graph slot transitively
/// connected to `start` (spec.md §4.10 step 2): an input slot shares a
/// buffer with any output slot feeding it, an output slot shares a buffer
/// with any input slot it feeds, and both endpoints of an inout
/// identification share a buffer.
fn propagate_buffer(
    graph: &ExecutionGraph,
    start: NodeId,
    buffer: BufferIndex,
    identifications: &[(NodeId, NodeId)],
    buffer_of: &mut HashMap<NodeId, BufferIndex>,
) {
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if buffer_of.contains_key(&node) {
            continue;
        }
        buffer_of.insert(node, buffer);
        match graph.node(node).kind {
            NodeKind::InputSlot { .. } => {
                for &source in &graph.node(node).incoming {
                    if matches!(graph.node(source).kind, NodeKind::OutputSlot { .. }) && !buffer_of.contains_key(&source) {
                        stack.push(source);
                    }
                }
            }
            NodeKind::OutputSlot { .. } => {
                for &consumer in &graph.node(node).outgoing {
                    if matches!(graph.node(consumer).kind, NodeKind::InputSlot { .. }) && !buffer_of.contains_key(&consumer) {
                        stack.push(consumer);
                    }
                }
            }
            _ => {}
        }
        for &(a, b) in identifications {
            if a == node && !buffer_of.contains_key(&b) {
                stack.push(b);
            }
            if b == node && !buffer_of.contains_key(&a) {
                stack.push(a);
            }
        }
    }
}

/// Simulates live-buffer sets along task order (itself a valid topological
/// order of the underlying execution graph, since tasks are emitted in
/// ascending node-construction order) to bound concurrent buffer liveness —
/// the REDESIGN FLAGS resolution of spec.md §9's open question.
pub fn compute_max_buffer_concurrency(tasks: &[TaskNode], buffer_count: u32) -> u32 {
    let mut first_use = vec![None; buffer_count as usize];
    let mut last_use = vec![None; buffer_count as usize];
    for (task_index, task) in tasks.iter().enumerate() {
        for &buffer in task.buffer_inputs.iter().chain(&task.buffer_outputs).chain(&task.buffer_inout) {
            let index = buffer.0 as usize;
            if first_use[index].is_none() {
                first_use[index] = Some(task_index);
            }
            last_use[index] = Some(task_index);
        }
    }

    let mut live = 0u32;
    let mut max_live = 0u32;
    for task_index in 0..tasks.len() {
        for buffer_index in 0..buffer_count as usize {
            if first_use[buffer_index] == Some(task_index) {
                live += 1;
            }
        }
        max_live = max_live.max(live);
        for buffer_index in 0..buffer_count as usize {
            if last_use[buffer_index] == Some(task_index) {
                live = live.saturating_sub(1);
            }
        }
    }
    max_live
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConstantValue, GlobalsRecord};
    use crate::native::{library_core, NativeOperator};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        library_core::register(&mut registry).unwrap();
        registry.finalize().unwrap();
        registry
    }

    #[test]
    fn inout_selection_prefers_single_consumer_input() {
        let registry = registry();
        let globals = GlobalsRecord { max_voices: 1, sample_rate: 44100, chunk_size: 64, activate_fx_immediately: false };
        let mut graph = ExecutionGraph::new(globals);
        let mul_uid = registry.operator_module(NativeOperator::Mul).unwrap().uid;
        let (_, inputs, outputs) = graph.add_native_module_call(mul_uid, 2, 1);
        let a = graph.add_node(NodeKind::IntermediateValue);
        let b = graph.add_node(NodeKind::IntermediateValue);
        graph.add_edge(a, inputs[0]);
        graph.add_edge(b, inputs[1]);
        let out0 = graph.add_node(NodeKind::GraphOutput(0));
        let out1 = graph.add_node(NodeKind::GraphOutput(1));
        graph.add_edge(outputs[0], out0);
        graph.add_edge(b, out1);

        let task_graph = build_task_graph(&graph, &registry).unwrap();
        assert_eq!(task_graph.tasks.len(), 1);
        let task = &task_graph.tasks[0];
        assert_eq!(task.buffer_inout.len(), 1);
        assert_eq!(task.buffer_inputs.len(), 1);
        assert_eq!(task.argument_bindings[0], ArgumentBinding::InoutBuffer(0));
        assert_eq!(task.argument_bindings[1], ArgumentBinding::InputBuffer(0));
        assert!(task.function.0.contains("bufferio"));
        let _ = ConstantValue::Real(0.0);
    }
}
