//! Optimization-rule pattern matching and emission (spec.md §4.9's
//! "Optimization rules"). Grounded on
//! `original_source/source/native_module/native_module.h`'s
//! `s_native_module_optimization_symbol`/`_pattern`/`_rule` and
//! `execution_graph_optimizer.cpp`'s rule-application loop: a linear token
//! stream walked with an explicit stack, transparently skipping the
//! output-slot node between a module call and its consumer.

use super::{ConstantValue, ExecutionGraph, NodeId, NodeKind};
use crate::native::{NativeOperator, OptimizationRule, PatternToken, Registry};

/// Up to 4 variable and 4 constant slots (spec.md §9's "small fixed-size
/// match table").
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    pub variables: [Option<NodeId>; 4],
    pub constants: [Option<NodeId>; 4],
}

/// Tries to match `rule.source` rooted at `candidate` (a live
/// native-module-call node). Returns the bound slot table on success.
pub fn match_rule(graph: &ExecutionGraph, candidate: NodeId, rule: &OptimizationRule, registry: &Registry) -> Option<MatchTable> {
    let mut table = MatchTable::default();
    let mut pos = 0usize;
    if match_node(graph, &rule.source, &mut pos, candidate, registry, &mut table) && pos == rule.source.len() {
        Some(table)
    } else {
        None
    }
}

fn resolve_call_through_output_slot(graph: &ExecutionGraph, node: NodeId, uid: crate::native::NativeModuleUid) -> Option<NodeId> {
    match graph.node(node).kind {
        NodeKind::NativeModuleCall(candidate_uid) if candidate_uid == uid => Some(node),
        NodeKind::OutputSlot { owner, .. } => match graph.node(owner).kind {
            NodeKind::NativeModuleCall(candidate_uid) if candidate_uid == uid => Some(owner),
            _ => None,
        },
        _ => None,
    }
}

fn match_node(
    graph: &ExecutionGraph,
    tokens: &[PatternToken],
    pos: &mut usize,
    node: NodeId,
    registry: &Registry,
    table: &mut MatchTable,
) -> bool {
    let Some(token) = tokens.get(*pos).cloned() else { return false };
    *pos += 1;
    match token {
        PatternToken::ModuleCallOpen(uid) => {
            let Some(call) = resolve_call_through_output_slot(graph, node, uid) else { return false };
            for source in graph.ordered_input_sources(call) {
                if !match_node(graph, tokens, pos, source, registry, table) {
                    return false;
                }
            }
            if matches!(tokens.get(*pos), Some(PatternToken::ModuleCallClose)) {
                *pos += 1;
                true
            } else {
                false
            }
        }
        PatternToken::ModuleCallClose => false,
        PatternToken::VariableSlot(slot) => {
            if matches!(graph.node(node).kind, NodeKind::Constant(_)) {
                return false;
            }
            table.variables[slot as usize] = Some(node);
            true
        }
        PatternToken::ConstantSlot(slot) => {
            if !matches!(graph.node(node).kind, NodeKind::Constant(_)) {
                return false;
            }
            table.constants[slot as usize] = Some(node);
            true
        }
        PatternToken::LiteralReal(value) => {
            matches!(graph.node(node).kind, NodeKind::Constant(ConstantValue::Real(v)) if v == value)
        }
        PatternToken::LiteralBool(value) => {
            matches!(graph.node(node).kind, NodeKind::Constant(ConstantValue::Bool(v)) if v == value)
        }
    }
}

/// Builds `target` into `graph`, returning the node a wrapping consumer
/// should bind to (an output slot for a freshly-built call, or a bound slot
/// verbatim for a leaf target).
pub fn emit_rule(graph: &mut ExecutionGraph, target: &[PatternToken], table: &MatchTable, registry: &Registry) -> NodeId {
    let mut pos = 0usize;
    emit_node(graph, target, &mut pos, table, registry)
}

fn emit_node(graph: &mut ExecutionGraph, tokens: &[PatternToken], pos: &mut usize, table: &MatchTable, registry: &Registry) -> NodeId {
    let token = tokens[*pos].clone();
    *pos += 1;
    match token {
        PatternToken::ModuleCallOpen(uid) => {
            let module = registry.get(uid).expect("optimization rule references an unregistered native module");
            let in_count = module.in_arguments().count();
            let out_count = module.out_arguments().count();
            let (call, inputs, outputs) = graph.add_native_module_call(uid, in_count, out_count);
            for input_slot in &inputs {
                let source = emit_node(graph, tokens, pos, table, registry);
                graph.add_edge(source, *input_slot);
            }
            assert!(matches!(tokens[*pos], PatternToken::ModuleCallClose), "malformed optimization rule target");
            *pos += 1;
            let _ = call;
            outputs.into_iter().next().expect("rule target module has no out-arguments")
        }
        PatternToken::ModuleCallClose => unreachable!("stray ModuleCallClose in target pattern"),
        PatternToken::VariableSlot(slot) => table.variables[slot as usize].expect("unbound variable slot in rule target"),
        PatternToken::ConstantSlot(slot) => table.constants[slot as usize].expect("unbound constant slot in rule target"),
        PatternToken::LiteralReal(value) => graph.add_node(NodeKind::Constant(ConstantValue::Real(value))),
        PatternToken::LiteralBool(value) => graph.add_node(NodeKind::Constant(ConstantValue::Bool(value))),
    }
}

/// Builds the `neg(neg(X)) -> X` identity (spec.md §8.2 scenario 2), keyed
/// to whatever UID the `core` library registers for `neg`.
pub fn neg_neg_identity(registry: &Registry) -> Option<OptimizationRule> {
    let neg = registry.operator_module(NativeOperator::Neg)?.uid;
    Some(OptimizationRule {
        source: vec![
            PatternToken::ModuleCallOpen(neg),
            PatternToken::ModuleCallOpen(neg),
            PatternToken::VariableSlot(0),
            PatternToken::ModuleCallClose,
            PatternToken::ModuleCallClose,
        ],
        target: vec![PatternToken::VariableSlot(0)],
    })
}

/// Builds the `add(X, 0.0) -> X` identity and its mirror `add(0.0, X) -> X`
/// (spec.md §8.2 scenario 3).
pub fn add_zero_identities(registry: &Registry) -> Vec<OptimizationRule> {
    let Some(add) = registry.operator_module(NativeOperator::Add).map(|m| m.uid) else { return Vec::new() };
    vec![
        OptimizationRule {
            source: vec![
                PatternToken::ModuleCallOpen(add),
                PatternToken::VariableSlot(0),
                PatternToken::LiteralReal(0.0),
                PatternToken::ModuleCallClose,
            ],
            target: vec![PatternToken::VariableSlot(0)],
        },
        OptimizationRule {
            source: vec![
                PatternToken::ModuleCallOpen(add),
                PatternToken::LiteralReal(0.0),
                PatternToken::VariableSlot(0),
                PatternToken::ModuleCallClose,
            ],
            target: vec![PatternToken::VariableSlot(0)],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GlobalsRecord;
    use crate::native::{library_core, Registry};

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        registry.set_optimizations_enabled(true);
        library_core::register(&mut registry).unwrap();
        registry.finalize().unwrap();
        registry
    }

    fn globals() -> GlobalsRecord {
        GlobalsRecord { max_voices: 1, sample_rate: 44100, chunk_size: 64, activate_fx_immediately: false }
    }

    #[test]
    fn neg_neg_matches_and_emits_inner_operand() {
        let registry = registry();
        let rule = neg_neg_identity(&registry).unwrap();
        let mut graph = ExecutionGraph::new(globals());
        let operand = graph.add_node(NodeKind::IntermediateValue);
        let neg_uid = registry.operator_module(NativeOperator::Neg).unwrap().uid;
        let (inner, inner_in, inner_out) = graph.add_native_module_call(neg_uid, 1, 1);
        graph.add_edge(operand, inner_in[0]);
        let (outer, outer_in, _outer_out) = graph.add_native_module_call(neg_uid, 1, 1);
        graph.add_edge(inner_out[0], outer_in[0]);

        let table = match_rule(&graph, outer, &rule, &registry).expect("pattern should match");
        assert_eq!(table.variables[0], Some(operand));
        let _ = inner;
    }
}
