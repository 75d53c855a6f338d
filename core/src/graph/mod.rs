//! The execution graph: an arena of nodes forming a DAG, lowered from a
//! resolved module body by [`crate::variant`]. Grounded on spec.md §3.6 and
//! `original_source/source/execution_graph/execution_graph.h`'s node-variant
//! split and dense-index/compaction ownership model.

pub mod optimizer;
pub mod pattern;

use crate::native::NativeModuleUid;
use crate::types::{DataType, Primitive};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Real(f32),
    Bool(bool),
    String(String),
    RealArray(Vec<f32>),
}

impl ConstantValue {
    pub fn data_type(&self) -> DataType {
        match self {
            ConstantValue::Real(_) => DataType::scalar(Primitive::Real),
            ConstantValue::Bool(_) => DataType::scalar(Primitive::Bool),
            ConstantValue::String(_) => DataType::scalar(Primitive::String),
            ConstantValue::RealArray(_) => DataType::array(Primitive::Real),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Constant(ConstantValue),
    NativeModuleCall(NativeModuleUid),
    /// Exactly one incoming edge (its value source) and one outgoing edge
    /// (to `owner`), per spec.md §3.6.
    InputSlot { owner: NodeId, formal_index: usize },
    /// Exactly one incoming edge (from `owner`); any number outgoing.
    OutputSlot { owner: NodeId, formal_index: usize },
    GraphOutput(u32),
    /// Scratch node used only during lowering; always spliced out by the
    /// optimizer's first node pass (spec.md §4.9).
    IntermediateValue,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub incoming: Vec<NodeId>,
    pub outgoing: Vec<NodeId>,
    pub deleted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalsRecord {
    pub max_voices: u32,
    pub sample_rate: u32,
    pub chunk_size: u32,
    pub activate_fx_immediately: bool,
}

/// Owns its nodes and edge lists; nodes are dense indices, compactable
/// after deletions (spec.md §3.6's ownership note).
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    pub nodes: Vec<Node>,
    pub globals: GlobalsRecord,
}

impl ExecutionGraph {
    pub fn new(globals: GlobalsRecord) -> Self {
        ExecutionGraph { nodes: Vec::new(), globals }
    }

    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, incoming: Vec::new(), outgoing: Vec::new(), deleted: false });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        self.node_mut(from).outgoing.push(to);
        self.node_mut(to).incoming.push(from);
    }

    pub fn remove_edge(&mut self, from: NodeId, to: NodeId) {
        self.node_mut(from).outgoing.retain(|&n| n != to);
        self.node_mut(to).incoming.retain(|&n| n != from);
    }

    /// Redirects every edge `_ -> old` to `_ -> new` and every `old -> _` to
    /// `new -> _`, without touching `old`'s own adjacency lists (the caller
    /// deletes `old` afterward). Used by splicing and dedup rewiring.
    pub fn redirect_consumers(&mut self, old: NodeId, new: NodeId) {
        let consumers = self.node(old).outgoing.clone();
        for consumer in consumers {
            for slot in self.node_mut(consumer).incoming.iter_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
            self.node_mut(new).outgoing.push(consumer);
        }
    }

    /// Allocates a native-module call node plus its dedicated input/output
    /// slot nodes, already wired to the call (spec.md §3.6).
    pub fn add_native_module_call(
        &mut self,
        uid: NativeModuleUid,
        in_count: usize,
        out_count: usize,
    ) -> (NodeId, Vec<NodeId>, Vec<NodeId>) {
        let call = self.add_node(NodeKind::NativeModuleCall(uid));
        let inputs: Vec<NodeId> = (0..in_count)
            .map(|formal_index| {
                let slot = self.add_node(NodeKind::InputSlot { owner: call, formal_index });
                self.add_edge(slot, call);
                slot
            })
            .collect();
        let outputs: Vec<NodeId> = (0..out_count)
            .map(|formal_index| {
                let slot = self.add_node(NodeKind::OutputSlot { owner: call, formal_index });
                self.add_edge(call, slot);
                slot
            })
            .collect();
        (call, inputs, outputs)
    }

    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.nodes[id.0 as usize].deleted
    }

    pub fn live_node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter(|(_, n)| !n.deleted).map(|(i, _)| NodeId(i as u32))
    }

    pub fn graph_outputs(&self) -> Vec<(u32, NodeId)> {
        self.live_node_ids()
            .filter_map(|id| match self.node(id).kind {
                NodeKind::GraphOutput(label) => Some((label, id)),
                _ => None,
            })
            .collect()
    }

    /// Labels 0..N-1 exactly once each (spec.md §8.1's "output uniqueness").
    pub fn graph_outputs_are_contiguous(&self) -> bool {
        let mut labels: Vec<u32> = self.graph_outputs().into_iter().map(|(label, _)| label).collect();
        labels.sort_unstable();
        labels.iter().enumerate().all(|(i, &label)| i as u32 == label)
    }

    /// Removes tombstoned nodes and remaps every surviving index so there
    /// are no holes (spec.md §4.9 steps 3 and 5).
    pub fn compact(&mut self) -> Vec<Option<NodeId>> {
        let mut remap = vec![None; self.nodes.len()];
        let mut new_nodes = Vec::with_capacity(self.nodes.len());
        for (old_index, node) in self.nodes.iter().enumerate() {
            if !node.deleted {
                remap[old_index] = Some(NodeId(new_nodes.len() as u32));
                new_nodes.push(node.clone());
            }
        }
        for node in &mut new_nodes {
            node.incoming = node.incoming.iter().filter_map(|id| remap[id.0 as usize]).collect();
            node.outgoing = node.outgoing.iter().filter_map(|id| remap[id.0 as usize]).collect();
            match &mut node.kind {
                NodeKind::InputSlot { owner, .. } | NodeKind::OutputSlot { owner, .. } => {
                    if let Some(new_owner) = remap[owner.0 as usize] {
                        *owner = new_owner;
                    }
                }
                _ => {}
            }
        }
        self.nodes = new_nodes;
        remap
    }

    /// Iterative DFS cycle check (spec.md §8.1's acyclicity property); an
    /// explicit stack avoids recursion depth tied to graph size.
    pub fn is_acyclic(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            OnStack,
            Done,
        }
        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        for start in self.live_node_ids() {
            if marks[start.0 as usize] != Mark::Unvisited {
                continue;
            }
            let mut stack = vec![(start, 0usize)];
            marks[start.0 as usize] = Mark::OnStack;
            while let Some(&mut (node, ref mut next)) = stack.last_mut() {
                let outgoing = &self.node(node).outgoing;
                if *next < outgoing.len() {
                    let child = outgoing[*next];
                    *next += 1;
                    match marks[child.0 as usize] {
                        Mark::OnStack => return false,
                        Mark::Done => {}
                        Mark::Unvisited => {
                            marks[child.0 as usize] = Mark::OnStack;
                            stack.push((child, 0));
                        }
                    }
                } else {
                    marks[node.0 as usize] = Mark::Done;
                    stack.pop();
                }
            }
        }
        true
    }

    /// Type-lattice legality for one edge (spec.md §3.6's edge-legality
    /// invariant): which node kinds may feed which.
    pub fn edge_is_legal(&self, from: NodeId, to: NodeId) -> bool {
        use NodeKind::*;
        match (&self.node(from).kind, &self.node(to).kind) {
            (Constant(_), InputSlot { .. }) => true,
            (Constant(_), GraphOutput(_)) => true,
            (Constant(_), IntermediateValue) => true,
            (OutputSlot { .. }, InputSlot { .. }) => true,
            (OutputSlot { .. }, GraphOutput(_)) => true,
            (OutputSlot { .. }, IntermediateValue) => true,
            (IntermediateValue, InputSlot { .. }) => true,
            (IntermediateValue, GraphOutput(_)) => true,
            (IntermediateValue, IntermediateValue) => true,
            (InputSlot { owner, .. }, NativeModuleCall(_)) => to == *owner,
            (NativeModuleCall(_), OutputSlot { owner, .. }) => from == *owner,
            _ => false,
        }
    }

    pub fn all_edges_legal(&self) -> bool {
        self.live_node_ids().all(|id| self.node(id).outgoing.iter().all(|&to| self.edge_is_legal(id, to)))
    }

    /// A call's input slots, in formal-argument order.
    pub fn ordered_input_slots(&self, call: NodeId) -> Vec<NodeId> {
        let mut slots: Vec<(usize, NodeId)> = self
            .node(call)
            .incoming
            .iter()
            .filter_map(|&id| match self.node(id).kind {
                NodeKind::InputSlot { owner, formal_index } if owner == call => Some((formal_index, id)),
                _ => None,
            })
            .collect();
        slots.sort_by_key(|(index, _)| *index);
        slots.into_iter().map(|(_, id)| id).collect()
    }

    /// A call's output slots, in formal-argument order.
    pub fn ordered_output_slots(&self, call: NodeId) -> Vec<NodeId> {
        let mut slots: Vec<(usize, NodeId)> = self
            .node(call)
            .outgoing
            .iter()
            .filter_map(|&id| match self.node(id).kind {
                NodeKind::OutputSlot { owner, formal_index } if owner == call => Some((formal_index, id)),
                _ => None,
            })
            .collect();
        slots.sort_by_key(|(index, _)| *index);
        slots.into_iter().map(|(_, id)| id).collect()
    }

    /// The node feeding each of a call's input slots, in formal-argument
    /// order (the slot itself if somehow unwired, which never happens in a
    /// well-formed graph).
    pub fn ordered_input_sources(&self, call: NodeId) -> Vec<NodeId> {
        self.ordered_input_slots(call)
            .into_iter()
            .map(|slot| self.node(slot).incoming.first().copied().unwrap_or(slot))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn globals() -> GlobalsRecord {
        GlobalsRecord { max_voices: 1, sample_rate: 44100, chunk_size: 64, activate_fx_immediately: false }
    }

    #[test]
    fn fresh_graph_is_acyclic() {
        let mut graph = ExecutionGraph::new(globals());
        let constant = graph.add_node(NodeKind::Constant(ConstantValue::Real(1.0)));
        let output = graph.add_node(NodeKind::GraphOutput(0));
        graph.add_edge(constant, output);
        assert!(graph.is_acyclic());
        assert!(graph.all_edges_legal());
    }

    #[test]
    fn self_loop_is_detected() {
        let mut graph = ExecutionGraph::new(globals());
        let node = graph.add_node(NodeKind::IntermediateValue);
        graph.node_mut(node).outgoing.push(node);
        graph.node_mut(node).incoming.push(node);
        assert!(!graph.is_acyclic());
    }

    #[test]
    fn compact_removes_holes_and_fixes_owner_links() {
        let mut graph = ExecutionGraph::new(globals());
        let uid = NativeModuleUid::new(0, 0);
        let (call, inputs, outputs) = graph.add_native_module_call(uid, 1, 1);
        graph.node_mut(inputs[0]).deleted = false;
        let dead = graph.add_node(NodeKind::IntermediateValue);
        graph.node_mut(dead).deleted = true;
        graph.compact();
        assert_eq!(graph.nodes.len(), 3);
        match graph.node(NodeId(0)).kind {
            NodeKind::InputSlot { owner, .. } => assert_eq!(owner, NodeId(1)),
            _ => panic!("expected input slot first"),
        }
        let _ = (call, outputs);
    }

    #[test]
    fn output_labels_must_be_contiguous() {
        let mut graph = ExecutionGraph::new(globals());
        let constant = graph.add_node(NodeKind::Constant(ConstantValue::Real(1.0)));
        let out0 = graph.add_node(NodeKind::GraphOutput(0));
        let out2 = graph.add_node(NodeKind::GraphOutput(2));
        graph.add_edge(constant, out0);
        graph.add_edge(constant, out2);
        assert!(!graph.graph_outputs_are_contiguous());
    }
}
