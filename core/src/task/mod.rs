//! The task graph: a linear-indexed collection of task nodes lowered from
//! an optimized execution graph, with buffers allocated (spec.md §3.7).

pub mod builder;

use crate::graph::ConstantValue;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferIndex(pub u32);

/// The closed-set task function a task node dispatches to at runtime,
/// named the way the original engine names its task-function table entries
/// (e.g. `add_buffer_buffer`, `neg_bufferio`) — module name plus a suffix
/// built from each formal argument's constant/buffer/inout classification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskFunctionId(pub String);

/// Where one formal argument of a task's underlying native-module call
/// ultimately binds, and its position within that list (spec.md §4.10's
/// "task-mapping arrays").
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgumentBinding {
    Constant(usize),
    InputBuffer(usize),
    OutputBuffer(usize),
    InoutBuffer(usize),
}

#[derive(Debug, Clone)]
pub struct TaskNode {
    pub function: TaskFunctionId,
    pub constant_inputs: Vec<ConstantValue>,
    pub buffer_inputs: Vec<BufferIndex>,
    pub buffer_outputs: Vec<BufferIndex>,
    pub buffer_inout: Vec<BufferIndex>,
    /// One entry per formal argument of the underlying native module, in
    /// declaration order.
    pub argument_bindings: Vec<ArgumentBinding>,
}

#[derive(Debug, Clone)]
pub struct TaskGraph {
    pub tasks: Vec<TaskNode>,
    pub buffer_count: u32,
    /// Upper bound on concurrently-live buffers (spec.md §4.10's "hook for
    /// the executor's buffer-pool sizing"); see `builder::compute_max_buffer_concurrency`.
    pub max_buffer_concurrency: u32,
}
