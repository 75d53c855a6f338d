//! Binary instrument-file format (spec.md §6.2): one file per compiled
//! instrument, holding one serialized [`ExecutionGraph`] per
//! instrument-globals variant. Grounded on
//! `original_source/source/execution_graph/execution_graph.cpp`'s
//! save/load pair — a flat, versioned, little-endian record stream with no
//! external schema.

use crate::graph::{ConstantValue, ExecutionGraph, GlobalsRecord, Node, NodeId, NodeKind};
use crate::native::{NativeModuleUid, Registry};

const MAGIC: &[u8; 8] = b"wavelang";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("not a wavelang instrument file")]
    BadMagic,
    #[error("unsupported instrument file format version {0}")]
    UnsupportedVersion(u32),
    #[error("instrument file is truncated")]
    Truncated,
    #[error("invalid node-kind tag {0}")]
    InvalidNodeKind(u8),
    #[error("instrument file contains invalid utf-8")]
    InvalidUtf8,
    #[error("instrument file edge list references a graph edge the type lattice forbids")]
    IllegalEdge,
    #[error("instrument file's execution graph contains a cycle")]
    Cyclic,
    #[error("instrument file's graph outputs are not contiguous from 0")]
    NonContiguousOutputs,
    #[error("instrument file references a native-module call the registry cannot resolve")]
    UnknownNativeModule,
    #[error("instrument file contains a no-op native-module call")]
    NoopCallPresent,
}

type Result<T> = std::result::Result<T, SerializeError>;

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_bool(out: &mut Vec<u8>, v: bool) {
    out.push(v as u8);
}

fn write_string(out: &mut Vec<u8>, v: &str) {
    write_u32(out, v.len() as u32);
    out.extend_from_slice(v.as_bytes());
}

/// A cursor over a byte slice, tracking the current read offset and
/// failing with [`SerializeError::Truncated`] on short reads rather than
/// panicking — instrument files are untrusted input.
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.offset.checked_add(len).ok_or(SerializeError::Truncated)?;
        let slice = self.bytes.get(self.offset..end).ok_or(SerializeError::Truncated)?;
        self.offset = end;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| SerializeError::InvalidUtf8)
    }
}

fn node_kind_tag(kind: &NodeKind) -> u8 {
    match kind {
        NodeKind::Constant(ConstantValue::Real(_)) => 0,
        NodeKind::Constant(ConstantValue::Bool(_)) => 1,
        NodeKind::Constant(ConstantValue::String(_)) => 2,
        NodeKind::Constant(ConstantValue::RealArray(_)) => 3,
        NodeKind::NativeModuleCall(_) => 4,
        NodeKind::InputSlot { .. } => 5,
        NodeKind::OutputSlot { .. } => 6,
        NodeKind::GraphOutput(_) => 7,
        NodeKind::IntermediateValue => 8,
    }
}

fn write_node_kind(out: &mut Vec<u8>, kind: &NodeKind) {
    out.push(node_kind_tag(kind));
    match kind {
        NodeKind::Constant(ConstantValue::Real(v)) => write_f32(out, *v),
        NodeKind::Constant(ConstantValue::Bool(v)) => write_bool(out, *v),
        NodeKind::Constant(ConstantValue::String(v)) => write_string(out, v),
        NodeKind::Constant(ConstantValue::RealArray(values)) => {
            write_u32(out, values.len() as u32);
            for v in values {
                write_f32(out, *v);
            }
        }
        NodeKind::NativeModuleCall(uid) => write_u64(out, uid.0),
        NodeKind::InputSlot { owner, formal_index } | NodeKind::OutputSlot { owner, formal_index } => {
            write_u32(out, owner.0);
            write_u32(out, *formal_index as u32);
        }
        NodeKind::GraphOutput(label) => write_u32(out, *label),
        NodeKind::IntermediateValue => {}
    }
}

fn read_node_kind(reader: &mut Reader) -> Result<NodeKind> {
    let tag = reader.read_u8()?;
    let kind = match tag {
        0 => NodeKind::Constant(ConstantValue::Real(reader.read_f32()?)),
        1 => NodeKind::Constant(ConstantValue::Bool(reader.read_bool()?)),
        2 => NodeKind::Constant(ConstantValue::String(reader.read_string()?)),
        3 => {
            let len = reader.read_u32()? as usize;
            let mut values = Vec::with_capacity(len);
            for _ in 0..len {
                values.push(reader.read_f32()?);
            }
            NodeKind::Constant(ConstantValue::RealArray(values))
        }
        4 => NodeKind::NativeModuleCall(NativeModuleUid(reader.read_u64()?)),
        5 => NodeKind::InputSlot { owner: NodeId(reader.read_u32()?), formal_index: reader.read_u32()? as usize },
        6 => NodeKind::OutputSlot { owner: NodeId(reader.read_u32()?), formal_index: reader.read_u32()? as usize },
        7 => NodeKind::GraphOutput(reader.read_u32()?),
        8 => NodeKind::IntermediateValue,
        other => return Err(SerializeError::InvalidNodeKind(other)),
    };
    Ok(kind)
}

fn write_graph(out: &mut Vec<u8>, graph: &ExecutionGraph) {
    let globals = &graph.globals;
    write_u32(out, globals.max_voices);
    write_u32(out, globals.sample_rate);
    write_u32(out, globals.chunk_size);
    write_bool(out, globals.activate_fx_immediately);

    write_u32(out, graph.nodes.len() as u32);
    for node in &graph.nodes {
        write_node_kind(out, &node.kind);
    }

    let edges: Vec<(u32, u32)> = graph
        .nodes
        .iter()
        .enumerate()
        .flat_map(|(from, node)| node.outgoing.iter().map(move |to| (from as u32, to.0)))
        .collect();
    write_u32(out, edges.len() as u32);
    for (from, to) in edges {
        write_u32(out, from);
        write_u32(out, to);
    }
}

fn read_graph(reader: &mut Reader) -> Result<ExecutionGraph> {
    let globals = GlobalsRecord {
        max_voices: reader.read_u32()?,
        sample_rate: reader.read_u32()?,
        chunk_size: reader.read_u32()?,
        activate_fx_immediately: reader.read_bool()?,
    };
    let mut graph = ExecutionGraph::new(globals);

    let node_count = reader.read_u32()? as usize;
    for _ in 0..node_count {
        let kind = read_node_kind(reader)?;
        graph.nodes.push(Node { kind, incoming: Vec::new(), outgoing: Vec::new(), deleted: false });
    }

    let edge_count = reader.read_u32()? as usize;
    for _ in 0..edge_count {
        let from = NodeId(reader.read_u32()?);
        let to = NodeId(reader.read_u32()?);
        if from.0 as usize >= graph.nodes.len() || to.0 as usize >= graph.nodes.len() {
            return Err(SerializeError::Truncated);
        }
        graph.add_edge(from, to);
    }

    Ok(graph)
}

/// Serializes a set of per-variant execution graphs into the instrument
/// file format: `magic | version | variant_cnt | variant...`.
pub fn write_instrument(graphs: &[ExecutionGraph]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    write_u32(&mut out, FORMAT_VERSION);
    write_u32(&mut out, graphs.len() as u32);
    for graph in graphs {
        let mut compacted = graph.clone();
        compacted.compact();
        write_graph(&mut out, &compacted);
    }
    out
}

/// Parses an instrument file and validates every variant's execution graph
/// against the invariants spec.md §8.1 requires of a well-formed graph:
/// every edge is type-lattice-legal, the graph is acyclic, its outputs are
/// contiguous from `0`, and no surviving native-module call is the no-op
/// placeholder (optimization should have removed or replaced those).
pub fn read_instrument(bytes: &[u8], registry: &Registry) -> Result<Vec<ExecutionGraph>> {
    let mut reader = Reader::new(bytes);
    let magic = reader.take(MAGIC.len())?;
    if magic != MAGIC {
        return Err(SerializeError::BadMagic);
    }
    let version = reader.read_u32()?;
    if version != FORMAT_VERSION {
        return Err(SerializeError::UnsupportedVersion(version));
    }
    let variant_count = reader.read_u32()? as usize;
    let mut graphs = Vec::with_capacity(variant_count);
    for _ in 0..variant_count {
        let graph = read_graph(&mut reader)?;
        validate_graph(&graph, registry)?;
        graphs.push(graph);
    }
    Ok(graphs)
}

fn validate_graph(graph: &ExecutionGraph, registry: &Registry) -> Result<()> {
    if !graph.all_edges_legal() {
        return Err(SerializeError::IllegalEdge);
    }
    if !graph.is_acyclic() {
        return Err(SerializeError::Cyclic);
    }
    if !graph.graph_outputs_are_contiguous() {
        return Err(SerializeError::NonContiguousOutputs);
    }
    for node in &graph.nodes {
        if let NodeKind::NativeModuleCall(uid) = node.kind {
            if registry.get(uid).is_none() {
                return Err(SerializeError::UnknownNativeModule);
            }
            if registry.is_noop(uid) {
                return Err(SerializeError::NoopCallPresent);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::library_core;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        library_core::register(&mut registry).unwrap();
        registry.finalize().unwrap();
        registry
    }

    fn sample_graph() -> ExecutionGraph {
        let globals = GlobalsRecord { max_voices: 4, sample_rate: 48000, chunk_size: 64, activate_fx_immediately: false };
        let mut graph = ExecutionGraph::new(globals);
        let constant = graph.add_node(NodeKind::Constant(ConstantValue::Real(2.5)));
        let output = graph.add_node(NodeKind::GraphOutput(0));
        graph.add_edge(constant, output);
        graph
    }

    #[test]
    fn round_trips_a_simple_graph() {
        let graph = sample_graph();
        let bytes = write_instrument(&[graph.clone()]);
        let registry = registry();
        let loaded = read_instrument(&bytes, &registry).expect("well-formed instrument file");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].globals, graph.globals);
        assert_eq!(loaded[0].graph_outputs().len(), 1);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = write_instrument(&[sample_graph()]);
        bytes[0] = b'X';
        let registry = registry();
        assert_eq!(read_instrument(&bytes, &registry), Err(SerializeError::BadMagic));
    }

    #[test]
    fn rejects_truncated_file() {
        let bytes = write_instrument(&[sample_graph()]);
        let registry = registry();
        assert_eq!(read_instrument(&bytes[..bytes.len() - 2], &registry), Err(SerializeError::Truncated));
    }

    #[test]
    fn rejects_out_of_range_edge() {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        write_u32(&mut out, FORMAT_VERSION);
        write_u32(&mut out, 1);
        write_u32(&mut out, 4);
        write_u32(&mut out, 44100);
        write_u32(&mut out, 64);
        write_bool(&mut out, false);
        write_u32(&mut out, 1);
        write_node_kind(&mut out, &NodeKind::Constant(ConstantValue::Real(1.0)));
        write_u32(&mut out, 1);
        write_u32(&mut out, 0);
        write_u32(&mut out, 5);
        let registry = registry();
        assert_eq!(read_instrument(&out, &registry), Err(SerializeError::Truncated));
    }
}
