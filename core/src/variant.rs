//! Instrument-variant builder (spec.md §4.11): evaluates a resolved program
//! once per entry in the instrument-globals product, lowering `voice_main`
//! (and, if present, `fx_main` chained after it) into a fresh execution
//! graph. Grounded on `original_source/source/instrument/instrument.cpp`'s
//! "build one execution graph per variant, wiring voice outputs into fx
//! inputs" shape.

use crate::ast::source::{
    Argument, ArgumentDirection, BinaryOp, CallArgument, Declaration, DeclarationId, Expression, ExpressionKind,
    ModuleBody, Program, ScopeId, Statement, UnaryOp,
};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::globals::InstrumentGlobals;
use crate::graph::{ConstantValue, ExecutionGraph, GlobalsRecord, NodeId, NodeKind};
use crate::native::{NativeOperator, Registry};
use crate::types::{DataType, Mutability, Primitive, QualifiedType};
use std::collections::HashMap;

/// The `voice_main`/`fx_main` declarations found in the top-level file, if
/// any, already signature-validated.
#[derive(Debug, Default, Clone, Copy)]
pub struct EntryPoints {
    pub voice_main: Option<DeclarationId>,
    pub fx_main: Option<DeclarationId>,
}

/// Finds at most one `voice_main` and one `fx_main` among the declarations
/// owned directly by `top_level_scope` — never among its imports, since
/// entry points are restricted to the top-level file (spec.md §4.11).
pub fn extract_entry_points(program: &Program, top_level_scope: ScopeId, sink: &mut DiagnosticSink) -> EntryPoints {
    let mut entry = EntryPoints::default();
    for &decl_id in &program.scope(top_level_scope).owned {
        let Declaration::Module(module) = program.declaration(decl_id) else { continue };
        match module.name.as_str() {
            "voice_main" => {
                if entry.voice_main.is_some() {
                    sink.error(DiagnosticCode::EntryPointAmbiguous, "more than one voice_main in the top-level file", Some(module.span));
                } else {
                    entry.voice_main = Some(decl_id);
                }
            }
            "fx_main" => {
                if entry.fx_main.is_some() {
                    sink.error(DiagnosticCode::EntryPointAmbiguous, "more than one fx_main in the top-level file", Some(module.span));
                } else {
                    entry.fx_main = Some(decl_id);
                }
            }
            _ => {}
        }
    }
    if let Some(id) = entry.voice_main {
        validate_voice_main(program, id, sink);
    }
    if let Some(id) = entry.fx_main {
        validate_fx_main(program, id, sink);
    }
    if let (Some(voice_id), Some(fx_id)) = (entry.voice_main, entry.fx_main) {
        validate_voice_fx_compatibility(program, voice_id, fx_id, sink);
    }
    entry
}

fn returns_bool(module: &crate::ast::source::ModuleDeclaration) -> bool {
    module.return_type.map(|t| t.data_type.primitive == Primitive::Bool).unwrap_or(false)
}

fn warn_on_entry_point_initializer(argument: &crate::ast::source::Argument, sink: &mut DiagnosticSink) {
    if argument.initializer.is_some() {
        sink.warning(
            DiagnosticCode::EntryPointInitializerIgnored,
            format!("initializer on entry-point argument '{}' is ignored", argument.name),
            Some(argument.span),
        );
    }
}

fn validate_voice_main(program: &Program, id: DeclarationId, sink: &mut DiagnosticSink) {
    let Declaration::Module(module) = program.declaration(id) else { return };
    if !returns_bool(module) {
        sink.error(DiagnosticCode::EntryPointInvalidSignature, "voice_main must return bool", Some(module.span));
    }
    let mut out_count = 0usize;
    for argument in &module.arguments {
        warn_on_entry_point_initializer(argument, sink);
        if argument.direction != ArgumentDirection::Out || argument.data_type.data_type.primitive != Primitive::Real {
            sink.error(
                DiagnosticCode::EntryPointInvalidSignature,
                "voice_main arguments must all be real-typed out-arguments",
                Some(argument.span),
            );
        } else {
            out_count += 1;
        }
    }
    if out_count == 0 {
        sink.error(DiagnosticCode::EntryPointInvalidSignature, "voice_main must have at least one out-argument", Some(module.span));
    }
}

fn validate_fx_main(program: &Program, id: DeclarationId, sink: &mut DiagnosticSink) {
    let Declaration::Module(module) = program.declaration(id) else { return };
    if !returns_bool(module) {
        sink.error(DiagnosticCode::EntryPointInvalidSignature, "fx_main must return bool", Some(module.span));
    }
    let mut seen_out = false;
    for argument in &module.arguments {
        warn_on_entry_point_initializer(argument, sink);
        if argument.data_type.data_type.primitive != Primitive::Real {
            sink.error(DiagnosticCode::EntryPointInvalidSignature, "fx_main arguments must be real-typed", Some(argument.span));
            continue;
        }
        match argument.direction {
            ArgumentDirection::In if !seen_out => {}
            ArgumentDirection::Out => seen_out = true,
            ArgumentDirection::In => {
                sink.error(
                    DiagnosticCode::EntryPointInvalidSignature,
                    "fx_main in-arguments must precede all out-arguments",
                    Some(argument.span),
                );
            }
        }
    }
}

fn validate_voice_fx_compatibility(program: &Program, voice_id: DeclarationId, fx_id: DeclarationId, sink: &mut DiagnosticSink) {
    let (Declaration::Module(voice), Declaration::Module(fx)) = (program.declaration(voice_id), program.declaration(fx_id)) else { return };
    let voice_outs = voice.arguments.iter().filter(|a| a.direction == ArgumentDirection::Out).count();
    let fx_ins = fx.arguments.iter().filter(|a| a.direction == ArgumentDirection::In).count();
    if voice_outs != fx_ins {
        sink.error(
            DiagnosticCode::EntryPointIncompatibleVoiceFx,
            "fx_main's in-arguments must correspond 1:1 to voice_main's out-arguments",
            Some(fx.span),
        );
    }
}

fn real_variable() -> QualifiedType {
    QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Variable)
}

/// Maps a module declaration to the synthesized placeholder declarations
/// standing in for its formal arguments, in declaration order (see
/// `crate::ast::builder`'s `declare_module`).
fn argument_decls_by_module(program: &Program) -> HashMap<DeclarationId, Vec<DeclarationId>> {
    let mut indexed: HashMap<DeclarationId, Vec<(usize, DeclarationId)>> = HashMap::new();
    for (&arg_decl, &(module_decl, index)) in &program.argument_owners {
        indexed.entry(module_decl).or_default().push((index, arg_decl));
    }
    indexed
        .into_iter()
        .map(|(module_decl, mut pairs)| {
            pairs.sort_by_key(|(index, _)| *index);
            (module_decl, pairs.into_iter().map(|(_, decl)| decl).collect())
        })
        .collect()
}

fn binary_operator(op: BinaryOp) -> NativeOperator {
    match op {
        BinaryOp::Add => NativeOperator::Add,
        BinaryOp::Sub => NativeOperator::Sub,
        BinaryOp::Mul => NativeOperator::Mul,
        BinaryOp::Div => NativeOperator::Div,
        BinaryOp::Mod => NativeOperator::Mod,
        BinaryOp::Eq => NativeOperator::Eq,
        BinaryOp::Neq => NativeOperator::Neq,
        BinaryOp::Lt => NativeOperator::Lt,
        BinaryOp::Gt => NativeOperator::Gt,
        BinaryOp::Le => NativeOperator::Le,
        BinaryOp::Ge => NativeOperator::Ge,
        BinaryOp::And => NativeOperator::And,
        BinaryOp::Or => NativeOperator::Or,
    }
}

/// Binds `voice_main`'s body scope into a nested-block key, mirroring
/// `crate::ast::builder`'s convention of keying an `If`/`For`/`Block`
/// statement's inner scope as `DeclarationId(u32::MAX - scope.0)`.
fn nested_body_key(scope: ScopeId) -> DeclarationId {
    DeclarationId(u32::MAX - scope.0)
}

fn try_const_bool(program: &Program, expr: &Expression) -> Option<bool> {
    match &expr.kind {
        ExpressionKind::LiteralBool(v) => Some(*v),
        ExpressionKind::Unary { op: UnaryOp::Not, operand } => try_const_bool(program, operand).map(|v| !v),
        ExpressionKind::Identifier(_) => {
            let decl = expr.resolved_decl?;
            match program.declaration(decl) {
                Declaration::Value(v) => try_const_bool(program, v.initializer.as_ref()?),
                _ => None,
            }
        }
        _ => None,
    }
}

fn try_const_real(program: &Program, expr: &Expression) -> Option<f32> {
    match &expr.kind {
        ExpressionKind::LiteralReal(v) => Some(*v),
        ExpressionKind::Unary { op: UnaryOp::Neg, operand } => try_const_real(program, operand).map(|v| -v),
        ExpressionKind::Identifier(_) => {
            let decl = expr.resolved_decl?;
            match program.declaration(decl) {
                Declaration::Value(v) => try_const_real(program, v.initializer.as_ref()?),
                _ => None,
            }
        }
        _ => None,
    }
}

fn try_const_real_array(program: &Program, expr: &Expression) -> Option<Vec<f32>> {
    match &expr.kind {
        ExpressionKind::ArrayLiteral(elements) => elements.iter().map(|e| try_const_real(program, e)).collect(),
        ExpressionKind::Identifier(_) => {
            let decl = expr.resolved_decl?;
            match program.declaration(decl) {
                Declaration::Value(v) => try_const_real_array(program, v.initializer.as_ref()?),
                _ => None,
            }
        }
        _ => None,
    }
}

/// A lowering pass's environment: the graph node currently carrying an
/// identifier's value. Fresh per module-body invocation (the execution
/// graph has no call stack, so every call to a user-defined module is
/// inlined at its call site).
type Env = HashMap<DeclarationId, NodeId>;

/// Deepest chain of inlined user-module calls allowed before lowering gives
/// up and reports `CallDepthExceeded`, rather than recursing until the host
/// stack overflows (spec.md §7). Every user-defined module call is inlined
/// at its call site — there is no call/return node kind to break a
/// self-/mutually-recursive chain at runtime, so this has to be caught here.
const MAX_CALL_DEPTH: usize = 256;

struct Lowering<'a> {
    program: &'a Program,
    registry: &'a Registry,
    graph: &'a mut ExecutionGraph,
    sink: &'a mut DiagnosticSink,
    argument_decls: HashMap<DeclarationId, Vec<DeclarationId>>,
    depth: usize,
}

impl<'a> Lowering<'a> {
    fn zero_constant(&mut self, qualified: QualifiedType) -> NodeId {
        let value = match qualified.data_type.primitive {
            _ if qualified.data_type.is_array => ConstantValue::RealArray(Vec::new()),
            Primitive::Real => ConstantValue::Real(0.0),
            Primitive::Bool => ConstantValue::Bool(false),
            Primitive::String => ConstantValue::String(String::new()),
        };
        self.graph.add_node(NodeKind::Constant(value))
    }

    fn lower_nested(&mut self, scope: ScopeId, env: &mut Env) {
        let key = nested_body_key(scope);
        if let Some(block) = self.program.bodies.get(&key) {
            let statements = block.statements.clone();
            for stmt in &statements {
                self.lower_statement(stmt, env);
            }
        }
    }

    fn lower_value_decl(&mut self, decl: DeclarationId, env: &mut Env) -> NodeId {
        if let Some(&node) = env.get(&decl) {
            return node;
        }
        let node = match self.program.declaration(decl) {
            Declaration::Value(v) => match v.initializer.clone() {
                Some(init) => self.lower_expr(&init, env),
                None => self.zero_constant(v.data_type),
            },
            _ => self.zero_constant(real_variable()),
        };
        env.insert(decl, node);
        node
    }

    fn emit_operator_call(&mut self, operator: NativeOperator, values: &[NodeId]) -> NodeId {
        let uid = self
            .registry
            .operator_module(operator)
            .unwrap_or_else(|| panic!("operator {operator:?} not registered"))
            .uid;
        let (_, inputs, outputs) = self.graph.add_native_module_call(uid, values.len(), 1);
        for (&slot, &value) in inputs.iter().zip(values) {
            self.graph.add_edge(value, slot);
        }
        outputs[0]
    }

    fn lower_expr(&mut self, expr: &Expression, env: &mut Env) -> NodeId {
        match &expr.kind {
            ExpressionKind::LiteralReal(v) => self.graph.add_node(NodeKind::Constant(ConstantValue::Real(*v))),
            ExpressionKind::LiteralBool(v) => self.graph.add_node(NodeKind::Constant(ConstantValue::Bool(*v))),
            ExpressionKind::LiteralString(v) => self.graph.add_node(NodeKind::Constant(ConstantValue::String(v.clone()))),
            ExpressionKind::Identifier(_) => match expr.resolved_decl {
                Some(decl) => self.lower_value_decl(decl, env),
                None => self.zero_constant(expr.resolved_type.unwrap_or_else(real_variable)),
            },
            ExpressionKind::ArrayLiteral(elements) => {
                let values: Option<Vec<f32>> = elements.iter().map(|e| try_const_real(self.program, e)).collect();
                match values {
                    Some(values) => self.graph.add_node(NodeKind::Constant(ConstantValue::RealArray(values))),
                    None => {
                        self.sink.error(DiagnosticCode::TypeMismatch, "array literal elements must be compile-time constant", Some(expr.span));
                        self.zero_constant(expr.resolved_type.unwrap_or_else(real_variable))
                    }
                }
            }
            ExpressionKind::Unary { op, operand } => {
                let value = self.lower_expr(operand, env);
                let operator = match op {
                    UnaryOp::Neg => NativeOperator::Neg,
                    UnaryOp::Not => NativeOperator::Not,
                };
                self.emit_operator_call(operator, &[value])
            }
            ExpressionKind::Binary { op, lhs, rhs } => {
                let l = self.lower_expr(lhs, env);
                let r = self.lower_expr(rhs, env);
                self.emit_operator_call(binary_operator(*op), &[l, r])
            }
            ExpressionKind::Assign { target, value } => {
                let resolved = self.lower_expr(value, env);
                if let (ExpressionKind::Identifier(_), Some(decl)) = (&target.kind, target.resolved_decl) {
                    env.insert(decl, resolved);
                } else {
                    self.sink.error(DiagnosticCode::TypeMismatch, "assignment target is not a legal l-value", Some(target.span));
                }
                resolved
            }
            ExpressionKind::Subscript { base, index } => {
                let base_value = self.lower_expr(base, env);
                let index_value = self.lower_expr(index, env);
                self.emit_operator_call(NativeOperator::Subscript, &[base_value, index_value])
            }
            ExpressionKind::Call { arguments, .. } => match expr.resolved_decl {
                Some(decl) => {
                    let outputs = self.lower_call(decl, arguments, env);
                    outputs.into_iter().next().unwrap_or_else(|| self.zero_constant(expr.resolved_type.unwrap_or_else(real_variable)))
                }
                None => self.zero_constant(expr.resolved_type.unwrap_or_else(real_variable)),
            },
        }
    }

    /// Lowers a call to `callee` evaluated in the caller's `env`, binding
    /// each in-argument expression there and writing each out-argument's
    /// final value back into the caller's l-value bindings. Returns the
    /// callee's out-argument values in declaration order.
    fn lower_call(&mut self, callee: DeclarationId, call_args: &[CallArgument], env: &mut Env) -> Vec<NodeId> {
        let Declaration::Module(module) = self.program.declaration(callee) else { return Vec::new() };
        let arguments = module.arguments.clone();
        let body = module.body.clone();

        let mut bound: Vec<Option<&CallArgument>> = vec![None; arguments.len()];
        let mut next_positional = 0usize;
        for arg in call_args {
            let index = match &arg.name {
                Some(name) => arguments.iter().position(|f| &f.name == name),
                None => {
                    let i = next_positional;
                    next_positional += 1;
                    Some(i)
                }
            };
            if let Some(i) = index {
                if i < bound.len() {
                    bound[i] = Some(arg);
                }
            }
        }

        let mut in_values = Vec::new();
        let mut out_targets: Vec<Option<DeclarationId>> = Vec::new();
        for (i, formal) in arguments.iter().enumerate() {
            match formal.direction {
                ArgumentDirection::In => {
                    let value = match bound[i] {
                        Some(call_arg) => self.lower_expr(&call_arg.value, env),
                        None => match &formal.initializer {
                            Some(init) => self.lower_expr(init, env),
                            None => self.zero_constant(formal.data_type),
                        },
                    };
                    in_values.push(value);
                }
                ArgumentDirection::Out => {
                    let target = bound[i].and_then(|call_arg| match &call_arg.value.kind {
                        ExpressionKind::Identifier(_) => call_arg.value.resolved_decl,
                        _ => None,
                    });
                    out_targets.push(target);
                }
            }
        }

        let outputs = match body {
            ModuleBody::Native { .. } => match self.program.native_bindings.get(&callee).copied() {
                Some(uid) => {
                    let (_, inputs, outputs) = self.graph.add_native_module_call(uid, in_values.len(), out_targets.len());
                    for (&slot, &value) in inputs.iter().zip(in_values.iter()) {
                        self.graph.add_edge(value, slot);
                    }
                    outputs
                }
                None => {
                    self.sink.error(
                        DiagnosticCode::InvalidNativeModuleImplementation,
                        "native module declaration has no registry binding",
                        None,
                    );
                    out_targets.iter().map(|_| self.zero_constant(real_variable())).collect()
                }
            },
            ModuleBody::Scope(_) => self.run_module_body(callee, &in_values),
        };

        for (&value, target) in outputs.iter().zip(out_targets.iter()) {
            if let Some(decl) = target {
                env.insert(*decl, value);
            }
        }
        outputs
    }

    /// Inlines a user-defined module body: seeds a fresh environment with
    /// `in_values` bound to the module's in-argument placeholders, runs its
    /// statements, then harvests the final value of each out-argument
    /// placeholder in declaration order.
    fn run_module_body(&mut self, module_decl: DeclarationId, in_values: &[NodeId]) -> Vec<NodeId> {
        let Declaration::Module(module) = self.program.declaration(module_decl) else { return Vec::new() };
        let arguments = module.arguments.clone();

        if self.depth >= MAX_CALL_DEPTH {
            self.sink.error(
                DiagnosticCode::CallDepthExceeded,
                format!("module '{}' exceeded the maximum call nesting depth of {}", module.name, MAX_CALL_DEPTH),
                Some(module.span),
            );
            return arguments
                .iter()
                .filter(|a| a.direction == ArgumentDirection::Out)
                .map(|formal| self.zero_constant(formal.data_type))
                .collect();
        }
        self.depth += 1;
        let outputs = self.run_module_body_inner(module_decl, &arguments, in_values);
        self.depth -= 1;
        outputs
    }

    fn run_module_body_inner(
        &mut self,
        module_decl: DeclarationId,
        arguments: &[Argument],
        in_values: &[NodeId],
    ) -> Vec<NodeId> {
        let arg_decls = self.argument_decls.get(&module_decl).cloned().unwrap_or_default();

        let mut call_env = Env::new();
        let mut in_index = 0usize;
        for (i, formal) in arguments.iter().enumerate() {
            if formal.direction == ArgumentDirection::In {
                if let (Some(&decl), Some(&value)) = (arg_decls.get(i), in_values.get(in_index)) {
                    call_env.insert(decl, value);
                }
                in_index += 1;
            }
        }

        if let Some(block) = self.program.bodies.get(&module_decl) {
            let statements = block.statements.clone();
            for stmt in &statements {
                self.lower_statement(&stmt, &mut call_env);
            }
        }

        arguments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.direction == ArgumentDirection::Out)
            .map(|(i, formal)| {
                let decl = arg_decls.get(i).copied();
                match decl.and_then(|d| call_env.get(&d).copied()) {
                    Some(node) => node,
                    None => self.zero_constant(formal.data_type),
                }
            })
            .collect()
    }

    fn lower_statement(&mut self, stmt: &Statement, env: &mut Env) {
        match stmt {
            Statement::ValueDecl(id) => {
                self.lower_value_decl(*id, env);
            }
            Statement::Expr(e) => {
                self.lower_expr(e, env);
            }
            Statement::If { condition, then_scope, else_scope } => match try_const_bool(self.program, condition) {
                Some(true) => self.lower_nested(*then_scope, env),
                Some(false) => {
                    if let Some(scope) = else_scope {
                        self.lower_nested(*scope, env);
                    }
                }
                None => {
                    self.sink.error(DiagnosticCode::TypeMismatch, "if-condition must be a compile-time constant", Some(condition.span));
                }
            },
            Statement::For { iterable, body_scope, .. } => {
                let Some(values) = try_const_real_array(self.program, iterable) else {
                    self.sink.error(DiagnosticCode::TypeMismatch, "for-loop range must be a compile-time-constant array", Some(iterable.span));
                    return;
                };
                let Some(&binding_decl) = self.program.for_bindings.get(body_scope) else { return };
                for value in values {
                    let node = self.graph.add_node(NodeKind::Constant(ConstantValue::Real(value)));
                    env.insert(binding_decl, node);
                    self.lower_nested(*body_scope, env);
                }
            }
            Statement::Return(_) => {
                // Entry points return a validity bool consumed by the
                // runtime's voice-activation logic, not by dataflow wiring;
                // ordinary module bodies don't use a dataflow-relevant
                // return value at all (their outputs are out-arguments).
            }
            Statement::Block(scope) => self.lower_nested(*scope, env),
        }
    }
}

/// Builds one execution graph for one point in the globals product: lowers
/// `voice_main`'s body, then — if `fx_main` is present — lowers it too,
/// feeding `voice_main`'s out-arguments into `fx_main`'s in-arguments by
/// position. The surviving module's out-arguments become the graph's
/// outputs, labeled `0..N` in declaration order.
pub fn build_variant(
    program: &Program,
    registry: &Registry,
    entry_points: &EntryPoints,
    instrument_globals: &InstrumentGlobals,
    sample_rate: u32,
    sink: &mut DiagnosticSink,
) -> ExecutionGraph {
    let globals = GlobalsRecord {
        max_voices: instrument_globals.max_voices,
        sample_rate,
        chunk_size: instrument_globals.chunk_size,
        activate_fx_immediately: instrument_globals.activate_fx_immediately,
    };
    let mut graph = ExecutionGraph::new(globals);
    let argument_decls = argument_decls_by_module(program);
    let mut lowering = Lowering { program, registry, graph: &mut graph, sink, argument_decls, depth: 0 };

    let voice_outputs = match entry_points.voice_main {
        Some(decl) => lowering.run_module_body(decl, &[]),
        None => Vec::new(),
    };

    let final_outputs = match entry_points.fx_main {
        Some(decl) => lowering.run_module_body(decl, &voice_outputs),
        None => voice_outputs,
    };

    for (label, node) in final_outputs.into_iter().enumerate() {
        let output = graph.add_node(NodeKind::GraphOutput(label as u32));
        graph.add_edge(node, output);
    }
    graph
}

/// Builds one execution graph per entry in `instrument_globals`'s product
/// (spec.md §4.6/§4.11).
pub fn build_variants(
    program: &Program,
    registry: &Registry,
    entry_points: &EntryPoints,
    instrument_globals: &InstrumentGlobals,
    sink: &mut DiagnosticSink,
) -> Vec<ExecutionGraph> {
    instrument_globals
        .variants()
        .map(|sample_rate| build_variant(program, registry, entry_points, instrument_globals, sample_rate, sink))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::source::{ModuleBody, ModuleDeclaration, Visibility};
    use crate::native::library_core;
    use crate::span::Span;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.initialize();
        registry.begin_registration();
        library_core::register(&mut registry).unwrap();
        registry.finalize().unwrap();
        registry
    }

    /// Builds a minimal `voice_main(out real a, out real b) -> bool { a = 1.0; b = a + 2.0; return true; }`
    /// program by hand (bypassing the parser) and checks the lowered graph
    /// has two contiguous graph outputs fed by a folded `1.0`/`3.0`.
    #[test]
    fn voice_main_outputs_become_graph_outputs() {
        let mut program = Program::default();
        let scope = program.new_scope(None);
        program.root_scope = scope;

        let real_out = QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Variable);
        let arguments = vec![
            Argument { name: "a".to_string(), direction: ArgumentDirection::Out, data_type: real_out, initializer: None, span: Span::default() },
            Argument { name: "b".to_string(), direction: ArgumentDirection::Out, data_type: real_out, initializer: None, span: Span::default() },
        ];
        let body_scope = program.new_scope(Some(scope));
        let mut argument_decls = Vec::new();
        for argument in &arguments {
            let decl = program.add_declaration(
                body_scope,
                Declaration::Value(crate::ast::source::ValueDeclaration {
                    name: argument.name.clone(),
                    visibility: Visibility::Private,
                    data_type: argument.data_type,
                    initializer: None,
                    span: Span::default(),
                }),
            );
            argument_decls.push(decl);
        }

        let module_decl = program.add_declaration(
            scope,
            Declaration::Module(ModuleDeclaration {
                name: "voice_main".to_string(),
                visibility: Visibility::Public,
                return_type: Some(QualifiedType::new(DataType::scalar(Primitive::Bool), Mutability::Variable)),
                arguments,
                body: ModuleBody::Scope(body_scope),
                span: Span::default(),
            }),
        );
        for (index, decl) in argument_decls.iter().enumerate() {
            program.argument_owners.insert(*decl, (module_decl, index));
        }

        let a_target = Expression {
            kind: ExpressionKind::Identifier("a".to_string()),
            resolved_type: Some(real_out),
            resolved_decl: Some(argument_decls[0]),
            span: Span::default(),
        };
        let b_target = Expression {
            kind: ExpressionKind::Identifier("b".to_string()),
            resolved_type: Some(real_out),
            resolved_decl: Some(argument_decls[1]),
            span: Span::default(),
        };
        let one = Expression { kind: ExpressionKind::LiteralReal(1.0), resolved_type: None, resolved_decl: None, span: Span::default() };
        let two = Expression { kind: ExpressionKind::LiteralReal(2.0), resolved_type: None, resolved_decl: None, span: Span::default() };
        let a_read = Expression {
            kind: ExpressionKind::Identifier("a".to_string()),
            resolved_type: Some(real_out),
            resolved_decl: Some(argument_decls[0]),
            span: Span::default(),
        };

        let assign_a = Statement::Expr(Expression {
            kind: ExpressionKind::Assign { target: Box::new(a_target), value: Box::new(one) },
            resolved_type: None,
            resolved_decl: None,
            span: Span::default(),
        });
        let sum = Expression {
            kind: ExpressionKind::Binary { op: BinaryOp::Add, lhs: Box::new(a_read), rhs: Box::new(two) },
            resolved_type: None,
            resolved_decl: None,
            span: Span::default(),
        };
        let assign_b = Statement::Expr(Expression {
            kind: ExpressionKind::Assign { target: Box::new(b_target), value: Box::new(sum) },
            resolved_type: None,
            resolved_decl: None,
            span: Span::default(),
        });

        program.bodies.insert(module_decl, crate::ast::source::Block { scope: body_scope, statements: vec![assign_a, assign_b] });

        let registry = registry();
        let mut sink = DiagnosticSink::default();
        let entry = EntryPoints { voice_main: Some(module_decl), fx_main: None };
        let globals = InstrumentGlobals { max_voices: 1, sample_rates: vec![44100], chunk_size: 64, activate_fx_immediately: false };

        let graph = build_variant(&program, &registry, &entry, &globals, 44100, &mut sink);
        assert!(sink.is_ok());
        assert_eq!(graph.graph_outputs().len(), 2);
        assert!(graph.graph_outputs_are_contiguous());
    }
}
