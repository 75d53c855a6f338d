//! Two-pass AST construction (spec.md §4.7): a declaration pass turns the
//! parse tree into scopes full of named, signature-complete declarations
//! (bodies parsed into raw expression/statement trees but not yet
//! resolved); a definition pass then resolves every identifier reference,
//! picks overloads, and type-checks.

use super::source::*;
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::parser::{grammar, Grammar, NodeId, ParseTree, ParseTreeNodeKind};
use crate::source::SourceHandle;
use crate::span::Span;
use crate::types::{DataType, Mutability, Primitive, QualifiedType};

struct Pass1<'a> {
    grammar: &'a Grammar,
    tree: &'a ParseTree,
    file: SourceHandle,
    sink: &'a mut DiagnosticSink,
}

/// Runs the declaration pass over one file's parse tree, adding its
/// top-level declarations into `program` under a fresh root scope. Returns
/// that scope so the caller (the source manager / import resolver) can
/// record it against the file.
pub fn declare_file(
    program: &mut Program,
    file: SourceHandle,
    tree: &ParseTree,
    sink: &mut DiagnosticSink,
) -> ScopeId {
    let grammar = grammar();
    let root = program.new_scope(None);
    let mut pass1 = Pass1 { grammar, tree, file, sink };
    if let Some(root_node) = tree.root {
        let children = tree.children(root_node);
        // Program -> ImportList TopLevelDeclList
        if children.len() == 2 {
            pass1.declare_top_level_list(program, root, children[1]);
        }
    }
    root
}

impl<'a> Pass1<'a> {
    fn tag_of(&self, node: NodeId) -> Option<&'static str> {
        match &self.tree.node(node).kind {
            ParseTreeNodeKind::Nonterminal { production, .. } => Some(self.grammar.productions[*production].tag),
            ParseTreeNodeKind::Terminal(_) => None,
        }
    }

    fn token_text(&self, node: NodeId) -> String {
        match &self.tree.node(node).kind {
            ParseTreeNodeKind::Terminal(token) => token.text.clone(),
            ParseTreeNodeKind::Nonterminal { .. } => String::new(),
        }
    }

    fn declare_top_level_list(&mut self, program: &mut Program, scope: ScopeId, mut node: NodeId) {
        let mut items = Vec::new();
        loop {
            match self.tag_of(node) {
                Some("top_level_list_cons") => {
                    let children = self.tree.children(node);
                    items.push(children[1]);
                    node = children[0];
                }
                _ => break,
            }
        }
        items.reverse();
        for item in items {
            self.declare_top_level_decl(program, scope, item);
        }
    }

    fn declare_top_level_decl(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) {
        let children = self.tree.children(node);
        let inner = children[0];
        match self.tag_of(node) {
            Some("top_level_namespace") => self.declare_namespace(program, scope, inner),
            Some("top_level_module") => self.declare_module(program, scope, inner),
            Some("top_level_value") => self.declare_value(program, scope, inner),
            Some("top_level_globals") => {} // handled by crate::globals directly on the parse tree
            _ => {}
        }
    }

    fn declare_namespace(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) {
        let children = self.tree.children(node);
        let name = self.token_text(children[1]);
        let span = self.tree.node(node).span;
        let inner_scope = program.new_scope(Some(scope));
        self.declare_top_level_list(program, inner_scope, children[3]);
        program.add_declaration(
            scope,
            Declaration::Namespace(NamespaceDeclaration { name, visibility: Visibility::Public, scope: inner_scope, span }),
        );
    }

    fn declare_value(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) {
        let children = self.tree.children(node);
        let data_type = self.build_type_spec(children[0]);
        let name = self.token_text(children[1]);
        let span = self.tree.node(node).span;
        let initializer = self.build_init_opt(children[2]);
        let decl = program.add_declaration(
            scope,
            Declaration::Value(ValueDeclaration { name, visibility: Visibility::Public, data_type, initializer, span }),
        );
        program.value_scopes.insert(decl, scope);
    }

    /// Every user-written `ModuleDecl` has a block body (`module_decl_defined`
    /// is the grammar's only production for it); native modules are never
    /// declared in source, only synthesized from the registry (see
    /// `crate::native::declare_into_program`).
    fn declare_module(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) {
        let children = self.tree.children(node);
        let return_type = self.build_type_spec_opt_void(children[1]);
        let name = self.token_text(children[2]);
        let arguments = self.build_param_list_opt(children[4]);
        let span = self.tree.node(node).span;
        let block_node = children[6];
        let body_scope = program.new_scope(Some(scope));

        // Give every parameter a placeholder value declaration in the body
        // scope so identifiers referencing it resolve through the ordinary
        // `Program::resolve` path; `argument_owners` records which formal
        // index each placeholder stands for.
        let mut argument_decls = Vec::with_capacity(arguments.len());
        for argument in &arguments {
            let decl = program.add_declaration(
                body_scope,
                Declaration::Value(ValueDeclaration {
                    name: argument.name.clone(),
                    visibility: Visibility::Private,
                    data_type: argument.data_type,
                    initializer: None,
                    span: argument.span,
                }),
            );
            argument_decls.push(decl);
        }

        let statements = self.build_block_statements(program, body_scope, block_node);
        let decl = program.add_declaration(
            scope,
            Declaration::Module(ModuleDeclaration {
                name,
                visibility: Visibility::Public,
                return_type,
                arguments,
                body: ModuleBody::Scope(body_scope),
                span,
            }),
        );
        for (index, arg_decl) in argument_decls.into_iter().enumerate() {
            program.argument_owners.insert(arg_decl, (decl, index));
        }
        program.bodies.insert(decl, Block { scope: body_scope, statements });
    }

    fn build_type_spec_opt_void(&mut self, node: NodeId) -> Option<QualifiedType> {
        let children = self.tree.children(node);
        let prim_node = children[1];
        if self.tag_of(prim_node) == Some("prim_void") {
            return None;
        }
        Some(self.build_type_spec(node))
    }

    fn build_type_spec(&mut self, node: NodeId) -> QualifiedType {
        let children = self.tree.children(node);
        let is_const = self.tag_of(children[0]) == Some("const_opt_some");
        let prim_tag = self.tag_of(children[1]).unwrap_or("prim_real");
        let primitive = match prim_tag {
            "prim_bool" => Primitive::Bool,
            "prim_string" => Primitive::String,
            "prim_void" => Primitive::Real, // unreachable for real declarations; callers check void separately
            _ => Primitive::Real,
        };
        let is_array = self.tag_of(children[2]) == Some("array_opt_some");
        let mutability = if is_const || primitive.is_constant_only() { Mutability::Constant } else { Mutability::Variable };
        QualifiedType::new(DataType { primitive, is_array, upsample_factor: 1 }, mutability)
    }

    fn build_init_opt(&mut self, node: NodeId) -> Option<Expression> {
        if self.tag_of(node) == Some("init_opt_some") {
            let children = self.tree.children(node);
            Some(self.build_expr(children[1]))
        } else {
            None
        }
    }

    fn build_param_list_opt(&mut self, node: NodeId) -> Vec<Argument> {
        if self.tag_of(node) == Some("param_list_opt_none") {
            return Vec::new();
        }
        let list_node = self.tree.children(node)[0];
        let mut items = Vec::new();
        let mut cur = list_node;
        loop {
            match self.tag_of(cur) {
                Some("param_list_cons") => {
                    let children = self.tree.children(cur);
                    items.push(children[2]);
                    cur = children[0];
                }
                Some("param_list_one") => {
                    items.push(self.tree.children(cur)[0]);
                    break;
                }
                _ => break,
            }
        }
        items.reverse();
        items.into_iter().map(|n| self.build_param(n)).collect()
    }

    fn build_param(&mut self, node: NodeId) -> Argument {
        let children = self.tree.children(node);
        let span = self.tree.node(node).span;
        match self.tag_of(node) {
            Some("param_out") => {
                let data_type = self.build_type_spec(children[1]);
                let name = self.token_text(children[2]);
                Argument { name, direction: ArgumentDirection::Out, data_type, initializer: None, span }
            }
            _ => {
                let data_type = self.build_type_spec(children[0]);
                let name = self.token_text(children[1]);
                let initializer = self.build_init_opt(children[2]);
                Argument { name, direction: ArgumentDirection::In, data_type, initializer, span }
            }
        }
    }

    fn build_block_statements(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) -> Vec<Statement> {
        let children = self.tree.children(node);
        let mut items = Vec::new();
        let mut cur = children[1];
        loop {
            match self.tag_of(cur) {
                Some("stmt_list_cons") => {
                    let c = self.tree.children(cur);
                    items.push(c[1]);
                    cur = c[0];
                }
                _ => break,
            }
        }
        items.reverse();
        items.into_iter().map(|n| self.build_stmt(program, scope, n)).collect()
    }

    fn build_stmt(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) -> Statement {
        let children = self.tree.children(node);
        let inner = children[0];
        match self.tag_of(node) {
            Some("stmt_value_decl") => {
                let before = program.declarations.len();
                self.declare_value(program, scope, inner);
                Statement::ValueDecl(DeclarationId(before as u32))
            }
            Some("stmt_expr") => {
                let expr_children = self.tree.children(inner);
                Statement::Expr(self.build_expr(expr_children[0]))
            }
            Some("stmt_if") => self.build_if(program, scope, inner),
            Some("stmt_for") => self.build_for(program, scope, inner),
            Some("stmt_return") => {
                let return_children = self.tree.children(inner);
                let expr_opt = return_children[1];
                let value = if self.tag_of(expr_opt) == Some("expr_opt_some") {
                    Some(self.build_expr(self.tree.children(expr_opt)[0]))
                } else {
                    None
                };
                Statement::Return(value)
            }
            Some("stmt_block") => {
                let inner_scope = program.new_scope(Some(scope));
                let statements = self.build_block_statements(program, inner_scope, inner);
                program.bodies.insert(DeclarationId(u32::MAX - inner_scope.0), Block { scope: inner_scope, statements });
                Statement::Block(inner_scope)
            }
            _ => Statement::Expr(Expression {
                kind: ExpressionKind::LiteralBool(false),
                resolved_type: None,
                resolved_decl: None,
                span: self.tree.node(node).span,
            }),
        }
    }

    fn build_if(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) -> Statement {
        let children = self.tree.children(node);
        let condition = self.build_expr(children[2]);
        let then_scope = program.new_scope(Some(scope));
        let then_statements = self.build_block_statements(program, then_scope, children[4]);
        program.bodies.insert(DeclarationId(u32::MAX - then_scope.0), Block { scope: then_scope, statements: then_statements });

        let else_opt = children[5];
        let else_scope = if self.tag_of(else_opt) == Some("else_opt_some") {
            let else_block_node = self.tree.children(else_opt)[1];
            let else_scope = program.new_scope(Some(scope));
            let else_statements = self.build_block_statements(program, else_scope, else_block_node);
            program.bodies.insert(DeclarationId(u32::MAX - else_scope.0), Block { scope: else_scope, statements: else_statements });
            Some(else_scope)
        } else {
            None
        };

        Statement::If { condition, then_scope, else_scope }
    }

    fn build_for(&mut self, program: &mut Program, scope: ScopeId, node: NodeId) -> Statement {
        let children = self.tree.children(node);
        let binding = self.token_text(children[2]);
        let iterable = self.build_expr(children[4]);
        let body_scope = program.new_scope(Some(scope));
        let statements = self.build_block_statements(program, body_scope, children[6]);
        program.bodies.insert(DeclarationId(u32::MAX - body_scope.0), Block { scope: body_scope, statements });
        Statement::For { binding, iterable, body_scope }
    }

    fn build_expr(&mut self, node: NodeId) -> Expression {
        let canonical = self.tree.skip_passthrough(self.grammar, node);
        let span = self.tree.node(canonical).span;
        let tag = self.tag_of(canonical);
        let children = self.tree.children(canonical);

        let kind = match tag {
            Some("primary_identifier") => ExpressionKind::Identifier(self.token_text(children[0])),
            Some("primary_real") => {
                let value = match &self.tree.node(children[0]).kind {
                    ParseTreeNodeKind::Terminal(token) => token.real_value.unwrap_or(0.0),
                    _ => 0.0,
                };
                ExpressionKind::LiteralReal(value)
            }
            Some("primary_bool") => {
                let value = match &self.tree.node(children[0]).kind {
                    ParseTreeNodeKind::Terminal(token) => token.bool_value.unwrap_or(false),
                    _ => false,
                };
                ExpressionKind::LiteralBool(value)
            }
            Some("primary_string") => {
                ExpressionKind::LiteralString(crate::lexer::decode_string_literal(&self.token_text(children[0])))
            }
            Some("primary_paren") => return self.build_expr(children[1]),
            Some("primary_array") => {
                let elements = self.build_arg_list_opt(children[1]);
                ExpressionKind::ArrayLiteral(
                    elements
                        .into_iter()
                        .map(|arg| {
                            if let Some(name) = &arg.name {
                                self.sink.error(
                                    DiagnosticCode::InvalidNamedArgument,
                                    format!("array literal element '{}' may not be named", name),
                                    Some(arg.span),
                                );
                            }
                            arg.value
                        })
                        .collect(),
                )
            }
            Some("neg") => ExpressionKind::Unary { op: UnaryOp::Neg, operand: Box::new(self.build_expr(children[1])) },
            Some("not") => ExpressionKind::Unary { op: UnaryOp::Not, operand: Box::new(self.build_expr(children[1])) },
            Some("assign") => ExpressionKind::Assign {
                target: Box::new(self.build_expr(children[0])),
                value: Box::new(self.build_expr(children[2])),
            },
            Some("subscript") => ExpressionKind::Subscript {
                base: Box::new(self.build_expr(children[0])),
                index: Box::new(self.build_expr(children[2])),
            },
            Some("call") => {
                let callee = match self.tree.skip_passthrough(self.grammar, children[0]) {
                    primary if self.tag_of(primary) == Some("primary_identifier") => {
                        self.token_text(self.tree.children(primary)[0])
                    }
                    _ => String::new(),
                };
                let arguments = self.build_arg_list_opt(children[2]);
                ExpressionKind::Call { callee, arguments }
            }
            Some(binop_tag) if binary_op_for_tag(binop_tag).is_some() => {
                let op = binary_op_for_tag(binop_tag).unwrap();
                ExpressionKind::Binary {
                    op,
                    lhs: Box::new(self.build_expr(children[0])),
                    rhs: Box::new(self.build_expr(children[2])),
                }
            }
            _ => ExpressionKind::LiteralBool(false),
        };

        Expression { kind, resolved_type: None, resolved_decl: None, span }
    }

    fn build_arg_list_opt(&mut self, node: NodeId) -> Vec<CallArgument> {
        if self.tag_of(node) == Some("arg_list_opt_none") {
            return Vec::new();
        }
        let list_node = self.tree.children(node)[0];
        let mut items = Vec::new();
        let mut cur = list_node;
        loop {
            match self.tag_of(cur) {
                Some("arg_list_cons") => {
                    let c = self.tree.children(cur);
                    items.push(c[2]);
                    cur = c[0];
                }
                Some("arg_list_one") => {
                    items.push(self.tree.children(cur)[0]);
                    break;
                }
                _ => break,
            }
        }
        items.reverse();
        items
            .into_iter()
            .map(|n| {
                let span = self.tree.node(n).span;
                if self.tag_of(n) == Some("arg_named") {
                    let c = self.tree.children(n);
                    CallArgument { name: Some(self.token_text(c[0])), value: self.build_expr(c[2]), span }
                } else {
                    let c = self.tree.children(n);
                    CallArgument { name: None, value: self.build_expr(c[0]), span }
                }
            })
            .collect()
    }
}

fn binary_op_for_tag(tag: &str) -> Option<BinaryOp> {
    Some(match tag {
        "or" => BinaryOp::Or,
        "and" => BinaryOp::And,
        "eq" => BinaryOp::Eq,
        "neq" => BinaryOp::Neq,
        "lt" => BinaryOp::Lt,
        "gt" => BinaryOp::Gt,
        "le" => BinaryOp::Le,
        "ge" => BinaryOp::Ge,
        "add" => BinaryOp::Add,
        "sub" => BinaryOp::Sub,
        "mul" => BinaryOp::Mul,
        "div" => BinaryOp::Div,
        "modulo" => BinaryOp::Mod,
        _ => return None,
    })
}

/// Definition pass: resolves every identifier/call in every declared
/// module body, picks overloads, and fills in `resolved_type`/
/// `resolved_decl`. Must run after every file's imports have been
/// materialized into its root scope.
pub fn resolve_program(program: &mut Program, sink: &mut DiagnosticSink) {
    let decl_ids: Vec<DeclarationId> = (0..program.declarations.len() as u32).map(DeclarationId).collect();
    for decl_id in decl_ids.iter().copied() {
        if let Declaration::Module(_) = program.declaration(decl_id) {
            if let Some(block) = program.bodies.remove(&decl_id) {
                let mut resolver = Resolver { program, sink };
                let statements = resolver.resolve_statements(block.scope, block.statements);
                program.bodies.insert(decl_id, Block { scope: block.scope, statements });
            }
        }
    }

    // Value declarations (both top-level/namespace-level and local-to-a-
    // block) all resolve their initializer here, uniformly, keyed by the
    // scope they were declared in.
    for decl_id in decl_ids {
        let scope = match program.value_scopes.get(&decl_id) {
            Some(&scope) => scope,
            None => continue,
        };
        let taken = match &mut program.declarations[decl_id.0 as usize] {
            Declaration::Value(v) => v.initializer.take(),
            _ => None,
        };
        let Some(expr) = taken else { continue };

        let mut resolver = Resolver { program, sink };
        let resolved = resolver.resolve_expr(scope, expr);
        let is_constant = resolved.resolved_type.map(|t| t.mutability == Mutability::Constant).unwrap_or(false);

        if let Declaration::Value(v) = &mut program.declarations[decl_id.0 as usize] {
            // A non-`const` declaration whose initializer turned out fully
            // constant still isn't as strong as a `const` (it could be
            // reassigned), but it's stronger than an ordinary variable:
            // promote it to `DependentConstant` (spec.md §3.5's three-level
            // lattice).
            if is_constant && v.data_type.mutability == Mutability::Variable {
                v.data_type = v.data_type.with_mutability(Mutability::DependentConstant);
            }
            v.initializer = Some(resolved);
        }
    }
}

struct Resolver<'a> {
    program: &'a mut Program,
    sink: &'a mut DiagnosticSink,
}

impl<'a> Resolver<'a> {
    fn resolve_statements(&mut self, scope: ScopeId, statements: Vec<Statement>) -> Vec<Statement> {
        statements
            .into_iter()
            .map(|stmt| self.resolve_statement(scope, stmt))
            .collect()
    }

    fn resolve_statement(&mut self, scope: ScopeId, stmt: Statement) -> Statement {
        match stmt {
            // Resolved in the dedicated value-declaration pass in
            // `resolve_program`, which covers both these and top-level/
            // namespace-level declarations uniformly.
            Statement::ValueDecl(id) => Statement::ValueDecl(id),
            Statement::Expr(e) => Statement::Expr(self.resolve_expr(scope, e)),
            Statement::If { condition, then_scope, else_scope } => {
                let condition = self.resolve_expr(scope, condition);
                self.resolve_nested(then_scope);
                if let Some(else_scope) = else_scope {
                    self.resolve_nested(else_scope);
                }
                Statement::If { condition, then_scope, else_scope }
            }
            Statement::For { binding, iterable, body_scope } => {
                let iterable = self.resolve_expr(scope, iterable);
                let element_type = iterable.resolved_type.map(|t| t.element_type());
                if let Some(element_type) = element_type {
                    let decl = self.program.add_declaration(
                        body_scope,
                        Declaration::Value(ValueDeclaration {
                            name: binding.clone(),
                            visibility: Visibility::Private,
                            data_type: element_type,
                            initializer: None,
                            span: iterable.span,
                        }),
                    );
                    self.program.for_bindings.insert(body_scope, decl);
                } else {
                    self.sink.error(DiagnosticCode::TypeMismatch, "for-loop range is not of a legal numeric type", Some(iterable.span));
                }
                self.resolve_nested(body_scope);
                Statement::For { binding, iterable, body_scope }
            }
            Statement::Return(value) => Statement::Return(value.map(|e| self.resolve_expr(scope, e))),
            Statement::Block(inner) => {
                self.resolve_nested(inner);
                Statement::Block(inner)
            }
        }
    }

    fn resolve_nested(&mut self, scope: ScopeId) {
        let key = DeclarationId(u32::MAX - scope.0);
        if let Some(block) = self.program.bodies.remove(&key) {
            let statements = self.resolve_statements(scope, block.statements);
            self.program.bodies.insert(key, Block { scope, statements });
        }
    }

    fn resolve_expr(&mut self, scope: ScopeId, mut expr: Expression) -> Expression {
        match expr.kind {
            ExpressionKind::LiteralReal(_) => {
                expr.resolved_type = Some(QualifiedType::new(DataType::scalar(Primitive::Real), Mutability::Constant));
            }
            ExpressionKind::LiteralBool(_) => {
                expr.resolved_type = Some(QualifiedType::new(DataType::scalar(Primitive::Bool), Mutability::Constant));
            }
            ExpressionKind::LiteralString(_) => {
                expr.resolved_type = Some(QualifiedType::new(DataType::scalar(Primitive::String), Mutability::Constant));
            }
            ExpressionKind::Identifier(ref name) => {
                let matches = self.program.resolve(scope, name);
                match matches.as_slice() {
                    [] => {
                        self.sink.error(DiagnosticCode::IdentifierFailed, format!("unresolved identifier '{}'", name), Some(expr.span));
                    }
                    [single] => {
                        expr.resolved_decl = Some(*single);
                        if let Declaration::Value(v) = self.program.declaration(*single) {
                            expr.resolved_type = Some(v.data_type);
                        }
                    }
                    _ => {
                        self.sink.error(DiagnosticCode::IdentifierAmbiguous, format!("ambiguous identifier '{}'", name), Some(expr.span));
                    }
                }
            }
            ExpressionKind::ArrayLiteral(ref mut elements) => {
                let resolved: Vec<Expression> = std::mem::take(elements)
                    .into_iter()
                    .map(|e| self.resolve_expr(scope, e))
                    .collect();
                let elem_type = resolved.first().and_then(|e| e.resolved_type);
                if let Some(elem) = elem_type {
                    if resolved.iter().any(|e| e.resolved_type.map(|t| t.data_type.primitive) != Some(elem.data_type.primitive)) {
                        self.sink.error(
                            DiagnosticCode::InconsistentArrayElementTypes,
                            "array elements have inconsistent types",
                            Some(expr.span),
                        );
                    }
                    expr.resolved_type = Some(elem.array_type());
                }
                *elements = resolved;
            }
            ExpressionKind::Unary { op, ref mut operand } => {
                let resolved = self.resolve_expr(scope, std::mem::replace(operand.as_mut(), placeholder()));
                let ty = resolved.resolved_type;
                *operand = Box::new(resolved);
                expr.resolved_type = ty.map(|t| match op {
                    UnaryOp::Neg => t,
                    UnaryOp::Not => t.with_mutability(t.mutability),
                });
            }
            ExpressionKind::Binary { op, ref mut lhs, ref mut rhs } => {
                let lhs_r = self.resolve_expr(scope, std::mem::replace(lhs.as_mut(), placeholder()));
                let rhs_r = self.resolve_expr(scope, std::mem::replace(rhs.as_mut(), placeholder()));
                expr.resolved_type = combine_binary_types(op, lhs_r.resolved_type, rhs_r.resolved_type);
                if expr.resolved_type.is_none() {
                    self.sink.error(DiagnosticCode::TypeMismatch, "operand types do not match this operator", Some(expr.span));
                }
                *lhs = Box::new(lhs_r);
                *rhs = Box::new(rhs_r);
            }
            ExpressionKind::Assign { ref mut target, ref mut value } => {
                let target_r = self.resolve_expr(scope, std::mem::replace(target.as_mut(), placeholder()));
                let value_r = self.resolve_expr(scope, std::mem::replace(value.as_mut(), placeholder()));
                expr.resolved_type = target_r.resolved_type;
                *target = Box::new(target_r);
                *value = Box::new(value_r);
            }
            ExpressionKind::Subscript { ref mut base, ref mut index } => {
                let base_r = self.resolve_expr(scope, std::mem::replace(base.as_mut(), placeholder()));
                let index_r = self.resolve_expr(scope, std::mem::replace(index.as_mut(), placeholder()));
                expr.resolved_type = base_r.resolved_type.map(|t| t.element_type());
                *base = Box::new(base_r);
                *index = Box::new(index_r);
            }
            ExpressionKind::Call { ref callee, ref mut arguments } => {
                let resolved_args: Vec<CallArgument> = std::mem::take(arguments)
                    .into_iter()
                    .map(|a| CallArgument { name: a.name, value: self.resolve_expr(scope, a.value), span: a.span })
                    .collect();

                let candidates: Vec<DeclarationId> = self
                    .program
                    .resolve(scope, callee)
                    .into_iter()
                    .filter(|id| matches!(self.program.declaration(*id), Declaration::Module(_)))
                    .collect();

                match candidates.as_slice() {
                    [] => {
                        self.sink.error(DiagnosticCode::IdentifierFailed, format!("unresolved module '{}'", callee), Some(expr.span));
                    }
                    candidates => {
                        let matching: Vec<DeclarationId> = candidates
                            .iter()
                            .copied()
                            .filter(|id| self.overload_matches(*id, &resolved_args))
                            .collect();
                        match matching.as_slice() {
                            [] => {
                                self.sink.error(DiagnosticCode::EmptyOverloadSet, format!("no overload of '{}' matches these arguments", callee), Some(expr.span));
                            }
                            [single] => {
                                expr.resolved_decl = Some(*single);
                                if let Declaration::Module(m) = self.program.declaration(*single) {
                                    expr.resolved_type = m.return_type;
                                }
                            }
                            _ => {
                                self.sink.error(DiagnosticCode::AmbiguousOverload, format!("ambiguous call to '{}'", callee), Some(expr.span));
                            }
                        }
                    }
                }
                *arguments = resolved_args;
            }
        }
        expr
    }

    /// Overload resolution by argument types only (spec.md §4.7): arity and
    /// per-position data type must match (named arguments matched by name
    /// instead of position).
    fn overload_matches(&self, module_id: DeclarationId, args: &[CallArgument]) -> bool {
        let Declaration::Module(module) = self.program.declaration(module_id) else { return false };
        let formals: Vec<&Argument> = module.overload_key_arguments().collect();
        if args.len() != formals.len() {
            return false;
        }
        for (i, arg) in args.iter().enumerate() {
            let formal = match &arg.name {
                Some(name) => match formals.iter().find(|f| &f.name == name) {
                    Some(f) => *f,
                    None => return false,
                },
                None => formals[i],
            };
            match arg.value.resolved_type {
                Some(actual) => {
                    if !crate::types::is_assignable(actual, formal.data_type) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

fn combine_binary_types(op: BinaryOp, lhs: Option<QualifiedType>, rhs: Option<QualifiedType>) -> Option<QualifiedType> {
    let lhs = lhs?;
    let rhs = rhs?;
    let mutability = std::cmp::min(lhs.mutability, rhs.mutability);
    let result_primitive = match op {
        BinaryOp::Eq | BinaryOp::Neq | BinaryOp::Lt | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ge => {
            if lhs.data_type.primitive != rhs.data_type.primitive {
                return None;
            }
            Primitive::Bool
        }
        BinaryOp::And | BinaryOp::Or => {
            if lhs.data_type.primitive != Primitive::Bool || rhs.data_type.primitive != Primitive::Bool {
                return None;
            }
            Primitive::Bool
        }
        _ => {
            if lhs.data_type.primitive != Primitive::Real || rhs.data_type.primitive != Primitive::Real {
                return None;
            }
            Primitive::Real
        }
    };
    Some(QualifiedType::new(DataType::scalar(result_primitive), mutability))
}

fn placeholder() -> Expression {
    Expression { kind: ExpressionKind::LiteralBool(false), resolved_type: None, resolved_decl: None, span: Span::default() }
}
