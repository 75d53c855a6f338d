//! AST node types (spec.md §3.4). A [`Program`] owns an arena of [`Scope`]s
//! and [`Declaration`]s; every declaration is owned by exactly one scope,
//! and scopes additionally carry non-owning references to declarations
//! brought in by imports (spec.md §4.5's materialization pass).

use crate::span::Span;
use crate::types::QualifiedType;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct DeclarationId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

/// A scope is the owner of zero or more declarations, plus non-owning
/// references to declarations imported into it. `parent` is `None` only
/// for the root scope of the top-level file.
#[derive(Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub owned: Vec<DeclarationId>,
    pub imported: Vec<DeclarationId>,
}

#[derive(Debug)]
pub enum Declaration {
    Namespace(NamespaceDeclaration),
    Module(ModuleDeclaration),
    Value(ValueDeclaration),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Namespace(d) => &d.name,
            Declaration::Module(d) => &d.name,
            Declaration::Value(d) => &d.name,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Declaration::Namespace(d) => d.span,
            Declaration::Module(d) => d.span,
            Declaration::Value(d) => d.span,
        }
    }
}

#[derive(Debug)]
pub struct NamespaceDeclaration {
    pub name: String,
    pub visibility: Visibility,
    pub scope: ScopeId,
    pub span: Span,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArgumentDirection {
    In,
    Out,
}

#[derive(Debug, Clone)]
pub struct Argument {
    pub name: String,
    pub direction: ArgumentDirection,
    pub data_type: QualifiedType,
    pub initializer: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ModuleBody {
    Scope(ScopeId),
    Native { library_name: String },
}

#[derive(Debug)]
pub struct ModuleDeclaration {
    pub name: String,
    pub visibility: Visibility,
    /// `None` denotes a `void`-returning module.
    pub return_type: Option<QualifiedType>,
    pub arguments: Vec<Argument>,
    pub body: ModuleBody,
    pub span: Span,
}

impl ModuleDeclaration {
    /// The argument list used for overload resolution: every `in` argument
    /// plus every `out` argument except a would-be "return" first output
    /// argument (spec.md §4.7's overload-key rule).
    pub fn overload_key_arguments(&self) -> impl Iterator<Item = &Argument> {
        let first_out_index = self.arguments.iter().position(|a| a.direction == ArgumentDirection::Out);
        self.arguments.iter().enumerate().filter_map(move |(i, a)| {
            if Some(i) == first_out_index && a.direction == ArgumentDirection::Out {
                None
            } else {
                Some(a)
            }
        })
    }
}

#[derive(Debug)]
pub struct ValueDeclaration {
    pub name: String,
    pub visibility: Visibility,
    pub data_type: QualifiedType,
    pub initializer: Option<Expression>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ExpressionKind {
    LiteralReal(f32),
    LiteralBool(bool),
    LiteralString(String),
    Identifier(String),
    ArrayLiteral(Vec<Expression>),
    Unary { op: UnaryOp, operand: Box<Expression> },
    Binary { op: BinaryOp, lhs: Box<Expression>, rhs: Box<Expression> },
    Assign { target: Box<Expression>, value: Box<Expression> },
    Subscript { base: Box<Expression>, index: Box<Expression> },
    Call { callee: String, arguments: Vec<CallArgument> },
}

#[derive(Debug, Clone)]
pub struct CallArgument {
    pub name: Option<String>,
    pub value: Expression,
    pub span: Span,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub struct Expression {
    pub kind: ExpressionKind,
    /// Filled in by type checking (spec.md §4.7); `None` until then.
    pub resolved_type: Option<QualifiedType>,
    /// For `Identifier`/`Call` expressions, the declaration the name
    /// resolved to (overload-resolved, for calls). Filled in by the
    /// definition pass.
    pub resolved_decl: Option<DeclarationId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum Statement {
    ValueDecl(DeclarationId),
    Expr(Expression),
    If { condition: Expression, then_scope: ScopeId, else_scope: Option<ScopeId> },
    For { binding: String, iterable: Expression, body_scope: ScopeId },
    Return(Option<Expression>),
    Block(ScopeId),
}

/// A module's executable body: the statements of its top-level block, plus
/// the scope they run in (for nested value declarations' lifetime).
#[derive(Debug, Default)]
pub struct Block {
    pub scope: ScopeId,
    pub statements: Vec<Statement>,
}

/// The complete AST for one source file: an arena of scopes and
/// declarations, plus per-module executable bodies keyed by
/// [`DeclarationId`]. Mutable only during construction (spec.md §3.4); every
/// accessor here assumes the two-pass builder has already finished.
#[derive(Debug, Default)]
pub struct Program {
    pub scopes: Vec<Scope>,
    pub declarations: Vec<Declaration>,
    pub bodies: std::collections::HashMap<DeclarationId, Block>,
    /// The scope each value declaration was written in, so its initializer
    /// can be resolved against the right ancestor chain. Namespaces and
    /// modules don't need this: a namespace's scope is on the declaration
    /// itself, and a module's arguments/body are resolved via its own body
    /// scope.
    pub value_scopes: std::collections::HashMap<DeclarationId, ScopeId>,
    /// Maps the synthesized per-argument placeholder declaration a module's
    /// body scope owns back to `(module, formal_index)`, so identifier
    /// resolution against a module's own parameters goes through the same
    /// `resolve` path as any other value while still letting graph lowering
    /// tell "this is argument N" apart from an ordinary local or global.
    pub argument_owners: std::collections::HashMap<DeclarationId, (DeclarationId, usize)>,
    /// The synthesized loop-binding placeholder declaration owned by a
    /// for-loop's body scope, added once the iterable's element type is
    /// known during the definition pass.
    pub for_bindings: std::collections::HashMap<ScopeId, DeclarationId>,
    /// The registry UID backing a synthesized native-module declaration
    /// (one per registered native module; see `crate::native::declare_into_program`).
    pub native_bindings: std::collections::HashMap<DeclarationId, crate::native::NativeModuleUid>,
    pub root_scope: ScopeId,
}

impl Program {
    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.0 as usize]
    }

    pub fn declaration(&self, id: DeclarationId) -> &Declaration {
        &self.declarations[id.0 as usize]
    }

    pub fn new_scope(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope { parent, ..Default::default() });
        id
    }

    pub fn add_declaration(&mut self, scope: ScopeId, declaration: Declaration) -> DeclarationId {
        let id = DeclarationId(self.declarations.len() as u32);
        self.declarations.push(declaration);
        self.scope_mut(scope).owned.push(id);
        id
    }

    /// Resolves `name` by searching `scope`'s owned and imported
    /// declarations, then its ancestors, innermost first (spec.md §4.7's
    /// identifier resolution order).
    pub fn resolve<'a>(&'a self, scope: ScopeId, name: &str) -> Vec<DeclarationId> {
        let mut matches = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = self.scope(id);
            for &decl_id in s.owned.iter().chain(s.imported.iter()) {
                if self.declaration(decl_id).name() == name {
                    matches.push(decl_id);
                }
            }
            if !matches.is_empty() {
                break;
            }
            current = s.parent;
        }
        matches
    }
}
