//! Grammar symbol algebra. Grounded on `original_source/source/compiler/lr_parser.h`'s
//! `c_lr_symbol`, which packs epsilon/terminal/nonterminal plus an index into
//! one 32-bit word; a Rust enum gets the same three-way split without the
//! bitfield packing the C++ needed.

use crate::lexer::TokenKind;

/// Every nonterminal in the WaveLang grammar. Order has no semantic meaning;
/// it only determines the dense index [`Nonterminal::index`] returns, which
/// table construction uses to size arrays and dedupe FIRST/follow sets.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Nonterminal {
    /// Synthetic augmented start symbol (`Start' -> Program`), added by
    /// table construction so the accept condition is "reduce by the
    /// augmented production", never a real user-facing nonterminal.
    AugmentedStart,
    Program,
    ImportList,
    ImportDecl,
    TopLevelDeclList,
    TopLevelDecl,
    NamespaceDecl,
    GlobalsCommand,
    ValueDecl,
    ModuleDecl,
    ParamListOpt,
    ParamList,
    Param,
    InitOpt,
    TypeSpec,
    ConstOpt,
    PrimType,
    ArrayOpt,
    Block,
    StmtList,
    Stmt,
    ExprStmt,
    IfStmt,
    ElseOpt,
    ForStmt,
    ReturnStmt,
    ExprOpt,
    Expr,
    AssignExpr,
    OrExpr,
    AndExpr,
    EqExpr,
    RelExpr,
    AddExpr,
    MulExpr,
    UnaryExpr,
    PostfixExpr,
    Primary,
    ArgListOpt,
    ArgList,
    Arg,
}

impl Nonterminal {
    pub const ALL: &'static [Nonterminal] = &[
        Nonterminal::AugmentedStart,
        Nonterminal::Program,
        Nonterminal::ImportList,
        Nonterminal::ImportDecl,
        Nonterminal::TopLevelDeclList,
        Nonterminal::TopLevelDecl,
        Nonterminal::NamespaceDecl,
        Nonterminal::GlobalsCommand,
        Nonterminal::ValueDecl,
        Nonterminal::ModuleDecl,
        Nonterminal::ParamListOpt,
        Nonterminal::ParamList,
        Nonterminal::Param,
        Nonterminal::InitOpt,
        Nonterminal::TypeSpec,
        Nonterminal::ConstOpt,
        Nonterminal::PrimType,
        Nonterminal::ArrayOpt,
        Nonterminal::Block,
        Nonterminal::StmtList,
        Nonterminal::Stmt,
        Nonterminal::ExprStmt,
        Nonterminal::IfStmt,
        Nonterminal::ElseOpt,
        Nonterminal::ForStmt,
        Nonterminal::ReturnStmt,
        Nonterminal::ExprOpt,
        Nonterminal::Expr,
        Nonterminal::AssignExpr,
        Nonterminal::OrExpr,
        Nonterminal::AndExpr,
        Nonterminal::EqExpr,
        Nonterminal::RelExpr,
        Nonterminal::AddExpr,
        Nonterminal::MulExpr,
        Nonterminal::UnaryExpr,
        Nonterminal::PostfixExpr,
        Nonterminal::Primary,
        Nonterminal::ArgListOpt,
        Nonterminal::ArgList,
        Nonterminal::Arg,
    ];

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|&n| n == self).expect("exhaustive table")
    }
}

/// A symbol on the right-hand side of a production, or the lookahead slot of
/// an LR(1) item. `Epsilon` only appears as a FIRST-set sentinel during table
/// construction; an epsilon *production* is represented by an empty `rhs`,
/// not by an `Epsilon` symbol in it, so that reduction pops exactly
/// `rhs.len()` stack entries (zero for an epsilon production).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Epsilon,
    Terminal(TokenKind),
    Nonterminal(Nonterminal),
}
