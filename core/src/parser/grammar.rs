//! The concrete WaveLang grammar: productions over the nonterminals in
//! [`super::symbol`] and the terminals in [`crate::lexer::TokenKind`].
//!
//! The grammar is layered by precedence (`OrExpr` > `AndExpr` > `EqExpr` >
//! `RelExpr` > `AddExpr` > `MulExpr` > `UnaryExpr` > `PostfixExpr`) rather
//! than using precedence declarations, so the resulting automaton has no
//! shift/reduce conflicts to arbitrate — every alternative is left-recursive
//! except the right-associative assignment and the prefix unary operators.

use super::symbol::{Nonterminal, Symbol};
use crate::lexer::TokenKind;

/// One grammar production: `lhs -> rhs`, plus a `tag` the AST builder uses
/// to know which alternative of `lhs` was reduced without re-deriving it
/// from the shape of `rhs` each time.
#[derive(Debug, Clone)]
pub struct Production {
    pub lhs: Nonterminal,
    pub rhs: Vec<Symbol>,
    pub tag: &'static str,
}

/// The full production list plus the augmented start production
/// (`Program' -> Program Eof`) table construction adds on top.
pub struct Grammar {
    pub productions: Vec<Production>,
    pub start: Nonterminal,
}

fn p(lhs: Nonterminal, rhs: &[Symbol], tag: &'static str) -> Production {
    Production { lhs, rhs: rhs.to_vec(), tag }
}

fn t(kind: TokenKind) -> Symbol {
    Symbol::Terminal(kind)
}

fn n(nt: Nonterminal) -> Symbol {
    Symbol::Nonterminal(nt)
}

pub fn grammar() -> Grammar {
    use Nonterminal::*;
    use TokenKind::*;

    let productions = vec![
        // Program
        p(Program, &[n(ImportList), n(TopLevelDeclList)], "program"),
        // ImportList
        p(ImportList, &[n(ImportList), n(ImportDecl)], "import_list_cons"),
        p(ImportList, &[], "import_list_nil"),
        p(
            ImportDecl,
            &[t(KwImport), t(LiteralString), t(Semicolon)],
            "import_plain",
        ),
        p(
            ImportDecl,
            &[t(KwImport), t(LiteralString), t(KwAs), t(Identifier), t(Semicolon)],
            "import_aliased",
        ),
        // TopLevelDeclList
        p(
            TopLevelDeclList,
            &[n(TopLevelDeclList), n(TopLevelDecl)],
            "top_level_list_cons",
        ),
        p(TopLevelDeclList, &[], "top_level_list_nil"),
        p(TopLevelDecl, &[n(NamespaceDecl)], "top_level_namespace"),
        p(TopLevelDecl, &[n(ModuleDecl)], "top_level_module"),
        p(TopLevelDecl, &[n(ValueDecl)], "top_level_value"),
        p(TopLevelDecl, &[n(GlobalsCommand)], "top_level_globals"),
        // NamespaceDecl
        p(
            NamespaceDecl,
            &[t(KwNamespace), t(Identifier), t(LBrace), n(TopLevelDeclList), t(RBrace)],
            "namespace_decl",
        ),
        // GlobalsCommand: `#command(args);`
        p(
            GlobalsCommand,
            &[t(Hash), t(Identifier), t(LParen), n(ArgListOpt), t(RParen), t(Semicolon)],
            "globals_command",
        ),
        // ValueDecl
        p(
            ValueDecl,
            &[n(TypeSpec), t(Identifier), n(InitOpt), t(Semicolon)],
            "value_decl",
        ),
        p(InitOpt, &[t(Assign), n(Expr)], "init_opt_some"),
        p(InitOpt, &[], "init_opt_none"),
        // ModuleDecl: a user-defined module always has a block body. Native
        // modules are never declared in source; they're synthesized directly
        // into every file's scope from the registry (see
        // `crate::native::declare_into_program`).
        p(
            ModuleDecl,
            &[
                t(KwModule),
                n(TypeSpec),
                t(Identifier),
                t(LParen),
                n(ParamListOpt),
                t(RParen),
                n(Block),
            ],
            "module_decl_defined",
        ),
        p(ParamListOpt, &[n(ParamList)], "param_list_opt_some"),
        p(ParamListOpt, &[], "param_list_opt_none"),
        p(ParamList, &[n(ParamList), t(Comma), n(Param)], "param_list_cons"),
        p(ParamList, &[n(Param)], "param_list_one"),
        p(
            Param,
            &[n(TypeSpec), t(Identifier), n(InitOpt)],
            "param_in",
        ),
        p(
            Param,
            &[t(KwOut), n(TypeSpec), t(Identifier)],
            "param_out",
        ),
        // TypeSpec
        p(TypeSpec, &[n(ConstOpt), n(PrimType), n(ArrayOpt)], "type_spec"),
        p(ConstOpt, &[t(KwConst)], "const_opt_some"),
        p(ConstOpt, &[], "const_opt_none"),
        p(PrimType, &[t(KwReal)], "prim_real"),
        p(PrimType, &[t(KwBool)], "prim_bool"),
        p(PrimType, &[t(KwString)], "prim_string"),
        p(PrimType, &[t(KwVoid)], "prim_void"),
        p(ArrayOpt, &[t(LBracket), t(RBracket)], "array_opt_some"),
        p(ArrayOpt, &[], "array_opt_none"),
        // Block / statements
        p(Block, &[t(LBrace), n(StmtList), t(RBrace)], "block"),
        p(StmtList, &[n(StmtList), n(Stmt)], "stmt_list_cons"),
        p(StmtList, &[], "stmt_list_nil"),
        p(Stmt, &[n(ValueDecl)], "stmt_value_decl"),
        p(Stmt, &[n(ExprStmt)], "stmt_expr"),
        p(Stmt, &[n(IfStmt)], "stmt_if"),
        p(Stmt, &[n(ForStmt)], "stmt_for"),
        p(Stmt, &[n(ReturnStmt)], "stmt_return"),
        p(Stmt, &[n(Block)], "stmt_block"),
        p(ExprStmt, &[n(Expr), t(Semicolon)], "expr_stmt"),
        p(
            IfStmt,
            &[t(KwIf), t(LParen), n(Expr), t(RParen), n(Block), n(ElseOpt)],
            "if_stmt",
        ),
        p(ElseOpt, &[t(KwElse), n(Block)], "else_opt_some"),
        p(ElseOpt, &[], "else_opt_none"),
        p(
            ForStmt,
            &[
                t(KwFor),
                t(LParen),
                t(Identifier),
                t(KwIn),
                n(Expr),
                t(RParen),
                n(Block),
            ],
            "for_stmt",
        ),
        p(ReturnStmt, &[t(KwReturn), n(ExprOpt), t(Semicolon)], "return_stmt"),
        p(ExprOpt, &[n(Expr)], "expr_opt_some"),
        p(ExprOpt, &[], "expr_opt_none"),
        // Expressions, layered by precedence
        p(Expr, &[n(AssignExpr)], "expr_pass"),
        p(AssignExpr, &[n(OrExpr), t(Assign), n(AssignExpr)], "assign"),
        p(AssignExpr, &[n(OrExpr)], "assign_pass"),
        p(OrExpr, &[n(OrExpr), t(OrOr), n(AndExpr)], "or"),
        p(OrExpr, &[n(AndExpr)], "or_pass"),
        p(AndExpr, &[n(AndExpr), t(AndAnd), n(EqExpr)], "and"),
        p(AndExpr, &[n(EqExpr)], "and_pass"),
        p(EqExpr, &[n(EqExpr), t(EqEq), n(RelExpr)], "eq"),
        p(EqExpr, &[n(EqExpr), t(NotEq), n(RelExpr)], "neq"),
        p(EqExpr, &[n(RelExpr)], "eq_pass"),
        p(RelExpr, &[n(RelExpr), t(Lt), n(AddExpr)], "lt"),
        p(RelExpr, &[n(RelExpr), t(Gt), n(AddExpr)], "gt"),
        p(RelExpr, &[n(RelExpr), t(Le), n(AddExpr)], "le"),
        p(RelExpr, &[n(RelExpr), t(Ge), n(AddExpr)], "ge"),
        p(RelExpr, &[n(AddExpr)], "rel_pass"),
        p(AddExpr, &[n(AddExpr), t(Plus), n(MulExpr)], "add"),
        p(AddExpr, &[n(AddExpr), t(Minus), n(MulExpr)], "sub"),
        p(AddExpr, &[n(MulExpr)], "add_pass"),
        p(MulExpr, &[n(MulExpr), t(Star), n(UnaryExpr)], "mul"),
        p(MulExpr, &[n(MulExpr), t(Slash), n(UnaryExpr)], "div"),
        p(MulExpr, &[n(MulExpr), t(Percent), n(UnaryExpr)], "modulo"),
        p(MulExpr, &[n(UnaryExpr)], "mul_pass"),
        p(UnaryExpr, &[t(Minus), n(UnaryExpr)], "neg"),
        p(UnaryExpr, &[t(Bang), n(UnaryExpr)], "not"),
        p(UnaryExpr, &[n(PostfixExpr)], "unary_pass"),
        p(
            PostfixExpr,
            &[n(PostfixExpr), t(LBracket), n(Expr), t(RBracket)],
            "subscript",
        ),
        p(
            PostfixExpr,
            &[n(PostfixExpr), t(LParen), n(ArgListOpt), t(RParen)],
            "call",
        ),
        p(PostfixExpr, &[n(Primary)], "postfix_pass"),
        p(Primary, &[t(Identifier)], "primary_identifier"),
        p(Primary, &[t(LiteralReal)], "primary_real"),
        p(Primary, &[t(LiteralBool)], "primary_bool"),
        p(Primary, &[t(LiteralString)], "primary_string"),
        p(Primary, &[t(LParen), n(Expr), t(RParen)], "primary_paren"),
        p(Primary, &[t(LBracket), n(ArgListOpt), t(RBracket)], "primary_array"),
        p(ArgListOpt, &[n(ArgList)], "arg_list_opt_some"),
        p(ArgListOpt, &[], "arg_list_opt_none"),
        p(ArgList, &[n(ArgList), t(Comma), n(Arg)], "arg_list_cons"),
        p(ArgList, &[n(Arg)], "arg_list_one"),
        p(Arg, &[t(Identifier), t(Colon), n(Expr)], "arg_named"),
        p(Arg, &[n(Expr)], "arg_positional"),
    ];

    Grammar { productions, start: Program }
}
