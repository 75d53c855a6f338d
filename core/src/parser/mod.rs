//! LR(1) parsing: a hand-written grammar definition, a from-scratch table
//! builder, and a generic table-driven engine. See `engine.rs` for the
//! algorithm this is grounded on.

mod build;
mod engine;
mod grammar;
mod symbol;
mod tree;

pub use build::{Action, ParserTables};
pub use grammar::{Grammar, Production};
pub use symbol::{Nonterminal, Symbol};
pub use tree::{NodeId, ParseTree, ParseTreeNode, ParseTreeNodeKind};

use crate::diagnostics::DiagnosticSink;
use crate::lexer::Token;
use std::sync::OnceLock;

/// The WaveLang grammar and its derived LR(1) tables are fixed for the
/// process's lifetime, so we build them once and hand out shared
/// references rather than rebuilding per compilation.
struct ParserContext {
    grammar: Grammar,
    tables: ParserTables,
}

static CONTEXT: OnceLock<ParserContext> = OnceLock::new();

fn context() -> &'static ParserContext {
    CONTEXT.get_or_init(|| {
        let grammar = grammar::grammar();
        let tables = build::build(&grammar);
        ParserContext { grammar, tables }
    })
}

/// Parses a token stream (as produced by [`crate::lexer::lex`]) into a
/// [`ParseTree`], or `None` if a diagnostic was reported.
pub fn parse(tokens: &[Token], sink: &mut DiagnosticSink) -> Option<ParseTree> {
    let ctx = context();
    engine::parse(&ctx.grammar, &ctx.tables, tokens, sink)
}

/// Exposes the shared grammar for callers (notably the AST builder) that
/// need to inspect production tags via [`ParseTree::skip_passthrough`].
pub fn grammar() -> &'static Grammar {
    &context().grammar
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::lex;
    use crate::source::SourceHandle;

    fn parse_str(text: &str) -> ParseTree {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), text, &mut sink);
        assert!(sink.is_ok(), "lex errors: {}", sink);
        let tree = parse(&tokens, &mut sink);
        assert!(sink.is_ok(), "parse errors: {}", sink);
        tree.expect("parse should succeed")
    }

    #[test]
    fn parses_empty_program() {
        let tree = parse_str("");
        assert!(tree.root.is_some());
    }

    #[test]
    fn parses_value_declaration() {
        let tree = parse_str("real x = 1.0;");
        assert!(tree.root.is_some());
    }

    #[test]
    fn parses_module_with_expression_body() {
        let tree = parse_str(
            "module real square(real x) { return x * x; }",
        );
        assert!(tree.root.is_some());
    }

    #[test]
    fn parses_if_for_and_calls() {
        let tree = parse_str(
            r#"
            module void run(real x) {
                if (x > 0) {
                    value = helper(x, y: 2.0);
                } else {
                    value = 0.0;
                }
                for (i in items) {
                    process(i);
                }
            }
            "#,
        );
        assert!(tree.root.is_some());
    }

    #[test]
    fn rejects_malformed_input() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), "module real (", &mut sink);
        let tree = parse(&tokens, &mut sink);
        assert!(tree.is_none());
        assert!(!sink.is_ok());
    }
}
