//! The table-driven LR(1) engine itself: a parse stack of `(state,
//! parse-tree-node)` pairs, driven purely by `ParserTables`. Grounded
//! directly on `original_source/source/compiler/lr_parser.{h,cpp}`: shift
//! pushes a terminal node and the shifted-to state; reduce by production
//! `p` pops `rhs.len()` stack entries (zero for an epsilon production) and
//! attaches them as children of a new nonterminal node via
//! [`super::tree::ParseTree::reduce`]; accept marks the top node as root;
//! error records the offending token and stops without recovery.

use super::build::{Action, ParserTables};
use super::grammar::Grammar;
use super::tree::{NodeId, ParseTree};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::lexer::Token;

/// Runs `tokens` (including the trailing `Eof`) against `tables`, producing
/// a [`ParseTree`] on success or `None` after reporting an `UnexpectedToken`
/// diagnostic. There is no error recovery in this revision: the first
/// unexpected token stops the parse, matching the original's behavior.
pub fn parse(
    grammar: &Grammar,
    tables: &ParserTables,
    tokens: &[Token],
    sink: &mut DiagnosticSink,
) -> Option<ParseTree> {
    let mut tree = ParseTree::new();
    let mut state_stack: Vec<usize> = vec![tables.start_state];
    let mut node_stack: Vec<NodeId> = Vec::new();
    let mut pos = 0usize;

    loop {
        let token = &tokens[pos];
        let state = *state_stack.last().unwrap();

        match tables.action.get(&(state, token.kind)) {
            Some(Action::Shift(next_state)) => {
                let node = tree.push_terminal(token.clone());
                node_stack.push(node);
                state_stack.push(*next_state);
                pos += 1;
            }
            Some(Action::Reduce(production_index)) => {
                let production = &grammar.productions[*production_index];
                let arity = production.rhs.len();
                let mut children = Vec::with_capacity(arity);
                for _ in 0..arity {
                    state_stack.pop();
                    children.push(node_stack.pop().unwrap());
                }
                children.reverse();

                let span = if let (Some(&first), Some(&last)) = (children.first(), children.last()) {
                    tree.node(first).span.join(tree.node(last).span)
                } else {
                    // Epsilon production: no children to span. Use a
                    // zero-length span at the lookahead token's start.
                    let mut empty = token.span;
                    empty.length = 0;
                    empty
                };

                let new_node = tree.reduce(production.lhs, *production_index, children, span);
                let from_state = *state_stack.last().unwrap();
                let goto_state = *tables
                    .goto_table
                    .get(&(from_state, production.lhs))
                    .expect("table construction guarantees a goto entry for every reducible nonterminal");
                node_stack.push(new_node);
                state_stack.push(goto_state);
            }
            Some(Action::Accept) => {
                tree.root = node_stack.pop();
                return Some(tree);
            }
            None => {
                sink.error(
                    DiagnosticCode::UnexpectedToken,
                    format!("unexpected token '{}'", token.text),
                    Some(token.span),
                );
                return None;
            }
        }
    }
}

