//! The parse tree: terminal or nonterminal nodes linked first-child/
//! next-sibling, as spec.md §3.3 describes. Built incrementally by the
//! engine's `make_first_child_node` operation (see `engine.rs`).

use super::symbol::Nonterminal;
use crate::lexer::Token;
use crate::span::Span;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone)]
pub enum ParseTreeNodeKind {
    Terminal(Token),
    Nonterminal {
        nonterminal: Nonterminal,
        production: usize,
    },
}

#[derive(Debug, Clone)]
pub struct ParseTreeNode {
    pub kind: ParseTreeNodeKind,
    pub span: Span,
    pub first_child: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

/// A first-child/next-sibling tree with a single root, built bottom-up: each
/// reduction attaches its popped children to a fresh nonterminal node before
/// pushing that node back onto the parse stack.
#[derive(Debug, Default)]
pub struct ParseTree {
    nodes: Vec<ParseTreeNode>,
    pub root: Option<NodeId>,
}

impl ParseTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &ParseTreeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn push_terminal(&mut self, token: Token) -> NodeId {
        let span = token.span;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(ParseTreeNode {
            kind: ParseTreeNodeKind::Terminal(token),
            span,
            first_child: None,
            next_sibling: None,
        });
        id
    }

    /// Creates a new nonterminal node whose children are `children`, in
    /// left-to-right order. Matches `make_first_child_node`'s net effect:
    /// the original rewires one child at a time (newest child becomes first,
    /// the previous first child becomes its sibling), which yields
    /// left-to-right order once every popped child has been attached.
    pub fn reduce(
        &mut self,
        nonterminal: Nonterminal,
        production: usize,
        children: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut first_child = None;
        for &child in children.iter().rev() {
            self.nodes[child.0 as usize].next_sibling = first_child;
            first_child = Some(child);
        }
        self.nodes.push(ParseTreeNode {
            kind: ParseTreeNodeKind::Nonterminal { nonterminal, production },
            span,
            first_child,
            next_sibling: None,
        });
        id
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.node(id).first_child;
        while let Some(c) = cursor {
            out.push(c);
            cursor = self.node(c).next_sibling;
        }
        out
    }

    /// Walks past transparent single-child "pass-through" nonterminals
    /// produced by the precedence-layering productions (tags ending in
    /// `_pass`) to find the node that actually carries content. The AST
    /// builder uses this to avoid matching every precedence layer by hand.
    pub fn skip_passthrough(&self, grammar: &super::grammar::Grammar, mut id: NodeId) -> NodeId {
        loop {
            match &self.node(id).kind {
                ParseTreeNodeKind::Nonterminal { production, .. } => {
                    let tag = grammar.productions[*production].tag;
                    if tag.ends_with("_pass") {
                        let children = self.children(id);
                        if children.len() == 1 {
                            id = children[0];
                            continue;
                        }
                    }
                    return id;
                }
                ParseTreeNodeKind::Terminal(_) => return id,
            }
        }
    }
}
