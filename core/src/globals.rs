//! Instrument-globals parsing (spec.md §4.6): `#command(args);` directives
//! that configure an instrument as a whole rather than declaring anything.
//! Grounded on `original_source/source/instrument/instrument_globals.cpp`'s
//! fixed command table and default values.

use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::lexer::decode_string_literal;
use crate::parser::{Grammar, NodeId, ParseTree, ParseTreeNodeKind};
use crate::source::SourceHandle;
use crate::span::Span;

/// One instrument's fully-resolved globals, after defaults have been
/// applied. `sample_rates` is never empty: with no `sample_rate` command it
/// holds the single sentinel value `0` (spec.md §4.6's "unconstrained").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentGlobals {
    pub max_voices: u32,
    pub sample_rates: Vec<u32>,
    pub chunk_size: u32,
    pub activate_fx_immediately: bool,
}

impl Default for InstrumentGlobals {
    fn default() -> Self {
        InstrumentGlobals { max_voices: 1, sample_rates: vec![0], chunk_size: 0, activate_fx_immediately: false }
    }
}

impl InstrumentGlobals {
    /// The cartesian product of multi-valued commands — in this revision,
    /// just `sample_rate` — each entry driving one execution-graph variant.
    pub fn variants(&self) -> impl Iterator<Item = u32> + '_ {
        self.sample_rates.iter().copied()
    }
}

#[derive(Default)]
struct RawCommands {
    max_voices: Option<(u32, Span)>,
    sample_rates: Option<(Vec<u32>, Span)>,
    chunk_size: Option<(u32, Span)>,
    activate_fx_immediately: Option<(bool, Span)>,
}

/// Scans `tree` (the top-level file's parse tree) for `GlobalsCommand`
/// nodes, validates them against the fixed command table, and returns the
/// resolved globals. A globals command found in any non-top-level file must
/// be rejected by the caller before this is invoked (this function has no
/// way to tell which file it was handed).
pub fn parse_globals(grammar: &Grammar, tree: &ParseTree, file: SourceHandle, sink: &mut DiagnosticSink) -> InstrumentGlobals {
    let mut raw = RawCommands::default();
    if let Some(root) = tree.root {
        let children = tree.children(root);
        if children.len() == 2 {
            collect_commands(grammar, tree, children[1], &mut raw, sink);
        }
    }
    let _ = file;

    InstrumentGlobals {
        max_voices: raw.max_voices.map(|(v, _)| v).unwrap_or(1),
        sample_rates: raw.sample_rates.map(|(v, _)| v).unwrap_or_else(|| vec![0]),
        chunk_size: raw.chunk_size.map(|(v, _)| v).unwrap_or(0),
        activate_fx_immediately: raw.activate_fx_immediately.map(|(v, _)| v).unwrap_or(false),
    }
}

fn collect_commands(grammar: &Grammar, tree: &ParseTree, mut node: NodeId, raw: &mut RawCommands, sink: &mut DiagnosticSink) {
    let mut commands = Vec::new();
    loop {
        let tag = match &tree.node(node).kind {
            ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
            ParseTreeNodeKind::Terminal(_) => return,
        };
        if tag != "top_level_list_cons" {
            break;
        }
        let children = tree.children(node);
        let decl = children[1];
        if let ParseTreeNodeKind::Nonterminal { production, .. } = &tree.node(decl).kind {
            if grammar.productions[*production].tag == "top_level_globals" {
                commands.push(tree.children(decl)[0]);
            }
        }
        node = children[0];
    }
    commands.reverse();
    for command in commands {
        apply_command(grammar, tree, command, raw, sink);
    }
}

fn apply_command(grammar: &Grammar, tree: &ParseTree, node: NodeId, raw: &mut RawCommands, sink: &mut DiagnosticSink) {
    // GlobalsCommand -> '#' Identifier '(' ArgListOpt ')' ';'
    let children = tree.children(node);
    let span = tree.node(node).span;
    let name = token_text(tree, children[1]);
    let args = arg_tokens(grammar, tree, children[3]);

    match name.as_str() {
        "max_voices" => {
            if raw.max_voices.is_some() {
                sink.error(DiagnosticCode::GlobalsDuplicate, "max_voices given more than once", Some(span));
                return;
            }
            match single_positive_int(&args) {
                Some(value) => raw.max_voices = Some((value, span)),
                None => sink.error(DiagnosticCode::GlobalsBadParameters, "max_voices expects one positive integer", Some(span)),
            }
        }
        "sample_rate" => {
            if raw.sample_rates.is_some() {
                sink.error(DiagnosticCode::GlobalsDuplicate, "sample_rate given more than once", Some(span));
                return;
            }
            let values: Vec<u32> = args.iter().filter_map(|t| parse_positive_int(t)).collect();
            if values.is_empty() || values.len() != args.len() {
                sink.error(DiagnosticCode::GlobalsBadParameters, "sample_rate expects one or more positive integers", Some(span));
                return;
            }
            let mut unique = values.clone();
            unique.sort_unstable();
            unique.dedup();
            if unique.len() != values.len() {
                sink.error(DiagnosticCode::GlobalsBadParameters, "sample_rate values must be unique", Some(span));
                return;
            }
            raw.sample_rates = Some((values, span));
        }
        "chunk_size" => {
            if raw.chunk_size.is_some() {
                sink.error(DiagnosticCode::GlobalsDuplicate, "chunk_size given more than once", Some(span));
                return;
            }
            match single_positive_int(&args) {
                Some(value) => raw.chunk_size = Some((value, span)),
                None => sink.error(DiagnosticCode::GlobalsBadParameters, "chunk_size expects one positive integer", Some(span)),
            }
        }
        "activate_fx_immediately" => {
            if raw.activate_fx_immediately.is_some() {
                sink.error(DiagnosticCode::GlobalsDuplicate, "activate_fx_immediately given more than once", Some(span));
                return;
            }
            match single_bool(&args) {
                Some(value) => raw.activate_fx_immediately = Some((value, span)),
                None => sink.error(DiagnosticCode::GlobalsBadParameters, "activate_fx_immediately expects one bool", Some(span)),
            }
        }
        other => {
            sink.error(DiagnosticCode::UnknownGlobalsCommand, format!("unknown instrument-globals command '{}'", other), Some(span));
        }
    }
}

enum ArgToken {
    Real(f32),
    Bool(bool),
    Other,
}

fn arg_tokens(grammar: &Grammar, tree: &ParseTree, node: NodeId) -> Vec<ArgToken> {
    let tag = match &tree.node(node).kind {
        ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
        ParseTreeNodeKind::Terminal(_) => return Vec::new(),
    };
    if tag == "arg_list_opt_none" {
        return Vec::new();
    }
    let list_node = tree.children(node)[0];
    let mut items = Vec::new();
    let mut cur = list_node;
    loop {
        let tag = match &tree.node(cur).kind {
            ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
            ParseTreeNodeKind::Terminal(_) => break,
        };
        match tag {
            "arg_list_cons" => {
                let c = tree.children(cur);
                items.push(c[2]);
                cur = c[0];
            }
            "arg_list_one" => {
                items.push(tree.children(cur)[0]);
                break;
            }
            _ => break,
        }
    }
    items.reverse();
    items
        .into_iter()
        .map(|arg| {
            // Arg -> Expr | Identifier ':' Expr; globals commands only use
            // bare positional literals, so walk straight to the Primary.
            let tag = match &tree.node(arg).kind {
                ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
                ParseTreeNodeKind::Terminal(_) => return ArgToken::Other,
            };
            let expr_node = match tag {
                "arg_named" => tree.children(arg)[2],
                _ => tree.children(arg)[0],
            };
            literal_of(grammar, tree, expr_node)
        })
        .collect()
}

fn literal_of(grammar: &Grammar, tree: &ParseTree, mut node: NodeId) -> ArgToken {
    loop {
        match &tree.node(node).kind {
            ParseTreeNodeKind::Terminal(token) => {
                return match token.kind {
                    crate::lexer::TokenKind::LiteralReal => ArgToken::Real(token.real_value.unwrap_or(0.0)),
                    crate::lexer::TokenKind::LiteralBool => ArgToken::Bool(token.bool_value.unwrap_or(false)),
                    _ => ArgToken::Other,
                };
            }
            ParseTreeNodeKind::Nonterminal { production, .. } => {
                let children = tree.children(node);
                if children.len() == 1 {
                    node = children[0];
                    continue;
                }
                let _ = &grammar.productions[*production];
                return ArgToken::Other;
            }
        }
    }
}

fn single_positive_int(args: &[ArgToken]) -> Option<u32> {
    match args {
        [ArgToken::Real(value)] if *value >= 1.0 && value.fract() == 0.0 => Some(*value as u32),
        _ => None,
    }
}

fn parse_positive_int(token: &ArgToken) -> Option<u32> {
    match token {
        ArgToken::Real(value) if *value >= 1.0 && value.fract() == 0.0 => Some(*value as u32),
        _ => None,
    }
}

fn single_bool(args: &[ArgToken]) -> Option<bool> {
    match args {
        [ArgToken::Bool(value)] => Some(*value),
        _ => None,
    }
}

fn token_text(tree: &ParseTree, node: NodeId) -> String {
    match &tree.node(node).kind {
        ParseTreeNodeKind::Terminal(token) => token.text.clone(),
        ParseTreeNodeKind::Nonterminal { .. } => String::new(),
    }
}

/// Used by the source manager / pipeline driver (spec.md §4.6: "globals may
/// only appear in the top-level source file") to reject globals commands
/// found in imported files before calling [`parse_globals`].
pub fn reject_non_top_level(grammar: &Grammar, tree: &ParseTree, sink: &mut DiagnosticSink) {
    let mut commands = Vec::new();
    if let Some(root) = tree.root {
        let children = tree.children(root);
        if children.len() == 2 {
            collect_command_spans(grammar, tree, children[1], &mut commands);
        }
    }
    for span in commands {
        sink.error(DiagnosticCode::GlobalsIllegalLocation, "instrument-globals commands are only legal in the top-level file", Some(span));
    }
}

fn collect_command_spans(grammar: &Grammar, tree: &ParseTree, mut node: NodeId, out: &mut Vec<Span>) {
    loop {
        let tag = match &tree.node(node).kind {
            ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
            ParseTreeNodeKind::Terminal(_) => return,
        };
        if tag != "top_level_list_cons" {
            return;
        }
        let children = tree.children(node);
        let decl = children[1];
        if let ParseTreeNodeKind::Nonterminal { production, .. } = &tree.node(decl).kind {
            if grammar.productions[*production].tag == "top_level_globals" {
                out.push(tree.node(decl).span);
            }
        }
        node = children[0];
    }
}

/// Unused by `decode_string_literal` here today (no globals command takes a
/// string argument), but kept available for parsing future string-valued
/// commands without re-deriving the decode logic.
#[allow(dead_code)]
fn decode_string_arg(raw: &str) -> String {
    decode_string_literal(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticSink;
    use crate::lexer::lex;
    use crate::parser;

    fn parse_globals_text(text: &str) -> InstrumentGlobals {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), text, &mut sink);
        let tree = parser::parse(&tokens, &mut sink).expect("parse should succeed");
        assert!(sink.is_ok(), "{}", sink);
        parse_globals(parser::grammar(), &tree, SourceHandle::default(), &mut sink)
    }

    #[test]
    fn defaults_with_no_commands() {
        let globals = parse_globals_text("");
        assert_eq!(globals, InstrumentGlobals::default());
    }

    #[test]
    fn max_voices_and_chunk_size() {
        let globals = parse_globals_text("#max_voices(8); #chunk_size(64);");
        assert_eq!(globals.max_voices, 8);
        assert_eq!(globals.chunk_size, 64);
    }

    #[test]
    fn sample_rate_product_has_one_entry_per_value() {
        let globals = parse_globals_text("#sample_rate(44100, 48000);");
        assert_eq!(globals.variants().collect::<Vec<_>>(), vec![44100, 48000]);
    }

    #[test]
    fn duplicate_command_is_an_error() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), "#max_voices(1); #max_voices(2);", &mut sink);
        let tree = parser::parse(&tokens, &mut sink).expect("parse should succeed");
        parse_globals(parser::grammar(), &tree, SourceHandle::default(), &mut sink);
        assert!(!sink.is_ok());
    }
}
