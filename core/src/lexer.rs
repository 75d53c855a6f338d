//! Turns source text into a flat token stream. Grounded on
//! `original_source/source/compiler/components/lexer.cpp`: a symbol trie for
//! punctuation/operators, a keyword table layered over generic identifier
//! scanning, and the same real-literal/string-literal state machines.

use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::source::SourceHandle;
use crate::span::Span;
use std::collections::HashMap;

/// One token's classification. Keywords are their own variants rather than
/// `Identifier` + a lookup, so the parser's terminal table can match on kind
/// directly.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenKind {
    Identifier,
    LiteralReal,
    LiteralBool,
    LiteralString,

    // keywords
    KwModule,
    KwValue,
    KwNamespace,
    KwImport,
    KwAs,
    KwIf,
    KwElse,
    KwFor,
    KwReturn,
    KwIn,
    KwOut,
    KwConst,
    KwReal,
    KwBool,
    KwString,
    KwVoid,

    // symbols
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,
    Arrow,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    AndAnd,
    OrOr,
    Hash,

    Eof,
    Invalid,
}

impl TokenKind {
    /// Every keyword's exact source spelling, in the order the keyword table
    /// is built from. `true`/`false` are handled separately since both map
    /// to `LiteralBool`.
    fn keyword_table() -> &'static [(&'static str, TokenKind)] {
        &[
            ("module", TokenKind::KwModule),
            ("value", TokenKind::KwValue),
            ("namespace", TokenKind::KwNamespace),
            ("import", TokenKind::KwImport),
            ("as", TokenKind::KwAs),
            ("if", TokenKind::KwIf),
            ("else", TokenKind::KwElse),
            ("for", TokenKind::KwFor),
            ("return", TokenKind::KwReturn),
            ("in", TokenKind::KwIn),
            ("out", TokenKind::KwOut),
            ("const", TokenKind::KwConst),
            ("real", TokenKind::KwReal),
            ("bool", TokenKind::KwBool),
            ("string", TokenKind::KwString),
            ("void", TokenKind::KwVoid),
        ]
    }

    /// Every symbol's exact spelling, longest first so the trie-style scan in
    /// [`read_symbol`] finds the longest match without needing a real trie
    /// data structure.
    fn symbol_table() -> &'static [(&'static str, TokenKind)] {
        &[
            ("==", TokenKind::EqEq),
            ("!=", TokenKind::NotEq),
            ("<=", TokenKind::Le),
            (">=", TokenKind::Ge),
            ("&&", TokenKind::AndAnd),
            ("||", TokenKind::OrOr),
            ("->", TokenKind::Arrow),
            ("(", TokenKind::LParen),
            (")", TokenKind::RParen),
            ("{", TokenKind::LBrace),
            ("}", TokenKind::RBrace),
            ("[", TokenKind::LBracket),
            ("]", TokenKind::RBracket),
            (",", TokenKind::Comma),
            (";", TokenKind::Semicolon),
            (":", TokenKind::Colon),
            (".", TokenKind::Dot),
            ("=", TokenKind::Assign),
            ("+", TokenKind::Plus),
            ("-", TokenKind::Minus),
            ("*", TokenKind::Star),
            ("/", TokenKind::Slash),
            ("%", TokenKind::Percent),
            ("!", TokenKind::Bang),
            ("<", TokenKind::Lt),
            (">", TokenKind::Gt),
            ("#", TokenKind::Hash),
        ]
    }
}

/// One lexed token: its kind, the exact source slice it spans, its location,
/// and the decoded literal value for literal kinds.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub span: Span,
    pub real_value: Option<f32>,
    pub bool_value: Option<bool>,
    /// Whether this token is immediately preceded by a newline (ignoring
    /// intervening whitespace/comments). See SPEC_FULL.md §4.3.
    pub preceded_by_newline: bool,
}

impl Token {
    fn synthetic_eof(span: Span, preceded_by_newline: bool) -> Self {
        Token {
            kind: TokenKind::Eof,
            text: String::new(),
            span,
            real_value: None,
            bool_value: None,
            preceded_by_newline,
        }
    }
}

const INVALID_TOKEN_LIMIT: usize = 100;

/// Lexes the full text of `file`, pushing every token (including a trailing
/// `Eof`) onto the returned vector. Invalid tokens are reported to `sink` and
/// included in the stream as `TokenKind::Invalid` so later stages can still
/// make progress; lexing aborts early only after [`INVALID_TOKEN_LIMIT`]
/// invalid tokens, matching the original lexer's "is this a source file?"
/// bail-out.
pub fn lex(file: SourceHandle, text: &str, sink: &mut DiagnosticSink) -> Vec<Token> {
    let keywords: HashMap<&str, TokenKind> = TokenKind::keyword_table().iter().copied().collect();

    let mut cursor = Cursor::new(file, text);
    let mut tokens = Vec::new();
    let mut invalid_count = 0;

    loop {
        let preceded_by_newline = cursor.skip_trivia();
        let start = cursor.location();

        if cursor.eof() {
            tokens.push(Token::synthetic_eof(cursor.span(start), preceded_by_newline));
            break;
        }

        let mut token = if let Some(token) = read_identifier_or_keyword(&mut cursor, &keywords, start) {
            token
        } else if let Some(token) = read_real_literal(&mut cursor, start) {
            token
        } else if let Some(token) = read_string_literal(&mut cursor, start) {
            token
        } else {
            read_symbol(&mut cursor, start)
        };
        token.preceded_by_newline = preceded_by_newline;

        if token.kind == TokenKind::Invalid {
            invalid_count += 1;
            sink.error(
                DiagnosticCode::InvalidToken,
                format!("invalid token '{}'", token.text),
                Some(token.span),
            );
            if invalid_count >= INVALID_TOKEN_LIMIT {
                sink.error(
                    DiagnosticCode::TooManyInvalidTokens,
                    format!("{} invalid tokens were encountered, is this a source file?", invalid_count),
                    Some(token.span),
                );
                tokens.push(token);
                tokens.push(Token::synthetic_eof(cursor.span(cursor.location()), false));
                break;
            }
        }

        tokens.push(token);
    }

    tokens
}

struct Location {
    offset: usize,
    line: u32,
    col: u32,
}

struct Cursor<'a> {
    file: SourceHandle,
    text: &'a str,
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    col: u32,
}

impl<'a> Cursor<'a> {
    fn new(file: SourceHandle, text: &'a str) -> Self {
        Cursor {
            file,
            text,
            bytes: text.as_bytes(),
            offset: 0,
            line: 1,
            col: 1,
        }
    }

    fn eof(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    fn peek_at(&self, ahead: usize) -> u8 {
        self.bytes.get(self.offset + ahead).copied().unwrap_or(0)
    }

    fn peek(&self) -> u8 {
        self.peek_at(0)
    }

    fn advance(&mut self) {
        debug_assert!(!self.eof());
        if self.peek() == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        self.offset += 1;
    }

    fn location(&self) -> Location {
        Location {
            offset: self.offset,
            line: self.line,
            col: self.col,
        }
    }

    fn span(&self, start: Location) -> Span {
        Span {
            file: self.file,
            offset: start.offset,
            length: self.offset - start.offset,
            start_line: start.line,
            start_col: start.col,
            end_line: self.line,
            end_col: self.col,
        }
    }

    /// Skips whitespace and `//` line comments, returning whether a newline
    /// was crossed anywhere in the skipped span.
    fn skip_trivia(&mut self) -> bool {
        let mut saw_newline = false;
        loop {
            let mut advanced = false;
            while !self.eof() && matches!(self.peek(), b' ' | b'\t' | b'\r' | b'\n') {
                if self.peek() == b'\n' {
                    saw_newline = true;
                }
                self.advance();
                advanced = true;
            }
            if !self.eof() && self.peek() == b'/' && self.peek_at(1) == b'/' {
                self.advance();
                self.advance();
                while !self.eof() && self.peek() != b'\n' {
                    self.advance();
                }
                advanced = true;
            }
            if !advanced {
                break;
            }
        }
        saw_newline
    }

    fn is_digit(&self) -> bool {
        self.peek().is_ascii_digit()
    }

    fn is_identifier_start(&self) -> bool {
        let c = self.peek();
        c.is_ascii_alphabetic() || c == b'_'
    }

    fn is_identifier_continue(&self) -> bool {
        self.is_identifier_start() || self.is_digit()
    }
}

fn read_identifier_or_keyword(
    cursor: &mut Cursor,
    keywords: &HashMap<&str, TokenKind>,
    start: Location,
) -> Option<Token> {
    if !cursor.is_identifier_start() {
        return None;
    }
    let byte_start = cursor.offset;
    while !cursor.eof() && cursor.is_identifier_continue() {
        cursor.advance();
    }
    let text = &cursor.text[byte_start..cursor.offset];

    let (kind, bool_value) = if text == "true" {
        (TokenKind::LiteralBool, Some(true))
    } else if text == "false" {
        (TokenKind::LiteralBool, Some(false))
    } else if let Some(&kw) = keywords.get(text) {
        (kw, None)
    } else {
        (TokenKind::Identifier, None)
    };

    Some(Token {
        kind,
        text: text.to_string(),
        span: cursor.span(start),
        real_value: None,
        bool_value,
        preceded_by_newline: false,
    })
}

/// Mirrors the original's JSON-style number grammar:
/// `integer fraction? exponent?`, rejecting a leading zero followed by more
/// digits and a bare `.`/`e` with no digits after it.
fn read_real_literal(cursor: &mut Cursor, start: Location) -> Option<Token> {
    if !cursor.is_digit() && !(cursor.peek() == b'-' && cursor.peek_at(1).is_ascii_digit()) {
        return None;
    }

    let byte_start = cursor.offset;
    let mut invalid = false;

    if cursor.peek() == b'-' {
        cursor.advance();
    }

    if cursor.peek() == b'0' {
        cursor.advance();
        if cursor.is_digit() {
            invalid = true;
            while cursor.is_digit() {
                cursor.advance();
            }
        }
    } else {
        while cursor.is_digit() {
            cursor.advance();
        }
    }

    if !invalid && cursor.peek() == b'.' {
        cursor.advance();
        if !cursor.is_digit() {
            invalid = true;
        } else {
            while cursor.is_digit() {
                cursor.advance();
            }
        }
    }

    if !invalid && matches!(cursor.peek(), b'e' | b'E') {
        cursor.advance();
        if matches!(cursor.peek(), b'+' | b'-') {
            cursor.advance();
        }
        if !cursor.is_digit() {
            invalid = true;
        } else {
            while cursor.is_digit() {
                cursor.advance();
            }
        }
    }

    let text = cursor.text[byte_start..cursor.offset].to_string();
    if invalid {
        return Some(Token {
            kind: TokenKind::Invalid,
            text,
            span: cursor.span(start),
            real_value: None,
            bool_value: None,
            preceded_by_newline: false,
        });
    }

    let real_value = text.parse::<f32>().ok();
    Some(Token {
        kind: if real_value.is_some() { TokenKind::LiteralReal } else { TokenKind::Invalid },
        text,
        span: cursor.span(start),
        real_value,
        bool_value: None,
        preceded_by_newline: false,
    })
}

/// Reads a double-quoted string, accepting `\"`, `\\`, `\b`, `\f`, `\n`,
/// `\r`, `\t`, and `\uXXXX` (ASCII range only), matching
/// `try_read_string_constant` in the original lexer.
fn read_string_literal(cursor: &mut Cursor, start: Location) -> Option<Token> {
    if cursor.peek() != b'"' {
        return None;
    }
    let byte_start = cursor.offset;
    cursor.advance();

    let mut failed = false;
    loop {
        if cursor.eof() {
            failed = true;
            break;
        }
        let c = cursor.peek();
        cursor.advance();
        if c == b'"' {
            break;
        } else if c == b'\\' {
            if cursor.eof() {
                failed = true;
                break;
            }
            let escape = cursor.peek();
            cursor.advance();
            match escape {
                b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => {}
                b'u' => {
                    for _ in 0..4 {
                        let h = cursor.peek();
                        if h.is_ascii_hexdigit() {
                            cursor.advance();
                        } else {
                            failed = true;
                            break;
                        }
                    }
                }
                _ => failed = true,
            }
        } else if c < 0x20 {
            failed = true;
        }
    }

    let text = cursor.text[byte_start..cursor.offset].to_string();
    Some(Token {
        kind: if failed { TokenKind::Invalid } else { TokenKind::LiteralString },
        text,
        span: cursor.span(start),
        real_value: None,
        bool_value: None,
        preceded_by_newline: false,
    })
}

/// Decodes a `LiteralString` token's raw text (quotes and escapes included)
/// into the string it denotes. Used by both the AST builder and the import
/// resolver, which both need the decoded text of a string literal.
pub fn decode_string_literal(raw: &str) -> String {
    let inner = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(raw);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{C}'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('u') => {
                let hex: String = (0..4).filter_map(|_| chars.next()).collect();
                if let Ok(value) = u32::from_str_radix(&hex, 16) {
                    if let Some(ch) = char::from_u32(value) {
                        out.push(ch);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Longest-match scan over the symbol table. The table is small enough that
/// a linear longest-prefix search over it stands in for the original's
/// character-by-character trie without materializing one.
fn read_symbol(cursor: &mut Cursor, start: Location) -> Token {
    debug_assert!(!cursor.eof());
    let remaining = &cursor.text[cursor.offset..];

    let mut best: Option<(&str, TokenKind)> = None;
    for &(symbol, kind) in TokenKind::symbol_table() {
        if remaining.starts_with(symbol) {
            if best.map_or(true, |(b, _)| symbol.len() > b.len()) {
                best = Some((symbol, kind));
            }
        }
    }

    match best {
        Some((symbol, kind)) => {
            for _ in 0..symbol.len() {
                cursor.advance();
            }
            Token {
                kind,
                text: symbol.to_string(),
                span: cursor.span(start),
                real_value: None,
                bool_value: None,
                preceded_by_newline: false,
            }
        }
        None => {
            let text = remaining.chars().next().map(|c| c.to_string()).unwrap_or_default();
            for _ in 0..text.len() {
                cursor.advance();
            }
            Token {
                kind: TokenKind::Invalid,
                text,
                span: cursor.span(start),
                real_value: None,
                bool_value: None,
                preceded_by_newline: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceHandle;

    fn lex_ok(text: &str) -> Vec<Token> {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), text, &mut sink);
        assert!(sink.is_ok(), "unexpected diagnostics: {}", sink);
        tokens
    }

    #[test]
    fn lexes_keywords_and_identifiers() {
        let tokens = lex_ok("module foo value bar");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::KwModule,
                TokenKind::Identifier,
                TokenKind::KwValue,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_bool_literals() {
        let tokens = lex_ok("true false");
        assert_eq!(tokens[0].bool_value, Some(true));
        assert_eq!(tokens[1].bool_value, Some(false));
    }

    #[test]
    fn rejects_leading_zero() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), "01", &mut sink);
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert!(!sink.is_ok());
    }

    #[test]
    fn lexes_real_literal_with_exponent() {
        let tokens = lex_ok("1.5e-3");
        assert_eq!(tokens[0].kind, TokenKind::LiteralReal);
        assert!((tokens[0].real_value.unwrap() - 1.5e-3).abs() < 1e-9);
    }

    #[test]
    fn longest_match_wins_for_symbols() {
        let tokens = lex_ok("<= < ==");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Le, TokenKind::Lt, TokenKind::EqEq, TokenKind::Eof]
        );
    }

    #[test]
    fn records_preceded_by_newline() {
        let tokens = lex_ok("a\nb");
        assert!(!tokens[0].preceded_by_newline);
        assert!(tokens[1].preceded_by_newline);
    }

    #[test]
    fn string_literal_with_escapes() {
        let tokens = lex_ok(r#""hello\nworldA""#);
        assert_eq!(tokens[0].kind, TokenKind::LiteralString);
    }

    #[test]
    fn unterminated_string_is_invalid() {
        let mut sink = DiagnosticSink::new();
        let tokens = lex(SourceHandle::default(), "\"unterminated", &mut sink);
        assert_eq!(tokens[0].kind, TokenKind::Invalid);
        assert!(!sink.is_ok());
    }
}
