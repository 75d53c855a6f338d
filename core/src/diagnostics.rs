//! The diagnostic sink: the single coordination object threaded through
//! every pipeline stage. Grounded on the teacher's `error.rs`
//! (`SourceError`/`SourceErrorWrapper`/`WithSource`) generalized from two
//! closed error enums (`CompileError`, `RuntimeError`) to the single
//! ~40-kind taxonomy spec.md §7 calls for, since WaveLang has no separate
//! runtime-error phase in this pipeline (runtime is out of scope).

use crate::span::Span;
use serde::Serialize;
use std::fmt;

/// Closed taxonomy of diagnostic kinds, grouped by the categories in spec.md
/// §7. `thiserror::Error` gives each a `Display` impl derived from the
/// `#[error(...)]` message; [`Diagnostic`] wraps one with its location and
/// severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum DiagnosticCode {
    // --- file ---
    #[error("failed to find source file")]
    FailedToFind,
    #[error("failed to open source file")]
    FailedToOpen,
    #[error("failed to read source file")]
    FailedToRead,
    #[error("source file exceeds the maximum allowed size")]
    FileTooBig,

    // --- lex/parse ---
    #[error("invalid token")]
    InvalidToken,
    #[error("too many invalid tokens")]
    TooManyInvalidTokens,
    #[error("unexpected token")]
    UnexpectedToken,

    // --- import ---
    #[error("a file cannot import itself")]
    SelfImport,
    #[error("unresolved import")]
    UnresolvedImport,

    // --- instrument-globals ---
    #[error("unknown instrument-globals command")]
    UnknownGlobalsCommand,
    #[error("instrument-globals command used outside the top-level file")]
    GlobalsIllegalLocation,
    #[error("instrument-globals command given bad parameters")]
    GlobalsBadParameters,
    #[error("instrument-globals command given more than once")]
    GlobalsDuplicate,

    // --- type ---
    #[error("illegal data type")]
    IllegalDataType,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("illegal implicit conversion")]
    IllegalConversion,
    #[error("array elements have inconsistent types")]
    InconsistentArrayElementTypes,
    #[error("return type does not match the declared return type")]
    ReturnTypeMismatch,

    // --- declaration ---
    #[error("illegal out-argument")]
    IllegalOutArgument,
    #[error("illegal argument ordering")]
    IllegalArgumentOrdering,
    #[error("duplicate declaration")]
    DuplicateDeclaration,
    #[error("conflicting declaration")]
    DeclarationConflict,
    #[error("missing return statement")]
    MissingReturn,

    // --- identifier ---
    #[error("identifier not allowed in this context")]
    IdentifierNotAllowed,
    #[error("failed to resolve identifier")]
    IdentifierFailed,
    #[error("identifier reference is ambiguous")]
    IdentifierAmbiguous,

    // --- call ---
    #[error("value is not callable")]
    NotCallable,
    #[error("invalid named argument")]
    InvalidNamedArgument,
    #[error("too many arguments")]
    TooManyArguments,
    #[error("duplicate argument")]
    DuplicateArgument,
    #[error("argument direction mismatch")]
    DirectionMismatch,
    #[error("missing required argument")]
    MissingArgument,
    #[error("ambiguous overload")]
    AmbiguousOverload,
    #[error("empty overload set")]
    EmptyOverloadSet,
    #[error("invalid out-argument usage")]
    InvalidOutArgument,

    // --- entry point ---
    #[error("ambiguous entry point")]
    EntryPointAmbiguous,
    #[error("invalid entry-point signature")]
    EntryPointInvalidSignature,
    #[error("incompatible voice_main/fx_main signatures")]
    EntryPointIncompatibleVoiceFx,

    // --- evaluation ---
    #[error("self-referential constant")]
    SelfReferentialConstant,
    #[error("maximum call depth exceeded")]
    CallDepthExceeded,
    #[error("array index out of bounds")]
    ArrayOutOfBounds,
    #[error("native module reported an error")]
    NativeModuleError,
    #[error("invalid native-module implementation")]
    InvalidNativeModuleImplementation,

    // --- warnings ---
    #[error("initializer on an entry-point argument is ignored")]
    EntryPointInitializerIgnored,
    #[error("native module reported a warning")]
    NativeModuleWarning,
}

/// Error vs. advisory. Only `Error` gates pipeline progression (spec §4.2,
/// §7); `Warning` and `Message` are purely informational.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Severity {
    Message,
    Warning,
    Error,
}

/// One diagnostic: a code, a human-readable message, an optional source
/// location, and the severity that determines whether it gates the
/// pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub message: String,
    pub location: Option<Span>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Message => "note",
        };
        match self.location {
            Some(span) => write!(f, "{}: {} (at {})", prefix, self.message, span),
            None => write!(f, "{}: {}", prefix, self.message),
        }
    }
}

/// Accumulates diagnostics for an entire compilation. Every stage takes a
/// `&mut DiagnosticSink` and pushes into it rather than returning `Result`
/// for recoverable, per-item failures, so that e.g. the lexer can report
/// every invalid token in a file instead of stopping at the first one
/// (spec §7's "continues processing within its own local scope" policy).
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        severity: Severity,
        code: DiagnosticCode,
        message: impl Into<String>,
        location: Option<Span>,
    ) {
        match severity {
            Severity::Error => self.error_count += 1,
            Severity::Warning => self.warning_count += 1,
            Severity::Message => {}
        }
        let message = message.into();
        log::debug!("diagnostic: {:?} {:?} {}", severity, code, message);
        self.diagnostics.push(Diagnostic {
            severity,
            code,
            message,
            location,
        });
    }

    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, location: Option<Span>) {
        self.push(Severity::Error, code, message, location);
    }

    pub fn warning(&mut self, code: DiagnosticCode, message: impl Into<String>, location: Option<Span>) {
        self.push(Severity::Warning, code, message, location);
    }

    pub fn message(&mut self, code: DiagnosticCode, message: impl Into<String>, location: Option<Span>) {
        self.push(Severity::Message, code, message, location);
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    pub fn is_ok(&self) -> bool {
        self.error_count == 0
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

impl fmt::Display for DiagnosticSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.diagnostics.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", diagnostic)?;
        }
        Ok(())
    }
}
