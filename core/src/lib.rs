//! WaveLang compiler core: lexing through task-graph lowering and binary
//! serialization (spec.md §4). [`compile`] drives the whole pipeline for
//! one top-level instrument file; everything else is exposed for tooling
//! (the CLI, tests) that wants to drive individual stages.

pub mod ast;
pub mod diagnostics;
pub mod globals;
pub mod graph;
pub mod imports;
pub mod lexer;
pub mod native;
pub mod parser;
pub mod serialize;
pub mod source;
pub mod span;
pub mod task;
pub mod types;
pub mod variant;

use ast::source::{Program, ScopeId};
use diagnostics::{DiagnosticCode, DiagnosticSink};
use globals::InstrumentGlobals;
use imports::{ImportContext, ResolvedImport};
use native::{library_core, Registry};
use source::{SourceHandle, SourceManager};
use std::path::{Path, PathBuf};
use task::TaskGraph;

/// Knobs a caller (the CLI, or a test) can set for one compilation.
pub struct CompilerOptions {
    /// Additional directories searched for dot-free (`TopLevel`) imports,
    /// after the importing file's own directory (spec.md §4.5).
    pub library_dirs: Vec<PathBuf>,
    /// Disabled only for debugging the optimizer itself; every shipped
    /// instrument should compile with this on (spec.md §4.8).
    pub optimizations_enabled: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions { library_dirs: Vec::new(), optimizations_enabled: true }
    }
}

/// The names native-library imports may bind to. Only `core` exists in
/// this revision (spec.md's built-in operator/standard-function library);
/// additional libraries would extend this list and `native::Registry`'s
/// registration step together.
const NATIVE_LIBRARY_NAMES: &[&str] = &["core"];

/// One compiled instrument: a task graph per instrument-globals variant,
/// plus the instrument file's serialized bytes (spec.md §4.10/§6.2).
pub struct CompiledInstrument {
    pub task_graphs: Vec<TaskGraph>,
    pub bytes: Vec<u8>,
}

/// The outcome of a compilation: the accumulated diagnostics, plus the
/// compiled instrument if no error-severity diagnostic was reported
/// (spec.md §7's "errors gate progression" policy).
pub struct CompileResult {
    pub diagnostics: DiagnosticSink,
    pub instrument: Option<CompiledInstrument>,
}

fn build_registry(optimizations_enabled: bool) -> Result<Registry, DiagnosticCode> {
    let mut registry = Registry::new();
    registry.initialize();
    registry.begin_registration();
    registry.set_optimizations_enabled(optimizations_enabled);
    library_core::register(&mut registry)?;
    registry.finalize()?;
    if optimizations_enabled {
        if let Some(rule) = graph::pattern::neg_neg_identity(&registry) {
            registry.register_optimization_rule(rule);
        }
        for rule in graph::pattern::add_zero_identities(&registry) {
            registry.register_optimization_rule(rule);
        }
    }
    Ok(registry)
}

/// Lexes and parses every file reachable from `top_level_path`, discovering
/// imports breadth-first as each newly-loaded file is parsed (spec.md
/// §4.1/§4.5). Returns the populated [`SourceManager`]; files that failed
/// to lex or parse are left with no parse tree and have already pushed
/// their diagnostics onto `sink`.
fn load_and_parse_all(top_level_path: &Path, library_dirs: &[PathBuf], sink: &mut DiagnosticSink) -> SourceManager {
    let mut sources = SourceManager::new();
    let (top_handle, _) = sources.get_or_add(top_level_path);
    sources.load(top_handle, true, sink);

    let native_libraries: Vec<String> = NATIVE_LIBRARY_NAMES.iter().map(|s| s.to_string()).collect();
    let ctx = ImportContext { library_dirs, native_libraries: &native_libraries };

    let mut processed = 0usize;
    loop {
        let batch: Vec<SourceHandle> = sources.handles().skip(processed).collect();
        if batch.is_empty() {
            break;
        }
        for handle in batch {
            let text = sources.get(handle).text.clone();
            let tokens = lexer::lex(handle, &text, sink);
            let tree = parser::parse(&tokens, sink);
            let file = sources.get_mut(handle);
            file.tokens = tokens;
            file.parse_tree = tree;
            let is_top_level = sources.get(handle).is_top_level;
            if let Some(tree) = sources.get(handle).parse_tree.as_ref() {
                if !is_top_level {
                    globals::reject_non_top_level(&parser::grammar(), tree, sink);
                }
            }
            if sources.get(handle).parse_tree.is_some() {
                imports::resolve_file_imports(&mut sources, handle, &ctx, sink);
            }
            processed += 1;
        }
    }
    sources
}

/// Builds one shared [`Program`] spanning every loaded file: each file's
/// declaration pass runs into the same arena, native-module declarations
/// are synthesized into every file's root scope, and resolved imports are
/// materialized once every file has declared (spec.md §4.5/§4.7).
fn build_program(sources: &SourceManager, registry: &Registry, sink: &mut DiagnosticSink) -> (Program, Vec<(SourceHandle, ScopeId)>) {
    let mut program = Program::default();
    let mut file_root_scopes: Vec<(SourceHandle, ScopeId)> = Vec::new();

    for handle in sources.handles() {
        let Some(tree) = sources.get(handle).parse_tree.as_ref() else { continue };
        let scope = ast::builder::declare_file(&mut program, handle, tree, sink);
        native::declare_into_program(registry, &mut program, scope, handle);
        file_root_scopes.push((handle, scope));
    }

    let imports_by_file: Vec<(SourceHandle, Vec<ResolvedImport>)> =
        sources.handles().map(|h| (h, sources.get(h).imports.clone())).collect();
    imports::materialize_imports(&mut program, &file_root_scopes, &imports_by_file);

    program.root_scope = file_root_scopes
        .iter()
        .find(|(h, _)| sources.get(*h).is_top_level)
        .map(|(_, s)| *s)
        .unwrap_or_default();

    ast::builder::resolve_program(&mut program, sink);
    (program, file_root_scopes)
}

/// Runs the full pipeline (spec.md §4) over `top_level_path`: load/lex/parse
/// every reachable file, build and resolve one shared AST, extract and
/// lower `voice_main`/`fx_main` into one execution graph per
/// instrument-globals variant, optimize each, lower it to a task graph, and
/// serialize the whole instrument to bytes.
pub fn compile(top_level_path: &Path, options: &CompilerOptions) -> CompileResult {
    let mut sink = DiagnosticSink::new();

    let registry = match build_registry(options.optimizations_enabled) {
        Ok(registry) => registry,
        Err(code) => {
            sink.error(code, "failed to initialize the native-module registry", None);
            return CompileResult { diagnostics: sink, instrument: None };
        }
    };

    let sources = load_and_parse_all(top_level_path, &options.library_dirs, &mut sink);
    if !sink.is_ok() {
        return CompileResult { diagnostics: sink, instrument: None };
    }

    let (program, file_root_scopes) = build_program(&sources, &registry, &mut sink);
    if !sink.is_ok() {
        return CompileResult { diagnostics: sink, instrument: None };
    }

    let top_level_handle = sources.handles().find(|h| sources.get(*h).is_top_level);
    let Some(top_level_handle) = top_level_handle else {
        sink.error(DiagnosticCode::FailedToFind, "no top-level source file", None);
        return CompileResult { diagnostics: sink, instrument: None };
    };
    let top_level_scope = file_root_scopes.iter().find(|(h, _)| *h == top_level_handle).map(|(_, s)| *s);
    let Some(top_level_scope) = top_level_scope else {
        sink.error(DiagnosticCode::FailedToFind, "top-level source file was not declared", None);
        return CompileResult { diagnostics: sink, instrument: None };
    };

    let instrument_globals = match sources.get(top_level_handle).parse_tree.as_ref() {
        Some(tree) => globals::parse_globals(parser::grammar(), tree, top_level_handle, &mut sink),
        None => InstrumentGlobals::default(),
    };

    let entry_points = variant::extract_entry_points(&program, top_level_scope, &mut sink);
    if entry_points.voice_main.is_none() {
        sink.error(DiagnosticCode::EntryPointInvalidSignature, "top-level file declares no voice_main", None);
    }
    if !sink.is_ok() {
        return CompileResult { diagnostics: sink, instrument: None };
    }

    let mut graphs = variant::build_variants(&program, &registry, &entry_points, &instrument_globals, &mut sink);
    for graph in &mut graphs {
        graph::optimizer::optimize(graph, &registry, &mut sink);
    }
    if !sink.is_ok() {
        return CompileResult { diagnostics: sink, instrument: None };
    }

    let mut task_graphs = Vec::with_capacity(graphs.len());
    for graph in &graphs {
        match task::builder::build_task_graph(graph, &registry) {
            Ok(task_graph) => task_graphs.push(task_graph),
            Err(code) => sink.error(code, "failed to lower an execution graph to a task graph", None),
        }
    }
    if !sink.is_ok() {
        return CompileResult { diagnostics: sink, instrument: None };
    }

    let bytes = serialize::write_instrument(&graphs);
    CompileResult { diagnostics: sink, instrument: Some(CompiledInstrument { task_graphs, bytes }) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("wavelang_lib_test_{}_{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).expect("create temp source file");
        file.write_all(contents.as_bytes()).expect("write temp source file");
        path
    }

    #[test]
    fn compiles_a_minimal_instrument() {
        let path = write_temp(
            "minimal.wl",
            r#"
            module bool voice_main(out real left, out real right) {
                left = 0.5;
                right = -left;
                return true;
            }
            "#,
        );
        let result = compile(&path, &CompilerOptions::default());
        assert!(result.diagnostics.is_ok(), "diagnostics: {}", result.diagnostics);
        let instrument = result.instrument.expect("compilation should succeed");
        assert_eq!(instrument.task_graphs.len(), 1);
        assert!(!instrument.bytes.is_empty());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_voice_main_is_an_error() {
        let path = write_temp("no_entry.wl", "real x = 1.0;\n");
        let result = compile(&path, &CompilerOptions::default());
        assert!(!result.diagnostics.is_ok());
        assert!(result.instrument.is_none());
        let _ = std::fs::remove_file(&path);
    }
}
