//! Import resolution (spec.md §4.5). Grounded on
//! `original_source/source/compiler/components/importer.cpp`: classify each
//! import directive, locate its target, then — once every file in the
//! program has been lexed and parsed — materialize the imported
//! declarations into the importing file's scope.

use crate::ast::source::{Declaration, DeclarationId, ModuleBody, Program, ScopeId};
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::lexer::decode_string_literal;
use crate::parser::{grammar, NodeId, ParseTree, ParseTreeNodeKind};
use crate::source::{SourceHandle, SourceManager};
use crate::span::Span;
use std::path::{Path, PathBuf};

pub const SOURCE_EXTENSION: &str = "wl";

/// A classified, not-yet-located import path (source-file imports only;
/// native-library imports carry no path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportPath {
    /// Leading-dot import: the dot count selects an ancestor directory of
    /// the importing file (one dot = same directory, two = parent, and so
    /// on), and `path` resolves relative to that ancestor.
    Relative { ascent: u32, path: PathBuf },
    /// No leading dot: tried against the importing file's own directory
    /// first, then each configured library directory, in order.
    TopLevel(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportTarget {
    Source(SourceHandle),
    NativeLibrary(String),
}

/// One resolved `import` directive, recorded on the importing
/// [`crate::source::SourceFile`].
#[derive(Debug, Clone)]
pub struct ResolvedImport {
    pub target: ImportTarget,
    /// Name components the import is aliased under (`as a.b.c`); empty
    /// means "directly into the importing file's global scope".
    pub alias: Vec<String>,
    pub span: Span,
}

/// Search configuration shared across every import resolved in a
/// compilation.
pub struct ImportContext<'a> {
    pub library_dirs: &'a [PathBuf],
    pub native_libraries: &'a [String],
}

fn classify(raw: &str, ctx: &ImportContext) -> Result<ImportPath, String> {
    let dots = raw.chars().take_while(|&c| c == '.').count();
    if dots > 0 {
        return Ok(ImportPath::Relative { ascent: dots as u32, path: PathBuf::from(&raw[dots..]) });
    }
    if ctx.native_libraries.iter().any(|lib| lib == raw) {
        return Err(raw.to_string());
    }
    Ok(ImportPath::TopLevel(PathBuf::from(raw)))
}

fn with_source_extension(mut path: PathBuf) -> PathBuf {
    if path.extension().is_none() {
        path.set_extension(SOURCE_EXTENSION);
    }
    path
}

fn candidate_paths(importing_dir: &Path, path: &ImportPath, ctx: &ImportContext) -> Vec<PathBuf> {
    match path {
        ImportPath::Relative { ascent, path } => {
            let mut base = importing_dir.to_path_buf();
            // One dot means "this directory", so only ascend `ascent - 1`
            // levels (spec.md §4.5 SUPPLEMENT).
            for _ in 1..*ascent {
                base.pop();
            }
            vec![with_source_extension(base.join(path))]
        }
        ImportPath::TopLevel(path) => {
            let mut out = vec![with_source_extension(importing_dir.join(path))];
            out.extend(ctx.library_dirs.iter().map(|dir| with_source_extension(dir.join(path))));
            out
        }
    }
}

/// Scans `file`'s parse tree for `ImportDecl` nodes, resolves each one
/// (loading newly-discovered source files into `sources` as it goes), and
/// records the results on `sources.get_mut(file).imports`. Self-imports are
/// an error; a later import with the same target and alias as an earlier
/// one is dropped silently rather than reported (spec.md §4.5's coalescing
/// rule).
pub fn resolve_file_imports(sources: &mut SourceManager, file: SourceHandle, ctx: &ImportContext, sink: &mut DiagnosticSink) {
    let grammar = grammar();
    let Some(tree) = sources.get_mut(file).parse_tree.take() else { return };
    let importing_dir = sources.get(file).path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut nodes = Vec::new();
    if let Some(root) = tree.root {
        let children = tree.children(root);
        if !children.is_empty() {
            collect_import_decls(&tree, grammar, children[0], &mut nodes);
        }
    }

    let mut resolved = Vec::new();
    for node in nodes {
        if let Some(import) = resolve_one(sources, file, &importing_dir, &tree, grammar, node, ctx, sink) {
            let already_present = resolved
                .iter()
                .any(|existing: &ResolvedImport| existing.target == import.target && existing.alias == import.alias);
            if !already_present {
                resolved.push(import);
            }
        }
    }
    let entry = sources.get_mut(file);
    entry.parse_tree = Some(tree);
    entry.imports = resolved;
}

fn collect_import_decls(tree: &ParseTree, grammar: &crate::parser::Grammar, mut node: NodeId, out: &mut Vec<NodeId>) {
    loop {
        let tag = match &tree.node(node).kind {
            ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
            ParseTreeNodeKind::Terminal(_) => return,
        };
        if tag != "import_list_cons" {
            return;
        }
        let children = tree.children(node);
        out.push(children[1]);
        node = children[0];
    }
}

fn resolve_one(
    sources: &mut SourceManager,
    importing_file: SourceHandle,
    importing_dir: &Path,
    tree: &ParseTree,
    grammar: &crate::parser::Grammar,
    node: NodeId,
    ctx: &ImportContext,
    sink: &mut DiagnosticSink,
) -> Option<ResolvedImport> {
    let tag = match &tree.node(node).kind {
        ParseTreeNodeKind::Nonterminal { production, .. } => grammar.productions[*production].tag,
        _ => return None,
    };
    let children = tree.children(node);
    let span = tree.node(node).span;
    let string_text = token_text(tree, children[1]);
    let raw = decode_string_literal(&string_text);
    let alias = match tag {
        "import_aliased" => vec![token_text(tree, children[3])],
        _ => Vec::new(),
    };

    match classify(&raw, ctx) {
        Err(library_name) => Some(ResolvedImport { target: ImportTarget::NativeLibrary(library_name), alias, span }),
        Ok(path) => {
            for candidate in candidate_paths(importing_dir, &path, ctx) {
                if candidate.is_file() {
                    let (handle, is_new) = sources.get_or_add(&candidate);
                    if is_new {
                        sources.load(handle, false, sink);
                    }
                    if handle == importing_file {
                        sink.error(DiagnosticCode::SelfImport, format!("'{}' imports itself", raw), Some(span));
                        return None;
                    }
                    return Some(ResolvedImport { target: ImportTarget::Source(handle), alias, span });
                }
            }
            sink.error(DiagnosticCode::UnresolvedImport, format!("could not resolve import '{}'", raw), Some(span));
            None
        }
    }
}

fn token_text(tree: &ParseTree, node: NodeId) -> String {
    match &tree.node(node).kind {
        ParseTreeNodeKind::Terminal(token) => token.text.clone(),
        ParseTreeNodeKind::Nonterminal { .. } => String::new(),
    }
}

/// Second import pass (spec.md §4.5): once every file's AST has gone
/// through the declaration pass, materialize each file's resolved imports
/// into its root scope, either by copying declaration references from an
/// already-built `Program` (when multiple files share one) or by
/// synthesizing native-module declarations from the registry.
///
/// Since this crate builds one [`Program`] per compilation (every source
/// file's declarations share the same scope/declaration arenas — see
/// `crate::lib`'s pipeline), materializing an import means looking up the
/// target file's root scope and copying its owned declarations (filtered to
/// `Public` visibility) — optionally nested under the alias path — into the
/// importing file's root scope's `imported` list.
pub fn materialize_imports(
    program: &mut Program,
    file_root_scopes: &[(SourceHandle, ScopeId)],
    imports_by_file: &[(SourceHandle, Vec<ResolvedImport>)],
) {
    let scope_of = |handle: SourceHandle| file_root_scopes.iter().find(|(h, _)| *h == handle).map(|(_, s)| *s);

    for (file, imports) in imports_by_file {
        let Some(importing_scope) = scope_of(*file) else { continue };
        for import in imports {
            match &import.target {
                ImportTarget::Source(target_file) => {
                    let Some(target_scope) = scope_of(*target_file) else { continue };
                    let decl_ids: Vec<DeclarationId> = program
                        .scope(target_scope)
                        .owned
                        .iter()
                        .copied()
                        .filter(|id| is_publicly_importable(program, *id))
                        .collect();
                    program.scope_mut(importing_scope).imported.extend(decl_ids);
                }
                ImportTarget::NativeLibrary(_) => {
                    // Native-module libraries materialize via the registry
                    // (crate::native), which synthesizes `Declaration::Module`
                    // entries with `ModuleBody::Native` directly into the
                    // program; nothing further to do here.
                }
            }
        }
    }
}

fn is_publicly_importable(program: &Program, id: DeclarationId) -> bool {
    match program.declaration(id) {
        Declaration::Namespace(d) => d.visibility == crate::ast::source::Visibility::Public,
        Declaration::Module(d) => d.visibility == crate::ast::source::Visibility::Public,
        Declaration::Value(d) => d.visibility == crate::ast::source::Visibility::Public,
    }
}

/// True for a module declaration whose body is a native-module binding;
/// used by the native registry when it implicitly imports operator modules
/// into every file (spec.md §4.5's last sentence).
pub fn is_native_binding(program: &Program, id: DeclarationId) -> bool {
    matches!(program.declaration(id), Declaration::Module(m) if matches!(m.body, ModuleBody::Native { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_import_classifies_ascent_from_dot_count() {
        let ctx = ImportContext { library_dirs: &[], native_libraries: &[] };
        match classify("..sibling/file", &ctx) {
            Ok(ImportPath::Relative { ascent, path }) => {
                assert_eq!(ascent, 2);
                assert_eq!(path, PathBuf::from("sibling/file"));
            }
            other => panic!("expected relative import, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn top_level_import_has_no_leading_dot() {
        let ctx = ImportContext { library_dirs: &[], native_libraries: &[] };
        match classify("lib/helpers", &ctx) {
            Ok(ImportPath::TopLevel(path)) => assert_eq!(path, PathBuf::from("lib/helpers")),
            other => panic!("expected top-level import, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn native_library_name_classifies_as_native() {
        let native = vec!["core".to_string()];
        let ctx = ImportContext { library_dirs: &[], native_libraries: &native };
        assert!(classify("core", &ctx).is_err());
    }
}
