//! Owns every source file referenced during a compilation, by canonical
//! path. Grounded on the teacher's `c_source_file`/handle-table pattern
//! (`original_source/source/compiler/source_file.h`): files are assigned a
//! stable handle on first reference and are never removed for the lifetime
//! of a compilation.

use crate::ast::source::Program;
use crate::diagnostics::{DiagnosticCode, DiagnosticSink};
use crate::lexer::Token;
use crate::parser::ParseTree;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Source files larger than this are rejected with `FileTooBig` rather than
/// read into memory; keeps one malformed import from exhausting memory.
pub const MAX_SOURCE_FILE_BYTES: u64 = 16 * 1024 * 1024;

/// A stable, dense reference to a [`SourceFile`] owned by a [`SourceManager`].
/// Cheap to copy and hash; used throughout the pipeline instead of a path so
/// that equality checks and lookups stay O(1).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct SourceHandle(pub(crate) u32);

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One file's worth of pipeline state. Filled in incrementally as the file
/// moves through lexing, parsing, and import resolution.
#[derive(Debug, Default)]
pub struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub tokens: Vec<Token>,
    pub parse_tree: Option<ParseTree>,
    pub imports: Vec<crate::imports::ResolvedImport>,
    pub ast: Option<Program>,
    /// True only for the file named on the command line; instrument-globals
    /// commands are only legal here (spec §4.6).
    pub is_top_level: bool,
}

/// Owns every [`SourceFile`] by canonical path, deduplicating re-imports of
/// the same file under different relative paths.
#[derive(Debug, Default)]
pub struct SourceManager {
    handles_by_path: HashMap<PathBuf, SourceHandle>,
    files: Vec<SourceFile>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonicalize `path` and return its handle, creating a new, empty
    /// [`SourceFile`] if this is the first time the path has been seen.
    /// `was_new` tells the caller whether the file still needs lexing.
    pub fn get_or_add(&mut self, path: &Path) -> (SourceHandle, bool) {
        let canonical = canonicalize_lexically(path);
        if let Some(&handle) = self.handles_by_path.get(&canonical) {
            return (handle, false);
        }
        let handle = SourceHandle(self.files.len() as u32);
        self.files.push(SourceFile {
            path: canonical.clone(),
            ..Default::default()
        });
        self.handles_by_path.insert(canonical, handle);
        (handle, true)
    }

    pub fn get(&self, handle: SourceHandle) -> &SourceFile {
        &self.files[handle.0 as usize]
    }

    pub fn get_mut(&mut self, handle: SourceHandle) -> &mut SourceFile {
        &mut self.files[handle.0 as usize]
    }

    pub fn handles(&self) -> impl Iterator<Item = SourceHandle> + '_ {
        (0..self.files.len() as u32).map(SourceHandle)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read `path` from disk into the given handle's [`SourceFile`], marking
    /// it top-level when `is_top_level` is set. Failures are pushed onto
    /// `sink` as diagnostics, matching spec §4.1's failure modes.
    pub fn load(
        &mut self,
        handle: SourceHandle,
        is_top_level: bool,
        sink: &mut DiagnosticSink,
    ) -> bool {
        let path = self.get(handle).path.clone();
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(_) => {
                sink.error(
                    DiagnosticCode::FailedToOpen,
                    format!("failed to open source file {}", path.display()),
                    None,
                );
                return false;
            }
        };
        if metadata.len() > MAX_SOURCE_FILE_BYTES {
            sink.error(
                DiagnosticCode::FileTooBig,
                format!(
                    "source file {} is {} bytes, exceeding the {}-byte limit",
                    path.display(),
                    metadata.len(),
                    MAX_SOURCE_FILE_BYTES
                ),
                None,
            );
            return false;
        }
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                sink.error(
                    DiagnosticCode::FailedToRead,
                    format!("failed to read source file {}: {}", path.display(), err),
                    None,
                );
                return false;
            }
        };
        log::debug!("loaded {} ({} bytes)", path.display(), text.len());
        let file = self.get_mut(handle);
        file.text = text;
        file.is_top_level = is_top_level;
        true
    }
}

/// A lexical (non-filesystem-touching) canonicalization: resolves `.`/`..`
/// components without requiring the path to exist yet, falling back to
/// `std::fs::canonicalize` when the file is already on disk. Two import
/// paths that are textually different but refer to the same file collapse
/// to the same handle either way.
fn canonicalize_lexically(path: &Path) -> PathBuf {
    if let Ok(real) = std::fs::canonicalize(path) {
        return real;
    }
    let mut result = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_os_str()),
        }
    }
    result
}
