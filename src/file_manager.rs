//! File Manager for tucc
//!
//! Indexed byte buffers keyed by absolute path. Every file that enters the
//! compilation (the main source file, every `#include` target) is read once
//! and retained for the lifetime of the compilation so that source locations
//! recorded during lexing stay valid for diagnostics printed much later.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Stable index into the file manager's table. Source locations carry this
/// instead of a path so that comparisons and copies stay cheap.
pub type FileIndex = usize;

struct FileEntry {
    path: PathBuf,
    bytes: Vec<u8>,
    /// Byte offset of the start of each line, used to resolve a byte offset
    /// back into (line, column) for diagnostics.
    line_starts: Vec<usize>,
}

fn compute_line_starts(bytes: &[u8]) -> Vec<usize> {
    let mut starts = vec![0];
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

/// Owns the byte content of every file read during a compilation.
pub struct FileManager {
    entries: Vec<FileEntry>,
    by_path: HashMap<PathBuf, FileIndex>,
}

impl FileManager {
    pub fn new() -> Self {
        FileManager {
            entries: Vec::new(),
            by_path: HashMap::new(),
        }
    }

    /// Read `path` if it has not already been read, returning its stable
    /// index either way. Paths are canonicalized so that two different
    /// spellings of the same file (e.g. via `#include` search path vs the
    /// local directory) share one entry.
    pub fn load(&mut self, path: &Path) -> Result<FileIndex, String> {
        let canonical = path
            .canonicalize()
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        if let Some(&idx) = self.by_path.get(&canonical) {
            return Ok(idx);
        }
        let bytes = fs::read(&canonical).map_err(|e| format!("{}: {}", path.display(), e))?;
        let line_starts = compute_line_starts(&bytes);
        let idx = self.entries.len();
        self.entries.push(FileEntry {
            path: canonical.clone(),
            bytes,
            line_starts,
        });
        self.by_path.insert(canonical, idx);
        Ok(idx)
    }

    /// Register in-memory content (used for the initial top-level source
    /// file, which may be given a synthetic name by the driver).
    pub fn load_bytes(&mut self, path: PathBuf, bytes: Vec<u8>) -> FileIndex {
        let line_starts = compute_line_starts(&bytes);
        let idx = self.entries.len();
        self.by_path.insert(path.clone(), idx);
        self.entries.push(FileEntry {
            path,
            bytes,
            line_starts,
        });
        idx
    }

    pub fn path(&self, idx: FileIndex) -> &Path {
        &self.entries[idx].path
    }

    pub fn bytes(&self, idx: FileIndex) -> &[u8] {
        &self.entries[idx].bytes
    }

    /// The directory containing file `idx`, used to resolve `#include "x"`
    /// relative to the including file.
    pub fn dir_of(&self, idx: FileIndex) -> PathBuf {
        self.entries[idx]
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Byte offset of `loc` within its file's content, used by `#include`
    /// header-name re-lexing to locate the raw bytes just past `#include`.
    pub fn offset_of(&self, loc: SourceLocation) -> usize {
        let entry = &self.entries[loc.file];
        let line_start = entry.line_starts.get(loc.line - 1).copied().unwrap_or(0);
        line_start + loc.column - 1
    }

    /// 1-based line text for diagnostics.
    pub fn line_text(&self, idx: FileIndex, line: usize) -> &str {
        let entry = &self.entries[idx];
        if line == 0 || line > entry.line_starts.len() {
            return "";
        }
        let start = entry.line_starts[line - 1];
        let end = entry
            .line_starts
            .get(line)
            .copied()
            .unwrap_or(entry.bytes.len());
        let slice = &entry.bytes[start..end];
        let trimmed = slice
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map(|p| p + 1)
            .unwrap_or(0);
        std::str::from_utf8(&slice[..trimmed]).unwrap_or("")
    }
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

/// (file, line, column). Line and column are 1-based; monotonic within a
/// file so that the parser's backtracking alternator can compare two
/// locations to find the one that advanced furthest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: FileIndex,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: FileIndex, line: usize, column: usize) -> Self {
        SourceLocation { file, line, column }
    }

    /// A placeholder location for synthesized tokens (built-in macros,
    /// compiler-generated declarations) that have no real source position.
    pub fn synthetic() -> Self {
        SourceLocation {
            file: 0,
            line: 0,
            column: 0,
        }
    }
}
