//! Unified error type for the whole pipeline.
//!
//! Follows the teacher's own idiom: one owned, tagged struct carrying a
//! message, an optional source span, and a kind — not a `thiserror`-derived
//! enum-of-variants (the teacher never reaches for `thiserror`/`anyhow`
//! anywhere in the corpus, so this crate doesn't either).

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Position in a source file, one-indexed line, zero-indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CharPosition {
    pub line: u32,
    pub column: u32,
}

/// An owned span: no string-table dependency, so errors can be collected
/// and displayed long after the module that produced them was freed.
#[derive(Debug, Clone, Default)]
pub struct ErrorLocation {
    pub file: PathBuf,
    pub start: CharPosition,
    pub end: CharPosition,
}

impl ErrorLocation {
    pub fn new(file: PathBuf, start: CharPosition, end: CharPosition) -> Self {
        Self { file, start, end }
    }
}

/// Error kinds, one row per the §7 table in spec.md.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Type,
    Emit,
    Toolchain,
    Cache,
    Resolution,
    Download,
    HashMismatch,
    Timeout,
    Io,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lexical => "LexicalError",
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Type => "TypeError",
            ErrorKind::Emit => "EmitError",
            ErrorKind::Toolchain => "ToolchainError",
            ErrorKind::Cache => "CacheError",
            ErrorKind::Resolution => "ResolutionError",
            ErrorKind::Download => "DownloadError",
            ErrorKind::HashMismatch => "HashMismatch",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Io => "IoError",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(s)
    }
}

/// Structured metadata key, for the same reason the teacher carries one:
/// makes errors machine-readable for tooling built on top of this compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaKey {
    ExpectedType,
    FoundType,
    Suggestion,
    ConflictingRequirement,
}

#[derive(Debug, Clone)]
pub struct EmberError {
    pub kind: ErrorKind,
    pub msg: String,
    pub location: Option<ErrorLocation>,
    pub metadata: HashMap<MetaKey, String>,
}

impl EmberError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            msg: msg.into(),
            location: None,
            metadata: HashMap::new(),
        }
    }

    pub fn at(mut self, location: ErrorLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_meta(mut self, key: MetaKey, value: impl Into<String>) -> Self {
        self.metadata.insert(key, value.into());
        self
    }

    pub fn lexical(msg: impl Into<String>, location: ErrorLocation) -> Self {
        Self::new(ErrorKind::Lexical, msg).at(location)
    }

    pub fn syntax(msg: impl Into<String>, location: ErrorLocation) -> Self {
        Self::new(ErrorKind::Syntax, msg).at(location)
    }

    pub fn type_conflict(
        expected: impl Into<String>,
        found: impl Into<String>,
        location: ErrorLocation,
    ) -> Self {
        let expected = expected.into();
        let found = found.into();
        Self::new(
            ErrorKind::Type,
            format!("expected {expected}, found {found}"),
        )
        .at(location)
        .with_meta(MetaKey::ExpectedType, expected)
        .with_meta(MetaKey::FoundType, found)
    }
}

impl fmt::Display for EmberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{}:{}:{}: {}: {}",
                loc.file.display(),
                loc.start.line,
                loc.start.column,
                self.kind,
                self.msg
            ),
            None => write!(f, "{}: {}", self.kind, self.msg),
        }
    }
}

impl std::error::Error for EmberError {}

pub type Result<T> = std::result::Result<T, EmberError>;

/// Per spec.md §7's propagation policy: C1-C4 errors abort a single file but
/// the orchestrator keeps going, so the user sees every file's failures in
/// one pass. Mirrors the teacher's `CompilerMessages`.
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<EmberError>,
    pub warnings: Vec<EmberError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_error(&mut self, error: EmberError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Prints every collected error/warning with `saying::say!`, matching the
/// newer half of the teacher corpus (`compiler_frontend::display_messages`).
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    for error in &diagnostics.errors {
        saying::say!(Red {error});
    }
    for warning in &diagnostics.warnings {
        saying::say!(Yellow {warning});
    }
}
