//! Declaration front-end trait
//!
//! Front-ends read native declarations written in some surface syntax and
//! produce a [`Catalog`]. Everything after that point is syntax-agnostic:
//!
//! ```text
//! Source → [Frontend] → Catalog → [Classifier] → WrapperPlans
//! ```
//!
//! Front-ends are responsible for:
//! - Parsing source text
//! - Mapping native types onto [`TypeShape`](crate::TypeShape)s
//! - Attaching annotation text to the declarations it belongs to
//!
//! They never decide ownership.

use std::fmt;
use std::path::Path;

use crate::catalog::Catalog;
use crate::context::ClassifyContext;
use crate::error::ModelError;

// ═══════════════════════════════════════════════════════════════════════
// ERROR TYPES
// ═══════════════════════════════════════════════════════════════════════

/// Error that occurred while reading declarations.
#[derive(Debug, Clone)]
pub struct ParseError {
    /// Human-readable error message
    pub message: String,

    /// Optional source location
    pub location: Option<SourceLocation>,

    /// Optional source snippet for context
    pub snippet: Option<String>,
}

impl ParseError {
    /// Create a new parse error with just a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            snippet: None,
        }
    }

    /// Add location information to the error.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Add a source snippet for context.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Fill in the file name of a location that lacks one.
    pub fn in_file(mut self, file: &str) -> Self {
        if let Some(loc) = &mut self.location {
            if loc.file.is_empty() {
                loc.file = file.to_string();
            }
        }
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)?;
        match &self.location {
            Some(loc) if loc.file.is_empty() => write!(f, " at {}:{}", loc.line, loc.column)?,
            Some(loc) => write!(f, " at {}:{}:{}", loc.file, loc.line, loc.column)?,
            None => {}
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n{}", snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

impl From<ModelError> for ParseError {
    fn from(err: ModelError) -> Self {
        ParseError::new(err.to_string())
    }
}

/// Source code location for error reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// File name or identifier
    pub file: String,

    /// Line number (1-indexed)
    pub line: usize,

    /// Column number (1-indexed)
    pub column: usize,
}

impl SourceLocation {
    /// Create a new source location.
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// DECLARATION FRONTEND TRAIT
// ═══════════════════════════════════════════════════════════════════════

/// A reader of native declarations.
///
/// # Example Implementation
///
/// ```rust
/// use ownbind::frontend::{DeclarationFrontend, ParseError};
/// use ownbind::{Catalog, ClassifyContext, DeclarationBuilder};
///
/// /// One function per line: `name spelling`
/// struct LineFrontend;
///
/// impl DeclarationFrontend for LineFrontend {
///     fn parse(&self, source: &str, ctx: &ClassifyContext) -> Result<Catalog, ParseError> {
///         let mut catalog = Catalog::new();
///         for line in source.lines().filter(|l| !l.trim().is_empty()) {
///             let (name, ret) = line
///                 .split_once(' ')
///                 .ok_or_else(|| ParseError::new("expected `name type`"))?;
///             catalog.add_function(DeclarationBuilder::function(name).returns_spelled(ret).build(ctx)?)?;
///         }
///         Ok(catalog)
///     }
///
///     fn name(&self) -> &str {
///         "Lines"
///     }
///
///     fn file_extension(&self) -> &str {
///         "txt"
///     }
/// }
///
/// let catalog = LineFrontend.parse("make_foo Foo*\n", &ClassifyContext::default()).unwrap();
/// assert_eq!(catalog.functions().len(), 1);
/// ```
pub trait DeclarationFrontend: Send + Sync {
    /// Read declarations from source text.
    ///
    /// # Errors
    ///
    /// Returns `ParseError` if the source cannot be parsed or a declaration
    /// is malformed.
    fn parse(&self, source: &str, ctx: &ClassifyContext) -> Result<Catalog, ParseError>;

    /// Return the name of this front-end.
    fn name(&self) -> &str;

    /// Return the file extension this front-end reads.
    fn file_extension(&self) -> &str;

    /// Read declarations from a file.
    fn parse_path(&self, path: &Path, ctx: &ClassifyContext) -> Result<Catalog, ParseError> {
        let file = path.display().to_string();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ParseError::new(format!("cannot read {}: {}", file, e)))?;
        self.parse(&source, ctx).map_err(|e| e.in_file(&file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_creation() {
        let err = ParseError::new("unexpected token");
        assert_eq!(err.message, "unexpected token");
        assert!(err.location.is_none());
        assert!(err.snippet.is_none());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("unexpected token")
            .with_location(SourceLocation::new("foo.rs", 10, 5))
            .with_snippet("fn f(x: *mut) ;");
        let display = format!("{}", err);
        assert!(display.contains("Parse error"));
        assert!(display.contains("unexpected token"));
        assert!(display.contains("foo.rs:10:5"));
        assert!(display.ends_with("fn f(x: *mut) ;"));
    }

    #[test]
    fn test_in_file_fills_missing_name() {
        let err = ParseError::new("bad")
            .with_location(SourceLocation::new("", 3, 1))
            .in_file("foo.rs");
        assert_eq!(err.location.unwrap().file, "foo.rs");

        let err = ParseError::new("bad")
            .with_location(SourceLocation::new("bar.rs", 3, 1))
            .in_file("foo.rs");
        assert_eq!(err.location.unwrap().file, "bar.rs");
    }

    #[test]
    fn test_from_model_error() {
        let err: ParseError = ModelError::malformed("f", "no name").into();
        assert!(err.message.contains("Malformed declaration `f`"));
    }
}
