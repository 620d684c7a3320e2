//! Compiler errors and non-fatal diagnostics.

use std::fmt;

use thiserror::Error;

/// Hard failures. Anything here aborts the compile with the input unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("{file}: unterminated {what} at offset {offset}")]
    Unterminated {
        file: String,
        what: &'static str,
        offset: usize,
    },
    /// Two planned rewrites claimed intersecting byte ranges. This is a
    /// planner bug surfaced as an error rather than silently corrupted
    /// output.
    #[error("{file}: overlapping rewrites at bytes {first:?} and {second:?}")]
    OverlappingEdits {
        file: String,
        first: (usize, usize),
        second: (usize, usize),
    },
}

/// Non-fatal findings reported alongside a successful compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A `const` initializer mentions its own name. It cannot become a
    /// derived cell, so the declaration is left as written.
    SelfReferentialDerived { name: String, offset: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SelfReferentialDerived { name, offset } => write!(
                f,
                "const `{name}` references itself (offset {offset}) and was left unrewritten"
            ),
        }
    }
}
