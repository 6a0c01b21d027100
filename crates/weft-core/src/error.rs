/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for compilation and execution.
//!
//! The taxonomy is small: [`CompileError`] is the only compile-time
//! failure. Everything that goes wrong while a program runs (directive
//! code faults, include resolution, snip/snap misuse, a nested compile
//! failure) surfaces as an [`ExecutionFault`].

use std::fmt;

use thiserror::Error;

/// Errors raised while compiling source text to a meta program.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// A block or snippet directive was opened with no closing
    /// sequence. The offset is the byte position of the open marker.
    #[error("unterminated directive block at byte offset {offset}")]
    UnterminatedBlock { offset: usize },
}

impl CompileError {
    /// Byte offset of the offending marker.
    pub fn offset(&self) -> usize {
        match self {
            CompileError::UnterminatedBlock { offset } => *offset,
        }
    }
}

/// A fault raised while executing a meta program.
///
/// The fault is annotated with a rendered view of the program exactly
/// once, in the frame that detected it; `listing` doubles as the
/// "already annotated" marker consulted by outer include frames.
#[derive(Debug, Clone)]
pub struct ExecutionFault {
    /// What went wrong.
    pub message: String,
    /// File the detecting frame was executing.
    pub filename: Option<String>,
    /// Index of the faulting instruction, when the fault location could
    /// be mapped back onto the program.
    pub instruction: Option<usize>,
    /// Rendered program view, attached once by the detecting frame.
    pub listing: Option<String>,
}

impl ExecutionFault {
    /// Create a bare, not-yet-annotated fault.
    pub fn new(message: impl Into<String>) -> ExecutionFault {
        ExecutionFault {
            message: message.into(),
            filename: None,
            instruction: None,
            listing: None,
        }
    }

    /// Whether diagnostic context has already been attached.
    pub fn is_annotated(&self) -> bool {
        self.listing.is_some()
    }
}

impl fmt::Display for ExecutionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(filename) = &self.filename {
            write!(f, "\n  in {filename}")?;
        }
        if let Some(listing) = &self.listing {
            write!(f, "\n{listing}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionFault {}

/// Any failure a transform call can produce.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Execution(#[from] ExecutionFault),
}

/// Result type for transform operations.
pub type WeftResult<T> = Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_offset() {
        let err = CompileError::UnterminatedBlock { offset: 17 };
        assert_eq!(err.offset(), 17);
        assert!(err.to_string().contains("17"));
    }

    #[test]
    fn test_fault_display_includes_context() {
        let mut fault = ExecutionFault::new("snap() without snip()");
        fault.filename = Some("gen.js".to_string());
        fault.listing = Some("   1 | write('x')".to_string());
        let rendered = fault.to_string();
        assert!(rendered.contains("snap() without snip()"));
        assert!(rendered.contains("gen.js"));
        assert!(rendered.contains("write('x')"));
    }

    #[test]
    fn test_annotation_marker() {
        let mut fault = ExecutionFault::new("boom");
        assert!(!fault.is_annotated());
        fault.listing = Some(String::new());
        assert!(fault.is_annotated());
    }
}
