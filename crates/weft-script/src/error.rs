/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for script compilation and execution.

use thiserror::Error;

/// Errors that can occur while parsing or running a script.
///
/// Every variant carries a 1-based line number into the evaluated
/// program text, so that callers can map faults back onto whatever
/// produced that text.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// The source failed to tokenize or parse.
    #[error("syntax error at line {line}: {message}")]
    Syntax { message: String, line: usize },

    /// A fault raised while evaluating the program.
    #[error("runtime error at line {line}: {message}")]
    Runtime { message: String, line: usize },

    /// A fault raised by a host builtin.
    ///
    /// The message is the host's own; the line is attached by the
    /// interpreter at the call site.
    #[error("{message}")]
    Host { message: String, line: usize },
}

impl ScriptError {
    /// The 1-based line in the evaluated program this fault points at.
    pub fn line(&self) -> usize {
        match self {
            ScriptError::Syntax { line, .. }
            | ScriptError::Runtime { line, .. }
            | ScriptError::Host { line, .. } => *line,
        }
    }

    /// The bare fault message, without location prefix.
    pub fn message(&self) -> &str {
        match self {
            ScriptError::Syntax { message, .. }
            | ScriptError::Runtime { message, .. }
            | ScriptError::Host { message, .. } => message,
        }
    }
}

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;
