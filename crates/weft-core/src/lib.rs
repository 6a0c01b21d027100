/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Directive-based text preprocessor core for weft.
//!
//! Source files carry executable fragments inside line and block
//! comments (`//? ...`, `/*? ... */`). [`compile`] turns annotated text
//! into an ordered intermediate [`MetaProgram`]; the [`Engine`] executes
//! it against a variable scope to produce generated output:
//! conditional sections, value interpolation, multi-file assembly via
//! includes, and macro-like helpers stored as closures in the scope.
//!
//! # Example
//!
//! ```
//! use weft_core::{Engine, MemoryLoader, Value};
//!
//! let engine = Engine::new(MemoryLoader::new());
//! let out = engine
//!     .transform(
//!         "VERSION = \"/*?= V */\";",
//!         "version.js",
//!         vec![("V".to_string(), Value::Str("1.2.0".to_string()))],
//!     )
//!     .unwrap();
//! assert_eq!(out, "VERSION = \"1.2.0\";");
//! ```
//!
//! Faults abort the whole transform with no partial output, and carry
//! a rendered view of the meta program with the failing instruction
//! marked.

pub mod compiler;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod loader;
pub mod program;

// Re-export main types at crate root
pub use compiler::compile;
pub use engine::{Engine, transform};
pub use error::{CompileError, Error, ExecutionFault, WeftResult};
pub use loader::{FileLoader, FsLoader, MemoryLoader, natural_cmp};
pub use program::{Instruction, MetaProgram};

// The scope value type comes from the script crate
pub use weft_script::{Env, Value};
