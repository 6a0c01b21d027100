/*
 * engine.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The execution engine.
//!
//! A compiled [`MetaProgram`] is lowered to a script program (one or
//! more script lines per instruction) and run by `weft-script` with the
//! builtin set bound into the scope. The engine owns the effects:
//! output buffer, snip/snap capture, the indentation register (the
//! scope variable `__`) and the include frame stack.
//!
//! Each transform call owns its scope, output buffer and include
//! stack; nothing is shared across calls.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};
use weft_script::{Env, ScriptError, Value};

use crate::compiler::compile;
use crate::diagnostics;
use crate::error::{Error, ExecutionFault, WeftResult};
use crate::loader::{FileLoader, FsLoader, has_wildcards, natural_cmp};
use crate::program::{LoweredProgram, MetaProgram};

/// Builtins bound into every run's scope.
const BUILTINS: &[&str] = &[
    "write", "writeln", "indent", "dirname", "define", "undefine", "include", "snip", "snap",
    "escape", "json",
];

/// Maximum include nesting before a fault is raised.
const MAX_INCLUDE_DEPTH: usize = 64;

/// Execution engine parameterized over its file loader.
pub struct Engine<L: FileLoader> {
    loader: L,
}

impl Default for Engine<FsLoader> {
    fn default() -> Self {
        Engine::new(FsLoader)
    }
}

impl<L: FileLoader> Engine<L> {
    pub fn new(loader: L) -> Engine<L> {
        Engine { loader }
    }

    /// Execute a compiled program against a fresh scope seeded with
    /// `initial` bindings, returning the generated text.
    pub fn execute(
        &self,
        program: &MetaProgram,
        filename: &str,
        initial: impl IntoIterator<Item = (String, Value)>,
    ) -> WeftResult<String> {
        trace!(filename, instructions = program.len(), "executing meta program");
        let mut run = Run::new(&self.loader, filename, initial);
        run.run_program(program).map_err(Error::Execution)?;
        Ok(trim_line_trailing_whitespace(&run.out))
    }

    /// One-shot compile and execute.
    pub fn transform(
        &self,
        source: &str,
        filename: &str,
        initial: impl IntoIterator<Item = (String, Value)>,
    ) -> WeftResult<String> {
        let program = compile(source)?;
        self.execute(&program, filename, initial)
    }
}

/// One-shot transform against the real filesystem.
pub fn transform(
    source: &str,
    filename: &str,
    initial: impl IntoIterator<Item = (String, Value)>,
) -> WeftResult<String> {
    Engine::new(FsLoader).transform(source, filename, initial)
}

/// One nested include, strictly stacked: pushed on entry, popped on
/// exit (success or fault), restoring the caller's file context and
/// indent register.
struct IncludeFrame {
    #[allow(dead_code)]
    program: MetaProgram,
    #[allow(dead_code)]
    source_text: String,
    filename: String,
    directory: String,
    prior_indent: String,
}

/// Mutable state of one transform call.
struct Run<'a, L: FileLoader> {
    loader: &'a L,
    /// Shared scope: builtins, user bindings, the indent register.
    scope: Env,
    out: String,
    /// Output length recorded by `snip()`, at most one outstanding.
    snip_mark: Option<usize>,
    filename: String,
    directory: String,
    frames: Vec<IncludeFrame>,
    /// Structured fault stashed by a builtin before it reports failure
    /// to the interpreter; picked back up when the run unwinds.
    pending: Option<ExecutionFault>,
}

impl<'a, L: FileLoader> Run<'a, L> {
    fn new(
        loader: &'a L,
        filename: &str,
        initial: impl IntoIterator<Item = (String, Value)>,
    ) -> Run<'a, L> {
        let scope = Env::new();
        for &name in BUILTINS {
            scope.declare(name, Value::Builtin(name));
        }
        scope.declare("__", Value::Str(String::new()));
        for (name, value) in initial {
            scope.declare(name, value);
        }
        Run {
            loader,
            scope,
            out: String::new(),
            snip_mark: None,
            filename: filename.to_string(),
            directory: dirname_of(filename).to_string(),
            frames: Vec::new(),
            pending: None,
        }
    }

    fn current_filename(&self) -> String {
        self.frames
            .last()
            .map(|f| f.filename.clone())
            .unwrap_or_else(|| self.filename.clone())
    }

    fn current_directory(&self) -> String {
        self.frames
            .last()
            .map(|f| f.directory.clone())
            .unwrap_or_else(|| self.directory.clone())
    }

    fn current_indent(&self) -> String {
        self.scope
            .get("__")
            .map(|v| v.to_text())
            .unwrap_or_default()
    }

    fn set_indent(&mut self, indent: String) {
        let value = Value::Str(indent);
        if !self.scope.assign("__", value.clone()) {
            self.scope.declare("__", value);
        }
    }

    /// Lower and run one program in the current frame context.
    fn run_program(&mut self, program: &MetaProgram) -> Result<(), ExecutionFault> {
        let lowered = program.lower();
        let ast = match weft_script::parse(&lowered.source) {
            Ok(ast) => ast,
            Err(err) => return Err(self.script_fault(err, program, &lowered)),
        };
        let scope = self.scope.clone();
        match weft_script::run(&ast, &scope, self) {
            Ok(()) => Ok(()),
            Err(err) => Err(self.script_fault(err, program, &lowered)),
        }
    }

    /// Turn a script error into an execution fault, annotated with the
    /// detecting frame's program view exactly once.
    fn script_fault(
        &mut self,
        err: ScriptError,
        program: &MetaProgram,
        lowered: &LoweredProgram,
    ) -> ExecutionFault {
        let filename = self.current_filename();
        let mut fault = match self.pending.take() {
            Some(inner) => inner,
            None => {
                let message = match &err {
                    ScriptError::Syntax { .. } => {
                        format!("meta program failed to parse: {}", err.message())
                    }
                    _ => err.message().to_string(),
                };
                ExecutionFault::new(message)
            }
        };
        if !fault.is_annotated() && fault.instruction.is_none() {
            fault.instruction = lowered.instruction_at_line(err.line());
        }
        diagnostics::annotate(&mut fault, program, &filename);
        fault
    }

    // ------------------------------------------------------------- include

    fn include(&mut self, pattern: &str, absolute: bool) -> Result<(), ExecutionFault> {
        if self.frames.len() >= MAX_INCLUDE_DEPTH {
            return Err(ExecutionFault::new(format!(
                "include depth limit ({MAX_INCLUDE_DEPTH}) exceeded"
            )));
        }
        let directory = self.current_directory();
        let paths = if has_wildcards(pattern) {
            let base = if absolute {
                PathBuf::new()
            } else {
                PathBuf::from(&directory)
            };
            let mut matches = self.loader.glob(pattern, &base).map_err(|e| {
                ExecutionFault::new(format!("failed to expand include pattern '{pattern}': {e}"))
            })?;
            if matches.is_empty() {
                return Err(ExecutionFault::new(format!(
                    "include pattern '{pattern}' matched no files"
                )));
            }
            // The loader's ordering is not relied upon
            matches.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
            matches
        } else if absolute {
            vec![PathBuf::from(pattern)]
        } else {
            vec![Path::new(&directory).join(pattern)]
        };
        debug!(pattern, matches = paths.len(), "resolved include");

        for path in paths {
            self.include_one(&path)?;
        }
        Ok(())
    }

    fn include_one(&mut self, path: &Path) -> Result<(), ExecutionFault> {
        let text = self.loader.read(path).map_err(|e| {
            ExecutionFault::new(format!("failed to read include '{}': {e}", path.display()))
        })?;
        let indent = self.current_indent();
        let prefixed = prefix_lines(&text, &indent);
        let program = compile(&prefixed).map_err(|e| {
            ExecutionFault::new(format!(
                "failed to compile include '{}': {e}",
                path.display()
            ))
        })?;

        let filename = path.to_string_lossy().into_owned();
        let directory = dirname_of(&filename).to_string();
        self.frames.push(IncludeFrame {
            program: program.clone(),
            source_text: prefixed,
            filename,
            directory,
            prior_indent: indent,
        });
        let result = self.run_program(&program);
        if let Some(frame) = self.frames.pop() {
            self.set_indent(frame.prior_indent);
        }
        result
    }

    // ------------------------------------------------------------- builtins

    fn builtin_snip(&mut self) -> Result<Value, String> {
        if self.snip_mark.is_some() {
            return Err("snip() while another snip() is outstanding".to_string());
        }
        self.snip_mark = Some(self.out.len());
        Ok(Value::Null)
    }

    fn builtin_snap(&mut self) -> Result<Value, String> {
        match self.snip_mark.take() {
            Some(mark) => Ok(Value::Str(self.out.split_off(mark))),
            None => Err("snap() without a preceding snip()".to_string()),
        }
    }
}

impl<L: FileLoader> weft_script::HostBuiltins for Run<'_, L> {
    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Result<Value, String> {
        match name {
            "write" => {
                let text = args.first().map(Value::to_text).unwrap_or_default();
                self.out.push_str(&text);
                Ok(Value::Null)
            }
            "writeln" => {
                let text = args.first().map(Value::to_text).unwrap_or_default();
                self.out.push_str(&text);
                self.out.push('\n');
                Ok(Value::Null)
            }
            "indent" => {
                let text = args.first().map(Value::to_text).unwrap_or_default();
                let prefix = match args.get(1) {
                    Some(Value::Number(n)) => " ".repeat(n.max(0.0) as usize),
                    Some(Value::Str(s)) => s.clone(),
                    Some(other) => {
                        return Err(format!(
                            "indent() expects a number or string amount, found {}",
                            other.type_name()
                        ));
                    }
                    None => String::new(),
                };
                Ok(Value::Str(indent_text(&text, &prefix)))
            }
            "dirname" => {
                let path = require_str(&args, 0, "dirname")?;
                Ok(Value::Str(dirname_of(&path).to_string()))
            }
            "define" => {
                let name = require_str(&args, 0, "define")?;
                let value = args.get(1).cloned().unwrap_or(Value::Null);
                self.scope.declare(name, value.clone());
                // Returned for one-line local assignments
                Ok(value)
            }
            "undefine" => {
                let name = require_str(&args, 0, "undefine")?;
                self.scope.remove(&name);
                Ok(Value::Null)
            }
            "include" => {
                let pattern = require_str(&args, 0, "include")?;
                let absolute = args.get(1).is_some_and(Value::is_truthy);
                self.include(&pattern, absolute).map_err(|fault| {
                    let message = fault.message.clone();
                    self.pending = Some(fault);
                    message
                })?;
                Ok(Value::Null)
            }
            "snip" => self.builtin_snip(),
            "snap" => self.builtin_snap(),
            "escape" => {
                let text = args.first().map(Value::to_text).unwrap_or_default();
                Ok(Value::Str(escape_text(&text)))
            }
            "json" => {
                let value = args.first().cloned().unwrap_or(Value::Null);
                let json = value.to_json()?;
                serde_json::to_string(&json)
                    .map(Value::Str)
                    .map_err(|e| format!("JSON serialization failed: {e}"))
            }
            other => Err(format!("unknown builtin '{other}'")),
        }
    }
}

fn require_str(args: &[Value], index: usize, builtin: &str) -> Result<String, String> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.clone()),
        Some(other) => Err(format!(
            "{builtin}() expects a string argument, found {}",
            other.type_name()
        )),
        None => Err(format!("{builtin}() is missing a required argument")),
    }
}

/// Parent directory of a path string, `.` if it has none.
fn dirname_of(path: &str) -> &str {
    match path.rfind(['/', '\\']) {
        Some(0) => "/",
        Some(p) => &path[..p],
        None => ".",
    }
}

/// Prefix every line of `text` (blank ones included; a final trim pass
/// cleans those up).
fn prefix_lines(text: &str, prefix: &str) -> String {
    if prefix.is_empty() {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut start = 0;
    while start < text.len() {
        let end = text[start..]
            .find('\n')
            .map(|p| start + p + 1)
            .unwrap_or(text.len());
        out.push_str(prefix);
        out.push_str(&text[start..end]);
        start = end;
    }
    out
}

/// Prefix every non-blank line of `text`.
fn indent_text(text: &str, prefix: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut start = 0;
    while start < text.len() {
        let end = text[start..]
            .find('\n')
            .map(|p| start + p + 1)
            .unwrap_or(text.len());
        let line = &text[start..end];
        let content = line.trim_end_matches(['\n', '\r']);
        if !content.trim_start_matches([' ', '\t']).is_empty() {
            out.push_str(prefix);
        }
        out.push_str(line);
        start = end;
    }
    out
}

/// Escape backslash, both quote characters, CR and LF for re-embedding
/// in a quoted literal.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Remove horizontal whitespace immediately preceding every line break.
fn trim_line_trailing_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(p) = rest.find('\n') {
        let (line, tail) = rest.split_at(p + 1);
        let (content, terminator) = match line.strip_suffix("\r\n") {
            Some(content) => (content, "\r\n"),
            None => (&line[..line.len() - 1], "\n"),
        };
        out.push_str(content.trim_end_matches([' ', '\t']));
        out.push_str(terminator);
        rest = tail;
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use pretty_assertions::assert_eq;

    fn transform_mem(source: &str, initial: Vec<(String, Value)>) -> WeftResult<String> {
        Engine::new(MemoryLoader::new()).transform(source, "test.js", initial)
    }

    fn ok(source: &str) -> String {
        transform_mem(source, vec![]).expect("transform should succeed")
    }

    fn bind(name: &str, value: Value) -> (String, Value) {
        (name.to_string(), value)
    }

    #[test]
    fn test_literal_passthrough() {
        assert_eq!(ok("plain text\nsecond line\n"), "plain text\nsecond line\n");
    }

    #[test]
    fn test_value_echo() {
        assert_eq!(ok("//?= 1+1"), "2\n");
        assert_eq!(ok("/*?= \"x\" */"), "x");
    }

    #[test]
    fn test_json_echo() {
        let out = transform_mem(
            "//?== X",
            vec![bind("X", Value::Str("a\"b".to_string()))],
        )
        .unwrap();
        assert_eq!(out, "\"a\\\"b\"\n");
    }

    #[test]
    fn test_conditional_selects_exactly_one_branch() {
        let source = "//? if (FLAG) {\nA\n//? } else {\nB\n//? }\n";
        let on = transform_mem(source, vec![bind("FLAG", Value::Bool(true))]).unwrap();
        assert_eq!(on, "A\n");
        let off = transform_mem(source, vec![bind("FLAG", Value::Bool(false))]).unwrap();
        assert_eq!(off, "B\n");
    }

    #[test]
    fn test_write_and_writeln() {
        assert_eq!(ok("//? write('a'); writeln('b'); writeln()"), "ab\n\n");
    }

    #[test]
    fn test_snip_snap() {
        let out = ok("//? snip()\ncaptured\n//? var s = snap()\n//? write(s + s)\n");
        assert_eq!(out, "captured\ncaptured\n");
    }

    #[test]
    fn test_snap_without_snip_faults() {
        let err = transform_mem("//? snap()\n", vec![]).unwrap_err();
        let Error::Execution(fault) = err else {
            panic!("expected execution fault");
        };
        assert!(fault.message.contains("snap()"), "{}", fault.message);
        assert!(fault.is_annotated());
    }

    #[test]
    fn test_double_snip_faults() {
        let err = transform_mem("//? snip()\n//? snip()\n", vec![]).unwrap_err();
        assert!(err.to_string().contains("outstanding"));
    }

    #[test]
    fn test_define_returns_value_and_persists() {
        let out = ok("//? var v = define('NAME', 'weft')\n//?= v\n//?= NAME\n");
        assert_eq!(out, "weft\nweft\n");
    }

    #[test]
    fn test_undefine() {
        let out = ok("//? define('X', 1); undefine('X')\n//?= typeof X\n");
        assert_eq!(out, "undefined\n");
    }

    #[test]
    fn test_indent_builtin() {
        assert_eq!(
            ok("//? write(indent('a\\nb\\n', 2))"),
            "  a\n  b\n"
        );
        assert_eq!(ok("//? write(indent('x\\n', '>> '))"), ">> x\n");
    }

    #[test]
    fn test_dirname_builtin() {
        assert_eq!(ok("//?= dirname('a/b/c.js')"), "a/b\n");
        assert_eq!(ok("//?= dirname('plain.js')"), ".\n");
    }

    #[test]
    fn test_escape_builtin() {
        let out = ok(r#"//?= escape('a\'b"c')"#);
        assert_eq!(out, "a\\'b\\\"c\n");
    }

    #[test]
    fn test_macro_closure_in_scope() {
        let source = "//? GREET = function (who) { write('hi ' + who + '\\n'); }\n//? GREET('a')\n//? GREET('b')\n";
        assert_eq!(ok(source), "hi a\nhi b\n");
    }

    #[test]
    fn test_trailing_whitespace_trimmed() {
        assert_eq!(ok("text   \nnext\t\n"), "text\nnext\n");
    }

    #[test]
    fn test_include_shares_scope() {
        let mut loader = MemoryLoader::new();
        loader.add("lib/common.js", "//? define('FROM_INCLUDE', 42)\n");
        let engine = Engine::new(loader);
        let out = engine
            .transform(
                "//? include('common.js')\n//?= FROM_INCLUDE\n",
                "lib/main.js",
                vec![],
            )
            .unwrap();
        assert_eq!(out, "42\n");
    }

    #[test]
    fn test_include_glob_natural_order() {
        let mut loader = MemoryLoader::new();
        loader.add("mod/int8.x", "eight\n");
        loader.add("mod/int16.x", "sixteen\n");
        loader.add("mod/int2.x", "two\n");
        let engine = Engine::new(loader);
        let out = engine
            .transform("//? include('int*.x')\n", "mod/main.x", vec![])
            .unwrap();
        assert_eq!(out, "two\neight\nsixteen\n");
    }

    #[test]
    fn test_include_applies_indent_register() {
        let mut loader = MemoryLoader::new();
        loader.add("part.js", "one()\ntwo()\n");
        let engine = Engine::new(loader);
        let out = engine
            .transform("    //? include('part.js')\nafter\n", "main.js", vec![])
            .unwrap();
        assert_eq!(out, "    one()\n    two()\nafter\n");
    }

    #[test]
    fn test_include_restores_indent_for_siblings() {
        let mut loader = MemoryLoader::new();
        // The nested include shifts the register; the sibling must not see it
        loader.add("a.js", "  //? include('b.js')\n");
        loader.add("b.js", "deep\n");
        loader.add("c.js", "flat\n");
        let engine = Engine::new(loader);
        let out = engine
            .transform("//? include('a.js')\n//? include('c.js')\n", "main.js", vec![])
            .unwrap();
        assert_eq!(out, "  deep\nflat\n");
    }

    #[test]
    fn test_include_zero_matches_faults() {
        let engine = Engine::new(MemoryLoader::new());
        let err = engine
            .transform("//? include('missing*.js')\n", "main.js", vec![])
            .unwrap_err();
        assert!(err.to_string().contains("matched no files"));
    }

    #[test]
    fn test_include_unreadable_faults() {
        let engine = Engine::new(MemoryLoader::new());
        let err = engine
            .transform("//? include('gone.js')\n", "main.js", vec![])
            .unwrap_err();
        assert!(err.to_string().contains("failed to read include"));
    }

    #[test]
    fn test_nested_fault_annotated_once() {
        let mut loader = MemoryLoader::new();
        loader.add("inner.js", "//? boom()\n");
        let engine = Engine::new(loader);
        let err = engine
            .transform("//? include('inner.js')\n", "main.js", vec![])
            .unwrap_err();
        let Error::Execution(fault) = err else {
            panic!("expected execution fault");
        };
        // Annotated by the inner frame, left untouched by the outer one
        assert_eq!(fault.filename.as_deref(), Some("inner.js"));
        let listing = fault.listing.as_deref().unwrap();
        assert!(listing.contains("boom()"), "{listing}");
        assert_eq!(listing.matches("meta program:").count(), 1);
    }

    #[test]
    fn test_fault_marks_instruction() {
        let err = transform_mem("fine\n//? nope()\n", vec![]).unwrap_err();
        let Error::Execution(fault) = err else {
            panic!("expected execution fault");
        };
        assert_eq!(fault.instruction, Some(1));
        assert!(fault.listing.as_deref().unwrap().contains(">>"));
    }

    #[test]
    fn test_no_partial_output_on_fault() {
        let result = transform_mem("written\n//? nope()\n", vec![]);
        assert!(result.is_err());
    }

    #[test]
    fn test_helper_dirname() {
        assert_eq!(dirname_of("a/b/c"), "a/b");
        assert_eq!(dirname_of("/root.js"), "/");
        assert_eq!(dirname_of("win\\path\\f.js"), "win\\path");
        assert_eq!(dirname_of("bare"), ".");
    }

    #[test]
    fn test_helper_prefix_lines() {
        assert_eq!(prefix_lines("a\nb\n", "  "), "  a\n  b\n");
        assert_eq!(prefix_lines("a", "__"), "__a");
        assert_eq!(prefix_lines("a\n", ""), "a\n");
    }

    #[test]
    fn test_helper_indent_text_skips_blank_lines() {
        assert_eq!(indent_text("a\n\nb\n", ". "), ". a\n\n. b\n");
    }

    #[test]
    fn test_helper_trim() {
        assert_eq!(
            trim_line_trailing_whitespace("a  \nb\t\r\nc  "),
            "a\nb\r\nc  "
        );
    }
}
