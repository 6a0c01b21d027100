/*
 * compiler.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Directive scanner and program compiler.
//!
//! Scans source text for directive markers, splits it into literal and
//! directive spans, and emits the ordered [`MetaProgram`]. Directive
//! forms:
//!
//! | form            | marker          | extent                   |
//! |-----------------|-----------------|--------------------------|
//! | line            | `//?`           | to end of physical line  |
//! | line value-echo | `//?=`          | to end of physical line  |
//! | line JSON-echo  | `//?==`         | to end of physical line  |
//! | line snippet    | `//?...`/`//?.` | until matching close line|
//! | block           | `/*?`           | inline, to `*/`          |
//! | block value-echo| `/*?=`          | inline, to `*/`          |
//! | block JSON-echo | `/*?==`         | inline, to `*/`          |
//!
//! Everything else is literal text, copied verbatim (split per line
//! internally). The only possible failure is an unterminated block or
//! snippet.

use tracing::trace;

use crate::error::CompileError;
use crate::program::{Instruction, MetaProgram};

/// Compile source text to a meta program.
pub fn compile(source: &str) -> Result<MetaProgram, CompileError> {
    let mut compiler = Compiler {
        source,
        out: Vec::new(),
        pending_indent: String::new(),
        emitted_indent: String::new(),
    };
    compiler.run()?;
    trace!(
        instructions = compiler.out.len(),
        bytes = source.len(),
        "compiled meta program"
    );
    Ok(MetaProgram::new(compiler.out))
}

/// What a directive marker turned out to be.
enum LineForm {
    Code,
    ValueEcho,
    JsonEcho,
    Snippet,
}

struct Compiler<'a> {
    source: &'a str,
    out: Vec<Instruction>,
    /// Indent captured from the most recent whitespace-only literal
    /// tail. Synced lazily into an `EmitIndentMarker`.
    pending_indent: String,
    /// Indent of the last emitted marker.
    emitted_indent: String,
}

impl Compiler<'_> {
    fn run(&mut self) -> Result<(), CompileError> {
        let source = self.source;
        let mut index = 0;

        loop {
            let rest = &source[index..];
            let marker = match (rest.find("//?"), rest.find("/*?")) {
                (None, None) => break,
                (Some(l), None) => (l, false),
                (None, Some(b)) => (b, true),
                (Some(l), Some(b)) => {
                    if l < b {
                        (l, false)
                    } else {
                        (b, true)
                    }
                }
            };
            let (m, is_block) = (index + marker.0, marker.1);
            let after = &source[m + 3..];

            let is_echo = after.starts_with('=');
            index = if is_block {
                self.flush_literal(index, m, is_echo);
                self.compile_block(m)?
            } else if after.starts_with("...") {
                self.flush_literal(index, m, false);
                self.compile_snippet(m)?
            } else {
                self.flush_literal(index, m, is_echo);
                self.compile_line(m)
            };
        }

        let tail = &source[index..];
        if !tail.is_empty() {
            self.append_literal(tail);
        }
        Ok(())
    }

    /// Emit the pending literal span `[start, marker)`.
    ///
    /// For non-echo directives, a whitespace-only tail back to the
    /// start of the marker's line is stripped from the literal and
    /// remembered as the pending indent. Echo directives keep their
    /// leading whitespace as literal text.
    fn flush_literal(&mut self, start: usize, marker: usize, is_echo: bool) {
        let source = self.source;
        if !is_echo {
            let line_start = source[..marker].rfind('\n').map(|p| p + 1).unwrap_or(0);
            let tail_in_chunk = line_start >= start;
            let tail = &source[line_start.max(start)..marker];
            if tail_in_chunk && tail.bytes().all(|b| b == b' ' || b == b'\t') {
                self.append_literal(&source[start..line_start]);
                self.pending_indent = tail.to_string();
                return;
            }
        }
        self.append_literal(&source[start..marker]);
    }

    fn append_literal(&mut self, text: &str) {
        // Split per line for manageable instructions; semantically one
        // span would do just as well.
        let mut start = 0;
        while let Some(p) = text[start..].find('\n') {
            let end = start + p + 1;
            self.out
                .push(Instruction::EmitLiteral(text[start..end].to_string()));
            start = end;
        }
        if start < text.len() {
            self.out
                .push(Instruction::EmitLiteral(text[start..].to_string()));
        }
    }

    /// Emit the pending indent marker if it differs from the last one.
    fn sync_indent_marker(&mut self) {
        if self.pending_indent != self.emitted_indent {
            self.out
                .push(Instruction::EmitIndentMarker(self.pending_indent.clone()));
            self.emitted_indent = self.pending_indent.clone();
        }
    }

    /// Compile a `//?` directive. Returns the scan position after it.
    fn compile_line(&mut self, marker: usize) -> usize {
        let source = self.source;
        let line_end = source[marker..]
            .find('\n')
            .map(|p| marker + p)
            .unwrap_or(source.len());
        let content = &source[marker + 3..line_end];
        let raw = content.strip_suffix('\r').unwrap_or(content);

        let (form, body) = if let Some(expr) = raw.strip_prefix("==") {
            (LineForm::JsonEcho, expr)
        } else if let Some(expr) = raw.strip_prefix('=') {
            (LineForm::ValueEcho, expr)
        } else {
            (LineForm::Code, raw)
        };
        self.push_directive(form, body.trim(), true);

        if line_end < source.len() {
            line_end + 1
        } else {
            line_end
        }
    }

    /// Compile a `/*? ... */` directive. Returns the scan position
    /// after the close marker, with a directly following line break
    /// (and any horizontal whitespace before it) consumed.
    fn compile_block(&mut self, marker: usize) -> Result<usize, CompileError> {
        let source = self.source;
        let close = source[marker + 3..]
            .find("*/")
            .map(|p| marker + 3 + p)
            .ok_or(CompileError::UnterminatedBlock { offset: marker })?;
        let raw = &source[marker + 3..close];

        let (form, body) = if let Some(expr) = raw.strip_prefix("==") {
            (LineForm::JsonEcho, expr)
        } else if let Some(expr) = raw.strip_prefix('=') {
            (LineForm::ValueEcho, expr)
        } else {
            (LineForm::Code, raw)
        };
        self.push_directive(form, body.trim(), false);

        let mut index = close + 2;
        let rest = &source[index..];
        let ws = rest.len() - rest.trim_start_matches([' ', '\t']).len();
        let after_ws = &rest[ws..];
        if after_ws.starts_with("\r\n") {
            index += ws + 2;
        } else if after_ws.starts_with('\n') {
            index += ws + 1;
        }
        Ok(index)
    }

    /// Compile a `//?...` snippet: raw code until a dedicated `//?.`
    /// close line. Returns the scan position after the close line.
    fn compile_snippet(&mut self, marker: usize) -> Result<usize, CompileError> {
        let source = self.source;
        let open_end = source[marker..]
            .find('\n')
            .map(|p| marker + p)
            .ok_or(CompileError::UnterminatedBlock { offset: marker })?;
        let body_start = open_end + 1;

        let mut pos = body_start;
        loop {
            if pos > source.len() {
                return Err(CompileError::UnterminatedBlock { offset: marker });
            }
            let line_end = source[pos..].find('\n').map(|p| pos + p);
            let line = match line_end {
                Some(end) => &source[pos..end],
                None => &source[pos..],
            };
            if line.trim_start_matches([' ', '\t']).trim_end() == "//?." {
                let body = &source[body_start..pos];
                let body = body.strip_suffix('\n').unwrap_or(body);
                let body = body.strip_suffix('\r').unwrap_or(body);
                self.push_directive(LineForm::Snippet, body, true);
                return Ok(match line_end {
                    Some(end) => end + 1,
                    None => source.len(),
                });
            }
            match line_end {
                Some(end) => pos = end + 1,
                None => return Err(CompileError::UnterminatedBlock { offset: marker }),
            }
        }
    }

    fn push_directive(&mut self, form: LineForm, body: &str, line_form: bool) {
        match form {
            LineForm::Code | LineForm::Snippet => {
                if !body.trim().is_empty() {
                    self.sync_indent_marker();
                    self.out.push(Instruction::RawCode(body.to_string()));
                }
            }
            LineForm::ValueEcho | LineForm::JsonEcho => {
                if body.is_empty() {
                    // Nothing to evaluate; the bare line form still
                    // owes the consumed terminator back.
                    if line_form {
                        self.out.push(Instruction::EmitValue {
                            expr: "''".to_string(),
                            line_break: true,
                        });
                    }
                } else if matches!(form, LineForm::JsonEcho) {
                    self.out.push(Instruction::EmitJson {
                        expr: body.to_string(),
                        line_break: line_form,
                    });
                } else {
                    self.out.push(Instruction::EmitValue {
                        expr: body.to_string(),
                        line_break: line_form,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literal(text: &str) -> Instruction {
        Instruction::EmitLiteral(text.to_string())
    }

    fn code(text: &str) -> Instruction {
        Instruction::RawCode(text.to_string())
    }

    #[test]
    fn test_literal_only() {
        let program = compile("line one\nline two\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[literal("line one\n"), literal("line two\n")]
        );
    }

    #[test]
    fn test_literal_reconstruction_invariant() {
        let source = "a\nb\nno directives here, just text\n";
        let program = compile(source).unwrap();
        let rebuilt: String = program
            .instructions()
            .iter()
            .filter_map(|i| match i {
                Instruction::EmitLiteral(text) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(rebuilt, source);
    }

    #[test]
    fn test_line_directive() {
        let program = compile("before\n//? var x = 1;\nafter\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[literal("before\n"), code("var x = 1;"), literal("after\n")]
        );
    }

    #[test]
    fn test_line_echo_forms() {
        let program = compile("//?= 1+1\n//?== V\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::EmitValue {
                    expr: "1+1".to_string(),
                    line_break: true
                },
                Instruction::EmitJson {
                    expr: "V".to_string(),
                    line_break: true
                },
            ]
        );
    }

    #[test]
    fn test_echo_keeps_leading_whitespace_literal() {
        let program = compile("    //?= 'x'\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                literal("    "),
                Instruction::EmitValue {
                    expr: "'x'".to_string(),
                    line_break: true
                },
            ]
        );
    }

    #[test]
    fn test_block_directive_inline() {
        let program = compile("a = /*?= V */;\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                literal("a = "),
                Instruction::EmitValue {
                    expr: "V".to_string(),
                    line_break: false
                },
                literal(";\n"),
            ]
        );
    }

    #[test]
    fn test_block_on_dedicated_line_consumes_break() {
        let program = compile("/*? if (x) */\nout\n").unwrap();
        assert_eq!(program.instructions(), &[code("if (x)"), literal("out\n")]);
    }

    #[test]
    fn test_block_consumes_crlf_uniformly() {
        let program = compile("/*? a() */\r\nout\r\n").unwrap();
        assert_eq!(program.instructions(), &[code("a()"), literal("out\r\n")]);
    }

    #[test]
    fn test_block_trailing_whitespace_before_break_consumed() {
        let program = compile("/*? a() */  \nout\n").unwrap();
        assert_eq!(program.instructions(), &[code("a()"), literal("out\n")]);
    }

    #[test]
    fn test_indent_capture_and_lazy_sync() {
        let program = compile("    //? emit()\n    //? emit()\nx//? other()\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::EmitIndentMarker("    ".to_string()),
                code("emit()"),
                code("emit()"),
                literal("x"),
                code("other()"),
            ]
        );
    }

    #[test]
    fn test_indent_reset_marker() {
        let program = compile("    //? a()\n//? b()\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::EmitIndentMarker("    ".to_string()),
                code("a()"),
                Instruction::EmitIndentMarker(String::new()),
                code("b()"),
            ]
        );
    }

    #[test]
    fn test_directive_sharing_line_keeps_literal() {
        let program = compile("text /*? f() */ more\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[literal("text "), code("f()"), literal(" more\n")]
        );
    }

    #[test]
    fn test_empty_line_directive_emits_nothing() {
        let program = compile("a\n//?\nb\n").unwrap();
        assert_eq!(program.instructions(), &[literal("a\n"), literal("b\n")]);
    }

    #[test]
    fn test_snippet() {
        let program = compile("before\n//?...\nfunction helper() {}\n//?.\nafter\n").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                literal("before\n"),
                code("function helper() {}"),
                literal("after\n"),
            ]
        );
    }

    #[test]
    fn test_snippet_multiline_body_kept_verbatim() {
        let program = compile("//?...\nif (x) {\n  y();\n}\n//?.\n").unwrap();
        assert_eq!(program.instructions(), &[code("if (x) {\n  y();\n}")]);
    }

    #[test]
    fn test_snippet_close_may_be_indented() {
        let program = compile("//?...\nbody()\n  //?.\n").unwrap();
        assert_eq!(program.instructions(), &[code("body()")]);
    }

    #[test]
    fn test_unterminated_block_offset() {
        let source = "fine text /*? broken";
        let err = compile(source).unwrap_err();
        assert_eq!(err, CompileError::UnterminatedBlock { offset: 10 });
    }

    #[test]
    fn test_unterminated_snippet_offset() {
        let err = compile("ok\n//?...\nnever closed\n").unwrap_err();
        assert_eq!(err, CompileError::UnterminatedBlock { offset: 3 });
    }

    #[test]
    fn test_directive_at_end_without_newline() {
        let program = compile("//?= 'x'").unwrap();
        assert_eq!(
            program.instructions(),
            &[Instruction::EmitValue {
                expr: "'x'".to_string(),
                line_break: true
            }]
        );
    }

    #[test]
    fn test_block_echo_json() {
        let program = compile("v = /*?== VERSION */;").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                literal("v = "),
                Instruction::EmitJson {
                    expr: "VERSION".to_string(),
                    line_break: false
                },
                literal(";"),
            ]
        );
    }
}
