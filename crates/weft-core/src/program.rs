/*
 * program.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! The compiled intermediate program.
//!
//! A [`MetaProgram`] is an ordered instruction sequence produced by the
//! compiler and interpreted by the engine. Concatenating the
//! `EmitLiteral` payloads in order reconstructs exactly the
//! non-directive text of the source; the program is immutable once
//! compiled.

use serde::Serialize;

/// One instruction of a compiled meta program.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instruction {
    /// Write a literal span of the source verbatim.
    EmitLiteral(String),

    /// Update the indentation register to the captured indent.
    EmitIndentMarker(String),

    /// Directive code, executed for effect.
    RawCode(String),

    /// Write the text form of an expression. `line_break` is set for
    /// the bare line form, whose terminator was consumed as the
    /// directive's own end marker.
    EmitValue { expr: String, line_break: bool },

    /// Write the JSON form of an expression.
    EmitJson { expr: String, line_break: bool },
}

impl Instruction {
    /// The script text this instruction lowers to. May span multiple
    /// lines for raw code; never ends with a line break.
    pub fn script_text(&self) -> String {
        match self {
            Instruction::EmitLiteral(text) => {
                format!("write('{}');", escape_literal(text))
            }
            Instruction::EmitIndentMarker(indent) => {
                format!("__ = '{}';", escape_literal(indent))
            }
            Instruction::RawCode(code) => code.clone(),
            Instruction::EmitValue { expr, line_break } => {
                if *line_break {
                    format!("writeln({expr});")
                } else {
                    format!("write({expr});")
                }
            }
            Instruction::EmitJson { expr, line_break } => {
                if *line_break {
                    format!("writeln(json({expr}));")
                } else {
                    format!("write(json({expr}));")
                }
            }
        }
    }
}

/// An ordered, immutable instruction sequence compiled from one source
/// unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetaProgram {
    instructions: Vec<Instruction>,
}

impl MetaProgram {
    pub(crate) fn new(instructions: Vec<Instruction>) -> MetaProgram {
        MetaProgram { instructions }
    }

    /// The instructions, in execution order.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Lower the program to executable script source.
    ///
    /// Each instruction occupies one or more whole lines; `line_map`
    /// maps every 1-based script line back to its instruction index, so
    /// faults in the script can be pinned to an instruction.
    pub fn lower(&self) -> LoweredProgram {
        let mut source = String::new();
        let mut line_map = Vec::new();
        for (index, instruction) in self.instructions.iter().enumerate() {
            let text = instruction.script_text();
            let lines = 1 + text.matches('\n').count();
            source.push_str(&text);
            source.push('\n');
            line_map.extend(std::iter::repeat_n(index, lines));
        }
        LoweredProgram { source, line_map }
    }
}

/// A meta program lowered to script source, with the line-to-instruction
/// mapping needed for diagnostics.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub source: String,
    line_map: Vec<usize>,
}

impl LoweredProgram {
    /// Map a 1-based script line to its instruction index.
    pub fn instruction_at_line(&self, line: usize) -> Option<usize> {
        line.checked_sub(1)
            .and_then(|i| self.line_map.get(i))
            .copied()
    }
}

/// Escape text for embedding in a single-quoted script literal:
/// backslash, the quote character, carriage return and line feed, so
/// the original bytes reconstruct exactly.
pub fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("plain"), "plain");
        assert_eq!(escape_literal("a'b"), "a\\'b");
        assert_eq!(escape_literal("back\\slash"), "back\\\\slash");
        assert_eq!(escape_literal("line\r\nbreak"), "line\\r\\nbreak");
    }

    #[test]
    fn test_script_text_forms() {
        assert_eq!(
            Instruction::EmitLiteral("x'\n".to_string()).script_text(),
            "write('x\\'\\n');"
        );
        assert_eq!(
            Instruction::EmitIndentMarker("  ".to_string()).script_text(),
            "__ = '  ';"
        );
        assert_eq!(
            Instruction::EmitValue {
                expr: "1+1".to_string(),
                line_break: true
            }
            .script_text(),
            "writeln(1+1);"
        );
        assert_eq!(
            Instruction::EmitJson {
                expr: "V".to_string(),
                line_break: false
            }
            .script_text(),
            "write(json(V));"
        );
    }

    #[test]
    fn test_lowering_line_map() {
        let program = MetaProgram::new(vec![
            Instruction::EmitLiteral("a\n".to_string()),
            Instruction::RawCode("if (x) {\n  y = 1;\n}".to_string()),
            Instruction::EmitValue {
                expr: "y".to_string(),
                line_break: false,
            },
        ]);
        let lowered = program.lower();
        assert_eq!(
            lowered.source,
            "write('a\\n');\nif (x) {\n  y = 1;\n}\nwrite(y);\n"
        );
        assert_eq!(lowered.instruction_at_line(1), Some(0));
        assert_eq!(lowered.instruction_at_line(2), Some(1));
        assert_eq!(lowered.instruction_at_line(4), Some(1));
        assert_eq!(lowered.instruction_at_line(5), Some(2));
        assert_eq!(lowered.instruction_at_line(6), None);
        assert_eq!(lowered.instruction_at_line(0), None);
    }
}
