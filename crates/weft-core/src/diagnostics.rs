/*
 * diagnostics.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Fault-annotated program rendering.
//!
//! When a transform faults, the detecting frame attaches a rendered
//! listing of its meta program so the failing instruction can be seen
//! in context. Rendering is best effort and never fails: an
//! unmappable location simply produces the unmarked listing.

use crate::error::ExecutionFault;
use crate::program::MetaProgram;

/// Render a program listing, marking `instruction` when it is a valid
/// index.
pub fn render_listing(program: &MetaProgram, instruction: Option<usize>) -> String {
    let marked = instruction.filter(|i| *i < program.len());
    let mut out = String::from("meta program:\n");
    for (index, instr) in program.instructions().iter().enumerate() {
        let gutter = if marked == Some(index) { ">>" } else { "  " };
        for (line_no, line) in instr.script_text().split('\n').enumerate() {
            if line_no == 0 {
                out.push_str(&format!("{gutter} {:>4} | {line}\n", index + 1));
            } else {
                // Continuation lines of a multi-line instruction
                out.push_str(&format!("{gutter}      | {line}\n"));
            }
        }
    }
    out
}

/// Attach a rendered program view to `fault`, unless one is already
/// present. Outer include frames see the marker and leave the fault
/// untouched, so context is attached exactly once.
pub fn annotate(fault: &mut ExecutionFault, program: &MetaProgram, filename: &str) {
    if fault.is_annotated() {
        return;
    }
    fault.listing = Some(render_listing(program, fault.instruction));
    if fault.filename.is_none() {
        fault.filename = Some(filename.to_string());
    }
}
