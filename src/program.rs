//! The stored program: a line-number-ordered statement store plus the
//! bookkeeping structures the execution engine threads through it (the
//! execution pointer, the `GOSUB` return stack, the `FOR` loop stack, and
//! the `DATA`/`READ` scan cursor).
//!
//! Each line is stored as a `Vec<Instr>` rather than the original's raw
//! `[code][len][payload]` byte blob — the outer statement layer has no
//! round-trip contract beyond canonical-text stability (`LIST`/`SAVE` go
//! through text, never raw bytes), so a typed enum satisfies the same
//! invariant (`parse(list(parse(l))) == parse(l)`, checked here via
//! `Vec<Instr>` equality instead of byte equality) while reading far more
//! naturally than a byte-dispatch layer. The inner expression-token layer
//! (`src/token.rs`) keeps its byte encoding, since that's the one place the
//! source also persists raw bytes outside of text: a `DEF`'d function body.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::instructions::Instr;

/// The immediate-mode buffer's pseudo line number.
pub const COMMAND_LINE: i32 = -1;
/// Sentinel line number that ends the run loop.
pub const SHUTDOWN: i32 = -2;

/// Statements, keyed by line number and kept in sorted order so
/// `GOTO`/`LIST`/sequential fall-through can all walk forward from any
/// point without re-sorting.
#[derive(Debug, Default)]
pub struct Program {
    lines: BTreeMap<i32, Vec<Instr>>,
}

impl Program {
    pub fn new() -> Self {
        Program { lines: BTreeMap::new() }
    }

    /// Stores (or, for an empty statement, deletes) a line — entering a
    /// bare line number with nothing after it removes that line, the usual
    /// BASIC convention for deleting a line from the program.
    pub fn set_line(&mut self, line: i32, statement: Vec<Instr>) {
        if statement.is_empty() {
            self.lines.remove(&line);
        } else {
            self.lines.insert(line, statement);
        }
    }

    pub fn get(&self, line: i32) -> Option<&[Instr]> {
        self.lines.get(&line).map(|v| v.as_slice())
    }

    pub fn contains(&self, line: i32) -> bool {
        self.lines.contains_key(&line)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn first_line(&self) -> Option<i32> {
        self.lines.keys().next().copied()
    }

    /// The smallest stored line number strictly greater than `line`; `None`
    /// past the last line (the run loop treats that as `END`).
    pub fn next_line_after(&self, line: i32) -> Option<i32> {
        self.lines.range((Bound::Excluded(line), Bound::Unbounded)).next().map(|(k, _)| *k)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, &[Instr])> {
        self.lines.iter().map(|(k, v)| (*k, v.as_slice()))
    }

    /// Lines in `[from, to]`, inclusive, for `LIST`.
    pub fn range_inclusive(&self, from: i32, to: i32) -> impl Iterator<Item = (i32, &[Instr])> {
        self.lines.range(from..=to).map(|(k, v)| (*k, v.as_slice()))
    }
}

/// A position within the program: which line, which statement index within
/// that line's `Vec<Instr>`, and whether we're in the middle of an
/// ANSI-style `FOR` skip-scan (still dispatching to `NEXT` along the way,
/// every other instruction's execution suppressed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPointer {
    pub line: i32,
    pub stmt_index: usize,
    pub skip_for_next: bool,
}

impl ExecutionPointer {
    pub fn new(line: i32) -> Self {
        ExecutionPointer { line, stmt_index: 0, skip_for_next: false }
    }

    pub fn at(line: i32, stmt_index: usize) -> Self {
        ExecutionPointer { line, stmt_index, skip_for_next: false }
    }
}

/// One `FOR` loop's state: the variable being driven, its limit and step,
/// and the pointer to resume at on `NEXT` (the statement right after
/// `FOR`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForFrame {
    pub var: u16,
    pub limit: f32,
    pub step: f32,
    pub loop_head: ExecutionPointer,
}

pub type GosubStack = Vec<ExecutionPointer>;
pub type ForStack = Vec<ForFrame>;

/// `DATA`/`READ`/`RESTORE`'s independent scan cursor: it walks the program
/// the same way the main execution pointer does, but tracks its own
/// position inside whichever `DATA` statement it's currently parked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPointer {
    pub pointer: ExecutionPointer,
    pub item_offset: usize,
}

impl ReadPointer {
    pub fn new() -> Self {
        ReadPointer { pointer: ExecutionPointer::new(COMMAND_LINE), item_offset: 0 }
    }
}

impl Default for ReadPointer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rem(text: &str) -> Instr {
        Instr::Rem(text.to_string())
    }

    #[test]
    fn set_line_with_empty_statement_deletes_it() {
        let mut p = Program::new();
        p.set_line(10, vec![rem("x")]);
        assert!(p.contains(10));
        p.set_line(10, vec![]);
        assert!(!p.contains(10));
    }

    #[test]
    fn next_line_after_walks_in_numeric_order() {
        let mut p = Program::new();
        p.set_line(30, vec![rem("x")]);
        p.set_line(10, vec![rem("x")]);
        p.set_line(20, vec![rem("x")]);
        assert_eq!(p.first_line(), Some(10));
        assert_eq!(p.next_line_after(10), Some(20));
        assert_eq!(p.next_line_after(20), Some(30));
        assert_eq!(p.next_line_after(30), None);
    }

    #[test]
    fn range_inclusive_bounds_list_output() {
        let mut p = Program::new();
        for line in [10, 20, 30, 40] {
            p.set_line(line, vec![rem("x")]);
        }
        let listed: Vec<i32> = p.range_inclusive(15, 35).map(|(l, _)| l).collect();
        assert_eq!(listed, vec![20, 30]);
    }
}
