//! The interpreter proper: owns the program store, the variable tables, a
//! console, and the main run loop. Grounded throughout on
//! `examples/original_source/Basic.cpp`'s `BasicMachine::Run`/`GetUserInput`/
//! `ParseCommandLine` and `Helpers.cpp`'s `ErrorCondition`/`TestKeyboard` —
//! this module is the Rust shape of that one `BasicMachine` class, with the
//! per-instruction parse/execute/list triads split out into
//! `src/instructions.rs` and `src/lister.rs`.

use crate::console::Console;
use crate::error::BasicError;
use crate::expr::SystemVarSource;
use crate::instructions::{self, ExecCtx, Flow, Instr};
use crate::lexer;
use crate::lister;
use crate::program::{ExecutionPointer, ForStack, GosubStack, Program, ReadPointer, COMMAND_LINE, SHUTDOWN};
use crate::token::TokenReader;
use crate::value::{format_number, Value};
use crate::vars::VarStore;

/// `examples/original_source/Basic.h`'s build-time `bAnsiFor`, promoted to a
/// runtime constant: whether `FOR` pre-checks its bound and may skip zero
/// iterations. Set to `true` unlike the C++ default so `FOR I=1 TO 0` runs
/// zero times rather than once.
pub const ANSI_FOR: bool = true;

/// INKEY$'s system-variable index, matching `vars::SYSTEM_VARS`.
const SYSVAR_INKEY: u8 = 0;
/// TIME$'s system-variable index.
const SYSVAR_TIME: u8 = 1;

/// How many statement dispatches pass between keyboard polls
/// (`TestKeyboard`'s static countdown in `Helpers.cpp`).
const POLL_INTERVAL: u32 = 10;

pub struct Machine<C: Console> {
    program: Program,
    vars: VarStore,
    console: C,
    exec: ExecutionPointer,
    command_line: Vec<Instr>,
    if_stack: Vec<usize>,
    last_line_num: Option<i32>,
    gosub_stack: GosubStack,
    for_stack: ForStack,
    read_pointer: ReadPointer,
    print_pos: usize,
    last_key: u8,
    suppress_prompt: bool,
    poll_counter: u32,
}

/// Wires `last_key` into expression evaluation for `INKEY$`/`TIME$`, without
/// handing the evaluator the whole `Machine` (which also owns `vars`,
/// already borrowed mutably by the same call).
struct SystemVars<'a> {
    last_key: &'a mut u8,
}

impl SystemVarSource for SystemVars<'_> {
    fn system_var(&mut self, idx: u8) -> Value {
        match idx {
            SYSVAR_INKEY => {
                let key = *self.last_key;
                *self.last_key = 0;
                if key == 0 {
                    Value::String(String::new())
                } else {
                    Value::String((key as char).to_string())
                }
            }
            SYSVAR_TIME => Value::String(current_time()),
            _ => Value::String(String::new()),
        }
    }
}

/// `GetVarTime`'s `HH:MM:SS` clock, reimplemented over `SystemTime` instead
/// of `localtime()` (no time-zone database dependency is in this crate's
/// stack) — wall-clock UTC rather than local time.
fn current_time() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let secs_of_day = secs % 86400;
    format!("{:02}:{:02}:{:02}", secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60)
}

impl<C: Console> Machine<C> {
    pub fn new(console: C) -> Self {
        Machine {
            program: Program::new(),
            vars: VarStore::new(),
            console,
            exec: ExecutionPointer::new(COMMAND_LINE),
            command_line: Vec::new(),
            if_stack: Vec::new(),
            last_line_num: None,
            gosub_stack: Vec::new(),
            for_stack: Vec::new(),
            read_pointer: ReadPointer::new(),
            print_pos: 0,
            last_key: 0,
            suppress_prompt: false,
            poll_counter: POLL_INTERVAL,
        }
    }

    /// Convenience for `main.rs`'s optional positional file argument:
    /// `LOAD`s then `RUN`s, matching what typing `LOAD "x": RUN` at the
    /// command line would do.
    pub fn load_and_run(&mut self, path: &str) {
        self.do_load(path);
        self.do_run();
    }

    /// Hands back the console, e.g. so a caller driving a `TestConsole` can
    /// inspect what was printed after `run()` returns.
    pub fn into_console(self) -> C {
        self.console
    }

    /// The main loop (`BasicMachine::Run`): dispatches one statement per
    /// iteration, either from the program or the immediate command buffer,
    /// until `BYE` sets the shutdown sentinel.
    pub fn run(&mut self) {
        while self.exec.line != SHUTDOWN {
            self.poll_keyboard();
            if self.last_key == 27 {
                self.execute_end();
                continue;
            }
            if self.exec.line > COMMAND_LINE {
                self.step_program_line();
            } else {
                self.step_command_line();
            }
        }
    }

    fn poll_keyboard(&mut self) {
        if self.exec.line == COMMAND_LINE {
            self.last_key = 0;
            return;
        }
        if self.poll_counter > 0 {
            self.poll_counter -= 1;
            return;
        }
        self.poll_counter = POLL_INTERVAL;
        self.last_key = if self.console.key_pending() { self.console.read_key() } else { 0 };
    }

    fn step_program_line(&mut self) {
        let line_no = self.exec.line;
        let Some(stmts) = self.program.get(line_no) else {
            self.execute_end();
            return;
        };
        if self.exec.stmt_index >= stmts.len() {
            match self.program.next_line_after(line_no) {
                Some(next) => self.exec = ExecutionPointer::new(next),
                None => self.execute_end(),
            }
            return;
        }

        let stmts = stmts.to_vec();
        let instr = stmts[self.exec.stmt_index].clone();
        if self.exec.skip_for_next && !matches!(instr, Instr::Next(_)) {
            self.exec.stmt_index += 1;
            return;
        }
        self.dispatch(&instr, &stmts);
    }

    fn step_command_line(&mut self) {
        if self.command_line.is_empty() {
            if !self.suppress_prompt {
                self.console.print("Ok\r\n");
            }
            self.print_pos = 0;
            let raw = self.console.read_line();
            match self.parse_input_line(&raw) {
                Err((err, offset)) => {
                    self.console.print(&format!("{}\r\n", err));
                    self.print_caret(&raw, offset);
                }
                Ok((line_num, stmts)) => {
                    self.suppress_prompt = false;
                    if line_num > COMMAND_LINE {
                        self.program.set_line(line_num, stmts);
                        if self.read_pointer.pointer.line == line_num {
                            self.read_pointer = ReadPointer::new();
                        }
                        self.suppress_prompt = true;
                    } else {
                        self.command_line = stmts;
                        self.exec = ExecutionPointer::at(COMMAND_LINE, 0);
                    }
                }
            }
            return;
        }

        if self.exec.stmt_index >= self.command_line.len() {
            self.command_line.clear();
            self.exec = ExecutionPointer::at(COMMAND_LINE, 0);
            return;
        }

        let stmts = self.command_line.clone();
        let instr = stmts[self.exec.stmt_index].clone();
        if self.exec.skip_for_next && !matches!(instr, Instr::Next(_)) {
            self.exec.stmt_index += 1;
            return;
        }
        self.dispatch(&instr, &stmts);
    }

    /// Parses one line of input: leading line number (if any), the
    /// `:`-continuation-of-the-last-numbered-line feature, then statements.
    /// On error, the returned offset is a byte offset into `raw` for the
    /// caret display.
    fn parse_input_line(&mut self, raw: &str) -> Result<(i32, Vec<Instr>), (BasicError, usize)> {
        let trimmed = lexer::skip_spaces(raw);
        if trimmed.is_empty() {
            return Ok((COMMAND_LINE, Vec::new()));
        }

        let mut ptr = trimmed;
        let mut line_num = COMMAND_LINE;
        if let Some((n, rest)) = lexer::try_parse_line_num(ptr) {
            match n {
                Some(n) => {
                    line_num = n;
                    ptr = rest;
                }
                None => return Err((BasicError::LineNumberTooLarge, raw.len() - rest.len())),
            }
        }
        ptr = lexer::skip_spaces(ptr);

        let mut acc;
        let continuation = lexer::peek_symbol(ptr, ':') && self.last_line_num.is_some_and(|n| n > COMMAND_LINE && self.program.contains(n));
        if continuation {
            let prev = self.last_line_num.unwrap();
            ptr = lexer::drop_symbol(ptr, ':').unwrap();
            line_num = prev;
            acc = self.program.get(prev).unwrap().to_vec();
        } else {
            self.if_stack.clear();
            acc = Vec::new();
        }

        let mut fail_offset = 0usize;
        match instructions::parse_statements(ptr, &mut self.vars, &mut self.if_stack, &mut acc, &mut fail_offset) {
            Ok(()) => {
                self.last_line_num = Some(line_num);
                Ok((line_num, acc))
            }
            Err(e) => Err((e, raw.len() - ptr.len() + fail_offset)),
        }
    }

    fn print_caret(&mut self, line: &str, offset: usize) {
        self.console.print(line);
        self.console.print("\r\n");
        let spaces = line[..offset.min(line.len())].chars().count();
        self.console.print(&" ".repeat(spaces));
        self.console.print("^\r\n");
    }

    /// Executes one instruction and applies the resulting control transfer,
    /// or raises an error (`ErrorCondition`'s Rust equivalent) if it fails.
    fn dispatch(&mut self, instr: &Instr, line: &[Instr]) {
        let current = self.exec;
        let mut system = SystemVars { last_key: &mut self.last_key };
        let mut ctx = ExecCtx {
            vars: &mut self.vars,
            system: &mut system,
            console: &mut self.console,
            print_pos: &mut self.print_pos,
            program: &self.program,
            read_pointer: &mut self.read_pointer,
        };
        match instructions::execute(instr, &mut ctx, line, &mut self.for_stack, &mut self.gosub_stack, current) {
            Ok(flow) => self.apply_flow(flow),
            Err(err) => self.raise_error(err),
        }
    }

    fn apply_flow(&mut self, flow: Flow) {
        match flow {
            Flow::Next => self.exec.stmt_index += 1,
            Flow::NextSkipFor => {
                self.exec.stmt_index += 1;
                self.exec.skip_for_next = true;
            }
            Flow::ClearSkipForNext => {
                self.exec.skip_for_next = false;
                self.exec.stmt_index += 1;
            }
            Flow::JumpStmt(idx) => self.exec.stmt_index = idx,
            Flow::JumpLine(n) => self.exec = ExecutionPointer::new(n),
            Flow::JumpTo(line, idx) => self.exec = ExecutionPointer::at(line, idx),
            Flow::EndProgram => self.execute_end(),
            Flow::Shutdown => self.exec = ExecutionPointer::new(SHUTDOWN),
            Flow::Load(name) => {
                self.exec.stmt_index += 1;
                self.do_load(&name);
            }
            Flow::NewProgram => {
                self.exec.stmt_index += 1;
                self.do_new();
            }
            Flow::RunProgram => {
                self.exec.stmt_index += 1;
                self.do_run();
            }
            Flow::Save(name) => match self.do_save(&name) {
                Ok(()) => self.exec.stmt_index += 1,
                Err(e) => self.raise_error(e),
            },
            Flow::ListRange(from, to) => {
                self.do_list(from, to);
                self.exec.stmt_index += 1;
            }
            Flow::DumpVars => {
                self.do_dump_vars();
                self.exec.stmt_index += 1;
            }
        }
    }

    /// `END`/`STOP`'s reset, and the fallback when the program runs off its
    /// last line: back to the command line, immediate buffer and both
    /// control stacks cleared. The `DATA` cursor is untouched — only `END`
    /// and `RUN` move it, never an error or a normal stop.
    fn execute_end(&mut self) {
        self.exec = ExecutionPointer::new(COMMAND_LINE);
        self.read_pointer = ReadPointer::new();
        self.command_line.clear();
        self.gosub_stack.clear();
        self.for_stack.clear();
    }

    /// `ErrorCondition`: prints the message (with a line number if we were
    /// running a program), then resets to the command line. The `DATA`
    /// cursor is deliberately left alone.
    fn raise_error(&mut self, err: BasicError) {
        if self.exec.line > COMMAND_LINE {
            self.console.print(&format!("{} on line {}\r\n", err, self.exec.line));
        } else {
            self.console.print(&format!("{}\r\n", err));
        }
        self.exec = ExecutionPointer::new(COMMAND_LINE);
        self.command_line.clear();
        self.gosub_stack.clear();
        self.for_stack.clear();
    }

    fn do_new(&mut self) {
        if self.exec.line != COMMAND_LINE {
            self.execute_end();
        }
        self.program.clear();
        self.gosub_stack.clear();
        self.for_stack.clear();
        self.vars.clear_all();
    }

    fn do_run(&mut self) {
        if let Some(first) = self.program.first_line() {
            self.exec = ExecutionPointer::new(first);
            self.read_pointer = ReadPointer::new();
            self.vars.reset_vars();
            self.gosub_stack.clear();
            self.for_stack.clear();
        }
    }

    /// `LOAD`: opens the file, wipes the program and variable state exactly
    /// as `NEW` does, then parses one line at a time. A parse error halts
    /// the load, leaving whatever lines were accepted before it intact.
    fn do_load(&mut self, name: &str) {
        let Ok(content) = std::fs::read_to_string(name) else {
            self.raise_error(BasicError::CannotOpenFileToLoad);
            return;
        };
        self.do_new();
        for raw_line in content.lines() {
            if raw_line.is_empty() {
                continue;
            }
            match self.parse_input_line(raw_line) {
                Ok((line_num, stmts)) => {
                    if line_num <= COMMAND_LINE {
                        self.raise_error(BasicError::InvalidLineInSourceFile);
                        return;
                    }
                    self.program.set_line(line_num, stmts);
                }
                Err((err, offset)) => {
                    self.raise_error(err);
                    self.print_caret(raw_line, offset);
                    return;
                }
            }
        }
    }

    fn do_save(&mut self, name: &str) -> Result<(), BasicError> {
        let mut text = String::new();
        for (line, stmts) in self.program.iter() {
            text.push_str(&line.to_string());
            text.push(' ');
            text.push_str(&lister::list_line(stmts, &self.vars));
            text.push('\n');
        }
        std::fs::write(name, text).map_err(|_| BasicError::ErrorOpeningFile)
    }

    fn do_list(&mut self, from: Option<i32>, to: Option<i32>) {
        let lines: Vec<(i32, Vec<Instr>)> = match (from, to) {
            (None, _) => self.program.iter().map(|(l, s)| (l, s.to_vec())).collect(),
            (Some(a), Some(b)) => self.program.range_inclusive(a, b).map(|(l, s)| (l, s.to_vec())).collect(),
            (Some(a), None) => self.program.get(a).map(|s| vec![(a, s.to_vec())]).unwrap_or_default(),
        };
        for (line, stmts) in lines {
            let text = format!("{} {}\r\n", line, lister::list_line(&stmts, &self.vars));
            self.console.print(&text);
        }
    }

    /// `DUMPVARS`: one line per variable, array and user function, matching
    /// `ExecuteDumpVars`'s `printf` formats.
    fn do_dump_vars(&mut self) {
        for v in &self.vars.vars {
            let rendered = match &v.value {
                Value::Number(n) => format_number(*n),
                Value::String(s) => format!("\"{}\"", s),
                _ => "???".to_string(),
            };
            self.console.print(&format!("{} = {}\r\n", v.name, rendered));
        }
        for a in &self.vars.arrays {
            let dims: Vec<String> = a.dimensions.iter().map(|d| (d - 1).to_string()).collect();
            self.console.print(&format!("{}({})\r\n", a.name, dims.join(",")));
        }
        for f in &self.vars.user_functions {
            let params = f.parms.iter().map(|p| p.name.clone()).collect::<Vec<_>>().join(",");
            let body = if f.body.is_empty() {
                "<not set>".to_string()
            } else {
                let mut reader = TokenReader::new(&f.body);
                let mut tokens = Vec::new();
                while !reader.at_end() {
                    match reader.decode() {
                        Ok(t) => tokens.push(t),
                        Err(_) => break,
                    }
                }
                let names: Vec<String> = f.parms.iter().map(|p| p.name.clone()).collect();
                lister::list_expr(&tokens, &self.vars, Some(&names))
            };
            self.console.print(&format!("{}({})={}\r\n", f.name, params, body));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::TestConsole;

    fn run_lines(lines: &[&str]) -> String {
        let mut machine = Machine::new(TestConsole::new());
        for line in lines {
            machine.step_immediate_line(line);
        }
        machine.console.output.clone()
    }

    impl<C: Console> Machine<C> {
        /// Test helper: feeds one line straight through the command-line
        /// parser without the interactive read/prompt cycle, then drives
        /// execution (immediate statements and any program they `RUN`) to
        /// completion.
        fn step_immediate_line(&mut self, line: &str) {
            match self.parse_input_line(line) {
                Ok((line_num, stmts)) => {
                    if line_num > COMMAND_LINE {
                        self.program.set_line(line_num, stmts);
                        return;
                    }
                    self.command_line = stmts;
                    self.exec = ExecutionPointer::at(COMMAND_LINE, 0);
                }
                Err((err, _)) => panic!("parse error: {}", err),
            }

            loop {
                if self.exec.line == SHUTDOWN {
                    break;
                }
                if self.exec.line > COMMAND_LINE {
                    self.step_program_line();
                } else if self.exec.stmt_index < self.command_line.len() {
                    let stmts = self.command_line.clone();
                    let instr = stmts[self.exec.stmt_index].clone();
                    if self.exec.skip_for_next && !matches!(instr, Instr::Next(_)) {
                        self.exec.stmt_index += 1;
                    } else {
                        self.dispatch(&instr, &stmts);
                    }
                } else {
                    break;
                }
            }
        }
    }

    #[test]
    fn prints_hello_on_run() {
        let out = run_lines(&["10 PRINT \"HELLO\"", "RUN"]);
        assert!(out.contains("HELLO\r\n"));
    }

    #[test]
    fn for_next_counts_up() {
        let out = run_lines(&["10 FOR I=1 TO 3", "20 PRINT I", "30 NEXT I", "RUN"]);
        assert_eq!(out.matches("\r\n").count(), 3);
        assert!(out.contains(" 1 "));
        assert!(out.contains(" 2 "));
        assert!(out.contains(" 3 "));
    }

    #[test]
    fn zero_iteration_for_loop_runs_body_zero_times() {
        let out = run_lines(&["10 FOR I=1 TO 0", "20 PRINT \"X\"", "30 NEXT I", "RUN"]);
        assert!(!out.contains('X'));
    }

    #[test]
    fn division_by_zero_reports_error_and_returns_to_command_line() {
        let out = run_lines(&["10 PRINT 1/0", "RUN"]);
        assert!(out.contains("Division by zero"));
    }

    #[test]
    fn goto_missing_line_reports_error() {
        let out = run_lines(&["10 GOTO 999", "RUN"]);
        assert!(out.contains("GOTO - line not found on line 10"));
    }

    #[test]
    fn new_wipes_program_and_variables() {
        let mut machine = Machine::new(TestConsole::new());
        machine.step_immediate_line("10 PRINT \"HI\"");
        machine.step_immediate_line("NEW");
        assert!(machine.program.is_empty());
    }

    #[test]
    fn dump_vars_reports_variable_value() {
        let out = run_lines(&["LET A=5", "DUMPVARS"]);
        assert!(out.contains("A = 5"));
    }
}
