//! The statement layer: one typed `Instr` per parsed instruction, the
//! per-instruction parsers that build a line's `Vec<Instr>`, and the
//! per-instruction executors that drive the machine forward.
//!
//! Grounded throughout on `examples/original_source/Instructions.cpp`'s
//! `Parse*`/`Execute*`/`List*` triads and `examples/original_source/Basic.cpp`'s
//! `Init()` instruction table (keyword set, dispatch order, `THEN`/`GOTO`
//! shorthand, `ELSE` chaining). Listing lives in `src/lister.rs`, which
//! walks these same variants.

use crate::error::BasicError;
use crate::expr::{compile_expression, evaluate_expression, SystemVarSource};
use crate::lexer;
use crate::token::Token;
use crate::value::Value;
use crate::vars::VarStore;

/// Keywords that can terminate an expression mid-parse without a colon —
/// `FOR`'s `TO`/`STEP`, `IF`'s `THEN`/`GOTO`, and `ELSE` closing a then-branch.
const TERMINATORS: &[&str] = &["TO", "STEP", "THEN", "GOTO", "ELSE"];

fn compile_expr<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Vec<Token>, &'a str), BasicError> {
    compile_expression(s, vars, TERMINATORS, None)
}

fn compile_expr_params<'a>(s: &'a str, vars: &mut VarStore, params: &[String]) -> Result<(Vec<Token>, &'a str), BasicError> {
    compile_expression(s, vars, TERMINATORS, Some(params))
}

/// An assignment/`INPUT`/`READ` target.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Variable(u16),
    Array(u8, Vec<Token>),
}

/// One `DIM` item: a bare variable (accepted, does nothing) or an array
/// with its dimension-list expression.
#[derive(Debug, Clone, PartialEq)]
pub enum DimTarget {
    Bare(u16),
    Array(u8, Vec<Token>),
}

/// A fully parsed statement. Stored directly in `Program`, one line ==
/// one `Vec<Instr>` — the idiomatic stand-in for the source's raw
/// `[code][len][payload]` blob (see `src/program.rs`'s module doc).
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Let(LValue, Vec<Token>),
    Goto(i32),
    Gosub(i32),
    Bye,
    Cls,
    Data(Vec<Value>),
    Def { func: u8, params: Vec<String>, body: Vec<Token> },
    Dim(Vec<DimTarget>),
    If { cond: Vec<Token>, else_index: Option<usize> },
    Else,
    End,
    For { var: u16, from: Vec<Token>, to: Vec<Token>, step: Option<Vec<Token>> },
    Input { prompt: Option<(String, char)>, targets: Vec<LValue> },
    List { from: Option<i32>, to: Option<i32> },
    Load(String),
    New,
    Next(Vec<u16>),
    On { expr: Vec<Token>, gosub: bool, targets: Vec<i32> },
    Print(Vec<Token>),
    Randomize(Option<Vec<Token>>),
    Read(Vec<LValue>),
    Rem(String),
    Restore(Option<i32>),
    Return,
    Run,
    Save(String),
    Stop,
    DumpVars,
}

// ---------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------

/// Parses every statement in `text` (colons optional, elided whenever a
/// keyword unambiguously starts the next one) and appends them to `acc`,
/// threading `if_stack` so a later `ELSE` can backpatch the nearest open
/// `IF`. Used both for a fresh line and for the `:`-continuation feature
/// (which starts from an existing line's `Vec<Instr>`).
///
/// On a parse error, `*fail_offset` is set to how many bytes of `text` had
/// been consumed before the failing statement started — the command line's
/// caret display points there.
pub fn parse_statements(text: &str, vars: &mut VarStore, if_stack: &mut Vec<usize>, acc: &mut Vec<Instr>, fail_offset: &mut usize) -> Result<(), BasicError> {
    let mut rest = text;
    loop {
        rest = lexer::skip_spaces(rest);
        if rest.is_empty() {
            break;
        }
        if let Some(next) = lexer::drop_symbol(rest, ':') {
            rest = next;
            continue;
        }
        *fail_offset = text.len() - rest.len();

        if let Some(next) = lexer::match_keyword(rest, "ELSE") {
            let if_idx = if_stack.pop().ok_or_else(|| BasicError::SyntaxErrorIn("ELSE".to_string()))?;
            acc.push(Instr::Else);
            if let Some(Instr::If { else_index, .. }) = acc.get_mut(if_idx) {
                *else_index = Some(acc.len());
            }
            rest = next;
            continue;
        }

        let (instr, next) = parse_one(rest, vars, if_stack, acc.len())?;
        let is_rem = matches!(instr, Instr::Rem(_));
        acc.push(instr);
        if is_rem {
            break;
        }
        rest = next;
    }
    Ok(())
}

fn parse_one<'a>(s: &'a str, vars: &mut VarStore, if_stack: &mut Vec<usize>, acc_index: usize) -> Result<(Instr, &'a str), BasicError> {
    if let Some(rest) = lexer::match_keyword(s, "BYE") {
        return Ok((Instr::Bye, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "CLS") {
        return Ok((Instr::Cls, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "DATA") {
        return parse_data(rest);
    }
    if let Some(rest) = lexer::match_keyword(s, "DEF") {
        return parse_def(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "DIM") {
        return parse_dim(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "END") {
        return Ok((Instr::End, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "FOR") {
        return parse_for(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "GOTO") {
        return parse_goto(rest);
    }
    if let Some(rest) = lexer::match_keyword(s, "GOSUB") {
        return parse_gosub(rest);
    }
    if let Some(rest) = lexer::match_keyword(s, "IF") {
        return parse_if(rest, vars, if_stack, acc_index);
    }
    if let Some(rest) = lexer::match_keyword(s, "INPUT") {
        return parse_input(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "LET") {
        return parse_let(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "LIST") {
        return parse_list(rest);
    }
    if let Some(rest) = lexer::match_keyword(s, "LOAD") {
        return parse_filename(rest).map(|(name, r)| (Instr::Load(name), r));
    }
    if let Some(rest) = lexer::match_keyword(s, "NEW") {
        return Ok((Instr::New, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "NEXT") {
        return parse_next(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "ON") {
        return parse_on(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "PRINT") {
        let (tokens, rest) = compile_expr(rest, vars)?;
        return Ok((Instr::Print(tokens), rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "READ") {
        return parse_read(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "REM") {
        return Ok((Instr::Rem(rest.to_string()), ""));
    }
    if let Some(rest) = lexer::match_keyword(s, "RUN") {
        return Ok((Instr::Run, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "RESTORE") {
        return parse_restore(rest);
    }
    if let Some(rest) = lexer::match_keyword(s, "RETURN") {
        return Ok((Instr::Return, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "SAVE") {
        return parse_filename(rest).map(|(name, r)| (Instr::Save(name), r));
    }
    if let Some(rest) = lexer::match_keyword(s, "STOP") {
        return Ok((Instr::Stop, rest));
    }
    if let Some(rest) = lexer::match_keyword(s, "RANDOMIZE") {
        return parse_randomize(rest, vars);
    }
    if let Some(rest) = lexer::match_keyword(s, "DUMPVARS") {
        return Ok((Instr::DumpVars, rest));
    }

    // No instruction keyword: a bare line number is an implicit GOTO
    // (used as the then-branch shorthand `IF x THEN 100`); otherwise this
    // is an implicit LET.
    if let Some((Some(n), rest)) = lexer::try_parse_line_num(s) {
        return Ok((Instr::Goto(n), rest));
    }
    parse_let_target(s, vars)
}

fn parse_data(s: &str) -> Result<(Instr, &str), BasicError> {
    let mut items = Vec::new();
    let mut rest = s;
    loop {
        let trimmed = lexer::skip_spaces(rest);
        if trimmed.is_empty() {
            break;
        }
        if let Some((text, next)) = lexer::try_parse_string(trimmed) {
            items.push(Value::String(text));
            rest = next;
        } else if let Some((n, next)) = lexer::try_parse_number(trimmed) {
            items.push(Value::Number(n));
            rest = next;
        } else {
            return Err(BasicError::SyntaxErrorIn("DATA".to_string()));
        }
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    Ok((Instr::Data(items), rest))
}

fn parse_def<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let (name, rest) = lexer::try_parse_identifier(s).ok_or(BasicError::SyntaxErrorIn("DEF".to_string()))?;
    if !(name.starts_with("FN") && name.len() > 2) {
        return Err(BasicError::SyntaxErrorIn("DEF".to_string()));
    }
    let func = vars.register_user_function(&name)?;
    let rest = lexer::drop_symbol(rest, '(').ok_or(BasicError::SyntaxErrorIn("DEF".to_string()))?;

    let mut params = Vec::new();
    let mut rest = rest;
    loop {
        let trimmed = lexer::skip_spaces(rest);
        if lexer::peek_symbol(trimmed, ')') {
            rest = trimmed;
            break;
        }
        let (pname, next) = lexer::try_parse_identifier(trimmed).ok_or(BasicError::SyntaxErrorIn("DEF".to_string()))?;
        params.push(pname);
        rest = next;
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    let rest = lexer::drop_symbol(rest, ')').ok_or(BasicError::SyntaxErrorIn("DEF".to_string()))?;
    let rest = lexer::drop_symbol(rest, '=').ok_or(BasicError::SyntaxErrorIn("DEF".to_string()))?;
    let (body, rest) = compile_expr_params(rest, vars, &params)?;
    Ok((Instr::Def { func, params, body }, rest))
}

fn parse_dim<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let mut targets = Vec::new();
    let mut rest = s;
    loop {
        let (name, next) = lexer::try_parse_identifier(rest).ok_or(BasicError::SyntaxErrorIn("DIM".to_string()))?;
        rest = next;
        if let Some(after_paren) = lexer::drop_symbol(rest, '(') {
            let idx = vars.register_array(&name)?;
            let (dims, after) = compile_expr(after_paren, vars)?;
            let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxErrorIn("DIM".to_string()))?;
            targets.push(DimTarget::Array(idx, dims));
            rest = after;
        } else {
            let idx = vars.register_variable(&name)?;
            targets.push(DimTarget::Bare(idx));
        }
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    Ok((Instr::Dim(targets), rest))
}

fn parse_for<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let (name, rest) = lexer::try_parse_identifier(s).ok_or(BasicError::SyntaxErrorIn("FOR".to_string()))?;
    let var = vars.register_variable(&name)?;
    let rest = lexer::drop_symbol(rest, '=').ok_or(BasicError::SyntaxErrorIn("FOR".to_string()))?;
    let (from, rest) = compile_expr(rest, vars)?;
    let rest = lexer::match_keyword(rest, "TO").ok_or(BasicError::SyntaxErrorIn("FOR".to_string()))?;
    let (to, rest) = compile_expr(rest, vars)?;
    if let Some(rest) = lexer::match_keyword(rest, "STEP") {
        let (step, rest) = compile_expr(rest, vars)?;
        Ok((Instr::For { var, from, to, step: Some(step) }, rest))
    } else {
        Ok((Instr::For { var, from, to, step: None }, rest))
    }
}

fn parse_goto(s: &str) -> Result<(Instr, &str), BasicError> {
    let (Some(n), rest) = lexer::try_parse_line_num(s).ok_or(BasicError::SyntaxErrorIn("GOTO".to_string()))? else {
        return Err(BasicError::LineNumberTooLarge);
    };
    Ok((Instr::Goto(n), rest))
}

fn parse_gosub(s: &str) -> Result<(Instr, &str), BasicError> {
    let (Some(n), rest) = lexer::try_parse_line_num(s).ok_or(BasicError::SyntaxErrorIn("GOSUB".to_string()))? else {
        return Err(BasicError::LineNumberTooLarge);
    };
    Ok((Instr::Gosub(n), rest))
}

fn parse_if<'a>(s: &'a str, vars: &mut VarStore, if_stack: &mut Vec<usize>, acc_index: usize) -> Result<(Instr, &'a str), BasicError> {
    let (cond, rest) = compile_expr(s, vars)?;
    let rest = if let Some(rest) = lexer::match_keyword(rest, "THEN") {
        rest
    } else if lexer::match_keyword(rest, "GOTO").is_some() {
        // "GOTO" is left unconsumed: it is re-parsed as the then-branch's
        // own `GOTO` statement by the next loop iteration.
        rest
    } else {
        return Err(BasicError::SyntaxErrorIn("IF".to_string()));
    };
    if_stack.push(acc_index);
    Ok((Instr::If { cond, else_index: None }, rest))
}

fn parse_input<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let mut rest = s;
    let mut prompt = None;
    if let Some((text, next)) = lexer::try_parse_string(rest) {
        if let Some(next2) = lexer::drop_symbol(next, ',') {
            prompt = Some((text, ','));
            rest = next2;
        } else if let Some(next2) = lexer::drop_symbol(next, ';') {
            prompt = Some((text, ';'));
            rest = next2;
        } else {
            return Err(BasicError::SyntaxErrorIn("INPUT".to_string()));
        }
    }
    let targets = parse_lvalue_list(rest, vars)?;
    Ok((Instr::Input { prompt, targets: targets.0 }, targets.1))
}

fn parse_lvalue_list<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Vec<LValue>, &'a str), BasicError> {
    let mut targets = Vec::new();
    let mut rest = s;
    loop {
        let (lv, next) = parse_lvalue(rest, vars)?;
        targets.push(lv);
        rest = next;
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    Ok((targets, rest))
}

fn parse_lvalue<'a>(s: &'a str, vars: &mut VarStore) -> Result<(LValue, &'a str), BasicError> {
    let (name, rest) = lexer::try_parse_identifier(s).ok_or(BasicError::SyntaxError)?;
    if let Some(after_paren) = lexer::drop_symbol(rest, '(') {
        let idx = vars.register_array(&name)?;
        let (index_expr, after) = compile_expr(after_paren, vars)?;
        let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxError)?;
        Ok((LValue::Array(idx, index_expr), after))
    } else {
        let idx = vars.register_variable(&name)?;
        Ok((LValue::Variable(idx), rest))
    }
}

fn parse_let<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    parse_let_target(s, vars)
}

fn parse_let_target<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let (lv, rest) = parse_lvalue(s, vars)?;
    let rest = lexer::drop_symbol(rest, '=').ok_or(BasicError::SyntaxError)?;
    let (rhs, rest) = compile_expr(rest, vars)?;
    Ok((Instr::Let(lv, rhs), rest))
}

fn parse_list(s: &str) -> Result<(Instr, &str), BasicError> {
    let trimmed = lexer::skip_spaces(s);
    if let Some((from, rest)) = lexer::try_parse_line_num(trimmed) {
        let from = from.ok_or(BasicError::LineNumberTooLarge)?;
        let rest2 = lexer::skip_spaces(rest);
        if let Some(rest2) = lexer::drop_symbol(rest2, ',').or_else(|| lexer::drop_symbol(rest2, '-')) {
            if let Some((to, rest3)) = lexer::try_parse_line_num(rest2) {
                let to = to.ok_or(BasicError::LineNumberTooLarge)?;
                return Ok((Instr::List { from: Some(from), to: Some(to) }, rest3));
            }
        }
        return Ok((Instr::List { from: Some(from), to: Some(from) }, rest));
    }
    Ok((Instr::List { from: None, to: None }, trimmed))
}

fn parse_filename(s: &str) -> Result<(String, &str), BasicError> {
    if let Some((text, rest)) = lexer::try_parse_string(s) {
        return Ok((text, rest));
    }
    lexer::try_parse_word(s).ok_or(BasicError::SyntaxError)
}

fn parse_next<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let mut vars_out = Vec::new();
    let mut rest = s;
    loop {
        let trimmed = lexer::skip_spaces(rest);
        let Some((name, next)) = lexer::try_parse_identifier(trimmed) else {
            rest = trimmed;
            break;
        };
        vars_out.push(vars.register_variable(&name)?);
        rest = next;
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    Ok((Instr::Next(vars_out), rest))
}

fn parse_on<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let (expr, rest) = compile_expr(s, vars)?;
    let (gosub, rest) = if let Some(rest) = lexer::match_keyword(rest, "GOSUB") {
        (true, rest)
    } else if let Some(rest) = lexer::match_keyword(rest, "GOTO") {
        (false, rest)
    } else {
        return Err(BasicError::SyntaxErrorIn("ON".to_string()));
    };
    let mut targets = Vec::new();
    let mut rest = rest;
    loop {
        let (n, next) = lexer::try_parse_line_num(rest).ok_or(BasicError::SyntaxErrorIn("ON".to_string()))?;
        targets.push(n.ok_or(BasicError::LineNumberTooLarge)?);
        rest = next;
        if let Some(next) = lexer::drop_symbol(rest, ',') {
            rest = next;
        } else {
            break;
        }
    }
    Ok((Instr::On { expr, gosub, targets }, rest))
}

fn parse_read<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let (targets, rest) = parse_lvalue_list(s, vars)?;
    Ok((Instr::Read(targets), rest))
}

fn parse_restore(s: &str) -> Result<(Instr, &str), BasicError> {
    let trimmed = lexer::skip_spaces(s);
    if let Some((n, rest)) = lexer::try_parse_line_num(trimmed) {
        let n = n.ok_or(BasicError::LineNumberTooLarge)?;
        return Ok((Instr::Restore(Some(n)), rest));
    }
    Ok((Instr::Restore(None), trimmed))
}

fn parse_randomize<'a>(s: &'a str, vars: &mut VarStore) -> Result<(Instr, &'a str), BasicError> {
    let trimmed = lexer::skip_spaces(s);
    if trimmed.is_empty() {
        return Ok((Instr::Randomize(None), trimmed));
    }
    let (expr, rest) = compile_expr(trimmed, vars)?;
    Ok((Instr::Randomize(Some(expr)), rest))
}

// ---------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------

/// What the execution loop should do once an instruction returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Next,
    /// Like `Next`, but also sets the pointer's `skip_for_next` flag (an
    /// ANSI-mode `FOR` whose body never runs because the range is already
    /// past its limit on entry).
    NextSkipFor,
    /// Clears `skip_for_next` and falls through normally; a `NEXT` that
    /// matched the loop it was skip-scanning for.
    ClearSkipForNext,
    JumpStmt(usize),
    JumpLine(i32),
    JumpTo(i32, usize),
    EndProgram,
    Shutdown,
    Load(String),
    Save(String),
    NewProgram,
    RunProgram,
    ListRange(Option<i32>, Option<i32>),
    DumpVars,
}

/// Bundles the mutable state an instruction executor needs, without
/// depending on `Machine`'s own type (`src/machine.rs` owns the console
/// generic parameter; this keeps `instructions.rs` console-agnostic).
pub struct ExecCtx<'a> {
    pub vars: &'a mut VarStore,
    pub system: &'a mut dyn SystemVarSource,
    pub console: &'a mut dyn crate::console::Console,
    pub print_pos: &'a mut usize,
    pub program: &'a crate::program::Program,
    pub read_pointer: &'a mut crate::program::ReadPointer,
}

fn eval(tokens: &[Token], ctx: &mut ExecCtx) -> Result<Vec<Value>, BasicError> {
    let result = evaluate_expression(tokens, ctx.vars, ctx.system, None)?;
    raise_if_error(&result)?;
    Ok(result)
}

/// The original's `EvaluateExpression` scans its flushed result for any
/// embedded `Error` value and promotes it to a hard error before the
/// caller ever sees it; this is that promotion, run by every instruction
/// that evaluates an expression.
pub fn raise_if_error(values: &[Value]) -> Result<(), BasicError> {
    for v in values {
        if let Value::Error(msg) = v {
            return Err(BasicError::BadExpression(msg.clone()));
        }
    }
    Ok(())
}

fn one_value(values: Vec<Value>) -> Result<Value, BasicError> {
    let mut non_sep: Vec<Value> = values.into_iter().filter(|v| !matches!(v, Value::Separator(_))).collect();
    if non_sep.len() != 1 {
        return Err(BasicError::MalformedExpression);
    }
    Ok(non_sep.remove(0))
}

fn indices(values: &[Value]) -> Result<Vec<i32>, BasicError> {
    values
        .iter()
        .filter(|v| !matches!(v, Value::Separator(_)))
        .map(|v| match v {
            Value::Number(n) => Ok(*n as i32),
            _ => Err(BasicError::BadArrayIndex),
        })
        .collect()
}

fn assign_lvalue(lv: &LValue, value: Value, ctx: &mut ExecCtx) -> Result<(), BasicError> {
    match lv {
        LValue::Variable(idx) => {
            let current = &ctx.vars.vars[*idx as usize].value;
            if !current.same_category(&value) {
                return Err(BasicError::BadAssignmentValue);
            }
            ctx.vars.vars[*idx as usize].value = value;
            Ok(())
        }
        LValue::Array(idx, index_expr) => {
            let idx_values = eval(index_expr, ctx)?;
            let idx_list = indices(&idx_values)?;
            ctx.vars.array_set(*idx, &idx_list, value)?;
            Ok(())
        }
    }
}

fn lvalue_is_string(lv: &LValue, vars: &VarStore) -> bool {
    match lv {
        LValue::Variable(idx) => matches!(vars.vars[*idx as usize].value, Value::String(_)),
        LValue::Array(idx, _) => vars.arrays[*idx as usize].name.ends_with('$'),
    }
}

/// Splits an `INPUT` reply on commas, honoring doubled-quote-escaped quoted
/// fields exactly the way `DATA`'s own string syntax does.
fn split_input_line(line: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut rest = line;
    loop {
        let trimmed = rest.trim_start();
        if let Some((text, next)) = lexer::try_parse_string(trimmed) {
            parts.push(text);
            rest = next.trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next;
                continue;
            }
            break;
        }
        match trimmed.find(',') {
            Some(pos) => {
                parts.push(trimmed[..pos].trim().to_string());
                rest = &trimmed[pos + 1..];
            }
            None => {
                parts.push(trimmed.trim().to_string());
                break;
            }
        }
    }
    parts
}

/// Executes one instruction, returning how the execution pointer should
/// move next. `line` is the full statement list the instruction lives in
/// (needed for `ELSE`'s chain-skip lookahead), `current` is this
/// instruction's own position.
pub fn execute(
    instr: &Instr,
    ctx: &mut ExecCtx,
    line: &[Instr],
    for_stack: &mut Vec<crate::program::ForFrame>,
    gosub_stack: &mut Vec<crate::program::ExecutionPointer>,
    current: crate::program::ExecutionPointer,
) -> Result<Flow, BasicError> {
    use crate::program::ExecutionPointer as EP;

    match instr {
        Instr::Let(lv, rhs) => {
            let values = eval(rhs, ctx)?;
            let value = one_value(values)?;
            assign_lvalue(lv, value, ctx)?;
            Ok(Flow::Next)
        }
        Instr::Goto(n) => {
            if !ctx.program.contains(*n) {
                return Err(BasicError::GotoLineNotFound);
            }
            Ok(Flow::JumpLine(*n))
        }
        Instr::Gosub(n) => {
            if !ctx.program.contains(*n) {
                return Err(BasicError::GosubLineNotFound);
            }
            gosub_stack.push(EP::at(current.line, current.stmt_index + 1));
            Ok(Flow::JumpLine(*n))
        }
        Instr::Bye => Ok(Flow::Shutdown),
        Instr::Cls => {
            ctx.console.clear_screen();
            *ctx.print_pos = 0;
            Ok(Flow::Next)
        }
        Instr::Data(_) => Ok(Flow::Next),
        Instr::Def { func, params, body } => {
            let f = &mut ctx.vars.user_functions[*func as usize];
            f.parms = params
                .iter()
                .map(|name| crate::vars::Variable { name: name.clone(), value: if name.ends_with('$') { Value::String(String::new()) } else { Value::Number(0.0) } })
                .collect();
            f.body.clear();
            for t in body {
                t.encode(&mut f.body);
            }
            Ok(Flow::Next)
        }
        Instr::Dim(targets) => {
            for t in targets {
                if let DimTarget::Array(idx, dims_expr) = t {
                    let values = eval(dims_expr, ctx)?;
                    let dims = indices(&values)?;
                    ctx.vars.array_create(*idx, &dims);
                }
            }
            Ok(Flow::Next)
        }
        Instr::If { cond, else_index } => {
            let values = eval(cond, ctx)?;
            let value = one_value(values).map_err(|_| BasicError::BadIfExpression)?;
            if value.truthy() {
                Ok(Flow::Next)
            } else {
                match else_index {
                    Some(idx) => Ok(Flow::JumpStmt(*idx)),
                    None => Ok(Flow::JumpStmt(line.len())),
                }
            }
        }
        Instr::Else => match line.get(current.stmt_index + 1) {
            Some(Instr::If { else_index, .. }) => match else_index {
                None => Ok(Flow::JumpStmt(line.len())),
                Some(inner_else_start) => Ok(Flow::JumpStmt(inner_else_start - 1)),
            },
            Some(_) => Ok(Flow::JumpStmt(current.stmt_index + 2)),
            None => Ok(Flow::Next),
        },
        Instr::End | Instr::Stop => Ok(Flow::EndProgram),
        Instr::For { var, from, to, step } => {
            let init = one_value(eval(from, ctx)?)?;
            let Value::Number(init) = init else {
                return Err(BasicError::MalformedForLoop);
            };
            let limit = one_value(eval(to, ctx)?)?;
            let Value::Number(limit) = limit else {
                return Err(BasicError::MalformedForLoop);
            };
            let step_val = match step {
                Some(expr) => match one_value(eval(expr, ctx)?)? {
                    Value::Number(n) => n,
                    _ => return Err(BasicError::MalformedForLoop),
                },
                None => 1.0,
            };
            if !ctx.vars.vars[*var as usize].value.is_number() {
                return Err(BasicError::MalformedForLoop);
            }
            ctx.vars.vars[*var as usize].value = Value::Number(init);
            let loop_head = EP::at(current.line, current.stmt_index + 1);
            for_stack.push(crate::program::ForFrame { var: *var, limit, step: step_val, loop_head });
            if crate::machine::ANSI_FOR && (init - limit) * step_val > 0.0 {
                Ok(Flow::NextSkipFor)
            } else {
                Ok(Flow::Next)
            }
        }
        Instr::Input { prompt, targets } => {
            loop {
                match prompt {
                    Some((text, ',')) => ctx.console.print(text),
                    Some((text, _)) => {
                        ctx.console.print(text);
                        ctx.console.print("? ");
                    }
                    None => ctx.console.print("? "),
                }
                let reply = ctx.console.read_line();
                let parts = split_input_line(&reply);
                if parts.len() < targets.len() {
                    ctx.console.print("?Redo from start\r\n");
                    continue;
                }
                let mut values = Vec::with_capacity(targets.len());
                let mut redo = false;
                for (lv, part) in targets.iter().zip(parts.iter()) {
                    if lvalue_is_string(lv, ctx.vars) {
                        values.push(Value::String(part.clone()));
                    } else {
                        match part.trim().parse::<f32>() {
                            Ok(n) => values.push(Value::Number(n)),
                            Err(_) => {
                                redo = true;
                                break;
                            }
                        }
                    }
                }
                if redo {
                    ctx.console.print("?Redo from start\r\n");
                    continue;
                }
                for (lv, v) in targets.iter().zip(values.into_iter()) {
                    assign_lvalue(lv, v, ctx)?;
                }
                break;
            }
            Ok(Flow::Next)
        }
        Instr::List { from, to } => Ok(Flow::ListRange(*from, *to)),
        Instr::Load(name) => Ok(Flow::Load(name.clone())),
        Instr::Save(name) => Ok(Flow::Save(name.clone())),
        Instr::New => Ok(Flow::NewProgram),
        Instr::Next(names) => {
            if names.is_empty() {
                next_one(ctx, for_stack, None, current)
            } else {
                let mut result = Flow::Next;
                for name in names {
                    result = next_one(ctx, for_stack, Some(*name), current)?;
                }
                Ok(result)
            }
        }
        Instr::On { expr, gosub, targets } => {
            let value = one_value(eval(expr, ctx)?)?;
            let Value::Number(n) = value else {
                return Err(BasicError::BadExpression(Some("Bad expression in ON".to_string())));
            };
            let n = n as i32;
            if n < 1 || (n as usize) > targets.len() {
                return Ok(Flow::Next);
            }
            let target_line = targets[(n - 1) as usize];
            if !ctx.program.contains(target_line) {
                return Err(BasicError::OnLineNotFound);
            }
            if *gosub {
                gosub_stack.push(EP::at(current.line, current.stmt_index + 1));
            }
            Ok(Flow::JumpLine(target_line))
        }
        Instr::Print(tokens) => {
            let values = eval(tokens, ctx)?;
            let mut suppress_newline = false;
            for v in &values {
                match v {
                    Value::Separator(',') => {
                        suppress_newline = true;
                        let pad = 8 - (*ctx.print_pos % 8);
                        let pad = if pad == 0 { 8 } else { pad };
                        let spaces = " ".repeat(pad);
                        ctx.console.print(&spaces);
                        *ctx.print_pos += pad;
                    }
                    Value::Separator(_) => {
                        suppress_newline = true;
                    }
                    Value::Tab(n) => {
                        *ctx.print_pos %= 80;
                        let target = n.rem_euclid(80) as usize;
                        if target > *ctx.print_pos {
                            let pad = target - *ctx.print_pos;
                            ctx.console.print(&" ".repeat(pad));
                            *ctx.print_pos += pad;
                        }
                        suppress_newline = false;
                    }
                    Value::Number(n) => {
                        let mut text = crate::value::format_number(*n);
                        if *n >= 0.0 {
                            text = format!(" {}", text);
                        }
                        text.push(' ');
                        ctx.console.print(&text);
                        *ctx.print_pos += text.chars().count();
                        suppress_newline = false;
                    }
                    Value::String(s) => {
                        ctx.console.print(s);
                        *ctx.print_pos += s.chars().count();
                        suppress_newline = false;
                    }
                    Value::Error(_) => unreachable!("eval() raises embedded errors before returning"),
                }
            }
            if !suppress_newline {
                ctx.console.print("\r\n");
                *ctx.print_pos = 0;
            }
            Ok(Flow::Next)
        }
        Instr::Randomize(_) => Ok(Flow::Next),
        Instr::Read(targets) => {
            for lv in targets {
                let value = read_next_data_value(ctx.program, ctx.read_pointer)?;
                assign_lvalue(lv, value, ctx)?;
            }
            Ok(Flow::Next)
        }
        Instr::Rem(_) => Ok(Flow::Next),
        Instr::Restore(target) => {
            match target {
                Some(n) => {
                    if !ctx.program.contains(*n) {
                        return Err(BasicError::NoDataForRestore);
                    }
                    ctx.read_pointer.pointer = EP::at(*n, 0);
                }
                None => {
                    ctx.read_pointer.pointer = EP::new(crate::program::COMMAND_LINE);
                }
            }
            ctx.read_pointer.item_offset = 0;
            Ok(Flow::Next)
        }
        Instr::Return => {
            let ep = gosub_stack.pop().ok_or(BasicError::StackUnderflow)?;
            Ok(Flow::JumpTo(ep.line, ep.stmt_index))
        }
        Instr::Run => Ok(Flow::RunProgram),
        Instr::DumpVars => Ok(Flow::DumpVars),
    }
}

/// Scans forward from the read cursor for the next `DATA` item, crossing
/// line and statement boundaries as needed.
fn read_next_data_value(program: &crate::program::Program, rp: &mut crate::program::ReadPointer) -> Result<Value, BasicError> {
    loop {
        let (line, stmt_index) = (rp.pointer.line, rp.pointer.stmt_index);
        if let Some(Instr::Data(items)) = program.get(line).and_then(|s| s.get(stmt_index)) {
            if rp.item_offset < items.len() {
                let v = items[rp.item_offset].clone();
                rp.item_offset += 1;
                return Ok(v);
            }
        }
        match find_data_at_or_after(program, line, stmt_index + 1) {
            Some((l, s)) => {
                rp.pointer = crate::program::ExecutionPointer::at(l, s);
                rp.item_offset = 0;
            }
            None => return Err(BasicError::NoDataAvailable),
        }
    }
}

fn find_data_at_or_after(program: &crate::program::Program, from_line: i32, from_stmt: usize) -> Option<(i32, usize)> {
    for (line, stmts) in program.iter() {
        if line < from_line {
            continue;
        }
        let start = if line == from_line { from_stmt } else { 0 };
        for (i, instr) in stmts.iter().enumerate().skip(start) {
            if matches!(instr, Instr::Data(_)) {
                return Some((line, i));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::TestConsole;
    use crate::program::{ExecutionPointer, ForStack, GosubStack, Program, ReadPointer, COMMAND_LINE};

    struct NoSystemVars;
    impl SystemVarSource for NoSystemVars {
        fn system_var(&mut self, _idx: u8) -> Value {
            Value::String(String::new())
        }
    }

    fn parse_line(text: &str, vars: &mut VarStore, if_stack: &mut Vec<usize>) -> Vec<Instr> {
        let mut acc = Vec::new();
        let mut fail_offset = 0;
        parse_statements(text, vars, if_stack, &mut acc, &mut fail_offset).unwrap();
        acc
    }

    /// Runs a single program line to completion (no cross-line jumps),
    /// returning the console's accumulated output.
    fn run_line(text: &str, vars: &mut VarStore) -> String {
        let mut if_stack = Vec::new();
        let stmts = parse_line(text, vars, &mut if_stack);
        let mut console = TestConsole::new();
        let mut system = NoSystemVars;
        let program = Program::new();
        let mut read_pointer = ReadPointer::new();
        let mut print_pos = 0;
        let mut for_stack: ForStack = Vec::new();
        let mut gosub_stack: GosubStack = Vec::new();
        let mut current = ExecutionPointer::at(1, 0);
        loop {
            if current.stmt_index >= stmts.len() {
                break;
            }
            let mut ctx = ExecCtx { vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
            let flow = execute(&stmts[current.stmt_index], &mut ctx, &stmts, &mut for_stack, &mut gosub_stack, current).unwrap();
            match flow {
                Flow::Next | Flow::NextSkipFor | Flow::ClearSkipForNext => current.stmt_index += 1,
                Flow::JumpStmt(i) => current.stmt_index = i,
                _ => break,
            }
        }
        console.output
    }

    #[test]
    fn let_then_print_round_trips_value() {
        let mut vars = VarStore::new();
        let out = run_line("LET X=5:PRINT X", &mut vars);
        assert!(out.contains(" 5 "));
    }

    #[test]
    fn if_true_falls_through_to_then_branch() {
        let mut vars = VarStore::new();
        let out = run_line("IF 1=1 THEN PRINT \"YES\" ELSE PRINT \"NO\"", &mut vars);
        assert!(out.contains("YES"));
        assert!(!out.contains("NO"));
    }

    #[test]
    fn if_false_jumps_to_else_branch() {
        let mut vars = VarStore::new();
        let out = run_line("IF 1=2 THEN PRINT \"YES\" ELSE PRINT \"NO\"", &mut vars);
        assert!(!out.contains("YES"));
        assert!(out.contains("NO"));
    }

    #[test]
    fn next_without_for_is_an_error() {
        let mut vars = VarStore::new();
        let mut if_stack = Vec::new();
        let stmts = parse_line("NEXT I", &mut vars, &mut if_stack);
        let mut console = TestConsole::new();
        let mut system = NoSystemVars;
        let program = Program::new();
        let mut read_pointer = ReadPointer::new();
        let mut print_pos = 0;
        let mut for_stack: ForStack = Vec::new();
        let mut gosub_stack: GosubStack = Vec::new();
        let current = ExecutionPointer::at(1, 0);
        let mut ctx = ExecCtx { vars: &mut vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
        let err = execute(&stmts[0], &mut ctx, &stmts, &mut for_stack, &mut gosub_stack, current).unwrap_err();
        assert_eq!(err, BasicError::NextWithoutFor);
    }

    #[test]
    fn read_pulls_values_from_data_statement_in_program() {
        let mut vars = VarStore::new();
        let mut if_stack = Vec::new();
        let mut program = Program::new();
        program.set_line(10, parse_line("DATA 1,2,3", &mut vars, &mut if_stack));
        let stmts = parse_line("READ A,B,C", &mut vars, &mut if_stack);

        let mut console = TestConsole::new();
        let mut system = NoSystemVars;
        let mut read_pointer = ReadPointer::new();
        read_pointer.pointer = ExecutionPointer::at(10, 0);
        let mut print_pos = 0;
        let mut for_stack: ForStack = Vec::new();
        let mut gosub_stack: GosubStack = Vec::new();
        let current = ExecutionPointer::at(20, 0);
        let mut ctx = ExecCtx { vars: &mut vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
        execute(&stmts[0], &mut ctx, &stmts, &mut for_stack, &mut gosub_stack, current).unwrap();

        let Some(crate::vars::Symbol::Variable(a_idx)) = vars.lookup("A") else {
            panic!("A was not registered as a plain variable");
        };
        assert_eq!(vars.vars[a_idx as usize].value, Value::Number(1.0));
    }

    #[test]
    fn gosub_pushes_return_address_and_return_pops_it() {
        let mut vars = VarStore::new();
        let mut program = Program::new();
        program.set_line(20, vec![Instr::Return]);
        let mut if_stack = Vec::new();
        let gosub_stmts = parse_line("GOSUB 20", &mut vars, &mut if_stack);

        let mut console = TestConsole::new();
        let mut system = NoSystemVars;
        let mut read_pointer = ReadPointer::new();
        let mut print_pos = 0;
        let mut for_stack: ForStack = Vec::new();
        let mut gosub_stack: GosubStack = Vec::new();
        let current = ExecutionPointer::at(10, 0);
        let mut ctx = ExecCtx { vars: &mut vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
        let flow = execute(&gosub_stmts[0], &mut ctx, &gosub_stmts, &mut for_stack, &mut gosub_stack, current).unwrap();
        assert_eq!(flow, Flow::JumpLine(20));
        assert_eq!(gosub_stack, vec![ExecutionPointer::at(10, 1)]);

        let return_stmts = vec![Instr::Return];
        let current = ExecutionPointer::at(20, 0);
        let mut ctx = ExecCtx { vars: &mut vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
        let flow = execute(&return_stmts[0], &mut ctx, &return_stmts, &mut for_stack, &mut gosub_stack, current).unwrap();
        assert_eq!(flow, Flow::JumpTo(10, 1));
        assert!(gosub_stack.is_empty());
    }

    #[test]
    fn goto_unknown_line_is_an_error() {
        let mut vars = VarStore::new();
        let mut if_stack = Vec::new();
        let stmts = parse_line("GOTO 999", &mut vars, &mut if_stack);
        let mut console = TestConsole::new();
        let mut system = NoSystemVars;
        let program = Program::new();
        let mut read_pointer = ReadPointer::new();
        let mut print_pos = 0;
        let mut for_stack: ForStack = Vec::new();
        let mut gosub_stack: GosubStack = Vec::new();
        let current = ExecutionPointer::at(COMMAND_LINE, 0);
        let mut ctx = ExecCtx { vars: &mut vars, system: &mut system, console: &mut console, print_pos: &mut print_pos, program: &program, read_pointer: &mut read_pointer };
        let err = execute(&stmts[0], &mut ctx, &stmts, &mut for_stack, &mut gosub_stack, current).unwrap_err();
        assert_eq!(err, BasicError::GotoLineNotFound);
    }

    #[test]
    fn parse_statements_reports_fail_offset_at_failing_statement() {
        let mut vars = VarStore::new();
        let mut if_stack = Vec::new();
        let mut acc = Vec::new();
        let mut fail_offset = 0;
        let err = parse_statements("PRINT 1: GOTO", &mut vars, &mut if_stack, &mut acc, &mut fail_offset).unwrap_err();
        assert!(matches!(err, BasicError::SyntaxErrorIn(_)));
        assert_eq!(fail_offset, "PRINT 1: ".len());
    }
}

fn next_one(ctx: &mut ExecCtx, for_stack: &mut Vec<crate::program::ForFrame>, name: Option<u16>, current: crate::program::ExecutionPointer) -> Result<Flow, BasicError> {
    loop {
        let frame = *for_stack.last().ok_or(BasicError::NextWithoutFor)?;
        if let Some(n) = name {
            if frame.var != n {
                for_stack.pop();
                continue;
            }
        }
        break;
    }
    let frame = *for_stack.last().unwrap();

    if current.skip_for_next {
        for_stack.pop();
        return Ok(Flow::ClearSkipForNext);
    }

    let var_val = match ctx.vars.vars[frame.var as usize].value {
        Value::Number(n) => n,
        _ => return Err(BasicError::MalformedForLoop),
    };

    // "Loop without a body": FOR and NEXT are adjacent, nothing to actually
    // execute on each pass, so fast-forward by sleeping the delay instead.
    if frame.loop_head.line == current.line && frame.loop_head.stmt_index == current.stmt_index {
        let loops: i64 = if frame.step == 0.0 {
            1
        } else {
            (((frame.limit - var_val + frame.step) / frame.step).floor()) as i64
        };
        if loops > 0 {
            std::thread::sleep(std::time::Duration::from_millis(loops as u64));
        }
        let final_val = var_val + frame.step * loops.max(0) as f32;
        ctx.vars.vars[frame.var as usize].value = Value::Number(final_val);
        for_stack.pop();
        return Ok(Flow::Next);
    }

    let next_val = var_val + frame.step;
    let done = if frame.step >= 0.0 { next_val > frame.limit } else { next_val < frame.limit };
    ctx.vars.vars[frame.var as usize].value = Value::Number(next_val);
    if done {
        for_stack.pop();
        Ok(Flow::Next)
    } else {
        Ok(Flow::JumpTo(frame.loop_head.line, frame.loop_head.stmt_index))
    }
}
