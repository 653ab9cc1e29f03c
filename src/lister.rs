//! Canonical text rendering: the inverse of `src/instructions.rs`'s parser.
//! Grounded on `examples/original_source/Instructions.cpp`'s `List*` family
//! and `Token.cpp`'s `DecodeToken`/`DecodeOperation`/`DecodeExpression` —
//! the same spacing rules (alphabetic operators get surrounding spaces,
//! symbolic ones don't; a parenthesized sub-expression round-trips as a
//! literal `(...)`) reproduced here over the typed `Token`/`Instr` trees
//! instead of a raw byte stream.

use crate::functions;
use crate::instructions::{DimTarget, Instr, LValue};
use crate::operators;
use crate::token::Token;
use crate::value::{format_number, Value};
use crate::vars::VarStore;

/// Renders one program line's statements back to source text, joined by
/// `:` except where an `IF`/`ELSE` pair needs a bare space instead (the
/// original never prints a colon between a conditional and its branch).
pub fn list_line(stmts: &[Instr], vars: &VarStore) -> String {
    let mut out = String::new();
    for (i, stmt) in stmts.iter().enumerate() {
        if i > 0 {
            out.push_str(if suppress_colon_before(stmts, i) { " " } else { ":" });
        }
        out.push_str(&list_instr(stmt, vars));
    }
    out
}

/// Whether statement `i` is the branch body of the `IF`/`ELSE` immediately
/// preceding it — those join with a space, never a colon.
fn suppress_colon_before(stmts: &[Instr], i: usize) -> bool {
    matches!(stmts[i - 1], Instr::If { .. } | Instr::Else)
}

fn list_instr(instr: &Instr, vars: &VarStore) -> String {
    match instr {
        Instr::Let(lv, rhs) => format!("{}={}", list_lvalue(lv, vars), list_expr(rhs, vars, None)),
        Instr::Goto(n) => format!("GOTO {}", n),
        Instr::Gosub(n) => format!("GOSUB {}", n),
        Instr::Bye => "BYE".to_string(),
        Instr::Cls => "CLS".to_string(),
        Instr::Data(items) => {
            let parts: Vec<String> = items.iter().map(list_data_item).collect();
            format!("DATA {}", parts.join(","))
        }
        Instr::Def { func, params, body } => {
            let name = &vars.user_functions[*func as usize].name;
            format!("DEF {}({})={}", name, params.join(","), list_expr(body, vars, Some(params)))
        }
        Instr::Dim(targets) => {
            let parts: Vec<String> = targets
                .iter()
                .map(|t| match t {
                    DimTarget::Bare(idx) => vars.vars[*idx as usize].name.clone(),
                    DimTarget::Array(idx, dims) => format!("{}({})", vars.arrays[*idx as usize].name, list_expr(dims, vars, None)),
                })
                .collect();
            format!("DIM {}", parts.join(","))
        }
        Instr::If { cond, .. } => format!("IF {} THEN", list_expr(cond, vars, None)),
        Instr::Else => "ELSE".to_string(),
        Instr::End => "END".to_string(),
        Instr::For { var, from, to, step } => {
            let mut s = format!("FOR {}={} TO {}", vars.vars[*var as usize].name, list_expr(from, vars, None), list_expr(to, vars, None));
            if let Some(step) = step {
                s.push_str(&format!(" STEP {}", list_expr(step, vars, None)));
            }
            s
        }
        Instr::Input { prompt, targets } => {
            let mut s = "INPUT ".to_string();
            if let Some((text, sep)) = prompt {
                s.push_str(&format!("\"{}\"{}", text, sep));
            }
            s.push_str(&targets.iter().map(|lv| list_lvalue(lv, vars)).collect::<Vec<_>>().join(","));
            s
        }
        Instr::List { from, to } => match (from, to) {
            (None, _) => "LIST".to_string(),
            (Some(a), Some(b)) if a == b => format!("LIST {}", a),
            (Some(a), Some(b)) => format!("LIST {}-{}", a, b),
            (Some(a), None) => format!("LIST {}", a),
        },
        Instr::Load(name) => format!("LOAD \"{}\"", name),
        Instr::New => "NEW".to_string(),
        Instr::Next(vars_idx) => {
            let names: Vec<String> = vars_idx.iter().map(|idx| vars.vars[*idx as usize].name.clone()).collect();
            if names.is_empty() {
                "NEXT".to_string()
            } else {
                format!("NEXT {}", names.join(","))
            }
        }
        Instr::On { expr, gosub, targets } => {
            let kw = if *gosub { "GOSUB" } else { "GOTO" };
            let targets: Vec<String> = targets.iter().map(|n| n.to_string()).collect();
            format!("ON {} {} {}", list_expr(expr, vars, None), kw, targets.join(","))
        }
        Instr::Print(tokens) => format!("PRINT {}", list_expr(tokens, vars, None)),
        Instr::Randomize(expr) => match expr {
            Some(tokens) => format!("RANDOMIZE {}", list_expr(tokens, vars, None)),
            None => "RANDOMIZE".to_string(),
        },
        Instr::Read(targets) => format!("READ {}", targets.iter().map(|lv| list_lvalue(lv, vars)).collect::<Vec<_>>().join(",")),
        Instr::Rem(text) => format!("REM{}", text),
        Instr::Restore(n) => match n {
            Some(n) => format!("RESTORE {}", n),
            None => "RESTORE".to_string(),
        },
        Instr::Return => "RETURN".to_string(),
        Instr::Run => "RUN".to_string(),
        Instr::Save(name) => format!("SAVE \"{}\"", name),
        Instr::Stop => "STOP".to_string(),
        Instr::DumpVars => "DUMPVARS".to_string(),
    }
}

fn list_data_item(v: &Value) -> String {
    match v {
        Value::String(s) => format!("\"{}\"", s),
        Value::Number(n) => format_number(*n),
        _ => String::new(),
    }
}

fn list_lvalue(lv: &LValue, vars: &VarStore) -> String {
    match lv {
        LValue::Variable(idx) => vars.vars[*idx as usize].name.clone(),
        LValue::Array(idx, index_expr) => format!("{}({})", vars.arrays[*idx as usize].name, list_expr(index_expr, vars, None)),
    }
}

/// Renders a compiled token stream back to source text. `params`, when
/// present, names the enclosing `DEF`'s parameter list so a
/// `Token::ParameterRef` resolves to its source name instead of an index.
pub fn list_expr(tokens: &[Token], vars: &VarStore, params: Option<&[String]>) -> String {
    let mut out = String::new();
    let mut i = 0;
    while i < tokens.len() {
        let (text, advance) = list_token(&tokens[i..], vars, params);
        out.push_str(&text);
        i += advance.max(1);
    }
    out
}

/// Renders the token at the front of `tokens`, returning how many tokens
/// it consumed (2 for a callable head plus its `Expression` argument list).
fn list_token(tokens: &[Token], vars: &VarStore, params: Option<&[String]>) -> (String, usize) {
    match &tokens[0] {
        Token::None => (String::new(), 1),
        Token::Number(n) => (format_number(*n), 1),
        Token::Str(s) => (format!("\"{}\"", s), 1),
        Token::Op(idx) => {
            let info = operators::info(*idx);
            let alphabetic = info.name.chars().next().is_some_and(|c| c.is_alphabetic());
            let text = if alphabetic { format!(" {} ", info.name) } else { info.name.to_string() };
            (text, 1)
        }
        Token::Variable(idx) => (vars.vars[*idx as usize].name.clone(), 1),
        Token::Array(idx) => {
            let name = vars.arrays[*idx as usize].name.clone();
            let (args, consumed) = list_args(tokens, vars, params);
            (format!("{}({})", name, args), consumed)
        }
        Token::SystemVar(idx) => (crate::vars::SYSTEM_VARS[*idx as usize].to_string(), 1),
        Token::Function(idx) => {
            let name = functions::NAMES[*idx as usize];
            let (args, consumed) = list_args(tokens, vars, params);
            (format!("{}({})", name, args), consumed)
        }
        Token::UserFunction(idx) => {
            let name = vars.user_functions[*idx as usize].name.clone();
            let (args, consumed) = list_args(tokens, vars, params);
            (format!("{}({})", name, args), consumed)
        }
        Token::Expression(inner) => (format!("({})", list_expr(inner, vars, params)), 1),
        Token::Parameter(name) => (name.clone(), 1),
        Token::ParameterRef(idx) => {
            let name = params.and_then(|p| p.get(*idx as usize)).cloned().unwrap_or_default();
            (name, 1)
        }
    }
}

/// Expects `tokens[1]` to be the `Expression` wrapping a callable's
/// argument list; renders just its inner text and reports 2 tokens used.
fn list_args(tokens: &[Token], vars: &VarStore, params: Option<&[String]>) -> (String, usize) {
    match tokens.get(1) {
        Some(Token::Expression(args)) => (list_expr(args, vars, params), 2),
        _ => (String::new(), 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::compile_expression;

    fn expr(s: &str, vars: &mut VarStore) -> Vec<Token> {
        compile_expression(s, vars, &[], None).unwrap().0
    }

    #[test]
    fn renders_arithmetic_without_spaces() {
        let mut vars = VarStore::new();
        let tokens = expr("1+2*3", &mut vars);
        assert_eq!(list_expr(&tokens, &vars, None), "1+2*3");
    }

    #[test]
    fn renders_alphabetic_operators_with_spaces() {
        let mut vars = VarStore::new();
        let tokens = expr("A AND B", &mut vars);
        assert_eq!(list_expr(&tokens, &vars, None), "A AND B");
    }

    #[test]
    fn renders_parenthesized_subexpression() {
        let mut vars = VarStore::new();
        let tokens = expr("(1+2)*3", &mut vars);
        assert_eq!(list_expr(&tokens, &vars, None), "(1+2)*3");
    }

    #[test]
    fn renders_function_call() {
        let mut vars = VarStore::new();
        let tokens = expr("ABS(-3)", &mut vars);
        assert_eq!(list_expr(&tokens, &vars, None), "ABS(-3)");
    }

    #[test]
    fn renders_array_reference() {
        let mut vars = VarStore::new();
        let tokens = expr("A(1,2)", &mut vars);
        assert_eq!(list_expr(&tokens, &vars, None), "A(1,2)");
    }

    #[test]
    fn let_statement_round_trips() {
        let mut vars = VarStore::new();
        let idx = vars.register_variable("X").unwrap();
        let instr = Instr::Let(LValue::Variable(idx), expr("1+2", &mut vars));
        assert_eq!(list_instr(&instr, &vars), "X=1+2");
    }

    #[test]
    fn if_then_else_joins_without_colon() {
        let mut vars = VarStore::new();
        let cond = expr("X=1", &mut vars);
        let stmts = vec![Instr::If { cond, else_index: Some(2) }, Instr::Goto(100), Instr::Else, Instr::Goto(200)];
        assert_eq!(list_line(&stmts, &vars), "IF X=1 THEN GOTO 100 ELSE GOTO 200");
    }

    #[test]
    fn unrelated_statements_join_with_colon() {
        let mut vars = VarStore::new();
        let idx = vars.register_variable("X").unwrap();
        let stmts = vec![Instr::Let(LValue::Variable(idx), expr("1", &mut vars)), Instr::Print(expr("X", &mut vars))];
        assert_eq!(list_line(&stmts, &vars), "X=1:PRINT X");
    }
}
