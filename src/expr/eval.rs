//! Shunting-yard evaluator over a compiled token stream. Operator tokens
//! carry their *binary* index regardless of position (see `compile.rs`);
//! this is where the binary-to-unary conversion for a leading/chained `+`
//! or `-` actually happens, mirroring the same adjacency logic the
//! compiler used to validate the stream in the first place.

use crate::error::BasicError;
use crate::functions;
use crate::operators::{self, Arity};
use crate::token::{Token, TokenReader};
use crate::value::Value;
use crate::vars::VarStore;

use super::ExpressionValue;

/// Supplies the live value of a read-only system variable (`INKEY$`,
/// `TIME$`). Implemented by the machine that owns the console and clock.
pub trait SystemVarSource {
    fn system_var(&mut self, idx: u8) -> Value;
}

/// Bundles the three things a top-level expression evaluation needs, for
/// callers that would otherwise have to thread them through separately.
pub struct EvalContext<'a> {
    pub vars: &'a mut VarStore,
    pub system: &'a mut dyn SystemVarSource,
    pub params: Option<&'a [Value]>,
}

impl<'a> EvalContext<'a> {
    pub fn evaluate(&mut self, tokens: &[Token]) -> Result<ExpressionValue, BasicError> {
        evaluate_expression(tokens, &mut *self.vars, &mut *self.system, self.params)
    }
}

/// Evaluates a compiled token stream, returning the resulting value
/// sequence (with `Value::Separator` markers between comma/semicolon
/// separated sub-expressions, exactly as `PRINT`'s argument list needs).
pub fn evaluate_expression(
    tokens: &[Token],
    vars: &mut VarStore,
    system: &mut dyn SystemVarSource,
    params: Option<&[Value]>,
) -> Result<ExpressionValue, BasicError> {
    let mut value_stack: Vec<Value> = Vec::new();
    let mut op_stack: Vec<(u8, bool)> = Vec::new();
    let mut output: ExpressionValue = Vec::new();
    let mut last_was_operand = false;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Op(idx) => {
                let idx = *idx;
                if operators::is_separator(idx) {
                    apply_all(&mut value_stack, &mut op_stack)?;
                    let val = value_stack.pop().ok_or(BasicError::MalformedExpression)?;
                    output.push(val);
                    output.push(Value::Separator(if idx == operators::OP_COMMA { ',' } else { ';' }));
                    last_was_operand = false;
                    i += 1;
                    continue;
                }

                let (use_idx, is_unary) = resolve_operator(idx, last_was_operand);
                let cur_info = operators::info(use_idx);
                while let Some(&(top_idx, top_unary)) = op_stack.last() {
                    let top_info = operators::info(top_idx);
                    let should_pop = match cur_info.assoc {
                        operators::Assoc::Left => top_info.prec >= cur_info.prec,
                        operators::Assoc::Right => top_info.prec > cur_info.prec,
                    };
                    if !should_pop {
                        break;
                    }
                    op_stack.pop();
                    apply_op(&mut value_stack, top_idx, top_unary)?;
                }
                op_stack.push((use_idx, is_unary));
                last_was_operand = false;
                i += 1;
            }
            Token::Number(n) => {
                value_stack.push(Value::Number(*n));
                last_was_operand = true;
                i += 1;
            }
            Token::Str(s) => {
                value_stack.push(Value::String(s.clone()));
                last_was_operand = true;
                i += 1;
            }
            Token::Variable(idx) => {
                let idx = *idx;
                value_stack.push(vars.vars[idx as usize].value.clone());
                last_was_operand = true;
                i += 1;
            }
            Token::SystemVar(idx) => {
                value_stack.push(system.system_var(*idx));
                last_was_operand = true;
                i += 1;
            }
            Token::ParameterRef(idx) => {
                let idx = *idx;
                let val = params
                    .and_then(|p| p.get(idx as usize))
                    .cloned()
                    .ok_or(BasicError::BadNumberOfParameters)?;
                value_stack.push(val);
                last_was_operand = true;
                i += 1;
            }
            Token::Expression(inner) => {
                let mut sub = evaluate_expression(inner, vars, system, params)?;
                let val = sub.pop().ok_or(BasicError::MalformedExpression)?;
                value_stack.push(val);
                last_was_operand = true;
                i += 1;
            }
            Token::Array(idx) => {
                let idx = *idx;
                let args_tokens = expect_args(tokens, i + 1)?;
                let args = evaluate_expression(args_tokens, vars, system, params)?;
                let indices = indices_from_args(&args)?;
                value_stack.push(vars.array_get(idx, &indices)?);
                last_was_operand = true;
                i += 2;
            }
            Token::Function(idx) => {
                let idx = *idx;
                let args_tokens = expect_args(tokens, i + 1)?;
                let args = evaluate_expression(args_tokens, vars, system, params)?;
                value_stack.push(functions::compute(idx, &args));
                last_was_operand = true;
                i += 2;
            }
            Token::UserFunction(idx) => {
                let idx = *idx;
                let args_tokens = expect_args(tokens, i + 1)?;
                let args = evaluate_expression(args_tokens, vars, system, params)?;
                value_stack.push(call_user_function(idx, &args, vars, system)?);
                last_was_operand = true;
                i += 2;
            }
            Token::None | Token::Parameter(_) => return Err(BasicError::MalformedExpression),
        }
    }

    apply_all(&mut value_stack, &mut op_stack)?;
    let last = value_stack.pop().ok_or(BasicError::MalformedExpression)?;
    output.push(last);
    Ok(output)
}

fn expect_args(tokens: &[Token], at: usize) -> Result<&[Token], BasicError> {
    match tokens.get(at) {
        Some(Token::Expression(args)) => Ok(args),
        _ => Err(BasicError::MalformedExpression),
    }
}

/// Decides whether an `Op` token at this position acts as a binary or
/// unary operator: `NOT` is always unary, `+`/`-` become unary only when
/// nothing operand-shaped precedes them, every other binary operator stays
/// binary.
fn resolve_operator(idx: u8, last_was_operand: bool) -> (u8, bool) {
    let info = operators::info(idx);
    if info.arity == Arity::Unary && operators::unary_variant(idx).is_none() {
        return (idx, true);
    }
    if !last_was_operand {
        if let Some(unary_idx) = operators::unary_variant(idx) {
            return (unary_idx, true);
        }
    }
    (idx, false)
}

fn apply_all(value_stack: &mut Vec<Value>, op_stack: &mut Vec<(u8, bool)>) -> Result<(), BasicError> {
    while let Some((idx, is_unary)) = op_stack.pop() {
        apply_op(value_stack, idx, is_unary)?;
    }
    Ok(())
}

fn apply_op(value_stack: &mut Vec<Value>, idx: u8, is_unary: bool) -> Result<(), BasicError> {
    if is_unary {
        let a = value_stack.pop().ok_or(BasicError::MalformedExpression)?;
        value_stack.push(operators::apply_unary(idx, &a));
    } else {
        let b = value_stack.pop().ok_or(BasicError::MalformedExpression)?;
        let a = value_stack.pop().ok_or(BasicError::MalformedExpression)?;
        value_stack.push(operators::apply_binary(idx, &a, &b));
    }
    Ok(())
}

fn indices_from_args(args: &ExpressionValue) -> Result<Vec<i32>, BasicError> {
    args.iter()
        .filter(|v| !matches!(v, Value::Separator(_)))
        .map(|v| match v {
            Value::Number(n) => Ok(*n as i32),
            _ => Err(BasicError::BadArrayIndex),
        })
        .collect()
}

fn call_user_function(idx: u8, args: &ExpressionValue, vars: &mut VarStore, system: &mut dyn SystemVarSource) -> Result<Value, BasicError> {
    let (body, parms_len) = {
        let func = vars.user_functions.get(idx as usize).ok_or(BasicError::UndefinedUserFunction)?;
        if func.body.is_empty() {
            return Err(BasicError::UndefinedUserFunction);
        }
        (func.body.clone(), func.parms.len())
    };

    let values: Vec<Value> = args.iter().filter(|v| !matches!(v, Value::Separator(_))).cloned().collect();
    if values.len() != parms_len {
        return Err(BasicError::BadNumberOfParameters);
    }

    let mut reader = TokenReader::new(&body);
    let mut tokens = Vec::new();
    while !reader.at_end() {
        tokens.push(reader.decode()?);
    }

    let mut result = evaluate_expression(&tokens, vars, system, Some(&values))?;
    result.pop().ok_or(BasicError::BadExpressionInUserFunction)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoSystemVars;
    impl SystemVarSource for NoSystemVars {
        fn system_var(&mut self, _idx: u8) -> Value {
            Value::String(String::new())
        }
    }

    fn eval(tokens: Vec<Token>) -> ExpressionValue {
        let mut vars = VarStore::new();
        let mut sys = NoSystemVars;
        evaluate_expression(&tokens, &mut vars, &mut sys, None).unwrap()
    }

    #[test]
    fn evaluates_precedence_correctly() {
        let tokens = vec![Token::Number(1.0), Token::Op(operators::OP_ADD_BIN), Token::Number(2.0), Token::Op(operators::OP_MUL), Token::Number(3.0)];
        assert_eq!(eval(tokens), vec![Value::Number(7.0)]);
    }

    #[test]
    fn leading_minus_negates() {
        let tokens = vec![Token::Op(operators::OP_SUB_BIN), Token::Number(5.0)];
        assert_eq!(eval(tokens), vec![Value::Number(-5.0)]);
    }

    #[test]
    fn comma_splits_into_separator_delimited_output() {
        let tokens = vec![
            Token::Number(1.0),
            Token::Op(operators::OP_ADD_BIN),
            Token::Number(2.0),
            Token::Op(operators::OP_COMMA),
            Token::Number(3.0),
        ];
        assert_eq!(eval(tokens), vec![Value::Number(3.0), Value::Separator(','), Value::Number(3.0)]);
    }

    #[test]
    fn division_by_zero_surfaces_as_error_value() {
        let tokens = vec![Token::Number(1.0), Token::Op(operators::OP_DIV), Token::Number(0.0)];
        assert!(matches!(eval(tokens).as_slice(), [Value::Error(_)]));
    }

    #[test]
    fn array_reference_evaluates_index_expression() {
        let mut vars = VarStore::new();
        let idx = vars.register_array("A").unwrap();
        vars.array_set(idx, &[2], Value::Number(9.0)).unwrap();
        let mut sys = NoSystemVars;
        let tokens = vec![Token::Array(idx), Token::Expression(vec![Token::Number(2.0)])];
        let result = evaluate_expression(&tokens, &mut vars, &mut sys, None).unwrap();
        assert_eq!(result, vec![Value::Number(9.0)]);
    }

    #[test]
    fn function_call_dispatches_to_builtin() {
        let idx = functions::lookup("ABS").unwrap();
        let tokens = vec![Token::Function(idx), Token::Expression(vec![Token::Op(operators::OP_SUB_BIN), Token::Number(3.0)])];
        assert_eq!(eval(tokens), vec![Value::Number(3.0)]);
    }
}
