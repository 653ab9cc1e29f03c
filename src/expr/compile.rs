//! Parses a token stream from source text, validating the adjacency rules
//! that make shunting-yard evaluation well-defined (leading/trailing
//! operator shape, unary/binary disambiguation, the `String`/`Expression`
//! exceptions).

use crate::error::BasicError;
use crate::functions;
use crate::lexer;
use crate::operators::{self, Arity};
use crate::token::Token;
use crate::vars::VarStore;

#[derive(Debug, Clone, Copy, PartialEq)]
enum OperandTag {
    Number,
    Str,
    Expr,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Last {
    Operand(OperandTag),
    Operator(u8),
}

/// Parses one expression starting at `input`, stopping at end of input, a
/// `)`, or any instruction keyword in `terminators`. `params`, when
/// present, is the parameter-name list of the `DEF` body currently being
/// compiled (so bare parameter names resolve to `ParameterRef` instead of
/// ordinary variables).
pub fn compile_expression<'a>(
    input: &'a str,
    vars: &mut VarStore,
    terminators: &[&str],
    params: Option<&[String]>,
) -> Result<(Vec<Token>, &'a str), BasicError> {
    let mut tokens = Vec::new();
    let mut rest = input;
    let mut last: Option<Last> = None;

    loop {
        let trimmed = lexer::skip_spaces(rest);
        if trimmed.is_empty() || trimmed.starts_with(')') || matches_any(trimmed, terminators) {
            rest = trimmed;
            break;
        }

        if let Some((operand_tokens, tag, next)) = try_parse_operand(trimmed, vars, terminators, params)? {
            validate_operand(&mut last, tag)?;
            tokens.extend(operand_tokens);
            rest = next;
            continue;
        }

        if let Some((idx, next)) = operators::try_match_operator(trimmed) {
            validate_operator(&mut last, idx)?;
            tokens.push(Token::Op(idx));
            rest = next;
            continue;
        }

        return Err(BasicError::SyntaxError);
    }

    if let Some(Last::Operator(idx)) = last {
        if !operators::is_separator(idx) {
            return Err(BasicError::SyntaxError);
        }
    }

    Ok((tokens, rest))
}

fn matches_any(s: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| lexer::match_keyword(s, kw).is_some())
}

fn validate_operand(last: &mut Option<Last>, tag: OperandTag) -> Result<(), BasicError> {
    if let Some(Last::Operand(prev)) = *last {
        if prev != OperandTag::Str && tag != OperandTag::Str {
            return Err(BasicError::SyntaxError);
        }
    }
    *last = Some(Last::Operand(tag));
    Ok(())
}

fn validate_operator(last: &mut Option<Last>, idx: u8) -> Result<(), BasicError> {
    if operators::is_separator(idx) {
        *last = Some(Last::Operator(idx));
        return Ok(());
    }

    let info = operators::info(idx);
    let unary_capable = info.arity == Arity::Unary || operators::unary_variant(idx).is_some();

    match *last {
        None => {
            if !unary_capable {
                return Err(BasicError::SyntaxError);
            }
        }
        Some(Last::Operand(_)) => {
            if info.arity == Arity::Unary && operators::unary_variant(idx).is_none() {
                return Err(BasicError::SyntaxError);
            }
        }
        Some(Last::Operator(prev)) => {
            if !unary_capable {
                return Err(BasicError::SyntaxError);
            }
            let _ = prev;
        }
    }

    *last = Some(Last::Operator(idx));
    Ok(())
}

type OperandParse<'a> = Option<(Vec<Token>, OperandTag, &'a str)>;

fn try_parse_operand<'a>(s: &'a str, vars: &mut VarStore, terminators: &[&str], params: Option<&[String]>) -> Result<OperandParse<'a>, BasicError> {
    if let Some((n, rest)) = lexer::try_parse_number(s) {
        return Ok(Some((vec![Token::Number(n)], OperandTag::Number, rest)));
    }
    if let Some((text, rest)) = lexer::try_parse_string(s) {
        return Ok(Some((vec![Token::Str(text)], OperandTag::Str, rest)));
    }
    if let Some(rest) = s.strip_prefix('(') {
        let (inner, after) = compile_expression(rest, vars, terminators, params)?;
        let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxError)?;
        return Ok(Some((vec![Token::Expression(inner)], OperandTag::Expr, after)));
    }
    if let Some((idx, rest)) = functions::try_match(s) {
        if let Some(after_paren) = lexer::drop_symbol(rest, '(') {
            let (args, after) = compile_expression(after_paren, vars, terminators, params)?;
            let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxError)?;
            return Ok(Some((vec![Token::Function(idx), Token::Expression(args)], OperandTag::Other, after)));
        }
    }
    if let Some((name, rest)) = lexer::try_parse_identifier(s) {
        if name.starts_with("FN") && name.len() > 2 {
            if let Some(after_paren) = lexer::drop_symbol(rest, '(') {
                let idx = vars.register_user_function(&name)?;
                let (args, after) = compile_expression(after_paren, vars, terminators, params)?;
                let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxError)?;
                return Ok(Some((vec![Token::UserFunction(idx), Token::Expression(args)], OperandTag::Other, after)));
            }
        }
        if let Some(after_paren) = lexer::drop_symbol(rest, '(') {
            let idx = vars.register_array(&name)?;
            let (args, after) = compile_expression(after_paren, vars, terminators, params)?;
            let after = lexer::drop_symbol(after, ')').ok_or(BasicError::SyntaxError)?;
            return Ok(Some((vec![Token::Array(idx), Token::Expression(args)], OperandTag::Other, after)));
        }
        if let Some(sys_idx) = VarStore::lookup_system_var(&name) {
            return Ok(Some((vec![Token::SystemVar(sys_idx)], OperandTag::Other, rest)));
        }
        if let Some(params) = params {
            if let Some(p_idx) = params.iter().position(|p| p == &name) {
                return Ok(Some((vec![Token::ParameterRef(p_idx as u8)], OperandTag::Other, rest)));
            }
        }
        let idx = vars.register_variable(&name)?;
        return Ok(Some((vec![Token::Variable(idx)], OperandTag::Other, rest)));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(s: &str) -> Vec<Token> {
        let mut vars = VarStore::new();
        compile_expression(s, &mut vars, &[], None).unwrap().0
    }

    #[test]
    fn compiles_simple_arithmetic() {
        let tokens = compile("1+2*3");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::Op(operators::OP_ADD_BIN), Token::Number(2.0), Token::Op(operators::OP_MUL), Token::Number(3.0)]);
    }

    #[test]
    fn leading_minus_is_accepted() {
        let tokens = compile("-5");
        assert_eq!(tokens, vec![Token::Op(operators::OP_SUB_BIN), Token::Number(5.0)]);
    }

    #[test]
    fn two_binary_operators_in_a_row_is_a_syntax_error() {
        let mut vars = VarStore::new();
        assert!(compile_expression("1**2", &mut vars, &[], None).is_err());
    }

    #[test]
    fn comma_separated_values_compile_to_separator_tokens() {
        let tokens = compile("1,2");
        assert_eq!(tokens, vec![Token::Number(1.0), Token::Op(operators::OP_COMMA), Token::Number(2.0)]);
    }

    #[test]
    fn stops_at_instruction_keyword() {
        let mut vars = VarStore::new();
        let (tokens, rest) = compile_expression("1+2 THEN", &mut vars, &["THEN"], None).unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(lexer::skip_spaces(rest), "THEN");
    }

    #[test]
    fn array_reference_compiles_head_and_index_expression() {
        let tokens = compile("A(1)");
        assert_eq!(tokens, vec![Token::Array(0), Token::Expression(vec![Token::Number(1.0)])]);
    }
}
