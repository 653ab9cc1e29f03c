//! Operator precedence/associativity table and the operator arithmetic
//! itself. Every binary arm returns a well-formed [`Value`] on a type
//! mismatch — a uniform `Value::Error` push rather than the original
//! `ComputeDivide`-style silent non-push (see DESIGN.md's "ComputeDivide"
//! entry).

use crate::lexer;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assoc {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Unary,
    Binary,
}

pub struct OpInfo {
    pub name: &'static str,
    pub prec: u8,
    pub assoc: Assoc,
    pub arity: Arity,
}

pub const OP_COMMA: u8 = 0;
pub const OP_SEMI: u8 = 1;
pub const OP_ADD_BIN: u8 = 2;
pub const OP_ADD_UN: u8 = 3;
pub const OP_SUB_BIN: u8 = 4;
pub const OP_SUB_UN: u8 = 5;
pub const OP_MUL: u8 = 6;
pub const OP_DIV: u8 = 7;
pub const OP_POW: u8 = 8;
pub const OP_LE: u8 = 9;
pub const OP_GE: u8 = 10;
pub const OP_NE: u8 = 11;
pub const OP_LT: u8 = 12;
pub const OP_GT: u8 = 13;
pub const OP_EQ: u8 = 14;
pub const OP_AND: u8 = 15;
pub const OP_OR: u8 = 16;
pub const OP_NOT: u8 = 17;

pub const OPERATORS: &[OpInfo] = &[
    OpInfo { name: ",", prec: 10, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: ";", prec: 10, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "+", prec: 4, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "+", prec: 9, assoc: Assoc::Right, arity: Arity::Unary },
    OpInfo { name: "-", prec: 4, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "-", prec: 9, assoc: Assoc::Right, arity: Arity::Unary },
    OpInfo { name: "*", prec: 5, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "/", prec: 5, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "^", prec: 6, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "<=", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: ">=", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "<>", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "<", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: ">", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "=", prec: 3, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "AND", prec: 2, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "OR", prec: 2, assoc: Assoc::Left, arity: Arity::Binary },
    OpInfo { name: "NOT", prec: 1, assoc: Assoc::Right, arity: Arity::Unary },
];

pub fn info(idx: u8) -> &'static OpInfo {
    &OPERATORS[idx as usize]
}

pub fn is_separator(idx: u8) -> bool {
    idx == OP_COMMA || idx == OP_SEMI
}

/// The unary counterpart of a binary `+`/`-` token, used by the evaluator
/// to rewrite a binary-tagged operator into its unary form when it is the
/// first token of the expression or immediately follows another operator.
pub fn unary_variant(idx: u8) -> Option<u8> {
    match idx {
        OP_ADD_BIN => Some(OP_ADD_UN),
        OP_SUB_BIN => Some(OP_SUB_UN),
        _ => None,
    }
}

/// Matches the next operator in source text, trying multi-character forms
/// before their single-character prefixes (`<=` before `<`, etc). Always
/// returns the *binary* index for `+`/`-`; the evaluator decides whether to
/// use the unary form.
pub fn try_match_operator(s: &str) -> Option<(u8, &str)> {
    const ORDER: &[u8] = &[OP_LE, OP_GE, OP_NE, OP_LT, OP_GT, OP_EQ, OP_AND, OP_OR, OP_NOT, OP_ADD_BIN, OP_SUB_BIN, OP_MUL, OP_DIV, OP_POW, OP_COMMA, OP_SEMI];
    for &idx in ORDER {
        let op = info(idx);
        let matched = if op.name.chars().next().unwrap().is_alphabetic() {
            lexer::match_keyword(s, op.name)
        } else {
            lexer::match_operator(s, op.name)
        };
        if let Some(rest) = matched {
            return Some((idx, rest));
        }
    }
    None
}

pub fn apply_binary(idx: u8, a: &Value, b: &Value) -> Value {
    match idx {
        OP_ADD_BIN => match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
            (Value::String(x), Value::String(y)) => Value::String(format!("{}{}", x, y)),
            _ => Value::error("Bad expression"),
        },
        OP_SUB_BIN => match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x - y),
            _ => Value::error("Bad expression"),
        },
        OP_MUL => match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x * y),
            _ => Value::error("Bad expression"),
        },
        OP_DIV => match (a, b) {
            (Value::Number(_), Value::Number(y)) if *y == 0.0 => Value::error("Division by zero"),
            (Value::Number(x), Value::Number(y)) => Value::Number(x / y),
            _ => Value::error("Bad expression"),
        },
        OP_POW => match (a, b) {
            (Value::Number(x), Value::Number(y)) => Value::Number(x.powf(*y)),
            _ => Value::error("Bad expression"),
        },
        OP_LE | OP_GE | OP_NE | OP_LT | OP_GT | OP_EQ => compare(idx, a, b),
        OP_AND => Value::Number(if a.truthy() && b.truthy() { 1.0 } else { 0.0 }),
        OP_OR => Value::Number(if a.truthy() || b.truthy() { 1.0 } else { 0.0 }),
        _ => Value::error("Bad expression"),
    }
}

fn compare(idx: u8, a: &Value, b: &Value) -> Value {
    let ordering = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => return Value::error("Bad expression"),
    };
    let Some(ordering) = ordering else {
        return Value::error("Bad expression");
    };
    use std::cmp::Ordering::*;
    let result = match idx {
        OP_LE => ordering != Greater,
        OP_GE => ordering != Less,
        OP_NE => ordering != Equal,
        OP_LT => ordering == Less,
        OP_GT => ordering == Greater,
        OP_EQ => ordering == Equal,
        _ => unreachable!(),
    };
    Value::Number(if result { 1.0 } else { 0.0 })
}

pub fn apply_unary(idx: u8, a: &Value) -> Value {
    match idx {
        OP_ADD_UN => match a {
            Value::Number(x) => Value::Number(*x),
            _ => Value::error("Bad expression"),
        },
        OP_SUB_UN => match a {
            Value::Number(x) => Value::Number(-x),
            _ => Value::error("Bad expression"),
        },
        OP_NOT => Value::Number(if a.truthy() { 0.0 } else { 1.0 }),
        _ => Value::error("Bad expression"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_is_an_error_value() {
        assert_eq!(apply_binary(OP_DIV, &Value::Number(1.0), &Value::Number(0.0)), Value::error("Division by zero"));
    }

    #[test]
    fn type_mismatch_always_pushes_error() {
        assert!(matches!(apply_binary(OP_ADD_BIN, &Value::Number(1.0), &Value::String("x".into())), Value::Error(_)));
        assert!(matches!(apply_binary(OP_MUL, &Value::String("x".into()), &Value::Number(1.0)), Value::Error(_)));
    }

    #[test]
    fn string_concatenation_and_compare() {
        assert_eq!(apply_binary(OP_ADD_BIN, &Value::String("A".into()), &Value::String("B".into())), Value::String("AB".into()));
        assert_eq!(apply_binary(OP_LT, &Value::String("A".into()), &Value::String("B".into())), Value::Number(1.0));
    }

    #[test]
    fn matches_longest_operator_first() {
        let (idx, rest) = try_match_operator("<=3").unwrap();
        assert_eq!(idx, OP_LE);
        assert_eq!(rest, "3");
    }
}
