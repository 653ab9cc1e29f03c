//! Built-in function table: name lookup plus the exact argument-count and
//! type validation each function performs, grounded on
//! `examples/original_source/Functions.cpp`'s `Compute*` family.

use rand::Rng;

use crate::lexer;
use crate::value::{format_number, Value};

pub const NAMES: &[&str] = &[
    "ABS", "ASC", "ATN", "CHR$", "COS", "EXP", "INT", "LEFT$", "LEN", "LOG", "MID$", "RND", "RIGHT$", "SGN", "SIN", "SQR", "STR$", "TAB", "TAN", "VAL",
];

pub fn lookup(name: &str) -> Option<u8> {
    NAMES.iter().position(|n| *n == name).map(|i| i as u8)
}

/// Matches the next function name in source text (used alongside keyword
/// and instruction matching during identifier parsing).
pub fn try_match(s: &str) -> Option<(u8, &str)> {
    // Longest names first so `STR$` doesn't get shadowed by a shorter,
    // non-existent overlapping prefix; none of the current names overlap,
    // but sorting by length keeps this robust to future additions.
    let mut order: Vec<u8> = (0..NAMES.len() as u8).collect();
    order.sort_by_key(|i| std::cmp::Reverse(NAMES[*i as usize].len()));
    for idx in order {
        if let Some(rest) = lexer::match_keyword(s, NAMES[idx as usize]) {
            return Some((idx, rest));
        }
    }
    None
}

fn num(v: &Value) -> Option<f32> {
    v.as_number()
}

fn str_(v: &Value) -> Option<&str> {
    v.as_str()
}

pub fn compute(idx: u8, args: &[Value]) -> Value {
    match NAMES[idx as usize] {
        "ABS" => match args {
            [a] => num(a).map(|n| Value::Number(n.abs())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "ASC" => match args {
            [a] => str_(a)
                .and_then(|s| s.bytes().next())
                .map(|b| Value::Number(b as f32))
                .unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "ATN" => match args {
            [a] => num(a).map(|n| Value::Number(n.atan())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "CHR$" => match args {
            [a] => num(a)
                .map(|n| Value::String((n as u8 as char).to_string()))
                .unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "COS" => match args {
            [a] => num(a).map(|n| Value::Number(n.cos())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "EXP" => match args {
            [a] => num(a).map(|n| Value::Number(n.exp())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "INT" => match args {
            [a] => num(a).map(|n| Value::Number(n.floor())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "LEFT$" => match args {
            [a, _sep, c] => match (str_(a), num(c)) {
                (Some(s), Some(n)) => {
                    let len = s.len().min(n.max(0.0) as usize);
                    Value::String(s[..len].to_string())
                }
                _ => Value::error("Bad expression"),
            },
            _ => Value::error("Bad expression"),
        },
        "LEN" => match args {
            [a] => str_(a).map(|s| Value::Number(s.len() as f32)).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "LOG" => match args {
            [a] => num(a).map(|n| Value::Number(n.ln())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "MID$" => compute_mid(args),
        "RND" => match args {
            [a] if num(a).is_some() => Value::Number(rand::rng().random_range(0.0..1.0)),
            _ => Value::error("Bad expression"),
        },
        "RIGHT$" => match args {
            [a, _sep, c] => match (str_(a), num(c)) {
                (Some(s), Some(n)) => {
                    let len = s.len();
                    let start = len.saturating_sub((n.max(0.0) as usize).min(len));
                    Value::String(s[start..].to_string())
                }
                _ => Value::error("Bad expression"),
            },
            _ => Value::error("Bad expression"),
        },
        "SGN" => match args {
            [a] => num(a)
                .map(|n| Value::Number(if n < 0.0 { -1.0 } else { 1.0 }))
                .unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "SIN" => match args {
            [a] => num(a).map(|n| Value::Number(n.sin())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "SQR" => match args {
            [a] => num(a).map(|n| Value::Number(n.sqrt())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "STR$" => match args {
            [a] => num(a).map(|n| Value::String(format_number(n))).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "TAB" => match args {
            [a] => num(a).map(|n| Value::Tab(n as i32)).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "TAN" => match args {
            [a] => num(a).map(|n| Value::Number(n.tan())).unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        "VAL" => match args {
            [a] => str_(a)
                .map(|s| Value::Number(lexer::try_parse_number(s).map(|(n, _)| n).unwrap_or(0.0)))
                .unwrap_or_else(|| Value::error("Bad expression")),
            _ => Value::error("Bad expression"),
        },
        _ => Value::error("Bad expression"),
    }
}

/// `MID$(s, start)` (3-arg form with an implicit separator token between)
/// or `MID$(s, start, count)` (5-arg form with two separators).
fn compute_mid(args: &[Value]) -> Value {
    let (s, start, count) = match args {
        [a, _sep, b] => (str_(a), num(b), None),
        [a, _sep1, b, _sep2, c] => (str_(a), num(b), Some(num(c))),
        _ => return Value::error("Bad expression"),
    };
    let (Some(s), Some(start)) = (s, start) else {
        return Value::error("Bad expression");
    };
    let len = s.len() as i32;
    let from = (len.min(start as i32) - 1).max(0);
    let mut count_chars = len - from;
    if let Some(count) = count {
        let Some(count) = count else {
            return Value::error("Bad expression");
        };
        count_chars = count_chars.min(count as i32);
    }
    let from = from as usize;
    let to = (from + count_chars.max(0) as usize).min(s.len());
    Value::String(s[from..to].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_and_right_clamp_to_string_length() {
        assert_eq!(
            compute(lookup("LEFT$").unwrap(), &[Value::String("HELLO".into()), Value::Separator(','), Value::Number(3.0)]),
            Value::String("HEL".into())
        );
        assert_eq!(
            compute(lookup("RIGHT$").unwrap(), &[Value::String("HELLO".into()), Value::Separator(','), Value::Number(2.0)]),
            Value::String("LO".into())
        );
    }

    #[test]
    fn mid_three_and_five_arg_forms() {
        let three = compute(lookup("MID$").unwrap(), &[Value::String("HELLO".into()), Value::Separator(','), Value::Number(2.0)]);
        assert_eq!(three, Value::String("ELLO".into()));
        let five = compute(
            lookup("MID$").unwrap(),
            &[Value::String("HELLO".into()), Value::Separator(','), Value::Number(2.0), Value::Separator(','), Value::Number(2.0)],
        );
        assert_eq!(five, Value::String("EL".into()));
    }

    #[test]
    fn wrong_arg_type_yields_error_value() {
        assert!(matches!(compute(lookup("ABS").unwrap(), &[Value::String("x".into())]), Value::Error(_)));
    }
}
