//! The tagged value model shared by expression evaluation, variables and arrays.

use std::fmt;

/// One evaluated value. `Separator` and `Tab` only ever appear inside an
/// [`ExpressionValue`](crate::expr::ExpressionValue) vector; they are never
/// assigned to a variable or array slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f32),
    String(String),
    Separator(char),
    Tab(i32),
    Error(Option<String>),
}

impl Value {
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Same "type category" test `LET`/`READ` use to accept an assignment:
    /// float vs. string, ignoring separator/tab/error.
    pub fn same_category(&self, other: &Value) -> bool {
        self.is_number() == other.is_number() && self.is_string() == other.is_string()
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f32> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(Some(message.into()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Separator(c) => write!(f, "{}", c),
            Value::Tab(n) => write!(f, "TAB({})", n),
            Value::Error(msg) => write!(f, "{}", msg.as_deref().unwrap_or("Bad expression")),
        }
    }
}

/// Renders a float the way `sprintf("%g", ...)` would: the shortest decimal
/// representation that round-trips, capped at 20 characters as the external
/// interface contract requires.
pub fn format_number(n: f32) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if !n.is_finite() {
        return if n.is_nan() { "nan".to_string() } else if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }

    let magnitude = n.abs();
    let mut s = if !(1e-4..1e21).contains(&(magnitude as f64)) {
        format_scientific(n)
    } else {
        format_fixed(n)
    };

    if s.len() > 20 {
        s.truncate(20);
    }
    s
}

fn format_fixed(n: f32) -> String {
    // Find the shortest fixed-point rendering that parses back to the same f32.
    for precision in 0..=6 {
        let candidate = format!("{:.*}", precision, n);
        if candidate.parse::<f32>() == Ok(n) {
            return trim_fixed(candidate);
        }
    }
    trim_fixed(format!("{:.6}", n))
}

fn trim_fixed(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0');
    let trimmed = trimmed.trim_end_matches('.');
    trimmed.to_string()
}

fn format_scientific(n: f32) -> String {
    for precision in 0..=6 {
        let candidate = format!("{:.*e}", precision, n);
        if candidate.parse::<f32>() == Ok(n) {
            return normalize_exponent(&candidate);
        }
    }
    normalize_exponent(&format!("{:.6e}", n))
}

/// Rust renders `1e1` / `1.5e-3`; C's `%g` wants `e+01` / `e-03` with a
/// minimum two-digit, signed exponent.
fn normalize_exponent(s: &str) -> String {
    let Some(epos) = s.find('e') else { return s.to_string() };
    let (mantissa, exp) = s.split_at(epos);
    let exp = &exp[1..];
    let (sign, digits) = if let Some(rest) = exp.strip_prefix('-') {
        ('-', rest)
    } else {
        ('+', exp)
    };
    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    let mantissa = if mantissa.is_empty() { "0" } else { mantissa };
    format!("{}e{}{:0>2}", mantissa, sign, digits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_integers_without_decimal() {
        assert_eq!(format_number(6.0), "6");
        assert_eq!(format_number(-4.0), "-4");
    }

    #[test]
    fn formats_fractions_shortest() {
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(25.0), "25");
    }

    #[test]
    fn truthy_matches_number_and_string_rules() {
        assert!(Value::Number(1.0).truthy());
        assert!(!Value::Number(0.0).truthy());
        assert!(Value::String("x".into()).truthy());
        assert!(!Value::String(String::new()).truthy());
    }

    #[test]
    fn same_category_ignores_separator_and_error() {
        assert!(Value::Number(1.0).same_category(&Value::Number(2.0)));
        assert!(!Value::Number(1.0).same_category(&Value::String("a".into())));
    }
}
