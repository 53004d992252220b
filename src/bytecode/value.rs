//! Runtime values and the coercions shared by the VM and builtins.

use std::fmt;
use std::rc::Rc;

use crate::bytecode::chunk::Constant;

/// A runtime value: every BASIC value is a number or a string.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    String(Rc<str>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::String(s.into())
    }

    pub fn bool(cond: bool) -> Self {
        Value::Number(if cond { 1.0 } else { 0.0 })
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    /// Numeric view: strings parse as a number or fall back to 0.
    pub fn as_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::String(s) => parse_number(s).unwrap_or(0.0),
        }
    }

    /// Nonzero numbers and nonempty strings are true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    /// Text form used by PRINT, concatenation and string comparison.
    pub fn to_text(&self) -> String {
        match self {
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.to_string(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Number(n) => Value::Number(*n),
            Constant::String(s) => Value::string(s.as_str()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::String(s) => f.write_str(s),
        }
    }
}

/// Parse numeric text the way INPUT and string coercion do.
///
/// Surrounding whitespace makes the text non-numeric.
pub fn parse_number(text: &str) -> Option<f64> {
    if text.trim() != text {
        return None;
    }
    text.parse::<f64>().ok()
}

/// Shortest round-trip decimal: exponent form when the decimal exponent is
/// below -4 or at least 6, two-digit minimum exponent with explicit sign.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    if n == 0.0 {
        return format!("{}", n);
    }

    let sci = format!("{:e}", n);
    let (mantissa, exponent) = match sci.split_once('e') {
        Some(parts) => parts,
        None => return sci,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..6).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        format!("{}", n)
    }
}
