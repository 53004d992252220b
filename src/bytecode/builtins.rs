//! Builtin function table.
//!
//! Builtins are called from bytecode by position, so the order of
//! [`BUILTINS`] is part of the chunk format. New entries go at the end.

use std::f64::consts;

use rand::{Rng, RngCore};

use crate::bytecode::value::Value;
use crate::error::BuiltinError;

/// Native implementation of a builtin.
pub type BuiltinFn = fn(&[Value], &mut dyn RngCore) -> Result<Value, BuiltinError>;

/// Accepted argument counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Arity::Exact(0) => "0",
            Arity::Exact(1) => "1",
            Arity::Exact(2) => "2",
            Arity::Range(2, 3) => "2 or 3",
            _ => "a different number of",
        }
    }
}

/// One entry of the builtin table.
#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: Arity,
    pub func: BuiltinFn,
}

impl Builtin {
    /// Check the argument count, then run the implementation.
    pub fn call(&self, args: &[Value], rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
        if !self.arity.accepts(args.len()) {
            return Err(BuiltinError::Arity {
                name: self.name,
                expected: self.arity.describe(),
                got: args.len(),
            });
        }
        (self.func)(args, rng)
    }
}

const fn entry(name: &'static str, arity: Arity, func: BuiltinFn) -> Builtin {
    Builtin { name, arity, func }
}

/// The builtin table in id order.
pub static BUILTINS: [Builtin; 21] = [
    entry("ABS", Arity::Exact(1), builtin_abs),
    entry("SIN", Arity::Exact(1), builtin_sin),
    entry("COS", Arity::Exact(1), builtin_cos),
    entry("TAN", Arity::Exact(1), builtin_tan),
    entry("INT", Arity::Exact(1), builtin_int),
    entry("EXP", Arity::Exact(1), builtin_exp),
    entry("SQR", Arity::Exact(1), builtin_sqr),
    entry("LOG", Arity::Exact(1), builtin_log),
    entry("RND", Arity::Exact(0), builtin_rnd),
    entry("LEN", Arity::Exact(1), builtin_len),
    entry("LEFT$", Arity::Exact(2), builtin_left),
    entry("RIGHT$", Arity::Exact(2), builtin_right),
    entry("MID$", Arity::Range(2, 3), builtin_mid),
    entry("INSTR", Arity::Range(2, 3), builtin_instr),
    entry("UCASE$", Arity::Exact(1), builtin_ucase),
    entry("LCASE$", Arity::Exact(1), builtin_lcase),
    entry("SPACE$", Arity::Exact(1), builtin_space),
    entry("CHR$", Arity::Exact(1), builtin_chr),
    entry("ASC", Arity::Exact(1), builtin_asc),
    entry("PI", Arity::Exact(0), builtin_pi),
    entry("EULER", Arity::Exact(0), builtin_euler),
];

/// A handle on the builtin table held by each VM.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTable {
    entries: &'static [Builtin],
}

impl BuiltinTable {
    pub fn new() -> Self {
        Self { entries: &BUILTINS }
    }

    pub fn get(&self, id: u16) -> Option<&Builtin> {
        self.entries.get(id as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BuiltinTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a builtin name (any case) to its id.
pub fn lookup(name: &str) -> Option<u16> {
    BUILTINS
        .iter()
        .position(|b| b.name.eq_ignore_ascii_case(name))
        .map(|i| i as u16)
}

/// Name of a builtin id, for diagnostics.
pub fn name_of(id: u16) -> Option<&'static str> {
    BUILTINS.get(id as usize).map(|b| b.name)
}

fn num(value: f64) -> Result<Value, BuiltinError> {
    Ok(Value::Number(value))
}

fn text(value: String) -> Result<Value, BuiltinError> {
    Ok(Value::string(value))
}

/// Clamp a count argument to `0..=max`.
fn clamp_count(value: &Value, max: usize) -> usize {
    let n = value.as_number().trunc();
    if n <= 0.0 || n.is_nan() {
        0
    } else if n >= max as f64 {
        max
    } else {
        n as usize
    }
}

// ============ Math ============

fn builtin_abs(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().abs())
}

fn builtin_sin(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().sin())
}

fn builtin_cos(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().cos())
}

fn builtin_tan(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().tan())
}

fn builtin_int(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().trunc())
}

fn builtin_exp(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].as_number().exp())
}

fn builtin_sqr(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let value = args[0].as_number();
    if value < 0.0 {
        return Err(BuiltinError::domain("SQR", "square root of negative number"));
    }
    num(value.sqrt())
}

fn builtin_log(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let value = args[0].as_number();
    if value <= 0.0 {
        return Err(BuiltinError::domain("LOG", "logarithm of non-positive number"));
    }
    num(value.ln())
}

fn builtin_rnd(_args: &[Value], rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(rng.gen::<f64>())
}

fn builtin_pi(_args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(consts::PI)
}

fn builtin_euler(_args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(consts::E)
}

// ============ Strings ============
//
// Lengths and positions count characters, not bytes.

fn builtin_len(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    num(args[0].to_text().chars().count() as f64)
}

fn builtin_left(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let s = args[0].to_text();
    let n = clamp_count(&args[1], s.chars().count());
    text(s.chars().take(n).collect())
}

fn builtin_right(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let s = args[0].to_text();
    let len = s.chars().count();
    let n = clamp_count(&args[1], len);
    text(s.chars().skip(len - n).collect())
}

fn builtin_mid(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let s = args[0].to_text();
    let len = s.chars().count();
    let start = clamp_count(&args[1], len + 1).max(1);
    let available = (len + 1).saturating_sub(start);
    let n = match args.get(2) {
        Some(count) => clamp_count(count, available),
        None => available,
    };
    text(s.chars().skip(start - 1).take(n).collect())
}

fn builtin_instr(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let (start, haystack, needle) = match args {
        [haystack, needle] => (1, haystack.to_text(), needle.to_text()),
        [start, haystack, needle] => {
            let start = start.as_number().trunc();
            let start = if start < 1.0 || start.is_nan() { 1.0 } else { start };
            (start as usize, haystack.to_text(), needle.to_text())
        }
        _ => unreachable!("arity checked by Builtin::call"),
    };

    let chars: Vec<char> = haystack.chars().collect();
    if start > chars.len() {
        return num(0.0);
    }
    let rest: String = chars[start - 1..].iter().collect();
    match rest.find(&needle) {
        Some(byte_pos) => num((start + rest[..byte_pos].chars().count()) as f64),
        None => num(0.0),
    }
}

fn builtin_ucase(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    text(args[0].to_text().to_uppercase())
}

fn builtin_lcase(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    text(args[0].to_text().to_lowercase())
}

/// Longest string SPACE$ will build.
const SPACE_MAX: usize = u16::MAX as usize;

fn builtin_space(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let n = args[0].as_number().trunc();
    if n > SPACE_MAX as f64 {
        return Err(BuiltinError::domain("SPACE$", "count must be at most 65535"));
    }
    text(" ".repeat(clamp_count(&args[0], SPACE_MAX)))
}

fn builtin_chr(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    let code = args[0].as_number().trunc();
    if !(0.0..=255.0).contains(&code) {
        return Err(BuiltinError::domain("CHR$", "argument must be between 0 and 255"));
    }
    let c = char::from(code as u8);
    text(c.to_string())
}

fn builtin_asc(args: &[Value], _rng: &mut dyn RngCore) -> Result<Value, BuiltinError> {
    match args[0].to_text().chars().next() {
        Some(c) => num(c as u32 as f64),
        None => Err(BuiltinError::domain("ASC", "argument is an empty string")),
    }
}
