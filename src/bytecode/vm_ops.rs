//! Operator semantics and numeric arrays used by the dispatch loop.

use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::Value;
use crate::error::RuntimeError;

/// `+`: concatenation when either side is a string, otherwise addition.
pub fn add(left: &Value, right: &Value) -> Value {
    if left.is_string() || right.is_string() {
        let mut text = left.to_text();
        text.push_str(&right.to_text());
        Value::string(text)
    } else {
        Value::Number(left.as_number() + right.as_number())
    }
}

/// Numeric binary operators. Both operands are coerced to numbers.
pub fn arithmetic(op: OpCode, left: &Value, right: &Value, line: u32) -> Result<Value, RuntimeError> {
    let a = left.as_number();
    let b = right.as_number();
    let result = match op {
        OpCode::Sub => a - b,
        OpCode::Mul => a * b,
        OpCode::Pow => a.powf(b),
        OpCode::Div | OpCode::Mod if b == 0.0 => return Err(RuntimeError::DivisionByZero(line)),
        OpCode::Div => a / b,
        // Truncated remainder: the result takes the sign of the dividend.
        OpCode::Mod => a % b,
        _ => unreachable!("{} is not an arithmetic opcode", op.name()),
    };
    Ok(Value::Number(result))
}

/// Comparisons are lexical when either side is a string, numeric otherwise.
pub fn compare(op: OpCode, left: &Value, right: &Value) -> bool {
    if left.is_string() || right.is_string() {
        let a = left.to_text();
        let b = right.to_text();
        match op {
            OpCode::Eq => a == b,
            OpCode::Neq => a != b,
            OpCode::Gt => a > b,
            OpCode::Gte => a >= b,
            OpCode::Lt => a < b,
            OpCode::Lte => a <= b,
            _ => unreachable!("{} is not a comparison opcode", op.name()),
        }
    } else {
        let a = left.as_number();
        let b = right.as_number();
        match op {
            OpCode::Eq => a == b,
            OpCode::Neq => a != b,
            OpCode::Gt => a > b,
            OpCode::Gte => a >= b,
            OpCode::Lt => a < b,
            OpCode::Lte => a <= b,
            _ => unreachable!("{} is not a comparison opcode", op.name()),
        }
    }
}

/// A row-major array of numbers created by DIM.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericArray {
    pub dims: Vec<usize>,
    pub data: Vec<f64>,
}

impl NumericArray {
    /// Allocate a zeroed array. Sizes must already be validated.
    pub fn new(dims: Vec<usize>) -> Self {
        let len = dims.iter().product();
        Self {
            dims,
            data: vec![0.0; len],
        }
    }

    /// Flat offset of `indices`: sum of idx[d] times the product of the
    /// sizes after d. Each index is truncated toward zero and bounds-checked.
    pub fn flat_index(&self, indices: &[f64], line: u32) -> Result<usize, RuntimeError> {
        if indices.len() != self.dims.len() {
            return Err(RuntimeError::DimensionMismatch {
                expected: self.dims.len(),
                got: indices.len(),
                line,
            });
        }
        let mut flat = 0usize;
        for (&raw, &size) in indices.iter().zip(&self.dims) {
            let index = raw.trunc();
            if !(index >= 0.0 && index < size as f64) {
                return Err(RuntimeError::IndexOutOfBounds {
                    index: raw,
                    size,
                    line,
                });
            }
            flat = flat * size + index as usize;
        }
        Ok(flat)
    }
}
