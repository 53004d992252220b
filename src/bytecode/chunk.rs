//! Bytecode chunk containing instructions, constants and slot counts.

use std::fmt;

use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::format_number;

/// A compiled program.
///
/// `lines` holds one source line number per byte of `code`. The chunk is
/// read-only once compilation finishes and can back any number of VMs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<u8>,
    /// The constant pool.
    pub constants: Vec<Constant>,
    /// Source line per code byte.
    pub lines: Vec<u32>,
    /// Number of scalar variable slots.
    pub global_count: usize,
    /// Number of array slots.
    pub array_count: usize,
}

impl Chunk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an opcode to the chunk.
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write_byte(op as u8, line);
    }

    /// Write a raw byte to the chunk.
    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.lines.push(line);
    }

    /// Write a 16-bit value to the chunk (big-endian).
    pub fn write_u16(&mut self, value: u16, line: u32) {
        for byte in value.to_be_bytes() {
            self.write_byte(byte, line);
        }
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    /// Read a big-endian 16-bit value at offset.
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let hi = *self.code.get(offset)?;
        let lo = *self.code.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    /// Add a constant to the pool and return its index.
    ///
    /// An equal constant already in the pool is reused.
    pub fn add_constant(&mut self, constant: Constant) -> usize {
        if let Some(index) = self.constants.iter().position(|c| c == &constant) {
            return index;
        }
        self.constants.push(constant);
        self.constants.len() - 1
    }

    /// Get the current offset in the code.
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Overwrite the u16 operand stored at `offset`.
    pub fn patch_u16(&mut self, offset: usize, value: u16) {
        let [hi, lo] = value.to_be_bytes();
        self.code[offset] = hi;
        self.code[offset + 1] = lo;
    }

    /// Get the line number at a given offset, or 0 past the end.
    pub fn get_line(&self, offset: usize) -> u32 {
        self.lines.get(offset).copied().unwrap_or(0)
    }
}

/// A constant value in the constant pool.
#[derive(Debug, Clone)]
pub enum Constant {
    Number(f64),
    String(String),
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Bit equality keeps 0 and -0 apart and lets NaN dedup.
            (Constant::Number(a), Constant::Number(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Number(n) => f.write_str(&format_number(*n)),
            Constant::String(s) => write!(f, "\"{}\"", s),
        }
    }
}
