//! Bytecode disassembler for debugging.

use std::fmt::{self, Write};

use crate::bytecode::builtins;
use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::OpCode;

/// Display adapter that renders a whole chunk.
pub struct Disassembly<'a> {
    chunk: &'a Chunk,
    name: &'a str,
}

impl<'a> Disassembly<'a> {
    pub fn new(chunk: &'a Chunk, name: &'a str) -> Self {
        Self { chunk, name }
    }
}

impl fmt::Display for Disassembly<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== {} ==", self.name)?;
        let mut offset = 0;
        while offset < self.chunk.code.len() {
            offset = disassemble_instruction(self.chunk, offset, f)?;
        }
        Ok(())
    }
}

impl Chunk {
    /// Render the chunk as one line per instruction under a `== name ==` header.
    pub fn disassemble(&self, name: &str) -> String {
        Disassembly::new(self, name).to_string()
    }
}

/// Disassemble a single instruction and return the offset of the next one.
///
/// An instruction whose operands run past the end of the code is marked as
/// truncated and the returned offset is the end of the code.
pub fn disassemble_instruction<W: Write>(
    chunk: &Chunk,
    offset: usize,
    out: &mut W,
) -> Result<usize, fmt::Error> {
    write!(out, "{:04} ", offset)?;

    match chunk.lines.get(offset) {
        Some(line) if offset > 0 && chunk.lines.get(offset - 1) == Some(line) => {
            write!(out, "   | ")?
        }
        Some(line) => write!(out, "{:4} ", line)?,
        None => write!(out, "   ? ")?,
    }

    let byte = chunk.code[offset];
    let Some(op) = OpCode::from_u8(byte) else {
        writeln!(out, "Unknown opcode {}", byte)?;
        return Ok(offset + 1);
    };

    let widths = op.operand_widths();
    if widths.is_empty() {
        writeln!(out, "{}", op.name())?;
        return Ok(offset + 1);
    }

    let mut operands = Vec::with_capacity(widths.len());
    let mut cursor = offset + 1;
    for width in widths {
        let value = match width {
            1 => chunk.read_u8(cursor).map(u16::from),
            _ => chunk.read_u16(cursor),
        };
        match value {
            Some(v) => operands.push(v),
            None => {
                writeln!(out, "{:<16} <truncated>", op.name())?;
                return Ok(chunk.code.len());
            }
        }
        cursor += *width as usize;
    }

    write!(out, "{:<16}", op.name())?;
    for operand in &operands {
        write!(out, " {:4}", operand)?;
    }

    match op {
        OpCode::Constant => match chunk.constants.get(operands[0] as usize) {
            Some(constant) => write!(out, " ({})", constant)?,
            None => write!(out, " (<invalid constant>)")?,
        },
        OpCode::CallBuiltin => match builtins::name_of(operands[0]) {
            Some(name) => write!(out, " ({})", name)?,
            None => write!(out, " (<unknown builtin>)")?,
        },
        _ => {}
    }
    writeln!(out)?;

    Ok(cursor)
}
