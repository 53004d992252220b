//! Program-to-bytecode compiler.
//!
//! Single pass over the numbered lines. Each line's start offset is
//! recorded before its statements compile; GOTO and GOSUB emit placeholder
//! operands keyed by target line and are patched after the last line.
//! Scalars and arrays are resolved to dense slot ids in first-use order.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, trace};

use crate::ast::stmt::Program;
use crate::error::CompileError;

use super::chunk::{Chunk, Constant};
use super::instruction::OpCode;

/// Result type for compilation.
pub type CompileResult<T> = Result<T, CompileError>;

/// Pool entries, scalar slots and array slots are each counted in a u16.
pub const MAX_ENTRIES: usize = u16::MAX as usize;

/// Placeholder written into operands that are patched later.
const PLACEHOLDER: u16 = 0xFFFF;

/// An operand waiting for a line address.
#[derive(Debug, Clone, Copy)]
pub struct Fixup {
    /// Offset of the u16 operand to patch.
    pub operand: usize,
    /// Line that contains the jump.
    pub line: u32,
}

/// An open FOR loop.
#[derive(Debug, Clone)]
pub(crate) struct LoopEntry {
    pub variable: String,
    pub slot: u16,
    /// First instruction of the loop body.
    pub top: usize,
    pub line: u32,
}

/// The compiler: transforms a program into a chunk.
pub struct Compiler {
    pub(crate) chunk: Chunk,
    globals: HashMap<String, u16>,
    arrays: HashMap<String, u16>,
    line_offsets: HashMap<u32, usize>,
    fixups: BTreeMap<u32, Vec<Fixup>>,
    pub(crate) loops: Vec<LoopEntry>,
    /// Line currently being compiled.
    pub(crate) line: u32,
}

impl Compiler {
    pub fn new() -> Self {
        Self {
            chunk: Chunk::new(),
            globals: HashMap::new(),
            arrays: HashMap::new(),
            line_offsets: HashMap::new(),
            fixups: BTreeMap::new(),
            loops: Vec::new(),
            line: 0,
        }
    }

    /// Compile a full program.
    pub fn compile(program: &Program) -> CompileResult<Chunk> {
        let mut compiler = Compiler::new();
        match compiler.compile_program(program) {
            Ok(()) => {
                let chunk = compiler.chunk;
                debug!(
                    code = chunk.code.len(),
                    constants = chunk.constants.len(),
                    globals = chunk.global_count,
                    arrays = chunk.array_count,
                    lines = program.lines.len(),
                    "program compiled"
                );
                Ok(chunk)
            }
            Err(err) => {
                debug!(error = %err, "compilation failed");
                Err(err)
            }
        }
    }

    fn compile_program(&mut self, program: &Program) -> CompileResult<()> {
        for line in &program.lines {
            self.line = line.number;
            self.line_offsets
                .insert(line.number, self.chunk.current_offset());
            for stmt in &line.statements {
                self.compile_stmt(stmt)?;
            }
        }

        if let Some(open) = self.loops.last() {
            return Err(CompileError::ForWithoutNext {
                variable: open.variable.clone(),
                line: open.line,
            });
        }

        self.emit_op(OpCode::End);
        self.resolve_fixups()?;

        self.chunk.global_count = self.globals.len();
        self.chunk.array_count = self.arrays.len();
        Ok(())
    }

    /// Patch every GOTO/GOSUB operand, smallest target line first.
    fn resolve_fixups(&mut self) -> CompileResult<()> {
        let fixups = std::mem::take(&mut self.fixups);
        for (target, patches) in fixups {
            let Some(&address) = self.line_offsets.get(&target) else {
                let line = patches.first().map_or(0, |f| f.line);
                return Err(CompileError::undefined_line(target, line));
            };
            let address = self.offset_operand(address, target)?;
            for fixup in patches {
                trace!(target_line = target, operand = fixup.operand, address, "fixup resolved");
                self.chunk.patch_u16(fixup.operand, address);
            }
        }
        Ok(())
    }

    // --- Chunk helpers ---

    pub fn emit_op(&mut self, op: OpCode) {
        self.chunk.write_op(op, self.line);
    }

    pub fn emit_byte(&mut self, byte: u8) {
        self.chunk.write_byte(byte, self.line);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.chunk.write_u16(value, self.line);
    }

    pub fn current_offset(&self) -> usize {
        self.chunk.current_offset()
    }

    /// Emit a jump with a placeholder operand and return the operand offset.
    pub fn emit_jump(&mut self, op: OpCode) -> usize {
        self.emit_op(op);
        let operand = self.current_offset();
        self.emit_u16(PLACEHOLDER);
        operand
    }

    /// Emit a jump to the start of `target`, patched once all lines are known.
    pub fn emit_line_jump(&mut self, op: OpCode, target: u32) {
        let operand = self.emit_jump(op);
        self.fixups.entry(target).or_default().push(Fixup {
            operand,
            line: self.line,
        });
    }

    /// Point the operand at `operand` to the current offset.
    pub fn patch_jump(&mut self, operand: usize) -> CompileResult<()> {
        let target = self.offset_operand(self.current_offset(), self.line)?;
        self.chunk.patch_u16(operand, target);
        Ok(())
    }

    /// Code offsets are addressed with 16 bits.
    pub fn offset_operand(&self, offset: usize, line: u32) -> CompileResult<u16> {
        u16::try_from(offset).map_err(|_| CompileError::ProgramTooLarge { offset, line })
    }

    pub fn emit_constant(&mut self, constant: Constant) -> CompileResult<()> {
        let index = self.chunk.add_constant(constant);
        if index >= MAX_ENTRIES {
            return Err(CompileError::too_many("constants", MAX_ENTRIES, self.line));
        }
        self.emit_op(OpCode::Constant);
        self.emit_u16(index as u16);
        Ok(())
    }

    /// One-byte count operand: builtin arguments or array dimensions.
    pub fn count_operand(&self, count: usize, kind: &'static str) -> CompileResult<u8> {
        u8::try_from(count).map_err(|_| CompileError::too_many(kind, u8::MAX as usize, self.line))
    }

    // --- Slot resolution ---

    /// Slot of a scalar variable, allocated on first use.
    pub fn global_slot(&mut self, name: &str) -> CompileResult<u16> {
        let line = self.line;
        Self::resolve_slot(&mut self.globals, name, "variables", line)
    }

    /// Slot of an array variable, allocated on first use.
    pub fn array_slot(&mut self, name: &str) -> CompileResult<u16> {
        let line = self.line;
        Self::resolve_slot(&mut self.arrays, name, "arrays", line)
    }

    fn resolve_slot(
        slots: &mut HashMap<String, u16>,
        name: &str,
        kind: &'static str,
        line: u32,
    ) -> CompileResult<u16> {
        let key = name.to_ascii_uppercase();
        if let Some(&slot) = slots.get(&key) {
            return Ok(slot);
        }
        if slots.len() >= MAX_ENTRIES {
            return Err(CompileError::too_many(kind, MAX_ENTRIES, line));
        }
        let slot = slots.len() as u16;
        slots.insert(key, slot);
        Ok(slot)
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a program into a chunk.
pub fn compile(program: &Program) -> CompileResult<Chunk> {
    Compiler::compile(program)
}
