//! Stack-based virtual machine for executing a compiled chunk.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bytecode::builtins::BuiltinTable;
use crate::bytecode::chunk::Chunk;
use crate::bytecode::instruction::OpCode;
use crate::bytecode::value::{parse_number, Value};
use crate::bytecode::vm_ops::{self, NumericArray};
use crate::error::RuntimeError;

/// Default operand stack capacity.
pub const STACK_MAX: usize = 2048;

/// Default GOSUB nesting limit.
pub const CALL_STACK_MAX: usize = 4096;

/// Default cap on the element count of one array.
pub const ARRAY_ELEMENTS_MAX: usize = 16 * 1024 * 1024;

/// Result type for VM operations.
pub type VMResult<T> = Result<T, RuntimeError>;

/// VM limits and the RND seed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    pub stack_capacity: usize,
    pub call_stack_limit: usize,
    pub max_array_elements: usize,
    /// Seed for RND; `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            stack_capacity: STACK_MAX,
            call_stack_limit: CALL_STACK_MAX,
            max_array_elements: ARRAY_ELEMENTS_MAX,
            seed: None,
        }
    }
}

impl VmConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_stack_capacity(mut self, capacity: usize) -> Self {
        self.stack_capacity = capacity;
        self
    }

    pub fn with_call_stack_limit(mut self, limit: usize) -> Self {
        self.call_stack_limit = limit;
        self
    }
}

/// An active FOR loop.
#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    slot: u16,
    end: f64,
    step: f64,
    top: usize,
}

/// The virtual machine.
///
/// A VM runs its chunk once. After END or an error it refuses to run again.
pub struct Vm<'a> {
    chunk: &'a Chunk,
    constants: Vec<Value>,
    ip: usize,
    /// Offset of the instruction being executed, for error lines.
    op_start: usize,
    stack: Vec<Value>,
    globals: Vec<Value>,
    arrays: Vec<Option<NumericArray>>,
    return_stack: Vec<usize>,
    loop_stack: Vec<LoopFrame>,
    /// Exit offset of each zero-trip loop seen so far, keyed by loop top.
    loop_exits: HashMap<usize, usize>,
    builtins: BuiltinTable,
    rng: StdRng,
    config: VmConfig,
    input: Box<dyn BufRead + 'a>,
    output: Box<dyn Write + 'a>,
    stopped: bool,
}

impl<'a> Vm<'a> {
    /// Create a VM reading stdin and writing stdout.
    pub fn new(chunk: &'a Chunk) -> Self {
        Self::with_io(
            chunk,
            io::stdin().lock(),
            io::BufWriter::new(io::stdout()),
        )
    }

    /// Create a VM over the given streams with the default configuration.
    pub fn with_io(chunk: &'a Chunk, input: impl BufRead + 'a, output: impl Write + 'a) -> Self {
        Self::with_config(chunk, VmConfig::default(), input, output)
    }

    pub fn with_config(
        chunk: &'a Chunk,
        config: VmConfig,
        input: impl BufRead + 'a,
        output: impl Write + 'a,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            chunk,
            constants: chunk.constants.iter().map(Value::from).collect(),
            ip: 0,
            op_start: 0,
            stack: Vec::with_capacity(config.stack_capacity),
            globals: vec![Value::default(); chunk.global_count],
            arrays: vec![None; chunk.array_count],
            return_stack: Vec::new(),
            loop_stack: Vec::new(),
            loop_exits: HashMap::new(),
            builtins: BuiltinTable::new(),
            rng,
            config,
            input: Box::new(input),
            output: Box::new(output),
            stopped: false,
        }
    }

    /// Scalar variable values by slot.
    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Run from offset 0 until END or the first error.
    pub fn run(&mut self) -> VMResult<()> {
        if self.stopped {
            return Err(RuntimeError::NotRunnable);
        }
        debug!(
            code = self.chunk.code.len(),
            stack_capacity = self.config.stack_capacity,
            "vm run start"
        );

        let result = self.execute();
        self.stopped = true;
        let flushed = self
            .output
            .flush()
            .map_err(|e| RuntimeError::io(e, self.line()));

        match &result {
            Ok(()) => debug!(ip = self.ip, "vm stopped at END"),
            Err(err) => debug!(ip = self.op_start, error = %err, "vm stopped on error"),
        }
        result.and(flushed)
    }

    fn execute(&mut self) -> VMResult<()> {
        loop {
            self.op_start = self.ip;
            let Some(&byte) = self.chunk.code.get(self.ip) else {
                return Err(RuntimeError::RanPastEnd);
            };
            self.ip += 1;
            let Some(op) = OpCode::from_u8(byte) else {
                return Err(RuntimeError::UnknownOpcode {
                    opcode: byte,
                    offset: self.op_start,
                    line: self.line(),
                });
            };

            match op {
                OpCode::Constant => {
                    let index = self.read_u16()?;
                    let value = self
                        .constants
                        .get(index as usize)
                        .cloned()
                        .ok_or_else(|| RuntimeError::invalid_index("constant", index, self.line()))?;
                    self.push(value)?;
                }
                OpCode::Pop => {
                    self.pop()?;
                }

                OpCode::Add => {
                    let (left, right) = self.pop_pair()?;
                    self.push(vm_ops::add(&left, &right))?;
                }
                OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Pow | OpCode::Mod => {
                    let (left, right) = self.pop_pair()?;
                    let value = vm_ops::arithmetic(op, &left, &right, self.line())?;
                    self.push(value)?;
                }
                OpCode::Neg => match self.pop()? {
                    Value::Number(n) => self.push(Value::Number(-n))?,
                    Value::String(_) => return Err(RuntimeError::NegateNonNumber(self.line())),
                },

                OpCode::Not => {
                    let value = self.pop()?;
                    self.push(Value::bool(!value.is_truthy()))?;
                }
                OpCode::And => {
                    let (left, right) = self.pop_pair()?;
                    self.push(Value::bool(left.is_truthy() && right.is_truthy()))?;
                }
                OpCode::Or => {
                    let (left, right) = self.pop_pair()?;
                    self.push(Value::bool(left.is_truthy() || right.is_truthy()))?;
                }

                OpCode::Eq | OpCode::Neq | OpCode::Gt | OpCode::Gte | OpCode::Lt | OpCode::Lte => {
                    let (left, right) = self.pop_pair()?;
                    self.push(Value::bool(vm_ops::compare(op, &left, &right)))?;
                }

                OpCode::Jump => {
                    self.ip = self.read_u16()? as usize;
                }
                OpCode::JumpIfFalse => {
                    let target = self.read_u16()? as usize;
                    if !self.pop()?.is_truthy() {
                        self.ip = target;
                    }
                }
                OpCode::Gosub => {
                    let target = self.read_u16()? as usize;
                    if self.return_stack.len() >= self.config.call_stack_limit {
                        return Err(RuntimeError::CallStackOverflow {
                            limit: self.config.call_stack_limit,
                            line: self.line(),
                        });
                    }
                    trace!(from = self.ip, to = target, depth = self.return_stack.len(), "gosub");
                    self.return_stack.push(self.ip);
                    self.ip = target;
                }
                OpCode::Return => {
                    let Some(address) = self.return_stack.pop() else {
                        return Err(RuntimeError::ReturnWithoutGosub(self.line()));
                    };
                    trace!(to = address, "return");
                    self.ip = address;
                }
                OpCode::End => return Ok(()),

                OpCode::ForInit => self.for_init()?,
                OpCode::Next => self.next()?,

                OpCode::GetGlobal => {
                    let slot = self.read_u16()?;
                    let value = self.global(slot)?.clone();
                    self.push(value)?;
                }
                OpCode::SetGlobal => {
                    let slot = self.read_u16()?;
                    let value = self.pop()?;
                    *self.global_mut(slot)? = value;
                }
                OpCode::GetArray => {
                    let slot = self.read_u16()?;
                    let dims = self.read_u8()?;
                    let indices = self.pop_numbers(dims)?;
                    let line = self.line();
                    let array = self.array(slot)?;
                    let value = array.data[array.flat_index(&indices, line)?];
                    self.push(Value::Number(value))?;
                }
                OpCode::SetArray => {
                    let slot = self.read_u16()?;
                    let dims = self.read_u8()?;
                    let value = self.pop()?.as_number();
                    let indices = self.pop_numbers(dims)?;
                    let line = self.line();
                    let array = self.array_mut(slot)?;
                    let flat = array.flat_index(&indices, line)?;
                    array.data[flat] = value;
                }

                OpCode::Print => {
                    let value = self.pop()?;
                    let line = self.line();
                    write!(self.output, "{}", value).map_err(|e| RuntimeError::io(e, line))?;
                }
                OpCode::PrintNl => {
                    let line = self.line();
                    writeln!(self.output).map_err(|e| RuntimeError::io(e, line))?;
                }
                OpCode::Input => {
                    let slot = self.read_u16()?;
                    let line = self.line();
                    self.output.flush().map_err(|e| RuntimeError::io(e, line))?;
                    let token = self.read_token().map_err(|e| RuntimeError::io(e, line))?;
                    let value = match parse_number(&token) {
                        Some(n) => Value::Number(n),
                        None => Value::string(token),
                    };
                    *self.global_mut(slot)? = value;
                }

                OpCode::CallBuiltin => self.call_builtin()?,
                OpCode::Dim => self.dim()?,
            }
        }
    }

    /// Pops step then end. A loop whose start is already past its end
    /// jumps straight to the instruction after its NEXT.
    fn for_init(&mut self) -> VMResult<()> {
        let slot = self.read_u16()?;
        let step = self.pop()?.as_number();
        let end = self.pop()?.as_number();
        let start = self.global(slot)?.as_number();
        let top = self.ip;

        // Re-entering this FOR (by GOTO) discards its stale frame and any inside it.
        if let Some(pos) = self
            .loop_stack
            .iter()
            .rposition(|f| f.slot == slot && f.top == top)
        {
            self.loop_stack.truncate(pos);
        }

        if (step > 0.0 && start > end) || (step < 0.0 && start < end) {
            self.ip = self.loop_exit(slot, top)?;
        } else {
            self.loop_stack.push(LoopFrame {
                slot,
                end,
                step,
                top,
            });
        }
        Ok(())
    }

    /// Offset just past the NEXT that closes the loop at `top`.
    ///
    /// Walks forward instruction by instruction using the operand table.
    /// Results are cached per loop top.
    fn loop_exit(&mut self, slot: u16, top: usize) -> VMResult<usize> {
        if let Some(&exit) = self.loop_exits.get(&top) {
            return Ok(exit);
        }
        let chunk = self.chunk;
        let mut offset = top;
        while let Some(&byte) = chunk.code.get(offset) {
            let Some(op) = OpCode::from_u8(byte) else {
                break;
            };
            let next = offset + op.instruction_len();
            if op == OpCode::Next
                && chunk.read_u16(offset + 1) == Some(slot)
                && chunk.read_u16(offset + 3).map(usize::from) == Some(top)
            {
                self.loop_exits.insert(top, next);
                return Ok(next);
            }
            offset = next;
        }
        Err(RuntimeError::ForWithoutNext(self.line()))
    }

    fn next(&mut self) -> VMResult<()> {
        let slot = self.read_u16()?;
        let top = self.read_u16()? as usize;
        let Some(frame) = self.loop_stack.last().copied() else {
            return Err(RuntimeError::NextWithoutFor(self.line()));
        };
        if frame.slot != slot || frame.top != top {
            return Err(RuntimeError::LoopFrameMismatch(self.line()));
        }

        let value = self.global(slot)?.as_number() + frame.step;
        *self.global_mut(slot)? = Value::Number(value);

        let more = (frame.step > 0.0 && value <= frame.end) || (frame.step < 0.0 && value >= frame.end);
        if more {
            self.ip = top;
        } else {
            self.loop_stack.pop();
        }
        Ok(())
    }

    /// Arguments are the top `argc` stack cells, passed as a slice.
    fn call_builtin(&mut self) -> VMResult<()> {
        let id = self.read_u16()?;
        let argc = self.read_u8()? as usize;
        let line = self.line();
        let builtin = *self
            .builtins
            .get(id)
            .ok_or(RuntimeError::UnknownBuiltin { index: id, line })?;
        if self.stack.len() < argc {
            return Err(RuntimeError::StackUnderflow(line));
        }

        let start = self.stack.len() - argc;
        let result = builtin
            .call(&self.stack[start..], &mut self.rng)
            .map_err(|e| RuntimeError::builtin(e, line))?;
        self.stack.truncate(start);
        self.push(result)
    }

    fn dim(&mut self) -> VMResult<()> {
        let slot = self.read_u16()?;
        let count = self.read_u8()?;
        let sizes = self.pop_numbers(count)?;
        let line = self.line();

        let mut dims = Vec::with_capacity(sizes.len());
        let mut elements = 1usize;
        for size in sizes {
            if !size.is_finite() || size < 0.0 {
                return Err(RuntimeError::InvalidDimension { size, line });
            }
            let size = size.trunc() as usize;
            elements = elements
                .checked_mul(size)
                .filter(|n| *n <= self.config.max_array_elements)
                .ok_or(RuntimeError::ArrayTooLarge {
                    elements: elements.saturating_mul(size),
                    limit: self.config.max_array_elements,
                    line,
                })?;
            dims.push(size);
        }

        trace!(slot, ?dims, "array declared");
        let entry = self
            .arrays
            .get_mut(slot as usize)
            .ok_or_else(|| RuntimeError::invalid_index("array", slot, line))?;
        *entry = Some(NumericArray::new(dims));
        Ok(())
    }

    // --- Stack ---

    fn push(&mut self, value: Value) -> VMResult<()> {
        if self.stack.len() >= self.config.stack_capacity {
            return Err(RuntimeError::StackOverflow {
                capacity: self.config.stack_capacity,
                line: self.line(),
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> VMResult<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => Err(RuntimeError::StackUnderflow(self.line())),
        }
    }

    /// Pop right then left.
    fn pop_pair(&mut self) -> VMResult<(Value, Value)> {
        let right = self.pop()?;
        let left = self.pop()?;
        Ok((left, right))
    }

    /// Pop `count` numbers, returned in push order.
    fn pop_numbers(&mut self, count: u8) -> VMResult<Vec<f64>> {
        let count = count as usize;
        if self.stack.len() < count {
            return Err(RuntimeError::StackUnderflow(self.line()));
        }
        let start = self.stack.len() - count;
        Ok(self.stack.drain(start..).map(|v| v.as_number()).collect())
    }

    // --- Operands ---

    fn read_u8(&mut self) -> VMResult<u8> {
        let byte = self.chunk.read_u8(self.ip).ok_or(RuntimeError::TruncatedInstruction {
            offset: self.op_start,
            line: self.line(),
        })?;
        self.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> VMResult<u16> {
        let value = self.chunk.read_u16(self.ip).ok_or(RuntimeError::TruncatedInstruction {
            offset: self.op_start,
            line: self.line(),
        })?;
        self.ip += 2;
        Ok(value)
    }

    // --- Slots ---

    fn global(&self, slot: u16) -> VMResult<&Value> {
        self.globals
            .get(slot as usize)
            .ok_or_else(|| RuntimeError::invalid_index("global", slot, self.line()))
    }

    fn global_mut(&mut self, slot: u16) -> VMResult<&mut Value> {
        let line = self.line();
        self.globals
            .get_mut(slot as usize)
            .ok_or_else(|| RuntimeError::invalid_index("global", slot, line))
    }

    fn array(&self, slot: u16) -> VMResult<&NumericArray> {
        match self.arrays.get(slot as usize) {
            Some(Some(array)) => Ok(array),
            Some(None) => Err(RuntimeError::ArrayNotDeclared {
                array: slot,
                line: self.line(),
            }),
            None => Err(RuntimeError::invalid_index("array", slot, self.line())),
        }
    }

    fn array_mut(&mut self, slot: u16) -> VMResult<&mut NumericArray> {
        let line = self.line();
        match self.arrays.get_mut(slot as usize) {
            Some(Some(array)) => Ok(array),
            Some(None) => Err(RuntimeError::ArrayNotDeclared { array: slot, line }),
            None => Err(RuntimeError::invalid_index("array", slot, line)),
        }
    }

    /// Source line of the current instruction.
    fn line(&self) -> u32 {
        self.chunk.get_line(self.op_start)
    }

    /// Read one whitespace-delimited token; empty at end of input.
    fn read_token(&mut self) -> io::Result<String> {
        let mut token = Vec::new();
        loop {
            let buf = self.input.fill_buf()?;
            if buf.is_empty() {
                break;
            }
            let mut used = 0;
            let mut done = false;
            for &b in buf {
                if b.is_ascii_whitespace() {
                    if !token.is_empty() {
                        done = true;
                        break;
                    }
                } else {
                    token.push(b);
                }
                used += 1;
            }
            self.input.consume(used);
            if done {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&token).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, Expr, Line, PrintItem, Program, Separator, Stmt, UnaryOp};
    use crate::bytecode::compiler::Compiler;
    use crate::bytecode::chunk::Constant;
    use pretty_assertions::assert_eq;

    fn program(lines: Vec<(u32, Vec<Stmt>)>) -> Program {
        Program::new(
            lines
                .into_iter()
                .map(|(number, statements)| Line::new(number, statements))
                .collect(),
        )
    }

    fn run_seeded(lines: Vec<(u32, Vec<Stmt>)>, input: &str, seed: u64) -> (VMResult<()>, String) {
        let chunk = Compiler::compile(&program(lines)).expect("compile error");
        let mut out = Vec::new();
        let result = {
            let config = VmConfig::default().with_seed(seed);
            let mut vm = Vm::with_config(&chunk, config, input.as_bytes(), &mut out);
            vm.run()
        };
        (result, String::from_utf8(out).unwrap())
    }

    fn run_source_with_input(lines: Vec<(u32, Vec<Stmt>)>, input: &str) -> (VMResult<()>, String) {
        run_seeded(lines, input, 1)
    }

    fn run_chunk(chunk: &Chunk, config: VmConfig) -> (VMResult<()>, String) {
        let mut out = Vec::new();
        let result = Vm::with_config(chunk, config, io::empty(), &mut out).run();
        (result, String::from_utf8(out).unwrap())
    }

    /// `I = 1: FOR_INIT` with the given end, returning the loop top.
    fn open_loop(chunk: &mut Chunk, end: f64) -> u16 {
        let one = chunk.add_constant(Constant::Number(1.0)) as u16;
        let end = chunk.add_constant(Constant::Number(end)) as u16;
        chunk.global_count = 1;
        chunk.write_op(OpCode::Constant, 10);
        chunk.write_u16(one, 10);
        chunk.write_op(OpCode::SetGlobal, 10);
        chunk.write_u16(0, 10);
        chunk.write_op(OpCode::Constant, 10);
        chunk.write_u16(end, 10);
        chunk.write_op(OpCode::Constant, 10);
        chunk.write_u16(one, 10);
        chunk.write_op(OpCode::ForInit, 10);
        chunk.write_u16(0, 10);
        chunk.current_offset() as u16
    }

    fn run_source(lines: Vec<(u32, Vec<Stmt>)>) -> (VMResult<()>, String) {
        run_source_with_input(lines, "")
    }

    fn output_of(lines: Vec<(u32, Vec<Stmt>)>) -> String {
        let (result, out) = run_source(lines);
        result.expect("runtime error");
        out
    }

    fn num(n: f64) -> Expr {
        Expr::number(n)
    }

    fn var(name: &str) -> Expr {
        Expr::ident(name)
    }

    #[test]
    fn test_simple_arithmetic() {
        let out = output_of(vec![(
            10,
            vec![Stmt::print(Expr::binary(num(1.0), BinaryOp::Add, num(2.0)))],
        )]);
        assert_eq!(out, "3\n");
    }

    #[test]
    fn test_operand_order() {
        let out = output_of(vec![(
            10,
            vec![
                Stmt::print(Expr::binary(num(8.0), BinaryOp::Subtract, num(3.0))),
                Stmt::print(Expr::binary(num(2.0), BinaryOp::Power, num(10.0))),
                Stmt::print(Expr::binary(num(7.0), BinaryOp::Divide, num(2.0))),
                Stmt::print(Expr::binary(num(2.0), BinaryOp::Less, num(3.0))),
            ],
        )]);
        assert_eq!(out, "5\n1024\n3.5\n1\n");
    }

    #[test]
    fn test_string_coercion() {
        let out = output_of(vec![(
            10,
            vec![
                Stmt::print(Expr::binary(Expr::string("X"), BinaryOp::Add, Expr::string("Y"))),
                Stmt::print(Expr::binary(Expr::string("A"), BinaryOp::Add, num(1.5))),
                Stmt::print(Expr::binary(Expr::string("3"), BinaryOp::Multiply, num(2.0))),
                Stmt::if_then(
                    Expr::binary(Expr::string("5"), BinaryOp::Equal, num(5.0)),
                    vec![Stmt::print(Expr::string("EQ"))],
                ),
            ],
        )]);
        assert_eq!(out, "XY\nA1.5\n6\nEQ\n");
    }

    #[test]
    fn test_logical_ops_canonical() {
        let out = output_of(vec![(
            10,
            vec![
                Stmt::print(Expr::logical(num(5.0), crate::ast::LogicalOp::And, Expr::string("x"))),
                Stmt::print(Expr::logical(num(0.0), crate::ast::LogicalOp::Or, Expr::string(""))),
                Stmt::print(Expr::unary(UnaryOp::Not, num(0.0))),
            ],
        )]);
        assert_eq!(out, "1\n0\n1\n");
    }

    #[test]
    fn test_print_separators() {
        let out = output_of(vec![
            (
                10,
                vec![Stmt::Print(vec![
                    PrintItem::new(num(1.0), Some(Separator::Comma)),
                    PrintItem::new(num(2.0), Some(Separator::Semicolon)),
                    PrintItem::new(num(3.0), None),
                ])],
            ),
            (20, vec![Stmt::Print(vec![PrintItem::new(Expr::string("A"), Some(Separator::Semicolon))])]),
            (30, vec![Stmt::Print(vec![])]),
        ]);
        assert_eq!(out, "1 23\nA\n");
    }

    #[test]
    fn test_for_next_counts_up() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(1.0), num(3.0), None)]),
            (20, vec![Stmt::print(var("I"))]),
            (30, vec![Stmt::next(Some("I"))]),
            (40, vec![Stmt::print(var("I"))]),
        ]);
        assert_eq!(out, "1\n2\n3\n4\n");
    }

    #[test]
    fn test_for_next_negative_step() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(3.0), num(1.0), Some(num(-1.0)))]),
            (20, vec![Stmt::print(var("I"))]),
            (30, vec![Stmt::next(None)]),
        ]);
        assert_eq!(out, "3\n2\n1\n");
    }

    #[test]
    fn test_for_next_zero_iterations() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(1.0), num(0.0), None)]),
            (20, vec![Stmt::print(Expr::string("body"))]),
            (30, vec![Stmt::next(None)]),
            (40, vec![Stmt::print(Expr::string("done"))]),
        ]);
        assert_eq!(out, "done\n");
    }

    #[test]
    fn test_nested_loops() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(1.0), num(2.0), None)]),
            (20, vec![Stmt::for_loop("J", num(1.0), num(2.0), None)]),
            (
                30,
                vec![Stmt::Print(vec![
                    PrintItem::new(var("I"), Some(Separator::Semicolon)),
                    PrintItem::new(var("J"), None),
                ])],
            ),
            (40, vec![Stmt::next(Some("J"))]),
            (50, vec![Stmt::next(Some("I"))]),
        ]);
        assert_eq!(out, "11\n12\n21\n22\n");
    }

    #[test]
    fn test_goto_skips_line() {
        let out = output_of(vec![
            (10, vec![Stmt::Goto(30)]),
            (20, vec![Stmt::print(Expr::string("skipped"))]),
            (30, vec![Stmt::print(Expr::string("ok"))]),
        ]);
        assert_eq!(out, "ok\n");
    }

    #[test]
    fn test_nested_gosub() {
        let out = output_of(vec![
            (10, vec![Stmt::Gosub(100)]),
            (20, vec![Stmt::print(Expr::string("main"))]),
            (30, vec![Stmt::End]),
            (100, vec![Stmt::print(Expr::string("sub1 in"))]),
            (110, vec![Stmt::Gosub(200)]),
            (120, vec![Stmt::print(Expr::string("sub1 out"))]),
            (130, vec![Stmt::Return]),
            (200, vec![Stmt::print(Expr::string("sub2"))]),
            (210, vec![Stmt::Return]),
        ]);
        assert_eq!(out, "sub1 in\nsub2\nsub1 out\nmain\n");
    }

    #[test]
    fn test_return_without_gosub() {
        let (result, _) = run_source(vec![(10, vec![Stmt::Return])]);
        assert!(matches!(result, Err(RuntimeError::ReturnWithoutGosub(10))));
    }

    #[test]
    fn test_arrays() {
        let out = output_of(vec![
            (10, vec![Stmt::dim("A", vec![num(3.0), num(4.0)])]),
            (
                20,
                vec![Stmt::Assignment {
                    target: Expr::index("A", vec![num(2.0), num(3.0)]),
                    value: num(7.0),
                }],
            ),
            (30, vec![Stmt::print(Expr::index("a", vec![num(2.0), num(3.0)]))]),
            (40, vec![Stmt::print(Expr::index("A", vec![num(0.0), num(0.0)]))]),
        ]);
        assert_eq!(out, "7\n0\n");
    }

    #[test]
    fn test_array_errors() {
        let (result, _) = run_source(vec![
            (10, vec![Stmt::dim("A", vec![num(3.0), num(4.0)])]),
            (20, vec![Stmt::print(Expr::index("A", vec![num(3.0), num(0.0)]))]),
        ]);
        assert!(matches!(result, Err(RuntimeError::IndexOutOfBounds { line: 20, .. })));

        let (result, _) = run_source(vec![(10, vec![Stmt::print(Expr::index("B", vec![num(0.0)]))])]);
        assert!(matches!(result, Err(RuntimeError::ArrayNotDeclared { .. })));

        let (result, _) = run_source(vec![
            (10, vec![Stmt::dim("A", vec![num(3.0)])]),
            (20, vec![Stmt::print(Expr::index("A", vec![num(0.0), num(0.0)]))]),
        ]);
        assert!(matches!(result, Err(RuntimeError::DimensionMismatch { expected: 1, got: 2, .. })));

        let (result, _) = run_source(vec![(10, vec![Stmt::dim("A", vec![num(-1.0)])])]);
        assert!(matches!(result, Err(RuntimeError::InvalidDimension { .. })));
    }

    #[test]
    fn test_runtime_errors_carry_line() {
        let (result, _) = run_source(vec![
            (10, vec![Stmt::assign("Z", num(0.0))]),
            (20, vec![Stmt::print(Expr::binary(num(1.0), BinaryOp::Divide, var("Z")))]),
        ]);
        let err = result.unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero(20)));
        assert_eq!(err.line(), Some(20));

        let (result, _) = run_source(vec![(5, vec![Stmt::print(Expr::unary(UnaryOp::Negate, Expr::string("1")))])]);
        assert!(matches!(result, Err(RuntimeError::NegateNonNumber(5))));
    }

    #[test]
    fn test_builtin_calls() {
        let out = output_of(vec![(
            10,
            vec![
                Stmt::print(Expr::call("LEFT$", vec![Expr::string("HELLO"), num(2.0)])),
                Stmt::print(Expr::call("len", vec![Expr::string("abc")])),
                Stmt::print(Expr::binary(
                    Expr::call("SQR", vec![num(16.0)]),
                    BinaryOp::Add,
                    Expr::call("ABS", vec![num(-1.0)]),
                )),
            ],
        )]);
        assert_eq!(out, "HE\n3\n5\n");
    }

    #[test]
    fn test_builtin_domain_error() {
        let (result, _) = run_source(vec![(10, vec![Stmt::print(Expr::call("SQR", vec![num(-4.0)]))])]);
        assert!(matches!(result, Err(RuntimeError::Builtin { line: 10, .. })));
    }

    #[test]
    fn test_rnd_seeded() {
        let lines = || vec![(10, vec![Stmt::print(Expr::call("RND", vec![]))])];
        let (result, first) = run_seeded(lines(), "", 7);
        result.unwrap();
        let (result, second) = run_seeded(lines(), "", 7);
        result.unwrap();
        let (result, other) = run_seeded(lines(), "", 8);
        result.unwrap();
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn test_nested_loops_same_variable() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(1.0), num(2.0), None)]),
            (20, vec![Stmt::for_loop("I", num(1.0), num(3.0), None)]),
            (30, vec![Stmt::print(var("I"))]),
            (40, vec![Stmt::next(Some("I"))]),
            (50, vec![Stmt::next(Some("I"))]),
            (60, vec![Stmt::print(Expr::string("done"))]),
        ]);
        assert_eq!(out, "1\n2\n3\ndone\n");
    }

    #[test]
    fn test_zero_trip_skips_inner_next_of_same_variable() {
        let out = output_of(vec![
            (10, vec![Stmt::for_loop("I", num(5.0), num(1.0), None)]),
            (20, vec![Stmt::for_loop("I", num(1.0), num(2.0), None)]),
            (30, vec![Stmt::print(var("I"))]),
            (40, vec![Stmt::next(Some("I"))]),
            (50, vec![Stmt::next(Some("I"))]),
            (60, vec![Stmt::print(Expr::string("done"))]),
        ]);
        assert_eq!(out, "done\n");
    }

    #[test]
    fn test_hand_built_loop_chunk() {
        let mut chunk = Chunk::new();
        let top = open_loop(&mut chunk, 2.0);
        chunk.write_op(OpCode::GetGlobal, 20);
        chunk.write_u16(0, 20);
        chunk.write_op(OpCode::Print, 20);
        chunk.write_op(OpCode::PrintNl, 20);
        chunk.write_op(OpCode::Next, 30);
        chunk.write_u16(0, 30);
        chunk.write_u16(top, 30);
        chunk.write_op(OpCode::End, 40);

        assert_eq!(top, 15);
        let loaded = Chunk::from_bytes(&chunk.to_bytes().unwrap()).unwrap();
        let (result, out) = run_chunk(&loaded, VmConfig::default());
        result.unwrap();
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn test_zero_trip_without_next() {
        let mut chunk = Chunk::new();
        open_loop(&mut chunk, 0.0);
        chunk.write_op(OpCode::End, 10);
        let (result, _) = run_chunk(&chunk, VmConfig::default());
        assert!(matches!(result, Err(RuntimeError::ForWithoutNext(10))));
    }

    #[test]
    fn test_next_loop_top_mismatch() {
        let mut chunk = Chunk::new();
        let top = open_loop(&mut chunk, 3.0);
        chunk.write_op(OpCode::Next, 20);
        chunk.write_u16(0, 20);
        chunk.write_u16(top + 1, 20);
        chunk.write_op(OpCode::End, 20);
        let (result, _) = run_chunk(&chunk, VmConfig::default());
        assert!(matches!(result, Err(RuntimeError::LoopFrameMismatch(20))));
    }

    #[test]
    fn test_unknown_builtin_id() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::CallBuiltin, 5);
        chunk.write_u16(99, 5);
        chunk.write_byte(0, 5);
        chunk.write_op(OpCode::End, 5);
        let (result, _) = run_chunk(&chunk, VmConfig::default());
        assert!(matches!(
            result,
            Err(RuntimeError::UnknownBuiltin { index: 99, line: 5 })
        ));
    }

    #[test]
    fn test_array_element_limit() {
        let chunk = Compiler::compile(&program(vec![(
            10,
            vec![Stmt::dim("A", vec![num(4.0), num(4.0)])],
        )]))
        .unwrap();
        let config = VmConfig {
            max_array_elements: 10,
            ..VmConfig::default()
        };
        let (result, _) = run_chunk(&chunk, config);
        assert!(matches!(
            result,
            Err(RuntimeError::ArrayTooLarge { elements: 16, limit: 10, line: 10 })
        ));
    }

    #[test]
    fn test_input_tokens() {
        let (result, out) = run_source_with_input(
            vec![
                (
                    10,
                    vec![Stmt::Input {
                        prompt: Some("? ".to_string()),
                        variables: vec!["A".to_string(), "B$".to_string(), "C".to_string()],
                    }],
                ),
                (20, vec![Stmt::print(Expr::binary(var("A"), BinaryOp::Add, num(1.0)))]),
                (30, vec![Stmt::print(var("B$"))]),
                (40, vec![Stmt::print(Expr::call("LEN", vec![var("C")]))]),
            ],
            "  41\nhello\n",
        );
        result.unwrap();
        assert_eq!(out, "? 42\nhello\n0\n");
    }

    #[test]
    fn test_stack_overflow() {
        let chunk = Compiler::compile(&program(vec![(
            10,
            vec![Stmt::print(Expr::binary(num(1.0), BinaryOp::Add, num(2.0)))],
        )]))
        .unwrap();
        let mut out = Vec::new();
        let config = VmConfig::default().with_stack_capacity(1);
        let mut vm = Vm::with_config(&chunk, config, io::empty(), &mut out);
        assert!(matches!(vm.run(), Err(RuntimeError::StackOverflow { capacity: 1, line: 10 })));
    }

    #[test]
    fn test_call_stack_limit() {
        let chunk = Compiler::compile(&program(vec![(10, vec![Stmt::Gosub(10)])])).unwrap();
        let mut out = Vec::new();
        let config = VmConfig::default().with_call_stack_limit(8);
        let mut vm = Vm::with_config(&chunk, config, io::empty(), &mut out);
        assert!(matches!(vm.run(), Err(RuntimeError::CallStackOverflow { limit: 8, .. })));
    }

    #[test]
    fn test_stack_underflow_is_internal() {
        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Pop, 1);
        chunk.write_op(OpCode::End, 1);
        let mut out = Vec::new();
        let mut vm = Vm::with_io(&chunk, io::empty(), &mut out);
        let err = vm.run().unwrap_err();
        assert!(err.is_internal());
        assert!(!RuntimeError::DivisionByZero(1).is_internal());
    }

    #[test]
    fn test_corrupt_bytecode() {
        let mut chunk = Chunk::new();
        chunk.write_byte(99, 7);
        let mut vm = Vm::with_io(&chunk, io::empty(), io::sink());
        assert!(matches!(
            vm.run(),
            Err(RuntimeError::UnknownOpcode { opcode: 99, offset: 0, line: 7 })
        ));

        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::Print, 1);
        let mut vm = Vm::with_io(&chunk, io::empty(), io::sink());
        assert!(vm.run().unwrap_err().is_internal());

        let mut chunk = Chunk::new();
        chunk.write_op(OpCode::PrintNl, 1);
        let mut vm = Vm::with_io(&chunk, io::empty(), io::sink());
        assert!(matches!(vm.run(), Err(RuntimeError::RanPastEnd)));

        let mut chunk = Chunk::new();
        chunk.global_count = 1;
        chunk.write_op(OpCode::Next, 1);
        chunk.write_u16(0, 1);
        chunk.write_u16(0, 1);
        let mut vm = Vm::with_io(&chunk, io::empty(), io::sink());
        assert!(matches!(vm.run(), Err(RuntimeError::NextWithoutFor(1))));
    }

    #[test]
    fn test_vm_single_shot() {
        let chunk = Compiler::compile(&program(vec![(10, vec![Stmt::End])])).unwrap();
        let mut out = Vec::new();
        let mut vm = Vm::with_io(&chunk, io::empty(), &mut out);
        assert!(vm.run().is_ok());
        assert!(matches!(vm.run(), Err(RuntimeError::NotRunnable)));
    }

    #[test]
    fn test_globals_start_at_zero() {
        let chunk = Compiler::compile(&program(vec![(10, vec![Stmt::print(var("UNSET"))])])).unwrap();
        let mut out = Vec::new();
        let mut vm = Vm::with_io(&chunk, io::empty(), &mut out);
        vm.run().unwrap();
        assert_eq!(vm.globals(), &[Value::Number(0.0)]);
        drop(vm);
        assert_eq!(String::from_utf8(out).unwrap(), "0\n");
    }

    #[test]
    fn test_config_deserialize_defaults() {
        let config: VmConfig = serde_json::from_str(r#"{"seed": 9}"#).unwrap();
        assert_eq!(config.seed, Some(9));
        assert_eq!(config.stack_capacity, STACK_MAX);
        assert_eq!(config.call_stack_limit, CALL_STACK_MAX);
    }
}
