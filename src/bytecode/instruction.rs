//! Opcode definitions shared by the compiler, VM and disassembler.
//!
//! Every instruction is one opcode byte followed by zero, one or two
//! big-endian operands. Operand widths live in one table so that the
//! emitter, the dispatch loop and the disassembler agree on instruction
//! lengths. Opcode byte values are part of the chunk format.

/// Opcodes for the bytecode virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ============ Constants & Stack ============
    /// Push a constant from the pool: CONSTANT <index:u16>
    Constant = 0,
    /// Discard the top value
    Pop,

    // ============ Arithmetic ============
    /// a + b (concatenates when either side is a string)
    Add,
    /// a - b
    Sub,
    /// a * b
    Mul,
    /// a / b
    Div,
    /// a ^ b
    Pow,
    /// a MOD b
    Mod,
    /// -a
    Neg,

    // ============ Logic ============
    /// NOT a
    Not,
    /// a AND b
    And,
    /// a OR b
    Or,

    // ============ Comparison ============
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,

    // ============ Control Flow ============
    /// Absolute jump: JUMP <offset:u16>
    Jump,
    /// Pop and jump when falsy: JUMP_IF_FALSE <offset:u16>
    JumpIfFalse,
    /// Push return address and jump: GOSUB <offset:u16>
    Gosub,
    /// Pop return address and jump to it
    Return,
    /// Stop execution
    End,

    // ============ Loops ============
    /// Pop step and end, open a loop frame: FOR_INIT <slot:u16>
    ForInit,
    /// Step the loop variable: NEXT <slot:u16> <top:u16>
    Next,

    // ============ Variables ============
    /// GET_GLOBAL <slot:u16>
    GetGlobal,
    /// SET_GLOBAL <slot:u16>
    SetGlobal,
    /// Pop indices, push element: GET_ARRAY <array:u16> <dims:u8>
    GetArray,
    /// Pop value then indices, store element: SET_ARRAY <array:u16> <dims:u8>
    SetArray,

    // ============ I/O ============
    /// Pop and print without newline
    Print,
    /// Print a newline
    PrintNl,
    /// Read one token into a global: INPUT <slot:u16>
    Input,

    // ============ Builtins & Arrays ============
    /// CALL_BUILTIN <builtin:u16> <argc:u8>
    CallBuiltin,
    /// Pop sizes, allocate array: DIM <array:u16> <dims:u8>
    Dim,
}

/// Name and operand layout of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDefinition {
    pub name: &'static str,
    pub operand_widths: &'static [u8],
}

const NONE: &[u8] = &[];
const U16: &[u8] = &[2];
const U16_U16: &[u8] = &[2, 2];
const U16_U8: &[u8] = &[2, 1];

impl OpCode {
    /// All opcodes in byte order.
    pub const ALL: [OpCode; 34] = [
        OpCode::Constant,
        OpCode::Pop,
        OpCode::Add,
        OpCode::Sub,
        OpCode::Mul,
        OpCode::Div,
        OpCode::Pow,
        OpCode::Mod,
        OpCode::Neg,
        OpCode::Not,
        OpCode::And,
        OpCode::Or,
        OpCode::Eq,
        OpCode::Neq,
        OpCode::Gt,
        OpCode::Gte,
        OpCode::Lt,
        OpCode::Lte,
        OpCode::Jump,
        OpCode::JumpIfFalse,
        OpCode::Gosub,
        OpCode::Return,
        OpCode::End,
        OpCode::ForInit,
        OpCode::Next,
        OpCode::GetGlobal,
        OpCode::SetGlobal,
        OpCode::GetArray,
        OpCode::SetArray,
        OpCode::Print,
        OpCode::PrintNl,
        OpCode::Input,
        OpCode::CallBuiltin,
        OpCode::Dim,
    ];

    /// Convert a byte to an opcode.
    pub fn from_u8(byte: u8) -> Option<OpCode> {
        Self::ALL.get(byte as usize).copied()
    }

    pub fn definition(self) -> OpDefinition {
        let (name, operand_widths) = match self {
            OpCode::Constant => ("CONSTANT", U16),
            OpCode::Pop => ("POP", NONE),
            OpCode::Add => ("ADD", NONE),
            OpCode::Sub => ("SUB", NONE),
            OpCode::Mul => ("MUL", NONE),
            OpCode::Div => ("DIV", NONE),
            OpCode::Pow => ("POW", NONE),
            OpCode::Mod => ("MOD", NONE),
            OpCode::Neg => ("NEG", NONE),
            OpCode::Not => ("NOT", NONE),
            OpCode::And => ("AND", NONE),
            OpCode::Or => ("OR", NONE),
            OpCode::Eq => ("EQ", NONE),
            OpCode::Neq => ("NEQ", NONE),
            OpCode::Gt => ("GT", NONE),
            OpCode::Gte => ("GTE", NONE),
            OpCode::Lt => ("LT", NONE),
            OpCode::Lte => ("LTE", NONE),
            OpCode::Jump => ("JUMP", U16),
            OpCode::JumpIfFalse => ("JUMP_IF_FALSE", U16),
            OpCode::Gosub => ("GOSUB", U16),
            OpCode::Return => ("RETURN", NONE),
            OpCode::End => ("END", NONE),
            OpCode::ForInit => ("FOR_INIT", U16),
            OpCode::Next => ("NEXT", U16_U16),
            OpCode::GetGlobal => ("GET_GLOBAL", U16),
            OpCode::SetGlobal => ("SET_GLOBAL", U16),
            OpCode::GetArray => ("GET_ARRAY", U16_U8),
            OpCode::SetArray => ("SET_ARRAY", U16_U8),
            OpCode::Print => ("PRINT", NONE),
            OpCode::PrintNl => ("PRINT_NL", NONE),
            OpCode::Input => ("INPUT", U16),
            OpCode::CallBuiltin => ("CALL_BUILTIN", U16_U8),
            OpCode::Dim => ("DIM", U16_U8),
        };
        OpDefinition {
            name,
            operand_widths,
        }
    }

    pub fn name(self) -> &'static str {
        self.definition().name
    }

    pub fn operand_widths(self) -> &'static [u8] {
        self.definition().operand_widths
    }

    /// Total size in bytes of this opcode's operands.
    pub fn operand_size(self) -> usize {
        self.operand_widths().iter().map(|w| *w as usize).sum()
    }

    /// Opcode byte plus operands.
    pub fn instruction_len(self) -> usize {
        1 + self.operand_size()
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> u8 {
        op as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for op in OpCode::ALL {
            assert_eq!(OpCode::from_u8(op as u8), Some(op));
        }
    }

    #[test]
    fn test_opcode_byte_values() {
        assert_eq!(OpCode::Constant as u8, 0);
        assert_eq!(OpCode::Lte as u8, 17);
        assert_eq!(OpCode::Jump as u8, 18);
        assert_eq!(OpCode::End as u8, 22);
        assert_eq!(OpCode::Dim as u8, 33);
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(OpCode::from_u8(34), None);
        assert_eq!(OpCode::from_u8(255), None);
    }

    #[test]
    fn test_operand_sizes() {
        assert_eq!(OpCode::Add.instruction_len(), 1);
        assert_eq!(OpCode::Constant.instruction_len(), 3);
        assert_eq!(OpCode::Next.instruction_len(), 5);
        assert_eq!(OpCode::CallBuiltin.instruction_len(), 4);
        assert_eq!(OpCode::GetArray.operand_widths(), &[2, 1]);
    }
}
