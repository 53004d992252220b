//! Bytecode module for the Zork BASIC VM.
//!
//! # Architecture
//!
//! - `instruction`: OpCode definitions and the operand-width table
//! - `chunk`: Bytecode chunks containing instructions and constant pools
//! - `format`: The versioned `ZBC` binary encoding of a chunk
//! - `compiler`: Transforms a line-numbered program into bytecode
//! - `builtins`: Host functions called by numeric id
//! - `vm`: Stack-based virtual machine for executing bytecode
//! - `disassembler`: Debug output for bytecode inspection

pub mod builtins;
pub mod chunk;
pub mod compiler;
mod compiler_exprs;
mod compiler_stmts;
pub mod disassembler;
pub mod format;
pub mod instruction;
pub mod value;
pub mod vm;
mod vm_ops;

pub use builtins::{Builtin, BuiltinTable, BUILTINS};
pub use chunk::{Chunk, Constant};
pub use compiler::{compile, Compiler};
pub use disassembler::{disassemble_instruction, Disassembly};
pub use format::{FORMAT_VERSION, MAGIC};
pub use instruction::OpCode;
pub use value::Value;
pub use vm::{Vm, VmConfig};
