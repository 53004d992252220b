//! Zork BASIC: a bytecode compiler and stack VM for a line-numbered BASIC dialect.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! - **Compile**: a [`Program`] of numbered lines becomes a [`Chunk`]
//! - **Store**: a chunk encodes to and decodes from the `ZBC` binary format
//! - **Run**: the [`Vm`] executes a chunk against an input and an output stream

#![allow(clippy::module_inception)]
#![allow(clippy::result_large_err)]
#![allow(clippy::new_without_default)]
#![allow(clippy::unnecessary_cast)]

pub mod ast;
pub mod bytecode;
pub mod error;

use std::io::{BufRead, Write};

pub use ast::Program;
pub use bytecode::{Chunk, Vm, VmConfig};
pub use error::{CompileError, DecodeError, EncodeError, RuntimeError, ZbasicError};

/// Compile a program to a chunk.
pub fn compile(program: &Program) -> Result<Chunk, CompileError> {
    bytecode::compile(program)
}

/// Compile and run a program with the default configuration.
pub fn run_program(
    program: &Program,
    input: impl BufRead,
    output: impl Write,
) -> Result<(), ZbasicError> {
    run_with_config(program, VmConfig::default(), input, output)
}

/// Compile and run a program with explicit VM limits and seed.
pub fn run_with_config(
    program: &Program,
    config: VmConfig,
    input: impl BufRead,
    output: impl Write,
) -> Result<(), ZbasicError> {
    let chunk = compile(program)?;
    let mut vm = Vm::with_config(&chunk, config, input, output);
    vm.run()?;
    Ok(())
}
