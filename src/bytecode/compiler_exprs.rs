//! Expression compilation. Operands are emitted before their operator.

use crate::ast::expr::{BinaryOp, Expr, LogicalOp, UnaryOp};
use crate::error::CompileError;

use super::builtins;
use super::chunk::Constant;
use super::compiler::{CompileResult, Compiler};
use super::instruction::OpCode;

impl Compiler {
    /// Compile an expression, leaving its value on the stack.
    pub fn compile_expr(&mut self, expr: &Expr) -> CompileResult<()> {
        match expr {
            Expr::Number(n) => self.emit_constant(Constant::Number(*n)),
            Expr::String(s) => self.emit_constant(Constant::String(s.clone())),
            Expr::Identifier(name) => {
                let slot = self.global_slot(name)?;
                self.emit_op(OpCode::GetGlobal);
                self.emit_u16(slot);
                Ok(())
            }
            Expr::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(binary_opcode(*operator));
                Ok(())
            }
            Expr::Logical {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit_op(match operator {
                    LogicalOp::And => OpCode::And,
                    LogicalOp::Or => OpCode::Or,
                });
                Ok(())
            }
            Expr::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit_op(OpCode::Neg),
                    UnaryOp::Not => self.emit_op(OpCode::Not),
                    UnaryOp::Plus => {}
                }
                Ok(())
            }
            Expr::Call { name, arguments } => self.compile_call(name, arguments),
            Expr::ArrayAccess { name, indices } => {
                let dims = self.count_operand(indices.len(), "array dimensions")?;
                for index in indices {
                    self.compile_expr(index)?;
                }
                let slot = self.array_slot(name)?;
                self.emit_op(OpCode::GetArray);
                self.emit_u16(slot);
                self.emit_byte(dims);
                Ok(())
            }
        }
    }

    fn compile_call(&mut self, name: &str, arguments: &[Expr]) -> CompileResult<()> {
        let id = builtins::lookup(name)
            .ok_or_else(|| CompileError::unknown_function(name, self.line))?;
        let argc = self.count_operand(arguments.len(), "call arguments")?;
        for arg in arguments {
            self.compile_expr(arg)?;
        }
        self.emit_op(OpCode::CallBuiltin);
        self.emit_u16(id);
        self.emit_byte(argc);
        Ok(())
    }
}

fn binary_opcode(operator: BinaryOp) -> OpCode {
    match operator {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Subtract => OpCode::Sub,
        BinaryOp::Multiply => OpCode::Mul,
        BinaryOp::Divide => OpCode::Div,
        BinaryOp::Power => OpCode::Pow,
        BinaryOp::Modulo => OpCode::Mod,
        BinaryOp::Equal => OpCode::Eq,
        BinaryOp::NotEqual => OpCode::Neq,
        BinaryOp::Less => OpCode::Lt,
        BinaryOp::LessEqual => OpCode::Lte,
        BinaryOp::Greater => OpCode::Gt,
        BinaryOp::GreaterEqual => OpCode::Gte,
    }
}
