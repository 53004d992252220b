//! Statement compilation.

use crate::ast::expr::Expr;
use crate::ast::stmt::{PrintItem, Separator, Stmt};
use crate::error::CompileError;

use super::chunk::Constant;
use super::compiler::{CompileResult, Compiler, LoopEntry};
use super::instruction::OpCode;

impl Compiler {
    /// Compile a statement.
    pub fn compile_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Assignment { target, value } => self.compile_assignment(target, value),
            Stmt::Print(items) => self.compile_print(items),
            Stmt::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch.as_deref()),
            Stmt::For {
                variable,
                start,
                end,
                step,
            } => self.compile_for(variable, start, end, step.as_ref()),
            Stmt::Next(variable) => self.compile_next(variable.as_deref()),
            Stmt::Goto(target) => {
                self.emit_line_jump(OpCode::Jump, *target);
                Ok(())
            }
            Stmt::Gosub(target) => {
                self.emit_line_jump(OpCode::Gosub, *target);
                Ok(())
            }
            Stmt::Return => {
                self.emit_op(OpCode::Return);
                Ok(())
            }
            Stmt::End => {
                self.emit_op(OpCode::End);
                Ok(())
            }
            Stmt::Rem(_) => Ok(()),
            Stmt::Dim { name, sizes } => self.compile_dim(name, sizes),
            Stmt::Input { prompt, variables } => self.compile_input(prompt.as_deref(), variables),
        }
    }

    fn compile_assignment(&mut self, target: &Expr, value: &Expr) -> CompileResult<()> {
        match target {
            Expr::Identifier(name) => {
                self.compile_expr(value)?;
                let slot = self.global_slot(name)?;
                self.emit_op(OpCode::SetGlobal);
                self.emit_u16(slot);
            }
            Expr::ArrayAccess { name, indices } => {
                let dims = self.count_operand(indices.len(), "array dimensions")?;
                for index in indices {
                    self.compile_expr(index)?;
                }
                self.compile_expr(value)?;
                let slot = self.array_slot(name)?;
                self.emit_op(OpCode::SetArray);
                self.emit_u16(slot);
                self.emit_byte(dims);
            }
            _ => return Err(CompileError::InvalidAssignmentTarget(self.line)),
        }
        Ok(())
    }

    fn compile_print(&mut self, items: &[PrintItem]) -> CompileResult<()> {
        for item in items {
            self.compile_expr(&item.value)?;
            self.emit_op(OpCode::Print);
            if item.separator == Some(Separator::Comma) {
                self.emit_constant(Constant::String(" ".to_string()))?;
                self.emit_op(OpCode::Print);
            }
        }
        // A trailing separator suppresses the newline.
        if items.last().and_then(|item| item.separator).is_none() {
            self.emit_op(OpCode::PrintNl);
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> CompileResult<()> {
        self.compile_expr(condition)?;
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);

        for stmt in then_branch {
            self.compile_stmt(stmt)?;
        }

        match else_branch {
            Some(else_branch) => {
                let end_jump = self.emit_jump(OpCode::Jump);
                self.patch_jump(else_jump)?;
                for stmt in else_branch {
                    self.compile_stmt(stmt)?;
                }
                self.patch_jump(end_jump)
            }
            None => self.patch_jump(else_jump),
        }
    }

    fn compile_for(
        &mut self,
        variable: &str,
        start: &Expr,
        end: &Expr,
        step: Option<&Expr>,
    ) -> CompileResult<()> {
        let slot = self.global_slot(variable)?;

        self.compile_expr(start)?;
        self.emit_op(OpCode::SetGlobal);
        self.emit_u16(slot);

        self.compile_expr(end)?;
        match step {
            Some(step) => self.compile_expr(step)?,
            None => self.emit_constant(Constant::Number(1.0))?,
        }

        self.emit_op(OpCode::ForInit);
        self.emit_u16(slot);

        self.loops.push(LoopEntry {
            variable: variable.to_ascii_uppercase(),
            slot,
            top: self.current_offset(),
            line: self.line,
        });
        Ok(())
    }

    fn compile_next(&mut self, variable: Option<&str>) -> CompileResult<()> {
        let Some(entry) = self.loops.pop() else {
            return Err(CompileError::NextWithoutFor(self.line));
        };

        if let Some(name) = variable {
            let found = name.to_ascii_uppercase();
            if found != entry.variable {
                return Err(CompileError::NextMismatch {
                    expected: entry.variable,
                    found,
                    line: self.line,
                });
            }
        }

        let top = self.offset_operand(entry.top, self.line)?;
        self.emit_op(OpCode::Next);
        self.emit_u16(entry.slot);
        self.emit_u16(top);
        Ok(())
    }

    fn compile_dim(&mut self, name: &str, sizes: &[Expr]) -> CompileResult<()> {
        let dims = self.count_operand(sizes.len(), "array dimensions")?;
        for size in sizes {
            self.compile_expr(size)?;
        }
        let slot = self.array_slot(name)?;
        self.emit_op(OpCode::Dim);
        self.emit_u16(slot);
        self.emit_byte(dims);
        Ok(())
    }

    fn compile_input(&mut self, prompt: Option<&str>, variables: &[String]) -> CompileResult<()> {
        if let Some(prompt) = prompt {
            self.emit_constant(Constant::String(prompt.to_string()))?;
            self.emit_op(OpCode::Print);
        }
        for name in variables {
            let slot = self.global_slot(name)?;
            self.emit_op(OpCode::Input);
            self.emit_u16(slot);
        }
        Ok(())
    }
}
