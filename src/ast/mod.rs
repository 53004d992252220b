//! Program tree consumed by the bytecode compiler.
//!
//! The parser that builds these trees lives outside this crate; the
//! constructor helpers let hosts and tests assemble programs directly.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, LogicalOp, UnaryOp};
pub use stmt::{Line, PrintItem, Program, Separator, Stmt};
