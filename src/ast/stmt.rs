//! Statement AST nodes.

use crate::ast::expr::Expr;

/// A whole program: numbered lines in ascending order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub lines: Vec<Line>,
}

impl Program {
    pub fn new(lines: Vec<Line>) -> Self {
        Self { lines }
    }
}

/// One numbered source line holding one or more statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: u32,
    pub statements: Vec<Stmt>,
}

impl Line {
    pub fn new(number: u32, statements: Vec<Stmt>) -> Self {
        Self { number, statements }
    }
}

/// Separator following a PRINT item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Separator {
    /// `,` prints a space.
    Comma,
    /// `;` prints nothing.
    Semicolon,
}

/// A single PRINT item with its trailing separator, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintItem {
    pub value: Expr,
    pub separator: Option<Separator>,
}

impl PrintItem {
    pub fn new(value: Expr, separator: Option<Separator>) -> Self {
        Self { value, separator }
    }
}

/// All statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// LET A = expr, A(I) = expr
    Assignment { target: Expr, value: Expr },
    /// PRINT a; b, c
    Print(Vec<PrintItem>),
    /// IF cond THEN ... ELSE ...
    If {
        condition: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },
    /// FOR I = start TO end STEP step
    For {
        variable: String,
        start: Expr,
        end: Expr,
        step: Option<Expr>,
    },
    /// NEXT or NEXT I
    Next(Option<String>),
    /// GOTO line
    Goto(u32),
    /// GOSUB line
    Gosub(u32),
    /// RETURN
    Return,
    /// END
    End,
    /// REM comment
    Rem(String),
    /// DIM A(3, 4)
    Dim { name: String, sizes: Vec<Expr> },
    /// INPUT "prompt"; A, B$
    Input {
        prompt: Option<String>,
        variables: Vec<String>,
    },
}

impl Stmt {
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Stmt::Assignment {
            target: Expr::Identifier(name.into()),
            value,
        }
    }

    /// PRINT of a single value followed by a newline.
    pub fn print(value: Expr) -> Self {
        Stmt::Print(vec![PrintItem::new(value, None)])
    }

    pub fn if_then(condition: Expr, then_branch: Vec<Stmt>) -> Self {
        Stmt::If {
            condition,
            then_branch,
            else_branch: None,
        }
    }

    pub fn for_loop(variable: impl Into<String>, start: Expr, end: Expr, step: Option<Expr>) -> Self {
        Stmt::For {
            variable: variable.into(),
            start,
            end,
            step,
        }
    }

    pub fn next(variable: Option<&str>) -> Self {
        Stmt::Next(variable.map(str::to_string))
    }

    pub fn dim(name: impl Into<String>, sizes: Vec<Expr>) -> Self {
        Stmt::Dim {
            name: name.into(),
            sizes,
        }
    }
}
