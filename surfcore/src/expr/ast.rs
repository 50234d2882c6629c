use surfprop::value::Value;

use crate::expr::math::{MathConst, MathFn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
    Eq,
    StrictEq,
    Ne,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuiting operators; they yield one of their operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Nullish,
}

/// Host function an expression may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    Prop,
    Osc,
    Bind,
    Url,
    Math(MathFn),
}

impl Callee {
    pub fn name(&self) -> String {
        match self {
            Callee::Prop => "prop".into(),
            Callee::Osc => "osc".into(),
            Callee::Bind => "bind".into(),
            Callee::Url => "url".into(),
            Callee::Math(f) => format!("math.{f}"),
        }
    }

    /// Accepted argument count as `(min, max)`; `None` means variadic.
    pub fn arity(&self) -> (usize, Option<usize>) {
        match self {
            Callee::Prop => (0, Some(2)),
            Callee::Osc | Callee::Bind | Callee::Url => (1, Some(2)),
            Callee::Math(f) => f.arity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Array(Vec<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Logical(LogicalOp, Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Call(Callee, Vec<Expr>),
    MathConst(MathConst),
    Index(Box<Expr>, Box<Expr>),
}
