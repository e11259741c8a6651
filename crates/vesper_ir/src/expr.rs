//! Expression trees for behavioral continuous assignments.
//!
//! Expressions exist only between source reading and the `proc` transform,
//! which lowers them to primitive cells. They still contribute to a module's
//! content fingerprint while present.

use crate::cell::SigRef;
use serde::{Deserialize, Serialize};

/// A binary operator in a continuous assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    /// Bitwise AND (`&`).
    And,
    /// Bitwise OR (`|`).
    Or,
    /// Bitwise XOR (`^`).
    Xor,
    /// Addition (`+`).
    Add,
    /// Subtraction (`-`).
    Sub,
}

impl BinaryOp {
    /// Returns the primitive cell type this operator lowers to.
    pub fn cell_type(self) -> &'static str {
        match self {
            BinaryOp::And => "$and",
            BinaryOp::Or => "$or",
            BinaryOp::Xor => "$xor",
            BinaryOp::Add => "$add",
            BinaryOp::Sub => "$sub",
        }
    }
}

/// A unary operator in a continuous assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Bitwise complement (`~`).
    Not,
}

impl UnaryOp {
    /// Returns the primitive cell type this operator lowers to.
    pub fn cell_type(self) -> &'static str {
        match self {
            UnaryOp::Not => "$not",
        }
    }
}

/// An expression on the right-hand side of a continuous assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// A wire reference or constant.
    Ref(SigRef),
    /// A unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// A binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Iterates over every wire name referenced by this expression.
    pub fn referenced_wires(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_wires(&mut out);
        out
    }

    fn collect_wires<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Ref(SigRef::Wire(name)) => out.push(name),
            Expr::Ref(SigRef::Bit(name, _)) => out.push(name),
            Expr::Ref(SigRef::Const { .. }) => {}
            Expr::Unary(_, a) => a.collect_wires(out),
            Expr::Binary(_, a, b) => {
                a.collect_wires(out);
                b.collect_wires(out);
            }
        }
    }
}
