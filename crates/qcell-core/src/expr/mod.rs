//! Safe evaluation of one-variable arithmetic expressions.
//!
//! Expressions are parsed into a tree whose operators all come from a fixed
//! table (`+ - * / ** ^` and unary `-`). Names, calls, comparisons and every
//! other construct are rejected before anything is evaluated. `^` is bitwise
//! xor; exponentiation is `**`.

mod eval;
mod ops;
mod syntax;
mod token;

pub use eval::{Expression, eval_str, project, project_each};
pub use ops::{
    BinaryFn, BinaryOp, Number, OPERATORS, OperatorTable, UnaryFn, UnaryOp, add, bit_and, bit_or,
    floor_div, modulo, mul, neg, pow, sub, true_div, xor,
};
