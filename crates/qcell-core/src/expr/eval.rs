//! Whitelisted expression trees and their evaluation.

use rayon::prelude::*;

use crate::error::{Error, Result};

use super::ops::{BinaryFn, BinaryOp, Number, OPERATORS, UnaryFn, UnaryOp};
use super::syntax::{self, Syntax};
use super::token::{Token, TokenKind, tokenize};

/// A parsed expression built only from the operator table.
///
/// Every operator node holds the function it was resolved to, so evaluation
/// never looks anything up.
#[derive(Debug, Clone)]
pub enum Expression {
    Literal(Number),
    Binary {
        op: BinaryOp,
        apply: BinaryFn,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        apply: UnaryFn,
        operand: Box<Expression>,
    },
}

impl Expression {
    /// Parse a complete expression. Any free name is rejected.
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        Self::from_tokens(source, &tokens)
    }

    /// Parse `source` with every `placeholder` identifier replaced by `value`.
    ///
    /// Replacement is per token: `t` inside `total` is left alone, and a
    /// negative value stays one literal (`t**2` at `-3` is `9`).
    pub fn parse_with(source: &str, placeholder: &str, value: Number) -> Result<Self> {
        let tokens = tokenize(source)?;
        Self::from_tokens(source, &substitute(&tokens, placeholder, value))
    }

    fn from_tokens(source: &str, tokens: &[Token]) -> Result<Self> {
        let tree = syntax::parse(source, tokens)?;
        lower(&tree)
    }

    pub fn evaluate(&self) -> Result<Number> {
        match self {
            Expression::Literal(n) => Ok(*n),
            Expression::Binary {
                apply, lhs, rhs, ..
            } => {
                let a = lhs.evaluate()?;
                let b = rhs.evaluate()?;
                apply(a, b)
            }
            Expression::Unary { apply, operand, .. } => apply(operand.evaluate()?),
        }
    }
}

fn substitute(tokens: &[Token], placeholder: &str, value: Number) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| match &t.kind {
            TokenKind::Ident(name) if name == placeholder => Token {
                kind: TokenKind::Num(value),
                span: t.span,
            },
            _ => t.clone(),
        })
        .collect()
}

fn lower(tree: &Syntax) -> Result<Expression> {
    match tree {
        Syntax::Number(n) => Ok(Expression::Literal(*n)),
        Syntax::Binary { op, lhs, rhs } => {
            let apply = OPERATORS.binary(*op).ok_or_else(|| {
                Error::UnsupportedExpression(format!("operator `{}`", op.symbol()))
            })?;
            Ok(Expression::Binary {
                op: *op,
                apply,
                lhs: Box::new(lower(lhs)?),
                rhs: Box::new(lower(rhs)?),
            })
        }
        Syntax::Unary { op, operand } => {
            let apply = OPERATORS.unary(*op).ok_or_else(|| {
                Error::UnsupportedExpression(format!("unary operator `{}`", op.symbol()))
            })?;
            Ok(Expression::Unary {
                op: *op,
                apply,
                operand: Box::new(lower(operand)?),
            })
        }
        Syntax::Name(name) => Err(Error::UnsupportedExpression(format!("name `{name}`"))),
        Syntax::Str(_) => Err(Error::UnsupportedExpression(
            "string literal".to_string(),
        )),
        Syntax::Compare { op, .. } => {
            Err(Error::UnsupportedExpression(format!("comparison `{op}`")))
        }
        Syntax::BoolOp { op, .. } => Err(Error::UnsupportedExpression(format!(
            "boolean operator `{op}`"
        ))),
        Syntax::Not(_) => Err(Error::UnsupportedExpression(
            "boolean operator `not`".to_string(),
        )),
        Syntax::Call { func, .. } => Err(Error::UnsupportedExpression(match func.as_ref() {
            Syntax::Name(name) => format!("call to `{name}`"),
            _ => "function call".to_string(),
        })),
    }
}

/// Parse and evaluate a closed expression.
pub fn eval_str(source: &str) -> Result<Number> {
    Expression::parse(source)?.evaluate()
}

/// Evaluate `source` once per value, substituting the value for `placeholder`.
///
/// Returns exactly one number per input value in input order, or the first
/// error in input order.
pub fn project(source: &str, placeholder: &str, values: &[Number]) -> Result<Vec<Number>> {
    project_each(source, placeholder, values)?
        .into_iter()
        .collect()
}

/// Like [`project`], but keeps going past failures and reports one result
/// per value.
///
/// The outer `Result` only fails when `source` cannot be tokenized.
pub fn project_each(
    source: &str,
    placeholder: &str,
    values: &[Number],
) -> Result<Vec<Result<Number>>> {
    let tokens = tokenize(source)?;
    Ok(values
        .par_iter()
        .map(|value| {
            Expression::from_tokens(source, &substitute(&tokens, placeholder, *value))?
                .evaluate()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Number> {
        values.iter().copied().map(Number::Int).collect()
    }

    #[test]
    fn test_caret_is_xor() {
        assert_eq!(eval_str("2^6").unwrap(), Number::Int(4));
        assert_eq!(eval_str("2**6").unwrap(), Number::Int(64));
    }

    #[test]
    fn test_mixed_expression() {
        let result = eval_str("1 + 2*3**(4^5) / (6 + -7)").unwrap();
        assert!(!result.is_int());
        assert_eq!(result, Number::Float(-5.0));
    }

    #[test]
    fn test_power_and_negation() {
        assert_eq!(eval_str("-2**2").unwrap(), Number::Int(-4));
        assert_eq!(eval_str("(-2)**2").unwrap(), Number::Int(4));
        assert_eq!(eval_str("2**-1").unwrap(), Number::Float(0.5));
        assert_eq!(eval_str("--3").unwrap(), Number::Int(3));
    }

    #[test]
    fn test_project_squares() {
        let result = project("t**2", "t", &ints(&[1, 2, 3, 4])).unwrap();
        assert_eq!(result, ints(&[1, 4, 9, 16]));
    }

    #[test]
    fn test_project_empty_input() {
        assert!(project("t + 1", "t", &[]).unwrap().is_empty());
    }

    #[test]
    fn test_negative_substitution_is_one_literal() {
        let result = project("t**2", "t", &ints(&[-3])).unwrap();
        assert_eq!(result, ints(&[9]));
    }

    #[test]
    fn test_placeholder_inside_longer_name() {
        let err = project("total + t", "t", &ints(&[1])).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExpression(ref m) if m.contains("total")));
    }

    #[test]
    fn test_project_fails_fast_on_first_error() {
        let err = project("1 / t", "t", &ints(&[1, 0, 2])).unwrap_err();
        assert!(matches!(err, Error::Evaluation(_)));
    }

    #[test]
    fn test_project_each_reports_per_value() {
        let results = project_each("1 / t", "t", &ints(&[1, 0, 4])).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), Number::Float(1.0));
        assert!(results[1].is_err());
        assert_eq!(*results[2].as_ref().unwrap(), Number::Float(0.25));
    }

    #[test]
    fn test_rejects_outside_table() {
        let cases = [
            ("abs(1)", "call to `abs`"),
            ("x + 1", "name `x`"),
            ("1 < 2", "comparison `<`"),
            ("1 and 2", "boolean operator `and`"),
            ("not 1", "boolean operator `not`"),
            ("'a'", "string literal"),
            ("7 // 2", "operator `//`"),
            ("7 % 2", "operator `%`"),
            ("1 & 2", "operator `&`"),
            ("1 << 2", "operator `<<`"),
            ("+1", "unary operator `+`"),
            ("~1", "unary operator `~`"),
        ];
        for (input, expected) in cases {
            match eval_str(input) {
                Err(Error::UnsupportedExpression(msg)) => {
                    assert!(msg.contains(expected), "{input}: {msg}")
                }
                other => panic!("{input}: expected UnsupportedExpression, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_arithmetic_faults() {
        assert!(matches!(eval_str("1/0"), Err(Error::Evaluation(_))));
        assert!(matches!(eval_str("1.5 ^ 2"), Err(Error::Evaluation(_))));
    }

    #[test]
    fn test_limits_fit_a_small_stack() {
        use crate::expr::syntax::{MAX_DEPTH, MAX_NODES};

        let worker = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(|| {
                let nested = format!("{}t{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
                assert_eq!(eval_str(&nested.replace('t', "1")).unwrap(), Number::Int(1));

                let sum = vec!["1"; MAX_NODES + 1].join("+");
                assert_eq!(eval_str(&sum).unwrap(), Number::Int(MAX_NODES as i64 + 1));

                let chain = vec!["t"; MAX_NODES + 1].join("-");
                let result = Expression::parse_with(&chain, "t", Number::Int(2))
                    .unwrap()
                    .evaluate()
                    .unwrap();
                assert_eq!(result, Number::Int(2 - 2 * MAX_NODES as i64));

                let negations = format!("{}1", "-".repeat(MAX_DEPTH));
                assert_eq!(eval_str(&negations).unwrap(), Number::Int(1));

                let too_long = vec!["1"; 5000].join("+");
                assert!(matches!(eval_str(&too_long), Err(Error::Parse(_))));
                let too_deep = format!("{}1{}", "(".repeat(2000), ")".repeat(2000));
                assert!(matches!(eval_str(&too_deep), Err(Error::Parse(_))));
            })
            .unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_malformed_is_parse_error() {
        assert!(matches!(eval_str("(1 + 2"), Err(Error::Parse(_))));
        assert!(matches!(eval_str(""), Err(Error::Parse(_))));
    }
}
