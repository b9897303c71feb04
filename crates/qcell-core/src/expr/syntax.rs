//! Recursive-descent parser producing a syntax tree.
//!
//! The grammar is wider than what the evaluator accepts. Parsing the full
//! Python-like surface lets the lowering step in `eval` report the exact
//! construct it refuses instead of a generic syntax error.

use crate::error::Result;

use super::ops::{BinaryOp, Number, UnaryOp};
use super::token::{Span, Token, TokenKind, parse_err};

/// Maximum nesting of parentheses, unary operators and calls.
///
/// Each level costs a full descent through the precedence ladder, so this
/// bounds parser stack use.
pub(crate) const MAX_DEPTH: usize = 64;

/// Maximum number of operator nodes in one expression.
///
/// Lowering, evaluation and drop all recurse along the tree, and a long
/// left-leaning chain is as tall as it has nodes. Both limits must hold on a
/// 2 MiB thread stack in unoptimised builds.
pub(crate) const MAX_NODES: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Syntax {
    Number(Number),
    Name(String),
    Str(String),
    Binary {
        op: BinaryOp,
        lhs: Box<Syntax>,
        rhs: Box<Syntax>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Syntax>,
    },
    Compare {
        op: &'static str,
        lhs: Box<Syntax>,
        rhs: Box<Syntax>,
    },
    BoolOp {
        op: &'static str,
        lhs: Box<Syntax>,
        rhs: Box<Syntax>,
    },
    Not(Box<Syntax>),
    Call {
        func: Box<Syntax>,
        args: Vec<Syntax>,
    },
}

/// Parse a token stream into a single expression.
pub(crate) fn parse(input: &str, tokens: &[Token]) -> Result<Syntax> {
    let mut parser = Parser {
        input,
        tokens,
        pos: 0,
        depth: 0,
        nodes: 0,
    };
    if tokens.is_empty() {
        return Err(parse_err(input, parser.end_span(), "empty expression"));
    }
    let expr = parser.parse_or()?;
    if let Some(t) = parser.peek() {
        return Err(parse_err(
            input,
            t.span,
            format!("unexpected token after expression: {:?}", t.kind),
        ));
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
    nodes: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&'a TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Ident(name)) if name == word)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn end_span(&self) -> Span {
        Span {
            start: self.input.len(),
            end: self.input.len(),
        }
    }

    fn expect(&mut self, expected: TokenKind) -> Result<()> {
        let end = self.end_span();
        match self.advance() {
            Some(t) if t.kind == expected => Ok(()),
            Some(t) => Err(parse_err(
                self.input,
                t.span,
                format!("expected {:?}, got {:?}", expected, t.kind),
            )),
            None => Err(parse_err(
                self.input,
                end,
                format!("expected {:?}, got end of input", expected),
            )),
        }
    }

    fn nested<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= MAX_DEPTH {
            let span = self.peek().map_or(self.end_span(), |t| t.span);
            return Err(parse_err(self.input, span, "expression nested too deeply"));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn node(&mut self, syntax: Syntax) -> Result<Syntax> {
        self.nodes += 1;
        if self.nodes > MAX_NODES {
            let span = self.peek().map_or(self.end_span(), |t| t.span);
            return Err(parse_err(self.input, span, "expression too large"));
        }
        Ok(syntax)
    }

    fn binary(&mut self, op: BinaryOp, lhs: Syntax, rhs: Syntax) -> Result<Syntax> {
        self.node(Syntax::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn parse_or(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_and()?;
        while self.is_keyword("or") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = self.node(Syntax::BoolOp {
                op: "or",
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })?;
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_not()?;
        while self.is_keyword("and") {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = self.node(Syntax::BoolOp {
                op: "and",
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })?;
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Syntax> {
        if self.is_keyword("not") {
            self.advance();
            let operand = self.nested(|p| p.parse_not())?;
            return self.node(Syntax::Not(Box::new(operand)));
        }
        self.parse_compare()
    }

    fn parse_compare(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_bit_or()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => "<",
                Some(TokenKind::Le) => "<=",
                Some(TokenKind::Gt) => ">",
                Some(TokenKind::Ge) => ">=",
                Some(TokenKind::EqEq) => "==",
                Some(TokenKind::Ne) => "!=",
                _ => break,
            };
            self.advance();
            let rhs = self.parse_bit_or()?;
            lhs = self.node(Syntax::Compare {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            })?;
        }
        Ok(lhs)
    }

    fn parse_bit_or(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_bit_xor()?;
        while matches!(self.peek_kind(), Some(TokenKind::Pipe)) {
            self.advance();
            let rhs = self.parse_bit_xor()?;
            lhs = self.binary(BinaryOp::BitOr, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bit_xor(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_bit_and()?;
        while matches!(self.peek_kind(), Some(TokenKind::Caret)) {
            self.advance();
            let rhs = self.parse_bit_and()?;
            lhs = self.binary(BinaryOp::BitXor, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_bit_and(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_shift()?;
        while matches!(self.peek_kind(), Some(TokenKind::Amp)) {
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = self.binary(BinaryOp::BitAnd, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Shl) => BinaryOp::Shl,
                Some(TokenKind::Shr) => BinaryOp::Shr,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_term()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Syntax> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                Some(TokenKind::SlashSlash) => BinaryOp::FloorDiv,
                Some(TokenKind::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Syntax> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Plus) => UnaryOp::Pos,
            Some(TokenKind::Tilde) => UnaryOp::Invert,
            _ => return self.parse_power(),
        };
        self.advance();
        let operand = self.nested(|p| p.parse_unary())?;
        self.node(Syntax::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    // `-2**2` is `-(2**2)`, and the exponent may itself carry a sign.
    fn parse_power(&mut self) -> Result<Syntax> {
        let base = self.parse_call()?;
        if matches!(self.peek_kind(), Some(TokenKind::StarStar)) {
            self.advance();
            let exponent = self.nested(|p| p.parse_unary())?;
            return self.binary(BinaryOp::Pow, base, exponent);
        }
        Ok(base)
    }

    fn parse_call(&mut self) -> Result<Syntax> {
        let mut expr = self.parse_atom()?;
        while matches!(self.peek_kind(), Some(TokenKind::LParen)) {
            self.advance();
            let args = self.nested(|p| {
                let mut args = Vec::new();
                if !matches!(p.peek_kind(), Some(TokenKind::RParen)) {
                    args.push(p.parse_or()?);
                    while matches!(p.peek_kind(), Some(TokenKind::Comma)) {
                        p.advance();
                        args.push(p.parse_or()?);
                    }
                }
                p.expect(TokenKind::RParen)?;
                Ok(args)
            })?;
            expr = self.node(Syntax::Call {
                func: Box::new(expr),
                args,
            })?;
        }
        Ok(expr)
    }

    fn parse_atom(&mut self) -> Result<Syntax> {
        let end = self.end_span();
        let Some(token) = self.advance() else {
            return Err(parse_err(self.input, end, "unexpected end of input"));
        };
        match &token.kind {
            TokenKind::Num(n) => Ok(Syntax::Number(*n)),
            TokenKind::Ident(name) if matches!(name.as_str(), "and" | "or" | "not") => Err(
                parse_err(self.input, token.span, format!("unexpected keyword '{name}'")),
            ),
            TokenKind::Ident(name) => Ok(Syntax::Name(name.clone())),
            TokenKind::Str(s) => Ok(Syntax::Str(s.clone())),
            TokenKind::LParen => {
                let inner = self.nested(|p| p.parse_or())?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            other => Err(parse_err(
                self.input,
                token.span,
                format!("unexpected token: {other:?}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::expr::token::tokenize;

    fn parse_str(input: &str) -> Result<Syntax> {
        let tokens = tokenize(input)?;
        parse(input, &tokens)
    }

    fn num(n: i64) -> Box<Syntax> {
        Box::new(Syntax::Number(Number::Int(n)))
    }

    #[test]
    fn test_power_is_right_associative() {
        let tree = parse_str("2**3**2").unwrap();
        assert_eq!(
            tree,
            Syntax::Binary {
                op: BinaryOp::Pow,
                lhs: num(2),
                rhs: Box::new(Syntax::Binary {
                    op: BinaryOp::Pow,
                    lhs: num(3),
                    rhs: num(2),
                }),
            }
        );
    }

    #[test]
    fn test_unary_minus_binds_looser_than_power() {
        let tree = parse_str("-2**2").unwrap();
        assert!(matches!(
            tree,
            Syntax::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn test_xor_binds_looser_than_addition() {
        let tree = parse_str("1 + 2 ^ 3").unwrap();
        assert!(matches!(
            tree,
            Syntax::Binary {
                op: BinaryOp::BitXor,
                ..
            }
        ));
    }

    #[test]
    fn test_wider_surface_parses() {
        assert!(matches!(parse_str("f(1, 2)").unwrap(), Syntax::Call { .. }));
        assert!(matches!(parse_str("1 < 2").unwrap(), Syntax::Compare { .. }));
        assert!(matches!(parse_str("1 and 2").unwrap(), Syntax::BoolOp { .. }));
        assert!(matches!(parse_str("not 1").unwrap(), Syntax::Not(_)));
    }

    #[test]
    fn test_malformed_input() {
        for input in ["", "   ", "(1 + 2", "1 + 2)", "1 +", "* 2", "1 2", "f(1,"] {
            assert!(
                matches!(parse_str(input), Err(Error::Parse(_))),
                "{input:?} should fail to parse"
            );
        }
    }

    #[test]
    fn test_depth_limit() {
        let at_limit = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert!(parse_str(&at_limit).is_ok());

        let deep = format!("{}1{}", "(".repeat(1000), ")".repeat(1000));
        let err = parse_str(&deep).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));

        let unary = format!("{}1", "-".repeat(MAX_DEPTH + 1));
        let err = parse_str(&unary).unwrap_err();
        assert!(err.to_string().contains("nested too deeply"));
    }

    #[test]
    fn test_node_limit() {
        let at_limit = vec!["1"; MAX_NODES + 1].join("+");
        assert!(parse_str(&at_limit).is_ok());

        let long = vec!["1"; 5000].join("+");
        let err = parse_str(&long).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }
}
