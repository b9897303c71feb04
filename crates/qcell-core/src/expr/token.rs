//! Tokenizer for expression text.

use crate::error::{Error, Result};

use super::ops::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Num(Number),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    SlashSlash,
    Percent,
    Caret,
    Amp,
    Pipe,
    Tilde,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    Ne,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

pub(crate) fn line_col_1based(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let mut line: usize = 1;
    let mut col: usize = 1;
    for &b in &input.as_bytes()[..offset] {
        if b == b'\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

pub(crate) fn parse_err(input: &str, span: Span, msg: impl std::fmt::Display) -> Error {
    let (line, col) = line_col_1based(input, span.start);
    Error::Parse(format!("line {line}, col {col}: {msg}"))
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i: usize = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        if i + 1 < bytes.len() {
            let kind = match &bytes[i..i + 2] {
                b"**" => Some(TokenKind::StarStar),
                b"//" => Some(TokenKind::SlashSlash),
                b"<<" => Some(TokenKind::Shl),
                b">>" => Some(TokenKind::Shr),
                b"<=" => Some(TokenKind::Le),
                b">=" => Some(TokenKind::Ge),
                b"==" => Some(TokenKind::EqEq),
                b"!=" => Some(TokenKind::Ne),
                _ => None,
            };
            if let Some(kind) = kind {
                tokens.push(Token {
                    kind,
                    span: Span { start: i, end: i + 2 },
                });
                i += 2;
                continue;
            }
        }

        let start = i;
        let kind = match b {
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'%' => TokenKind::Percent,
            b'^' => TokenKind::Caret,
            b'&' => TokenKind::Amp,
            b'|' => TokenKind::Pipe,
            b'~' => TokenKind::Tilde,
            b'<' => TokenKind::Lt,
            b'>' => TokenKind::Gt,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b',' => TokenKind::Comma,
            b'0'..=b'9' | b'.' => {
                let (kind, end) = number(input, start)?;
                tokens.push(Token {
                    kind,
                    span: Span { start, end },
                });
                i = end;
                continue;
            }
            b'\'' | b'"' => {
                let quote = b;
                let mut end = start + 1;
                while end < bytes.len() && bytes[end] != quote {
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(parse_err(
                        input,
                        Span { start, end },
                        "unterminated string literal",
                    ));
                }
                tokens.push(Token {
                    kind: TokenKind::Str(input[start + 1..end].to_string()),
                    span: Span {
                        start,
                        end: end + 1,
                    },
                });
                i = end + 1;
                continue;
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                let mut end = start + 1;
                while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Ident(input[start..end].to_string()),
                    span: Span { start, end },
                });
                i = end;
                continue;
            }
            _ => {
                let ch = input[i..].chars().next().unwrap_or('?');
                return Err(parse_err(
                    input,
                    Span {
                        start: i,
                        end: i + ch.len_utf8(),
                    },
                    format!("unexpected character: '{ch}'"),
                ));
            }
        };

        i += 1;
        tokens.push(Token {
            kind,
            span: Span { start, end: i },
        });
    }

    Ok(tokens)
}

/// Scan a numeric literal starting at `start`. Underscores between digits
/// are accepted and dropped.
fn number(input: &str, start: usize) -> Result<(TokenKind, usize)> {
    let bytes = input.as_bytes();
    let mut i = start;
    let mut is_float = false;

    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() || c == b'_' {
            i += 1;
        } else if c == b'.' {
            is_float = true;
            i += 1;
        } else if (c == b'e' || c == b'E') && i > start {
            is_float = true;
            i += 1;
            if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
                i += 1;
            }
        } else {
            break;
        }
    }

    let span = Span { start, end: i };
    let text = &input[start..i];
    if text.starts_with('_') || text.ends_with('_') || text.contains("__") {
        return Err(parse_err(input, span, format!("invalid number: '{text}'")));
    }
    let cleaned = text.replace('_', "");

    if !is_float {
        if let Ok(value) = cleaned.parse::<i64>() {
            return Ok((TokenKind::Num(Number::Int(value)), i));
        }
    }
    // Integer literals too large for i64 become floats.
    let value: f64 = cleaned
        .parse()
        .map_err(|_| parse_err(input, span, format!("invalid number: '{text}'")))?;
    Ok((TokenKind::Num(Number::Float(value)), i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a ** 2 ^ b // 3"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::StarStar,
                TokenKind::Num(Number::Int(2)),
                TokenKind::Caret,
                TokenKind::Ident("b".into()),
                TokenKind::SlashSlash,
                TokenKind::Num(Number::Int(3)),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("1_000"), vec![TokenKind::Num(Number::Int(1000))]);
        assert_eq!(kinds("2.5"), vec![TokenKind::Num(Number::Float(2.5))]);
        assert_eq!(kinds(".5"), vec![TokenKind::Num(Number::Float(0.5))]);
        assert_eq!(kinds("1e3"), vec![TokenKind::Num(Number::Float(1000.0))]);
        assert_eq!(kinds("1e-2"), vec![TokenKind::Num(Number::Float(0.01))]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(kinds("'ab'"), vec![TokenKind::Str("ab".into())]);
        assert!(matches!(tokenize("'ab"), Err(Error::Parse(_))));
    }

    #[test]
    fn test_errors_report_line_col() {
        let err = tokenize("1 +\n  $").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2, col 3"), "{msg}");
        assert!(msg.contains("'$'"), "{msg}");
    }

    #[test]
    fn test_bad_number() {
        assert!(matches!(tokenize("1..2"), Err(Error::Parse(_))));
        assert!(matches!(tokenize("1__0"), Err(Error::Parse(_))));
    }
}
