// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Selector lexer and recursive-descent parser.

use super::SelectorError;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// SQL pattern match (`%` any run, `_` one character)
    Like,
}

/// Comparison operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
}

/// Selector syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Compare {
        left: Operand,
        op: Operator,
        right: Operand,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
    Not(Box<Expression>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Operand(Operand),
    Op(Operator),
    And,
    Or,
    Not,
    Open,
    Close,
}

/// Token plus its byte offset in the source.
type Spanned = (usize, Token);

fn error(offset: usize, reason: impl Into<String>) -> SelectorError {
    SelectorError::Parse {
        offset,
        reason: reason.into(),
    }
}

fn tokenize(source: &str) -> Result<Vec<Spanned>, SelectorError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let token = match ch {
            '(' => {
                chars.next();
                Token::Open
            }
            ')' => {
                chars.next();
                Token::Close
            }
            '=' => {
                chars.next();
                let _ = chars.next_if(|&(_, c)| c == '=');
                Token::Op(Operator::Eq)
            }
            '!' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_none() {
                    return Err(error(start, "expected '=' after '!'"));
                }
                Token::Op(Operator::Ne)
            }
            '<' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::Op(Operator::Le)
                } else if chars.next_if(|&(_, c)| c == '>').is_some() {
                    Token::Op(Operator::Ne)
                } else {
                    Token::Op(Operator::Lt)
                }
            }
            '>' => {
                chars.next();
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::Op(Operator::Ge)
                } else {
                    Token::Op(Operator::Gt)
                }
            }
            '\'' | '"' => {
                chars.next();
                let mut text = String::new();
                let mut terminated = false;
                for (_, c) in chars.by_ref() {
                    if c == ch {
                        terminated = true;
                        break;
                    }
                    text.push(c);
                }
                if !terminated {
                    return Err(error(start, "unterminated string"));
                }
                Token::Operand(Operand::String(text))
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut text = String::new();
                while let Some((_, c)) =
                    chars.next_if(|&(_, c)| c.is_ascii_digit() || c == '.' || c == '-')
                {
                    text.push(c);
                }
                let operand = if text.contains('.') {
                    text.parse::<f64>().map(Operand::Float).ok()
                } else {
                    text.parse::<i64>().map(Operand::Integer).ok()
                };
                match operand {
                    Some(operand) => Token::Operand(operand),
                    None => return Err(error(start, format!("invalid number '{}'", text))),
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some((_, c)) = chars.next_if(|&(_, c)| c.is_alphanumeric() || c == '_') {
                    word.push(c);
                }
                match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "NOT" => Token::Not,
                    "LIKE" => Token::Op(Operator::Like),
                    "TRUE" => Token::Operand(Operand::Boolean(true)),
                    "FALSE" => Token::Operand(Operand::Boolean(false)),
                    _ => Token::Operand(Operand::Identifier(word)),
                }
            }
            other => return Err(error(start, format!("unexpected character '{}'", other))),
        };
        tokens.push((start, token));
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(o, _)| *o)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or(&mut self) -> Result<Expression, SelectorError> {
        let mut left = self.and()?;
        while self.eat(&Token::Or) {
            left = Expression::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expression, SelectorError> {
        let mut left = self.not()?;
        while self.eat(&Token::And) {
            left = Expression::And(Box::new(left), Box::new(self.not()?));
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<Expression, SelectorError> {
        if self.eat(&Token::Not) {
            return Ok(Expression::Not(Box::new(self.not()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expression, SelectorError> {
        if self.eat(&Token::Open) {
            let inner = self.or()?;
            if !self.eat(&Token::Close) {
                return Err(error(self.offset(), "expected ')'"));
            }
            return Ok(inner);
        }

        let left = self.operand()?;
        let op = match self.peek() {
            Some(Token::Op(op)) => *op,
            _ => return Err(error(self.offset(), "expected comparison operator")),
        };
        self.pos += 1;
        let right = self.operand()?;
        Ok(Expression::Compare { left, op, right })
    }

    fn operand(&mut self) -> Result<Operand, SelectorError> {
        match self.peek() {
            Some(Token::Operand(operand)) => {
                let operand = operand.clone();
                self.pos += 1;
                Ok(operand)
            }
            _ => Err(error(self.offset(), "expected operand")),
        }
    }
}

/// Parse a selector into its syntax tree.
pub(super) fn parse(source: &str) -> Result<Expression, SelectorError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(SelectorError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expression = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err(error(parser.offset(), "unexpected trailing input"));
    }
    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(name: &str, op: Operator, value: i64) -> Expression {
        Expression::Compare {
            left: Operand::Identifier(name.to_string()),
            op,
            right: Operand::Integer(value),
        }
    }

    #[test]
    fn test_precedence() {
        let expr = parse("mid = 1 OR mid = 2 AND station_id <> 3").unwrap();
        assert_eq!(
            expr,
            Expression::Or(
                Box::new(compare("mid", Operator::Eq, 1)),
                Box::new(Expression::And(
                    Box::new(compare("mid", Operator::Eq, 2)),
                    Box::new(compare("station_id", Operator::Ne, 3)),
                )),
            )
        );
    }

    #[test]
    fn test_not_binds_tighter_than_and() {
        let expr = parse("NOT(station_id = 101) AND mid = 2049").unwrap();
        assert_eq!(
            expr,
            Expression::And(
                Box::new(Expression::Not(Box::new(compare(
                    "station_id",
                    Operator::Eq,
                    101
                )))),
                Box::new(compare("mid", Operator::Eq, 2049)),
            )
        );
    }

    #[test]
    fn test_operators() {
        for (text, op) in [
            ("=", Operator::Eq),
            ("==", Operator::Eq),
            ("<>", Operator::Ne),
            ("!=", Operator::Ne),
            ("<", Operator::Lt),
            ("<=", Operator::Le),
            (">", Operator::Gt),
            (">=", Operator::Ge),
        ] {
            let expr = parse(&format!("mid {} 5", text)).unwrap();
            assert_eq!(expr, compare("mid", op, 5), "operator {}", text);
        }
    }

    #[test]
    fn test_literals() {
        let expr = parse("x = -2.5 or flag = true and s = \"a b\"").unwrap();
        let Expression::Or(left, _) = expr else {
            panic!("expected OR");
        };
        assert_eq!(
            *left,
            Expression::Compare {
                left: Operand::Identifier("x".into()),
                op: Operator::Eq,
                right: Operand::Float(-2.5),
            }
        );
    }

    #[test]
    fn test_error_offset() {
        let err = parse("mid = 1 AND ?").unwrap_err();
        assert_eq!(
            err,
            SelectorError::Parse {
                offset: 12,
                reason: "unexpected character '?'".into()
            }
        );
    }
}
